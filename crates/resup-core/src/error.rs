//! Registration and configuration errors reported to the caller.

use std::path::PathBuf;

/// Error returned synchronously by controller operations.
///
/// A failing `add_files` call registers nothing.
#[derive(Debug, thiserror::Error)]
pub enum UploadError {
    #[error("too many files: {requested} requested, at most {max} allowed")]
    TooManyFiles { max: usize, requested: usize },

    #[error("{}: {size} bytes is below the minimum of {min}", path.display())]
    FileTooSmall { path: PathBuf, size: u64, min: u64 },

    #[error("{}: {size} bytes exceeds the maximum of {max}", path.display())]
    FileTooLarge { path: PathBuf, size: u64, max: u64 },

    #[error("{}: file type not allowed", path.display())]
    FileTypeNotAllowed { path: PathBuf },

    #[error("cannot stat {}: {source}", path.display())]
    Stat {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },

    #[error("invalid config: {0}")]
    InvalidConfig(String),

    #[error("unknown file: {0}")]
    UnknownFile(String),
}
