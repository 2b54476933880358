//! Registered files, batch state, and registration checks.

use std::path::Path;

use crate::chunk::run::{self, ChunkTicket, Step};
use crate::config::UploadConfig;
use crate::error::UploadError;
use crate::file::FileUnit;

/// Per-`upload()` bookkeeping.
#[derive(Debug, Default)]
pub(crate) struct Batch {
    /// Bumped by `upload()` and `pause()`; workers of an older epoch exit.
    pub epoch: u64,
    /// `complete` already fired for this batch.
    pub complete_fired: bool,
}

#[derive(Debug, Default)]
pub(crate) struct Registry {
    /// Registration order is scan order.
    pub files: Vec<FileUnit>,
    pub batch: Batch,
}

impl Registry {
    pub fn find(&self, identifier: &str) -> Option<&FileUnit> {
        self.files.iter().find(|f| f.identifier() == identifier)
    }

    pub fn find_mut(&mut self, identifier: &str) -> Option<&mut FileUnit> {
        self.files.iter_mut().find(|f| f.identifier() == identifier)
    }

    /// The file only if its chunk plan is still `generation`.
    pub fn current_file(&mut self, identifier: &str, generation: u64) -> Option<&mut FileUnit> {
        self.find_mut(identifier)
            .filter(|f| f.generation() == generation)
    }

    pub fn remove(&mut self, identifier: &str) -> Option<FileUnit> {
        let pos = self.files.iter().position(|f| f.identifier() == identifier)?;
        Some(self.files.remove(pos))
    }

    /// First pending chunk in file-then-index order, started on the spot.
    pub fn next_job(&mut self) -> Option<(ChunkTicket, Step)> {
        for file in &mut self.files {
            if let Some(index) = file.next_pending() {
                return run::start(file, index);
            }
        }
        None
    }

    pub fn is_uploading(&self) -> bool {
        self.files.iter().any(FileUnit::is_uploading)
    }

    pub fn all_complete(&self) -> bool {
        self.files.iter().all(FileUnit::is_complete)
    }
}

/// Size bounds and extension allow-list for one candidate file.
pub(crate) fn check_candidate(cfg: &UploadConfig, path: &Path, size: u64) -> Result<(), UploadError> {
    if let Some(min) = cfg.min_file_size {
        if size < min {
            return Err(UploadError::FileTooSmall {
                path: path.to_path_buf(),
                size,
                min,
            });
        }
    }
    if let Some(max) = cfg.max_file_size {
        if size > max {
            return Err(UploadError::FileTooLarge {
                path: path.to_path_buf(),
                size,
                max,
            });
        }
    }
    if !cfg.file_types.is_empty() {
        let ext = path
            .extension()
            .map(|e| e.to_string_lossy().to_ascii_lowercase())
            .unwrap_or_default();
        let allowed = cfg
            .file_types
            .iter()
            .any(|t| t.trim_start_matches('.').eq_ignore_ascii_case(&ext));
        if !allowed {
            return Err(UploadError::FileTypeNotAllowed {
                path: path.to_path_buf(),
            });
        }
    }
    Ok(())
}

/// Fails when registering `incoming` more paths would exceed `max_files`.
pub(crate) fn check_count(cfg: &UploadConfig, existing: usize, incoming: usize) -> Result<(), UploadError> {
    match cfg.max_files {
        Some(max) if existing + incoming > max => Err(UploadError::TooManyFiles {
            max,
            requested: existing + incoming,
        }),
        _ => Ok(()),
    }
}
