//! CLI command handlers, one per file.

mod config;
mod plan;
mod upload;

pub use config::run_config;
pub use plan::run_plan;
pub use upload::{run_upload, UploadOverrides};
