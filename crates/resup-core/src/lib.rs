//! Core engine for resup: resumable, chunked file uploads.
//!
//! Files are split into fixed-size chunks, each probed against the server
//! (so interrupted sessions resume) and then uploaded by a bounded pool of
//! workers, with flat-cadence retries and permanent-error classification.

pub mod chunk;
pub mod config;
pub mod controller;
pub mod error;
pub mod events;
pub mod file;
pub mod identifier;
pub mod logging;
pub mod retry;
pub mod settings;
pub mod transport;

pub use chunk::{ChunkRange, ChunkSnapshot, ChunkStatus};
pub use config::UploadConfig;
pub use controller::{AddedFiles, NextChunk, UploadController, UploadOutcome, UploadStats};
pub use error::UploadError;
pub use events::{EventBus, UploadEvent};
pub use file::{FileMeta, FileSnapshot};
