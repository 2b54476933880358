//! Upload event surface.
//!
//! Listeners subscribe to an [`EventBus`] and receive every [`UploadEvent`]
//! on an unbounded channel. Firing never blocks, so events can be raised
//! while registry state is locked.

use std::path::PathBuf;
use std::sync::{Arc, Mutex, PoisonError};

use tokio::sync::mpsc;

/// Events fired by the controller, its files, and their chunks.
///
/// File-scoped events carry the file identifier.
#[derive(Debug, Clone, PartialEq)]
pub enum UploadEvent {
    FileAdded { file: String },
    FilesAdded { added: Vec<String>, skipped: Vec<PathBuf> },
    FileProgress { file: String },
    FileSuccess { file: String, message: String },
    FileError { file: String, message: String },
    FileRetry { file: String },
    UploadStart,
    Complete,
    Progress,
    Error { message: String, file: String },
    Pause,
    BeforeCancel,
    Cancel,
    ChunkingStart { file: String },
    ChunkingProgress { file: String, ratio: f64 },
    ChunkingComplete { file: String },
}

impl UploadEvent {
    /// Listener-facing event name.
    pub fn name(&self) -> &'static str {
        match self {
            UploadEvent::FileAdded { .. } => "fileAdded",
            UploadEvent::FilesAdded { .. } => "filesAdded",
            UploadEvent::FileProgress { .. } => "fileProgress",
            UploadEvent::FileSuccess { .. } => "fileSuccess",
            UploadEvent::FileError { .. } => "fileError",
            UploadEvent::FileRetry { .. } => "fileRetry",
            UploadEvent::UploadStart => "uploadStart",
            UploadEvent::Complete => "complete",
            UploadEvent::Progress => "progress",
            UploadEvent::Error { .. } => "error",
            UploadEvent::Pause => "pause",
            UploadEvent::BeforeCancel => "beforeCancel",
            UploadEvent::Cancel => "cancel",
            UploadEvent::ChunkingStart { .. } => "chunkingStart",
            UploadEvent::ChunkingProgress { .. } => "chunkingProgress",
            UploadEvent::ChunkingComplete { .. } => "chunkingComplete",
        }
    }

    /// Identifier of the file the event concerns, if any.
    pub fn file(&self) -> Option<&str> {
        match self {
            UploadEvent::FileAdded { file }
            | UploadEvent::FileProgress { file }
            | UploadEvent::FileSuccess { file, .. }
            | UploadEvent::FileError { file, .. }
            | UploadEvent::FileRetry { file }
            | UploadEvent::Error { file, .. }
            | UploadEvent::ChunkingStart { file }
            | UploadEvent::ChunkingProgress { file, .. }
            | UploadEvent::ChunkingComplete { file } => Some(file),
            _ => None,
        }
    }

    /// Aggregate event raised right after this one: every file error is
    /// also a controller `error`, every file progress a `progress`.
    fn derived(&self) -> Option<UploadEvent> {
        match self {
            UploadEvent::FileError { file, message } => Some(UploadEvent::Error {
                message: message.clone(),
                file: file.clone(),
            }),
            UploadEvent::FileProgress { .. } => Some(UploadEvent::Progress),
            _ => None,
        }
    }
}

/// Fan-out of upload events to any number of subscribers.
#[derive(Debug, Clone, Default)]
pub struct EventBus {
    subscribers: Arc<Mutex<Vec<mpsc::UnboundedSender<UploadEvent>>>>,
}

impl EventBus {
    pub fn new() -> Self {
        Self::default()
    }

    /// New receiver for every event fired from now on.
    pub fn subscribe(&self) -> mpsc::UnboundedReceiver<UploadEvent> {
        let (tx, rx) = mpsc::unbounded_channel();
        self.subscribers
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .push(tx);
        rx
    }

    pub fn fire(&self, event: UploadEvent) {
        let derived = event.derived();
        tracing::trace!(event = event.name(), file = ?event.file(), "fire");
        self.emit(event);
        if let Some(derived) = derived {
            self.emit(derived);
        }
    }

    fn emit(&self, event: UploadEvent) {
        let mut subs = self
            .subscribers
            .lock()
            .unwrap_or_else(PoisonError::into_inner);
        // Dropped receivers are pruned on the next emit.
        subs.retain(|tx| tx.send(event.clone()).is_ok());
    }
}
