//! One registered file: its chunk plan, aggregation, and file-level events.
//!
//! The chunk list is rebuilt from scratch on every bootstrap. Each rebuild
//! gets a fresh generation number so workers still holding a chunk of the
//! old plan can tell their result no longer applies.

mod source;

use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Arc;

use crate::chunk::{plan_chunks, ChunkEvent, ChunkSnapshot, ChunkStatus, ChunkUnit};
use crate::events::UploadEvent;
use crate::settings::Settings;

pub use source::FileMeta;
pub(crate) use source::FileSource;

static GENERATION: AtomicU64 = AtomicU64::new(1);

fn next_generation() -> u64 {
    GENERATION.fetch_add(1, Ordering::Relaxed)
}

/// Read-only view of a registered file.
#[derive(Debug, Clone, PartialEq)]
pub struct FileSnapshot {
    pub meta: FileMeta,
    pub progress: f64,
    pub paused: bool,
    pub errored: bool,
    pub cancelled: bool,
    pub complete: bool,
    pub uploading: bool,
    pub chunks: Vec<ChunkSnapshot>,
}

#[derive(Debug)]
pub(crate) struct FileUnit {
    source: Arc<FileSource>,
    settings: Arc<Settings>,
    chunks: Vec<ChunkUnit>,
    generation: u64,
    paused: bool,
    errored: bool,
    /// Chunk list dropped by a cancel; cleared by the next bootstrap.
    cancelled: bool,
    /// `fileSuccess` already fired for this plan.
    succeeded: bool,
    prev_progress: f64,
}

impl FileUnit {
    pub fn new(meta: FileMeta, settings: Arc<Settings>) -> Self {
        let mut file = Self {
            source: Arc::new(FileSource::new(meta)),
            settings,
            chunks: Vec::new(),
            generation: next_generation(),
            paused: false,
            errored: false,
            cancelled: false,
            succeeded: false,
            prev_progress: 0.0,
        };
        file.fire_file(|file| UploadEvent::ChunkingStart { file });
        file.bootstrap();
        file
    }

    pub fn meta(&self) -> &FileMeta {
        self.source.meta()
    }

    pub fn identifier(&self) -> &str {
        &self.meta().identifier
    }

    pub fn size(&self) -> u64 {
        self.meta().size
    }

    pub fn generation(&self) -> u64 {
        self.generation
    }

    pub fn settings(&self) -> &Arc<Settings> {
        &self.settings
    }

    pub fn total_chunks(&self) -> usize {
        self.chunks.len()
    }

    pub fn chunk(&self, index: usize) -> Option<&ChunkUnit> {
        self.chunks.get(index)
    }

    pub fn chunk_mut(&mut self, index: usize) -> Option<&mut ChunkUnit> {
        self.chunks.get_mut(index)
    }

    pub(crate) fn fire_file(&self, make: impl FnOnce(String) -> UploadEvent) {
        self.settings.events.fire(make(self.identifier().to_string()));
    }

    /// Discard the current plan and chunk it again from scratch.
    pub fn bootstrap(&mut self) {
        self.abort();
        self.errored = false;
        self.cancelled = false;
        self.succeeded = false;
        self.prev_progress = 0.0;
        self.generation = next_generation();

        let size = self.size();
        let ranges = plan_chunks(size, self.settings.config.chunk_size);
        let count = ranges.len();
        self.chunks = Vec::with_capacity(count);
        for (index, range) in ranges.into_iter().enumerate() {
            self.chunks.push(ChunkUnit::new(
                Arc::downgrade(&self.source),
                index,
                range,
                size,
            ));
            let ratio = index as f64 / count as f64;
            self.fire_file(|file| UploadEvent::ChunkingProgress { file, ratio });
        }
        tracing::debug!(file = %self.identifier(), chunks = count, "chunked");
        self.fire_file(|file| UploadEvent::ChunkingComplete { file });
    }

    /// Abort every uploading chunk; they go back to pending.
    pub fn abort(&mut self) -> usize {
        let policy = &self.settings.policy;
        let mut aborted = 0;
        for chunk in &mut self.chunks {
            if chunk.status(policy) == ChunkStatus::Uploading {
                chunk.abort();
                aborted += 1;
            }
        }
        if aborted > 0 {
            self.fire_file(|file| UploadEvent::FileProgress { file });
        }
        aborted
    }

    /// Drop the chunk list. Returns how many chunks were uploading.
    pub fn cancel(&mut self) -> usize {
        let policy = &self.settings.policy;
        let mut aborted = 0;
        for mut chunk in std::mem::take(&mut self.chunks) {
            if chunk.status(policy) == ChunkStatus::Uploading {
                chunk.abort();
                aborted += 1;
            }
        }
        self.cancelled = true;
        self.generation = next_generation();
        aborted
    }

    /// Mark the file errored and discard all chunk state.
    pub fn fail(&mut self, message: String) {
        self.abort();
        self.errored = true;
        self.chunks.clear();
        self.generation = next_generation();
        tracing::warn!(file = %self.identifier(), %message, "file failed");
        self.fire_file(|file| UploadEvent::FileError { file, message });
    }

    pub(crate) fn handle_chunk_event(&mut self, event: ChunkEvent) {
        match event {
            ChunkEvent::Progress => self.fire_file(|file| UploadEvent::FileProgress { file }),
            ChunkEvent::Success(message) => {
                if self.errored {
                    return;
                }
                self.fire_file(|file| UploadEvent::FileProgress { file });
                if !self.succeeded && self.is_complete() {
                    self.succeeded = true;
                    tracing::info!(file = %self.identifier(), "file uploaded");
                    self.fire_file(|file| UploadEvent::FileSuccess { file, message });
                }
            }
            ChunkEvent::Error(message) => self.fail(message),
            ChunkEvent::Retry(message) => {
                tracing::debug!(file = %self.identifier(), %message, "chunk retry");
                self.fire_file(|file| UploadEvent::FileRetry { file });
            }
        }
    }

    /// Lowest-index pending chunk, unless the file is paused.
    pub fn next_pending(&self) -> Option<usize> {
        if self.paused {
            return None;
        }
        let policy = &self.settings.policy;
        self.chunks
            .iter()
            .position(|c| c.status(policy) == ChunkStatus::Pending)
    }

    fn computed_progress(&self) -> f64 {
        if self.errored {
            return 1.0;
        }
        let policy = &self.settings.policy;
        let sum: f64 = self.chunks.iter().map(|c| c.progress(true, policy)).sum();
        let sum = if sum > 0.99999 { 1.0 } else { sum };
        sum.max(self.prev_progress)
    }

    /// Fraction uploaded; never decreases within one plan.
    pub fn progress(&mut self) -> f64 {
        let progress = self.computed_progress();
        self.prev_progress = progress;
        progress
    }

    pub fn is_uploading(&self) -> bool {
        let policy = &self.settings.policy;
        self.chunks
            .iter()
            .any(|c| c.status(policy) == ChunkStatus::Uploading)
    }

    /// Every chunk succeeded. True for an emptied (errored or cancelled) plan.
    pub fn is_complete(&self) -> bool {
        let policy = &self.settings.policy;
        self.chunks
            .iter()
            .all(|c| c.status(policy) == ChunkStatus::Success)
    }

    pub fn is_errored(&self) -> bool {
        self.errored
    }

    pub fn is_cancelled(&self) -> bool {
        self.cancelled && !self.errored
    }

    pub fn pause(&mut self, paused: bool) {
        self.paused = paused;
    }

    pub fn is_paused(&self) -> bool {
        self.paused
    }

    /// Bytes the server has acknowledged.
    pub fn acked_bytes(&self) -> u64 {
        let policy = &self.settings.policy;
        self.chunks
            .iter()
            .filter(|c| c.status(policy) == ChunkStatus::Success)
            .map(|c| c.range().len())
            .sum()
    }

    pub fn snapshot(&self) -> FileSnapshot {
        let policy = &self.settings.policy;
        FileSnapshot {
            meta: self.meta().clone(),
            progress: self.computed_progress(),
            paused: self.paused,
            errored: self.errored,
            cancelled: self.is_cancelled(),
            complete: self.is_complete(),
            uploading: self.is_uploading(),
            chunks: self.chunks.iter().map(|c| c.snapshot(policy)).collect(),
        }
    }
}
