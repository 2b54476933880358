//! Per-chunk request state.
//!
//! A chunk never stores its status as a tag. [`ChunkUnit::status`] derives it
//! from the in-flight request, the pending-retry wait, and the last outcome.
//! The async side of the protocol (probe, send, retry wait) lives in `run`.

mod range;
pub(crate) mod request;
pub(crate) mod run;

use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::{Arc, Weak};

use tokio_util::sync::CancellationToken;

use crate::file::FileSource;
use crate::retry::{classify, Outcome, RetryPolicy, Verdict};

pub use range::{chunk_count, plan_chunks, ChunkRange};

/// Externally visible chunk state.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ChunkStatus {
    Pending,
    Uploading,
    Success,
    Error,
}

/// Terminal and progress signals a chunk raises to its file.
#[derive(Debug, Clone, PartialEq, Eq)]
pub(crate) enum ChunkEvent {
    Progress,
    Success(String),
    Error(String),
    Retry(String),
}

/// Read-only view of a chunk for status displays and tests.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ChunkSnapshot {
    pub index: usize,
    pub range: ChunkRange,
    pub status: ChunkStatus,
    pub retries: u32,
}

#[derive(Debug)]
pub(crate) struct ChunkUnit {
    file: Weak<FileSource>,
    index: usize,
    range: ChunkRange,
    file_size: u64,
    tested: bool,
    retries: u32,
    /// Bumped whenever a request or retry wait starts or is aborted; a
    /// worker whose sequence number is stale drops its result.
    seq: u64,
    /// Present once a request was issued; kept after its response arrives.
    request: Option<CancellationToken>,
    pending_retry: Option<CancellationToken>,
    loaded: Arc<AtomicU64>,
    outcome: Option<Outcome>,
}

impl ChunkUnit {
    pub fn new(file: Weak<FileSource>, index: usize, range: ChunkRange, file_size: u64) -> Self {
        Self {
            file,
            index,
            range,
            file_size,
            tested: false,
            retries: 0,
            seq: 0,
            request: None,
            pending_retry: None,
            loaded: Arc::new(AtomicU64::new(0)),
            outcome: None,
        }
    }

    pub fn index(&self) -> usize {
        self.index
    }

    pub fn range(&self) -> ChunkRange {
        self.range
    }

    pub fn retries(&self) -> u32 {
        self.retries
    }

    pub fn tested(&self) -> bool {
        self.tested
    }

    pub fn seq(&self) -> u64 {
        self.seq
    }

    pub fn is_current(&self, seq: u64) -> bool {
        self.seq == seq
    }

    pub fn source(&self) -> Option<Arc<FileSource>> {
        self.file.upgrade()
    }

    pub fn loaded_counter(&self) -> Arc<AtomicU64> {
        Arc::clone(&self.loaded)
    }

    pub fn mark_tested(&mut self) {
        self.tested = true;
    }

    /// Start a probe or send. Clears the previous outcome.
    pub fn begin_request(&mut self) -> CancellationToken {
        self.seq += 1;
        self.outcome = None;
        self.pending_retry = None;
        self.loaded.store(0, Ordering::Relaxed);
        let token = CancellationToken::new();
        self.request = Some(token.clone());
        token
    }

    /// Enter the retry delay. Reports `Uploading` until the wait ends.
    pub fn begin_retry_wait(&mut self) -> CancellationToken {
        self.seq += 1;
        let token = CancellationToken::new();
        self.pending_retry = Some(token.clone());
        token
    }

    pub fn record(&mut self, outcome: Outcome) {
        self.outcome = Some(outcome);
    }

    /// Count one re-send.
    pub fn bump_retries(&mut self) -> u32 {
        self.retries += 1;
        self.retries
    }

    /// Cancel any request or retry wait; the chunk reports `Pending` after.
    pub fn abort(&mut self) {
        self.seq += 1;
        if let Some(token) = self.request.take() {
            token.cancel();
        }
        if let Some(token) = self.pending_retry.take() {
            token.cancel();
        }
        self.outcome = None;
        self.loaded.store(0, Ordering::Relaxed);
    }

    pub fn status(&self, policy: &RetryPolicy) -> ChunkStatus {
        if self.pending_retry.is_some() {
            return ChunkStatus::Uploading;
        }
        if self.request.is_none() {
            return ChunkStatus::Pending;
        }
        match &self.outcome {
            None => ChunkStatus::Uploading,
            Some(outcome) => match classify(policy, outcome, self.retries) {
                Verdict::Success => ChunkStatus::Success,
                Verdict::Error => ChunkStatus::Error,
                Verdict::Transient => ChunkStatus::Pending,
            },
        }
    }

    /// Progress in `[0, 1]`; with `relative`, scaled to this chunk's share
    /// of the whole file.
    pub fn progress(&self, relative: bool, policy: &RetryPolicy) -> f64 {
        if self.pending_retry.is_some() {
            return 0.0;
        }
        let len = self.range.len();
        let mut factor = if relative && self.file_size > 0 {
            len as f64 / self.file_size as f64
        } else {
            1.0
        };
        // Never report 100% before the server has answered.
        if self.outcome.is_none() {
            factor *= 0.95;
        }
        match self.status(policy) {
            ChunkStatus::Success | ChunkStatus::Error => factor,
            ChunkStatus::Pending => 0.0,
            ChunkStatus::Uploading if len == 0 => 0.0,
            ChunkStatus::Uploading => {
                let loaded = self.loaded.load(Ordering::Relaxed).min(len);
                loaded as f64 / len as f64 * factor
            }
        }
    }

    pub fn snapshot(&self, policy: &RetryPolicy) -> ChunkSnapshot {
        ChunkSnapshot {
            index: self.index,
            range: self.range,
            status: self.status(policy),
            retries: self.retries,
        }
    }
}
