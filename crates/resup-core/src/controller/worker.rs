//! Fixed-size worker pool.
//!
//! `upload()` spawns `simultaneous_uploads` workers. Each repeatedly takes
//! the next pending chunk in registration order and drives it to an end;
//! there is no queue beyond that scan order. A worker only ever holds one
//! chunk, so at most N chunks are in flight.

use tokio::task::JoinSet;

use crate::chunk::run::{self, ChunkTicket, Step};
use crate::chunk::ChunkStatus;
use crate::events::UploadEvent;

use super::registry::Registry;
use super::UploadController;

/// Result of one scheduling step.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum NextChunk {
    /// A chunk was processed and ended in this status.
    Uploaded(ChunkStatus),
    /// The chunk picked was aborted, cancelled, or its plan rebuilt.
    Aborted,
    /// Every file is complete.
    Complete,
    /// Nothing pending right now; other in-flight chunks are still running.
    Idle,
}

/// Result of `upload()`.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum UploadOutcome {
    /// A batch is already running; nothing was started.
    AlreadyUploading,
    /// The worker pool ran until it had nothing left to do.
    Finished,
}

enum Pick {
    Job(ChunkTicket, Step),
    Finished(NextChunk),
    /// The worker's batch was paused or superseded.
    Stale,
}

impl UploadController {
    /// Start the worker pool and wait for it to drain.
    pub async fn upload(&self) -> UploadOutcome {
        let Some(epoch) = self.begin_batch() else {
            tracing::debug!("upload already in progress");
            return UploadOutcome::AlreadyUploading;
        };
        let workers = self.shared.settings.config.simultaneous_uploads;
        tracing::info!(workers, "upload start");
        self.shared.settings.events.fire(UploadEvent::UploadStart);

        let mut pool = JoinSet::new();
        for worker in 0..workers {
            let controller = self.clone();
            pool.spawn(async move { controller.work(worker, epoch).await });
        }
        while let Some(joined) = pool.join_next().await {
            if let Err(e) = joined {
                tracing::warn!(error = %e, "upload worker failed");
            }
        }
        UploadOutcome::Finished
    }

    /// Pick the next pending chunk anywhere and run it, or report that
    /// nothing is pending. Fires `complete` the first time every file is
    /// complete in the current batch.
    pub async fn upload_next_chunk(&self) -> NextChunk {
        self.next_chunk(None).await.unwrap_or(NextChunk::Idle)
    }

    fn begin_batch(&self) -> Option<u64> {
        let mut registry = self.shared.lock();
        if registry.is_uploading() {
            return None;
        }
        registry.batch.epoch += 1;
        registry.batch.complete_fired = false;
        Some(registry.batch.epoch)
    }

    async fn work(&self, worker: usize, epoch: u64) {
        let mut chunks = 0usize;
        loop {
            match self.next_chunk(Some(epoch)).await {
                Some(NextChunk::Uploaded(_)) => chunks += 1,
                Some(NextChunk::Aborted) => {}
                Some(NextChunk::Complete) | Some(NextChunk::Idle) | None => break,
            }
        }
        tracing::debug!(worker, chunks, "worker done");
    }

    /// `None` when `epoch` no longer matches the running batch.
    async fn next_chunk(&self, epoch: Option<u64>) -> Option<NextChunk> {
        let (ticket, step) = match self.pick(epoch) {
            Pick::Job(ticket, step) => (ticket, step),
            Pick::Finished(next) => return Some(next),
            Pick::Stale => return None,
        };
        Some(match run::drive(&self.shared, ticket, step).await {
            Some(status) => NextChunk::Uploaded(status),
            None => NextChunk::Aborted,
        })
    }

    fn pick(&self, epoch: Option<u64>) -> Pick {
        let mut registry = self.shared.lock();
        if epoch.is_some_and(|e| e != registry.batch.epoch) {
            return Pick::Stale;
        }
        match registry.next_job() {
            Some((ticket, step)) => Pick::Job(ticket, step),
            None => Pick::Finished(self.finish_scan(&mut registry)),
        }
    }

    fn finish_scan(&self, registry: &mut Registry) -> NextChunk {
        if !registry.all_complete() {
            return NextChunk::Idle;
        }
        if !registry.batch.complete_fired {
            registry.batch.complete_fired = true;
            tracing::info!(files = registry.files.len(), "upload complete");
            self.shared.settings.events.fire(UploadEvent::Complete);
        }
        NextChunk::Complete
    }
}
