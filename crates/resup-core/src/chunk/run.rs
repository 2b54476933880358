//! The async half of the chunk protocol.
//!
//! A worker drives one chunk through a sequence of [`Step`]s. Every state
//! transition happens under the registry lock and is only applied if the
//! chunk is still the one the worker started with (same file generation and
//! chunk sequence number); otherwise the step ends as `Aborted`. Network
//! requests, file reads and retry delays run with the lock released.

use std::sync::Arc;
use std::time::Duration;

use tokio_util::sync::CancellationToken;

use crate::controller::Shared;
use crate::events::UploadEvent;
use crate::file::{FileSource, FileUnit};
use crate::retry::{Outcome, RetryDecision};
use crate::transport::{
    ChunkResponse, ProbeRequest, ProgressSink, SendRequest, TransportError, TransportFuture,
};

use super::{request, ChunkEvent, ChunkRange, ChunkStatus};

/// Identifies the chunk a worker holds.
#[derive(Debug, Clone, PartialEq, Eq)]
pub(crate) struct ChunkTicket {
    pub file: String,
    pub generation: u64,
    pub index: usize,
    pub seq: u64,
}

pub(crate) struct SendJob {
    request: SendRequest,
    range: ChunkRange,
    source: Arc<FileSource>,
    progress: ProgressSink,
}

pub(crate) enum Step {
    Probe(ProbeRequest),
    Send(SendJob),
    Wait {
        delay: Duration,
        token: CancellationToken,
    },
    Done(ChunkStatus),
    Aborted,
}

/// Start work on the pending chunk `index`. Called with the registry locked,
/// so the chunk is `Uploading` before anyone else can scan it.
pub(crate) fn start(file: &mut FileUnit, index: usize) -> Option<(ChunkTicket, Step)> {
    let chunk = file.chunk(index)?;
    let probe = file.settings().config.test_chunks && !chunk.tested();
    let mut ticket = ChunkTicket {
        file: file.identifier().to_string(),
        generation: file.generation(),
        index,
        seq: 0,
    };
    let step = if probe {
        start_probe(file, &mut ticket)
    } else {
        start_send(file, &mut ticket)
    };
    Some((ticket, step))
}

/// Run a chunk to completion. `None` means the work was aborted, cancelled
/// or made obsolete by a rebuild of the file's chunk plan.
pub(crate) async fn drive(
    shared: &Shared,
    mut ticket: ChunkTicket,
    mut step: Step,
) -> Option<ChunkStatus> {
    loop {
        step = match step {
            Step::Done(status) => return Some(status),
            Step::Aborted => return None,
            Step::Probe(request) => {
                let cancel = request.cancel.clone();
                let timeout = request.timeout;
                let result = perform(&cancel, timeout, shared.transport.probe(request)).await;
                with_current(shared, &mut ticket, |file, ticket| {
                    after_probe(file, ticket, result)
                })
            }
            Step::Send(job) => send(shared, &mut ticket, job).await,
            Step::Wait { delay, token } => {
                let elapsed = tokio::select! {
                    _ = token.cancelled() => false,
                    _ = tokio::time::sleep(delay) => true,
                };
                if elapsed {
                    with_current(shared, &mut ticket, start_send)
                } else {
                    Step::Aborted
                }
            }
        };
    }
}

/// Apply `f` if the ticket still names a live chunk.
fn with_current(
    shared: &Shared,
    ticket: &mut ChunkTicket,
    f: impl FnOnce(&mut FileUnit, &mut ChunkTicket) -> Step,
) -> Step {
    let mut registry = shared.lock();
    let Some(file) = registry.current_file(&ticket.file, ticket.generation) else {
        return Step::Aborted;
    };
    let current = file
        .chunk(ticket.index)
        .is_some_and(|c| c.is_current(ticket.seq));
    if !current {
        return Step::Aborted;
    }
    f(file, ticket)
}

/// Await a transport request, giving up on abort or timeout.
async fn perform(
    cancel: &CancellationToken,
    timeout: Option<Duration>,
    request: TransportFuture<'_>,
) -> Result<ChunkResponse, TransportError> {
    let timed = async move {
        match timeout {
            Some(limit) => match tokio::time::timeout(limit, request).await {
                Ok(result) => result,
                Err(_) => {
                    // Stop a blocking transfer that outlives its future.
                    cancel.cancel();
                    Err(TransportError::Timeout)
                }
            },
            None => request.await,
        }
    };
    tokio::select! {
        _ = cancel.cancelled() => Err(TransportError::Aborted),
        result = timed => result,
    }
}

fn start_probe(file: &mut FileUnit, ticket: &mut ChunkTicket) -> Step {
    let settings = Arc::clone(file.settings());
    let total = file.total_chunks();
    let Some(chunk) = file.chunk_mut(ticket.index) else {
        return Step::Aborted;
    };
    let Some(source) = chunk.source() else {
        return Step::Aborted;
    };
    let cancel = chunk.begin_request();
    ticket.seq = chunk.seq();
    tracing::debug!(file = %ticket.file, chunk = ticket.index, "probe");
    Step::Probe(request::probe_request(
        &settings,
        source.meta(),
        chunk,
        total,
        cancel,
    ))
}

fn after_probe(
    file: &mut FileUnit,
    ticket: &mut ChunkTicket,
    result: Result<ChunkResponse, TransportError>,
) -> Step {
    let settings = Arc::clone(file.settings());
    let Some(chunk) = file.chunk_mut(ticket.index) else {
        return Step::Aborted;
    };
    chunk.mark_tested();
    match result {
        Ok(response) if settings.policy.is_success(response.status) => {
            tracing::debug!(file = %ticket.file, chunk = ticket.index, "chunk already on server");
            let message = response.body.clone();
            chunk.record(Outcome::Response(response));
            file.handle_chunk_event(ChunkEvent::Success(message));
            Step::Done(ChunkStatus::Success)
        }
        // Anything else means "not there yet"; the probe response is dropped.
        _ => start_send(file, ticket),
    }
}

fn start_send(file: &mut FileUnit, ticket: &mut ChunkTicket) -> Step {
    let settings = Arc::clone(file.settings());
    let total = file.total_chunks();
    let Some(chunk) = file.chunk_mut(ticket.index) else {
        return Step::Aborted;
    };
    let Some(source) = chunk.source() else {
        return Step::Aborted;
    };
    let cancel = chunk.begin_request();
    ticket.seq = chunk.seq();
    let request = request::send_request(&settings, source.meta(), chunk, total, cancel);
    let range = chunk.range();

    let events = settings.events.clone();
    let id = ticket.file.clone();
    let progress = ProgressSink::new(
        chunk.loaded_counter(),
        settings.config.progress_throttle(),
        move || events.fire(UploadEvent::FileProgress { file: id.clone() }),
    );
    tracing::debug!(
        file = %ticket.file,
        chunk = ticket.index,
        attempt = chunk.retries() + 1,
        "send"
    );
    file.handle_chunk_event(ChunkEvent::Progress);

    Step::Send(SendJob {
        request,
        range,
        source,
        progress,
    })
}

async fn send(shared: &Shared, ticket: &mut ChunkTicket, job: SendJob) -> Step {
    let SendJob {
        mut request,
        range,
        source,
        progress,
    } = job;
    let cancel = request.cancel.clone();

    let read = tokio::select! {
        _ = cancel.cancelled() => None,
        read = source.read_range(range) => Some(read),
    };
    let path = source.meta().path.clone();
    drop(source);
    match read {
        None => return Step::Aborted,
        Some(Ok(payload)) => request.payload = payload,
        Some(Err(e)) => {
            let message = format!("read {}: {e}", path.display());
            return with_current(shared, ticket, |file, _| {
                file.fail(message);
                Step::Done(ChunkStatus::Error)
            });
        }
    }

    let timeout = request.timeout;
    let result = perform(&cancel, timeout, shared.transport.send(request, progress)).await;
    with_current(shared, ticket, |file, ticket| after_send(file, ticket, result))
}

fn after_send(
    file: &mut FileUnit,
    ticket: &mut ChunkTicket,
    result: Result<ChunkResponse, TransportError>,
) -> Step {
    let settings = Arc::clone(file.settings());
    let index = ticket.index;
    let Some(chunk) = file.chunk_mut(index) else {
        return Step::Aborted;
    };
    let outcome = match result {
        Ok(response) => Outcome::Response(response),
        Err(e) => Outcome::Failed(e),
    };
    let message = outcome.message();
    let code = match &outcome {
        Outcome::Response(r) => Some(r.status),
        Outcome::Failed(_) => None,
    };
    chunk.record(outcome);
    let status = chunk.status(&settings.policy);
    tracing::debug!(
        file = %ticket.file,
        chunk = index,
        status = ?code,
        attempt = chunk.retries() + 1,
        result = ?status,
        "chunk response"
    );

    match status {
        ChunkStatus::Success => {
            file.handle_chunk_event(ChunkEvent::Success(message));
            Step::Done(ChunkStatus::Success)
        }
        ChunkStatus::Error => {
            file.handle_chunk_event(ChunkEvent::Error(message));
            Step::Done(ChunkStatus::Error)
        }
        ChunkStatus::Pending | ChunkStatus::Uploading => {
            file.handle_chunk_event(ChunkEvent::Retry(message));
            let Some(chunk) = file.chunk_mut(index) else {
                return Step::Aborted;
            };
            chunk.abort();
            chunk.bump_retries();
            match settings.policy.decide() {
                RetryDecision::After(delay) => {
                    let token = chunk.begin_retry_wait();
                    ticket.seq = chunk.seq();
                    Step::Wait { delay, token }
                }
                RetryDecision::Immediate => start_send(file, ticket),
            }
        }
    }
}
