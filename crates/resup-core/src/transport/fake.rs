//! Scripted in-memory transport for unit tests.
//!
//! Stores accepted chunks like a server would, answers probes from that
//! store, replays scripted statuses per chunk, can hold requests in flight
//! behind a gate, and tracks the in-flight high-water mark.

use std::collections::{BTreeMap, HashMap, VecDeque};
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::{Arc, Mutex};
use std::time::Duration;

use tokio::sync::watch;

use crate::config::ParameterNames;

use super::{
    ChunkResponse, ProbeRequest, ProgressSink, SendRequest, Transport, TransportError,
    TransportFuture,
};

type ChunkKey = (String, u64);

#[derive(Default)]
struct FakeState {
    stored: BTreeMap<ChunkKey, Vec<u8>>,
    scripts: HashMap<ChunkKey, VecDeque<u16>>,
    always: HashMap<String, u16>,
    failures: HashMap<ChunkKey, usize>,
    probes: Vec<ChunkKey>,
    sends: Vec<ChunkKey>,
    headers: Vec<Vec<(String, String)>>,
}

pub(crate) struct FakeTransport {
    names: ParameterNames,
    state: Mutex<FakeState>,
    delay: Duration,
    gate: watch::Sender<bool>,
    in_flight: AtomicUsize,
    max_in_flight: AtomicUsize,
}

impl FakeTransport {
    pub(crate) fn new() -> Arc<Self> {
        Self::with_delay(Duration::from_millis(1))
    }

    pub(crate) fn with_delay(delay: Duration) -> Arc<Self> {
        let (gate, _) = watch::channel(true);
        Arc::new(Self {
            names: ParameterNames::default(),
            state: Mutex::new(FakeState::default()),
            delay,
            gate,
            in_flight: AtomicUsize::new(0),
            max_in_flight: AtomicUsize::new(0),
        })
    }

    /// Mark a chunk (1-based number) as already present on the server.
    pub(crate) fn preload(&self, identifier: &str, number: u64) {
        self.lock()
            .stored
            .insert((identifier.to_string(), number), Vec::new());
    }

    /// Statuses returned, in order, for sends of one chunk; 200 afterwards.
    pub(crate) fn script(&self, identifier: &str, number: u64, statuses: &[u16]) {
        self.lock()
            .scripts
            .insert((identifier.to_string(), number), statuses.iter().copied().collect());
    }

    /// Every send for the file returns `status`.
    pub(crate) fn always(&self, identifier: &str, status: u16) {
        self.lock().always.insert(identifier.to_string(), status);
    }

    /// The next `count` sends of a chunk fail without a response.
    pub(crate) fn drop_connection(&self, identifier: &str, number: u64, count: usize) {
        self.lock()
            .failures
            .insert((identifier.to_string(), number), count);
    }

    pub(crate) fn clear_scripts(&self) {
        let mut state = self.lock();
        state.scripts.clear();
        state.always.clear();
        state.failures.clear();
    }

    pub(crate) fn close_gate(&self) {
        self.gate.send_replace(false);
    }

    pub(crate) fn open_gate(&self) {
        self.gate.send_replace(true);
    }

    pub(crate) fn in_flight(&self) -> usize {
        self.in_flight.load(Ordering::SeqCst)
    }

    pub(crate) fn max_in_flight(&self) -> usize {
        self.max_in_flight.load(Ordering::SeqCst)
    }

    pub(crate) fn sends(&self) -> Vec<ChunkKey> {
        self.lock().sends.clone()
    }

    pub(crate) fn sends_of(&self, identifier: &str, number: u64) -> usize {
        self.lock()
            .sends
            .iter()
            .filter(|(id, n)| id == identifier && *n == number)
            .count()
    }

    pub(crate) fn probes(&self) -> Vec<ChunkKey> {
        self.lock().probes.clone()
    }

    pub(crate) fn last_headers(&self) -> Option<Vec<(String, String)>> {
        self.lock().headers.last().cloned()
    }

    /// Concatenation of the stored chunks of a file, in chunk order.
    pub(crate) fn assembled(&self, identifier: &str) -> Vec<u8> {
        self.lock()
            .stored
            .iter()
            .filter(|((id, _), _)| id == identifier)
            .flat_map(|(_, bytes)| bytes.iter().copied())
            .collect()
    }

    pub(crate) fn stored_chunks(&self, identifier: &str) -> usize {
        self.lock()
            .stored
            .keys()
            .filter(|(id, _)| id == identifier)
            .count()
    }

    fn lock(&self) -> std::sync::MutexGuard<'_, FakeState> {
        self.state.lock().unwrap()
    }

    /// Wait for the gate, count the request in flight, then simulate latency.
    /// The returned guard is live during the delay, so a request dropped
    /// mid-delay still leaves.
    async fn enter(&self) -> Leave<'_> {
        let mut gate = self.gate.subscribe();
        let _ = gate.wait_for(|open| *open).await;
        let now = self.in_flight.fetch_add(1, Ordering::SeqCst) + 1;
        self.max_in_flight.fetch_max(now, Ordering::SeqCst);
        let leave = Leave(self);
        tokio::time::sleep(self.delay).await;
        leave
    }

    fn leave(&self) {
        self.in_flight.fetch_sub(1, Ordering::SeqCst);
    }

    fn key(&self, identifier: Option<&str>, number: Option<&str>) -> ChunkKey {
        (
            identifier.unwrap_or_default().to_string(),
            number.and_then(|n| n.parse().ok()).unwrap_or(0),
        )
    }
}

/// Decrements the in-flight count on drop.
struct Leave<'a>(&'a FakeTransport);

impl Drop for Leave<'_> {
    fn drop(&mut self) {
        self.0.leave();
    }
}

impl Transport for FakeTransport {
    fn probe(&self, request: ProbeRequest) -> TransportFuture<'_> {
        Box::pin(async move {
            let _leave = self.enter().await;
            let key = self.key(
                request.param(&self.names.identifier),
                request.param(&self.names.chunk_number),
            );
            let mut state = self.lock();
            state.probes.push(key.clone());
            let status = if state.stored.contains_key(&key) { 200 } else { 404 };
            Ok(ChunkResponse {
                status,
                body: String::new(),
            })
        })
    }

    fn send(&self, request: SendRequest, progress: ProgressSink) -> TransportFuture<'_> {
        Box::pin(async move {
            let _leave = self.enter().await;
            let key = self.key(
                request.param(&self.names.identifier),
                request.param(&self.names.chunk_number),
            );
            progress.report(request.payload.len() as u64);

            let mut state = self.lock();
            state.sends.push(key.clone());
            state.headers.push(request.headers.clone());
            if let Some(left) = state.failures.get_mut(&key) {
                if *left > 0 {
                    *left -= 1;
                    return Err(TransportError::Connection("reset by peer".into()));
                }
            }
            let scripted = state.scripts.get_mut(&key).and_then(|q| q.pop_front());
            let status = scripted
                .or_else(|| state.always.get(&key.0).copied())
                .unwrap_or(200);
            if status == 200 || status == 201 {
                state.stored.insert(key, request.payload);
            }
            Ok(ChunkResponse {
                status,
                body: format!("status {status}"),
            })
        })
    }
}
