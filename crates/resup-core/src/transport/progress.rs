//! Throttled upload progress reporting.

use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Arc;
use std::time::{Duration, Instant};

type Notify = Box<dyn Fn() + Send + Sync>;

/// Receives bytes-sent updates from a transport.
///
/// Every update is stored in the chunk's loaded-bytes counter; the notify
/// callback runs at most once per throttle interval.
#[derive(Clone)]
pub struct ProgressSink {
    inner: Arc<SinkInner>,
}

struct SinkInner {
    loaded: Arc<AtomicU64>,
    interval_ms: u64,
    started: Instant,
    last_emit_ms: AtomicU64,
    notify: Notify,
}

impl ProgressSink {
    pub fn new(
        loaded: Arc<AtomicU64>,
        interval: Duration,
        notify: impl Fn() + Send + Sync + 'static,
    ) -> Self {
        Self {
            inner: Arc::new(SinkInner {
                loaded,
                interval_ms: interval.as_millis() as u64,
                started: Instant::now(),
                last_emit_ms: AtomicU64::new(0),
                notify: Box::new(notify),
            }),
        }
    }

    /// Record `bytes_sent` for the current request.
    pub fn report(&self, bytes_sent: u64) {
        let inner = &self.inner;
        inner.loaded.store(bytes_sent, Ordering::Relaxed);

        let now_ms = inner.started.elapsed().as_millis() as u64;
        let last = inner.last_emit_ms.load(Ordering::Relaxed);
        if now_ms.saturating_sub(last) < inner.interval_ms {
            return;
        }
        if inner
            .last_emit_ms
            .compare_exchange(last, now_ms, Ordering::AcqRel, Ordering::Relaxed)
            .is_ok()
        {
            (inner.notify)();
        }
    }

    pub fn loaded(&self) -> u64 {
        self.inner.loaded.load(Ordering::Relaxed)
    }
}

impl std::fmt::Debug for ProgressSink {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("ProgressSink")
            .field("loaded", &self.loaded())
            .field("interval_ms", &self.inner.interval_ms)
            .finish()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::atomic::AtomicUsize;

    #[test]
    fn report_updates_loaded_counter() {
        let loaded = Arc::new(AtomicU64::new(0));
        let sink = ProgressSink::new(Arc::clone(&loaded), Duration::from_secs(60), || {});
        sink.report(10);
        sink.report(42);
        assert_eq!(loaded.load(Ordering::Relaxed), 42);
        assert_eq!(sink.loaded(), 42);
    }

    #[test]
    fn notify_is_throttled() {
        let calls = Arc::new(AtomicUsize::new(0));
        let c = Arc::clone(&calls);
        let sink = ProgressSink::new(
            Arc::new(AtomicU64::new(0)),
            Duration::from_secs(60),
            move || {
                c.fetch_add(1, Ordering::Relaxed);
            },
        );
        for n in 0..100 {
            sink.report(n);
        }
        assert_eq!(calls.load(Ordering::Relaxed), 0, "interval not yet elapsed");
    }

    #[test]
    fn zero_interval_notifies_every_report() {
        let calls = Arc::new(AtomicUsize::new(0));
        let c = Arc::clone(&calls);
        let sink = ProgressSink::new(Arc::new(AtomicU64::new(0)), Duration::ZERO, move || {
            c.fetch_add(1, Ordering::Relaxed);
        });
        sink.report(1);
        sink.report(2);
        assert!(calls.load(Ordering::Relaxed) >= 1);
    }
}
