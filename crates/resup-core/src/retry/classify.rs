//! Classify chunk request outcomes for the status derivation.

use crate::transport::{ChunkResponse, TransportError};

use super::policy::RetryPolicy;

/// What came back from the last request of a chunk.
#[derive(Debug)]
pub enum Outcome {
    /// The server answered with a status code.
    Response(ChunkResponse),
    /// The request never produced a status (timeout, connection reset, ...).
    Failed(TransportError),
}

impl Outcome {
    /// Informational text surfaced to listeners.
    pub fn message(&self) -> String {
        match self {
            Outcome::Response(r) => r.body.clone(),
            Outcome::Failed(e) => e.to_string(),
        }
    }
}

/// Classification of an outcome.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Verdict {
    Success,
    /// Permanent status, or retries exhausted.
    Error,
    /// Anything else: reset and send again.
    Transient,
}

/// Classify an outcome given the number of re-sends already spent.
///
/// Transport failures carry no status, so they are never permanent; they
/// only become an error once retries are exhausted.
pub fn classify(policy: &RetryPolicy, outcome: &Outcome, retries: u32) -> Verdict {
    match outcome {
        Outcome::Response(r) if policy.is_success(r.status) => Verdict::Success,
        Outcome::Response(r) if policy.is_permanent(r.status) => Verdict::Error,
        _ if policy.exhausted(retries) => Verdict::Error,
        _ => Verdict::Transient,
    }
}
