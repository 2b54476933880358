//! Retry policy and outcome classification.
//!
//! Decides whether a chunk outcome is a success, a final error, or a
//! transient condition that is re-sent on a flat cadence (no backoff).

mod classify;
mod policy;

pub use classify::{classify, Outcome, Verdict};
pub use policy::{RetryDecision, RetryPolicy};
