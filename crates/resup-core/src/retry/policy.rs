use std::time::Duration;

use crate::config::UploadConfig;

/// Decision returned by the retry policy after a transient outcome.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum RetryDecision {
    /// Re-send right away.
    Immediate,
    /// Re-send after the given delay.
    After(Duration),
}

/// Flat retry policy: bounded re-sends, fixed delay, permanent status set.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct RetryPolicy {
    /// Re-sends allowed before a transient outcome becomes an error.
    pub max_retries: u32,
    /// Delay before each re-send (None = immediate).
    pub interval: Option<Duration>,
    /// Status codes that end a chunk without retry.
    pub permanent: Vec<u16>,
}

impl Default for RetryPolicy {
    fn default() -> Self {
        Self::from_config(&UploadConfig::default())
    }
}

impl RetryPolicy {
    pub fn from_config(cfg: &UploadConfig) -> Self {
        Self {
            max_retries: cfg.max_chunk_retries,
            interval: cfg.retry_interval(),
            permanent: cfg.permanent_errors.clone(),
        }
    }

    pub fn is_success(&self, status: u16) -> bool {
        status == 200 || status == 201
    }

    pub fn is_permanent(&self, status: u16) -> bool {
        self.permanent.contains(&status)
    }

    /// True once `retries` re-sends have been spent.
    pub fn exhausted(&self, retries: u32) -> bool {
        retries >= self.max_retries
    }

    /// Cadence for the next re-send. Never escalates.
    pub fn decide(&self) -> RetryDecision {
        match self.interval {
            Some(d) if !d.is_zero() => RetryDecision::After(d),
            _ => RetryDecision::Immediate,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn defaults_follow_config() {
        let p = RetryPolicy::default();
        assert_eq!(p.max_retries, 100);
        assert!(p.interval.is_none());
        assert!(p.is_permanent(415));
        assert!(!p.is_permanent(503));
    }

    #[test]
    fn cadence_is_flat() {
        let mut p = RetryPolicy::default();
        assert_eq!(p.decide(), RetryDecision::Immediate);
        p.interval = Some(Duration::from_millis(200));
        assert_eq!(p.decide(), RetryDecision::After(Duration::from_millis(200)));
        assert_eq!(p.decide(), p.decide());
        p.interval = Some(Duration::ZERO);
        assert_eq!(p.decide(), RetryDecision::Immediate);
    }

    #[test]
    fn respects_max_retries() {
        let mut p = RetryPolicy::default();
        p.max_retries = 3;
        assert!(!p.exhausted(2));
        assert!(p.exhausted(3));
        assert!(p.exhausted(4));
    }
}
