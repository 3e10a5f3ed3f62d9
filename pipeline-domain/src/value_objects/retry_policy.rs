// /////////////////////////////////////////////////////////////////////////////
// Reactive Pipeline Runtime
// SPDX-License-Identifier: BSD-3-Clause
// /////////////////////////////////////////////////////////////////////////////

//! Retry policy value object: bounded exponential backoff for
//! `TransientStepError` / transient `TransportError`.

use serde::{Deserialize, Serialize};
use std::time::Duration;

/// Bounded exponential backoff, applied by C10 only to locally recoverable
/// errors (`PipelineError::is_recoverable`).
#[derive(Debug, Clone, Copy, Eq, PartialEq, Serialize, Deserialize)]
pub struct RetryPolicy {
    pub max_attempts: u32,
    initial_backoff_ms: u64,
    max_backoff_ms: u64,
    multiplier_milli: u64,
}

impl RetryPolicy {
    pub fn new(max_attempts: u32, initial_backoff: Duration, max_backoff: Duration, multiplier: f64) -> Self {
        Self {
            max_attempts: max_attempts.max(1),
            initial_backoff_ms: initial_backoff.as_millis() as u64,
            max_backoff_ms: max_backoff.as_millis() as u64,
            multiplier_milli: (multiplier * 1000.0).round() as u64,
        }
    }

    pub fn none() -> Self {
        Self::new(1, Duration::from_millis(0), Duration::from_millis(0), 1.0)
    }

    /// Backoff to wait before the given 1-indexed attempt number, capped at
    /// `max_backoff_ms`.
    pub fn backoff_for_attempt(&self, attempt: u32) -> Duration {
        let mut ms = self.initial_backoff_ms;
        for _ in 1..attempt {
            ms = ms.saturating_mul(self.multiplier_milli) / 1000;
            if ms > self.max_backoff_ms {
                ms = self.max_backoff_ms;
                break;
            }
        }
        Duration::from_millis(ms.min(self.max_backoff_ms.max(ms)))
    }

    pub fn should_retry(&self, attempt: u32) -> bool {
        attempt < self.max_attempts
    }
}

impl Default for RetryPolicy {
    fn default() -> Self {
        Self::new(3, Duration::from_millis(50), Duration::from_secs(5), 2.0)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn single_attempt_policy_never_retries() {
        let p = RetryPolicy::none();
        assert!(!p.should_retry(1));
    }

    #[test]
    fn backoff_grows_but_is_capped() {
        let p = RetryPolicy::new(5, Duration::from_millis(10), Duration::from_millis(100), 2.0);
        assert_eq!(p.backoff_for_attempt(1), Duration::from_millis(10));
        assert!(p.backoff_for_attempt(4) <= Duration::from_millis(100));
        assert!(p.backoff_for_attempt(10) <= Duration::from_millis(100));
    }

    #[test]
    fn should_retry_respects_max_attempts() {
        let p = RetryPolicy::new(3, Duration::from_millis(1), Duration::from_millis(1), 1.0);
        assert!(p.should_retry(1));
        assert!(p.should_retry(2));
        assert!(!p.should_retry(3));
    }
}
