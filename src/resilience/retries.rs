//! Retry policy for deposit attempts.
//!
//! # Responsibilities
//! - Provide the delay before the next attempt
//! - Enforce the optional retry cap and retry deadline
//!
//! # Design Decisions
//! - Fixed delay (1s) by default, no exponential growth: the target window
//!   opens at an unknown block and waiting longer only loses blocks
//! - Unbounded by default; a cap or deadline turns exhaustion into a fatal error

use std::time::Duration;
use tokio::time::Instant;

use crate::config::schema::RetryConfig;
use crate::resilience::backoff::jittered_delay;

/// Why a retry was refused.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum RetryRefusal {
    /// `max_retries` consecutive retries already happened.
    CountExhausted { retries: u32 },
    /// The retry window outlived the deadline.
    DeadlineExceeded { elapsed: Duration },
}

/// Retry settings for one task.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct RetryPolicy {
    pub delay_ms: u64,
    pub jitter_ms: u64,
    pub max_retries: Option<u32>,
    pub deadline: Option<Duration>,
}

impl Default for RetryPolicy {
    fn default() -> Self {
        Self::from_config(&RetryConfig::default())
    }
}

impl RetryPolicy {
    /// Build from the `[retry]` config section.
    pub fn from_config(config: &RetryConfig) -> Self {
        Self {
            delay_ms: config.delay_ms,
            jitter_ms: config.jitter_ms,
            max_retries: config.max_retries,
            deadline: config.deadline_secs.map(Duration::from_secs),
        }
    }

    /// Delay before the next attempt.
    pub fn delay(&self) -> Duration {
        jittered_delay(self.delay_ms, self.jitter_ms)
    }
}

/// Consecutive-retry bookkeeping for the attempt in progress.
#[derive(Debug, Default)]
pub struct RetryTracker {
    retries: u32,
    window_started: Option<Instant>,
}

impl RetryTracker {
    /// Record one more retry; refuse it if the policy is exhausted.
    pub fn record(&mut self, policy: &RetryPolicy) -> Result<u32, RetryRefusal> {
        let started = *self.window_started.get_or_insert_with(Instant::now);
        let next = self.retries + 1;

        if let Some(max) = policy.max_retries {
            if next > max {
                return Err(RetryRefusal::CountExhausted { retries: self.retries });
            }
        }

        if let Some(deadline) = policy.deadline {
            let elapsed = started.elapsed();
            if elapsed >= deadline {
                return Err(RetryRefusal::DeadlineExceeded { elapsed });
            }
        }

        self.retries = next;
        Ok(next)
    }

    /// Forget the current retry window after a successful submission.
    pub fn reset(&mut self) {
        self.retries = 0;
        self.window_started = None;
    }

    /// Retries recorded in the current window.
    pub fn count(&self) -> u32 {
        self.retries
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_default_policy_is_unbounded() {
        let policy = RetryPolicy::default();
        assert_eq!(policy.delay(), Duration::from_millis(1000));

        let mut tracker = RetryTracker::default();
        for expected in 1..=1000 {
            assert_eq!(tracker.record(&policy), Ok(expected));
        }
    }

    #[test]
    fn test_max_retries() {
        let policy = RetryPolicy {
            max_retries: Some(2),
            ..RetryPolicy::default()
        };
        let mut tracker = RetryTracker::default();
        assert_eq!(tracker.record(&policy), Ok(1));
        assert_eq!(tracker.record(&policy), Ok(2));
        assert_eq!(
            tracker.record(&policy),
            Err(RetryRefusal::CountExhausted { retries: 2 })
        );

        tracker.reset();
        assert_eq!(tracker.count(), 0);
        assert_eq!(tracker.record(&policy), Ok(1));
    }

    #[tokio::test(start_paused = true)]
    async fn test_deadline() {
        let policy = RetryPolicy {
            deadline: Some(Duration::from_secs(5)),
            ..RetryPolicy::default()
        };
        let mut tracker = RetryTracker::default();
        assert_eq!(tracker.record(&policy), Ok(1));

        tokio::time::sleep(Duration::from_secs(6)).await;
        assert!(matches!(
            tracker.record(&policy),
            Err(RetryRefusal::DeadlineExceeded { .. })
        ));
    }
}
