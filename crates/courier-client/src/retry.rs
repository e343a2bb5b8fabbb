//! Bounded exponential backoff for transient transport failures.

use std::time::Duration;

use courier_config::Config;

/// How many times, and how patiently, a dispatch is retried.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct RetryPolicy {
    max_attempts: u32,
    initial_backoff: Duration,
    max_backoff: Duration,
}

impl RetryPolicy {
    /// Builds a policy; `max_attempts` counts the first attempt and is
    /// raised to one when zero.
    #[must_use]
    pub fn new(max_attempts: u32, initial_backoff: Duration, max_backoff: Duration) -> Self {
        Self {
            max_attempts: max_attempts.max(1),
            initial_backoff,
            max_backoff,
        }
    }

    /// A policy that never retries.
    #[must_use]
    pub const fn no_retry() -> Self {
        Self {
            max_attempts: 1,
            initial_backoff: Duration::ZERO,
            max_backoff: Duration::ZERO,
        }
    }

    /// Reads the retry settings from configuration.
    #[must_use]
    pub fn from_config(config: &Config) -> Self {
        Self::new(
            config.max_attempts(),
            config.initial_backoff(),
            config.max_backoff(),
        )
    }

    /// Total attempts allowed, the first one included.
    #[must_use]
    pub const fn max_attempts(&self) -> u32 {
        self.max_attempts
    }

    /// Delay to wait after the given failed attempt (1-based).
    ///
    /// The first retry waits the initial backoff, each later one twice the
    /// previous delay, never more than the cap.
    #[must_use]
    pub fn backoff(&self, failed_attempt: u32) -> Duration {
        let mut delay = self.initial_backoff;
        for _ in 1..failed_attempt {
            if delay >= self.max_backoff {
                break;
            }
            delay = delay.checked_mul(2).unwrap_or(self.max_backoff);
        }
        delay.min(self.max_backoff)
    }
}

impl Default for RetryPolicy {
    fn default() -> Self {
        Self::from_config(&Config::default())
    }
}
