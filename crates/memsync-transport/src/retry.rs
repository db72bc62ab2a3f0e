//! Reconnect backoff

use std::time::Duration;

/// Exponential backoff applied between failed connection attempts
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct RetryPolicy {
    /// Retries after the first failure (0 = give up immediately)
    pub max_retries: u32,
    /// Delay before the first retry
    pub initial_delay: Duration,
    /// Upper bound on any single delay
    pub max_delay: Duration,
}

impl RetryPolicy {
    pub fn exponential() -> Self {
        Self {
            max_retries: 5,
            initial_delay: Duration::from_millis(100),
            max_delay: Duration::from_secs(30),
        }
    }

    pub fn no_retry() -> Self {
        Self {
            max_retries: 0,
            ..Self::exponential()
        }
    }

    pub fn with_max_retries(mut self, max_retries: u32) -> Self {
        self.max_retries = max_retries;
        self
    }

    pub fn with_initial_delay(mut self, delay: Duration) -> Self {
        self.initial_delay = delay;
        self
    }

    pub fn with_max_delay(mut self, delay: Duration) -> Self {
        self.max_delay = delay;
        self
    }

    /// Delay before retry number `retry` (0-based)
    pub fn delay_for(&self, retry: u32) -> Duration {
        let multiplier = 2u32.saturating_pow(retry);
        self.initial_delay
            .checked_mul(multiplier)
            .unwrap_or(self.max_delay)
            .min(self.max_delay)
    }

    /// Whether another retry is allowed after `retries` retries
    pub fn allows(&self, retries: u32) -> bool {
        retries < self.max_retries
    }
}

impl Default for RetryPolicy {
    fn default() -> Self {
        Self::exponential()
    }
}
