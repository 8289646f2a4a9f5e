//! Retry policy and inter-retry backoff.

use std::time::Duration;

/// Default number of retries after the first failed attempt.
pub const DEFAULT_MAX_RETRIES: u32 = 2;

/// Exponential backoff configuration.
#[derive(Debug, Clone, PartialEq)]
pub struct BackoffPolicy {
    /// Base delay for first retry.
    pub base: Duration,

    /// Maximum delay.
    pub max: Duration,

    /// Jitter factor (0.0 to 1.0).
    pub jitter: f64,
}

impl Default for BackoffPolicy {
    fn default() -> Self {
        Self {
            base: Duration::from_millis(500),
            max: Duration::from_secs(30),
            jitter: 0.25,
        }
    }
}

impl BackoffPolicy {
    /// Backoff that never waits.
    pub fn none() -> Self {
        Self {
            base: Duration::ZERO,
            max: Duration::ZERO,
            jitter: 0.0,
        }
    }

    /// Calculate delay for the given retry number (0 for the first retry).
    pub fn delay(&self, retry: u32) -> Duration {
        if self.base.is_zero() {
            return Duration::ZERO;
        }

        let delay = self.base.as_millis() as f64 * 2.0_f64.powi(retry.min(32) as i32);
        let delay = delay.min(self.max.as_millis() as f64);

        let jitter_range = delay * self.jitter.clamp(0.0, 1.0);
        let jitter = if jitter_range > 0.0 {
            (rand::random::<f64>() * 2.0 - 1.0) * jitter_range
        } else {
            0.0
        };

        Duration::from_millis((delay + jitter).max(0.0) as u64)
    }
}

/// Retry policy injected into each retry runner.
#[derive(Debug, Clone, PartialEq)]
pub struct RetryPolicy {
    /// Retries allowed after the first failure. Total attempts = budget + 1.
    pub budget: u32,

    /// Delay between a failure and the next attempt.
    pub backoff: BackoffPolicy,
}

impl Default for RetryPolicy {
    fn default() -> Self {
        Self {
            budget: DEFAULT_MAX_RETRIES,
            backoff: BackoffPolicy::default(),
        }
    }
}

impl RetryPolicy {
    /// Policy with the given budget and no delay between attempts.
    pub fn immediate(budget: u32) -> Self {
        Self {
            budget,
            backoff: BackoffPolicy::none(),
        }
    }
}
