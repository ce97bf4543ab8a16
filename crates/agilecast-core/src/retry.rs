//! Retry policy with bounded attempts and linear backoff.

use std::time::Duration;

/// Backoff strategy between consecutive attempts.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Backoff {
    /// Delay grows with the number of failed attempts: `base * attempt`.
    Linear {
        /// Delay after the first failure.
        base: Duration,
    },
}

impl Default for Backoff {
    fn default() -> Self {
        Self::Linear {
            base: Duration::from_secs(1),
        }
    }
}

impl Backoff {
    /// Delay to wait after `failed_attempt` (1-based) before the next try.
    pub fn delay(self, failed_attempt: u32) -> Duration {
        match self {
            Self::Linear { base } => base.saturating_mul(failed_attempt.max(1)),
        }
    }
}

/// Configuration of the fetch retry loop.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct RetryConfig {
    /// Total attempts including the first one.
    pub max_attempts: u32,
    /// The backoff strategy to use between attempts.
    pub backoff: Backoff,
    /// Non-5xx statuses that are still treated as transient.
    pub retry_on_status: Vec<u16>,
}

impl Default for RetryConfig {
    fn default() -> Self {
        Self {
            max_attempts: 3,
            backoff: Backoff::default(),
            retry_on_status: vec![408, 429],
        }
    }
}

impl RetryConfig {
    pub fn linear(base: Duration, max_attempts: u32) -> Self {
        Self {
            max_attempts: max_attempts.max(1),
            backoff: Backoff::Linear { base },
            ..Self::default()
        }
    }

    /// Server errors and the configured extra statuses are transient.
    pub fn should_retry_status(&self, status: u16) -> bool {
        status >= 500 || self.retry_on_status.contains(&status)
    }

    pub fn delay_after_attempt(&self, failed_attempt: u32) -> Duration {
        self.backoff.delay(failed_attempt)
    }
}
