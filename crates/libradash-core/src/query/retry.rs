// ── Retry policy ──
//
// Pluggable backoff consulted by the executor. Only transient errors
// (network failure, timeout, HTTP 5xx) are ever retried; 4xx and local
// errors propagate on the first attempt.

use std::time::Duration;

use crate::error::CoreError;

/// Delay strategy between attempts.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Backoff {
    Constant(Duration),
    Exponential {
        base: Duration,
        factor: u32,
        max: Duration,
    },
}

/// Maximum attempts plus backoff. `max_attempts` counts the initial
/// attempt, so `1` means no retries.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct RetryPolicy {
    pub max_attempts: u32,
    pub backoff: Backoff,
}

impl RetryPolicy {
    /// Single attempt, no retries.
    pub fn none() -> Self {
        Self {
            max_attempts: 1,
            backoff: Backoff::Constant(Duration::ZERO),
        }
    }

    pub fn constant(max_attempts: u32, delay: Duration) -> Self {
        Self {
            max_attempts,
            backoff: Backoff::Constant(delay),
        }
    }

    pub fn exponential(max_attempts: u32, base: Duration) -> Self {
        Self {
            max_attempts,
            backoff: Backoff::Exponential {
                base,
                factor: 2,
                max: Duration::from_secs(30),
            },
        }
    }

    /// Whether to retry after the given failed attempt (1-based).
    pub fn should_retry(&self, error: &CoreError, attempt: u32) -> bool {
        attempt < self.max_attempts && error.is_transient()
    }

    /// Delay before the attempt following `attempt` (1-based).
    pub fn delay_for(&self, attempt: u32) -> Duration {
        match &self.backoff {
            Backoff::Constant(delay) => *delay,
            Backoff::Exponential { base, factor, max } => {
                // Cap the exponent; beyond this the cap dominates anyway.
                let exp = attempt.saturating_sub(1).min(16);
                base.saturating_mul(factor.saturating_pow(exp)).min(*max)
            }
        }
    }
}

impl Default for RetryPolicy {
    fn default() -> Self {
        Self::exponential(3, Duration::from_millis(500))
    }
}
