//! Retry policies: how many times to resubmit, and how long to wait between
//! attempts.

use std::time::Duration;

use rand::Rng;
use serde::{Deserialize, Serialize};

/// Pluggable backoff consumed by the transaction coordinator and the
/// retry-loop wrappers.
pub trait RetryPolicy: Send + Sync {
    /// Default retry budget for loops that do not take an explicit one.
    fn retries(&self) -> u32;

    /// Delay before retry number `attempt`, counting from zero.
    ///
    /// The index comes from the caller's loop, whose budget may differ from
    /// [`retries`](Self::retries).
    fn delay_for_attempt(&self, attempt: u32) -> Duration;
}

/// Exponential backoff with an upper bound and optional jitter.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct ExponentialBackoff {
    pub retries: u32,
    pub base_delay_ms: u64,
    pub max_delay_ms: u64,
    pub multiplier: u32,
    /// Randomize each delay into the upper half of its range.
    pub jitter: bool,
}

impl Default for ExponentialBackoff {
    fn default() -> Self {
        Self {
            retries: 5,
            base_delay_ms: 50,
            max_delay_ms: 2_000,
            multiplier: 2,
            jitter: true,
        }
    }
}

impl ExponentialBackoff {
    /// Zero-delay retries.
    pub fn none(retries: u32) -> Self {
        Self {
            retries,
            base_delay_ms: 0,
            max_delay_ms: 0,
            multiplier: 1,
            jitter: false,
        }
    }

    pub fn with_retries(mut self, retries: u32) -> Self {
        self.retries = retries;
        self
    }

    pub fn with_base_delay_ms(mut self, base_delay_ms: u64) -> Self {
        self.base_delay_ms = base_delay_ms;
        self
    }

    pub fn with_max_delay_ms(mut self, max_delay_ms: u64) -> Self {
        self.max_delay_ms = max_delay_ms;
        self
    }

    pub fn with_jitter(mut self, jitter: bool) -> Self {
        self.jitter = jitter;
        self
    }

    /// Un-jittered delay for the zero-based attempt number.
    fn ceiling_ms(&self, attempt: u32) -> u64 {
        // Saturate rather than overflow on large attempt numbers.
        let factor = u64::from(self.multiplier).saturating_pow(attempt.min(63));
        self.base_delay_ms
            .saturating_mul(factor)
            .min(self.max_delay_ms)
    }
}

impl RetryPolicy for ExponentialBackoff {
    fn retries(&self) -> u32 {
        self.retries
    }

    fn delay_for_attempt(&self, attempt: u32) -> Duration {
        let ceiling = self.ceiling_ms(attempt);
        if !self.jitter || ceiling < 2 {
            return Duration::from_millis(ceiling);
        }
        let half = ceiling / 2;
        Duration::from_millis(half + rand::thread_rng().gen_range(0..=ceiling - half))
    }
}
