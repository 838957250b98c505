//! Retry delay computation.
//!
//! `delay = min(max_delay, base_delay * 2^attempts + jitter)` with jitter
//! drawn uniformly from `[0, max_jitter)` on every call.

use rand::Rng;

use crate::config::BackoffConfig;

/// Default delay before the first retry.
pub const DEFAULT_BASE_DELAY_MS: u64 = 2_000;
/// Default ceiling on any single delay.
pub const DEFAULT_MAX_DELAY_MS: u64 = 300_000;
/// Default upper bound (exclusive) of the random jitter.
pub const DEFAULT_MAX_JITTER_MS: u64 = 1_000;

/// Exponential backoff with additive jitter.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Backoff {
    pub base_delay_ms: u64,
    pub max_delay_ms: u64,
    pub max_jitter_ms: u64,
}

impl Default for Backoff {
    fn default() -> Self {
        Self {
            base_delay_ms: DEFAULT_BASE_DELAY_MS,
            max_delay_ms: DEFAULT_MAX_DELAY_MS,
            max_jitter_ms: DEFAULT_MAX_JITTER_MS,
        }
    }
}

impl From<&BackoffConfig> for Backoff {
    fn from(config: &BackoffConfig) -> Self {
        Self {
            base_delay_ms: config.base_delay_ms,
            max_delay_ms: config.max_delay_ms,
            max_jitter_ms: config.max_jitter_ms,
        }
    }
}

impl Backoff {
    /// Delay for the given attempt count with an explicit jitter value.
    #[must_use]
    pub const fn delay_with_jitter(&self, attempts: u32, jitter_ms: u64) -> u64 {
        let exponential = self.base_delay_ms.saturating_mul(2_u64.saturating_pow(attempts));
        let delay = exponential.saturating_add(jitter_ms);
        if delay < self.max_delay_ms {
            delay
        } else {
            self.max_delay_ms
        }
    }

    /// Delay for the given attempt count, with fresh jitter.
    #[must_use]
    pub fn delay_for_attempt(&self, attempts: u32) -> u64 {
        self.delay_with_jitter(attempts, self.draw_jitter())
    }

    /// Absolute time (epoch ms) of the next attempt after `attempts` failures.
    #[must_use]
    pub fn next_attempt_at(&self, now_ms: i64, attempts: u32) -> i64 {
        let delay = i64::try_from(self.delay_for_attempt(attempts)).unwrap_or(i64::MAX);
        now_ms.saturating_add(delay)
    }

    fn draw_jitter(&self) -> u64 {
        if self.max_jitter_ms == 0 {
            return 0;
        }
        rand::thread_rng().gen_range(0..self.max_jitter_ms)
    }
}
