//! Jittered exponential backoff for background loops.

use std::time::Duration;

use rand::Rng;

/// Backoff state for a loop that must never exit on a failed iteration.
#[derive(Debug, Clone)]
pub struct Backoff {
    base: Duration,
    max: Duration,
    failures: u32,
}

impl Backoff {
    /// Start at `base`, doubling per consecutive failure up to `max`.
    pub fn new(base: Duration, max: Duration) -> Self {
        Self {
            base,
            max: max.max(base),
            failures: 0,
        }
    }

    /// Record a failure and return how long to wait: the capped exponential
    /// delay scaled by a random factor in `[0.5, 1.0]`.
    pub fn next_delay(&mut self) -> Duration {
        let factor = 2u32.saturating_pow(self.failures.min(16));
        self.failures = self.failures.saturating_add(1);
        let capped = self.base.saturating_mul(factor).min(self.max);
        capped.mul_f64(rand::thread_rng().gen_range(0.5..=1.0))
    }

    /// Forget previous failures.
    pub fn reset(&mut self) {
        self.failures = 0;
    }

    /// Consecutive failures so far.
    pub fn failures(&self) -> u32 {
        self.failures
    }
}
