//! Token-bucket rate limiter seam.

use std::time::Duration;

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use crate::config::RateLimitPolicyConfig;
use crate::result::AppResult;

/// Tolerance used when comparing fractional token counts.
pub const TOKEN_EPSILON: f64 = 1e-9;

/// Capacity and refill rate of one bucket family.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct RateLimitPolicy {
    /// Maximum tokens (burst).
    pub capacity: u32,
    /// Tokens added per second, continuously.
    pub refill_per_second: f64,
}

impl RateLimitPolicy {
    /// Policy from a capacity and a per-second rate.
    pub fn new(capacity: u32, refill_per_second: f64) -> Self {
        Self {
            capacity,
            refill_per_second,
        }
    }

    /// `capacity` tokens, refilled at `per_hour` tokens per hour.
    pub fn per_hour(capacity: u32, per_hour: u32) -> Self {
        Self::new(capacity, f64::from(per_hour) / 3600.0)
    }

    /// Tokens available after `elapsed` of refill, capped at capacity.
    pub fn replenish(&self, tokens: f64, elapsed: chrono::Duration) -> f64 {
        let elapsed_ms = elapsed.num_milliseconds().max(0) as f64;
        let refilled = elapsed_ms * self.refill_per_second / 1000.0;
        (tokens + refilled).min(f64::from(self.capacity))
    }

    /// Decide `cost` against `available` tokens at `now`.
    ///
    /// Returns the decision and the token count to persist.
    pub fn decide(
        &self,
        available: f64,
        cost: u32,
        peek: bool,
        now: DateTime<Utc>,
    ) -> (RateDecision, f64) {
        let cost_f = f64::from(cost);
        let allowed = available + TOKEN_EPSILON >= cost_f;
        let remaining = if allowed && !peek {
            (available - cost_f).max(0.0)
        } else {
            available
        };

        let retry_after = if allowed {
            Duration::ZERO
        } else {
            self.time_to_accumulate(cost_f - available)
        };
        let reset_at = chrono::Duration::from_std(
            self.time_to_accumulate(f64::from(self.capacity) - remaining),
        )
        .ok()
        .and_then(|d| now.checked_add_signed(d))
        .unwrap_or(DateTime::<Utc>::MAX_UTC);

        (
            RateDecision {
                allowed,
                remaining: (remaining + TOKEN_EPSILON).floor() as u32,
                retry_after,
                reset_at,
            },
            remaining,
        )
    }

    fn time_to_accumulate(&self, deficit: f64) -> Duration {
        if deficit <= TOKEN_EPSILON {
            return Duration::ZERO;
        }
        if self.refill_per_second <= 0.0 {
            return Duration::MAX;
        }
        // Sub-microsecond float noise must not add a whole millisecond.
        let millis = (deficit / self.refill_per_second * 1000.0 - 1e-6).ceil().max(1.0);
        Duration::from_millis(millis as u64)
    }
}

impl From<RateLimitPolicyConfig> for RateLimitPolicy {
    fn from(config: RateLimitPolicyConfig) -> Self {
        Self::new(config.capacity, config.refill_per_second)
    }
}

/// Result of a limiter check.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct RateDecision {
    /// Whether the request fits in the bucket.
    pub allowed: bool,
    /// Whole tokens left after this call.
    pub remaining: u32,
    /// How long until the request would fit; zero when allowed.
    pub retry_after: Duration,
    /// When the bucket will be full again.
    pub reset_at: DateTime<Utc>,
}

/// Per-key token bucket, refilled lazily on access.
#[async_trait]
pub trait RateLimiter: Send + Sync + std::fmt::Debug + 'static {
    /// Refill the bucket for `key`, then check (`peek`) or check-and-consume `cost`.
    async fn allow(
        &self,
        key: &str,
        policy: &RateLimitPolicy,
        cost: u32,
        peek: bool,
    ) -> AppResult<RateDecision>;
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_replenish_caps_at_capacity() {
        let policy = RateLimitPolicy::new(10, 100.0);
        let tokens = policy.replenish(9.0, chrono::Duration::seconds(5));
        assert!((tokens - 10.0).abs() < TOKEN_EPSILON);
    }

    #[test]
    fn test_replenish_ignores_negative_elapsed() {
        let policy = RateLimitPolicy::new(10, 1.0);
        let tokens = policy.replenish(3.0, chrono::Duration::seconds(-5));
        assert!((tokens - 3.0).abs() < TOKEN_EPSILON);
    }

    #[test]
    fn test_decide_denied_reports_retry_after() {
        let policy = RateLimitPolicy::per_hour(5, 5);
        let now = Utc::now();
        let (decision, left) = policy.decide(0.0, 1, false, now);
        assert!(!decision.allowed);
        assert_eq!(decision.retry_after, Duration::from_secs(720));
        assert!((left - 0.0).abs() < TOKEN_EPSILON);
    }

    #[test]
    fn test_peek_does_not_consume() {
        let policy = RateLimitPolicy::new(2, 1.0);
        let (decision, left) = policy.decide(2.0, 1, true, Utc::now());
        assert!(decision.allowed);
        assert_eq!(decision.remaining, 2);
        assert!((left - 2.0).abs() < TOKEN_EPSILON);
    }
}
