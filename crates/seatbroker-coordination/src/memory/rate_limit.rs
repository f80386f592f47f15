//! In-memory token bucket limiter.

use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Arc;

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use dashmap::DashMap;
use tokio::sync::Mutex;
use tracing::debug;

use seatbroker_core::result::AppResult;
use seatbroker_core::traits::{RateDecision, RateLimitPolicy, RateLimiter};
use seatbroker_core::types::Clock;

/// Decisions between two automatic sweeps of full buckets.
const SWEEP_EVERY: u64 = 1024;

#[derive(Debug)]
struct Bucket {
    tokens: f64,
    last_refill: DateTime<Utc>,
    policy: RateLimitPolicy,
}

impl Bucket {
    fn is_full(&self, now: DateTime<Utc>) -> bool {
        let available = self.policy.replenish(self.tokens, now - self.last_refill);
        available >= f64::from(self.policy.capacity)
    }
}

/// Token buckets keyed by string, each behind its own mutex so that
/// unrelated keys never contend.
///
/// A full bucket carries no information beyond its policy, so buckets that
/// have refilled are dropped every [`SWEEP_EVERY`] decisions.
#[derive(Debug, Clone)]
pub struct MemoryRateLimiter {
    buckets: Arc<DashMap<String, Arc<Mutex<Bucket>>>>,
    decisions: Arc<AtomicU64>,
    clock: Arc<dyn Clock>,
}

impl MemoryRateLimiter {
    /// Create an empty limiter.
    pub fn new(clock: Arc<dyn Clock>) -> Self {
        Self {
            buckets: Arc::new(DashMap::new()),
            decisions: Arc::new(AtomicU64::new(0)),
            clock,
        }
    }

    /// Number of keys with bucket state.
    pub fn tracked_keys(&self) -> usize {
        self.buckets.len()
    }

    /// Drop buckets that have refilled to capacity. A bucket some caller is
    /// still using is kept. Returns the number dropped.
    pub fn evict_full(&self) -> usize {
        let now = self.clock.now();
        let before = self.buckets.len();
        self.buckets.retain(|_, bucket| {
            if Arc::strong_count(bucket) > 1 {
                return true;
            }
            match bucket.try_lock() {
                Ok(state) => !state.is_full(now),
                Err(_) => true,
            }
        });
        let evicted = before.saturating_sub(self.buckets.len());
        if evicted > 0 {
            debug!(evicted, "Evicted full rate limit buckets");
        }
        evicted
    }
}

#[async_trait]
impl RateLimiter for MemoryRateLimiter {
    async fn allow(
        &self,
        key: &str,
        policy: &RateLimitPolicy,
        cost: u32,
        peek: bool,
    ) -> AppResult<RateDecision> {
        let bucket = self
            .buckets
            .entry(key.to_string())
            .or_insert_with(|| {
                Arc::new(Mutex::new(Bucket {
                    tokens: f64::from(policy.capacity),
                    last_refill: self.clock.now(),
                    policy: *policy,
                }))
            })
            .clone();

        let decision = {
            let mut bucket = bucket.lock().await;
            let now = self.clock.now();
            let available = policy.replenish(bucket.tokens, now - bucket.last_refill);
            let (decision, left) = policy.decide(available, cost, peek, now);

            bucket.tokens = left;
            bucket.policy = *policy;
            if now > bucket.last_refill {
                bucket.last_refill = now;
            }
            decision
        };
        drop(bucket);

        if self.decisions.fetch_add(1, Ordering::Relaxed) % SWEEP_EVERY == SWEEP_EVERY - 1 {
            self.evict_full();
        }
        Ok(decision)
    }
}
