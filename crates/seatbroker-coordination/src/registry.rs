//! Named rate-limit policies, replaceable at runtime.

use std::collections::HashMap;
use std::sync::Arc;

use tokio::sync::RwLock;
use tracing::{debug, info};

use seatbroker_core::config::RateLimitPolicyConfig;
use seatbroker_core::error::AppError;
use seatbroker_core::result::AppResult;
use seatbroker_core::traits::{RateDecision, RateLimitPolicy, RateLimiter};

use crate::keys;

/// Policy table in front of a limiter. Buckets are namespaced by policy id,
/// so two policies never share state for the same subject.
#[derive(Debug, Clone)]
pub struct RateLimitRegistry {
    limiter: Arc<dyn RateLimiter>,
    policies: Arc<RwLock<HashMap<String, RateLimitPolicy>>>,
}

impl RateLimitRegistry {
    /// Build a registry from configured policies.
    pub fn new(limiter: Arc<dyn RateLimiter>, policies: &HashMap<String, RateLimitPolicyConfig>) -> Self {
        let policies = policies
            .iter()
            .map(|(id, config)| (id.clone(), RateLimitPolicy::from(*config)))
            .collect();
        Self {
            limiter,
            policies: Arc::new(RwLock::new(policies)),
        }
    }

    /// Insert or replace a policy. Existing buckets keep their tokens,
    /// capped at the new capacity on next access.
    pub async fn set_policy(&self, id: &str, policy: RateLimitPolicy) {
        self.policies.write().await.insert(id.to_string(), policy);
        info!(policy = %id, capacity = policy.capacity, refill = policy.refill_per_second, "Rate limit policy set");
    }

    /// Remove a policy; its subjects become unlimited.
    pub async fn remove_policy(&self, id: &str) -> Option<RateLimitPolicy> {
        self.policies.write().await.remove(id)
    }

    /// Current definition of a policy.
    pub async fn policy(&self, id: &str) -> Option<RateLimitPolicy> {
        self.policies.read().await.get(id).copied()
    }

    /// Check `subject` against policy `id`. `None` when no such policy exists.
    pub async fn check(
        &self,
        id: &str,
        subject: &str,
        cost: u32,
        peek: bool,
    ) -> AppResult<Option<RateDecision>> {
        let Some(policy) = self.policy(id).await else {
            return Ok(None);
        };
        let decision = self
            .limiter
            .allow(&keys::rate_bucket(id, subject), &policy, cost, peek)
            .await?;
        Ok(Some(decision))
    }

    /// Consume one token or fail with a rate-limit error carrying `retry_after`.
    pub async fn enforce(&self, id: &str, subject: &str) -> AppResult<()> {
        match self.check(id, subject, 1, false).await? {
            Some(decision) if !decision.allowed => {
                debug!(policy = %id, retry_after_ms = decision.retry_after.as_millis() as u64, "Rate limited");
                Err(AppError::rate_limited(
                    format!("Too many '{id}' requests"),
                    decision.retry_after,
                ))
            }
            _ => Ok(()),
        }
    }
}
