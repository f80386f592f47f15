//! Shared-store limiter with an optional per-process fallback.

use std::sync::Arc;

use async_trait::async_trait;
use tracing::warn;

use seatbroker_core::config::RateLimitBackend;
use seatbroker_core::error::ErrorKind;
use seatbroker_core::result::AppResult;
use seatbroker_core::traits::{RateDecision, RateLimitPolicy, RateLimiter};

use crate::memory::MemoryRateLimiter;

/// Routes checks to the shared limiter; when the operator allows it, an
/// unreachable shared store degrades to per-process buckets instead of
/// failing the request.
#[derive(Debug, Clone)]
pub struct FallbackRateLimiter {
    shared: Arc<dyn RateLimiter>,
    local: MemoryRateLimiter,
    backend: RateLimitBackend,
}

impl FallbackRateLimiter {
    /// Wrap `shared` under the given deployment policy.
    pub fn new(shared: Arc<dyn RateLimiter>, local: MemoryRateLimiter, backend: RateLimitBackend) -> Self {
        Self {
            shared,
            local,
            backend,
        }
    }
}

#[async_trait]
impl RateLimiter for FallbackRateLimiter {
    async fn allow(
        &self,
        key: &str,
        policy: &RateLimitPolicy,
        cost: u32,
        peek: bool,
    ) -> AppResult<RateDecision> {
        match self.backend {
            RateLimitBackend::Memory => self.local.allow(key, policy, cost, peek).await,
            RateLimitBackend::RequireShared => self.shared.allow(key, policy, cost, peek).await,
            RateLimitBackend::FallbackMemory => {
                match self.shared.allow(key, policy, cost, peek).await {
                    Err(e) if e.kind == ErrorKind::Coordination => {
                        warn!(key = %key, error = %e, "Shared rate limiter unavailable, using local bucket");
                        self.local.allow(key, policy, cost, peek).await
                    }
                    other => other,
                }
            }
        }
    }
}
