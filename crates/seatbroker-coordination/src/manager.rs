//! Coordination backend selection.

use std::sync::Arc;

use tracing::{info, warn};

use seatbroker_core::config::{CoordinationConfig, RateLimitBackend};
use seatbroker_core::error::AppError;
use seatbroker_core::result::AppResult;
use seatbroker_core::traits::{DistributedLock, RateLimiter};
use seatbroker_core::types::Clock;

use crate::fallback::FallbackRateLimiter;
use crate::memory::{MemoryLock, MemoryRateLimiter};
use crate::redis::{RedisClient, RedisLock, RedisRateLimiter};

/// The lock and limiter chosen for this deployment.
#[derive(Debug, Clone)]
pub struct CoordinationManager {
    lock: Arc<dyn DistributedLock>,
    limiter: Arc<dyn RateLimiter>,
}

impl CoordinationManager {
    /// Build the primitives named by configuration.
    pub async fn new(config: &CoordinationConfig, clock: Arc<dyn Clock>) -> AppResult<Self> {
        match config.provider.as_str() {
            "redis" => {
                info!("Initializing Redis coordination store");
                let client = match RedisClient::connect(&config.redis).await {
                    Ok(client) => client,
                    Err(e) if config.rate_limit_backend != RateLimitBackend::RequireShared => {
                        warn!(error = %e, "Redis unreachable at startup, coordinating in-process only");
                        return Ok(Self::memory(clock));
                    }
                    Err(e) => return Err(e),
                };

                let local = MemoryRateLimiter::new(clock.clone());
                let shared: Arc<dyn RateLimiter> =
                    Arc::new(RedisRateLimiter::new(client.clone(), clock));
                Ok(Self {
                    lock: Arc::new(RedisLock::new(client)),
                    limiter: Arc::new(FallbackRateLimiter::new(
                        shared,
                        local,
                        config.rate_limit_backend,
                    )),
                })
            }
            "memory" => {
                if config.rate_limit_backend == RateLimitBackend::RequireShared {
                    return Err(AppError::configuration(
                        "rate_limit_backend 'require_shared' needs coordination provider 'redis'",
                    ));
                }
                info!("Initializing in-memory coordination store");
                Ok(Self::memory(clock))
            }
            other => Err(AppError::configuration(format!(
                "Unknown coordination provider: '{other}'. Supported: memory, redis"
            ))),
        }
    }

    /// In-process lock and limiter.
    pub fn memory(clock: Arc<dyn Clock>) -> Self {
        Self {
            lock: Arc::new(MemoryLock::new(clock.clone())),
            limiter: Arc::new(MemoryRateLimiter::new(clock)),
        }
    }

    /// The distributed lock.
    pub fn lock(&self) -> Arc<dyn DistributedLock> {
        self.lock.clone()
    }

    /// The rate limiter.
    pub fn limiter(&self) -> Arc<dyn RateLimiter> {
        self.limiter.clone()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::Utc;
    use seatbroker_core::error::ErrorKind;
    use seatbroker_core::types::ManualClock;

    #[tokio::test]
    async fn test_unknown_provider_is_configuration_error() {
        let config = CoordinationConfig {
            provider: "etcd".to_string(),
            ..CoordinationConfig::default()
        };
        let err = CoordinationManager::new(&config, Arc::new(ManualClock::new(Utc::now())))
            .await
            .unwrap_err();
        assert_eq!(err.kind, ErrorKind::Configuration);
    }
}
