//! Shared coordination store configuration.

use serde::{Deserialize, Serialize};

/// Where rate-limit buckets live when the shared store misbehaves.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum RateLimitBackend {
    /// Always use the shared store; its outage surfaces as an error.
    RequireShared,
    /// Use the shared store, falling back to per-process buckets if it is unreachable.
    FallbackMemory,
    /// Per-process buckets only.
    Memory,
}

/// Top-level coordination configuration.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct CoordinationConfig {
    /// Store used by the distributed lock: `"memory"` or `"redis"`.
    #[serde(default = "default_provider")]
    pub provider: String,
    /// Deployment policy for rate-limit buckets.
    #[serde(default = "default_rate_limit_backend")]
    pub rate_limit_backend: RateLimitBackend,
    /// Redis-specific configuration.
    #[serde(default)]
    pub redis: RedisConfig,
}

impl Default for CoordinationConfig {
    fn default() -> Self {
        Self {
            provider: default_provider(),
            rate_limit_backend: default_rate_limit_backend(),
            redis: RedisConfig::default(),
        }
    }
}

/// Redis backend configuration.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct RedisConfig {
    /// Redis connection URL.
    #[serde(default = "default_redis_url")]
    pub url: String,
    /// Key prefix for all Seatbroker coordination keys.
    #[serde(default = "default_key_prefix")]
    pub key_prefix: String,
}

impl Default for RedisConfig {
    fn default() -> Self {
        Self {
            url: default_redis_url(),
            key_prefix: default_key_prefix(),
        }
    }
}

fn default_provider() -> String {
    "memory".to_string()
}

fn default_rate_limit_backend() -> RateLimitBackend {
    RateLimitBackend::Memory
}

fn default_redis_url() -> String {
    "redis://localhost:6379".to_string()
}

fn default_key_prefix() -> String {
    "seatbroker:".to_string()
}
