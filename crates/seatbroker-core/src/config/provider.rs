//! Outbound team provider configuration.

use serde::{Deserialize, Serialize};

/// Settings for the provider transport, retry loop and circuit breaker.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ProviderConfig {
    /// Base URL of the team-management API.
    #[serde(default = "default_base_url")]
    pub base_url: String,
    /// Per-request timeout.
    #[serde(default = "default_timeout")]
    pub request_timeout_seconds: u64,
    /// Retries after the first attempt for retryable failures.
    #[serde(default = "default_max_retries")]
    pub max_retries: u32,
    /// Base delay of the retry backoff, in milliseconds.
    #[serde(default = "default_retry_base")]
    pub retry_base_ms: u64,
    /// Upper bound of a single retry delay, in milliseconds.
    #[serde(default = "default_retry_max")]
    pub retry_max_ms: u64,
    /// Consecutive failures that open the circuit for an endpoint/account pair.
    #[serde(default = "default_failure_threshold")]
    pub circuit_failure_threshold: u32,
    /// Seconds an open circuit waits before allowing a trial call.
    #[serde(default = "default_cooldown")]
    pub circuit_cooldown_seconds: i64,
}

impl Default for ProviderConfig {
    fn default() -> Self {
        Self {
            base_url: default_base_url(),
            request_timeout_seconds: default_timeout(),
            max_retries: default_max_retries(),
            retry_base_ms: default_retry_base(),
            retry_max_ms: default_retry_max(),
            circuit_failure_threshold: default_failure_threshold(),
            circuit_cooldown_seconds: default_cooldown(),
        }
    }
}

fn default_base_url() -> String {
    "http://localhost:9400".to_string()
}

fn default_timeout() -> u64 {
    15
}

fn default_max_retries() -> u32 {
    2
}

fn default_retry_base() -> u64 {
    200
}

fn default_retry_max() -> u64 {
    5_000
}

fn default_failure_threshold() -> u32 {
    5
}

fn default_cooldown() -> i64 {
    60
}
