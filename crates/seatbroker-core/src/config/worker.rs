//! Background worker configuration.

use std::time::Duration;

use serde::{Deserialize, Serialize};

/// Background job worker configuration.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct WorkerConfig {
    /// Whether the worker is enabled.
    #[serde(default = "default_true")]
    pub enabled: bool,
    /// Number of concurrent job processing tasks.
    #[serde(default = "default_concurrency")]
    pub concurrency: usize,
    /// Interval in seconds between job queue polls.
    #[serde(default = "default_poll_interval")]
    pub poll_interval_seconds: u64,
    /// How long a claimed job stays invisible to other runners.
    #[serde(default = "default_lease")]
    pub lease_seconds: u64,
    /// Base of the exponential retry backoff.
    #[serde(default = "default_backoff_base")]
    pub backoff_base_seconds: u64,
    /// Upper bound of the retry backoff.
    #[serde(default = "default_backoff_max")]
    pub backoff_max_seconds: u64,
    /// Attempts before a job is marked failed, unless the enqueuer overrides it.
    #[serde(default = "default_max_attempts")]
    pub default_max_attempts: i32,
    /// Interval between stale-hold sweeps.
    #[serde(default = "default_sweep_interval")]
    pub sweep_interval_seconds: u64,
    /// Switch requests processed per drain job.
    #[serde(default = "default_drain_batch")]
    pub drain_batch_size: u32,
    /// Grace period for in-flight work on shutdown.
    #[serde(default = "default_shutdown_timeout")]
    pub shutdown_timeout_seconds: u64,
    /// Cron expression for enqueuing switch-queue drains.
    #[serde(default = "default_drain_cron")]
    pub drain_cron: String,
    /// Cron expression for enqueuing per-mother pool syncs.
    #[serde(default = "default_pool_sync_cron")]
    pub pool_sync_cron: String,
}

impl Default for WorkerConfig {
    fn default() -> Self {
        Self {
            enabled: default_true(),
            concurrency: default_concurrency(),
            poll_interval_seconds: default_poll_interval(),
            lease_seconds: default_lease(),
            backoff_base_seconds: default_backoff_base(),
            backoff_max_seconds: default_backoff_max(),
            default_max_attempts: default_max_attempts(),
            sweep_interval_seconds: default_sweep_interval(),
            drain_batch_size: default_drain_batch(),
            shutdown_timeout_seconds: default_shutdown_timeout(),
            drain_cron: default_drain_cron(),
            pool_sync_cron: default_pool_sync_cron(),
        }
    }
}

impl WorkerConfig {
    /// Lease duration as a [`Duration`].
    pub fn lease(&self) -> Duration {
        Duration::from_secs(self.lease_seconds)
    }

    /// Exponential backoff for the given attempt number (1-based), capped.
    pub fn backoff(&self, attempts: i32) -> Duration {
        let exp = attempts.saturating_sub(1).clamp(0, 30) as u32;
        let secs = self
            .backoff_base_seconds
            .saturating_mul(2u64.saturating_pow(exp))
            .min(self.backoff_max_seconds);
        Duration::from_secs(secs)
    }
}

fn default_true() -> bool {
    true
}

fn default_concurrency() -> usize {
    4
}

fn default_poll_interval() -> u64 {
    2
}

fn default_lease() -> u64 {
    120
}

fn default_backoff_base() -> u64 {
    5
}

fn default_backoff_max() -> u64 {
    600
}

fn default_max_attempts() -> i32 {
    5
}

fn default_sweep_interval() -> u64 {
    30
}

fn default_drain_batch() -> u32 {
    50
}

fn default_shutdown_timeout() -> u64 {
    30
}

fn default_drain_cron() -> String {
    "0 * * * * *".to_string()
}

fn default_pool_sync_cron() -> String {
    "0 */10 * * * *".to_string()
}
