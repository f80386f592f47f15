//! Redemption engine configuration.

use chrono::Duration;
use serde::{Deserialize, Serialize};

/// Tunables for the ledger, allocator, capacity guard and switch coordinator.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct EngineConfig {
    /// How long a seat reservation lives before the sweep reclaims it.
    #[serde(default = "default_hold_ttl")]
    pub hold_ttl_seconds: i64,
    /// Number of base-36 characters in a generated code body.
    #[serde(default = "default_code_length")]
    pub code_length: usize,
    /// Prefix applied when the caller gives none.
    #[serde(default)]
    pub default_code_prefix: String,
    /// Mothers not seen alive within this window are excluded from capacity.
    #[serde(default = "default_alive_grace")]
    pub alive_grace_seconds: i64,
    /// `warn` is raised when available slots drop to this value or below.
    #[serde(default = "default_warn_threshold")]
    pub capacity_warn_threshold: u64,
    /// Lifetime of a queued switch request.
    #[serde(default = "default_switch_queue_ttl")]
    pub switch_queue_ttl_seconds: i64,
    /// A running switch request whose claim is older than this is requeued.
    #[serde(default = "default_switch_claim_lease")]
    pub switch_claim_lease_seconds: i64,
    /// Teams this code used within the window are preferred on re-bind.
    #[serde(default = "default_recent_team_window")]
    pub recent_team_window_seconds: i64,
    /// Minimum gap between two refreshes of one code.
    #[serde(default = "default_refresh_cooldown")]
    pub refresh_cooldown_seconds: i64,
    /// TTL of the enqueue dedup lock.
    #[serde(default = "default_enqueue_lock_ttl")]
    pub enqueue_lock_ttl_ms: u64,
}

impl Default for EngineConfig {
    fn default() -> Self {
        Self {
            hold_ttl_seconds: default_hold_ttl(),
            code_length: default_code_length(),
            default_code_prefix: String::new(),
            alive_grace_seconds: default_alive_grace(),
            capacity_warn_threshold: default_warn_threshold(),
            switch_queue_ttl_seconds: default_switch_queue_ttl(),
            switch_claim_lease_seconds: default_switch_claim_lease(),
            recent_team_window_seconds: default_recent_team_window(),
            refresh_cooldown_seconds: default_refresh_cooldown(),
            enqueue_lock_ttl_ms: default_enqueue_lock_ttl(),
        }
    }
}

impl EngineConfig {
    /// Seat hold TTL.
    pub fn hold_ttl(&self) -> Duration {
        Duration::seconds(self.hold_ttl_seconds)
    }

    /// Alive grace window.
    pub fn alive_grace(&self) -> Duration {
        Duration::seconds(self.alive_grace_seconds)
    }

    /// Switch request lifetime.
    pub fn switch_queue_ttl(&self) -> Duration {
        Duration::seconds(self.switch_queue_ttl_seconds)
    }

    /// Claim lease of a running switch request.
    pub fn switch_claim_lease(&self) -> Duration {
        Duration::seconds(self.switch_claim_lease_seconds)
    }

    /// Recency window for team bias.
    pub fn recent_team_window(&self) -> Duration {
        Duration::seconds(self.recent_team_window_seconds)
    }

    /// Refresh cooldown.
    pub fn refresh_cooldown(&self) -> Duration {
        Duration::seconds(self.refresh_cooldown_seconds)
    }
}

fn default_hold_ttl() -> i64 {
    300
}

fn default_code_length() -> usize {
    16
}

fn default_alive_grace() -> i64 {
    3600
}

fn default_warn_threshold() -> u64 {
    10
}

fn default_switch_queue_ttl() -> i64 {
    86_400
}

fn default_switch_claim_lease() -> i64 {
    600
}

fn default_recent_team_window() -> i64 {
    7 * 86_400
}

fn default_refresh_cooldown() -> i64 {
    600
}

fn default_enqueue_lock_ttl() -> u64 {
    5_000
}
