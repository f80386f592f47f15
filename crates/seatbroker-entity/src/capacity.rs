//! Derived capacity snapshot.

use serde::{Deserialize, Serialize};

/// Point-in-time view of theoretical seat capacity versus reserved demand.
///
/// Computed on demand, never persisted.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct CapacitySnapshot {
    /// Sum of `seat_limit` over healthy mothers.
    pub total_slots: u64,
    /// Number of healthy mothers contributing to `total_slots`.
    pub alive_mothers: u64,
    /// Unused, unexpired codes.
    pub reserved_codes: u64,
    /// `max(total_slots - reserved_codes, 0)`.
    pub available_slots: u64,
    /// Whether `available_slots` is at or below the warn threshold.
    pub warn: bool,
}

impl CapacitySnapshot {
    /// Build a snapshot from raw counts.
    pub fn compute(total_slots: u64, alive_mothers: u64, reserved_codes: u64, warn_threshold: u64) -> Self {
        let available_slots = total_slots.saturating_sub(reserved_codes);
        Self {
            total_slots,
            alive_mothers,
            reserved_codes,
            available_slots,
            warn: available_slots <= warn_threshold,
        }
    }
}
