//! Soft capacity guard for bulk code generation.
//!
//! `ensure_capacity` and the subsequent insert are not one transaction: two
//! generators passing the check at the same instant can overcommit by the
//! size of the smaller batch. The hard seat invariant is held by the seat
//! row CAS, so this window only affects how many unredeemable codes exist.

use std::sync::Arc;

use tracing::{debug, warn};

use seatbroker_core::error::AppError;
use seatbroker_core::result::AppResult;
use seatbroker_core::types::Clock;
use seatbroker_database::CodeRepository;
use seatbroker_entity::CapacitySnapshot;

use crate::seat::SeatAllocator;

/// Computes theoretical capacity against reserved demand.
#[derive(Debug, Clone)]
pub struct CapacityGuard {
    allocator: SeatAllocator,
    codes: Arc<dyn CodeRepository>,
    clock: Arc<dyn Clock>,
    warn_threshold: u64,
}

impl CapacityGuard {
    /// Creates a new capacity guard.
    pub fn new(
        allocator: SeatAllocator,
        codes: Arc<dyn CodeRepository>,
        clock: Arc<dyn Clock>,
        warn_threshold: u64,
    ) -> Self {
        Self {
            allocator,
            codes,
            clock,
            warn_threshold,
        }
    }

    /// Current capacity snapshot. Unhealthy mothers contribute nothing even
    /// though their seat rows still exist.
    pub async fn snapshot(&self) -> AppResult<CapacitySnapshot> {
        let mothers = self.allocator.healthy_mothers().await?;
        let total_slots: u64 = mothers
            .iter()
            .map(|m| u64::try_from(m.seat_limit).unwrap_or(0))
            .sum();
        let reserved = self.codes.count_reserved(self.clock.now()).await?;
        let snapshot = CapacitySnapshot::compute(
            total_slots,
            mothers.len() as u64,
            reserved,
            self.warn_threshold,
        );
        if snapshot.warn {
            warn!(
                total_slots = snapshot.total_slots,
                reserved_codes = snapshot.reserved_codes,
                available_slots = snapshot.available_slots,
                "Capacity at or below warn threshold"
            );
        }
        Ok(snapshot)
    }

    /// Fail with `CapacityExceeded` unless `required` slots are available.
    pub async fn ensure_capacity(&self, required: u64) -> AppResult<CapacitySnapshot> {
        let snapshot = self.snapshot().await?;
        if required > snapshot.available_slots {
            debug!(required, available = snapshot.available_slots, "Capacity check failed");
            return Err(AppError::capacity_exceeded(snapshot.available_slots, required));
        }
        Ok(snapshot)
    }
}
