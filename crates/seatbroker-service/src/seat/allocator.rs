//! Seat lifecycle: `free -> held -> used -> free`.
//!
//! The allocator is the only writer of seat status. Every transition is a
//! conditional update in the repository, so two instances racing for the
//! same row produce one winner and one ordinary "unavailable" answer.

use std::sync::Arc;

use chrono::Duration;
use tracing::{debug, info, warn};

use seatbroker_core::result::AppResult;
use seatbroker_core::types::{Clock, CodeId, MotherId, SeatId};
use seatbroker_database::{HoldOutcome, MotherRepository, SeatRepository};
use seatbroker_entity::{MotherAccount, SeatAllocation};

/// Seat allocation service.
#[derive(Debug, Clone)]
pub struct SeatAllocator {
    seats: Arc<dyn SeatRepository>,
    mothers: Arc<dyn MotherRepository>,
    clock: Arc<dyn Clock>,
    hold_ttl: Duration,
    alive_grace: Duration,
}

impl SeatAllocator {
    /// Creates a new allocator.
    pub fn new(
        seats: Arc<dyn SeatRepository>,
        mothers: Arc<dyn MotherRepository>,
        clock: Arc<dyn Clock>,
        hold_ttl: Duration,
        alive_grace: Duration,
    ) -> Self {
        Self {
            seats,
            mothers,
            clock,
            hold_ttl,
            alive_grace,
        }
    }

    /// Active mothers that answered within the grace window, or were never
    /// checked.
    pub async fn healthy_mothers(&self) -> AppResult<Vec<MotherAccount>> {
        let now = self.clock.now();
        let mothers = self.mothers.list_active().await?;
        Ok(mothers
            .into_iter()
            .filter(|m| m.is_healthy(now, self.alive_grace))
            .collect())
    }

    /// Load one mother account.
    pub async fn mother(&self, mother_id: MotherId) -> AppResult<Option<MotherAccount>> {
        self.mothers.find_by_id(mother_id).await
    }

    /// Whether a mother is usable right now.
    pub fn is_healthy(&self, mother: &MotherAccount) -> bool {
        mother.is_healthy(self.clock.now(), self.alive_grace)
    }

    /// Lowest free slot on a mother.
    pub async fn find_free_seat(&self, mother_id: MotherId) -> AppResult<Option<SeatAllocation>> {
        self.seats.find_free_seat(mother_id).await
    }

    /// Whether any healthy mother has a free seat.
    pub async fn any_free_seat(&self) -> AppResult<bool> {
        for mother in self.healthy_mothers().await? {
            if self.seats.count_free(mother.id).await? > 0 {
                return Ok(true);
            }
        }
        Ok(false)
    }

    /// Reserve a free seat for `(team_id, email)` until `now + hold_ttl`.
    pub async fn hold(
        &self,
        seat: &SeatAllocation,
        team_id: &str,
        email: &str,
        code_id: Option<CodeId>,
    ) -> AppResult<HoldOutcome> {
        let now = self.clock.now();
        let outcome = self
            .seats
            .hold(seat.id, team_id, email, code_id, now + self.hold_ttl, now)
            .await?;
        match &outcome {
            HoldOutcome::Held(held) => {
                debug!(seat_id = %held.id, mother_id = %held.mother_id, slot = held.slot_index, "Seat held");
            }
            HoldOutcome::Unavailable => {
                debug!(seat_id = %seat.id, "Seat taken by a concurrent holder");
            }
            HoldOutcome::AlreadyAssigned => {
                debug!(seat_id = %seat.id, team_id = %team_id, "Mailbox already occupies a seat on this team");
            }
        }
        Ok(outcome)
    }

    /// Confirm a held seat as used.
    pub async fn commit(
        &self,
        seat_id: SeatId,
        invite_request_id: Option<&str>,
        member_id: Option<&str>,
    ) -> AppResult<bool> {
        let committed = self
            .seats
            .commit(seat_id, invite_request_id, member_id, self.clock.now())
            .await?;
        if !committed {
            warn!(seat_id = %seat_id, "Commit lost: seat no longer held");
        }
        Ok(committed)
    }

    /// Return a seat to the pool, clearing its binding.
    pub async fn release(&self, seat_id: SeatId) -> AppResult<bool> {
        let released = self.seats.release(seat_id, self.clock.now()).await?;
        if released {
            debug!(seat_id = %seat_id, "Seat released");
        }
        Ok(released)
    }

    /// The held or used seat of `(team_id, email)`.
    pub async fn find_active(&self, team_id: &str, email: &str) -> AppResult<Option<SeatAllocation>> {
        self.seats.find_active_by_email(team_id, email).await
    }

    /// Mark a mother invalid after a 401/403 and free all of its seats.
    pub async fn invalidate_mother(&self, mother_id: MotherId) -> AppResult<u64> {
        let now = self.clock.now();
        let marked = self.mothers.mark_invalid(mother_id, now).await?;
        let released = self.seats.release_all_for_mother(mother_id, now).await?;
        if marked {
            warn!(mother_id = %mother_id, released, "Mother account invalidated");
        }
        Ok(released)
    }

    /// Release held seats whose reservation has lapsed.
    pub async fn sweep_stale_holds(&self) -> AppResult<u64> {
        let swept = self.seats.sweep_stale_holds(self.clock.now()).await?;
        if swept > 0 {
            info!(swept, "Released stale seat holds");
        }
        Ok(swept)
    }

    /// Bring a mother's seat rows in line with its `seat_limit`.
    pub async fn provision(&self, mother: &MotherAccount) -> AppResult<(u64, u64)> {
        let (created, removed) = self
            .seats
            .ensure_slots(mother.id, mother.seat_limit, self.clock.now())
            .await?;
        if created > 0 || removed > 0 {
            info!(mother_id = %mother.id, created, removed, "Seat rows provisioned");
        }
        Ok((created, removed))
    }

    /// Record a remote member that has no local seat yet.
    pub async fn adopt_member(
        &self,
        mother: &MotherAccount,
        email: &str,
        member_id: &str,
    ) -> AppResult<bool> {
        let adopted = self
            .seats
            .occupy_for_member(mother.id, &mother.team_id, email, member_id, self.clock.now())
            .await?;
        Ok(adopted.is_some())
    }

    /// Held plus used seats on a mother.
    pub async fn count_occupied(&self, mother_id: MotherId) -> AppResult<u64> {
        self.seats.count_occupied(mother_id).await
    }

    /// All seat rows of a mother.
    pub async fn list_for_mother(&self, mother_id: MotherId) -> AppResult<Vec<SeatAllocation>> {
        self.seats.list_for_mother(mother_id).await
    }
}
