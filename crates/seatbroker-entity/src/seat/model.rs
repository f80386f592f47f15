//! Seat allocation model and status.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use sqlx::FromRow;
use std::fmt;

use seatbroker_core::types::{CodeId, MotherId, SeatId};

/// Lifecycle status of a seat.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize, sqlx::Type)]
#[sqlx(type_name = "seat_status", rename_all = "lowercase")]
#[serde(rename_all = "lowercase")]
pub enum SeatStatus {
    /// Allocatable.
    Free,
    /// Reserved until `held_until`, not yet committed.
    Held,
    /// Committed to a `(team_id, email)` pair.
    Used,
}

impl SeatStatus {
    /// Whether the seat counts against the mother's seat limit.
    pub fn is_occupied(&self) -> bool {
        matches!(self, Self::Held | Self::Used)
    }

    /// Return the status as a lowercase string.
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Free => "free",
            Self::Held => "held",
            Self::Used => "used",
        }
    }
}

impl fmt::Display for SeatStatus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.as_str())
    }
}

/// One capacity slot on a mother account. `(mother_id, slot_index)` is unique.
#[derive(Debug, Clone, Serialize, Deserialize, FromRow)]
pub struct SeatAllocation {
    /// Seat id.
    pub id: SeatId,
    /// Owning mother account.
    pub mother_id: MotherId,
    /// Slot position, starting at zero.
    pub slot_index: i32,
    /// Current status.
    pub status: SeatStatus,
    /// Reservation deadline for a held seat.
    pub held_until: Option<DateTime<Utc>>,
    /// Remote team id of the binding.
    pub team_id: Option<String>,
    /// Bound email.
    pub email: Option<String>,
    /// Provider invite request id.
    pub invite_request_id: Option<String>,
    /// Provider member id once the invite is accepted.
    pub member_id: Option<String>,
    /// Code occupying the seat, if the seat was bound through redemption.
    pub code_id: Option<CodeId>,
    /// When the row last changed.
    pub updated_at: DateTime<Utc>,
}

impl SeatAllocation {
    /// A fresh free seat.
    pub fn free(mother_id: MotherId, slot_index: i32, now: DateTime<Utc>) -> Self {
        Self {
            id: SeatId::new(),
            mother_id,
            slot_index,
            status: SeatStatus::Free,
            held_until: None,
            team_id: None,
            email: None,
            invite_request_id: None,
            member_id: None,
            code_id: None,
            updated_at: now,
        }
    }

    /// Whether the hold has lapsed.
    pub fn is_stale_hold(&self, now: DateTime<Utc>) -> bool {
        self.status == SeatStatus::Held && self.held_until.is_some_and(|until| until < now)
    }

    /// Drop every binding field and return to `free`.
    pub fn clear(&mut self, now: DateTime<Utc>) {
        self.status = SeatStatus::Free;
        self.held_until = None;
        self.team_id = None;
        self.email = None;
        self.invite_request_id = None;
        self.member_id = None;
        self.code_id = None;
        self.updated_at = now;
    }
}
