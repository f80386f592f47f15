//! Switch request model and status.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use sqlx::FromRow;

use seatbroker_core::types::{CodeId, MotherId, SwitchRequestId};

/// Status of a queued switch.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize, sqlx::Type)]
#[sqlx(type_name = "switch_status", rename_all = "lowercase")]
#[serde(rename_all = "lowercase")]
pub enum SwitchStatus {
    /// Waiting for a free seat.
    Pending,
    /// Being processed by the drain job.
    Running,
    /// Resolved by a successful switch.
    Succeeded,
    /// Could not be resolved.
    Failed,
    /// Dropped after `expires_at`.
    Expired,
}

impl SwitchStatus {
    /// Check if the request is in a terminal state.
    pub fn is_terminal(&self) -> bool {
        matches!(self, Self::Succeeded | Self::Failed | Self::Expired)
    }
}

/// A switch that could not find a free seat. At most one pending row per
/// `(redeem_code_id, email)`.
#[derive(Debug, Clone, Serialize, Deserialize, FromRow)]
pub struct SwitchRequest {
    /// Request id.
    pub id: SwitchRequestId,
    /// Code being switched.
    pub redeem_code_id: CodeId,
    /// Target email.
    pub email: String,
    /// Current status.
    pub status: SwitchStatus,
    /// Why the request was queued or resolved.
    pub reason: Option<String>,
    /// Drain attempts so far.
    pub attempts: i32,
    /// When the request was (last) queued.
    pub queued_at: DateTime<Utc>,
    /// When the request stops being eligible.
    pub expires_at: DateTime<Utc>,
    /// Mother the code was on when queued.
    pub mother_id_prev: Option<MotherId>,
    /// Mother the code landed on.
    pub mother_id_next: Option<MotherId>,
    /// Last processing error.
    pub last_error: Option<String>,
    /// When the row last changed.
    pub updated_at: DateTime<Utc>,
}

impl SwitchRequest {
    /// Whether the request is past its deadline.
    pub fn is_expired(&self, now: DateTime<Utc>) -> bool {
        self.expires_at < now
    }
}
