//! Switch results.

use serde::{Deserialize, Serialize};

use seatbroker_core::types::{MotherId, SwitchRequestId};

/// How a switch attempt ended.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum SwitchKind {
    /// Moved to a new seat.
    Switched,
    /// No seat anywhere; a pending request was recorded.
    Queued,
    /// No seat anywhere and queuing was not allowed.
    NoSeat,
    /// The code cannot be switched (inactive, expired, unbound, limit reached).
    Rejected,
    /// Another switch of the same code committed first.
    Conflict,
}

/// Response to a switch request.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct SwitchOutcome {
    /// Whether the code now occupies a new seat.
    pub success: bool,
    /// Human-readable message.
    pub message: String,
    /// Whether a pending request was recorded.
    pub queued: bool,
    /// The pending request, when queued.
    pub request_id: Option<SwitchRequestId>,
    /// Machine-readable result.
    pub kind: SwitchKind,
    /// Mother the code moved to.
    pub mother_id: Option<MotherId>,
}

impl SwitchOutcome {
    pub(crate) fn switched(mother_id: MotherId) -> Self {
        Self {
            success: true,
            message: "Switched to a new seat".to_string(),
            queued: false,
            request_id: None,
            kind: SwitchKind::Switched,
            mother_id: Some(mother_id),
        }
    }

    pub(crate) fn queued(request_id: SwitchRequestId) -> Self {
        Self {
            success: false,
            message: "No free seat; switch request queued".to_string(),
            queued: true,
            request_id: Some(request_id),
            kind: SwitchKind::Queued,
            mother_id: None,
        }
    }

    pub(crate) fn no_seat() -> Self {
        Self {
            success: false,
            message: "No free seat available".to_string(),
            queued: false,
            request_id: None,
            kind: SwitchKind::NoSeat,
            mother_id: None,
        }
    }

    pub(crate) fn conflict() -> Self {
        Self {
            success: false,
            message: "Code was switched by a concurrent request".to_string(),
            queued: false,
            request_id: None,
            kind: SwitchKind::Conflict,
            mother_id: None,
        }
    }

    pub(crate) fn rejected(message: impl Into<String>) -> Self {
        Self {
            success: false,
            message: message.into(),
            queued: false,
            request_id: None,
            kind: SwitchKind::Rejected,
            mother_id: None,
        }
    }
}

/// Counts from one queue drain pass.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct DrainReport {
    /// Requests claimed.
    pub processed: u64,
    /// Requests that found a seat.
    pub succeeded: u64,
    /// Requests put back to pending.
    pub requeued: u64,
    /// Requests past their expiry.
    pub expired: u64,
    /// Requests that can never succeed, or whose attempt errored.
    pub failed: u64,
    /// Running requests whose claim lease lapsed and were requeued.
    pub reclaimed: u64,
}
