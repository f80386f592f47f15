//! Results of ledger operations.

use serde::{Deserialize, Serialize};

use seatbroker_core::types::{BatchId, MotherId};
use seatbroker_entity::{CapacitySnapshot, CodeBinding};

/// Why a redemption ended the way it did.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum RedeemStatus {
    /// Seat bound and invite sent.
    Redeemed,
    /// No code with this hash exists.
    NotFound,
    /// The code has been deactivated.
    Disabled,
    /// Redemption deadline or lifecycle has passed.
    Expired,
    /// The code was already redeemed.
    AlreadyUsed,
    /// Another request is redeeming this code right now.
    InProgress,
    /// Every healthy mother is full.
    NoSeat,
}

impl RedeemStatus {
    /// Human-readable message for the status.
    pub fn message(self) -> &'static str {
        match self {
            Self::Redeemed => "Invite sent",
            Self::NotFound => "Code not found",
            Self::Disabled => "Code has been disabled",
            Self::Expired => "Code has expired",
            Self::AlreadyUsed => "Code already used",
            Self::InProgress => "Code is being redeemed by another request",
            Self::NoSeat => "No free seat available",
        }
    }
}

/// Response to a redeem request.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct RedeemOutcome {
    /// Whether the code was redeemed.
    pub success: bool,
    /// Machine-readable reason.
    pub status: RedeemStatus,
    /// Human-readable message.
    pub message: String,
    /// Provider invite request id.
    pub invite_request_id: Option<String>,
    /// Mother the seat belongs to.
    pub mother_id: Option<MotherId>,
    /// Remote team id.
    pub team_id: Option<String>,
}

impl RedeemOutcome {
    /// A failed redemption.
    pub fn failure(status: RedeemStatus) -> Self {
        Self {
            success: false,
            status,
            message: status.message().to_string(),
            invite_request_id: None,
            mother_id: None,
            team_id: None,
        }
    }

    /// A successful redemption.
    pub fn redeemed(binding: &CodeBinding) -> Self {
        Self {
            success: true,
            status: RedeemStatus::Redeemed,
            message: RedeemStatus::Redeemed.message().to_string(),
            invite_request_id: binding.invite_id.clone(),
            mother_id: Some(binding.mother_id),
            team_id: Some(binding.team_id.clone()),
        }
    }
}

/// Result of the shared bind path.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum BindResult {
    /// A seat was committed and the invite sent.
    Bound(CodeBinding),
    /// No healthy mother had a seat to give.
    NoSeat,
}

/// Output of bulk generation. Plaintexts are returned once and never stored.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct GeneratedBatch {
    /// Batch identifier.
    pub batch_id: BatchId,
    /// Plaintext codes.
    pub codes: Vec<String>,
    /// Capacity right before the insert.
    pub capacity: CapacitySnapshot,
}
