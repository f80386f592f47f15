//! Redeem code entity model.

use chrono::{DateTime, Duration, Utc};
use serde::{Deserialize, Serialize};
use sqlx::FromRow;

use seatbroker_core::types::{BatchId, CodeId, MotherId, SeatId};

use super::status::CodeStatus;

/// A single-use redeem code. Only the hash of the plaintext is stored.
#[derive(Debug, Clone, Serialize, Deserialize, FromRow)]
pub struct RedeemCode {
    /// Unique code identifier.
    pub id: CodeId,
    /// Hex SHA-256 of the normalized plaintext code.
    pub code_hash: String,
    /// Generation batch.
    pub batch_id: BatchId,
    /// Non-secret prefix of the plaintext, for operator lookup.
    pub plaintext_prefix: String,
    /// Redemption status.
    pub status: CodeStatus,
    /// Independent deactivation flag.
    pub active: bool,
    /// Deadline for first redemption.
    pub expires_at: Option<DateTime<Utc>>,
    /// SKU lifecycle plan name.
    pub lifecycle_plan: Option<String>,
    /// Lifecycle length in days, started on first bind.
    pub lifecycle_days: Option<i32>,
    /// When the lifecycle timer started.
    pub lifecycle_started_at: Option<DateTime<Utc>>,
    /// When the lifecycle ends.
    pub lifecycle_expires_at: Option<DateTime<Utc>>,
    /// Maximum number of switches.
    pub switch_limit: i32,
    /// Switches performed so far.
    pub switch_count: i32,
    /// Maximum number of refreshes.
    pub refresh_limit: i32,
    /// Refreshes performed so far.
    pub refresh_used: i32,
    /// Last successful refresh.
    pub last_refreshed_at: Option<DateTime<Utc>>,
    /// Email currently bound to the code.
    pub bound_email: Option<String>,
    /// Team the code was first bound to.
    pub bound_team_id: Option<String>,
    /// Team the code currently occupies.
    pub current_team_id: Option<String>,
    /// Mother account the code currently occupies.
    pub bound_mother_id: Option<MotherId>,
    /// When the code was generated.
    pub created_at: DateTime<Utc>,
    /// When the row last changed.
    pub updated_at: DateTime<Utc>,
}

impl RedeemCode {
    /// Whether the lifecycle timer has run out.
    pub fn is_lifecycle_expired(&self, now: DateTime<Utc>) -> bool {
        self.lifecycle_expires_at.is_some_and(|at| at < now)
    }

    /// Whether the redemption deadline has passed.
    pub fn is_past_redeem_deadline(&self, now: DateTime<Utc>) -> bool {
        self.expires_at.is_some_and(|at| at <= now)
    }

    /// Whether the code counts toward reserved capacity.
    pub fn is_reserved(&self, now: DateTime<Utc>) -> bool {
        self.status == CodeStatus::Unused && !self.is_past_redeem_deadline(now)
    }

    /// Whether another switch is permitted.
    pub fn has_switches_left(&self) -> bool {
        self.switch_count < self.switch_limit
    }

    /// Refreshes still available.
    pub fn refresh_remaining(&self) -> i32 {
        (self.refresh_limit - self.refresh_used).max(0)
    }

    /// Whether `email` is the address currently bound to this code.
    pub fn is_bound_to(&self, email: &str) -> bool {
        self.bound_email.as_deref() == Some(email)
    }

    /// Lifecycle end for a bind happening at `now`, if the SKU has one.
    pub fn lifecycle_end_from(&self, now: DateTime<Utc>) -> Option<DateTime<Utc>> {
        self.lifecycle_days
            .map(|days| now + Duration::days(i64::from(days)))
    }
}

/// Per-SKU defaults stamped onto generated codes.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct SkuDefaults {
    /// Lifecycle plan name.
    pub lifecycle_plan: Option<String>,
    /// Lifecycle length in days.
    pub lifecycle_days: Option<i32>,
    /// Maximum switches.
    pub switch_limit: i32,
    /// Maximum refreshes.
    pub refresh_limit: i32,
}

/// Data required to insert a new code.
#[derive(Debug, Clone)]
pub struct NewRedeemCode {
    /// Hex SHA-256 of the plaintext.
    pub code_hash: String,
    /// Generation batch.
    pub batch_id: BatchId,
    /// Non-secret prefix.
    pub plaintext_prefix: String,
    /// Redemption deadline.
    pub expires_at: Option<DateTime<Utc>>,
    /// SKU defaults.
    pub sku: SkuDefaults,
}

impl NewRedeemCode {
    /// Materialize the row as it is first persisted.
    pub fn into_code(self, now: DateTime<Utc>) -> RedeemCode {
        RedeemCode {
            id: CodeId::new(),
            code_hash: self.code_hash,
            batch_id: self.batch_id,
            plaintext_prefix: self.plaintext_prefix,
            status: CodeStatus::Unused,
            active: true,
            expires_at: self.expires_at,
            lifecycle_plan: self.sku.lifecycle_plan,
            lifecycle_days: self.sku.lifecycle_days,
            lifecycle_started_at: None,
            lifecycle_expires_at: None,
            switch_limit: self.sku.switch_limit,
            switch_count: 0,
            refresh_limit: self.sku.refresh_limit,
            refresh_used: 0,
            last_refreshed_at: None,
            bound_email: None,
            bound_team_id: None,
            current_team_id: None,
            bound_mother_id: None,
            created_at: now,
            updated_at: now,
        }
    }
}

/// Where a code landed after a successful bind.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct CodeBinding {
    /// The seat now used by the code.
    pub seat_id: SeatId,
    /// Owning mother account.
    pub mother_id: MotherId,
    /// Remote team id.
    pub team_id: String,
    /// Bound email.
    pub email: String,
    /// Invite request id returned by the provider.
    pub invite_id: Option<String>,
}
