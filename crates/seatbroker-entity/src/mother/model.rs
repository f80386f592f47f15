//! Mother account and group models.

use chrono::{DateTime, Duration, Utc};
use serde::{Deserialize, Serialize};
use sqlx::FromRow;

use seatbroker_core::types::{GroupId, MotherId};

/// Health status of a mother account.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize, sqlx::Type)]
#[sqlx(type_name = "mother_status", rename_all = "lowercase")]
#[serde(rename_all = "lowercase")]
pub enum MotherStatus {
    /// Usable.
    Active,
    /// The provider rejected its credentials (401/403).
    Invalid,
    /// Turned off by an operator.
    Disabled,
}

/// An external team account providing a fixed number of seats.
#[derive(Debug, Clone, Serialize, Deserialize, FromRow)]
pub struct MotherAccount {
    /// Account id.
    pub id: MotherId,
    /// Operator-facing name.
    pub name: String,
    /// Naming group, if any.
    pub group_id: Option<GroupId>,
    /// Remote team id.
    pub team_id: String,
    /// Last known remote team name.
    pub team_name: Option<String>,
    /// Opaque provider credential.
    #[serde(skip_serializing)]
    pub access_token: String,
    /// Number of seats the team provides.
    pub seat_limit: i32,
    /// Health status.
    pub status: MotherStatus,
    /// Last successful provider contact.
    pub last_seen_alive_at: Option<DateTime<Utc>>,
    /// When the account was provisioned.
    pub created_at: DateTime<Utc>,
    /// When the row last changed.
    pub updated_at: DateTime<Utc>,
}

impl MotherAccount {
    /// Active, and either seen alive within `grace` or never checked.
    pub fn is_healthy(&self, now: DateTime<Utc>, grace: Duration) -> bool {
        self.status == MotherStatus::Active
            && self
                .last_seen_alive_at
                .is_none_or(|seen| now - seen <= grace)
    }
}

/// A naming group for mother accounts.
#[derive(Debug, Clone, Serialize, Deserialize, FromRow)]
pub struct MotherGroup {
    /// Group id.
    pub id: GroupId,
    /// Operator-facing name.
    pub name: String,
    /// Prefix for team names in this group.
    pub team_name_prefix: String,
}

impl MotherGroup {
    /// Target team name for a member account: `"{prefix}-{n}"`.
    pub fn target_team_name(&self, mother_id: MotherId) -> String {
        let simple = mother_id.into_uuid().simple().to_string();
        let suffix = &simple[simple.len() - 8..];
        format!("{}-{}", self.team_name_prefix, suffix)
    }

    /// Whether `name` already follows this group's pattern.
    pub fn matches_pattern(&self, name: &str) -> bool {
        name.strip_prefix(&self.team_name_prefix)
            .and_then(|rest| rest.strip_prefix('-'))
            .is_some_and(|rest| !rest.is_empty())
    }
}
