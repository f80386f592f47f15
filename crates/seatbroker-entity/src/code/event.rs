//! Append-only code event log.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use sqlx::FromRow;

use seatbroker_core::types::{CodeEventId, CodeId, MotherId};

/// Kind of lifecycle event recorded against a code.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize, sqlx::Type)]
#[sqlx(type_name = "code_event_kind", rename_all = "lowercase")]
#[serde(rename_all = "lowercase")]
pub enum CodeEventKind {
    /// First successful redemption.
    Bind,
    /// Moved to another seat.
    Switch,
    /// Invite re-sent or email changed through refresh.
    Refresh,
    /// Lifecycle or unused expiry observed.
    Expire,
    /// Administratively deactivated.
    Disable,
}

/// One row of the code history. Never updated or deleted.
#[derive(Debug, Clone, Serialize, Deserialize, FromRow)]
pub struct CodeEvent {
    /// Event id.
    pub id: CodeEventId,
    /// The code this event belongs to.
    pub code_id: CodeId,
    /// Event kind.
    pub kind: CodeEventKind,
    /// Email involved, if any.
    pub email: Option<String>,
    /// Team the code was bound to by this event.
    pub team_id: Option<String>,
    /// Mother account involved.
    pub mother_id: Option<MotherId>,
    /// Free-form detail.
    pub detail: Option<String>,
    /// When the event happened.
    pub created_at: DateTime<Utc>,
}

impl CodeEvent {
    /// Build a new event stamped at `now`.
    pub fn new(code_id: CodeId, kind: CodeEventKind, now: DateTime<Utc>) -> Self {
        Self {
            id: CodeEventId::new(),
            code_id,
            kind,
            email: None,
            team_id: None,
            mother_id: None,
            detail: None,
            created_at: now,
        }
    }

    /// Attach the seat the event refers to.
    pub fn at_seat(mut self, email: &str, team_id: &str, mother_id: MotherId) -> Self {
        self.email = Some(email.to_string());
        self.team_id = Some(team_id.to_string());
        self.mother_id = Some(mother_id);
        self
    }

    /// Attach a detail message.
    pub fn with_detail(mut self, detail: impl Into<String>) -> Self {
        self.detail = Some(detail.into());
        self
    }
}
