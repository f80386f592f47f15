//! Job status and type enumerations.

use serde::{Deserialize, Serialize};
use std::fmt;

/// Status of a background job.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize, sqlx::Type)]
#[sqlx(type_name = "job_status", rename_all = "lowercase")]
#[serde(rename_all = "lowercase")]
pub enum JobStatus {
    /// Waiting for a runner, possibly until `visible_until` after a failure.
    Pending,
    /// Leased by a runner until `visible_until`.
    Running,
    /// Completed.
    Succeeded,
    /// Failed after all attempts.
    Failed,
}

impl JobStatus {
    /// Check if the job is in a terminal state.
    pub fn is_terminal(&self) -> bool {
        matches!(self, Self::Succeeded | Self::Failed)
    }

    /// Return the status as a lowercase string.
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Pending => "pending",
            Self::Running => "running",
            Self::Succeeded => "succeeded",
            Self::Failed => "failed",
        }
    }
}

impl fmt::Display for JobStatus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.as_str())
    }
}

/// Discriminator of [`JobPayload`](super::JobPayload), stored in its own column.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize, sqlx::Type)]
#[sqlx(type_name = "job_type", rename_all = "kebab-case")]
#[serde(rename_all = "kebab-case")]
pub enum JobType {
    /// Re-send invites.
    ResendInvite,
    /// Cancel outstanding invites.
    CancelInvite,
    /// Remove team members.
    RemoveMember,
    /// Deactivate codes.
    DisableCodes,
    /// Reconcile one mother account with its remote team.
    PoolSyncMother,
    /// Retry queued switch requests.
    DrainSwitchQueue,
}

impl JobType {
    /// Return the type as the string used for handler dispatch.
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::ResendInvite => "resend-invite",
            Self::CancelInvite => "cancel-invite",
            Self::RemoveMember => "remove-member",
            Self::DisableCodes => "disable-codes",
            Self::PoolSyncMother => "pool-sync-mother",
            Self::DrainSwitchQueue => "drain-switch-queue",
        }
    }
}

impl fmt::Display for JobType {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.as_str())
    }
}
