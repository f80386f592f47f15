//! Typed job payload definitions.

use serde::{Deserialize, Serialize};

use seatbroker_core::types::{CodeId, GroupId, MotherId};

use super::status::JobType;

/// A `(mother, email)` pair targeted by an invite-maintenance job.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct InviteTarget {
    /// Mother account owning the seat.
    pub mother_id: MotherId,
    /// Email on that team.
    pub email: String,
}

/// Typed payloads, one variant per job type.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "job_type", rename_all = "kebab-case")]
pub enum JobPayload {
    /// Re-send invites to each target.
    ResendInvite {
        /// Targets.
        targets: Vec<InviteTarget>,
    },
    /// Cancel pending invites for each target.
    CancelInvite {
        /// Targets.
        targets: Vec<InviteTarget>,
    },
    /// Remove each target from its team and free the seat.
    RemoveMember {
        /// Targets.
        targets: Vec<InviteTarget>,
    },
    /// Deactivate the listed codes.
    DisableCodes {
        /// Codes to disable.
        code_ids: Vec<CodeId>,
    },
    /// Reconcile one mother account with the provider.
    PoolSyncMother {
        /// Mother account.
        mother_id: MotherId,
        /// Its naming group.
        group_id: Option<GroupId>,
    },
    /// Retry up to `limit` pending switch requests.
    DrainSwitchQueue {
        /// Requests per run.
        limit: u32,
    },
}

impl JobPayload {
    /// The discriminator of this payload.
    pub fn job_type(&self) -> JobType {
        match self {
            Self::ResendInvite { .. } => JobType::ResendInvite,
            Self::CancelInvite { .. } => JobType::CancelInvite,
            Self::RemoveMember { .. } => JobType::RemoveMember,
            Self::DisableCodes { .. } => JobType::DisableCodes,
            Self::PoolSyncMother { .. } => JobType::PoolSyncMother,
            Self::DrainSwitchQueue { .. } => JobType::DrainSwitchQueue,
        }
    }

    /// Lock name used to serialize duplicate enqueues, for job types that
    /// must not run twice concurrently.
    pub fn dedup_key(&self) -> Option<String> {
        match self {
            Self::PoolSyncMother {
                mother_id,
                group_id,
            } => Some(match group_id {
                Some(group_id) => format!("pool-sync-mother:{mother_id}:{group_id}"),
                None => format!("pool-sync-mother:{mother_id}:-"),
            }),
            Self::DrainSwitchQueue { .. } => Some("drain-switch-queue".to_string()),
            _ => None,
        }
    }
}
