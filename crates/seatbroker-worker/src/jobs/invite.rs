//! Batch invite jobs: resend, cancel and remove.

use async_trait::async_trait;
use serde_json::Value;
use tracing::info;

use seatbroker_core::error::AppError;
use seatbroker_entity::{BatchJob, JobPayload, JobType};
use seatbroker_service::{BatchCounts, PoolService};

use crate::executor::{JobExecutionError, JobHandler};

/// Handles one of the three batch invite job types.
#[derive(Debug)]
pub struct InviteJobHandler {
    pool: PoolService,
    job_type: JobType,
}

impl InviteJobHandler {
    /// Handler for `resend-invite`.
    pub fn resend(pool: PoolService) -> Self {
        Self {
            pool,
            job_type: JobType::ResendInvite,
        }
    }

    /// Handler for `cancel-invite`.
    pub fn cancel(pool: PoolService) -> Self {
        Self {
            pool,
            job_type: JobType::CancelInvite,
        }
    }

    /// Handler for `remove-member`.
    pub fn remove(pool: PoolService) -> Self {
        Self {
            pool,
            job_type: JobType::RemoveMember,
        }
    }
}

#[async_trait]
impl JobHandler for InviteJobHandler {
    fn job_type(&self) -> JobType {
        self.job_type
    }

    async fn execute(&self, job: &BatchJob) -> Result<Option<Value>, JobExecutionError> {
        let counts: BatchCounts = match &job.payload {
            JobPayload::ResendInvite { targets } => self.pool.resend_invites(targets).await?,
            JobPayload::CancelInvite { targets } => self.pool.cancel_invites(targets).await?,
            JobPayload::RemoveMember { targets } => self.pool.remove_members(targets).await?,
            other => {
                return Err(JobExecutionError::Permanent(format!(
                    "Unexpected payload {} for {}",
                    other.job_type(),
                    self.job_type
                )));
            }
        };

        info!(
            job_id = %job.id,
            job_type = %self.job_type,
            succeeded = counts.succeeded,
            failed = counts.failed,
            "Batch invite job finished"
        );
        if counts.has_failures() {
            return Err(JobExecutionError::Transient(format!(
                "{} of {} targets failed",
                counts.failed, counts.total
            )));
        }
        Ok(Some(serde_json::to_value(counts).map_err(AppError::from)?))
    }
}
