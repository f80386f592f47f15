//! Mother pool synchronisation.

use async_trait::async_trait;
use serde_json::Value;

use seatbroker_core::error::AppError;
use seatbroker_entity::{BatchJob, JobPayload, JobType};
use seatbroker_service::PoolService;

use crate::executor::{JobExecutionError, JobHandler};

/// Handles `pool-sync-mother` jobs.
#[derive(Debug)]
pub struct PoolSyncHandler {
    pool: PoolService,
}

impl PoolSyncHandler {
    /// Create the handler.
    pub fn new(pool: PoolService) -> Self {
        Self { pool }
    }
}

#[async_trait]
impl JobHandler for PoolSyncHandler {
    fn job_type(&self) -> JobType {
        JobType::PoolSyncMother
    }

    async fn execute(&self, job: &BatchJob) -> Result<Option<Value>, JobExecutionError> {
        let JobPayload::PoolSyncMother {
            mother_id,
            group_id,
        } = &job.payload
        else {
            return Err(JobExecutionError::Permanent("Expected pool-sync-mother payload".into()));
        };
        let report = self.pool.sync_mother(*mother_id, *group_id).await?;
        Ok(Some(serde_json::to_value(report).map_err(AppError::from)?))
    }
}
