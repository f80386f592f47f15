//! Switch queue draining.

use async_trait::async_trait;
use serde_json::Value;

use seatbroker_core::error::AppError;
use seatbroker_entity::{BatchJob, JobPayload, JobType};
use seatbroker_service::SwitchCoordinator;

use crate::executor::{JobExecutionError, JobHandler};

/// Handles `drain-switch-queue` jobs.
#[derive(Debug)]
pub struct DrainSwitchQueueHandler {
    switcher: SwitchCoordinator,
}

impl DrainSwitchQueueHandler {
    /// Create the handler.
    pub fn new(switcher: SwitchCoordinator) -> Self {
        Self { switcher }
    }
}

#[async_trait]
impl JobHandler for DrainSwitchQueueHandler {
    fn job_type(&self) -> JobType {
        JobType::DrainSwitchQueue
    }

    async fn execute(&self, job: &BatchJob) -> Result<Option<Value>, JobExecutionError> {
        let JobPayload::DrainSwitchQueue { limit } = &job.payload else {
            return Err(JobExecutionError::Permanent("Expected drain-switch-queue payload".into()));
        };
        let report = self.switcher.drain(*limit).await?;
        Ok(Some(serde_json::to_value(report).map_err(AppError::from)?))
    }
}
