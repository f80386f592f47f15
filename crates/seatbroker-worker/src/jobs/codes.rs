//! Bulk code deactivation.

use async_trait::async_trait;
use serde_json::{json, Value};

use seatbroker_entity::{BatchJob, JobPayload, JobType};
use seatbroker_service::CodeLedger;

use crate::executor::{JobExecutionError, JobHandler};

/// Handles `disable-codes` jobs. Already inactive codes are skipped, so a
/// rerun only touches what is left.
#[derive(Debug)]
pub struct DisableCodesHandler {
    ledger: CodeLedger,
}

impl DisableCodesHandler {
    /// Create the handler.
    pub fn new(ledger: CodeLedger) -> Self {
        Self { ledger }
    }
}

#[async_trait]
impl JobHandler for DisableCodesHandler {
    fn job_type(&self) -> JobType {
        JobType::DisableCodes
    }

    async fn execute(&self, job: &BatchJob) -> Result<Option<Value>, JobExecutionError> {
        let JobPayload::DisableCodes { code_ids } = &job.payload else {
            return Err(JobExecutionError::Permanent("Expected disable-codes payload".into()));
        };
        let disabled = self.ledger.disable_codes(code_ids).await?;
        Ok(Some(json!({
            "requested": code_ids.len(),
            "disabled": disabled,
            "skipped": code_ids.len() as u64 - disabled,
        })))
    }
}
