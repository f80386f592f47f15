//! Job executor: dispatches jobs to registered handlers.

use std::collections::HashMap;
use std::sync::Arc;

use async_trait::async_trait;
use serde_json::Value;
use tracing::info;

use seatbroker_core::error::{AppError, ErrorKind};
use seatbroker_entity::{BatchJob, JobType};

/// A handler for one job type. Handlers must be idempotent: a job may run
/// again after a lost lease or a partial failure.
#[async_trait]
pub trait JobHandler: Send + Sync + std::fmt::Debug {
    /// The job type this handler processes.
    fn job_type(&self) -> JobType;

    /// Execute the job, returning an optional JSON result.
    async fn execute(&self, job: &BatchJob) -> Result<Option<Value>, JobExecutionError>;
}

/// Error from job execution.
#[derive(Debug, thiserror::Error)]
pub enum JobExecutionError {
    /// Permanent failure, do not retry.
    #[error("Permanent job failure: {0}")]
    Permanent(String),

    /// Transient failure, may retry.
    #[error("Transient job failure: {0}")]
    Transient(String),

    /// Error raised by the engine.
    #[error("Internal error: {0}")]
    Internal(#[from] AppError),
}

impl JobExecutionError {
    /// Whether the runner should schedule another attempt.
    pub fn is_retryable(&self) -> bool {
        match self {
            Self::Permanent(_) => false,
            Self::Transient(_) => true,
            Self::Internal(err) => !matches!(
                err.kind,
                ErrorKind::Validation | ErrorKind::NotFound | ErrorKind::NotImplemented
            ),
        }
    }
}

/// Dispatches jobs to the handler registered for their type.
#[derive(Debug, Default)]
pub struct JobExecutor {
    handlers: HashMap<JobType, Arc<dyn JobHandler>>,
}

impl JobExecutor {
    /// Create an executor with no handlers.
    pub fn new() -> Self {
        Self::default()
    }

    /// Register a handler, replacing any previous one for the same type.
    pub fn register(&mut self, handler: Arc<dyn JobHandler>) {
        let job_type = handler.job_type();
        info!(job_type = %job_type, "Registered job handler");
        self.handlers.insert(job_type, handler);
    }

    /// Execute a job with its handler.
    pub async fn execute(&self, job: &BatchJob) -> Result<Option<Value>, JobExecutionError> {
        let handler = self.handlers.get(&job.job_type).ok_or_else(|| {
            JobExecutionError::Permanent(format!(
                "No handler registered for job type '{}'",
                job.job_type
            ))
        })?;
        if handler.job_type() != job.payload.job_type() {
            return Err(JobExecutionError::Permanent(format!(
                "Payload of job {} does not match its type '{}'",
                job.id, job.job_type
            )));
        }
        handler.execute(job).await
    }

    /// Whether a handler is registered for a job type.
    pub fn has_handler(&self, job_type: JobType) -> bool {
        self.handlers.contains_key(&job_type)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_retry_classification() {
        assert!(JobExecutionError::Transient("x".into()).is_retryable());
        assert!(!JobExecutionError::Permanent("x".into()).is_retryable());
        assert!(JobExecutionError::Internal(AppError::database("down")).is_retryable());
        assert!(!JobExecutionError::Internal(AppError::validation("bad")).is_retryable());
    }
}
