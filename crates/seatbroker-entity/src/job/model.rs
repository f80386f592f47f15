//! Batch job entity model.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use sqlx::FromRow;

use seatbroker_core::types::JobId;

use super::payload::JobPayload;
use super::status::{JobStatus, JobType};

/// A leased background job.
#[derive(Debug, Clone, Serialize, Deserialize, FromRow)]
pub struct BatchJob {
    /// Job id.
    pub id: JobId,
    /// Discriminator, duplicated from the payload for indexing.
    pub job_type: JobType,
    /// Current status.
    pub status: JobStatus,
    /// Typed payload.
    #[sqlx(json)]
    pub payload: JobPayload,
    /// Attempts consumed so far.
    pub attempts: i32,
    /// Attempts allowed before the job fails for good.
    pub max_attempts: i32,
    /// Lease expiry while running; earliest retry time while pending.
    pub visible_until: Option<DateTime<Utc>>,
    /// Last handler error.
    pub last_error: Option<String>,
    /// Handler result with success/failure sub-counts.
    pub result: Option<serde_json::Value>,
    /// Runner holding the lease.
    pub locked_by: Option<String>,
    /// When the job was enqueued.
    pub created_at: DateTime<Utc>,
    /// When the row last changed.
    pub updated_at: DateTime<Utc>,
}

impl BatchJob {
    /// Whether a runner may claim this job at `now`.
    pub fn is_claimable(&self, now: DateTime<Utc>) -> bool {
        match self.status {
            JobStatus::Pending => self.visible_until.is_none_or(|at| at <= now),
            JobStatus::Running => self.visible_until.is_some_and(|at| at < now),
            JobStatus::Succeeded | JobStatus::Failed => false,
        }
    }
}

/// Data required to enqueue a job.
#[derive(Debug, Clone)]
pub struct NewBatchJob {
    /// Typed payload.
    pub payload: JobPayload,
    /// Attempts allowed.
    pub max_attempts: i32,
}

impl NewBatchJob {
    /// Materialize the pending row.
    pub fn into_job(self, now: DateTime<Utc>) -> BatchJob {
        BatchJob {
            id: JobId::new(),
            job_type: self.payload.job_type(),
            status: JobStatus::Pending,
            payload: self.payload,
            attempts: 0,
            max_attempts: self.max_attempts,
            visible_until: None,
            last_error: None,
            result: None,
            locked_by: None,
            created_at: now,
            updated_at: now,
        }
    }
}
