//! Batch job repository implementation.

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use sqlx::PgPool;
use sqlx::types::Json;

use seatbroker_core::error::{AppError, ErrorKind};
use seatbroker_core::result::AppResult;
use seatbroker_core::types::JobId;
use seatbroker_entity::{BatchJob, JobStatus, JobType};

use crate::store::{JobRepository, QueueStats};

/// PostgreSQL storage for the leased job queue.
#[derive(Debug, Clone)]
pub struct PgJobRepository {
    pool: PgPool,
}

impl PgJobRepository {
    /// Create a new job repository.
    pub fn new(pool: PgPool) -> Self {
        Self { pool }
    }
}

#[async_trait]
impl JobRepository for PgJobRepository {
    async fn insert(&self, job: &BatchJob) -> AppResult<()> {
        sqlx::query(
            "INSERT INTO batch_jobs (id, job_type, status, payload, attempts, max_attempts, \
             visible_until, created_at, updated_at) \
             VALUES ($1, $2, $3, $4, $5, $6, $7, $8, $9)",
        )
        .bind(job.id)
        .bind(job.job_type)
        .bind(job.status)
        .bind(Json(&job.payload))
        .bind(job.attempts)
        .bind(job.max_attempts)
        .bind(job.visible_until)
        .bind(job.created_at)
        .bind(job.updated_at)
        .execute(&self.pool)
        .await
        .map_err(|e| AppError::with_source(ErrorKind::Database, "Failed to insert job", e))?;
        Ok(())
    }

    async fn find_by_id(&self, id: JobId) -> AppResult<Option<BatchJob>> {
        sqlx::query_as::<_, BatchJob>("SELECT * FROM batch_jobs WHERE id = $1")
            .bind(id)
            .fetch_optional(&self.pool)
            .await
            .map_err(|e| AppError::with_source(ErrorKind::Database, "Failed to find job", e))
    }

    async fn find_active_by_type(&self, job_type: JobType) -> AppResult<Vec<BatchJob>> {
        sqlx::query_as::<_, BatchJob>(
            "SELECT * FROM batch_jobs WHERE job_type = $1 AND status IN ('pending', 'running') \
             ORDER BY created_at ASC",
        )
        .bind(job_type)
        .fetch_all(&self.pool)
        .await
        .map_err(|e| AppError::with_source(ErrorKind::Database, "Failed to find active jobs", e))
    }

    async fn claim_next(
        &self,
        worker_id: &str,
        lease_until: DateTime<Utc>,
        now: DateTime<Utc>,
    ) -> AppResult<Option<BatchJob>> {
        sqlx::query_as::<_, BatchJob>(
            "UPDATE batch_jobs SET status = 'running', visible_until = $2, locked_by = $1, updated_at = $3 \
             WHERE id = ( \
                SELECT id FROM batch_jobs \
                WHERE (status = 'pending' AND (visible_until IS NULL OR visible_until <= $3)) \
                   OR (status = 'running' AND visible_until < $3) \
                ORDER BY created_at ASC \
                FOR UPDATE SKIP LOCKED \
                LIMIT 1 \
             ) RETURNING *",
        )
        .bind(worker_id)
        .bind(lease_until)
        .bind(now)
        .fetch_optional(&self.pool)
        .await
        .map_err(|e| AppError::with_source(ErrorKind::Database, "Failed to claim job", e))
    }

    async fn complete(
        &self,
        id: JobId,
        worker_id: &str,
        result: Option<&serde_json::Value>,
        now: DateTime<Utc>,
    ) -> AppResult<bool> {
        let outcome = sqlx::query(
            "UPDATE batch_jobs SET status = 'succeeded', result = $3, visible_until = NULL, \
             locked_by = NULL, updated_at = $4 \
             WHERE id = $1 AND status = 'running' AND locked_by = $2",
        )
        .bind(id)
        .bind(worker_id)
        .bind(result)
        .bind(now)
        .execute(&self.pool)
        .await
        .map_err(|e| AppError::with_source(ErrorKind::Database, "Failed to complete job", e))?;
        Ok(outcome.rows_affected() == 1)
    }

    async fn reschedule(
        &self,
        id: JobId,
        worker_id: &str,
        attempts: i32,
        retry_at: DateTime<Utc>,
        error: &str,
        now: DateTime<Utc>,
    ) -> AppResult<bool> {
        let outcome = sqlx::query(
            "UPDATE batch_jobs SET status = 'pending', attempts = $3, visible_until = $4, \
             last_error = $5, locked_by = NULL, updated_at = $6 \
             WHERE id = $1 AND status = 'running' AND locked_by = $2",
        )
        .bind(id)
        .bind(worker_id)
        .bind(attempts)
        .bind(retry_at)
        .bind(error)
        .bind(now)
        .execute(&self.pool)
        .await
        .map_err(|e| AppError::with_source(ErrorKind::Database, "Failed to reschedule job", e))?;
        Ok(outcome.rows_affected() == 1)
    }

    async fn fail(
        &self,
        id: JobId,
        worker_id: &str,
        attempts: i32,
        error: &str,
        now: DateTime<Utc>,
    ) -> AppResult<bool> {
        let outcome = sqlx::query(
            "UPDATE batch_jobs SET status = 'failed', attempts = $3, last_error = $4, \
             visible_until = NULL, locked_by = NULL, updated_at = $5 \
             WHERE id = $1 AND status = 'running' AND locked_by = $2",
        )
        .bind(id)
        .bind(worker_id)
        .bind(attempts)
        .bind(error)
        .bind(now)
        .execute(&self.pool)
        .await
        .map_err(|e| AppError::with_source(ErrorKind::Database, "Failed to fail job", e))?;
        Ok(outcome.rows_affected() == 1)
    }

    async fn stats(&self) -> AppResult<QueueStats> {
        let rows: Vec<(JobStatus, i64)> =
            sqlx::query_as("SELECT status, COUNT(*) FROM batch_jobs GROUP BY status")
                .fetch_all(&self.pool)
                .await
                .map_err(|e| AppError::with_source(ErrorKind::Database, "Failed to load job stats", e))?;

        let mut stats = QueueStats::default();
        for (status, count) in rows {
            let count = count.max(0) as u64;
            match status {
                JobStatus::Pending => stats.pending = count,
                JobStatus::Running => stats.running = count,
                JobStatus::Succeeded => stats.succeeded = count,
                JobStatus::Failed => stats.failed = count,
            }
        }
        Ok(stats)
    }
}
