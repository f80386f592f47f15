use async_trait::async_trait;
use chrono::{DateTime, Utc};

use seatbroker_core::result::AppResult;
use seatbroker_core::types::JobId;
use seatbroker_entity::{BatchJob, JobStatus, JobType};

use super::MemoryStore;
use crate::store::{JobRepository, QueueStats};

/// Apply `update` to a running job leased by `worker_id`.
fn with_lease(
    job: Option<&mut BatchJob>,
    worker_id: &str,
    update: impl FnOnce(&mut BatchJob),
) -> bool {
    match job {
        Some(job) if job.status == JobStatus::Running && job.locked_by.as_deref() == Some(worker_id) => {
            update(job);
            true
        }
        _ => false,
    }
}

#[async_trait]
impl JobRepository for MemoryStore {
    async fn insert(&self, job: &BatchJob) -> AppResult<()> {
        self.tables.lock().await.jobs.insert(job.id, job.clone());
        Ok(())
    }

    async fn find_by_id(&self, id: JobId) -> AppResult<Option<BatchJob>> {
        Ok(self.tables.lock().await.jobs.get(&id).cloned())
    }

    async fn find_active_by_type(&self, job_type: JobType) -> AppResult<Vec<BatchJob>> {
        let tables = self.tables.lock().await;
        let mut jobs: Vec<_> = tables
            .jobs
            .values()
            .filter(|j| {
                j.job_type == job_type && matches!(j.status, JobStatus::Pending | JobStatus::Running)
            })
            .cloned()
            .collect();
        jobs.sort_by_key(|j| (j.created_at, j.id));
        Ok(jobs)
    }

    async fn claim_next(
        &self,
        worker_id: &str,
        lease_until: DateTime<Utc>,
        now: DateTime<Utc>,
    ) -> AppResult<Option<BatchJob>> {
        let mut tables = self.tables.lock().await;
        let next = tables
            .jobs
            .values()
            .filter(|j| j.is_claimable(now))
            .min_by_key(|j| (j.created_at, j.id))
            .map(|j| j.id);

        let Some(job) = next.and_then(|id| tables.jobs.get_mut(&id)) else {
            return Ok(None);
        };
        job.status = JobStatus::Running;
        job.visible_until = Some(lease_until);
        job.locked_by = Some(worker_id.to_string());
        job.updated_at = now;
        Ok(Some(job.clone()))
    }

    async fn complete(
        &self,
        id: JobId,
        worker_id: &str,
        result: Option<&serde_json::Value>,
        now: DateTime<Utc>,
    ) -> AppResult<bool> {
        let mut tables = self.tables.lock().await;
        Ok(with_lease(tables.jobs.get_mut(&id), worker_id, |job| {
            job.status = JobStatus::Succeeded;
            job.result = result.cloned();
            job.visible_until = None;
            job.locked_by = None;
            job.updated_at = now;
        }))
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
        let mut tables = self.tables.lock().await;
        Ok(with_lease(tables.jobs.get_mut(&id), worker_id, |job| {
            job.status = JobStatus::Pending;
            job.attempts = attempts;
            job.visible_until = Some(retry_at);
            job.last_error = Some(error.to_string());
            job.locked_by = None;
            job.updated_at = now;
        }))
    }

    async fn fail(
        &self,
        id: JobId,
        worker_id: &str,
        attempts: i32,
        error: &str,
        now: DateTime<Utc>,
    ) -> AppResult<bool> {
        let mut tables = self.tables.lock().await;
        Ok(with_lease(tables.jobs.get_mut(&id), worker_id, |job| {
            job.status = JobStatus::Failed;
            job.attempts = attempts;
            job.last_error = Some(error.to_string());
            job.visible_until = None;
            job.locked_by = None;
            job.updated_at = now;
        }))
    }

    async fn stats(&self) -> AppResult<QueueStats> {
        let tables = self.tables.lock().await;
        let mut stats = QueueStats::default();
        for job in tables.jobs.values() {
            match job.status {
                JobStatus::Pending => stats.pending += 1,
                JobStatus::Running => stats.running += 1,
                JobStatus::Succeeded => stats.succeeded += 1,
                JobStatus::Failed => stats.failed += 1,
            }
        }
        Ok(stats)
    }
}
