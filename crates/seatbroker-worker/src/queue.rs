//! Job queue: deduplicated enqueue, leased claim and retry bookkeeping.

use std::sync::Arc;
use std::time::Duration;

use chrono::Duration as ChronoDuration;
use rand::Rng;
use serde_json::Value;
use tracing::{debug, warn};

use seatbroker_core::config::WorkerConfig;
use seatbroker_core::result::AppResult;
use seatbroker_core::traits::{DistributedLock, LockAttempt, LockToken, ReleaseOutcome};
use seatbroker_core::types::{Clock, JobId};
use seatbroker_database::{JobRepository, QueueStats};
use seatbroker_entity::{BatchJob, JobPayload, JobStatus, NewBatchJob};

fn to_chrono(duration: Duration) -> ChronoDuration {
    ChronoDuration::from_std(duration).unwrap_or_else(|_| ChronoDuration::days(1))
}

/// Result of an enqueue call.
#[derive(Debug, Clone)]
pub struct Enqueued {
    /// The pending or running job carrying the payload.
    pub job: BatchJob,
    /// Whether this call inserted it.
    pub created: bool,
}

/// Job queue for enqueuing and leasing work.
#[derive(Debug, Clone)]
pub struct JobQueue {
    jobs: Arc<dyn JobRepository>,
    lock: Arc<dyn DistributedLock>,
    clock: Arc<dyn Clock>,
    config: WorkerConfig,
    worker_id: String,
    lock_ttl: Duration,
}

impl JobQueue {
    /// Create a new job queue.
    pub fn new(
        jobs: Arc<dyn JobRepository>,
        lock: Arc<dyn DistributedLock>,
        clock: Arc<dyn Clock>,
        config: WorkerConfig,
        worker_id: String,
        lock_ttl: Duration,
    ) -> Self {
        Self {
            jobs,
            lock,
            clock,
            config,
            worker_id,
            lock_ttl,
        }
    }

    /// This runner's identifier.
    pub fn worker_id(&self) -> &str {
        &self.worker_id
    }

    /// Enqueue a job with the default attempt budget.
    pub async fn enqueue(&self, payload: JobPayload) -> AppResult<Enqueued> {
        self.enqueue_with_attempts(payload, self.config.default_max_attempts)
            .await
    }

    /// Enqueue a job. Singleton payloads (see [`JobPayload::dedup_key`]) are
    /// deduplicated against pending and running jobs: the scan and insert
    /// run under a short-lived lock on the dedup key.
    pub async fn enqueue_with_attempts(&self, payload: JobPayload, max_attempts: i32) -> AppResult<Enqueued> {
        let Some(key) = payload.dedup_key() else {
            return self.insert(payload, max_attempts).await;
        };

        let lock_name = format!("enqueue:{key}");
        let token = self.acquire_enqueue_lock(&lock_name).await;
        let result = self.insert_unless_active(payload, max_attempts).await;
        if let Some(token) = token {
            match self.lock.release(&lock_name, &token).await {
                ReleaseOutcome::Released => {}
                ReleaseOutcome::NotHeld => {
                    warn!(lock = %lock_name, "Enqueue lock expired before release");
                }
                ReleaseOutcome::StoreUnavailable { reason } => {
                    warn!(lock = %lock_name, reason = %reason, "Could not release enqueue lock");
                }
            }
        }
        result
    }

    /// Lease the next claimable job.
    pub async fn claim(&self) -> AppResult<Option<BatchJob>> {
        let now = self.clock.now();
        let job = self
            .jobs
            .claim_next(&self.worker_id, now + to_chrono(self.config.lease()), now)
            .await?;
        if let Some(job) = &job {
            debug!(job_id = %job.id, job_type = %job.job_type, attempts = job.attempts, "Claimed job");
        }
        Ok(job)
    }

    /// Mark a leased job succeeded.
    pub async fn complete(&self, job: &BatchJob, result: Option<&Value>) -> AppResult<bool> {
        let done = self
            .jobs
            .complete(job.id, &self.worker_id, result, self.clock.now())
            .await?;
        if !done {
            warn!(job_id = %job.id, "Lease lost before completion");
        }
        Ok(done)
    }

    /// Count a failed attempt. Retryable failures with budget left go back
    /// to pending behind an exponential backoff; everything else fails for
    /// good. Returns the resulting status.
    pub async fn fail(&self, job: &BatchJob, error: &str, retryable: bool) -> AppResult<JobStatus> {
        let now = self.clock.now();
        let attempts = job.attempts + 1;
        if retryable && attempts < job.max_attempts {
            let retry_at = now + to_chrono(self.config.backoff(attempts));
            self.jobs
                .reschedule(job.id, &self.worker_id, attempts, retry_at, error, now)
                .await?;
            debug!(job_id = %job.id, attempts, retry_at = %retry_at, "Job rescheduled");
            Ok(JobStatus::Pending)
        } else {
            self.jobs
                .fail(job.id, &self.worker_id, attempts, error, now)
                .await?;
            warn!(job_id = %job.id, attempts, error = %error, "Job failed permanently");
            Ok(JobStatus::Failed)
        }
    }

    /// Job counts by status.
    pub async fn stats(&self) -> AppResult<QueueStats> {
        self.jobs.stats().await
    }

    /// Load a job by id.
    pub async fn find(&self, id: JobId) -> AppResult<Option<BatchJob>> {
        self.jobs.find_by_id(id).await
    }

    /// Try to take the enqueue lock, waiting up to its TTL while another
    /// holder has it. `None` means proceeding without exclusion.
    async fn acquire_enqueue_lock(&self, name: &str) -> Option<LockToken> {
        let deadline = tokio::time::Instant::now() + self.lock_ttl;
        loop {
            match self.lock.try_acquire(name, self.lock_ttl).await {
                LockAttempt::Acquired(token) => return Some(token),
                LockAttempt::StoreUnavailable { reason } => {
                    warn!(lock = %name, reason = %reason, "Lock store unavailable, enqueueing without exclusion");
                    return None;
                }
                LockAttempt::Held => {
                    if tokio::time::Instant::now() >= deadline {
                        warn!(lock = %name, "Enqueue lock still held after its TTL, proceeding");
                        return None;
                    }
                    let pause = rand::thread_rng().gen_range(2..=10);
                    tokio::time::sleep(Duration::from_millis(pause)).await;
                }
            }
        }
    }

    async fn insert_unless_active(&self, payload: JobPayload, max_attempts: i32) -> AppResult<Enqueued> {
        let active = self.jobs.find_active_by_type(payload.job_type()).await?;
        if let Some(existing) = active.into_iter().find(|job| job.payload == payload) {
            debug!(job_id = %existing.id, job_type = %existing.job_type, "Reusing active job");
            return Ok(Enqueued {
                job: existing,
                created: false,
            });
        }
        self.insert(payload, max_attempts).await
    }

    async fn insert(&self, payload: JobPayload, max_attempts: i32) -> AppResult<Enqueued> {
        let job = NewBatchJob {
            payload,
            max_attempts: max_attempts.max(1),
        }
        .into_job(self.clock.now());
        self.jobs.insert(&job).await?;
        debug!(job_id = %job.id, job_type = %job.job_type, "Enqueued job");
        Ok(Enqueued { job, created: true })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::Utc;
    use futures::future::join_all;
    use seatbroker_coordination::MemoryLock;
    use seatbroker_core::types::ManualClock;
    use seatbroker_database::Repositories;

    fn queue(clock: Arc<ManualClock>) -> JobQueue {
        let repos = Repositories::memory();
        let config = WorkerConfig {
            backoff_base_seconds: 5,
            backoff_max_seconds: 60,
            ..WorkerConfig::default()
        };
        JobQueue::new(
            repos.jobs,
            Arc::new(MemoryLock::new(clock.clone())),
            clock,
            config,
            "worker-test".to_string(),
            Duration::from_secs(30),
        )
    }

    #[tokio::test]
    async fn test_concurrent_singleton_enqueue_creates_one_job() {
        let clock = Arc::new(ManualClock::new(Utc::now()));
        let queue = queue(clock);

        let results = join_all(
            (0..100).map(|_| queue.enqueue(JobPayload::DrainSwitchQueue { limit: 10 })),
        )
        .await;

        let created = results
            .iter()
            .filter(|r| r.as_ref().map(|e| e.created).unwrap_or(false))
            .count();
        assert_eq!(created, 1);
        let stats = queue.stats().await.unwrap();
        assert_eq!(stats.pending, 1);
    }

    #[tokio::test]
    async fn test_enqueue_after_completion_creates_new_job() {
        let clock = Arc::new(ManualClock::new(Utc::now()));
        let queue = queue(clock);

        let first = queue
            .enqueue(JobPayload::DrainSwitchQueue { limit: 10 })
            .await
            .unwrap();
        let job = queue.claim().await.unwrap().unwrap();
        assert_eq!(job.id, first.job.id);
        assert!(queue.complete(&job, None).await.unwrap());

        let second = queue
            .enqueue(JobPayload::DrainSwitchQueue { limit: 10 })
            .await
            .unwrap();
        assert!(second.created);
        assert_ne!(second.job.id, first.job.id);
    }

    #[tokio::test]
    async fn test_retryable_failure_is_rescheduled_with_backoff() {
        let clock = Arc::new(ManualClock::new(Utc::now()));
        let queue = queue(clock.clone());

        queue
            .enqueue_with_attempts(JobPayload::DisableCodes { code_ids: vec![] }, 2)
            .await
            .unwrap();
        let job = queue.claim().await.unwrap().unwrap();
        let status = queue.fail(&job, "provider timeout", true).await.unwrap();
        assert_eq!(status, JobStatus::Pending);

        // Invisible until the first backoff step has passed.
        assert!(queue.claim().await.unwrap().is_none());
        clock.advance(ChronoDuration::seconds(6));
        let job = queue.claim().await.unwrap().unwrap();
        assert_eq!(job.attempts, 1);

        let status = queue.fail(&job, "provider timeout", true).await.unwrap();
        assert_eq!(status, JobStatus::Failed);
        let stored = queue.find(job.id).await.unwrap().unwrap();
        assert_eq!(stored.status, JobStatus::Failed);
        assert_eq!(stored.attempts, 2);
        assert_eq!(stored.last_error.as_deref(), Some("provider timeout"));
    }

    #[tokio::test]
    async fn test_permanent_failure_skips_retry() {
        let clock = Arc::new(ManualClock::new(Utc::now()));
        let queue = queue(clock);

        queue
            .enqueue(JobPayload::DisableCodes { code_ids: vec![] })
            .await
            .unwrap();
        let job = queue.claim().await.unwrap().unwrap();
        let status = queue.fail(&job, "bad payload", false).await.unwrap();
        assert_eq!(status, JobStatus::Failed);
        assert_eq!(queue.stats().await.unwrap().failed, 1);
    }
}
