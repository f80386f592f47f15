//! Worker runner: polls the queue and executes leased jobs.

use std::sync::Arc;
use std::time::Duration;

use tokio::sync::{watch, Semaphore};
use tokio::time;
use tracing::{debug, error, info, warn};

use seatbroker_core::config::WorkerConfig;
use seatbroker_core::result::AppResult;
use seatbroker_entity::{BatchJob, JobStatus};

use crate::backoff::Backoff;
use crate::executor::JobExecutor;
use crate::queue::JobQueue;

/// Main worker runner that polls the queue and executes jobs.
#[derive(Debug)]
pub struct WorkerRunner {
    queue: Arc<JobQueue>,
    executor: Arc<JobExecutor>,
    config: WorkerConfig,
}

impl WorkerRunner {
    /// Create a new worker runner.
    pub fn new(queue: Arc<JobQueue>, executor: Arc<JobExecutor>, config: WorkerConfig) -> Self {
        Self {
            queue,
            executor,
            config,
        }
    }

    /// Run until the stop signal flips to `true`, then wait for in-flight
    /// jobs up to the shutdown timeout.
    pub async fn run(&self, mut stop: watch::Receiver<bool>) {
        let worker_id = self.queue.worker_id().to_string();
        info!(
            worker_id = %worker_id,
            concurrency = self.config.concurrency,
            poll_interval_seconds = self.config.poll_interval_seconds,
            "Worker started"
        );

        let concurrency = self.config.concurrency.max(1);
        let semaphore = Arc::new(Semaphore::new(concurrency));
        let poll_interval = Duration::from_secs(self.config.poll_interval_seconds.max(1));
        let mut backoff = Backoff::new(poll_interval, Duration::from_secs(self.config.backoff_max_seconds.max(1)));

        loop {
            if *stop.borrow() {
                info!(worker_id = %worker_id, "Worker received shutdown signal");
                break;
            }
            let pause = match self.poll_and_spawn(&semaphore).await {
                Ok(true) => {
                    backoff.reset();
                    continue;
                }
                Ok(false) => {
                    backoff.reset();
                    poll_interval
                }
                Err(e) => {
                    let delay = backoff.next_delay();
                    error!(worker_id = %worker_id, error = %e, delay_ms = delay.as_millis() as u64, "Failed to poll job queue");
                    delay
                }
            };
            tokio::select! {
                changed = stop.changed() => {
                    if changed.is_err() {
                        break;
                    }
                }
                _ = time::sleep(pause) => {}
            }
        }

        info!(worker_id = %worker_id, "Waiting for in-flight jobs");
        let permits = u32::try_from(concurrency).unwrap_or(u32::MAX);
        let timeout = Duration::from_secs(self.config.shutdown_timeout_seconds);
        if time::timeout(timeout, semaphore.acquire_many(permits)).await.is_err() {
            warn!(worker_id = %worker_id, "In-flight jobs still running at shutdown timeout");
        }
        info!(worker_id = %worker_id, "Worker shut down");
    }

    /// Claim and execute one job inline. `None` when nothing was claimable.
    pub async fn run_once(&self) -> AppResult<Option<JobStatus>> {
        match self.queue.claim().await? {
            Some(job) => Ok(Some(
                process(self.queue.clone(), self.executor.clone(), job).await,
            )),
            None => Ok(None),
        }
    }

    /// Claim one job if a slot is free and run it in the background.
    /// Returns whether a job was started.
    async fn poll_and_spawn(&self, semaphore: &Arc<Semaphore>) -> AppResult<bool> {
        let Ok(permit) = semaphore.clone().try_acquire_owned() else {
            debug!("All worker slots occupied");
            return Ok(false);
        };
        let Some(job) = self.queue.claim().await? else {
            return Ok(false);
        };
        let queue = self.queue.clone();
        let executor = self.executor.clone();
        tokio::spawn(async move {
            let _permit = permit;
            process(queue, executor, job).await;
        });
        Ok(true)
    }
}

/// Execute a leased job and record the outcome. Never panics on handler
/// errors; bookkeeping failures are logged and leave the lease to expire.
async fn process(queue: Arc<JobQueue>, executor: Arc<JobExecutor>, job: BatchJob) -> JobStatus {
    info!(
        job_id = %job.id,
        job_type = %job.job_type,
        attempt = job.attempts + 1,
        max_attempts = job.max_attempts,
        "Processing job"
    );

    match executor.execute(&job).await {
        Ok(result) => match queue.complete(&job, result.as_ref()).await {
            Ok(_) => {
                info!(job_id = %job.id, "Job completed");
                JobStatus::Succeeded
            }
            Err(e) => {
                error!(job_id = %job.id, error = %e, "Failed to mark job completed");
                JobStatus::Running
            }
        },
        Err(err) => {
            let retryable = err.is_retryable();
            warn!(job_id = %job.id, retryable, error = %err, "Job attempt failed");
            match queue.fail(&job, &err.to_string(), retryable).await {
                Ok(status) => status,
                Err(e) => {
                    error!(job_id = %job.id, error = %e, "Failed to record job failure");
                    JobStatus::Running
                }
            }
        }
    }
}
