//! Cron scheduler for periodic enqueues.

use std::sync::Arc;

use tokio_cron_scheduler::{Job as CronJob, JobScheduler};
use tracing::{debug, error, info};

use seatbroker_core::config::WorkerConfig;
use seatbroker_core::error::AppError;
use seatbroker_core::result::AppResult;
use seatbroker_entity::JobPayload;
use seatbroker_service::PoolService;

use crate::queue::JobQueue;

/// Cron-based scheduler. Every tick only enqueues; the deduplicated
/// enqueue keeps overlapping ticks from piling up work.
pub struct CronScheduler {
    scheduler: JobScheduler,
    queue: Arc<JobQueue>,
    pool: PoolService,
    config: WorkerConfig,
}

impl std::fmt::Debug for CronScheduler {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("CronScheduler").finish()
    }
}

impl CronScheduler {
    /// Create a new cron scheduler.
    pub async fn new(queue: Arc<JobQueue>, pool: PoolService, config: WorkerConfig) -> AppResult<Self> {
        let scheduler = JobScheduler::new()
            .await
            .map_err(|e| AppError::internal(format!("Failed to create scheduler: {e}")))?;
        Ok(Self {
            scheduler,
            queue,
            pool,
            config,
        })
    }

    /// Register all scheduled tasks.
    pub async fn register_default_tasks(&self) -> AppResult<()> {
        self.register_switch_drain().await?;
        self.register_pool_sync().await?;
        info!("All scheduled tasks registered");
        Ok(())
    }

    /// Start the scheduler.
    pub async fn start(&self) -> AppResult<()> {
        self.scheduler
            .start()
            .await
            .map_err(|e| AppError::internal(format!("Failed to start scheduler: {e}")))?;
        info!("Cron scheduler started");
        Ok(())
    }

    /// Shut the scheduler down.
    pub async fn shutdown(&self) -> AppResult<()> {
        let mut scheduler = self.scheduler.clone();
        scheduler
            .shutdown()
            .await
            .map_err(|e| AppError::internal(format!("Failed to shutdown scheduler: {e}")))?;
        info!("Cron scheduler shut down");
        Ok(())
    }

    /// Enqueue a switch queue drain.
    pub async fn enqueue_switch_drain(queue: &JobQueue, limit: u32) -> AppResult<()> {
        let enqueued = queue
            .enqueue(JobPayload::DrainSwitchQueue { limit })
            .await?;
        debug!(job_id = %enqueued.job.id, created = enqueued.created, "Scheduled switch drain");
        Ok(())
    }

    /// Enqueue one pool sync per active mother. Returns how many new jobs
    /// were created.
    pub async fn enqueue_pool_syncs(queue: &JobQueue, pool: &PoolService) -> AppResult<u64> {
        let mut created = 0;
        for mother in pool.active_mothers().await? {
            let enqueued = queue
                .enqueue(JobPayload::PoolSyncMother {
                    mother_id: mother.id,
                    group_id: mother.group_id,
                })
                .await?;
            if enqueued.created {
                created += 1;
            }
        }
        debug!(created, "Scheduled pool syncs");
        Ok(created)
    }

    async fn register_switch_drain(&self) -> AppResult<()> {
        let queue = Arc::clone(&self.queue);
        let limit = self.config.drain_batch_size;
        let job = CronJob::new_async(self.config.drain_cron.as_str(), move |_uuid, _lock| {
            let queue = Arc::clone(&queue);
            Box::pin(async move {
                if let Err(e) = Self::enqueue_switch_drain(&queue, limit).await {
                    error!(error = %e, "Failed to enqueue switch drain");
                }
            })
        })
        .map_err(|e| AppError::configuration(format!("Invalid drain schedule: {e}")))?;

        self.scheduler
            .add(job)
            .await
            .map_err(|e| AppError::internal(format!("Failed to add drain schedule: {e}")))?;
        info!(cron = %self.config.drain_cron, "Registered: drain-switch-queue");
        Ok(())
    }

    async fn register_pool_sync(&self) -> AppResult<()> {
        let queue = Arc::clone(&self.queue);
        let pool = self.pool.clone();
        let job = CronJob::new_async(self.config.pool_sync_cron.as_str(), move |_uuid, _lock| {
            let queue = Arc::clone(&queue);
            let pool = pool.clone();
            Box::pin(async move {
                if let Err(e) = Self::enqueue_pool_syncs(&queue, &pool).await {
                    error!(error = %e, "Failed to enqueue pool syncs");
                }
            })
        })
        .map_err(|e| AppError::configuration(format!("Invalid pool sync schedule: {e}")))?;

        self.scheduler
            .add(job)
            .await
            .map_err(|e| AppError::internal(format!("Failed to add pool sync schedule: {e}")))?;
        info!(cron = %self.config.pool_sync_cron, "Registered: pool-sync-mother");
        Ok(())
    }
}
