//! Background processing for Seatbroker.
//!
//! This crate provides:
//! - A job queue with deduplicated enqueue and leased claims
//! - A worker runner that polls the queue and executes jobs
//! - A job executor that dispatches jobs to the correct handler
//! - Handlers for invite batches, code deactivation, pool sync and
//!   switch queue draining
//! - A seat sweeper releasing stale holds
//! - A cron scheduler for periodic enqueues

pub mod backoff;
pub mod executor;
pub mod jobs;
pub mod queue;
pub mod runner;
pub mod scheduler;
pub mod sweeper;

pub use executor::{JobExecutionError, JobExecutor, JobHandler};
pub use queue::{Enqueued, JobQueue};
pub use runner::WorkerRunner;
pub use scheduler::CronScheduler;
pub use sweeper::SeatSweeper;

use std::sync::Arc;

use seatbroker_service::Engine;

/// Executor with a handler for every job type.
pub fn default_executor(engine: &Engine) -> JobExecutor {
    let mut executor = JobExecutor::new();
    executor.register(Arc::new(jobs::InviteJobHandler::resend(engine.pool.clone())));
    executor.register(Arc::new(jobs::InviteJobHandler::cancel(engine.pool.clone())));
    executor.register(Arc::new(jobs::InviteJobHandler::remove(engine.pool.clone())));
    executor.register(Arc::new(jobs::DisableCodesHandler::new(engine.ledger.clone())));
    executor.register(Arc::new(jobs::PoolSyncHandler::new(engine.pool.clone())));
    executor.register(Arc::new(jobs::DrainSwitchQueueHandler::new(engine.switcher.clone())));
    executor
}
