//! Seatbroker: redeem-code to team-seat brokerage service.
//!
//! Main entry point that wires all crates together and runs the background
//! worker, seat sweeper and cron scheduler until shutdown.

use std::sync::Arc;
use std::time::Duration;

use tokio::sync::watch;
use tokio::task::JoinHandle;
use tracing_subscriber::{EnvFilter, fmt};

use seatbroker_coordination::CoordinationManager;
use seatbroker_core::config::AppConfig;
use seatbroker_core::error::AppError;
use seatbroker_core::types::{Clock, SystemClock};
use seatbroker_database::{DatabasePool, Repositories};
use seatbroker_service::{Engine, HttpTeamProvider};
use seatbroker_worker::{CronScheduler, JobQueue, SeatSweeper, WorkerRunner};

#[tokio::main]
async fn main() {
    let env = std::env::var("SEATBROKER_ENV").unwrap_or_else(|_| "development".to_string());
    let config = match AppConfig::load(&env) {
        Ok(c) => c,
        Err(e) => {
            eprintln!("Failed to load configuration: {e}");
            std::process::exit(1);
        }
    };

    init_logging(&config);
    tracing::info!(env = %env, "Configuration loaded");

    if let Err(e) = run(config).await {
        tracing::error!(error = %e, "Seatbroker stopped with an error");
        std::process::exit(1);
    }
}

/// Initialize tracing/logging
fn init_logging(config: &AppConfig) {
    let filter =
        EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new(&config.logging.level));

    match config.logging.format.as_str() {
        "json" => {
            fmt()
                .json()
                .with_env_filter(filter)
                .with_target(true)
                .with_thread_ids(true)
                .init();
        }
        _ => {
            fmt()
                .pretty()
                .with_env_filter(filter)
                .with_target(true)
                .init();
        }
    }
}

async fn run(config: AppConfig) -> Result<(), AppError> {
    tracing::info!("Starting Seatbroker v{}", env!("CARGO_PKG_VERSION"));
    let clock: Arc<dyn Clock> = Arc::new(SystemClock);

    // ── Storage ──────────────────────────────────────────────────
    let (repos, db_pool) = match config.database.provider.as_str() {
        "memory" => {
            tracing::warn!("Using in-memory repositories; state is lost on restart");
            (Repositories::memory(), None)
        }
        _ => {
            let pool = DatabasePool::connect(&config.database).await?;
            seatbroker_database::migration::run_migrations(pool.pool()).await?;
            (Repositories::postgres(pool.pool().clone()), Some(pool))
        }
    };

    // ── Coordination + provider ──────────────────────────────────
    tracing::info!(
        provider = %config.coordination.provider,
        rate_limit_backend = ?config.coordination.rate_limit_backend,
        "Initializing coordination store"
    );
    let coordination = CoordinationManager::new(&config.coordination, clock.clone()).await?;
    let provider = Arc::new(HttpTeamProvider::new(&config.provider)?);

    let engine = Engine::new(&config, repos, &coordination, provider, clock.clone());
    let capacity = engine.capacity.snapshot().await?;
    tracing::info!(
        total_slots = capacity.total_slots,
        available_slots = capacity.available_slots,
        "Engine ready"
    );

    let (shutdown_tx, shutdown_rx) = watch::channel(false);
    let mut handles: Vec<JoinHandle<()>> = Vec::new();

    // ── Seat sweeper ─────────────────────────────────────────────
    let sweeper = SeatSweeper::new(
        engine.allocator.clone(),
        Duration::from_secs(config.worker.sweep_interval_seconds.max(1)),
        Duration::from_secs(config.worker.backoff_max_seconds.max(1)),
    );
    let sweeper_stop = shutdown_rx.clone();
    handles.push(tokio::spawn(async move {
        sweeper.run(sweeper_stop).await;
    }));

    // ── Worker + scheduler ───────────────────────────────────────
    let scheduler = if config.worker.enabled {
        let worker_id = format!(
            "{}-{}",
            std::env::var("HOSTNAME").unwrap_or_else(|_| "seatbroker".to_string()),
            std::process::id()
        );
        let queue = Arc::new(JobQueue::new(
            engine.repos.jobs.clone(),
            engine.lock.clone(),
            clock.clone(),
            config.worker.clone(),
            worker_id,
            Duration::from_millis(config.engine.enqueue_lock_ttl_ms.max(1)),
        ));
        let executor = Arc::new(seatbroker_worker::default_executor(&engine));

        let scheduler =
            CronScheduler::new(Arc::clone(&queue), engine.pool.clone(), config.worker.clone())
                .await?;
        scheduler.register_default_tasks().await?;
        scheduler.start().await?;

        let runner = WorkerRunner::new(queue, executor, config.worker.clone());
        let worker_stop = shutdown_rx.clone();
        handles.push(tokio::spawn(async move {
            runner.run(worker_stop).await;
        }));
        tracing::info!("Background worker started");
        Some(scheduler)
    } else {
        tracing::info!("Background worker disabled");
        None
    };

    shutdown_signal().await;
    tracing::info!("Shutdown signal received, starting graceful shutdown...");
    let _ = shutdown_tx.send(true);

    if let Some(scheduler) = scheduler {
        if let Err(e) = scheduler.shutdown().await {
            tracing::warn!(error = %e, "Scheduler did not shut down cleanly");
        }
    }

    let grace = Duration::from_secs(config.worker.shutdown_timeout_seconds.max(1));
    for handle in handles {
        match tokio::time::timeout(grace, handle).await {
            Ok(Ok(())) => {}
            Ok(Err(e)) => tracing::error!(error = %e, "Background task panicked"),
            Err(_) => tracing::warn!("Background task did not stop within the shutdown timeout"),
        }
    }

    if let Some(pool) = db_pool {
        pool.close().await;
    }
    tracing::info!("Seatbroker shut down");
    Ok(())
}

/// Wait for shutdown signal (Ctrl+C or SIGTERM)
async fn shutdown_signal() {
    let ctrl_c = async {
        if let Err(e) = tokio::signal::ctrl_c().await {
            tracing::error!(error = %e, "Failed to install Ctrl+C handler");
            std::future::pending::<()>().await;
        }
    };

    #[cfg(unix)]
    let terminate = async {
        match tokio::signal::unix::signal(tokio::signal::unix::SignalKind::terminate()) {
            Ok(mut signal) => {
                signal.recv().await;
            }
            Err(e) => {
                tracing::error!(error = %e, "Failed to install SIGTERM handler");
                std::future::pending::<()>().await;
            }
        }
    };

    #[cfg(not(unix))]
    let terminate = std::future::pending::<()>();

    tokio::select! {
        _ = ctrl_c => {},
        _ = terminate => {},
    }
}
