//! Relsync - Main Entry Point
//! Scheduler + Worker over a SQLite job store

mod config;
mod logging;

use anyhow::{Context, Result};
use std::sync::Arc;
use std::time::Duration;
use tracing::{error, info, warn};

use config::DaemonConfig;
use relsync_core::application::{
    shutdown_channel, JobQueue, RecoveryService, ReleaseScheduler, SyncService, Worker,
    WorkerConfig,
};
use relsync_core::application::worker::constants::ERROR_RECOVERY_SLEEP_DURATION;
use relsync_core::port::time_provider::SystemTimeProvider;
use relsync_core::port::{
    AdminActionLog, JobRepository, ModuleSyncRepository, ReleaseProvider, ReleaseRepository,
    ScheduleRepository, TimeProvider,
};
use relsync_infra_github::GithubReleaseProvider;
use relsync_infra_sqlite::{
    create_pool, run_migrations, SqliteAdminActionLog, SqliteJobRepository,
    SqliteModuleSyncRepository, SqliteReleaseRepository, SqliteScheduleRepository,
};

const VERSION: &str = env!("CARGO_PKG_VERSION");
const WORKER_SHUTDOWN_GRACE: Duration = Duration::from_secs(5);

#[tokio::main]
async fn main() -> Result<()> {
    // 1. Load configuration
    let config = DaemonConfig::from_env().context("invalid configuration")?;

    // 2. Initialize logging
    let _log_guard = logging::init_logging(config.log_format, config.log_dir.as_deref())?;

    info!("Relsync v{} starting...", VERSION);
    info!(
        db_path = %config.db_path.display(),
        api_url = %config.github_api_url,
        shared_token = config.github_token.is_some(),
        tick_secs = config.scheduler_tick.as_secs(),
        "Configuration loaded"
    );

    // 3. Initialize database
    if let Some(parent) = config.db_path.parent() {
        std::fs::create_dir_all(parent)
            .with_context(|| format!("cannot create {}", parent.display()))?;
    }
    let db_url = format!("sqlite://{}", config.db_path.display());
    let pool = create_pool(&db_url)
        .await
        .map_err(|e| anyhow::anyhow!("DB pool creation failed: {}", e))?;
    run_migrations(&pool)
        .await
        .map_err(|e| anyhow::anyhow!("Migration failed: {}", e))?;

    // 4. Setup dependencies (DI wiring)
    let time_provider: Arc<dyn TimeProvider> = Arc::new(SystemTimeProvider);
    let jobs: Arc<dyn JobRepository> = Arc::new(SqliteJobRepository::new(pool.clone()));
    let schedules: Arc<dyn ScheduleRepository> = Arc::new(SqliteScheduleRepository::new(pool.clone()));
    let modules: Arc<dyn ModuleSyncRepository> = Arc::new(SqliteModuleSyncRepository::new(pool.clone()));
    let releases: Arc<dyn ReleaseRepository> = Arc::new(SqliteReleaseRepository::new(pool.clone()));
    let audit: Arc<dyn AdminActionLog> =
        Arc::new(SqliteAdminActionLog::new(pool.clone(), time_provider.clone()));
    let provider: Arc<dyn ReleaseProvider> = Arc::new(
        GithubReleaseProvider::new(config.github_api_url.clone())
            .map_err(|e| anyhow::anyhow!("Release provider setup failed: {}", e))?,
    );

    // 5. Fail jobs orphaned by a previous run
    info!("Running crash recovery...");
    let recovery_service = RecoveryService::new(jobs.clone(), time_provider.clone());
    match recovery_service.recover_orphaned_jobs().await {
        Ok(count) => info!(recovered_jobs = count, "Crash recovery completed"),
        Err(e) => error!(error = ?e, "Crash recovery failed"),
    }

    let queue = Arc::new(JobQueue::new(jobs.clone(), time_provider.clone()));
    let sync_service = Arc::new(SyncService::new(
        modules,
        releases,
        jobs,
        provider,
        time_provider.clone(),
        config.github_token.clone(),
    ));

    // 6. Start the release scheduler
    let scheduler = Arc::new(
        ReleaseScheduler::new(
            schedules,
            queue.clone(),
            audit,
            time_provider,
            config.scheduler_tick,
        )
        .map_err(|e| anyhow::anyhow!("Scheduler setup failed: {}", e))?,
    );
    match scheduler.get_schedule().await {
        Ok(schedule) => info!(
            enabled = schedule.enabled,
            interval_hours = schedule.interval_hours,
            batch_size = schedule.batch_size,
            next_run_at = schedule.next_run_at,
            "Release schedule loaded"
        ),
        Err(e) => warn!(error = %e, "Could not read release schedule"),
    }
    scheduler.start();

    // 7. Start Worker (job processing loop)
    info!("Starting worker...");
    let (shutdown_tx, shutdown_rx) = shutdown_channel();
    let worker = Worker::new(
        queue,
        sync_service,
        WorkerConfig {
            idle_sleep: config.worker_idle,
            error_sleep: ERROR_RECOVERY_SLEEP_DURATION,
            max_jitter_ms: config.max_jitter_ms,
        },
    );
    let worker_handle = tokio::spawn(async move {
        if let Err(e) = worker.run(shutdown_rx).await {
            error!(error = ?e, "Worker failed");
        }
    });

    info!("System ready. Press Ctrl+C to shutdown");

    // 8. Wait for shutdown signal
    tokio::signal::ctrl_c().await?;
    info!("Shutdown signal received. Exiting gracefully...");

    // 9. Graceful shutdown: stop scheduling, let the current job finish
    scheduler.stop().await;
    shutdown_tx.shutdown();
    if tokio::time::timeout(WORKER_SHUTDOWN_GRACE, worker_handle)
        .await
        .is_err()
    {
        warn!("Worker did not stop in time; its job will be recovered on next start");
    }
    pool.close().await;

    info!("Shutdown complete.");
    Ok(())
}
