// Worker - Job execution loop

pub mod constants;
mod shutdown;

use constants::*;
pub use shutdown::{shutdown_channel, ShutdownSender, ShutdownToken};

use crate::application::queue::{random_jitter_ms, JobQueue};
use crate::application::sync_service::{SyncObserver, SyncService};
use crate::domain::{Job, JobId, JobResults, JobType, LogLevel};
use crate::error::{AppError, Result};
use async_trait::async_trait;
use std::sync::Arc;
use std::time::Duration;
use tokio::time::sleep;
use tracing::{error, info, warn};

/// Worker tuning
#[derive(Debug, Clone)]
pub struct WorkerConfig {
    pub idle_sleep: Duration,
    pub error_sleep: Duration,
    /// Upper bound of the random delay given to each module job of a batch
    pub max_jitter_ms: u64,
}

impl Default for WorkerConfig {
    fn default() -> Self {
        Self {
            idle_sleep: IDLE_SLEEP_DURATION,
            error_sleep: ERROR_RECOVERY_SLEEP_DURATION,
            max_jitter_ms: DEFAULT_MAX_JITTER_MS,
        }
    }
}

/// How a handler wants its job finalized
#[derive(Debug)]
enum JobOutcome {
    Completed(JobResults),
    Failed(JobResults),
}

/// Observer wired to the running job: progress goes to the job row,
/// cancellation is read back from it
struct JobSyncObserver {
    queue: Arc<JobQueue>,
    job_id: JobId,
}

#[async_trait]
impl SyncObserver for JobSyncObserver {
    async fn is_cancelled(&self) -> bool {
        match self.queue.is_cancelled(self.job_id).await {
            Ok(cancelled) => cancelled,
            Err(e) => {
                warn!(job_id = %self.job_id, error = %e, "Cancellation check failed");
                false
            }
        }
    }

    async fn on_progress(&self, done: usize, total: usize) {
        if total == 0 {
            return;
        }
        let percent = ((done * 100) / total) as i32;
        if let Err(e) = self.queue.update_progress(self.job_id, percent).await {
            warn!(job_id = %self.job_id, error = %e, "Progress update failed");
        }
    }
}

/// Worker polls the queue and runs one job at a time
pub struct Worker {
    queue: Arc<JobQueue>,
    sync_service: Arc<SyncService>,
    config: WorkerConfig,
}

impl Worker {
    pub fn new(queue: Arc<JobQueue>, sync_service: Arc<SyncService>, config: WorkerConfig) -> Self {
        Self {
            queue,
            sync_service,
            config,
        }
    }

    /// Run worker loop with graceful shutdown support
    pub async fn run(&self, mut shutdown: ShutdownToken) -> Result<()> {
        info!("Worker started");
        loop {
            // Check for shutdown signal
            if shutdown.is_shutdown() {
                info!("Worker shutting down");
                break;
            }
            match self.process_next_job().await {
                Ok(processed) => {
                    if !processed {
                        // No job available, sleep (or wait for shutdown)
                        tokio::select! {
                            _ = sleep(self.config.idle_sleep) => {},
                            _ = shutdown.wait() => {
                                info!("Worker interrupted during idle");
                                break;
                            }
                        }
                    }
                }
                Err(e) => {
                    error!("Worker error: {}", e);
                    tokio::select! {
                        _ = sleep(self.config.error_sleep) => {},
                        _ = shutdown.wait() => {
                            info!("Worker interrupted during error recovery");
                            break;
                        }
                    }
                }
            }
        }
        info!("Worker stopped");
        Ok(())
    }

    /// Process next job from queue (returns true if a job was taken)
    pub async fn process_next_job(&self) -> Result<bool> {
        // Pop next job (already atomically set to running in the store)
        let job = match self.queue.get_next_job().await? {
            Some(j) => j,
            None => return Ok(false),
        };
        let job_id = job.id;

        info!("Processing job: {} ({})", job.id, job.job_type);

        // Run the handler on its own task so a panic cannot take the loop down
        let queue = Arc::clone(&self.queue);
        let sync_service = Arc::clone(&self.sync_service);
        let max_jitter_ms = self.config.max_jitter_ms;
        let handle = tokio::task::spawn(async move {
            Self::dispatch(&queue, &sync_service, max_jitter_ms, &job).await
        });

        let finalized = match handle.await {
            Ok(Ok(JobOutcome::Completed(results))) => {
                self.queue.complete_job(job_id, Some(results)).await
            }
            Ok(Ok(JobOutcome::Failed(results))) => {
                self.queue.fail_job_with_results(job_id, results).await
            }
            Ok(Err(e)) => {
                error!(job_id = %job_id, error = %e, "Job handler failed");
                self.queue.fail_job(job_id, &e.to_string()).await
            }
            Err(join_err) => {
                let reason = if join_err.is_panic() {
                    "job handler panicked"
                } else {
                    "job handler was aborted"
                };
                error!(job_id = %job_id, "{}: {:?}", reason, join_err);
                self.queue.fail_job(job_id, reason).await
            }
        };

        match finalized {
            Ok(_) => Ok(true),
            // Cancelled while running: the cancellation stands
            Err(e) if e.is_invalid_transition() => {
                info!(job_id = %job_id, "Job was cancelled while running, keeping cancelled state");
                Ok(true)
            }
            Err(e) => Err(e),
        }
    }

    async fn dispatch(
        queue: &Arc<JobQueue>,
        sync_service: &Arc<SyncService>,
        max_jitter_ms: u64,
        job: &Job,
    ) -> Result<JobOutcome> {
        match &job.job_type {
            JobType::SyncModule => Self::run_sync_module(queue, sync_service, job).await,
            JobType::SyncBatch => Self::run_sync_batch(queue, sync_service, max_jitter_ms, job).await,
            JobType::Other(kind) => Err(AppError::Validation(format!(
                "no handler registered for job type {}",
                kind
            ))),
        }
    }

    async fn run_sync_module(
        queue: &Arc<JobQueue>,
        sync_service: &Arc<SyncService>,
        job: &Job,
    ) -> Result<JobOutcome> {
        let params = job.sync_module_params()?;
        let observer = JobSyncObserver {
            queue: Arc::clone(queue),
            job_id: job.id,
        };

        let outcome = sync_service
            .sync_module_releases(params.module_id, &params.github_repo, &observer)
            .await?;

        for err in &outcome.errors {
            queue.log(job.id, LogLevel::Warn, err.clone()).await;
        }

        let summary = if outcome.success {
            format!(
                "Imported {} new release(s) for {} with {} error(s)",
                outcome.new_releases,
                params.github_repo,
                outcome.errors.len()
            )
        } else {
            format!("Release sync for {} failed", params.github_repo)
        };
        let results = JobResults {
            success: outcome.success,
            processed_count: outcome.new_releases,
            error_count: outcome.errors.len() as u32,
            errors: outcome.errors,
            summary,
        };

        if results.success {
            Ok(JobOutcome::Completed(results))
        } else {
            Ok(JobOutcome::Failed(results))
        }
    }

    /// Fan out one module job per selected module and finish without waiting
    /// for them. A cancelled batch stops queueing at the next module.
    async fn run_sync_batch(
        queue: &Arc<JobQueue>,
        sync_service: &Arc<SyncService>,
        max_jitter_ms: u64,
        job: &Job,
    ) -> Result<JobOutcome> {
        let params = job.sync_batch_params()?;
        let targets = sync_service.select_batch_targets(params.batch_size).await?;
        let total = targets.len();

        queue
            .log(
                job.id,
                LogLevel::Info,
                format!("Selected {} module(s) for sync", total),
            )
            .await;

        let mut enqueued = 0u32;
        let mut errors = Vec::new();
        for (index, module) in targets.iter().enumerate() {
            match queue.is_cancelled(job.id).await {
                Ok(true) => {
                    info!(
                        job_id = %job.id,
                        enqueued = enqueued,
                        total = total,
                        "Batch cancelled, stopping fan-out"
                    );
                    queue
                        .log(
                            job.id,
                            LogLevel::Warn,
                            format!("Cancelled after queueing {} of {} module(s)", enqueued, total),
                        )
                        .await;
                    break;
                }
                Ok(false) => {}
                Err(e) => warn!(job_id = %job.id, error = %e, "Cancellation check failed"),
            }

            let delay_ms = random_jitter_ms(max_jitter_ms);
            match queue
                .add_sync_module_job(module.module_id, &module.github_repo, None, Some(delay_ms))
                .await
            {
                Ok(child_id) => {
                    enqueued += 1;
                    queue
                        .log(
                            job.id,
                            LogLevel::Info,
                            format!(
                                "Queued job {} for module {} (delay {}ms)",
                                child_id, module.module_id, delay_ms
                            ),
                        )
                        .await;
                }
                Err(e) => {
                    warn!(job_id = %job.id, module_id = %module.module_id, error = %e, "Failed to queue module sync");
                    errors.push(format!("module {}: {}", module.module_id, e));
                }
            }
            let percent = (((index + 1) * 100) / total) as i32;
            if let Err(e) = queue.update_progress(job.id, percent).await {
                warn!(job_id = %job.id, error = %e, "Progress update failed");
            }
        }

        let results = JobResults {
            success: errors.is_empty(),
            processed_count: enqueued,
            error_count: errors.len() as u32,
            summary: format!("Queued {} of {} module sync job(s)", enqueued, total),
            errors,
        };

        if total > 0 && enqueued == 0 {
            Ok(JobOutcome::Failed(results))
        } else {
            Ok(JobOutcome::Completed(results))
        }
    }
}
