// Job Queue - enqueue, dequeue and the explicit terminal transitions

use crate::domain::{
    schedule, Job, JobFilter, JobId, JobLogEntry, JobPatch, JobResults, JobStatus,
    JobType, LogLevel, ModuleId, NewJob, SyncBatchParams, SyncModuleParams,
};
use crate::error::{AppError, Result};
use crate::port::{JobRepository, TimeProvider};
use rand::Rng;
use std::sync::Arc;
use tracing::{debug, info, warn};

/// Reads of a job a cancel may take before giving up on a moving row
const CANCEL_ATTEMPTS: u32 = 3;

/// Random stagger in `[0, max_ms]` applied to fanned-out jobs
pub fn random_jitter_ms(max_ms: u64) -> i64 {
    if max_ms == 0 {
        return 0;
    }
    rand::thread_rng().gen_range(0..=max_ms) as i64
}

/// Job queue backed by the job store
///
/// Dequeue atomicity comes from the store's `pop_next`, so several
/// queues/workers may share one store.
pub struct JobQueue {
    jobs: Arc<dyn JobRepository>,
    time_provider: Arc<dyn TimeProvider>,
}

impl JobQueue {
    pub fn new(jobs: Arc<dyn JobRepository>, time_provider: Arc<dyn TimeProvider>) -> Self {
        Self {
            jobs,
            time_provider,
        }
    }

    /// Enqueue a `sync-module` job; `delay_ms` defers its eligibility
    pub async fn add_sync_module_job(
        &self,
        module_id: ModuleId,
        github_repo: &str,
        user_id: Option<&str>,
        delay_ms: Option<i64>,
    ) -> Result<JobId> {
        if github_repo.trim().is_empty() {
            return Err(AppError::Validation(format!(
                "module {} has no github repo",
                module_id
            )));
        }
        let params = SyncModuleParams {
            module_id,
            github_repo: github_repo.to_string(),
            user_id: user_id.map(str::to_string),
        };
        let now = self.time_provider.now_millis();
        let new_job = NewJob::new(JobType::SyncModule, serde_json::to_value(&params)?, now)
            .started_by(params.user_id.clone())
            .delayed_by(delay_ms.unwrap_or(0));

        let job = self.jobs.insert(&new_job).await?;
        info!(
            job_id = %job.id,
            module_id = %module_id,
            repo = %github_repo,
            delay_ms = ?delay_ms,
            "Queued module sync job"
        );
        self.log(
            job.id,
            LogLevel::Info,
            format!("Queued release sync for module {} ({})", module_id, github_repo),
        )
        .await;
        Ok(job.id)
    }

    /// Enqueue a `sync-batch` job
    pub async fn add_sync_batch_job(&self, batch_size: u32, started_by: Option<&str>) -> Result<JobId> {
        if !(schedule::MIN_BATCH_SIZE..=schedule::MAX_BATCH_SIZE).contains(&batch_size) {
            return Err(AppError::Validation(format!(
                "batch size must be between {} and {}, got {}",
                schedule::MIN_BATCH_SIZE,
                schedule::MAX_BATCH_SIZE,
                batch_size
            )));
        }
        let now = self.time_provider.now_millis();
        let new_job = NewJob::new(
            JobType::SyncBatch,
            serde_json::to_value(SyncBatchParams { batch_size })?,
            now,
        )
        .started_by(started_by.map(str::to_string));

        let job = self.jobs.insert(&new_job).await?;
        info!(job_id = %job.id, batch_size = batch_size, "Queued batch sync job");
        self.log(
            job.id,
            LogLevel::Info,
            format!("Queued batch sync of up to {} modules", batch_size),
        )
        .await;
        Ok(job.id)
    }

    /// Claim the oldest eligible pending job, marking it running
    pub async fn get_next_job(&self) -> Result<Option<Job>> {
        let now = self.time_provider.now_millis();
        let job = match self.jobs.pop_next(now).await? {
            Some(job) => job,
            None => return Ok(None),
        };
        debug!(job_id = %job.id, job_type = %job.job_type, "Dequeued job");
        self.log(job.id, LogLevel::Info, "Job started").await;
        Ok(Some(job))
    }

    /// `running -> completed`
    pub async fn complete_job(&self, id: JobId, results: Option<JobResults>) -> Result<Job> {
        let job = self.get_job(id).await?;
        let now = self.time_provider.now_millis();
        let patch = JobPatch::completed(&job, now, results)?;
        let job = self.jobs.update(id, &patch).await?;

        if let Some(summary) = job.results.as_ref().map(|r| r.summary.clone()) {
            if !summary.is_empty() {
                self.log(id, LogLevel::Info, summary).await;
            }
        }
        self.log(id, LogLevel::Info, "Job completed").await;
        info!(job_id = %id, duration_secs = ?job.duration, "Job completed");
        Ok(job)
    }

    /// `running -> failed` with a single error message
    pub async fn fail_job(&self, id: JobId, error_message: &str) -> Result<Job> {
        self.fail_job_with_results(id, JobResults::failure(error_message))
            .await
    }

    /// `running -> failed` keeping whatever partial results the handler produced
    pub async fn fail_job_with_results(&self, id: JobId, results: JobResults) -> Result<Job> {
        let job = self.get_job(id).await?;
        let now = self.time_provider.now_millis();
        let message = if results.errors.is_empty() {
            results.summary.clone()
        } else {
            results.errors.join("; ")
        };
        let patch = JobPatch::failed(&job, now, results)?;
        let job = self.jobs.update(id, &patch).await?;

        self.log(id, LogLevel::Error, format!("Job failed: {}", message))
            .await;
        warn!(job_id = %id, error = %message, "Job failed");
        Ok(job)
    }

    /// `pending|running -> cancelled`; a running handler notices at its next checkpoint
    pub async fn cancel_job(&self, id: JobId) -> Result<Job> {
        let mut attempt = 1;
        let (job, was_running) = loop {
            let job = self.get_job(id).await?;
            let was_running = job.status == JobStatus::Running;
            let now = self.time_provider.now_millis();
            let patch = JobPatch::cancelled(&job, now)?;
            match self.jobs.update(id, &patch).await {
                Ok(job) => break (job, was_running),
                // Claimed by the worker between read and write: rebuild from the new row
                Err(AppError::Conflict(reason)) if attempt < CANCEL_ATTEMPTS => {
                    debug!(
                        job_id = %id,
                        attempt = attempt,
                        reason = %reason,
                        "Cancel raced a status change, retrying"
                    );
                    attempt += 1;
                }
                Err(e) => return Err(e),
            }
        };

        let note = if was_running {
            "Job cancelled while running; in-flight work stops at the next checkpoint"
        } else {
            "Job cancelled before it started"
        };
        self.log(id, LogLevel::Warn, note).await;
        info!(job_id = %id, was_running = was_running, "Job cancelled");
        Ok(job)
    }

    /// Create a new pending job with the same type and parameters as a
    /// failed or cancelled one. The original job is left untouched.
    pub async fn retry_job(&self, id: JobId, started_by: Option<&str>) -> Result<JobId> {
        let original = self.get_job(id).await?;
        if !matches!(original.status, JobStatus::Failed | JobStatus::Cancelled) {
            return Err(AppError::InvalidState(format!(
                "job {} is {} and cannot be retried",
                id, original.status
            )));
        }

        let now = self.time_provider.now_millis();
        let new_job = NewJob::new(original.job_type.clone(), original.parameters.clone(), now)
            .started_by(started_by.map(str::to_string).or(original.started_by.clone()));
        let job = self.jobs.insert(&new_job).await?;

        self.log(job.id, LogLevel::Info, format!("Retry of job {}", id))
            .await;
        info!(job_id = %job.id, retry_of = %id, "Job retried");
        Ok(job.id)
    }

    /// Insert an arbitrary job kind (administrative jobs other than sync)
    pub async fn add_job(&self, job_type: JobType, parameters: serde_json::Value, started_by: Option<&str>) -> Result<JobId> {
        let now = self.time_provider.now_millis();
        let new_job = NewJob::new(job_type, parameters, now).started_by(started_by.map(str::to_string));
        let job = self.jobs.insert(&new_job).await?;
        info!(job_id = %job.id, job_type = %job.job_type, "Queued job");
        Ok(job.id)
    }

    pub async fn update_progress(&self, id: JobId, percent: i32) -> Result<()> {
        self.jobs.update(id, &JobPatch::progress(percent)).await?;
        Ok(())
    }

    pub async fn is_cancelled(&self, id: JobId) -> Result<bool> {
        Ok(self.get_job(id).await?.status == JobStatus::Cancelled)
    }

    pub async fn get_job(&self, id: JobId) -> Result<Job> {
        self.jobs
            .find_by_id(id)
            .await?
            .ok_or_else(|| AppError::NotFound(format!("job {} not found", id)))
    }

    pub async fn list_jobs(&self, filter: &JobFilter) -> Result<Vec<Job>> {
        self.jobs.list(filter).await
    }

    pub async fn count_by_status(&self, status: JobStatus) -> Result<i64> {
        self.jobs.count_by_status(status).await
    }

    pub async fn active_sync_module_ids(&self) -> Result<Vec<ModuleId>> {
        self.jobs.active_sync_module_ids().await
    }

    /// Append a job log line; logging failures never fail the caller
    pub async fn log(&self, id: JobId, level: LogLevel, message: impl Into<String>) {
        let entry = JobLogEntry::new(self.time_provider.now_millis(), level, message);
        if let Err(e) = self.jobs.append_log(id, &entry).await {
            warn!(job_id = %id, error = %e, "Failed to append job log");
        }
    }
}
