//! Admin Service - the entry points an admin surface calls
//!
//! Every state-changing call appends an admin action record carrying the
//! values before and after the change.

use crate::application::queue::{random_jitter_ms, JobQueue};
use crate::application::scheduler::ReleaseScheduler;
use crate::domain::{
    AdminAction, AdminActionKind, Job, JobFilter, JobId, JobStatus, ModuleId, ModuleSyncConfig,
    NewAdminAction, Release, ReleaseSchedule, ScheduleUpdate,
};
use crate::error::{AppError, Result};
use crate::port::{AdminActionLog, ModuleSyncRepository, ReleaseRepository};
use serde::Serialize;
use serde_json::json;
use std::collections::{BTreeMap, HashSet};
use std::sync::Arc;
use tracing::{info, warn};

/// Overview of sync health across all modules
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct SyncStats {
    pub total_modules: usize,
    pub enabled_modules: usize,
    pub modules_with_errors: usize,
    pub never_synced: usize,
    pub jobs_by_status: BTreeMap<String, i64>,
}

pub struct AdminService {
    queue: Arc<JobQueue>,
    scheduler: Arc<ReleaseScheduler>,
    modules: Arc<dyn ModuleSyncRepository>,
    releases: Arc<dyn ReleaseRepository>,
    audit: Arc<dyn AdminActionLog>,
    max_jitter_ms: u64,
}

impl AdminService {
    pub fn new(
        queue: Arc<JobQueue>,
        scheduler: Arc<ReleaseScheduler>,
        modules: Arc<dyn ModuleSyncRepository>,
        releases: Arc<dyn ReleaseRepository>,
        audit: Arc<dyn AdminActionLog>,
        max_jitter_ms: u64,
    ) -> Self {
        Self {
            queue,
            scheduler,
            modules,
            releases,
            audit,
            max_jitter_ms,
        }
    }

    // ------------------------------------------------------------------
    // Jobs
    // ------------------------------------------------------------------

    /// Queue an immediate sync of one module; returns as soon as the job row exists
    pub async fn enqueue_module_sync(&self, admin_id: &str, module_id: ModuleId) -> Result<JobId> {
        let config = self.require_module(module_id).await?;
        if !config.enabled {
            return Err(AppError::Validation(format!(
                "release sync is disabled for module {}",
                module_id
            )));
        }

        let job_id = self
            .queue
            .add_sync_module_job(module_id, &config.github_repo, Some(admin_id), None)
            .await?;

        self.record(
            NewAdminAction::new(
                admin_id,
                AdminActionKind::ManualSync,
                "module",
                module_id,
                format!("Manual release sync of {} (job {})", config.github_repo, job_id),
            )
            .with_values(None, Some(json!({ "jobId": job_id }))),
        )
        .await;
        Ok(job_id)
    }

    pub async fn enqueue_batch_sync(&self, admin_id: &str, batch_size: u32) -> Result<JobId> {
        let job_id = self
            .queue
            .add_sync_batch_job(batch_size, Some(admin_id))
            .await?;

        self.record(
            NewAdminAction::new(
                admin_id,
                AdminActionKind::JobStart,
                "job",
                job_id,
                format!("Started batch sync of up to {} modules", batch_size),
            )
            .with_values(None, Some(json!({ "batchSize": batch_size }))),
        )
        .await;
        Ok(job_id)
    }

    /// Queue a staggered sync job for every enabled module that is not
    /// already being synced
    pub async fn sync_all_enabled(&self, admin_id: &str) -> Result<Vec<JobId>> {
        let busy: HashSet<ModuleId> = self
            .queue
            .active_sync_module_ids()
            .await?
            .into_iter()
            .collect();

        let mut job_ids = Vec::new();
        for config in self.modules.list_enabled_by_staleness().await? {
            if busy.contains(&config.module_id) {
                continue;
            }
            let delay_ms = random_jitter_ms(self.max_jitter_ms);
            match self
                .queue
                .add_sync_module_job(
                    config.module_id,
                    &config.github_repo,
                    Some(admin_id),
                    Some(delay_ms),
                )
                .await
            {
                Ok(id) => job_ids.push(id),
                Err(e) => {
                    warn!(module_id = %config.module_id, error = %e, "Failed to queue module sync")
                }
            }
        }

        info!(queued = job_ids.len(), skipped_busy = busy.len(), "Manual sync of all modules queued");
        self.record(
            NewAdminAction::new(
                admin_id,
                AdminActionKind::ManualSyncAll,
                "module",
                "all",
                format!("Queued release sync for {} module(s)", job_ids.len()),
            )
            .with_values(None, Some(json!({ "jobIds": job_ids }))),
        )
        .await;
        Ok(job_ids)
    }

    pub async fn cancel_job(&self, admin_id: &str, job_id: JobId) -> Result<Job> {
        let before = self.queue.get_job(job_id).await?.status;
        let job = self.queue.cancel_job(job_id).await?;

        self.record(
            NewAdminAction::new(
                admin_id,
                AdminActionKind::JobCancel,
                "job",
                job_id,
                format!("Cancelled {} job", job.job_type),
            )
            .with_values(
                Some(json!({ "status": before })),
                Some(json!({ "status": job.status })),
            ),
        )
        .await;
        Ok(job)
    }

    /// Create a fresh job from a failed or cancelled one
    pub async fn retry_job(&self, admin_id: &str, job_id: JobId) -> Result<JobId> {
        let new_id = self.queue.retry_job(job_id, Some(admin_id)).await?;

        self.record(
            NewAdminAction::new(
                admin_id,
                AdminActionKind::JobRetry,
                "job",
                job_id,
                format!("Retried job {} as job {}", job_id, new_id),
            )
            .with_values(
                Some(json!({ "jobId": job_id })),
                Some(json!({ "jobId": new_id })),
            ),
        )
        .await;
        Ok(new_id)
    }

    pub async fn get_job(&self, job_id: JobId) -> Result<Job> {
        self.queue.get_job(job_id).await
    }

    pub async fn list_jobs(&self, filter: &JobFilter) -> Result<Vec<Job>> {
        self.queue.list_jobs(filter).await
    }

    // ------------------------------------------------------------------
    // Schedule
    // ------------------------------------------------------------------

    pub async fn get_schedule(&self) -> Result<ReleaseSchedule> {
        self.scheduler.get_schedule().await
    }

    pub async fn update_schedule(
        &self,
        admin_id: &str,
        update: &ScheduleUpdate,
    ) -> Result<ReleaseSchedule> {
        let (old, new) = self.scheduler.update_schedule(update).await?;

        self.record(
            NewAdminAction::new(
                admin_id,
                AdminActionKind::ScheduleUpdate,
                "release_schedule",
                "global",
                "Updated release sync schedule",
            )
            .with_values(
                Some(serde_json::to_value(&old)?),
                Some(serde_json::to_value(&new)?),
            ),
        )
        .await;
        Ok(new)
    }

    // ------------------------------------------------------------------
    // Modules
    // ------------------------------------------------------------------

    pub async fn list_module_configs(&self) -> Result<Vec<ModuleSyncConfig>> {
        self.modules.list().await
    }

    pub async fn list_module_releases(&self, module_id: ModuleId) -> Result<Vec<Release>> {
        self.require_module(module_id).await?;
        self.releases.list_for_module(module_id).await
    }

    pub async fn set_module_sync_enabled(
        &self,
        admin_id: &str,
        module_id: ModuleId,
        enabled: bool,
    ) -> Result<ModuleSyncConfig> {
        let before = self.require_module(module_id).await?;
        if !self.modules.set_enabled(module_id, enabled).await? {
            return Err(AppError::NotFound(format!(
                "module {} has no sync config",
                module_id
            )));
        }

        self.record(
            NewAdminAction::new(
                admin_id,
                AdminActionKind::ModuleSyncToggle,
                "module",
                module_id,
                format!(
                    "{} release sync for {}",
                    if enabled { "Enabled" } else { "Disabled" },
                    before.github_repo
                ),
            )
            .with_values(
                Some(json!({ "enabled": before.enabled })),
                Some(json!({ "enabled": enabled })),
            ),
        )
        .await;

        self.require_module(module_id).await
    }

    /// Opt a module into release sync, or change its repo/token
    pub async fn register_module(
        &self,
        admin_id: &str,
        module_id: ModuleId,
        github_repo: &str,
        owner_token: Option<String>,
    ) -> Result<ModuleSyncConfig> {
        let repo = github_repo.trim();
        validate_repo(repo)?;

        let previous = self.modules.find(module_id).await?;
        let config = match &previous {
            Some(existing) => ModuleSyncConfig {
                github_repo: repo.to_string(),
                owner_token: owner_token.or_else(|| existing.owner_token.clone()),
                ..existing.clone()
            },
            None => ModuleSyncConfig {
                owner_token,
                ..ModuleSyncConfig::new(module_id, repo)
            },
        };
        self.modules.upsert(&config).await?;

        self.record(
            NewAdminAction::new(
                admin_id,
                AdminActionKind::ModuleRegister,
                "module",
                module_id,
                format!("Registered {} for release sync", repo),
            )
            .with_values(
                previous.map(|p| json!({ "githubRepo": p.github_repo })),
                Some(json!({ "githubRepo": repo })),
            ),
        )
        .await;

        self.require_module(module_id).await
    }

    pub async fn sync_stats(&self) -> Result<SyncStats> {
        let configs = self.modules.list().await?;

        let mut jobs_by_status = BTreeMap::new();
        for status in JobStatus::ALL {
            jobs_by_status.insert(
                status.as_str().to_string(),
                self.queue.count_by_status(status).await?,
            );
        }

        Ok(SyncStats {
            total_modules: configs.len(),
            enabled_modules: configs.iter().filter(|c| c.enabled).count(),
            modules_with_errors: configs.iter().filter(|c| !c.sync_errors.is_empty()).count(),
            never_synced: configs.iter().filter(|c| c.last_sync_at.is_none()).count(),
            jobs_by_status,
        })
    }

    pub async fn recent_admin_actions(&self, limit: u32) -> Result<Vec<AdminAction>> {
        self.audit.recent(limit).await
    }

    async fn require_module(&self, module_id: ModuleId) -> Result<ModuleSyncConfig> {
        self.modules
            .find(module_id)
            .await?
            .ok_or_else(|| AppError::NotFound(format!("module {} has no sync config", module_id)))
    }

    async fn record(&self, action: NewAdminAction) {
        if let Err(e) = self.audit.record(&action).await {
            warn!(action = %action.action, error = %e, "Failed to record admin action");
        }
    }
}

/// `owner/name`, both parts non-empty
fn validate_repo(repo: &str) -> Result<()> {
    match repo.split_once('/') {
        Some((owner, name)) if !owner.is_empty() && !name.is_empty() && !name.contains('/') => Ok(()),
        _ => Err(AppError::Validation(format!(
            "github repo must look like owner/name, got '{}'",
            repo
        ))),
    }
}
