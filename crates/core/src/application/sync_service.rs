//! Sync Service - imports new releases of one module from the release provider
//!
//! Failures are absorbed at the smallest unit: a malformed release is recorded
//! and skipped, a provider failure for the whole module is recorded on the
//! module's sync config. Storage failures surface as `Err` and abort the sync
//! without advancing the cursor.

use crate::domain::{ModuleId, ModuleSyncConfig, NewRelease, ProviderRelease};
use crate::error::{AppError, Result};
use crate::port::{
    Credential, JobRepository, ModuleSyncRepository, ProviderError, ReleaseProvider,
    ReleaseRepository, TimeProvider,
};
use async_trait::async_trait;
use std::collections::HashSet;
use std::sync::Arc;
use tracing::{debug, info, warn};

/// Result of one module sync attempt
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SyncOutcome {
    /// True once the cursor and sync timestamp were recorded after a listing
    pub success: bool,
    pub new_releases: u32,
    pub errors: Vec<String>,
    /// The attempt stopped early because its job was cancelled
    pub cancelled: bool,
}

/// Hooks a running sync calls between releases
#[async_trait]
pub trait SyncObserver: Send + Sync {
    /// Checked before each release; `true` stops the loop
    async fn is_cancelled(&self) -> bool;

    async fn on_progress(&self, done: usize, total: usize);
}

/// Observer for syncs run outside a job
pub struct NoopObserver;

#[async_trait]
impl SyncObserver for NoopObserver {
    async fn is_cancelled(&self) -> bool {
        false
    }

    async fn on_progress(&self, _done: usize, _total: usize) {}
}

enum ImportResult {
    Imported(i64),
    AlreadyPresent,
    /// The provider payload failed validation; storage was not touched
    Rejected(String),
}

pub struct SyncService {
    modules: Arc<dyn ModuleSyncRepository>,
    releases: Arc<dyn ReleaseRepository>,
    jobs: Arc<dyn JobRepository>,
    provider: Arc<dyn ReleaseProvider>,
    time_provider: Arc<dyn TimeProvider>,
    shared_credential: Option<Credential>,
}

impl SyncService {
    pub fn new(
        modules: Arc<dyn ModuleSyncRepository>,
        releases: Arc<dyn ReleaseRepository>,
        jobs: Arc<dyn JobRepository>,
        provider: Arc<dyn ReleaseProvider>,
        time_provider: Arc<dyn TimeProvider>,
        shared_token: Option<String>,
    ) -> Self {
        Self {
            modules,
            releases,
            jobs,
            provider,
            time_provider,
            shared_credential: shared_token
                .filter(|t| !t.trim().is_empty())
                .map(Credential::shared),
        }
    }

    /// Pick up to `batch_size` enabled modules, stalest first, skipping any
    /// module that already has a sync job pending or running
    pub async fn select_batch_targets(&self, batch_size: u32) -> Result<Vec<ModuleSyncConfig>> {
        let busy: HashSet<ModuleId> = self.jobs.active_sync_module_ids().await?.into_iter().collect();
        let targets: Vec<ModuleSyncConfig> = self
            .modules
            .list_enabled_by_staleness()
            .await?
            .into_iter()
            .filter(|m| !busy.contains(&m.module_id))
            .take(batch_size as usize)
            .collect();

        debug!(
            requested = batch_size,
            selected = targets.len(),
            skipped_busy = busy.len(),
            "Selected batch sync targets"
        );
        Ok(targets)
    }

    /// Sync the releases of one module
    pub async fn sync_module_releases(
        &self,
        module_id: ModuleId,
        repo: &str,
        observer: &dyn SyncObserver,
    ) -> Result<SyncOutcome> {
        let config = self
            .modules
            .find(module_id)
            .await?
            .ok_or_else(|| AppError::NotFound(format!("module {} has no sync config", module_id)))?;

        if config.github_repo != repo {
            warn!(
                module_id = %module_id,
                configured = %config.github_repo,
                requested = %repo,
                "Job repo differs from module config, using job repo"
            );
        }

        let now = self.time_provider.now_millis();
        let mut fetched = match self.fetch_releases(&config, repo).await {
            Ok(releases) => releases,
            Err(e) => {
                warn!(module_id = %module_id, repo = %repo, error = ?e, "Release listing failed");
                let errors = vec![e.to_string()];
                self.modules
                    .record_attempt(module_id, now, None, &config.next_sync_errors(&errors, now))
                    .await?;
                return Ok(SyncOutcome {
                    success: false,
                    new_releases: 0,
                    errors,
                    cancelled: false,
                });
            }
        };

        // Oldest first so the newest imported release ends up marked latest
        fetched.sort_by(|a, b| {
            a.published_at
                .cmp(&b.published_at)
                .then_with(|| a.external_id.cmp(&b.external_id))
        });

        let total = fetched.len();
        let mut errors = Vec::new();
        let mut new_releases = 0u32;
        let mut cursor: Option<String> = None;
        let mut latest_import: Option<i64> = None;
        let mut cancelled = false;

        for (index, release) in fetched.iter().enumerate() {
            if observer.is_cancelled().await {
                info!(module_id = %module_id, processed = index, total = total, "Sync cancelled");
                cancelled = true;
                break;
            }

            match self.import_release(module_id, release, now).await? {
                ImportResult::Imported(id) => {
                    new_releases += 1;
                    latest_import = Some(id);
                    cursor = Some(release.external_id.clone());
                }
                ImportResult::AlreadyPresent => {
                    latest_import = None;
                    cursor = Some(release.external_id.clone());
                }
                ImportResult::Rejected(reason) => {
                    warn!(
                        module_id = %module_id,
                        version = %release.version,
                        error = %reason,
                        "Skipping release"
                    );
                    errors.push(format!("release {}: {}", release.version, reason));
                }
            }

            observer.on_progress(index + 1, total).await;
        }

        if let Some(release_id) = latest_import {
            self.releases.mark_latest(module_id, release_id).await?;
        }

        self.modules
            .record_attempt(
                module_id,
                now,
                cursor.as_deref(),
                &config.next_sync_errors(&errors, now),
            )
            .await?;

        info!(
            module_id = %module_id,
            repo = %repo,
            fetched = total,
            new_releases = new_releases,
            errors = errors.len(),
            "Module sync finished"
        );

        Ok(SyncOutcome {
            success: true,
            new_releases,
            errors,
            cancelled,
        })
    }

    /// List releases, preferring the owner's personal credential and falling
    /// back to the shared one when it is absent or rejected
    async fn fetch_releases(
        &self,
        config: &ModuleSyncConfig,
        repo: &str,
    ) -> std::result::Result<Vec<ProviderRelease>, ProviderError> {
        let cursor = config.last_release_id.as_deref();

        if let Some(token) = config.owner_token.as_deref().filter(|t| !t.trim().is_empty()) {
            let personal = Credential::personal(token);
            match self.provider.list_releases(repo, cursor, Some(&personal)).await {
                Err(ProviderError::Unauthorized) => {
                    warn!(
                        module_id = %config.module_id,
                        "Personal token rejected, falling back to shared credential"
                    );
                }
                other => return other,
            }
        }

        self.provider
            .list_releases(repo, cursor, self.shared_credential.as_ref())
            .await
    }

    async fn import_release(
        &self,
        module_id: ModuleId,
        release: &ProviderRelease,
        now: i64,
    ) -> Result<ImportResult> {
        if self.releases.exists(module_id, &release.version).await? {
            return Ok(ImportResult::AlreadyPresent);
        }

        let assets = match release.parse_assets() {
            Ok(assets) => assets,
            Err(e) => {
                let reason = ProviderError::MalformedPayload(e.to_string());
                return Ok(ImportResult::Rejected(reason.to_string()));
            }
        };

        let id = self
            .releases
            .insert(&NewRelease {
                module_id,
                external_id: release.external_id.clone(),
                version: release.version.clone(),
                changelog: release.changelog.clone(),
                assets,
                published_at: release.published_at,
                created_at: now,
            })
            .await?;
        Ok(ImportResult::Imported(id))
    }
}
