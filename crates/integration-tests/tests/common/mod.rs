// Shared wiring for integration tests: the real SQLite adapters on an
// in-memory database, a manual clock and a scripted release provider.

#![allow(dead_code)]

use relsync_core::application::{
    AdminService, JobQueue, RecoveryService, ReleaseScheduler, SyncService, Worker, WorkerConfig,
};
use relsync_core::domain::{ModuleId, ModuleSyncConfig, ProviderAsset, ProviderRelease};
use relsync_core::port::release_provider::mocks::ScriptedReleaseProvider;
use relsync_core::port::time_provider::mocks::ManualTimeProvider;
use relsync_core::port::{
    AdminActionLog, JobRepository, ModuleSyncRepository, ReleaseProvider, ReleaseRepository,
    ScheduleRepository,
};
use relsync_infra_sqlite::{
    create_pool, run_migrations, SqliteAdminActionLog, SqliteJobRepository,
    SqliteModuleSyncRepository, SqliteReleaseRepository, SqliteScheduleRepository,
};
use sqlx::SqlitePool;
use std::sync::Arc;
use std::time::Duration;

fn test_worker(queue: Arc<JobQueue>, sync: Arc<SyncService>) -> Worker {
    Worker::new(
        queue,
        sync,
        WorkerConfig {
            idle_sleep: Duration::from_millis(10),
            error_sleep: Duration::from_millis(10),
            max_jitter_ms: 0,
        },
    )
}

/// 2023-11-14T22:13:20Z
pub const T0: i64 = 1_700_000_000_000;
pub const HOUR_MS: i64 = 60 * 60 * 1000;
pub const ADMIN: &str = "admin-1";

pub struct Harness {
    pub pool: SqlitePool,
    pub clock: Arc<ManualTimeProvider>,
    pub provider: Arc<ScriptedReleaseProvider>,
    pub jobs: Arc<dyn JobRepository>,
    pub modules: Arc<dyn ModuleSyncRepository>,
    pub releases: Arc<dyn ReleaseRepository>,
    pub schedules: Arc<dyn ScheduleRepository>,
    pub audit: Arc<dyn AdminActionLog>,
    pub queue: Arc<JobQueue>,
    pub sync: Arc<SyncService>,
    pub scheduler: Arc<ReleaseScheduler>,
    pub admin: AdminService,
    pub worker: Worker,
}

impl Harness {
    pub async fn new(provider: ScriptedReleaseProvider) -> Self {
        Self::build("sqlite::memory:", provider, None).await
    }

    pub async fn with_shared_token(provider: ScriptedReleaseProvider, token: &str) -> Self {
        Self::build("sqlite::memory:", provider, Some(token.to_string())).await
    }

    pub async fn build(
        database_url: &str,
        provider: ScriptedReleaseProvider,
        shared_token: Option<String>,
    ) -> Self {
        let pool = create_pool(database_url).await.unwrap();
        run_migrations(&pool).await.unwrap();

        let clock = Arc::new(ManualTimeProvider::new(T0));
        let provider = Arc::new(provider);

        let jobs: Arc<dyn JobRepository> = Arc::new(SqliteJobRepository::new(pool.clone()));
        let modules: Arc<dyn ModuleSyncRepository> =
            Arc::new(SqliteModuleSyncRepository::new(pool.clone()));
        let releases: Arc<dyn ReleaseRepository> =
            Arc::new(SqliteReleaseRepository::new(pool.clone()));
        let schedules: Arc<dyn ScheduleRepository> =
            Arc::new(SqliteScheduleRepository::new(pool.clone()));
        let audit: Arc<dyn AdminActionLog> =
            Arc::new(SqliteAdminActionLog::new(pool.clone(), clock.clone()));

        let queue = Arc::new(JobQueue::new(jobs.clone(), clock.clone()));
        let sync = Arc::new(SyncService::new(
            modules.clone(),
            releases.clone(),
            jobs.clone(),
            provider.clone(),
            clock.clone(),
            shared_token,
        ));
        let scheduler = Arc::new(
            ReleaseScheduler::new(
                schedules.clone(),
                queue.clone(),
                audit.clone(),
                clock.clone(),
                Duration::from_secs(60),
            )
            .unwrap(),
        );
        let admin = AdminService::new(
            queue.clone(),
            scheduler.clone(),
            modules.clone(),
            releases.clone(),
            audit.clone(),
            0,
        );
        let worker = test_worker(queue.clone(), sync.clone());

        Self {
            pool,
            clock,
            provider,
            jobs,
            modules,
            releases,
            schedules,
            audit,
            queue,
            sync,
            scheduler,
            admin,
            worker,
        }
    }

    /// Sync service over this harness's store with some ports swapped out
    pub fn sync_with(
        &self,
        modules: Arc<dyn ModuleSyncRepository>,
        releases: Arc<dyn ReleaseRepository>,
        provider: Arc<dyn ReleaseProvider>,
    ) -> Arc<SyncService> {
        Arc::new(SyncService::new(
            modules,
            releases,
            self.jobs.clone(),
            provider,
            self.clock.clone(),
            None,
        ))
    }

    pub fn worker_with(&self, queue: Arc<JobQueue>, sync: Arc<SyncService>) -> Worker {
        test_worker(queue, sync)
    }

    pub fn recovery(&self) -> RecoveryService {
        RecoveryService::new(self.jobs.clone(), self.clock.clone())
    }

    pub async fn add_module(&self, module_id: ModuleId, repo: &str) -> ModuleSyncConfig {
        let config = ModuleSyncConfig::new(module_id, repo);
        self.modules.upsert(&config).await.unwrap();
        config
    }

    pub async fn add_module_with_token(
        &self,
        module_id: ModuleId,
        repo: &str,
        token: &str,
    ) -> ModuleSyncConfig {
        let config = ModuleSyncConfig {
            owner_token: Some(token.to_string()),
            ..ModuleSyncConfig::new(module_id, repo)
        };
        self.modules.upsert(&config).await.unwrap();
        config
    }

    /// Run the worker until the queue has nothing eligible
    pub async fn drain(&self) -> usize {
        let mut processed = 0;
        while self.worker.process_next_job().await.unwrap() {
            processed += 1;
        }
        processed
    }
}

/// A well-formed release with one asset, published `day` days after T0
pub fn release(external_id: &str, version: &str, day: i64) -> ProviderRelease {
    ProviderRelease {
        external_id: external_id.to_string(),
        version: version.to_string(),
        published_at: T0 + day * 24 * HOUR_MS,
        assets: vec![ProviderAsset::new(
            &format!("widget-{}.zip", version),
            &format!("https://downloads.example.com/widget-{}.zip", version),
            1024,
        )],
        changelog: format!("Changes in {}", version),
    }
}

/// A release whose only asset has no download url
pub fn broken_release(external_id: &str, version: &str, day: i64) -> ProviderRelease {
    ProviderRelease {
        assets: vec![ProviderAsset {
            name: Some("broken.zip".to_string()),
            url: None,
            size: Some(10),
        }],
        ..release(external_id, version, day)
    }
}
