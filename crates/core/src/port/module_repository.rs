// Module Sync Config Repository Port

use crate::domain::{ModuleId, ModuleSyncConfig, SyncErrorEntry};
use crate::error::Result;
use async_trait::async_trait;

#[async_trait]
pub trait ModuleSyncRepository: Send + Sync {
    /// Insert or replace the repo/enabled/token fields of a module's config
    async fn upsert(&self, config: &ModuleSyncConfig) -> Result<()>;

    async fn find(&self, module_id: ModuleId) -> Result<Option<ModuleSyncConfig>>;

    /// All configs ordered by module id
    async fn list(&self) -> Result<Vec<ModuleSyncConfig>>;

    /// Enabled configs ordered by staleness: `last_sync_at` ascending, nulls first
    async fn list_enabled_by_staleness(&self) -> Result<Vec<ModuleSyncConfig>>;

    /// Returns false when the module has no config
    async fn set_enabled(&self, module_id: ModuleId, enabled: bool) -> Result<bool>;

    /// Record the outcome of one sync attempt.
    ///
    /// `last_sync_at` is always written and `sync_errors` replaced;
    /// the cursor is only moved when `cursor` is `Some`.
    async fn record_attempt(
        &self,
        module_id: ModuleId,
        last_sync_at: i64,
        cursor: Option<&str>,
        sync_errors: &[SyncErrorEntry],
    ) -> Result<()>;
}
