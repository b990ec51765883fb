// Release Repository Port

use crate::domain::{ModuleId, NewRelease, Release};
use crate::error::Result;
use async_trait::async_trait;

#[async_trait]
pub trait ReleaseRepository: Send + Sync {
    async fn exists(&self, module_id: ModuleId, version: &str) -> Result<bool>;

    /// Insert a release (not latest) and return its id
    async fn insert(&self, release: &NewRelease) -> Result<i64>;

    /// Mark `release_id` as the module's latest and un-mark every other release
    async fn mark_latest(&self, module_id: ModuleId, release_id: i64) -> Result<()>;

    /// Releases of a module, newest published first
    async fn list_for_module(&self, module_id: ModuleId) -> Result<Vec<Release>>;
}
