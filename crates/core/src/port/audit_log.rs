// Admin Action Log Port

use crate::domain::{AdminAction, NewAdminAction};
use crate::error::Result;
use async_trait::async_trait;

/// Append-only sink for admin audit records
#[async_trait]
pub trait AdminActionLog: Send + Sync {
    async fn record(&self, action: &NewAdminAction) -> Result<()>;

    /// Most recent entries first
    async fn recent(&self, limit: u32) -> Result<Vec<AdminAction>>;
}
