// Admin Action Log - immutable audit records

use serde::{Deserialize, Serialize};
use std::fmt;

/// Actor recorded for actions taken by the scheduler or worker
pub const SYSTEM_ACTOR: &str = "system";

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum AdminActionKind {
    JobStart,
    JobCancel,
    JobRetry,
    ScheduleUpdate,
    ScheduledBatchSync,
    ManualSync,
    ManualSyncAll,
    ModuleSyncToggle,
    ModuleRegister,
}

impl AdminActionKind {
    pub fn as_str(&self) -> &'static str {
        match self {
            AdminActionKind::JobStart => "job_start",
            AdminActionKind::JobCancel => "job_cancel",
            AdminActionKind::JobRetry => "job_retry",
            AdminActionKind::ScheduleUpdate => "schedule_update",
            AdminActionKind::ScheduledBatchSync => "scheduled_batch_sync",
            AdminActionKind::ManualSync => "manual_sync",
            AdminActionKind::ManualSyncAll => "manual_sync_all",
            AdminActionKind::ModuleSyncToggle => "module_sync_toggle",
            AdminActionKind::ModuleRegister => "module_register",
        }
    }
}

impl fmt::Display for AdminActionKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Audit record to be written (the store stamps id and createdAt)
#[derive(Debug, Clone, PartialEq)]
pub struct NewAdminAction {
    pub admin_id: String,
    pub action: AdminActionKind,
    pub details: String,
    pub target_type: String,
    pub target_id: String,
    pub old_values: Option<serde_json::Value>,
    pub new_values: Option<serde_json::Value>,
}

impl NewAdminAction {
    pub fn new(
        admin_id: impl Into<String>,
        action: AdminActionKind,
        target_type: impl Into<String>,
        target_id: impl ToString,
        details: impl Into<String>,
    ) -> Self {
        Self {
            admin_id: admin_id.into(),
            action,
            details: details.into(),
            target_type: target_type.into(),
            target_id: target_id.to_string(),
            old_values: None,
            new_values: None,
        }
    }

    pub fn with_values(
        mut self,
        old_values: Option<serde_json::Value>,
        new_values: Option<serde_json::Value>,
    ) -> Self {
        self.old_values = old_values;
        self.new_values = new_values;
        self
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct AdminAction {
    pub id: i64,
    pub admin_id: String,
    pub action: String,
    pub details: String,
    pub target_type: String,
    pub target_id: String,
    pub old_values: Option<serde_json::Value>,
    pub new_values: Option<serde_json::Value>,
    pub created_at: i64,
}
