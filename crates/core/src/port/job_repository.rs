// Job Repository Port (Interface)

use crate::domain::{Job, JobFilter, JobId, JobLogEntry, JobPatch, JobStatus, ModuleId, NewJob};
use crate::error::Result;
use async_trait::async_trait;

/// Repository interface for Job persistence
///
/// Every write is a single-row statement; no operation spans several jobs.
#[async_trait]
pub trait JobRepository: Send + Sync {
    /// Insert a new job in `pending` and return it with its assigned id
    async fn insert(&self, job: &NewJob) -> Result<Job>;

    /// Find job by ID
    async fn find_by_id(&self, id: JobId) -> Result<Option<Job>>;

    /// Apply a patch to one job.
    ///
    /// A patch carrying a status is rejected with a domain
    /// `InvalidStateTransition` unless the persisted status may move to it.
    /// Fails with `NotFound` for an unknown id.
    async fn update(&self, id: JobId, patch: &JobPatch) -> Result<Job>;

    /// Append a log line (never reorders or truncates existing lines)
    async fn append_log(&self, id: JobId, entry: &JobLogEntry) -> Result<()>;

    /// List jobs, newest first
    async fn list(&self, filter: &JobFilter) -> Result<Vec<Job>>;

    /// Atomically claim the oldest eligible `pending` job (FIFO by creation),
    /// moving it to `running` with `started_at = now_millis`
    async fn pop_next(&self, now_millis: i64) -> Result<Option<Job>>;

    /// Find all jobs by status (oldest first)
    async fn find_by_status(&self, status: JobStatus) -> Result<Vec<Job>>;

    /// Count jobs by status
    async fn count_by_status(&self, status: JobStatus) -> Result<i64>;

    /// Module ids that have a `sync-module` job still pending or running
    async fn active_sync_module_ids(&self) -> Result<Vec<ModuleId>>;
}
