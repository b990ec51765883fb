// Release Schedule Repository Port

use crate::domain::ReleaseSchedule;
use crate::error::Result;
use async_trait::async_trait;

#[async_trait]
pub trait ScheduleRepository: Send + Sync {
    /// Load the singleton schedule, creating `ReleaseSchedule::initial(now)` if absent
    async fn load(&self, now_millis: i64) -> Result<ReleaseSchedule>;

    /// Persist the admin-editable fields and `next_run_at` in one statement
    async fn save(&self, schedule: &ReleaseSchedule) -> Result<()>;

    /// Persist a firing: both timestamps in one statement, nothing else touched
    async fn record_run(&self, last_run_at: i64, next_run_at: i64) -> Result<()>;
}
