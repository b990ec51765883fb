//! Release Scheduler - decides when to enqueue the next batch sync
//!
//! A fixed-period tick loads the persisted schedule and, once `next_run_at`
//! has passed, enqueues one `sync-batch` job and advances the schedule.
//! Fire times drift by up to one tick; the tick must stay at or below
//! `MAX_SCHEDULER_TICK_INTERVAL` so no due run is skipped.

use crate::application::queue::JobQueue;
use crate::application::worker::constants::MAX_SCHEDULER_TICK_INTERVAL;
use crate::application::worker::{shutdown_channel, ShutdownSender};
use crate::domain::{
    AdminActionKind, JobId, NewAdminAction, ReleaseSchedule, ScheduleUpdate, SYSTEM_ACTOR,
};
use crate::error::{AppError, Result};
use crate::port::{AdminActionLog, ScheduleRepository, TimeProvider};
use std::sync::Arc;
use std::time::Duration;
use tokio::sync::Mutex;
use tokio::task::JoinHandle;
use tokio::time::MissedTickBehavior;
use tracing::{debug, error, info, warn};

struct LoopHandle {
    shutdown: ShutdownSender,
    task: JoinHandle<()>,
}

pub struct ReleaseScheduler {
    schedules: Arc<dyn ScheduleRepository>,
    queue: Arc<JobQueue>,
    audit: Arc<dyn AdminActionLog>,
    time_provider: Arc<dyn TimeProvider>,
    tick_interval: Duration,
    /// Serialises ticks with admin updates so neither overwrites the other
    tick_lock: Mutex<()>,
    handle: std::sync::Mutex<Option<LoopHandle>>,
}

impl ReleaseScheduler {
    pub fn new(
        schedules: Arc<dyn ScheduleRepository>,
        queue: Arc<JobQueue>,
        audit: Arc<dyn AdminActionLog>,
        time_provider: Arc<dyn TimeProvider>,
        tick_interval: Duration,
    ) -> Result<Self> {
        if tick_interval.is_zero() || tick_interval > MAX_SCHEDULER_TICK_INTERVAL {
            return Err(AppError::Config(format!(
                "scheduler tick must be between 1s and {}s, got {}s",
                MAX_SCHEDULER_TICK_INTERVAL.as_secs(),
                tick_interval.as_secs()
            )));
        }
        Ok(Self {
            schedules,
            queue,
            audit,
            time_provider,
            tick_interval,
            tick_lock: Mutex::new(()),
            handle: std::sync::Mutex::new(None),
        })
    }

    /// One scheduler step. Returns the id of the batch job when one was enqueued.
    ///
    /// A no-op while the schedule is disabled or not yet due. The schedule is
    /// only advanced after the batch job exists, so a failed step is retried
    /// by the next tick.
    pub async fn tick(&self) -> Result<Option<JobId>> {
        let _guard = self.tick_lock.lock().await;
        let now = self.time_provider.now_millis();
        let schedule = self.schedules.load(now).await?;

        if !schedule.is_due(now) {
            debug!(
                enabled = schedule.enabled,
                next_run_at = schedule.next_run_at,
                now = now,
                "Schedule not due"
            );
            return Ok(None);
        }

        let job_id = self
            .queue
            .add_sync_batch_job(schedule.batch_size, Some(SYSTEM_ACTOR))
            .await?;

        let fired = schedule.fired(now);
        let last_run_at = fired.last_run_at.unwrap_or(now);
        self.schedules
            .record_run(last_run_at, fired.next_run_at)
            .await?;

        info!(
            job_id = %job_id,
            batch_size = schedule.batch_size,
            next_run_at = fired.next_run_at,
            "Scheduled batch sync enqueued"
        );

        let action = NewAdminAction::new(
            SYSTEM_ACTOR,
            AdminActionKind::ScheduledBatchSync,
            "job",
            job_id,
            format!("Scheduled batch sync of up to {} modules", schedule.batch_size),
        )
        .with_values(
            Some(serde_json::to_value(&schedule)?),
            Some(serde_json::to_value(&fired)?),
        );
        if let Err(e) = self.audit.record(&action).await {
            warn!(error = %e, "Failed to record scheduled batch sync");
        }

        Ok(Some(job_id))
    }

    /// Start the tick loop. Returns false if it is already running.
    pub fn start(self: &Arc<Self>) -> bool {
        let mut slot = match self.handle.lock() {
            Ok(slot) => slot,
            Err(poisoned) => poisoned.into_inner(),
        };
        if slot.is_some() {
            warn!("Release scheduler already started");
            return false;
        }

        let (shutdown, mut token) = shutdown_channel();
        let scheduler = Arc::clone(self);
        let task = tokio::spawn(async move {
            let mut ticker = tokio::time::interval(scheduler.tick_interval);
            ticker.set_missed_tick_behavior(MissedTickBehavior::Skip);
            info!(
                tick_secs = scheduler.tick_interval.as_secs(),
                "Release scheduler started"
            );
            loop {
                tokio::select! {
                    _ = ticker.tick() => {
                        if let Err(e) = scheduler.tick().await {
                            error!(error = %e, "Scheduler tick failed");
                        }
                    }
                    _ = token.wait() => break,
                }
            }
            info!("Release scheduler stopped");
        });

        *slot = Some(LoopHandle { shutdown, task });
        true
    }

    /// Stop the tick loop and wait for an in-flight tick to finish
    pub async fn stop(&self) {
        let handle = match self.handle.lock() {
            Ok(mut slot) => slot.take(),
            Err(poisoned) => poisoned.into_inner().take(),
        };
        if let Some(LoopHandle { shutdown, task }) = handle {
            shutdown.shutdown();
            if let Err(e) = task.await {
                error!(error = %e, "Scheduler loop ended abnormally");
            }
        }
    }

    pub fn is_running(&self) -> bool {
        match self.handle.lock() {
            Ok(slot) => slot.is_some(),
            Err(poisoned) => poisoned.into_inner().is_some(),
        }
    }

    pub async fn get_schedule(&self) -> Result<ReleaseSchedule> {
        self.schedules.load(self.time_provider.now_millis()).await
    }

    /// Apply an admin change and return `(old, new)`
    pub async fn update_schedule(
        &self,
        update: &ScheduleUpdate,
    ) -> Result<(ReleaseSchedule, ReleaseSchedule)> {
        let _guard = self.tick_lock.lock().await;
        let now = self.time_provider.now_millis();
        let old = self.schedules.load(now).await?;
        let new = old.apply(update, now)?;
        self.schedules.save(&new).await?;
        info!(
            enabled = new.enabled,
            interval_hours = new.interval_hours,
            batch_size = new.batch_size,
            next_run_at = new.next_run_at,
            "Release schedule updated"
        );
        Ok((old, new))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::domain::{
        AdminAction, Job, JobFilter, JobLogEntry, JobPatch, JobStatus, ModuleId, NewJob,
    };
    use crate::port::time_provider::mocks::ManualTimeProvider;
    use crate::port::JobRepository;
    use async_trait::async_trait;
    use std::sync::Mutex as StdMutex;

    const HOUR: i64 = 3_600_000;

    struct MemorySchedule(StdMutex<Option<ReleaseSchedule>>);

    #[async_trait]
    impl ScheduleRepository for MemorySchedule {
        async fn load(&self, now_millis: i64) -> Result<ReleaseSchedule> {
            let mut slot = self.0.lock().unwrap();
            Ok(slot
                .get_or_insert_with(|| ReleaseSchedule::initial(now_millis))
                .clone())
        }

        async fn save(&self, schedule: &ReleaseSchedule) -> Result<()> {
            *self.0.lock().unwrap() = Some(schedule.clone());
            Ok(())
        }

        async fn record_run(&self, last_run_at: i64, next_run_at: i64) -> Result<()> {
            let mut slot = self.0.lock().unwrap();
            let schedule = slot.as_mut().unwrap();
            schedule.last_run_at = Some(last_run_at);
            schedule.next_run_at = next_run_at;
            Ok(())
        }
    }

    /// Records inserts only; the scheduler never reads jobs back
    #[derive(Default)]
    struct InsertOnlyJobs(StdMutex<Vec<NewJob>>);

    #[async_trait]
    impl JobRepository for InsertOnlyJobs {
        async fn insert(&self, job: &NewJob) -> Result<Job> {
            let mut jobs = self.0.lock().unwrap();
            jobs.push(job.clone());
            Ok(Job {
                id: jobs.len() as i64,
                job_type: job.job_type.clone(),
                status: JobStatus::Pending,
                progress: 0,
                parameters: job.parameters.clone(),
                results: None,
                logs: vec![],
                started_by: job.started_by.clone(),
                created_at: job.created_at,
                run_at: job.run_at,
                started_at: None,
                completed_at: None,
                duration: None,
            })
        }
        async fn find_by_id(&self, _id: JobId) -> Result<Option<Job>> {
            Ok(None)
        }
        async fn update(&self, id: JobId, _patch: &JobPatch) -> Result<Job> {
            Err(AppError::NotFound(format!("job {} not found", id)))
        }
        async fn append_log(&self, _id: JobId, _entry: &JobLogEntry) -> Result<()> {
            Ok(())
        }
        async fn list(&self, _filter: &JobFilter) -> Result<Vec<Job>> {
            Ok(vec![])
        }
        async fn pop_next(&self, _now_millis: i64) -> Result<Option<Job>> {
            Ok(None)
        }
        async fn find_by_status(&self, _status: JobStatus) -> Result<Vec<Job>> {
            Ok(vec![])
        }
        async fn count_by_status(&self, _status: JobStatus) -> Result<i64> {
            Ok(0)
        }
        async fn active_sync_module_ids(&self) -> Result<Vec<ModuleId>> {
            Ok(vec![])
        }
    }

    #[derive(Default)]
    struct NullAudit;

    #[async_trait]
    impl AdminActionLog for NullAudit {
        async fn record(&self, _action: &NewAdminAction) -> Result<()> {
            Ok(())
        }
        async fn recent(&self, _limit: u32) -> Result<Vec<AdminAction>> {
            Ok(vec![])
        }
    }

    fn fixture(
        schedule: Option<ReleaseSchedule>,
        now: i64,
    ) -> (Arc<ReleaseScheduler>, Arc<MemorySchedule>, Arc<InsertOnlyJobs>, Arc<ManualTimeProvider>) {
        let clock = Arc::new(ManualTimeProvider::new(now));
        let schedules = Arc::new(MemorySchedule(StdMutex::new(schedule)));
        let jobs = Arc::new(InsertOnlyJobs::default());
        let queue = Arc::new(JobQueue::new(jobs.clone(), clock.clone()));
        let scheduler = ReleaseScheduler::new(
            schedules.clone(),
            queue,
            Arc::new(NullAudit),
            clock.clone(),
            Duration::from_secs(60),
        )
        .unwrap();
        (Arc::new(scheduler), schedules, jobs, clock)
    }

    fn enabled_schedule(next_run_at: i64) -> ReleaseSchedule {
        ReleaseSchedule {
            enabled: true,
            interval_hours: 1,
            batch_size: 5,
            next_run_at,
            last_run_at: None,
        }
    }

    #[test]
    fn test_rejects_tick_longer_than_half_hour() {
        let clock = Arc::new(ManualTimeProvider::new(0));
        let jobs = Arc::new(InsertOnlyJobs::default());
        let result = ReleaseScheduler::new(
            Arc::new(MemorySchedule(StdMutex::new(None))),
            Arc::new(JobQueue::new(jobs, clock.clone())),
            Arc::new(NullAudit),
            clock,
            Duration::from_secs(31 * 60),
        );
        assert!(matches!(result, Err(AppError::Config(_))));
    }

    #[tokio::test]
    async fn test_tick_before_due_is_noop() {
        let now = 10 * HOUR;
        let initial = enabled_schedule(now + 1_000);
        let (scheduler, schedules, jobs, _) = fixture(Some(initial.clone()), now);

        assert_eq!(scheduler.tick().await.unwrap(), None);
        assert!(jobs.0.lock().unwrap().is_empty());
        assert_eq!(schedules.load(now).await.unwrap(), initial);
    }

    #[tokio::test]
    async fn test_disabled_schedule_never_fires() {
        let now = 10 * HOUR;
        let mut schedule = enabled_schedule(now - HOUR);
        schedule.enabled = false;
        let (scheduler, _, jobs, _) = fixture(Some(schedule), now);

        assert_eq!(scheduler.tick().await.unwrap(), None);
        assert!(jobs.0.lock().unwrap().is_empty());
    }

    #[tokio::test]
    async fn test_due_tick_fires_once_and_advances() {
        let now = 10 * HOUR;
        let (scheduler, schedules, jobs, clock) = fixture(Some(enabled_schedule(now - 1_000)), now);

        assert!(scheduler.tick().await.unwrap().is_some());
        // Repeated calls within the same tick do not enqueue again
        clock.advance(5_000);
        assert_eq!(scheduler.tick().await.unwrap(), None);

        assert_eq!(jobs.0.lock().unwrap().len(), 1);
        let saved = schedules.load(now).await.unwrap();
        assert_eq!(saved.last_run_at, Some(now));
        assert_eq!(saved.next_run_at, now + HOUR);
    }

    #[tokio::test]
    async fn test_update_schedule_recomputes_next_run() {
        let now = 10 * HOUR;
        let (scheduler, _, _, _) = fixture(None, now);

        let (old, new) = scheduler
            .update_schedule(&ScheduleUpdate {
                enabled: Some(true),
                interval_hours: Some(6),
                batch_size: None,
            })
            .await
            .unwrap();

        assert!(!old.enabled);
        assert!(new.enabled);
        assert_eq!(new.interval_hours, 6);
        assert_eq!(new.next_run_at, now + 6 * HOUR);
    }

    #[tokio::test]
    async fn test_start_twice_is_guarded() {
        let (scheduler, _, _, _) = fixture(None, 0);
        assert!(scheduler.start());
        assert!(!scheduler.start());
        assert!(scheduler.is_running());
        scheduler.stop().await;
        assert!(!scheduler.is_running());
    }
}
