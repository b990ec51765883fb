// Crash recovery: jobs left running by a previous process
use crate::domain::{JobLogEntry, JobPatch, JobResults, JobStatus, LogLevel};
use crate::port::{JobRepository, TimeProvider};
use std::sync::Arc;
use tracing::{info, warn};

pub const ORPHANED_JOB_ERROR: &str = "orphaned: process restarted while job was running";

/// Crash recovery service
///
/// Runs once at daemon startup, before the worker is spawned. The daemon is
/// the only consumer of its job store, so every RUNNING row found at that
/// point belongs to a process that is gone, however recently it started.
/// Such jobs are failed, never requeued; an operator retries them explicitly.
pub struct RecoveryService {
    job_repo: Arc<dyn JobRepository>,
    time_provider: Arc<dyn TimeProvider>,
}

impl RecoveryService {
    pub fn new(job_repo: Arc<dyn JobRepository>, time_provider: Arc<dyn TimeProvider>) -> Self {
        Self {
            job_repo,
            time_provider,
        }
    }

    /// Fail every RUNNING job
    ///
    /// # Returns
    /// Number of jobs recovered
    pub async fn recover_orphaned_jobs(&self) -> crate::error::Result<usize> {
        let now = self.time_provider.now_millis();
        let running_jobs = self.job_repo.find_by_status(JobStatus::Running).await?;

        info!(running = running_jobs.len(), "Starting orphaned job recovery");

        let mut recovered_count = 0;
        for job in running_jobs {
            match job.started_at {
                Some(started_at) => {
                    info!(
                        job_id = %job.id,
                        running_for_ms = now - started_at,
                        "Failing orphaned job"
                    );
                }
                None => {
                    warn!(job_id = %job.id, "RUNNING job without started_at, marking as FAILED");
                }
            }

            let patch = JobPatch::failed(&job, now, JobResults::failure(ORPHANED_JOB_ERROR))?;
            match self.job_repo.update(job.id, &patch).await {
                Ok(_) => {
                    recovered_count += 1;
                    let entry = JobLogEntry::new(now, LogLevel::Error, ORPHANED_JOB_ERROR);
                    if let Err(e) = self.job_repo.append_log(job.id, &entry).await {
                        warn!(job_id = %job.id, error = %e, "Failed to append recovery log");
                    }
                }
                // Finalized concurrently; nothing left to recover
                Err(e) if e.is_invalid_transition() => {
                    info!(job_id = %job.id, "Job finished before recovery reached it");
                }
                Err(e) => return Err(e),
            }
        }

        info!(recovered_count = %recovered_count, "Orphaned job recovery complete");
        Ok(recovered_count)
    }
}
