// Job Domain Model

use crate::domain::error::{DomainError, Result};
use crate::domain::module_sync::ModuleId;
use serde::{Deserialize, Serialize};
use std::fmt;
use std::str::FromStr;

/// Job ID (monotonically increasing, assigned by the store)
pub type JobId = i64;

/// Job Status
///
/// Legal edges: `pending -> running -> {completed, failed, cancelled}` and
/// `pending -> cancelled`. Terminal states have no outgoing edges.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum JobStatus {
    Pending,
    Running,
    Completed,
    Failed,
    Cancelled,
}

impl JobStatus {
    pub const ALL: [JobStatus; 5] = [
        JobStatus::Pending,
        JobStatus::Running,
        JobStatus::Completed,
        JobStatus::Failed,
        JobStatus::Cancelled,
    ];

    pub fn as_str(&self) -> &'static str {
        match self {
            JobStatus::Pending => "pending",
            JobStatus::Running => "running",
            JobStatus::Completed => "completed",
            JobStatus::Failed => "failed",
            JobStatus::Cancelled => "cancelled",
        }
    }

    pub fn is_terminal(&self) -> bool {
        matches!(
            self,
            JobStatus::Completed | JobStatus::Failed | JobStatus::Cancelled
        )
    }

    pub fn can_transition_to(&self, to: JobStatus) -> bool {
        matches!(
            (self, to),
            (JobStatus::Pending, JobStatus::Running)
                | (JobStatus::Pending, JobStatus::Cancelled)
                | (JobStatus::Running, JobStatus::Completed)
                | (JobStatus::Running, JobStatus::Failed)
                | (JobStatus::Running, JobStatus::Cancelled)
        )
    }

    fn check_transition(&self, to: JobStatus) -> Result<()> {
        if self.can_transition_to(to) {
            Ok(())
        } else {
            Err(DomainError::InvalidStateTransition {
                from: self.to_string(),
                to: to.to_string(),
            })
        }
    }
}

impl fmt::Display for JobStatus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for JobStatus {
    type Err = DomainError;

    fn from_str(s: &str) -> Result<Self> {
        match s {
            "pending" => Ok(JobStatus::Pending),
            "running" => Ok(JobStatus::Running),
            "completed" => Ok(JobStatus::Completed),
            "failed" => Ok(JobStatus::Failed),
            "cancelled" => Ok(JobStatus::Cancelled),
            other => Err(DomainError::ValidationError(format!(
                "unknown job status: {}",
                other
            ))),
        }
    }
}

/// Job Type
///
/// The two sync kinds are dispatched by the worker. Any other administrative
/// kind (e.g. an email test) is carried through the store untouched.
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub enum JobType {
    SyncModule,
    SyncBatch,
    Other(String),
}

impl JobType {
    pub fn as_str(&self) -> &str {
        match self {
            JobType::SyncModule => "sync-module",
            JobType::SyncBatch => "sync-batch",
            JobType::Other(s) => s,
        }
    }
}

impl fmt::Display for JobType {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl From<&str> for JobType {
    fn from(s: &str) -> Self {
        match s {
            "sync-module" => JobType::SyncModule,
            "sync-batch" => JobType::SyncBatch,
            other => JobType::Other(other.to_string()),
        }
    }
}

impl Serialize for JobType {
    fn serialize<S: serde::Serializer>(&self, serializer: S) -> std::result::Result<S::Ok, S::Error> {
        serializer.serialize_str(self.as_str())
    }
}

impl<'de> Deserialize<'de> for JobType {
    fn deserialize<D: serde::Deserializer<'de>>(deserializer: D) -> std::result::Result<Self, D::Error> {
        let s = String::deserialize(deserializer)?;
        Ok(JobType::from(s.as_str()))
    }
}

/// Parameters of a `sync-module` job
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct SyncModuleParams {
    pub module_id: ModuleId,
    pub github_repo: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub user_id: Option<String>,
}

/// Parameters of a `sync-batch` job
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct SyncBatchParams {
    pub batch_size: u32,
}

/// Terminal outcome recorded on a job
#[derive(Debug, Clone, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct JobResults {
    pub success: bool,
    pub processed_count: u32,
    pub error_count: u32,
    #[serde(default)]
    pub errors: Vec<String>,
    #[serde(default)]
    pub summary: String,
}

impl JobResults {
    pub fn failure(message: impl Into<String>) -> Self {
        let message = message.into();
        Self {
            success: false,
            processed_count: 0,
            error_count: 1,
            errors: vec![message.clone()],
            summary: message,
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum LogLevel {
    Info,
    Warn,
    Error,
}

/// One line of a job's append-only log
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct JobLogEntry {
    pub timestamp: i64, // epoch ms
    pub level: LogLevel,
    pub message: String,
}

impl JobLogEntry {
    pub fn new(timestamp: i64, level: LogLevel, message: impl Into<String>) -> Self {
        Self {
            timestamp,
            level,
            message: message.into(),
        }
    }
}

/// Job Entity
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Job {
    pub id: JobId,
    #[serde(rename = "type")]
    pub job_type: JobType,
    pub status: JobStatus,
    pub progress: i32,
    pub parameters: serde_json::Value,
    pub results: Option<JobResults>,
    pub logs: Vec<JobLogEntry>,
    pub started_by: Option<String>,

    pub created_at: i64, // epoch ms
    pub run_at: i64,     // not eligible for dequeue before this instant
    pub started_at: Option<i64>,
    pub completed_at: Option<i64>,
    pub duration: Option<i64>, // seconds
}

impl Job {
    /// Decode `parameters` as the typed payload of a sync-module job
    pub fn sync_module_params(&self) -> Result<SyncModuleParams> {
        serde_json::from_value(self.parameters.clone()).map_err(|e| {
            DomainError::ValidationError(format!("job {} has invalid sync-module parameters: {}", self.id, e))
        })
    }

    /// Decode `parameters` as the typed payload of a sync-batch job
    pub fn sync_batch_params(&self) -> Result<SyncBatchParams> {
        serde_json::from_value(self.parameters.clone()).map_err(|e| {
            DomainError::ValidationError(format!("job {} has invalid sync-batch parameters: {}", self.id, e))
        })
    }
}

/// Job creation request (the store assigns id and initial status)
#[derive(Debug, Clone)]
pub struct NewJob {
    pub job_type: JobType,
    pub parameters: serde_json::Value,
    pub started_by: Option<String>,
    pub created_at: i64,
    pub run_at: i64,
}

impl NewJob {
    pub fn new(job_type: JobType, parameters: serde_json::Value, created_at: i64) -> Self {
        Self {
            job_type,
            parameters,
            started_by: None,
            created_at,
            run_at: created_at,
        }
    }

    pub fn started_by(mut self, actor: Option<String>) -> Self {
        self.started_by = actor;
        self
    }

    pub fn delayed_by(mut self, delay_ms: i64) -> Self {
        self.run_at = self.created_at + delay_ms.max(0);
        self
    }
}

/// Partial update applied to a single job row
///
/// A patch carrying `status` is only accepted by the store when the
/// persisted status may legally move to it. Transition patches also pin
/// `expected_status`, the status they were computed from; the store refuses
/// them with a conflict once the row has moved on.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct JobPatch {
    pub status: Option<JobStatus>,
    pub expected_status: Option<JobStatus>,
    pub progress: Option<i32>,
    pub results: Option<JobResults>,
    pub started_at: Option<i64>,
    pub completed_at: Option<i64>,
    pub duration: Option<i64>,
}

impl JobPatch {
    pub fn progress(percent: i32) -> Self {
        Self {
            progress: Some(percent.clamp(0, 100)),
            ..Default::default()
        }
    }

    pub fn running(job: &Job, now_millis: i64) -> Result<Self> {
        job.status.check_transition(JobStatus::Running)?;
        Ok(Self {
            status: Some(JobStatus::Running),
            expected_status: Some(job.status),
            progress: Some(0),
            started_at: Some(now_millis),
            ..Default::default()
        })
    }

    pub fn completed(job: &Job, now_millis: i64, results: Option<JobResults>) -> Result<Self> {
        job.status.check_transition(JobStatus::Completed)?;
        Ok(Self {
            status: Some(JobStatus::Completed),
            expected_status: Some(job.status),
            progress: Some(100),
            results,
            completed_at: Some(now_millis),
            duration: duration_secs(job.started_at, now_millis),
            ..Default::default()
        })
    }

    pub fn failed(job: &Job, now_millis: i64, results: JobResults) -> Result<Self> {
        job.status.check_transition(JobStatus::Failed)?;
        Ok(Self {
            status: Some(JobStatus::Failed),
            expected_status: Some(job.status),
            results: Some(results),
            completed_at: Some(now_millis),
            duration: duration_secs(job.started_at, now_millis),
            ..Default::default()
        })
    }

    pub fn cancelled(job: &Job, now_millis: i64) -> Result<Self> {
        job.status.check_transition(JobStatus::Cancelled)?;
        Ok(Self {
            status: Some(JobStatus::Cancelled),
            expected_status: Some(job.status),
            completed_at: Some(now_millis),
            duration: duration_secs(job.started_at, now_millis),
            ..Default::default()
        })
    }
}

fn duration_secs(started_at: Option<i64>, finished_at: i64) -> Option<i64> {
    started_at.map(|start| (finished_at - start).max(0) / 1000)
}

/// Filters for job listing
#[derive(Debug, Clone)]
pub struct JobFilter {
    pub status: Option<JobStatus>,
    pub job_type: Option<JobType>,
    pub limit: u32,
    pub offset: u32,
}

impl Default for JobFilter {
    fn default() -> Self {
        Self {
            status: None,
            job_type: None,
            limit: 50,
            offset: 0,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    fn job_with(status: JobStatus, started_at: Option<i64>) -> Job {
        Job {
            id: 1,
            job_type: JobType::SyncModule,
            status,
            progress: 0,
            parameters: json!({"moduleId": 7, "githubRepo": "acme/widget"}),
            results: None,
            logs: vec![],
            started_by: None,
            created_at: 1_000,
            run_at: 1_000,
            started_at,
            completed_at: None,
            duration: None,
        }
    }

    #[test]
    fn test_legal_edges() {
        use JobStatus::*;
        for from in JobStatus::ALL {
            for to in JobStatus::ALL {
                let expected = matches!(
                    (from, to),
                    (Pending, Running)
                        | (Pending, Cancelled)
                        | (Running, Completed)
                        | (Running, Failed)
                        | (Running, Cancelled)
                );
                assert_eq!(
                    from.can_transition_to(to),
                    expected,
                    "{} -> {}",
                    from,
                    to
                );
            }
        }
    }

    #[test]
    fn test_completed_cannot_restart() {
        let job = job_with(JobStatus::Completed, Some(1_000));
        let err = JobPatch::running(&job, 5_000).unwrap_err();
        assert_eq!(
            err,
            DomainError::InvalidStateTransition {
                from: "completed".to_string(),
                to: "running".to_string()
            }
        );
    }

    #[test]
    fn test_complete_computes_duration() {
        let job = job_with(JobStatus::Running, Some(10_000));
        let patch = JobPatch::completed(&job, 72_500, None).unwrap();
        assert_eq!(patch.status, Some(JobStatus::Completed));
        assert_eq!(patch.completed_at, Some(72_500));
        assert_eq!(patch.duration, Some(62));
        assert_eq!(patch.progress, Some(100));
    }

    #[test]
    fn test_cancel_pending_has_no_duration() {
        let job = job_with(JobStatus::Pending, None);
        let patch = JobPatch::cancelled(&job, 9_000).unwrap();
        assert_eq!(patch.completed_at, Some(9_000));
        assert_eq!(patch.duration, None);
        assert_eq!(patch.started_at, None);
        assert_eq!(patch.expected_status, Some(JobStatus::Pending));
    }

    #[test]
    fn test_progress_patch_pins_no_status() {
        let patch = JobPatch::progress(150);
        assert_eq!(patch.progress, Some(100));
        assert_eq!(patch.status, None);
        assert_eq!(patch.expected_status, None);
    }

    #[test]
    fn test_fail_requires_running() {
        let job = job_with(JobStatus::Pending, None);
        assert!(JobPatch::failed(&job, 2_000, JobResults::failure("boom")).is_err());
    }

    #[test]
    fn test_job_type_round_trips_through_strings() {
        assert_eq!(JobType::from("sync-module"), JobType::SyncModule);
        assert_eq!(JobType::from("sync-batch"), JobType::SyncBatch);
        assert_eq!(
            JobType::from("email-test"),
            JobType::Other("email-test".to_string())
        );
        assert_eq!(JobType::SyncBatch.to_string(), "sync-batch");
    }

    #[test]
    fn test_sync_module_params_use_camel_case() {
        let job = job_with(JobStatus::Pending, None);
        let params = job.sync_module_params().unwrap();
        assert_eq!(params.module_id, 7);
        assert_eq!(params.github_repo, "acme/widget");
        assert_eq!(params.user_id, None);

        let value = serde_json::to_value(&params).unwrap();
        assert_eq!(value, json!({"moduleId": 7, "githubRepo": "acme/widget"}));
    }

    #[test]
    fn test_delayed_job_run_at() {
        let job = NewJob::new(JobType::SyncModule, json!({}), 1_000).delayed_by(2_500);
        assert_eq!(job.run_at, 3_500);
        let job = NewJob::new(JobType::SyncModule, json!({}), 1_000).delayed_by(-5);
        assert_eq!(job.run_at, 1_000);
    }
}
