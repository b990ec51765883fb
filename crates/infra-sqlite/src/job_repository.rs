// SQLite JobRepository Implementation

use crate::error::{decode_json, map_sqlx_error};
use async_trait::async_trait;
use relsync_core::domain::{
    DomainError, Job, JobFilter, JobId, JobLogEntry, JobPatch, JobResults, JobStatus, JobType,
    ModuleId, NewJob,
};
use relsync_core::error::{AppError, Result};
use relsync_core::port::JobRepository;
use sqlx::SqlitePool;
use std::str::FromStr;

const UPDATE_COLUMNS: &str = r#"
    UPDATE jobs
    SET status = COALESCE(?, status),
        progress = COALESCE(?, progress),
        results = COALESCE(?, results),
        started_at = COALESCE(?, started_at),
        completed_at = COALESCE(?, completed_at),
        duration = COALESCE(?, duration)
    WHERE id = ?
"#;

pub struct SqliteJobRepository {
    pool: SqlitePool,
}

impl SqliteJobRepository {
    pub fn new(pool: SqlitePool) -> Self {
        Self { pool }
    }

    async fn current_status(&self, id: JobId) -> Result<Option<JobStatus>> {
        let status: Option<String> = sqlx::query_scalar("SELECT status FROM jobs WHERE id = ?")
            .bind(id)
            .fetch_optional(&self.pool)
            .await
            .map_err(map_sqlx_error)?;
        Ok(status.map(|s| JobStatus::from_str(&s)).transpose()?)
    }
}

#[async_trait]
impl JobRepository for SqliteJobRepository {
    async fn insert(&self, job: &NewJob) -> Result<Job> {
        let row = sqlx::query_as::<_, JobRow>(
            r#"
            INSERT INTO jobs (job_type, status, progress, parameters, logs, started_by, created_at, run_at)
            VALUES (?, 'pending', 0, ?, '[]', ?, ?, ?)
            RETURNING *
            "#,
        )
        .bind(job.job_type.as_str())
        .bind(job.parameters.to_string())
        .bind(&job.started_by)
        .bind(job.created_at)
        .bind(job.run_at)
        .fetch_one(&self.pool)
        .await
        .map_err(map_sqlx_error)?;

        row.into_job()
    }

    async fn find_by_id(&self, id: JobId) -> Result<Option<Job>> {
        let row = sqlx::query_as::<_, JobRow>("SELECT * FROM jobs WHERE id = ?")
            .bind(id)
            .fetch_optional(&self.pool)
            .await
            .map_err(map_sqlx_error)?;

        row.map(JobRow::into_job).transpose()
    }

    async fn update(&self, id: JobId, patch: &JobPatch) -> Result<Job> {
        let results = patch
            .results
            .as_ref()
            .map(serde_json::to_string)
            .transpose()?;

        // Status patches are a compare-and-swap on the status the patch was
        // built from, or on the status read here when it pins none
        let expected = match patch.status {
            Some(to) => {
                let from = match patch.expected_status {
                    Some(from) => from,
                    None => self
                        .current_status(id)
                        .await?
                        .ok_or_else(|| AppError::NotFound(format!("job {} not found", id)))?,
                };
                if !from.can_transition_to(to) {
                    return Err(invalid_transition(from, to));
                }
                Some(from)
            }
            None => None,
        };

        let sql = match expected {
            Some(_) => format!("{} AND status = ? RETURNING *", UPDATE_COLUMNS),
            None => format!("{} RETURNING *", UPDATE_COLUMNS),
        };
        let mut query = sqlx::query_as::<_, JobRow>(&sql)
            .bind(patch.status.map(|s| s.as_str()))
            .bind(patch.progress)
            .bind(results)
            .bind(patch.started_at)
            .bind(patch.completed_at)
            .bind(patch.duration)
            .bind(id);
        if let Some(from) = expected {
            query = query.bind(from.as_str());
        }

        let row = query
            .fetch_optional(&self.pool)
            .await
            .map_err(map_sqlx_error)?;

        match row {
            Some(row) => row.into_job(),
            None => match (self.current_status(id).await?, patch.status) {
                (None, _) => Err(AppError::NotFound(format!("job {} not found", id))),
                // Lost the race: report against the status that won
                (Some(now_status), Some(to)) if !now_status.can_transition_to(to) => {
                    Err(invalid_transition(now_status, to))
                }
                (Some(now_status), _) => Err(AppError::Conflict(format!(
                    "job {} changed concurrently (now {})",
                    id, now_status
                ))),
            },
        }
    }

    async fn append_log(&self, id: JobId, entry: &JobLogEntry) -> Result<()> {
        let result = sqlx::query(
            r#"
            UPDATE jobs
            SET logs = json_insert(logs, '$[#]', json(?))
            WHERE id = ?
            "#,
        )
        .bind(serde_json::to_string(entry)?)
        .bind(id)
        .execute(&self.pool)
        .await
        .map_err(map_sqlx_error)?;

        if result.rows_affected() == 0 {
            return Err(AppError::NotFound(format!("job {} not found", id)));
        }
        Ok(())
    }

    async fn list(&self, filter: &JobFilter) -> Result<Vec<Job>> {
        let status = filter.status.map(|s| s.as_str());
        let job_type = filter.job_type.as_ref().map(|t| t.as_str().to_string());

        let rows = sqlx::query_as::<_, JobRow>(
            r#"
            SELECT * FROM jobs
            WHERE (?1 IS NULL OR status = ?1)
              AND (?2 IS NULL OR job_type = ?2)
            ORDER BY created_at DESC, id DESC
            LIMIT ?3 OFFSET ?4
            "#,
        )
        .bind(status)
        .bind(job_type)
        .bind(i64::from(filter.limit))
        .bind(i64::from(filter.offset))
        .fetch_all(&self.pool)
        .await
        .map_err(map_sqlx_error)?;

        rows.into_iter().map(JobRow::into_job).collect()
    }

    async fn pop_next(&self, now_millis: i64) -> Result<Option<Job>> {
        // Single statement: the write lock makes select-and-claim atomic
        // across connections
        let row = sqlx::query_as::<_, JobRow>(
            r#"
            UPDATE jobs
            SET status = 'running', started_at = ?1, progress = 0
            WHERE id = (
                SELECT id FROM jobs
                WHERE status = 'pending' AND run_at <= ?1
                ORDER BY created_at ASC, id ASC
                LIMIT 1
            )
              AND status = 'pending'
            RETURNING *
            "#,
        )
        .bind(now_millis)
        .fetch_optional(&self.pool)
        .await
        .map_err(map_sqlx_error)?;

        row.map(JobRow::into_job).transpose()
    }

    async fn find_by_status(&self, status: JobStatus) -> Result<Vec<Job>> {
        let rows = sqlx::query_as::<_, JobRow>(
            "SELECT * FROM jobs WHERE status = ? ORDER BY created_at ASC, id ASC",
        )
        .bind(status.as_str())
        .fetch_all(&self.pool)
        .await
        .map_err(map_sqlx_error)?;

        rows.into_iter().map(JobRow::into_job).collect()
    }

    async fn count_by_status(&self, status: JobStatus) -> Result<i64> {
        let count: i64 = sqlx::query_scalar("SELECT COUNT(*) FROM jobs WHERE status = ?")
            .bind(status.as_str())
            .fetch_one(&self.pool)
            .await
            .map_err(map_sqlx_error)?;

        Ok(count)
    }

    async fn active_sync_module_ids(&self) -> Result<Vec<ModuleId>> {
        let ids: Vec<i64> = sqlx::query_scalar(
            r#"
            SELECT DISTINCT CAST(json_extract(parameters, '$.moduleId') AS INTEGER)
            FROM jobs
            WHERE job_type = ?
              AND status IN ('pending', 'running')
              AND json_extract(parameters, '$.moduleId') IS NOT NULL
            "#,
        )
        .bind(JobType::SyncModule.as_str())
        .fetch_all(&self.pool)
        .await
        .map_err(map_sqlx_error)?;

        Ok(ids)
    }
}

fn invalid_transition(from: JobStatus, to: JobStatus) -> AppError {
    AppError::Domain(DomainError::InvalidStateTransition {
        from: from.to_string(),
        to: to.to_string(),
    })
}

// Database row representation
#[derive(sqlx::FromRow)]
struct JobRow {
    id: i64,
    job_type: String,
    status: String,
    progress: i64,
    parameters: String,
    results: Option<String>,
    logs: String,
    started_by: Option<String>,
    created_at: i64,
    run_at: i64,
    started_at: Option<i64>,
    completed_at: Option<i64>,
    duration: Option<i64>,
}

impl JobRow {
    fn into_job(self) -> Result<Job> {
        let results: Option<JobResults> = self
            .results
            .as_deref()
            .map(|raw| decode_json("results", raw))
            .transpose()?;

        Ok(Job {
            id: self.id,
            job_type: JobType::from(self.job_type.as_str()),
            status: JobStatus::from_str(&self.status)?,
            progress: self.progress as i32,
            parameters: decode_json("parameters", &self.parameters)?,
            results,
            logs: decode_json("logs", &self.logs)?,
            started_by: self.started_by,
            created_at: self.created_at,
            run_at: self.run_at,
            started_at: self.started_at,
            completed_at: self.completed_at,
            duration: self.duration,
        })
    }
}
