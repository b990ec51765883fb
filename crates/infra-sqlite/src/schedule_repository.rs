// SQLite ScheduleRepository Implementation (singleton row id = 1)

use crate::error::map_sqlx_error;
use async_trait::async_trait;
use relsync_core::domain::ReleaseSchedule;
use relsync_core::error::{AppError, Result};
use relsync_core::port::ScheduleRepository;
use sqlx::SqlitePool;

pub struct SqliteScheduleRepository {
    pool: SqlitePool,
}

impl SqliteScheduleRepository {
    pub fn new(pool: SqlitePool) -> Self {
        Self { pool }
    }
}

#[async_trait]
impl ScheduleRepository for SqliteScheduleRepository {
    async fn load(&self, now_millis: i64) -> Result<ReleaseSchedule> {
        let initial = ReleaseSchedule::initial(now_millis);
        sqlx::query(
            r#"
            INSERT OR IGNORE INTO release_schedule
                (id, enabled, interval_hours, batch_size, next_run_at, last_run_at)
            VALUES (1, ?, ?, ?, ?, ?)
            "#,
        )
        .bind(initial.enabled)
        .bind(i64::from(initial.interval_hours))
        .bind(i64::from(initial.batch_size))
        .bind(initial.next_run_at)
        .bind(initial.last_run_at)
        .execute(&self.pool)
        .await
        .map_err(map_sqlx_error)?;

        let row = sqlx::query_as::<_, ScheduleRow>(
            "SELECT enabled, interval_hours, batch_size, next_run_at, last_run_at FROM release_schedule WHERE id = 1",
        )
        .fetch_one(&self.pool)
        .await
        .map_err(map_sqlx_error)?;

        Ok(row.into())
    }

    async fn save(&self, schedule: &ReleaseSchedule) -> Result<()> {
        schedule.validate()?;
        sqlx::query(
            r#"
            INSERT INTO release_schedule
                (id, enabled, interval_hours, batch_size, next_run_at, last_run_at)
            VALUES (1, ?, ?, ?, ?, ?)
            ON CONFLICT (id) DO UPDATE SET
                enabled = excluded.enabled,
                interval_hours = excluded.interval_hours,
                batch_size = excluded.batch_size,
                next_run_at = excluded.next_run_at
            "#,
        )
        .bind(schedule.enabled)
        .bind(i64::from(schedule.interval_hours))
        .bind(i64::from(schedule.batch_size))
        .bind(schedule.next_run_at)
        .bind(schedule.last_run_at)
        .execute(&self.pool)
        .await
        .map_err(map_sqlx_error)?;

        Ok(())
    }

    async fn record_run(&self, last_run_at: i64, next_run_at: i64) -> Result<()> {
        let result = sqlx::query(
            "UPDATE release_schedule SET last_run_at = ?, next_run_at = ? WHERE id = 1",
        )
        .bind(last_run_at)
        .bind(next_run_at)
        .execute(&self.pool)
        .await
        .map_err(map_sqlx_error)?;

        if result.rows_affected() == 0 {
            return Err(AppError::NotFound("release schedule has not been created".to_string()));
        }
        Ok(())
    }
}

#[derive(sqlx::FromRow)]
struct ScheduleRow {
    enabled: bool,
    interval_hours: i64,
    batch_size: i64,
    next_run_at: i64,
    last_run_at: Option<i64>,
}

impl From<ScheduleRow> for ReleaseSchedule {
    fn from(row: ScheduleRow) -> Self {
        Self {
            enabled: row.enabled,
            interval_hours: row.interval_hours as u32,
            batch_size: row.batch_size as u32,
            next_run_at: row.next_run_at,
            last_run_at: row.last_run_at,
        }
    }
}
