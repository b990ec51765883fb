// SQLite ReleaseRepository Implementation

use crate::error::{decode_json, map_sqlx_error};
use async_trait::async_trait;
use relsync_core::domain::{ModuleId, NewRelease, Release};
use relsync_core::error::{AppError, Result};
use relsync_core::port::ReleaseRepository;
use sqlx::SqlitePool;

pub struct SqliteReleaseRepository {
    pool: SqlitePool,
}

impl SqliteReleaseRepository {
    pub fn new(pool: SqlitePool) -> Self {
        Self { pool }
    }
}

#[async_trait]
impl ReleaseRepository for SqliteReleaseRepository {
    async fn exists(&self, module_id: ModuleId, version: &str) -> Result<bool> {
        let count: i64 =
            sqlx::query_scalar("SELECT COUNT(*) FROM releases WHERE module_id = ? AND version = ?")
                .bind(module_id)
                .bind(version)
                .fetch_one(&self.pool)
                .await
                .map_err(map_sqlx_error)?;

        Ok(count > 0)
    }

    async fn insert(&self, release: &NewRelease) -> Result<i64> {
        let id: i64 = sqlx::query_scalar(
            r#"
            INSERT INTO releases
                (module_id, external_id, version, changelog, assets, size, is_latest, published_at, created_at)
            VALUES (?, ?, ?, ?, ?, ?, 0, ?, ?)
            RETURNING id
            "#,
        )
        .bind(release.module_id)
        .bind(&release.external_id)
        .bind(&release.version)
        .bind(&release.changelog)
        .bind(serde_json::to_string(&release.assets)?)
        .bind(release.total_size())
        .bind(release.published_at)
        .bind(release.created_at)
        .fetch_one(&self.pool)
        .await
        .map_err(map_sqlx_error)?;

        Ok(id)
    }

    async fn mark_latest(&self, module_id: ModuleId, release_id: i64) -> Result<()> {
        // One statement flips the new latest on and every other release off
        let result = sqlx::query(
            "UPDATE releases SET is_latest = (id = ?) WHERE module_id = ?",
        )
        .bind(release_id)
        .bind(module_id)
        .execute(&self.pool)
        .await
        .map_err(map_sqlx_error)?;

        if result.rows_affected() == 0 {
            return Err(AppError::NotFound(format!(
                "module {} has no releases",
                module_id
            )));
        }
        Ok(())
    }

    async fn list_for_module(&self, module_id: ModuleId) -> Result<Vec<Release>> {
        let rows = sqlx::query_as::<_, ReleaseRow>(
            r#"
            SELECT * FROM releases
            WHERE module_id = ?
            ORDER BY published_at DESC, id DESC
            "#,
        )
        .bind(module_id)
        .fetch_all(&self.pool)
        .await
        .map_err(map_sqlx_error)?;

        rows.into_iter().map(ReleaseRow::into_release).collect()
    }
}

#[derive(sqlx::FromRow)]
struct ReleaseRow {
    id: i64,
    module_id: i64,
    external_id: String,
    version: String,
    changelog: String,
    assets: String,
    size: i64,
    is_latest: bool,
    published_at: i64,
    created_at: i64,
}

impl ReleaseRow {
    fn into_release(self) -> Result<Release> {
        Ok(Release {
            id: self.id,
            module_id: self.module_id,
            external_id: self.external_id,
            version: self.version,
            changelog: self.changelog,
            assets: decode_json("assets", &self.assets)?,
            size: self.size,
            is_latest: self.is_latest,
            published_at: self.published_at,
            created_at: self.created_at,
        })
    }
}
