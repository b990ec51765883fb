// SQLite ModuleSyncRepository Implementation

use crate::error::{decode_json, map_sqlx_error};
use async_trait::async_trait;
use relsync_core::domain::{ModuleId, ModuleSyncConfig, SyncErrorEntry};
use relsync_core::error::{AppError, Result};
use relsync_core::port::ModuleSyncRepository;
use sqlx::SqlitePool;

const SELECT_CONFIG: &str = r#"
    SELECT module_id, github_repo, enabled, last_sync_at, last_release_id, sync_errors, owner_token
    FROM module_sync_configs
"#;

pub struct SqliteModuleSyncRepository {
    pool: SqlitePool,
}

impl SqliteModuleSyncRepository {
    pub fn new(pool: SqlitePool) -> Self {
        Self { pool }
    }

    async fn fetch_all(&self, sql: &str) -> Result<Vec<ModuleSyncConfig>> {
        let rows = sqlx::query_as::<_, ModuleSyncRow>(sql)
            .fetch_all(&self.pool)
            .await
            .map_err(map_sqlx_error)?;
        rows.into_iter().map(ModuleSyncRow::into_config).collect()
    }
}

#[async_trait]
impl ModuleSyncRepository for SqliteModuleSyncRepository {
    async fn upsert(&self, config: &ModuleSyncConfig) -> Result<()> {
        // Sync state columns are only written on first insert
        sqlx::query(
            r#"
            INSERT INTO module_sync_configs
                (module_id, github_repo, enabled, last_sync_at, last_release_id, sync_errors, owner_token)
            VALUES (?, ?, ?, ?, ?, ?, ?)
            ON CONFLICT (module_id) DO UPDATE SET
                github_repo = excluded.github_repo,
                enabled = excluded.enabled,
                owner_token = excluded.owner_token
            "#,
        )
        .bind(config.module_id)
        .bind(&config.github_repo)
        .bind(config.enabled)
        .bind(config.last_sync_at)
        .bind(&config.last_release_id)
        .bind(serde_json::to_string(&config.sync_errors)?)
        .bind(&config.owner_token)
        .execute(&self.pool)
        .await
        .map_err(map_sqlx_error)?;

        Ok(())
    }

    async fn find(&self, module_id: ModuleId) -> Result<Option<ModuleSyncConfig>> {
        let row = sqlx::query_as::<_, ModuleSyncRow>(&format!("{} WHERE module_id = ?", SELECT_CONFIG))
            .bind(module_id)
            .fetch_optional(&self.pool)
            .await
            .map_err(map_sqlx_error)?;

        row.map(ModuleSyncRow::into_config).transpose()
    }

    async fn list(&self) -> Result<Vec<ModuleSyncConfig>> {
        self.fetch_all(&format!("{} ORDER BY module_id ASC", SELECT_CONFIG))
            .await
    }

    async fn list_enabled_by_staleness(&self) -> Result<Vec<ModuleSyncConfig>> {
        self.fetch_all(&format!(
            "{} WHERE enabled = 1 ORDER BY last_sync_at IS NOT NULL, last_sync_at ASC, module_id ASC",
            SELECT_CONFIG
        ))
        .await
    }

    async fn set_enabled(&self, module_id: ModuleId, enabled: bool) -> Result<bool> {
        let result = sqlx::query("UPDATE module_sync_configs SET enabled = ? WHERE module_id = ?")
            .bind(enabled)
            .bind(module_id)
            .execute(&self.pool)
            .await
            .map_err(map_sqlx_error)?;

        Ok(result.rows_affected() > 0)
    }

    async fn record_attempt(
        &self,
        module_id: ModuleId,
        last_sync_at: i64,
        cursor: Option<&str>,
        sync_errors: &[SyncErrorEntry],
    ) -> Result<()> {
        let result = sqlx::query(
            r#"
            UPDATE module_sync_configs
            SET last_sync_at = ?,
                last_release_id = COALESCE(?, last_release_id),
                sync_errors = ?
            WHERE module_id = ?
            "#,
        )
        .bind(last_sync_at)
        .bind(cursor)
        .bind(serde_json::to_string(sync_errors)?)
        .bind(module_id)
        .execute(&self.pool)
        .await
        .map_err(map_sqlx_error)?;

        if result.rows_affected() == 0 {
            return Err(AppError::NotFound(format!(
                "module {} has no sync config",
                module_id
            )));
        }
        Ok(())
    }
}

#[derive(sqlx::FromRow)]
struct ModuleSyncRow {
    module_id: i64,
    github_repo: String,
    enabled: bool,
    last_sync_at: Option<i64>,
    last_release_id: Option<String>,
    sync_errors: String,
    owner_token: Option<String>,
}

impl ModuleSyncRow {
    fn into_config(self) -> Result<ModuleSyncConfig> {
        Ok(ModuleSyncConfig {
            module_id: self.module_id,
            github_repo: self.github_repo,
            enabled: self.enabled,
            last_sync_at: self.last_sync_at,
            last_release_id: self.last_release_id,
            sync_errors: decode_json("sync_errors", &self.sync_errors)?,
            owner_token: self.owner_token,
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::{create_pool, run_migrations};

    async fn setup() -> SqliteModuleSyncRepository {
        let pool = create_pool("sqlite::memory:").await.unwrap();
        run_migrations(&pool).await.unwrap();
        SqliteModuleSyncRepository::new(pool)
    }

    #[tokio::test]
    async fn test_staleness_order_nulls_first_and_skips_disabled() {
        let repo = setup().await;
        for id in 1..=4 {
            repo.upsert(&ModuleSyncConfig::new(id, format!("acme/m{}", id)))
                .await
                .unwrap();
        }
        repo.record_attempt(1, 5_000, None, &[]).await.unwrap();
        repo.record_attempt(2, 1_000, None, &[]).await.unwrap();
        repo.set_enabled(4, false).await.unwrap();

        let order: Vec<i64> = repo
            .list_enabled_by_staleness()
            .await
            .unwrap()
            .into_iter()
            .map(|c| c.module_id)
            .collect();
        assert_eq!(order, vec![3, 2, 1]);
    }

    #[tokio::test]
    async fn test_upsert_preserves_sync_state() {
        let repo = setup().await;
        repo.upsert(&ModuleSyncConfig::new(1, "acme/widget")).await.unwrap();
        let errors = vec![SyncErrorEntry {
            error: "rate limited".to_string(),
            timestamp: 10,
            retry_count: 0,
        }];
        repo.record_attempt(1, 10, Some("42"), &errors).await.unwrap();

        let mut changed = ModuleSyncConfig::new(1, "acme/widget-ng");
        changed.owner_token = Some("tok".to_string());
        repo.upsert(&changed).await.unwrap();

        let stored = repo.find(1).await.unwrap().unwrap();
        assert_eq!(stored.github_repo, "acme/widget-ng");
        assert_eq!(stored.owner_token.as_deref(), Some("tok"));
        assert_eq!(stored.last_release_id.as_deref(), Some("42"));
        assert_eq!(stored.sync_errors, errors);
    }

    #[tokio::test]
    async fn test_record_attempt_without_cursor_keeps_cursor() {
        let repo = setup().await;
        repo.upsert(&ModuleSyncConfig::new(1, "acme/widget")).await.unwrap();
        repo.record_attempt(1, 10, Some("42"), &[]).await.unwrap();
        repo.record_attempt(1, 20, None, &[]).await.unwrap();

        let stored = repo.find(1).await.unwrap().unwrap();
        assert_eq!(stored.last_sync_at, Some(20));
        assert_eq!(stored.last_release_id.as_deref(), Some("42"));
    }

    #[tokio::test]
    async fn test_unknown_module() {
        let repo = setup().await;
        assert!(!repo.set_enabled(9, true).await.unwrap());
        assert!(matches!(
            repo.record_attempt(9, 0, None, &[]).await,
            Err(AppError::NotFound(_))
        ));
    }
}
