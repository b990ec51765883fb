// SQLite AdminActionLog Implementation (append-only)

use crate::error::{decode_json, map_sqlx_error};
use async_trait::async_trait;
use relsync_core::domain::{AdminAction, NewAdminAction};
use relsync_core::error::Result;
use relsync_core::port::{AdminActionLog, TimeProvider};
use sqlx::SqlitePool;
use std::sync::Arc;

pub struct SqliteAdminActionLog {
    pool: SqlitePool,
    time_provider: Arc<dyn TimeProvider>,
}

impl SqliteAdminActionLog {
    pub fn new(pool: SqlitePool, time_provider: Arc<dyn TimeProvider>) -> Self {
        Self {
            pool,
            time_provider,
        }
    }
}

#[async_trait]
impl AdminActionLog for SqliteAdminActionLog {
    async fn record(&self, action: &NewAdminAction) -> Result<()> {
        sqlx::query(
            r#"
            INSERT INTO admin_actions
                (admin_id, action, details, target_type, target_id, old_values, new_values, created_at)
            VALUES (?, ?, ?, ?, ?, ?, ?, ?)
            "#,
        )
        .bind(&action.admin_id)
        .bind(action.action.as_str())
        .bind(&action.details)
        .bind(&action.target_type)
        .bind(&action.target_id)
        .bind(action.old_values.as_ref().map(|v| v.to_string()))
        .bind(action.new_values.as_ref().map(|v| v.to_string()))
        .bind(self.time_provider.now_millis())
        .execute(&self.pool)
        .await
        .map_err(map_sqlx_error)?;

        Ok(())
    }

    async fn recent(&self, limit: u32) -> Result<Vec<AdminAction>> {
        let rows = sqlx::query_as::<_, AdminActionRow>(
            "SELECT * FROM admin_actions ORDER BY created_at DESC, id DESC LIMIT ?",
        )
        .bind(i64::from(limit))
        .fetch_all(&self.pool)
        .await
        .map_err(map_sqlx_error)?;

        rows.into_iter().map(AdminActionRow::into_action).collect()
    }
}

#[derive(sqlx::FromRow)]
struct AdminActionRow {
    id: i64,
    admin_id: String,
    action: String,
    details: String,
    target_type: String,
    target_id: String,
    old_values: Option<String>,
    new_values: Option<String>,
    created_at: i64,
}

impl AdminActionRow {
    fn into_action(self) -> Result<AdminAction> {
        Ok(AdminAction {
            id: self.id,
            admin_id: self.admin_id,
            action: self.action,
            details: self.details,
            target_type: self.target_type,
            target_id: self.target_id,
            old_values: self
                .old_values
                .as_deref()
                .map(|raw| decode_json("old_values", raw))
                .transpose()?,
            new_values: self
                .new_values
                .as_deref()
                .map(|raw| decode_json("new_values", raw))
                .transpose()?,
            created_at: self.created_at,
        })
    }
}
