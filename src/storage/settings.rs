//! SQLite-backed settings store.

use std::collections::HashMap;
use std::sync::Arc;

use async_trait::async_trait;
use sqlx::{Row, SqlitePool};

use crate::config::SettingsStore;
use crate::error_handling::DatabaseError;

pub struct SqliteSettings {
    pool: Arc<SqlitePool>,
}

impl SqliteSettings {
    pub fn new(pool: Arc<SqlitePool>) -> Self {
        Self { pool }
    }
}

#[async_trait]
impl SettingsStore for SqliteSettings {
    async fn all(&self) -> Result<HashMap<String, String>, DatabaseError> {
        let rows = sqlx::query("SELECT key, value FROM settings")
            .fetch_all(self.pool.as_ref())
            .await?;
        Ok(rows
            .into_iter()
            .map(|row| (row.get("key"), row.get("value")))
            .collect())
    }

    async fn set(&self, key: &str, value: &str) -> Result<(), DatabaseError> {
        sqlx::query(
            "INSERT INTO settings (key, value) VALUES (?, ?)
             ON CONFLICT(key) DO UPDATE SET value = excluded.value",
        )
        .bind(key)
        .bind(value)
        .execute(self.pool.as_ref())
        .await?;
        Ok(())
    }
}
