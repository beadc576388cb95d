//! Named scan bookkeeping values (`last_started_ms`, `last_finished_ms`, ...).

use std::sync::Arc;

use sqlx::SqlitePool;

use crate::error_handling::DatabaseError;

pub const LAST_STARTED: &str = "scan_last_started_ms";
pub const LAST_FINISHED: &str = "scan_last_finished_ms";
pub const LAST_TYPE: &str = "scan_last_type";

pub struct OptionsStore {
    pool: Arc<SqlitePool>,
}

impl OptionsStore {
    pub fn new(pool: Arc<SqlitePool>) -> Self {
        Self { pool }
    }

    pub async fn get(&self, name: &str) -> Result<Option<String>, DatabaseError> {
        let value: Option<String> = sqlx::query_scalar("SELECT value FROM options WHERE name = ?")
            .bind(name)
            .fetch_optional(self.pool.as_ref())
            .await?;
        Ok(value)
    }

    pub async fn set(&self, name: &str, value: &str) -> Result<(), DatabaseError> {
        sqlx::query(
            "INSERT INTO options (name, value) VALUES (?, ?)
             ON CONFLICT(name) DO UPDATE SET value = excluded.value",
        )
        .bind(name)
        .bind(value)
        .execute(self.pool.as_ref())
        .await?;
        Ok(())
    }

    /// Reads a millisecond timestamp option; unparsable values read as absent.
    pub async fn get_ms(&self, name: &str) -> Result<Option<i64>, DatabaseError> {
        Ok(self.get(name).await?.and_then(|v| v.parse().ok()))
    }

    pub async fn set_ms(&self, name: &str, value: i64) -> Result<(), DatabaseError> {
        self.set(name, &value.to_string()).await
    }
}
