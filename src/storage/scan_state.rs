//! Persisted scan session record.

use std::sync::Arc;

use serde::Serialize;
use sqlx::{Row, SqlitePool};

use crate::config::{
    DEFAULT_SCAN_BATCH_SIZE, DEFAULT_SCAN_PROGRESS_INTERVAL, MAX_SCAN_BATCH_SIZE,
    MIN_SCAN_BATCH_SIZE,
};
use crate::error_handling::DatabaseError;

/// The singleton scan session.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct ScanState {
    pub active: bool,
    pub total: i64,
    pub processed: i64,
    /// Last document ID processed, ascending.
    pub cursor_id: i64,
    pub batch_size: usize,
    pub progress_interval: usize,
    pub token: String,
    pub started_at_ms: Option<i64>,
}

impl Default for ScanState {
    fn default() -> Self {
        Self {
            active: false,
            total: 0,
            processed: 0,
            cursor_id: 0,
            batch_size: DEFAULT_SCAN_BATCH_SIZE,
            progress_interval: DEFAULT_SCAN_PROGRESS_INTERVAL,
            token: String::new(),
            started_at_ms: None,
        }
    }
}

impl ScanState {
    /// Re-applies the batch and interval bounds to values read back from storage.
    fn normalized(mut self) -> Self {
        if self.batch_size == 0 {
            self.batch_size = DEFAULT_SCAN_BATCH_SIZE;
        }
        self.batch_size = self.batch_size.clamp(MIN_SCAN_BATCH_SIZE, MAX_SCAN_BATCH_SIZE);
        if self.progress_interval == 0 {
            self.progress_interval = DEFAULT_SCAN_PROGRESS_INTERVAL;
        }
        self.progress_interval = self.progress_interval.clamp(1, self.batch_size);
        self
    }
}

pub struct ScanStateStore {
    pool: Arc<SqlitePool>,
}

impl ScanStateStore {
    pub fn new(pool: Arc<SqlitePool>) -> Self {
        Self { pool }
    }

    pub async fn load(&self) -> Result<ScanState, DatabaseError> {
        let row = sqlx::query(
            "SELECT active, total, processed, cursor_id, batch_size, progress_interval, token, started_at_ms
             FROM scan_state WHERE id = 1",
        )
        .fetch_optional(self.pool.as_ref())
        .await?;

        let Some(row) = row else {
            return Ok(ScanState::default());
        };

        let state = ScanState {
            active: row.get::<i64, _>("active") != 0,
            total: row.get("total"),
            processed: row.get("processed"),
            cursor_id: row.get("cursor_id"),
            batch_size: row.get::<i64, _>("batch_size").max(0) as usize,
            progress_interval: row.get::<i64, _>("progress_interval").max(0) as usize,
            token: row.get("token"),
            started_at_ms: row.get("started_at_ms"),
        };
        Ok(state.normalized())
    }

    pub async fn save(&self, state: &ScanState) -> Result<(), DatabaseError> {
        sqlx::query(
            "INSERT INTO scan_state (id, active, total, processed, cursor_id, batch_size, progress_interval, token, started_at_ms)
             VALUES (1, ?, ?, ?, ?, ?, ?, ?, ?)
             ON CONFLICT(id) DO UPDATE SET
                active = excluded.active,
                total = excluded.total,
                processed = excluded.processed,
                cursor_id = excluded.cursor_id,
                batch_size = excluded.batch_size,
                progress_interval = excluded.progress_interval,
                token = excluded.token,
                started_at_ms = excluded.started_at_ms",
        )
        .bind(state.active as i64)
        .bind(state.total)
        .bind(state.processed)
        .bind(state.cursor_id)
        .bind(state.batch_size as i64)
        .bind(state.progress_interval as i64)
        .bind(&state.token)
        .bind(state.started_at_ms)
        .execute(self.pool.as_ref())
        .await?;
        Ok(())
    }

    /// Persists mid-step progress without touching the rest of the session.
    pub async fn save_progress(&self, processed: i64, cursor_id: i64) -> Result<(), DatabaseError> {
        sqlx::query("UPDATE scan_state SET processed = ?, cursor_id = ? WHERE id = 1")
            .bind(processed)
            .bind(cursor_id)
            .execute(self.pool.as_ref())
            .await?;
        Ok(())
    }

    pub async fn set_total(&self, total: i64) -> Result<(), DatabaseError> {
        sqlx::query("UPDATE scan_state SET total = ? WHERE id = 1")
            .bind(total)
            .execute(self.pool.as_ref())
            .await?;
        Ok(())
    }

    /// Back to an inactive, zeroed session.
    pub async fn reset(&self) -> Result<(), DatabaseError> {
        self.save(&ScanState::default()).await
    }

    /// Marks the session finished: inactive, `processed` pinned to `total`,
    /// cursor and token cleared.
    pub async fn complete(&self, total: i64) -> Result<(), DatabaseError> {
        sqlx::query(
            "UPDATE scan_state SET active = 0, processed = ?, cursor_id = 0, token = '' WHERE id = 1",
        )
        .bind(total.max(0))
        .execute(self.pool.as_ref())
        .await?;
        Ok(())
    }
}
