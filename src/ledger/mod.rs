//! Issue ledger.
//!
//! Durable log of link findings. At most one pending and one resolved entry
//! exist per (document, URL fingerprint); the unique index enforces it and
//! inserts that would violate it are silently dropped.

mod models;

use std::sync::Arc;

use sqlx::sqlite::SqliteRow;
use sqlx::{Row, SqlitePool};

use crate::clock::Clock;
use crate::config::{BROKEN_STATUS_THRESHOLD, ISSUES_PER_PAGE, MAX_STATUS_MESSAGE_LENGTH};
use crate::error_handling::DatabaseError;

pub use models::{
    fingerprint, IssueView, LinkIssue, NewIssue, Page, Resolution, ResolutionStatus,
    ResolvedScope, SortOrder,
};

const ISSUE_COLUMNS: &str = "id, document_id, original_url, url_fingerprint, final_url, http_status, \
     status_message, resolution_status, scan_date_ms, resolution_date_ms, resolved_by";

/// Predicate for pending entries that carry a known fix.
const RESOLVABLE_PREDICATE: &str =
    "resolution_status = 'pending' AND final_url <> '' AND (http_status < ? OR http_status IS NULL)";

fn truncate_message(message: &str) -> String {
    message.chars().take(MAX_STATUS_MESSAGE_LENGTH).collect()
}

fn row_to_issue(row: &SqliteRow) -> Result<LinkIssue, DatabaseError> {
    let status: String = row.get("resolution_status");
    Ok(LinkIssue {
        id: row.get("id"),
        document_id: row.get("document_id"),
        original_url: row.get("original_url"),
        url_fingerprint: row.get("url_fingerprint"),
        final_url: row.get("final_url"),
        http_status: row.get("http_status"),
        status_message: row.get("status_message"),
        resolution_status: status.parse().map_err(DatabaseError::Corrupt)?,
        scan_date_ms: row.get("scan_date_ms"),
        resolution_date_ms: row.get("resolution_date_ms"),
        resolved_by: row.get("resolved_by"),
    })
}

pub struct Ledger {
    pool: Arc<SqlitePool>,
    clock: Arc<dyn Clock>,
}

impl Ledger {
    pub fn new(pool: Arc<SqlitePool>, clock: Arc<dyn Clock>) -> Self {
        Self { pool, clock }
    }

    /// Inserts `issue` unless an entry with the same document, fingerprint
    /// and status exists. Returns whether a row was written.
    pub async fn record_issue(&self, issue: &NewIssue) -> Result<bool, DatabaseError> {
        let now = self.clock.now_ms();
        let resolution_date = (issue.resolution_status == ResolutionStatus::Resolved).then_some(now);
        let result = sqlx::query(
            "INSERT INTO link_issues (
                document_id, original_url, url_fingerprint, final_url, http_status,
                status_message, resolution_status, scan_date_ms, resolution_date_ms, resolved_by
            ) VALUES (?, ?, ?, ?, ?, ?, ?, ?, ?, ?)
            ON CONFLICT(document_id, url_fingerprint, resolution_status) DO NOTHING",
        )
        .bind(issue.document_id)
        .bind(&issue.original_url)
        .bind(fingerprint(&issue.original_url))
        .bind(&issue.final_url)
        .bind(issue.http_status)
        .bind(truncate_message(&issue.status_message))
        .bind(issue.resolution_status.as_str())
        .bind(now)
        .bind(resolution_date)
        .bind(issue.resolved_by)
        .execute(self.pool.as_ref())
        .await?;
        Ok(result.rows_affected() > 0)
    }

    pub async fn get(&self, id: i64) -> Result<Option<LinkIssue>, DatabaseError> {
        let row = sqlx::query(&format!("SELECT {ISSUE_COLUMNS} FROM link_issues WHERE id = ?"))
            .bind(id)
            .fetch_optional(self.pool.as_ref())
            .await?;
        row.as_ref().map(row_to_issue).transpose()
    }

    pub async fn find_pending(&self, id: i64) -> Result<Option<LinkIssue>, DatabaseError> {
        Ok(self
            .get(id)
            .await?
            .filter(|issue| issue.resolution_status == ResolutionStatus::Pending))
    }

    /// Pending entry with status >= 400.
    pub async fn find_broken(&self, id: i64) -> Result<Option<LinkIssue>, DatabaseError> {
        Ok(self.get(id).await?.filter(LinkIssue::is_broken))
    }

    /// Flips a pending entry to resolved. Returns false when `id` is not pending.
    ///
    /// A previously resolved entry for the same document and link is replaced,
    /// keeping a single resolved row per pair.
    pub async fn mark_resolved(
        &self,
        id: i64,
        resolution: &Resolution,
    ) -> Result<bool, DatabaseError> {
        let now = self.clock.now_ms();
        let mut tx = self.pool.begin().await?;

        let key: Option<(i64, String)> = sqlx::query_as(
            "SELECT document_id, url_fingerprint FROM link_issues WHERE id = ? AND resolution_status = 'pending'",
        )
        .bind(id)
        .fetch_optional(&mut *tx)
        .await?;
        let Some((document_id, url_fingerprint)) = key else {
            return Ok(false);
        };

        // One resolved row per link: the newer resolution replaces the older one.
        sqlx::query(
            "DELETE FROM link_issues
             WHERE document_id = ? AND url_fingerprint = ? AND resolution_status = 'resolved'",
        )
        .bind(document_id)
        .bind(&url_fingerprint)
        .execute(&mut *tx)
        .await?;

        sqlx::query(
            "UPDATE link_issues SET
                resolution_status = 'resolved',
                resolution_date_ms = ?,
                final_url = COALESCE(?, final_url),
                http_status = COALESCE(?, http_status),
                status_message = ?,
                resolved_by = ?
             WHERE id = ?",
        )
        .bind(now)
        .bind(resolution.final_url.as_deref())
        .bind(resolution.status_override)
        .bind(truncate_message(&resolution.message))
        .bind(resolution.actor_id)
        .bind(id)
        .execute(&mut *tx)
        .await?;

        tx.commit().await?;
        Ok(true)
    }

    /// Keeps an entry pending with a new candidate URL and first-hop status.
    pub async fn flag_pending_redirect(
        &self,
        id: i64,
        final_url: &str,
        first_hop: i64,
        message: &str,
    ) -> Result<bool, DatabaseError> {
        let result = sqlx::query(
            "UPDATE link_issues SET
                final_url = ?,
                http_status = ?,
                resolution_status = 'pending',
                status_message = ?,
                resolution_date_ms = NULL,
                resolved_by = 0
             WHERE id = ? AND resolution_status = 'pending'",
        )
        .bind(final_url)
        .bind(first_hop)
        .bind(truncate_message(message))
        .bind(id)
        .execute(self.pool.as_ref())
        .await?;
        Ok(result.rows_affected() > 0)
    }

    /// Pending entries below 400 (redirects) or at/above it (broken).
    pub async fn count_pending(&self, status_below_400: bool) -> Result<i64, DatabaseError> {
        let sql = if status_below_400 {
            "SELECT COUNT(id) FROM link_issues WHERE resolution_status = 'pending' AND (http_status < ? OR http_status IS NULL)"
        } else {
            "SELECT COUNT(id) FROM link_issues WHERE resolution_status = 'pending' AND http_status >= ?"
        };
        let count: i64 = sqlx::query_scalar(sql)
            .bind(i64::from(BROKEN_STATUS_THRESHOLD))
            .fetch_one(self.pool.as_ref())
            .await?;
        Ok(count)
    }

    /// Pending redirects with a known final URL.
    pub async fn count_resolvable(&self) -> Result<i64, DatabaseError> {
        let count: i64 = sqlx::query_scalar(&format!(
            "SELECT COUNT(id) FROM link_issues WHERE {RESOLVABLE_PREDICATE}"
        ))
        .bind(i64::from(BROKEN_STATUS_THRESHOLD))
        .fetch_one(self.pool.as_ref())
        .await?;
        Ok(count)
    }

    /// Up to `limit` resolvable entries with `id > cursor`, ascending.
    pub async fn resolvable_after(
        &self,
        cursor: i64,
        limit: usize,
    ) -> Result<Vec<LinkIssue>, DatabaseError> {
        let rows = sqlx::query(&format!(
            "SELECT {ISSUE_COLUMNS} FROM link_issues WHERE {RESOLVABLE_PREDICATE} AND id > ? ORDER BY id ASC LIMIT ?"
        ))
        .bind(i64::from(BROKEN_STATUS_THRESHOLD))
        .bind(cursor)
        .bind(limit as i64)
        .fetch_all(self.pool.as_ref())
        .await?;
        rows.iter().map(row_to_issue).collect()
    }

    /// One page of a ledger view. `last_started_ms` anchors the resolved scopes;
    /// without it every scope reads as `All`.
    pub async fn page(
        &self,
        view: IssueView,
        page: u32,
        order: SortOrder,
        last_started_ms: Option<i64>,
    ) -> Result<Page<LinkIssue>, DatabaseError> {
        let threshold = i64::from(BROKEN_STATUS_THRESHOLD);
        let (predicate, order_column, bind): (&str, &str, Option<i64>) = match view {
            IssueView::Resolved(scope) => {
                let base = "resolution_status = 'resolved'";
                match (scope, last_started_ms) {
                    (ResolvedScope::Current, Some(ts)) => (
                        "resolution_status = 'resolved' AND resolution_date_ms IS NOT NULL AND resolution_date_ms >= ?",
                        "resolution_date_ms",
                        Some(ts),
                    ),
                    (ResolvedScope::Previous, Some(ts)) => (
                        "resolution_status = 'resolved' AND (resolution_date_ms IS NULL OR resolution_date_ms < ?)",
                        "resolution_date_ms",
                        Some(ts),
                    ),
                    _ => (base, "resolution_date_ms", None),
                }
            }
            IssueView::PendingRedirect => (
                "resolution_status = 'pending' AND (http_status < ? OR http_status IS NULL)",
                "scan_date_ms",
                Some(threshold),
            ),
            IssueView::Broken => (
                "resolution_status = 'pending' AND http_status >= ?",
                "scan_date_ms",
                Some(threshold),
            ),
        };

        let page = page.max(1);
        let offset = i64::from(page - 1) * i64::from(ISSUES_PER_PAGE);

        let count_sql = format!("SELECT COUNT(id) FROM link_issues WHERE {predicate}");
        let mut count_query = sqlx::query_scalar::<_, i64>(&count_sql);
        if let Some(value) = bind {
            count_query = count_query.bind(value);
        }
        let total_items = count_query.fetch_one(self.pool.as_ref()).await?;

        let dir = order.as_sql();
        let sql = format!(
            "SELECT {ISSUE_COLUMNS} FROM link_issues WHERE {predicate} ORDER BY {order_column} {dir}, id {dir} LIMIT ? OFFSET ?"
        );
        let mut query = sqlx::query(&sql);
        if let Some(value) = bind {
            query = query.bind(value);
        }
        let rows = query
            .bind(i64::from(ISSUES_PER_PAGE))
            .bind(offset)
            .fetch_all(self.pool.as_ref())
            .await?;
        let items = rows.iter().map(row_to_issue).collect::<Result<Vec<_>, _>>()?;

        let per_page = i64::from(ISSUES_PER_PAGE);
        Ok(Page {
            items,
            page,
            per_page: ISSUES_PER_PAGE,
            total_items,
            total_pages: (total_items + per_page - 1) / per_page,
        })
    }

    pub async fn page_resolved(
        &self,
        scope: ResolvedScope,
        page: u32,
        order: SortOrder,
        last_started_ms: Option<i64>,
    ) -> Result<Page<LinkIssue>, DatabaseError> {
        self.page(IssueView::Resolved(scope), page, order, last_started_ms)
            .await
    }

    /// Pending entries split on the 400 threshold: `broken` selects >= 400.
    pub async fn page_unresolved(
        &self,
        broken: bool,
        page: u32,
        order: SortOrder,
    ) -> Result<Page<LinkIssue>, DatabaseError> {
        let view = if broken {
            IssueView::Broken
        } else {
            IssueView::PendingRedirect
        };
        self.page(view, page, order, None).await
    }

    /// Deletes every resolved entry. Returns the number removed.
    pub async fn clear_resolved(&self) -> Result<u64, DatabaseError> {
        let result = sqlx::query("DELETE FROM link_issues WHERE resolution_status = 'resolved'")
            .execute(self.pool.as_ref())
            .await?;
        Ok(result.rows_affected())
    }
}
