//! Ledger record types.

use std::fmt;
use std::str::FromStr;

use serde::{Deserialize, Serialize};

use crate::config::BROKEN_STATUS_THRESHOLD;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum ResolutionStatus {
    Pending,
    Resolved,
}

impl ResolutionStatus {
    pub fn as_str(&self) -> &'static str {
        match self {
            ResolutionStatus::Pending => "pending",
            ResolutionStatus::Resolved => "resolved",
        }
    }
}

impl fmt::Display for ResolutionStatus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for ResolutionStatus {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "pending" => Ok(ResolutionStatus::Pending),
            "resolved" => Ok(ResolutionStatus::Resolved),
            other => Err(format!("unknown resolution status {other:?}")),
        }
    }
}

/// One link instance on one document.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct LinkIssue {
    pub id: i64,
    pub document_id: i64,
    pub original_url: String,
    pub url_fingerprint: String,
    pub final_url: String,
    pub http_status: Option<i64>,
    pub status_message: String,
    pub resolution_status: ResolutionStatus,
    pub scan_date_ms: i64,
    pub resolution_date_ms: Option<i64>,
    pub resolved_by: i64,
}

impl LinkIssue {
    /// Pending with an error status.
    pub fn is_broken(&self) -> bool {
        self.resolution_status == ResolutionStatus::Pending
            && self.http_status.unwrap_or(0) >= i64::from(BROKEN_STATUS_THRESHOLD)
    }
}

/// A finding to record.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct NewIssue {
    pub document_id: i64,
    pub original_url: String,
    pub final_url: String,
    pub http_status: i64,
    pub status_message: String,
    pub resolution_status: ResolutionStatus,
    pub resolved_by: i64,
}

/// How a pending entry gets closed.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Resolution {
    /// Replaces the stored final URL when set.
    pub final_url: Option<String>,
    /// Replaces the stored HTTP status when set.
    pub status_override: Option<i64>,
    pub message: String,
    pub actor_id: i64,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum ResolvedScope {
    #[default]
    All,
    /// Resolved at or after the last scan start.
    Current,
    /// Resolved before the last scan start, or with no resolution date.
    Previous,
}

/// Filter predicate for the paginated ledger views.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum IssueView {
    Resolved(ResolvedScope),
    /// Pending with status below 400 (or unknown).
    PendingRedirect,
    /// Pending with status 400 or above.
    Broken,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum SortOrder {
    Asc,
    #[default]
    Desc,
}

impl SortOrder {
    pub fn as_sql(&self) -> &'static str {
        match self {
            SortOrder::Asc => "ASC",
            SortOrder::Desc => "DESC",
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct Page<T> {
    pub items: Vec<T>,
    pub page: u32,
    pub per_page: u32,
    pub total_items: i64,
    pub total_pages: i64,
}

/// Lowercase hex MD5 of the URL string.
pub fn fingerprint(url: &str) -> String {
    format!("{:x}", md5::compute(url.as_bytes()))
}
