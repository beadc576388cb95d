//! Configuration constants.
//!
//! This module defines the constants used throughout the application,
//! including timeouts, batch limits, lease lengths and status thresholds.

use std::time::Duration;

pub const DB_PATH: &str = "./link_sentinel.db";

/// Default User-Agent sent with every probe request.
pub const DEFAULT_USER_AGENT: &str = concat!("LinkSentinel/", env!("CARGO_PKG_VERSION"));

// HTTP status handling
/// Statuses at or above this value are "broken" rather than "redirect".
pub const BROKEN_STATUS_THRESHOLD: u16 = 400;
/// First-hop codes that mark a redirect as permanent.
pub const PERMANENT_REDIRECT_CODES: [u16; 2] = [301, 308];
/// Synthetic first-hop code reported when canonicalization changes a URL.
/// No HTTP request backs it; the resolution carries `Origin::Canonical`.
pub const CANONICAL_FIRST_HOP_CODE: u16 = 301;

// Redirect walking
/// Hop limit for internal links.
pub const INTERNAL_MAX_HOPS: usize = 3;
/// Upper bound for the external hop limit override.
pub const EXTERNAL_MAX_HOPS_CAP: usize = 3;
pub const DEFAULT_INTERNAL_TIMEOUT: Duration = Duration::from_millis(1500);
pub const DEFAULT_EXTERNAL_TIMEOUT: Duration = Duration::from_millis(2000);
pub const MIN_REQUEST_TIMEOUT: Duration = Duration::from_secs(1);
pub const DEFAULT_RESOLVE_CACHE_TTL: Duration = Duration::from_secs(24 * 60 * 60);

// Scan orchestration
pub const SCAN_LEASE_NAME: &str = "manual_scan";
pub const SCAN_LEASE_TTL: Duration = Duration::from_secs(15 * 60);
pub const DEFAULT_SCAN_BATCH_SIZE: usize = 25;
pub const MIN_SCAN_BATCH_SIZE: usize = 5;
pub const MAX_SCAN_BATCH_SIZE: usize = 100;
pub const DEFAULT_SCAN_PROGRESS_INTERVAL: usize = 10;
pub const DEFAULT_SCAN_MIN_BATCH: usize = 5;
pub const DEFAULT_SCAN_STEP_BUDGET: Duration = Duration::from_secs(10);
pub const MIN_SCAN_STEP_BUDGET: Duration = Duration::from_secs(3);

// Bulk resolution
pub const RESOLVE_ALL_LEASE_NAME: &str = "resolve_all";
pub const RESOLVE_ALL_LEASE_TTL: Duration = Duration::from_secs(3 * 60);
pub const DEFAULT_RESOLVE_ALL_BATCH_SIZE: usize = 8;
pub const MIN_RESOLVE_ALL_BATCH_SIZE: usize = 1;
pub const MAX_RESOLVE_ALL_BATCH_SIZE: usize = 50;
pub const DEFAULT_RESOLVE_ALL_DELAY: Duration = Duration::from_millis(600);
pub const MAX_RESOLVE_ALL_DELAY: Duration = Duration::from_millis(5000);
pub const DEFAULT_RESOLVE_ALL_STEP_BUDGET: Duration = Duration::from_secs(12);
pub const MIN_RESOLVE_ALL_STEP_BUDGET: Duration = Duration::from_secs(5);
/// Step time at or above this share of the budget halves the next batch.
pub const BATCH_SHRINK_RATIO: f64 = 0.9;
/// Step time at or below this share of the budget grows the next batch by one.
pub const BATCH_GROW_RATIO: f64 = 0.5;

// Session tokens
pub const SESSION_TOKEN_LENGTH: usize = 20;

// Link extraction
/// Path prefixes that never get scanned (login and admin screens).
pub const DEFAULT_RESERVED_PATH_PREFIXES: &[&str] = &["/wp-admin", "/wp-login"];
pub const DEFAULT_ELIGIBLE_TYPES: &[&str] = &["post", "page"];

// Ledger views
pub const ISSUES_PER_PAGE: u32 = 20;
pub const MAX_STATUS_MESSAGE_LENGTH: usize = 191;

// Reference document store
pub const DOCUMENT_CACHE_CAPACITY: usize = 256;
