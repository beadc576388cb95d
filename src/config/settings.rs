//! Runtime settings.
//!
//! Settings are stored as flat key/value pairs (see [`keys`]) and parsed into a
//! typed [`Settings`] value with defaults and clamps applied. Unknown or
//! malformed values fall back to the default rather than failing the request.

use std::collections::HashMap;
use std::time::Duration;

use async_trait::async_trait;
use serde::Serialize;
use tokio::sync::RwLock;

use crate::config::constants::*;
use crate::error_handling::DatabaseError;

/// Setting keys understood by [`Settings::from_pairs`].
pub mod keys {
    pub const ELIGIBLE_TYPES: &str = "eligible_types";
    pub const AUTO_RESOLVE_PERMANENT: &str = "auto_resolve_permanent";
    pub const SCAN_BATCH_SIZE: &str = "scan_batch_size";
    pub const SCAN_PROGRESS_INTERVAL: &str = "scan_progress_interval";
    pub const SCAN_MIN_BATCH: &str = "scan_min_batch";
    pub const SCAN_STEP_BUDGET_SECS: &str = "scan_step_budget_secs";
    pub const FOLLOW_EXTERNAL_REDIRECTS: &str = "follow_external_redirects";
    pub const EXTERNAL_MAX_HOPS: &str = "external_max_hops";
    pub const INTERNAL_TIMEOUT_SECS: &str = "internal_timeout_secs";
    pub const EXTERNAL_TIMEOUT_SECS: &str = "external_timeout_secs";
    pub const RESOLVE_CACHE_TTL_SECS: &str = "resolve_cache_ttl_secs";
    pub const RESOLVE_ALL_BATCH_SIZE: &str = "resolve_all_batch_size";
    pub const RESOLVE_ALL_DELAY_MS: &str = "resolve_all_delay_ms";
    pub const RESOLVE_ALL_STEP_BUDGET_SECS: &str = "resolve_all_step_budget_secs";

    pub const ALL: &[&str] = &[
        ELIGIBLE_TYPES,
        AUTO_RESOLVE_PERMANENT,
        SCAN_BATCH_SIZE,
        SCAN_PROGRESS_INTERVAL,
        SCAN_MIN_BATCH,
        SCAN_STEP_BUDGET_SECS,
        FOLLOW_EXTERNAL_REDIRECTS,
        EXTERNAL_MAX_HOPS,
        INTERNAL_TIMEOUT_SECS,
        EXTERNAL_TIMEOUT_SECS,
        RESOLVE_CACHE_TTL_SECS,
        RESOLVE_ALL_BATCH_SIZE,
        RESOLVE_ALL_DELAY_MS,
        RESOLVE_ALL_STEP_BUDGET_SECS,
    ];
}

/// Flat key/value settings source.
#[async_trait]
pub trait SettingsStore: Send + Sync {
    async fn all(&self) -> Result<HashMap<String, String>, DatabaseError>;
    async fn set(&self, key: &str, value: &str) -> Result<(), DatabaseError>;
}

/// In-process settings store.
#[derive(Debug, Default)]
pub struct MemorySettings {
    values: RwLock<HashMap<String, String>>,
}

impl MemorySettings {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with_pairs<I, K, V>(pairs: I) -> Self
    where
        I: IntoIterator<Item = (K, V)>,
        K: Into<String>,
        V: Into<String>,
    {
        Self {
            values: RwLock::new(
                pairs
                    .into_iter()
                    .map(|(k, v)| (k.into(), v.into()))
                    .collect(),
            ),
        }
    }
}

#[async_trait]
impl SettingsStore for MemorySettings {
    async fn all(&self) -> Result<HashMap<String, String>, DatabaseError> {
        Ok(self.values.read().await.clone())
    }

    async fn set(&self, key: &str, value: &str) -> Result<(), DatabaseError> {
        self.values
            .write()
            .await
            .insert(key.to_string(), value.to_string());
        Ok(())
    }
}

/// Typed runtime settings with every clamp already applied.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct Settings {
    pub eligible_types: Vec<String>,
    pub auto_resolve_permanent: bool,
    pub scan_batch_size: usize,
    pub scan_progress_interval: usize,
    pub scan_min_batch: usize,
    pub scan_step_budget: Duration,
    pub follow_external_redirects: bool,
    pub external_max_hops: usize,
    pub internal_timeout: Duration,
    pub external_timeout: Duration,
    pub resolve_cache_ttl: Duration,
    pub resolve_all_batch_size: usize,
    pub resolve_all_delay: Duration,
    pub resolve_all_step_budget: Duration,
}

impl Default for Settings {
    fn default() -> Self {
        Self::from_pairs(&HashMap::new())
    }
}

impl Settings {
    /// Loads and parses settings from a store.
    pub async fn load(store: &dyn SettingsStore) -> Result<Self, DatabaseError> {
        Ok(Self::from_pairs(&store.all().await?))
    }

    pub fn from_pairs(pairs: &HashMap<String, String>) -> Self {
        let get = |key: &str| pairs.get(key).map(|v| v.trim()).filter(|v| !v.is_empty());

        let mut eligible_types: Vec<String> = Vec::new();
        if let Some(raw) = get(keys::ELIGIBLE_TYPES) {
            for t in raw.split(',') {
                let t = sanitize_key(t);
                if !t.is_empty() && !eligible_types.contains(&t) {
                    eligible_types.push(t);
                }
            }
        }
        if eligible_types.is_empty() {
            eligible_types = DEFAULT_ELIGIBLE_TYPES.iter().map(|s| s.to_string()).collect();
        }

        let scan_batch_size = parse_usize(get(keys::SCAN_BATCH_SIZE))
            .filter(|v| *v > 0)
            .unwrap_or(DEFAULT_SCAN_BATCH_SIZE)
            .clamp(MIN_SCAN_BATCH_SIZE, MAX_SCAN_BATCH_SIZE);
        let scan_progress_interval = parse_usize(get(keys::SCAN_PROGRESS_INTERVAL))
            .filter(|v| *v > 0)
            .unwrap_or(DEFAULT_SCAN_PROGRESS_INTERVAL)
            .clamp(1, scan_batch_size);
        let scan_min_batch = parse_usize(get(keys::SCAN_MIN_BATCH))
            .unwrap_or(DEFAULT_SCAN_MIN_BATCH)
            .clamp(1, scan_batch_size);
        let scan_step_budget = parse_secs(get(keys::SCAN_STEP_BUDGET_SECS))
            .unwrap_or(DEFAULT_SCAN_STEP_BUDGET)
            .max(MIN_SCAN_STEP_BUDGET);

        let external_max_hops = parse_usize(get(keys::EXTERNAL_MAX_HOPS))
            .unwrap_or(EXTERNAL_MAX_HOPS_CAP)
            .min(EXTERNAL_MAX_HOPS_CAP);
        let internal_timeout = parse_secs(get(keys::INTERNAL_TIMEOUT_SECS))
            .unwrap_or(DEFAULT_INTERNAL_TIMEOUT)
            .max(MIN_REQUEST_TIMEOUT);
        let external_timeout = parse_secs(get(keys::EXTERNAL_TIMEOUT_SECS))
            .unwrap_or(DEFAULT_EXTERNAL_TIMEOUT)
            .max(MIN_REQUEST_TIMEOUT);
        let resolve_cache_ttl = parse_secs(get(keys::RESOLVE_CACHE_TTL_SECS))
            .unwrap_or(DEFAULT_RESOLVE_CACHE_TTL);

        let resolve_all_batch_size = parse_usize(get(keys::RESOLVE_ALL_BATCH_SIZE))
            .filter(|v| *v > 0)
            .unwrap_or(DEFAULT_RESOLVE_ALL_BATCH_SIZE)
            .clamp(MIN_RESOLVE_ALL_BATCH_SIZE, MAX_RESOLVE_ALL_BATCH_SIZE);
        let resolve_all_delay = get(keys::RESOLVE_ALL_DELAY_MS)
            .and_then(|v| v.parse::<i64>().ok())
            .map(|ms| Duration::from_millis(ms.max(0) as u64))
            .unwrap_or(DEFAULT_RESOLVE_ALL_DELAY);
        let resolve_all_step_budget = parse_secs(get(keys::RESOLVE_ALL_STEP_BUDGET_SECS))
            .unwrap_or(DEFAULT_RESOLVE_ALL_STEP_BUDGET)
            .max(MIN_RESOLVE_ALL_STEP_BUDGET);

        Self {
            eligible_types,
            auto_resolve_permanent: parse_bool(get(keys::AUTO_RESOLVE_PERMANENT)),
            scan_batch_size,
            scan_progress_interval,
            scan_min_batch,
            scan_step_budget,
            follow_external_redirects: parse_bool(get(keys::FOLLOW_EXTERNAL_REDIRECTS)),
            external_max_hops,
            internal_timeout,
            external_timeout,
            resolve_cache_ttl,
            resolve_all_batch_size,
            resolve_all_delay,
            resolve_all_step_budget,
        }
    }
}

fn parse_bool(value: Option<&str>) -> bool {
    matches!(
        value.map(|v| v.to_ascii_lowercase()).as_deref(),
        Some("1" | "true" | "yes" | "on")
    )
}

fn parse_usize(value: Option<&str>) -> Option<usize> {
    value.and_then(|v| v.parse::<i64>().ok()).map(|v| v.max(0) as usize)
}

fn parse_secs(value: Option<&str>) -> Option<Duration> {
    value
        .and_then(|v| v.parse::<f64>().ok())
        .filter(|v| v.is_finite())
        .map(|v| Duration::from_secs_f64(v.max(0.0)))
}

/// Lowercases and keeps only `[a-z0-9_-]`.
fn sanitize_key(raw: &str) -> String {
    raw.trim()
        .to_ascii_lowercase()
        .chars()
        .filter(|c| c.is_ascii_alphanumeric() || *c == '_' || *c == '-')
        .collect()
}
