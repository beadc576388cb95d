//! Scan statistics tracking.
//!
//! Thread-safe counters for what happened to each link a scan step looked at,
//! plus upstream failure kinds.

use std::collections::HashMap;
use std::sync::atomic::{AtomicUsize, Ordering};

use strum::IntoEnumIterator;
use strum_macros::EnumIter as EnumIterMacro;

use super::types::UpstreamKind;

/// What the scan did with one candidate link.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, EnumIterMacro)]
pub enum LinkOutcome {
    /// Resolved to itself with a non-error status.
    Healthy,
    /// Permanent redirect rewritten in place.
    AutoFixed,
    /// Internal link rewritten to its canonical URL.
    Canonicalized,
    /// Redirect logged for review.
    PendingRedirect,
    /// Logged as broken (status >= 400).
    Broken,
    /// An unresolved entry for this URL already existed.
    Duplicate,
    /// External link skipped because following is disabled.
    ExternalSkipped,
    /// Probe failed without a status.
    ResolveFailed,
}

/// Thread-safe scan statistics.
///
/// Every variant is initialized to zero on creation; share via `Arc`.
pub struct ScanStats {
    outcomes: HashMap<LinkOutcome, AtomicUsize>,
    upstream: HashMap<UpstreamKind, AtomicUsize>,
}

impl ScanStats {
    pub fn new() -> Self {
        let mut outcomes = HashMap::new();
        for outcome in LinkOutcome::iter() {
            outcomes.insert(outcome, AtomicUsize::new(0));
        }

        let mut upstream = HashMap::new();
        for kind in UpstreamKind::iter() {
            upstream.insert(kind, AtomicUsize::new(0));
        }

        ScanStats { outcomes, upstream }
    }

    pub fn increment(&self, outcome: LinkOutcome) {
        if let Some(counter) = self.outcomes.get(&outcome) {
            counter.fetch_add(1, Ordering::Relaxed);
        } else {
            log::error!(
                "Attempted to increment outcome counter for {:?} which is not in the map.",
                outcome
            );
        }
    }

    pub fn increment_upstream(&self, kind: UpstreamKind) {
        if let Some(counter) = self.upstream.get(&kind) {
            counter.fetch_add(1, Ordering::Relaxed);
        }
    }

    pub fn count(&self, outcome: LinkOutcome) -> usize {
        self.outcomes
            .get(&outcome)
            .map(|c| c.load(Ordering::SeqCst))
            .unwrap_or(0)
    }

    pub fn upstream_count(&self, kind: UpstreamKind) -> usize {
        self.upstream
            .get(&kind)
            .map(|c| c.load(Ordering::SeqCst))
            .unwrap_or(0)
    }

    pub fn total(&self) -> usize {
        self.outcomes
            .values()
            .map(|c| c.load(Ordering::SeqCst))
            .sum()
    }

    /// One-line summary of the non-zero counters, for step logs.
    pub fn summary(&self) -> String {
        let parts: Vec<String> = LinkOutcome::iter()
            .filter_map(|outcome| {
                let n = self.count(outcome);
                (n > 0).then(|| format!("{outcome:?}={n}"))
            })
            .collect();
        if parts.is_empty() {
            "no links".to_string()
        } else {
            parts.join(", ")
        }
    }
}

impl Default for ScanStats {
    fn default() -> Self {
        Self::new()
    }
}
