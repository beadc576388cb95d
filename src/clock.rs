//! Wall-clock abstraction.
//!
//! Leases, cache TTLs, ledger timestamps and step budgets all read time through
//! the [`Clock`] trait so that tests can drive them deterministically.

use std::sync::atomic::{AtomicI64, Ordering};
use std::time::Duration;

/// Source of "now", in milliseconds since the Unix epoch.
pub trait Clock: Send + Sync {
    fn now_ms(&self) -> i64;

    /// Milliseconds elapsed since `start_ms`, never negative.
    fn elapsed_since(&self, start_ms: i64) -> Duration {
        Duration::from_millis(self.now_ms().saturating_sub(start_ms).max(0) as u64)
    }
}

/// Clock backed by the system time.
#[derive(Debug, Default, Clone, Copy)]
pub struct SystemClock;

impl Clock for SystemClock {
    fn now_ms(&self) -> i64 {
        chrono::Utc::now().timestamp_millis()
    }
}

/// Clock that only moves when told to.
#[derive(Debug, Default)]
pub struct ManualClock {
    now: AtomicI64,
}

impl ManualClock {
    pub fn new(start_ms: i64) -> Self {
        Self {
            now: AtomicI64::new(start_ms),
        }
    }

    pub fn advance(&self, by: Duration) {
        self.now.fetch_add(by.as_millis() as i64, Ordering::SeqCst);
    }

    pub fn set(&self, now_ms: i64) {
        self.now.store(now_ms, Ordering::SeqCst);
    }
}

impl Clock for ManualClock {
    fn now_ms(&self) -> i64 {
        self.now.load(Ordering::SeqCst)
    }
}
