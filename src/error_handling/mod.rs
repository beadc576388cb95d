//! Error handling and scan statistics.
//!
//! This module provides:
//! - Error type definitions for start-up, persistence, resolution and the
//!   public operations
//! - Categorization of `reqwest` failures
//! - Per-step link outcome statistics

mod categorization;
mod stats;
mod types;

// Re-export public API
pub use categorization::categorize_reqwest_error;
pub use stats::{LinkOutcome, ScanStats};
pub use types::{
    DatabaseError, InitializationError, ResolveError, ServiceError, StoreError, UpstreamKind,
};
