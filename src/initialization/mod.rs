//! Application initialization and resource setup.
//!
//! This module provides functions to initialize shared resources:
//! - Logger (plain or JSON)
//! - HTTP probe client (redirects disabled)
//!
//! The database pool lives in `storage`.

mod client;
mod logger;

// Re-export public API
pub use client::init_probe_client;
pub use logger::init_logger_with;
