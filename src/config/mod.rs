//! Application configuration and constants.
//!
//! This module provides:
//! - Configuration constants (timeouts, limits, lease lengths, etc.)
//! - Process configuration parsed from the command line and environment
//! - Runtime settings read from a flat key/value store

mod constants;
mod settings;
mod types;

// Re-export all constants
pub use constants::*;
pub use settings::{keys, MemorySettings, Settings, SettingsStore};
pub use types::{Config, LogFormat, LogLevel};
