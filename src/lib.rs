//! link_sentinel library: link health for a stored content corpus
//!
//! Scans published documents for hyperlinks, resolves where each link really
//! ends up (HEAD redirect walk or canonical lookup), logs redirects and broken
//! links to a SQLite ledger and rewrites document bodies in place when a fix
//! is authorized.
//!
//! # Example
//!
//! ```no_run
//! use std::sync::Arc;
//! use link_sentinel::service::{Actor, Gatekeeper, LinkSentinel, SentinelContext};
//! use link_sentinel::Config;
//!
//! # #[tokio::main]
//! # async fn main() -> anyhow::Result<()> {
//! let config = Config {
//!     site_url: "https://example.org".to_string(),
//!     ..Default::default()
//! };
//! let ctx = SentinelContext::from_config(&config).await?;
//! let sentinel = Arc::new(LinkSentinel::new(ctx, Gatekeeper::new(config.api_key.clone())));
//!
//! let admin = Actor::manager(1, "admin");
//! let started = sentinel.start_scan(&admin, Some("nonce")).await?;
//! let mut token = started.token;
//! loop {
//!     let step = sentinel.step_scan(&admin, Some("nonce"), &token).await?;
//!     if step.done {
//!         break;
//!     }
//!     token = step.token;
//! }
//! # Ok(())
//! # }
//! ```
//!
//! # Requirements
//!
//! This library requires a Tokio runtime.

pub mod bulk;
pub mod clock;
pub mod config;
pub mod documents;
pub mod error_handling;
pub mod initialization;
pub mod ledger;
pub mod locate;
pub mod resolve;
pub mod rewrite;
pub mod scan;
pub mod server;
pub mod service;
pub mod storage;

// Re-export public API
pub use config::{Config, LogFormat, LogLevel, Settings};
pub use error_handling::ServiceError;
pub use service::{Actor, Gatekeeper, LinkSentinel, SentinelContext};
