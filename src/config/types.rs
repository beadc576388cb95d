//! Configuration types and CLI options.
//!
//! This module defines enums and structs used for command-line argument parsing
//! and process-level configuration.

use std::path::PathBuf;

use clap::{Parser, ValueEnum};

use crate::config::constants::{DB_PATH, DEFAULT_USER_AGENT};

/// Logging level for the application.
///
/// Controls the verbosity of log output, from most restrictive (Error) to most
/// verbose (Trace).
#[derive(Clone, Debug, ValueEnum)]
pub enum LogLevel {
    /// Only error messages
    Error,
    /// Error and warning messages
    Warn,
    /// Error, warning, and informational messages
    Info,
    /// All messages except trace
    Debug,
    /// All messages including trace
    Trace,
}

impl From<LogLevel> for log::LevelFilter {
    fn from(l: LogLevel) -> Self {
        match l {
            LogLevel::Error => log::LevelFilter::Error,
            LogLevel::Warn => log::LevelFilter::Warn,
            LogLevel::Info => log::LevelFilter::Info,
            LogLevel::Debug => log::LevelFilter::Debug,
            LogLevel::Trace => log::LevelFilter::Trace,
        }
    }
}

/// Log output format.
///
/// - `Plain`: Human-readable format with colors (default)
/// - `Json`: Structured JSON format for machine parsing
#[derive(Clone, Debug, ValueEnum)]
pub enum LogFormat {
    /// Human-readable format with colors (default)
    Plain,
    /// Structured JSON format for machine parsing
    Json,
}

/// Process configuration.
///
/// Everything the service needs before it can open the database. Runtime
/// knobs (batch sizes, budgets, auto-fix) live in [`crate::config::Settings`]
/// instead, so they can change without a restart.
///
/// # Examples
///
/// ```no_run
/// use link_sentinel::Config;
///
/// let config = Config {
///     site_url: "https://example.org".to_string(),
///     ..Default::default()
/// };
/// ```
#[derive(Debug, Clone, Parser)]
#[command(
    name = "link_sentinel",
    version,
    about = "Finds redirected and broken links in stored content and fixes them in place"
)]
pub struct Config {
    /// Public base URL of the site whose content is scanned
    #[arg(long, env = "LINK_SENTINEL_SITE_URL", default_value = "http://localhost")]
    pub site_url: String,

    /// Additional hosts treated as internal (comma separated, `host[:port]`)
    #[arg(
        long = "internal-host",
        env = "LINK_SENTINEL_INTERNAL_HOSTS",
        value_delimiter = ','
    )]
    pub internal_hosts: Vec<String>,

    /// Path prefixes that are never scanned (defaults to the admin/login paths)
    #[arg(long = "reserved-prefix", value_delimiter = ',')]
    pub reserved_prefixes: Vec<String>,

    /// Database path (SQLite file)
    #[arg(long, env = "LINK_SENTINEL_DB_PATH", default_value = DB_PATH)]
    pub db_path: PathBuf,

    /// Address the HTTP API binds to
    #[arg(long, default_value = "127.0.0.1")]
    pub listen_addr: String,

    /// Port the HTTP API listens on
    #[arg(long, default_value_t = 8087)]
    pub port: u16,

    /// Log level
    #[arg(long, value_enum, default_value = "info")]
    pub log_level: LogLevel,

    /// Log format
    #[arg(long, value_enum, default_value = "plain")]
    pub log_format: LogFormat,

    /// HTTP User-Agent header value for probe requests
    #[arg(long, default_value = DEFAULT_USER_AGENT)]
    pub user_agent: String,

    /// Shared secret every state-changing request must present as its nonce
    #[arg(long, env = "LINK_SENTINEL_API_KEY")]
    pub api_key: Option<String>,
}

impl Default for Config {
    fn default() -> Self {
        Self {
            site_url: "http://localhost".to_string(),
            internal_hosts: Vec::new(),
            reserved_prefixes: Vec::new(),
            db_path: PathBuf::from(DB_PATH),
            listen_addr: "127.0.0.1".to_string(),
            port: 8087,
            log_level: LogLevel::Info,
            log_format: LogFormat::Plain,
            user_agent: DEFAULT_USER_AGENT.to_string(),
            api_key: None,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_log_level_conversion() {
        assert_eq!(
            log::LevelFilter::from(LogLevel::Error),
            log::LevelFilter::Error
        );
        assert_eq!(
            log::LevelFilter::from(LogLevel::Warn),
            log::LevelFilter::Warn
        );
        assert_eq!(
            log::LevelFilter::from(LogLevel::Info),
            log::LevelFilter::Info
        );
        assert_eq!(
            log::LevelFilter::from(LogLevel::Debug),
            log::LevelFilter::Debug
        );
        assert_eq!(
            log::LevelFilter::from(LogLevel::Trace),
            log::LevelFilter::Trace
        );
    }

    #[test]
    fn test_config_default() {
        let config = Config::default();
        assert_eq!(config.site_url, "http://localhost");
        assert_eq!(config.port, 8087);
        assert!(config.api_key.is_none());
        assert_eq!(config.db_path, PathBuf::from("./link_sentinel.db"));
        assert!(config.user_agent.starts_with("LinkSentinel/"));
    }

    #[test]
    fn test_config_parses_internal_hosts_list() {
        let config = Config::try_parse_from([
            "link_sentinel",
            "--site-url",
            "https://example.org",
            "--internal-host",
            "cdn.example.org,example.net:8443",
            "--port",
            "9000",
        ])
        .expect("arguments should parse");
        assert_eq!(config.site_url, "https://example.org");
        assert_eq!(
            config.internal_hosts,
            vec!["cdn.example.org".to_string(), "example.net:8443".to_string()]
        );
        assert_eq!(config.port, 9000);
    }

    #[test]
    fn test_config_rejects_unknown_log_format() {
        let result = Config::try_parse_from(["link_sentinel", "--log-format", "xml"]);
        assert!(result.is_err());
    }
}
