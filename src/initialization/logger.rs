//! Logger setup for the scanner and the HTTP surface.
//!
//! `RUST_LOG` is read first; the level handed in by the CLI then wins for the
//! crate's own targets. Dependency chatter is capped by [`QUIET_TARGETS`].

use std::io::Write;

use crate::config::LogFormat;
use crate::error_handling::InitializationError;
use colored::Colorize;
use log::{Level, LevelFilter};

/// Dependencies that log per request or per statement.
const QUIET_TARGETS: &[(&str, LevelFilter)] = &[
    ("sqlx", LevelFilter::Warn),
    ("reqwest", LevelFilter::Info),
    ("hyper", LevelFilter::Info),
    ("hyper_util", LevelFilter::Info),
    ("axum", LevelFilter::Info),
    ("tower_http", LevelFilter::Info),
];

pub fn init_logger_with(level: LevelFilter, format: LogFormat) -> Result<(), InitializationError> {
    let mut builder = env_logger::Builder::from_default_env();
    builder.filter_level(level);
    for (target, cap) in QUIET_TARGETS {
        builder.filter_module(target, (*cap).min(level));
    }
    builder.filter_module(env!("CARGO_CRATE_NAME"), level);

    match format {
        LogFormat::Json => {
            builder.format(|buf, record| {
                let line = json_line(
                    chrono::Utc::now().timestamp_millis(),
                    record.level(),
                    record.target(),
                    &record.args().to_string(),
                );
                writeln!(buf, "{line}")
            });
        }
        LogFormat::Plain => {
            colored::control::set_override(true);
            builder.format(|buf, record| {
                let line = plain_line(
                    record.level(),
                    record.target(),
                    &record.args().to_string(),
                    true,
                );
                writeln!(buf, "{line}")
            });
        }
    }

    // try_init so a second call (tests, embedding) reports instead of panicking.
    builder.try_init().map_err(InitializationError::from)?;
    Ok(())
}

/// One JSON object per record: `ts` in epoch millis, then level, target, msg.
fn json_line(ts_ms: i64, level: Level, target: &str, msg: &str) -> String {
    serde_json::json!({
        "ts": ts_ms,
        "level": level.as_str(),
        "target": target,
        "msg": msg,
    })
    .to_string()
}

fn plain_line(level: Level, target: &str, msg: &str, color: bool) -> String {
    if !color {
        return format!("{target} [{level:<5}] {msg}");
    }
    let padded = format!("{level:<5}");
    let tag = padded.as_str();
    let tag = match level {
        Level::Error => tag.red().bold(),
        Level::Warn => tag.yellow(),
        Level::Info => tag.green(),
        Level::Debug => tag.blue(),
        Level::Trace => tag.dimmed(),
    };
    format!("{} [{}] {}", target.cyan(), tag, msg)
}
