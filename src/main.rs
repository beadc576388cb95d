//! Main application entry point (CLI binary).
//!
//! This is a thin wrapper around the `link_sentinel` library that handles:
//! - Command-line argument parsing
//! - Environment variable loading (.env file)
//! - Logger initialization
//! - Serving the HTTP API until Ctrl-C
//!
//! All core functionality is implemented in the library crate.

use std::process;
use std::sync::Arc;

use anyhow::{Context, Result};
use clap::Parser;
use tokio_util::sync::CancellationToken;

use link_sentinel::initialization::init_logger_with;
use link_sentinel::{server, Config, Gatekeeper, LinkSentinel, SentinelContext};

async fn run(config: Config) -> Result<()> {
    let ctx = SentinelContext::from_config(&config).await?;

    match ctx.cache.purge_expired().await {
        Ok(0) => {}
        Ok(n) => log::info!("Purged {} expired resolver cache entries", n),
        Err(e) => log::warn!("Failed to purge resolver cache: {}", e),
    }

    let service = Arc::new(LinkSentinel::new(ctx, Gatekeeper::new(config.api_key.clone())));

    let shutdown = CancellationToken::new();
    let signal = shutdown.clone();
    tokio::spawn(async move {
        if tokio::signal::ctrl_c().await.is_ok() {
            log::info!("Shutdown requested");
        }
        signal.cancel();
    });

    server::serve(&config.listen_addr, config.port, service, shutdown)
        .await
        .context("API server failed")
}

#[tokio::main]
async fn main() -> Result<()> {
    // Load environment variables from .env file (if it exists)
    if dotenvy::dotenv().is_err() {
        if let Ok(exe_path) = std::env::current_exe() {
            if let Some(exe_dir) = exe_path.parent() {
                let env_path = exe_dir.join(".env");
                if env_path.exists() {
                    let _ = dotenvy::from_path(&env_path);
                }
            }
        }
    }

    let config = Config::parse();

    let log_level = config.log_level.clone();
    let log_format = config.log_format.clone();
    init_logger_with(log_level.into(), log_format).context("Failed to initialize logger")?;

    if let Err(e) = run(config).await {
        eprintln!("link_sentinel error: {:#}", e);
        process::exit(1);
    }
    Ok(())
}
