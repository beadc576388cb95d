//! HTTP client initialization.

use std::sync::Arc;

use reqwest::ClientBuilder;

/// Initializes the shared probe client.
///
/// Redirects are disabled so every hop is observed and recorded by the walker.
/// No client-wide timeout is set: internal and external probes carry their own
/// per-request timeout.
///
/// # Errors
///
/// Returns a `reqwest::Error` if client creation fails.
pub fn init_probe_client(user_agent: &str) -> Result<Arc<reqwest::Client>, reqwest::Error> {
    let client = ClientBuilder::new()
        .redirect(reqwest::redirect::Policy::none())
        .user_agent(user_agent.to_string())
        .build()?;
    Ok(Arc::new(client))
}
