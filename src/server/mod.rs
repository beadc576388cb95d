//! HTTP API over [`LinkSentinel`].
//!
//! Endpoints:
//! - `POST /scan/start`, `POST /scan/step`, `GET /scan/status`, `POST /scan/reset`
//! - `POST /issues/:id/resolve`, `POST /issues/resolve-all`, `POST /issues/:id/change`
//! - `GET /issues`, `DELETE /issues/resolved`
//! - `GET /settings`, `PUT /settings`

mod envelope;
mod handlers;

use std::sync::Arc;

use axum::routing::{delete, get, post};
use axum::Router;
use tokio_util::sync::CancellationToken;

use crate::service::LinkSentinel;

pub use envelope::{ApiError, Envelope};
pub use handlers::{ACTOR_ID_HEADER, ACTOR_NAME_HEADER, NONCE_HEADER};

pub fn router(service: Arc<LinkSentinel>) -> Router {
    Router::new()
        .route("/scan/start", post(handlers::start_scan))
        .route("/scan/step", post(handlers::step_scan))
        .route("/scan/status", get(handlers::scan_status))
        .route("/scan/reset", post(handlers::reset_scan))
        .route("/issues", get(handlers::list_issues))
        .route("/issues/resolved", delete(handlers::clear_resolved))
        .route("/issues/resolve-all", post(handlers::resolve_all))
        .route("/issues/:id/resolve", post(handlers::resolve_one))
        .route("/issues/:id/change", post(handlers::change_link))
        .route(
            "/settings",
            get(handlers::get_settings).put(handlers::put_settings),
        )
        .with_state(service)
}

/// Binds `addr:port` and serves until `shutdown` is cancelled.
pub async fn serve(
    addr: &str,
    port: u16,
    service: Arc<LinkSentinel>,
    shutdown: CancellationToken,
) -> Result<(), anyhow::Error> {
    let app = router(service);

    let listener = tokio::net::TcpListener::bind(format!("{}:{}", addr, port))
        .await
        .map_err(|e| anyhow::anyhow!("Failed to bind API server to {}:{}: {}", addr, port, e))?;

    log::info!("API server listening on http://{}:{}/", addr, port);

    axum::serve(listener, app)
        .with_graceful_shutdown(async move { shutdown.cancelled().await })
        .await
        .map_err(|e| anyhow::anyhow!("API server error: {}", e))?;

    Ok(())
}
