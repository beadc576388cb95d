//! Route handlers.
//!
//! The caller identity comes from `x-actor-id` / `x-actor-name` (any positive
//! ID may manage) and the request nonce from `x-sentinel-nonce`.

use std::collections::HashMap;
use std::sync::Arc;

use axum::extract::{Path, Query, State};
use axum::http::HeaderMap;
use axum::Json;
use serde::Deserialize;

use super::envelope::{ApiResult, Envelope};
use crate::bulk::{ResolveAllRequest, ResolveAllResponse};
use crate::config::Settings;
use crate::ledger::{LinkIssue, Page};
use crate::scan::{ScanStartResponse, ScanStatusResponse, ScanStepResponse};
use crate::service::{ActionResponse, Actor, ClearedResponse, IssueQuery, LinkSentinel};

pub const ACTOR_ID_HEADER: &str = "x-actor-id";
pub const ACTOR_NAME_HEADER: &str = "x-actor-name";
pub const NONCE_HEADER: &str = "x-sentinel-nonce";

pub type AppState = Arc<LinkSentinel>;

fn header<'a>(headers: &'a HeaderMap, name: &str) -> Option<&'a str> {
    headers.get(name).and_then(|v| v.to_str().ok())
}

fn actor(headers: &HeaderMap) -> Actor {
    let id = header(headers, ACTOR_ID_HEADER)
        .and_then(|v| v.trim().parse::<i64>().ok())
        .unwrap_or(0);
    Actor {
        id,
        name: header(headers, ACTOR_NAME_HEADER).unwrap_or_default().to_string(),
        can_manage: id > 0,
    }
}

fn nonce(headers: &HeaderMap) -> Option<&str> {
    header(headers, NONCE_HEADER)
}

#[derive(Debug, Default, Deserialize)]
pub struct StepBody {
    #[serde(default)]
    pub token: String,
}

#[derive(Debug, Default, Deserialize)]
pub struct ChangeBody {
    #[serde(default)]
    pub new_url: String,
}

pub async fn start_scan(
    State(service): State<AppState>,
    headers: HeaderMap,
) -> ApiResult<ScanStartResponse> {
    let response = service.start_scan(&actor(&headers), nonce(&headers)).await?;
    Ok(Envelope(response))
}

pub async fn step_scan(
    State(service): State<AppState>,
    headers: HeaderMap,
    Json(body): Json<StepBody>,
) -> ApiResult<ScanStepResponse> {
    let response = service
        .step_scan(&actor(&headers), nonce(&headers), &body.token)
        .await?;
    Ok(Envelope(response))
}

pub async fn scan_status(
    State(service): State<AppState>,
    headers: HeaderMap,
) -> ApiResult<ScanStatusResponse> {
    Ok(Envelope(service.scan_status(&actor(&headers)).await?))
}

pub async fn reset_scan(
    State(service): State<AppState>,
    headers: HeaderMap,
) -> ApiResult<ActionResponse> {
    Ok(Envelope(
        service.reset_scan(&actor(&headers), nonce(&headers)).await?,
    ))
}

pub async fn resolve_one(
    State(service): State<AppState>,
    headers: HeaderMap,
    Path(id): Path<i64>,
) -> ApiResult<ActionResponse> {
    Ok(Envelope(
        service
            .resolve_one(&actor(&headers), nonce(&headers), id)
            .await?,
    ))
}

pub async fn resolve_all(
    State(service): State<AppState>,
    headers: HeaderMap,
    Json(request): Json<ResolveAllRequest>,
) -> ApiResult<ResolveAllResponse> {
    Ok(Envelope(
        service
            .resolve_all_step(&actor(&headers), nonce(&headers), &request)
            .await?,
    ))
}

pub async fn change_link(
    State(service): State<AppState>,
    headers: HeaderMap,
    Path(id): Path<i64>,
    Json(body): Json<ChangeBody>,
) -> ApiResult<ActionResponse> {
    Ok(Envelope(
        service
            .change_link(&actor(&headers), nonce(&headers), id, &body.new_url)
            .await?,
    ))
}

pub async fn list_issues(
    State(service): State<AppState>,
    headers: HeaderMap,
    Query(query): Query<IssueQuery>,
) -> ApiResult<Page<LinkIssue>> {
    Ok(Envelope(service.list_issues(&actor(&headers), &query).await?))
}

pub async fn clear_resolved(
    State(service): State<AppState>,
    headers: HeaderMap,
) -> ApiResult<ClearedResponse> {
    Ok(Envelope(
        service
            .clear_resolved(&actor(&headers), nonce(&headers))
            .await?,
    ))
}

pub async fn get_settings(
    State(service): State<AppState>,
    headers: HeaderMap,
) -> ApiResult<Settings> {
    Ok(Envelope(service.get_settings(&actor(&headers)).await?))
}

pub async fn put_settings(
    State(service): State<AppState>,
    headers: HeaderMap,
    Json(values): Json<HashMap<String, String>>,
) -> ApiResult<Settings> {
    Ok(Envelope(
        service
            .put_settings(&actor(&headers), nonce(&headers), &values)
            .await?,
    ))
}
