//! HTTP API envelope and routing.

mod helpers;

use axum::body::{to_bytes, Body};
use axum::http::{Request, StatusCode};
use serde_json::{json, Value};
use tower::ServiceExt;

use helpers::{Site, NONCE};
use link_sentinel::server::{router, ACTOR_ID_HEADER, ACTOR_NAME_HEADER, NONCE_HEADER};

fn request(method: &str, uri: &str, body: Option<Value>, manager: bool) -> Request<Body> {
    let mut builder = Request::builder().method(method).uri(uri);
    if manager {
        builder = builder
            .header(ACTOR_ID_HEADER, "1")
            .header(ACTOR_NAME_HEADER, "Ada")
            .header(NONCE_HEADER, NONCE);
    }
    match body {
        Some(body) => builder
            .header("content-type", "application/json")
            .body(Body::from(body.to_string()))
            .unwrap(),
        None => builder.body(Body::empty()).unwrap(),
    }
}

async fn call(site: &Site, req: Request<Body>) -> (StatusCode, Value) {
    let response = router(site.sentinel.clone()).oneshot(req).await.unwrap();
    let status = response.status();
    let bytes = to_bytes(response.into_body(), usize::MAX).await.unwrap();
    (status, serde_json::from_slice(&bytes).unwrap())
}

#[tokio::test]
async fn test_anonymous_caller_gets_permission_error_envelope() {
    let site = Site::start().await;
    let (status, body) = call(&site, request("GET", "/scan/status", None, false)).await;
    assert_eq!(status, StatusCode::FORBIDDEN);
    assert_eq!(
        body,
        json!({ "success": false, "data": { "message": "Permission denied." } })
    );
}

#[tokio::test]
async fn test_scan_over_http() {
    let site = Site::start().await;
    site.seed("/post-1/", r#"<a href="/gone-away/">x</a>"#).await;

    let (status, body) = call(&site, request("POST", "/scan/start", None, true)).await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(body["success"], json!(true));
    assert_eq!(body["data"]["total"], json!(1));
    let token = body["data"]["token"].as_str().unwrap().to_string();

    let (status, body) = call(
        &site,
        request("POST", "/scan/step", Some(json!({ "token": token })), true),
    )
    .await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(body["data"]["done"], json!(true));

    let (_, body) = call(&site, request("GET", "/issues?view=broken&page=1", None, true)).await;
    assert_eq!(body["data"]["total_items"], json!(1));
    assert_eq!(body["data"]["items"][0]["original_url"], json!("/gone-away/"));
    assert_eq!(body["data"]["items"][0]["http_status"], json!(404));

    let (_, body) = call(&site, request("GET", "/issues?view=pending", None, true)).await;
    assert_eq!(body["data"]["total_items"], json!(0));
}

#[tokio::test]
async fn test_invalid_token_maps_to_bad_request() {
    let site = Site::start().await;
    site.seed("/post-1/", "<p>hi</p>").await;
    call(&site, request("POST", "/scan/start", None, true)).await;

    let (status, body) = call(
        &site,
        request("POST", "/scan/step", Some(json!({ "token": "nope" })), true),
    )
    .await;
    assert_eq!(status, StatusCode::BAD_REQUEST);
    assert_eq!(body["data"]["message"], json!("Invalid scan token."));
}

#[tokio::test]
async fn test_settings_round_trip_and_unknown_key() {
    let site = Site::start().await;
    let (status, body) = call(
        &site,
        request(
            "PUT",
            "/settings",
            Some(json!({ "auto_resolve_permanent": "1", "scan_batch_size": "500" })),
            true,
        ),
    )
    .await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(body["data"]["auto_resolve_permanent"], json!(true));
    assert_eq!(body["data"]["scan_batch_size"], json!(100));

    let (status, body) = call(
        &site,
        request("PUT", "/settings", Some(json!({ "colour": "blue" })), true),
    )
    .await;
    assert_eq!(status, StatusCode::BAD_REQUEST);
    assert_eq!(body["data"]["message"], json!("Unknown setting: colour"));
}

#[tokio::test]
async fn test_clear_resolved_endpoint() {
    let site = Site::start().await;
    site.set("auto_resolve_permanent", "1").await;
    site.head("/old-target/", 301, Some("/new-target/")).await;
    site.head("/new-target/", 200, None).await;
    site.seed("/post-1/", r#"<a href="/old-target/">x</a>"#).await;
    site.scan().await;

    let (_, body) = call(&site, request("GET", "/issues?view=resolved&scope=current", None, true)).await;
    assert_eq!(body["data"]["total_items"], json!(1));

    let (status, body) = call(&site, request("DELETE", "/issues/resolved", None, true)).await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(body["data"]["removed"], json!(1));
    assert!(site.issues().await.is_empty());
}
