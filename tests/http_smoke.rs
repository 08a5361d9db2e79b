//! HTTP-layer smoke test: proves `Outcome::into_response` and axum wiring
//! actually serve bytes over a real `tower::Service`, the way the demo
//! binary's router does.

mod common;

use axum::Router;
use axum::body::Body;
use axum::extract::{Request, State};
use axum::response::IntoResponse;
use axum::routing::get;
use common::test_state;
use http_body_util::BodyExt;
use oidcd::hooks::NoopHooks;
use oidcd::pipelines;
use oidcd::state::OidcState;
use std::sync::Arc;
use tower::ServiceExt;

async fn configuration_handler(State(state): State<OidcState>, _req: Request<Body>) -> impl IntoResponse {
    pipelines::discovery::configuration(&state, "https://issuer.example").await
}

#[tokio::test]
async fn configuration_endpoint_serves_json_over_http() {
    let state = test_state(Arc::new(NoopHooks)).await;
    let router = Router::new()
        .route("/.well-known/openid-configuration", get(configuration_handler))
        .with_state(state);

    let request = Request::builder()
        .uri("/.well-known/openid-configuration")
        .body(Body::empty())
        .expect("request builds");

    let response = router.oneshot(request).await.expect("router is infallible");
    assert_eq!(response.status(), axum::http::StatusCode::OK);

    let content_type = response
        .headers()
        .get(axum::http::header::CONTENT_TYPE)
        .and_then(|v| v.to_str().ok())
        .unwrap_or_default()
        .to_string();
    assert!(content_type.starts_with("application/json"));

    let body = response.into_body().collect().await.expect("body readable").to_bytes();
    let document: serde_json::Value = serde_json::from_slice(&body).expect("valid json");
    assert_eq!(document.get("issuer").and_then(|v| v.as_str()), Some("https://issuer.example"));
}
