use api::config::ApiKeys;
use api::rest::{create_router, AppState};
use api::store::MemoryStore;
use axum::body::Body;
use axum::http::{Method, Request, StatusCode};
use axum::Router;
use serde_json::Value;
use std::sync::Arc;
use tower::ServiceExt;

pub const INGEST_KEY: &str = "ingest-secret";
pub const DASHBOARD_KEY: &str = "dashboard-secret";
pub const MAX_BODY_BYTES: usize = 64 * 1024;

pub fn app() -> Router {
    app_with_keys(ApiKeys {
        ingest: Some(INGEST_KEY.to_string()),
        dashboard: Some(DASHBOARD_KEY.to_string()),
    })
}

pub fn app_with_keys(keys: ApiKeys) -> Router {
    let state = AppState::new(Arc::new(MemoryStore::new()), keys, chrono_tz::Europe::Berlin);
    create_router(state, MAX_BODY_BYTES)
}

pub async fn send(app: &Router, request: Request<Body>) -> (StatusCode, Value) {
    let response = app.clone().oneshot(request).await.unwrap();
    let status = response.status();
    let body = axum::body::to_bytes(response.into_body(), usize::MAX)
        .await
        .unwrap();
    let json = if body.is_empty() {
        Value::Null
    } else {
        serde_json::from_slice(&body).unwrap_or(Value::Null)
    };
    (status, json)
}

pub fn ingest_request(key: Option<&str>, body: impl Into<Body>) -> Request<Body> {
    let mut builder = Request::builder()
        .uri("/ingest")
        .method(Method::POST)
        .header("Content-Type", "application/json");
    if let Some(key) = key {
        builder = builder.header("x-api-key", key);
    }
    builder.body(body.into()).unwrap()
}

pub async fn ingest(app: &Router, payload: &Value) -> (StatusCode, Value) {
    send(app, ingest_request(Some(INGEST_KEY), payload.to_string())).await
}

pub fn dashboard_get(uri: &str) -> Request<Body> {
    Request::builder()
        .uri(uri)
        .method(Method::GET)
        .header("x-dashboard-key", DASHBOARD_KEY)
        .body(Body::empty())
        .unwrap()
}
