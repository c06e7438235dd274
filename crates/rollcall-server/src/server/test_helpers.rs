//! Shared setup for the HTTP handler tests.

use std::sync::Arc;

use axum::Router;
use axum::body::Body;
use axum::http::{Method, Request, StatusCode};
use serde_json::Value;
use tower::ServiceExt;

use rollcall_core::config::CheckinConfig;

use super::{AppState, USER_ID_HEADER, build_router};
use crate::auth::CheckinTokenManager;
use crate::storage::{CreateEventParams, ServerDatabase};

pub const HOST: &str = "host-1";
pub const EVENT: &str = "e1";

/// State with one event hosted by [`HOST`].
pub async fn test_state(capacity: Option<i64>) -> AppState {
    let db = ServerDatabase::open_in_memory().await.unwrap();
    db.create_event(&CreateEventParams {
        id: EVENT,
        host_id: HOST,
        title: "Orientation",
        starts_at: 0,
        ends_at: 3600,
        capacity,
        host_secret: "event-secret",
    })
    .await
    .unwrap();

    let tokens = Arc::new(CheckinTokenManager::new(b"test-key", 6 * 60 * 60));
    AppState::new(db, tokens, CheckinConfig::default())
}

pub async fn test_app(capacity: Option<i64>) -> (AppState, Router) {
    let state = test_state(capacity).await;
    let app = build_router(state.clone());
    (state, app)
}

/// Send a request and return (status, parsed JSON body or `Null`).
pub async fn send(
    app: &Router,
    method: Method,
    uri: &str,
    user: Option<&str>,
    body: Option<&Value>,
) -> (StatusCode, Value) {
    let mut builder = Request::builder().method(method).uri(uri);
    if let Some(user) = user {
        builder = builder.header(USER_ID_HEADER, user);
    }
    let request = match body {
        Some(json) => builder
            .header("content-type", "application/json")
            .body(Body::from(json.to_string()))
            .unwrap(),
        None => builder.body(Body::empty()).unwrap(),
    };

    let resp = app.clone().oneshot(request).await.unwrap();
    let status = resp.status();
    let bytes = axum::body::to_bytes(resp.into_body(), usize::MAX)
        .await
        .unwrap();
    let json = if bytes.is_empty() {
        Value::Null
    } else {
        serde_json::from_slice(&bytes).unwrap()
    };
    (status, json)
}
