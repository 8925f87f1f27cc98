//! `GET /health` (liveness + dependency ping), `GET /metrics`, and
//! `GET /export/health` (SPEC_FULL §4.J). Unauthenticated by design — these
//! are operational surfaces, not data surfaces.

use crate::state::AppState;
use axum::extract::State;
use axum::http::StatusCode;
use axum::response::{IntoResponse, Response};
use axum::Json;
use serde_json::json;
use std::sync::Arc;

pub async fn health(State(state): State<Arc<AppState>>) -> Response {
    let redis_ok = state.stream.ping().await.is_ok();
    state.metrics.dep_up.with_label_values(&["redis"]).set(if redis_ok { 1 } else { 0 });

    if !redis_ok {
        return (StatusCode::SERVICE_UNAVAILABLE, Json(json!({ "status": "degraded", "redis": "down" }))).into_response();
    }
    (StatusCode::OK, Json(json!({ "status": "ok", "redis": "up" }))).into_response()
}

pub async fn metrics(State(state): State<Arc<AppState>>) -> Response {
    (StatusCode::OK, state.metrics.render()).into_response()
}

pub async fn export_health(State(state): State<Arc<AppState>>) -> Response {
    let snapshot: Vec<_> = state
        .export
        .sinks
        .iter()
        .zip(state.export.health.iter())
        .map(|(sink, health)| {
            json!({
                "destination": sink.name(),
                "last_success_unix": health.last_success_unix.load(std::sync::atomic::Ordering::Relaxed),
                "last_error_unix": health.last_error_unix.load(std::sync::atomic::Ordering::Relaxed),
                "last_error_reason": health.last_error_reason.lock().unwrap().clone(),
            })
        })
        .collect();
    Json(snapshot).into_response()
}
