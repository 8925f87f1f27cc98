//! Ingest endpoint (SPEC_FULL §4.C): `POST /v1/events/payment_exhaust`.
//! Chain: kill-switch → body-size-cap → JSON decode → structural
//! validation → dedup reservation → durable append.

use crate::errors::{err, IngestError};
use crate::event_validate::validate_event;
use crate::models::Event;
use crate::state::AppState;
use axum::body::Body;
use axum::extract::State;
use axum::http::{Request, StatusCode};
use axum::middleware::Next;
use axum::response::{IntoResponse, Response};
use axum::Json;
use serde_json::json;
use std::sync::Arc;
use std::time::Instant;

/// Kill-switch check as a middleware rather than inside the handler: axum
/// resolves the handler's `Bytes` extractor (which reads the body) only
/// after middleware returns control downstream, so rejecting here satisfies
/// "before body read" (SPEC_FULL §4.C) without the handler needing to peek
/// at the raw connection itself.
pub async fn kill_switch_middleware(State(state): State<Arc<AppState>>, req: Request<Body>, next: Next) -> Response {
    if !state.ingest_enabled() {
        return IngestError::KillSwitch.into_response();
    }
    next.run(req).await
}

pub async fn ingest(State(state): State<Arc<AppState>>, body: axum::body::Bytes) -> Response {
    let start = Instant::now();
    let result = handle(&state, &body).await;
    state.metrics.ingest_latency.observe(start.elapsed().as_secs_f64());
    result
}

async fn handle(state: &AppState, body: &[u8]) -> Response {
    let event: Event = match serde_json::from_slice(body) {
        Ok(e) => e,
        Err(e) => {
            state.metrics.ingest_rejected_total.with_label_values(&["invalid_json"]).inc();
            return IngestError::InvalidJson(e.to_string()).into_response();
        }
    };

    if let Err(msg) = validate_event(&event) {
        state.metrics.ingest_rejected_total.with_label_values(&["validation_failed"]).inc();
        return IngestError::Validation(msg).into_response();
    }

    let reserved = match state.dedup.reserve(&event.event_id).await {
        Ok(r) => r,
        Err(e) => {
            state.metrics.ingest_rejected_total.with_label_values(&["dependency_failure"]).inc();
            return IngestError::Dependency(e).into_response();
        }
    };

    if !reserved {
        state.metrics.ingest_duplicate_total.inc();
        return (StatusCode::ACCEPTED, Json(json!({ "status": "duplicate" }))).into_response();
    }

    let payload = match serde_json::to_string(&event) {
        Ok(p) => p,
        Err(e) => return err(StatusCode::INTERNAL_SERVER_ERROR, e.to_string()).into_response(),
    };

    if let Err(e) = state.stream.append(&state.config.stream_key, &payload, state.config.stream_max_len).await {
        state.metrics.ingest_rejected_total.with_label_values(&["dependency_failure"]).inc();
        return IngestError::Dependency(e).into_response();
    }

    state.metrics.ingest_accepted_total.with_label_values(&[&event.processor]).inc();
    (StatusCode::ACCEPTED, Json(json!({ "status": "accepted", "event_id": event.event_id }))).into_response()
}
