//! Cross-cutting middleware, applied ahead of route-specific middleware on
//! every request (SPEC_FULL §4.J). Mirrors this codebase's existing
//! `client_ip`/`tracing` middleware shape.

use axum::body::Body;
use axum::extract::{ConnectInfo, State};
use axum::http::{HeaderMap, HeaderValue, Request, StatusCode};
use axum::middleware::Next;
use axum::response::Response;
use std::net::SocketAddr;
use std::sync::Arc;
use uuid::Uuid;

use crate::errors::err_retry_after;
use crate::state::AppState;

pub const TRACE_ID_HEADER: &str = "x-trace-id";

#[derive(Clone, Debug)]
pub struct ClientIp(pub String);

fn header_ip(headers: &HeaderMap) -> Option<String> {
    if let Some(xff) = headers.get("x-forwarded-for").and_then(|v| v.to_str().ok()) {
        let first = xff.split(',').next().map(|s| s.trim()).filter(|s| !s.is_empty());
        if let Some(ip) = first {
            return Some(ip.to_string());
        }
    }
    if let Some(xri) = headers.get("x-real-ip").and_then(|v| v.to_str().ok()) {
        let ip = xri.trim();
        if !ip.is_empty() {
            return Some(ip.to_string());
        }
    }
    None
}

pub async fn client_ip_middleware(mut req: Request<Body>, next: Next) -> Response {
    let connect = req.extensions().get::<ConnectInfo<SocketAddr>>().map(|c| c.0);
    let ip = header_ip(req.headers()).or_else(|| connect.map(|c| c.ip().to_string())).unwrap_or_else(|| "unknown".to_string());
    req.extensions_mut().insert(ClientIp(ip));
    next.run(req).await
}

pub async fn trace_id_middleware(mut req: Request<Body>, next: Next) -> Response {
    let trace_id = req
        .headers()
        .get(TRACE_ID_HEADER)
        .and_then(|v| v.to_str().ok())
        .map(|s| s.to_string())
        .unwrap_or_else(|| Uuid::new_v4().to_string());

    req.extensions_mut().insert(trace_id.clone());

    let mut res = next.run(req).await;
    let headers = res.headers_mut();
    headers.insert(
        TRACE_ID_HEADER,
        HeaderValue::from_str(&trace_id).unwrap_or_else(|_| HeaderValue::from_static("invalid")),
    );
    res
}

/// Bearer-token auth (SPEC_FULL §4.B). Runs ahead of every protected route;
/// the resolved key identity is inserted into request extensions for the
/// rate-limit middleware to shard on.
pub async fn auth_middleware(State(state): State<Arc<AppState>>, mut req: Request<Body>, next: Next) -> Response {
    let token = req
        .headers()
        .get(axum::http::header::AUTHORIZATION)
        .and_then(|v| v.to_str().ok())
        .and_then(|v| v.strip_prefix("Bearer "))
        .unwrap_or("");

    match state.auth.check(token) {
        Ok(identity) => {
            tracing::debug!(key = %crate::logsafe::key_prefix(&identity.key), "auth accepted");
            req.extensions_mut().insert(identity);
            next.run(req).await
        }
        Err(e) => {
            state.metrics.auth_failures_total.with_label_values(&[e.reason_label()]).inc();
            tracing::warn!(reason = e.reason_label(), key = %crate::logsafe::key_prefix(token), "auth rejected");
            use axum::response::IntoResponse;
            e.into_response()
        }
    }
}

pub async fn ingest_rate_limit_middleware(State(state): State<Arc<AppState>>, req: Request<Body>, next: Next) -> Response {
    rate_limit_gate(&state, "ingest", req, next, |s, key| s.rate_limiters.check_ingest(key)).await
}

pub async fn outcome_rate_limit_middleware(State(state): State<Arc<AppState>>, req: Request<Body>, next: Next) -> Response {
    rate_limit_gate(&state, "outcome", req, next, |s, key| s.rate_limiters.check_outcome(key)).await
}

async fn rate_limit_gate(
    state: &Arc<AppState>,
    endpoint: &'static str,
    req: Request<Body>,
    next: Next,
    check: impl Fn(&AppState, &str) -> Result<(), std::time::Duration>,
) -> Response {
    let key = req
        .extensions()
        .get::<crate::auth::ApiKeyIdentity>()
        .map(|i| i.key.clone())
        .unwrap_or_else(|| "anonymous".to_string());

    match check(state, &key) {
        Ok(()) => next.run(req).await,
        Err(wait) => {
            state.metrics.rate_limit_denials_total.with_label_values(&[endpoint]).inc();
            use axum::response::IntoResponse;
            err_retry_after(StatusCode::TOO_MANY_REQUESTS, wait, "rate limit exceeded").into_response()
        }
    }
}
