//! Router assembly (SPEC_FULL §4.J). Routes are grouped by middleware
//! stack and merged, following this codebase's existing
//! build-sub-router-then-merge shape.

use crate::conn_limit::{conn_limit_middleware, ConnLimiter};
use crate::state::AppState;
use crate::{evidence_http, health_http, http_mw, ingest, outcome, warnings_http};
use axum::extract::DefaultBodyLimit;
use axum::middleware::from_fn_with_state;
use axum::routing::{get, post};
use axum::Router;
use std::sync::Arc;
use tower_http::cors::{Any, CorsLayer};
use tower_http::trace::TraceLayer;

const INGEST_BODY_LIMIT_BYTES: usize = 1024 * 1024;

pub fn build(state: Arc<AppState>) -> Router {
    let conn_limiter = Arc::new(ConnLimiter::new(1024, 64));

    let ingest_router = Router::new()
        .route("/v1/events/payment_exhaust", post(ingest::ingest))
        .layer(DefaultBodyLimit::max(INGEST_BODY_LIMIT_BYTES))
        .layer(from_fn_with_state(state.clone(), http_mw::ingest_rate_limit_middleware))
        .layer(from_fn_with_state(state.clone(), http_mw::auth_middleware))
        .layer(from_fn_with_state(state.clone(), ingest::kill_switch_middleware));

    let warnings_router = Router::new()
        .route("/pilot/warnings", get(warnings_http::list_warnings))
        .route("/pilot/warnings/{id}", get(warnings_http::get_warning))
        .layer(from_fn_with_state(state.clone(), http_mw::auth_middleware));

    let outcome_router = Router::new()
        .route("/pilot/warnings/{id}/outcome", post(outcome::set_outcome))
        .layer(from_fn_with_state(state.clone(), http_mw::outcome_rate_limit_middleware))
        .layer(from_fn_with_state(state.clone(), http_mw::auth_middleware));

    let evidence_cors = CorsLayer::new().allow_origin(Any).allow_methods(Any).allow_headers(Any);
    let evidence_router = Router::new()
        .route("/api/evidence", get(evidence_http::get_evidence))
        .route("/api/evidence/health", get(evidence_http::evidence_health))
        .layer(from_fn_with_state(state.clone(), http_mw::auth_middleware))
        .layer(evidence_cors);

    let ops_router = Router::new()
        .route("/health", get(health_http::health))
        .route("/metrics", get(health_http::metrics))
        .route("/export/health", get(health_http::export_health));

    let mut app = Router::new()
        .merge(ingest_router)
        .merge(warnings_router)
        .merge(outcome_router)
        .merge(evidence_router)
        .merge(ops_router)
        .with_state(state.clone());

    if state.config.conn_limit_enabled {
        app = app.layer(from_fn_with_state(conn_limiter, conn_limit_middleware));
    }

    // Added innermost-first: trace-id and client-ip must run ahead of
    // everything else, with `TraceLayer`'s span instrumentation nested
    // just underneath the custom trace-id header (SPEC_FULL §4.J).
    app.layer(TraceLayer::new_for_http())
        .layer(axum::middleware::from_fn(http_mw::client_ip_middleware))
        .layer(axum::middleware::from_fn(http_mw::trace_id_middleware))
}
