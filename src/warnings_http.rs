//! `GET /pilot/warnings` and `GET /pilot/warnings/{id}` (SPEC_FULL §4.J).

use crate::errors::err;
use crate::state::AppState;
use axum::extract::{Path, Query, State};
use axum::http::StatusCode;
use axum::response::{IntoResponse, Response};
use axum::Json;
use serde::Deserialize;
use std::sync::Arc;

const DEFAULT_LIST_LIMIT: usize = 100;

#[derive(Debug, Deserialize)]
pub struct ListQuery {
    pub processor: Option<String>,
    pub limit: Option<usize>,
}

pub async fn list_warnings(State(state): State<Arc<AppState>>, Query(q): Query<ListQuery>) -> Response {
    let limit = q.limit.unwrap_or(DEFAULT_LIST_LIMIT).min(1000);
    let warnings = state.warning_store.list(limit, q.processor.as_deref());
    Json(warnings).into_response()
}

pub async fn get_warning(State(state): State<Arc<AppState>>, Path(warning_id): Path<String>) -> Response {
    match state.warning_store.get(&warning_id) {
        Some(w) => Json(w).into_response(),
        None => err(StatusCode::NOT_FOUND, "warning not found").into_response(),
    }
}
