//! Pilot outcome annotation endpoint (SPEC_FULL §4.L):
//! `POST /pilot/warnings/{id}/outcome`.

use crate::errors::err;
use crate::models::{is_valid_outcome_source, is_valid_outcome_type, PilotOutcomeAnnotation};
use crate::state::AppState;
use crate::warnings::OutcomeError;
use axum::extract::{Path, State};
use axum::http::StatusCode;
use axum::response::{IntoResponse, Response};
use axum::Json;
use chrono::{DateTime, Utc};
use serde::Deserialize;
use std::sync::Arc;

#[derive(Debug, Deserialize)]
pub struct OutcomeRequest {
    pub outcome_type: String,
    pub observed_at: Option<String>,
    pub source: Option<String>,
    pub notes: Option<String>,
}

pub async fn set_outcome(
    State(state): State<Arc<AppState>>,
    Path(warning_id): Path<String>,
    Json(req): Json<OutcomeRequest>,
) -> Response {
    if !is_valid_outcome_type(&req.outcome_type) {
        return err(StatusCode::BAD_REQUEST, format!("outcome_type '{}' is not recognised", req.outcome_type)).into_response();
    }

    let source = req.source.unwrap_or_else(|| "manual".to_string());
    if !is_valid_outcome_source(&source) {
        return err(StatusCode::BAD_REQUEST, format!("source '{source}' is not recognised")).into_response();
    }

    let now = Utc::now();
    let observed_at = match req.observed_at {
        Some(ref ts) => match DateTime::parse_from_rfc3339(ts) {
            Ok(dt) => dt.with_timezone(&Utc),
            Err(_) => return err(StatusCode::BAD_REQUEST, format!("observed_at '{ts}' is not a valid RFC3339 timestamp")).into_response(),
        },
        None => now,
    };

    let warning_before = match state.warning_store.get(&warning_id) {
        Some(w) => w,
        None => return err(StatusCode::NOT_FOUND, "warning not found").into_response(),
    };

    let updated = match state.warning_store.set_outcome(
        &warning_id,
        &req.outcome_type,
        &observed_at.to_rfc3339(),
        &source,
        req.notes.clone(),
        &now.to_rfc3339(),
    ) {
        Ok(w) => w,
        Err(OutcomeError::NotFound) => return err(StatusCode::NOT_FOUND, "warning not found").into_response(),
        Err(OutcomeError::InvalidType) => return err(StatusCode::BAD_REQUEST, "invalid outcome_type").into_response(),
        Err(OutcomeError::InvalidSource) => return err(StatusCode::BAD_REQUEST, "invalid source").into_response(),
    };

    state.metrics.warning_outcome_set_total.with_label_values(&[&req.outcome_type, &source]).inc();

    let lead_time_seconds = if let Ok(processed_at) = DateTime::parse_from_rfc3339(&warning_before.processed_at) {
        (observed_at - processed_at.with_timezone(&Utc)).num_seconds()
    } else {
        0
    };
    if lead_time_seconds > 0 {
        state.metrics.warning_outcome_lead_time.observe(lead_time_seconds as f64);
    }

    let annotation = PilotOutcomeAnnotation {
        kind: "pilot_outcome_annotation",
        warning_id: warning_id.clone(),
        event_id: updated.event_id.clone(),
        processor: updated.processor.clone(),
        risk_band: updated.risk_band.clone(),
        risk_score: updated.risk_score,
        warning_at: warning_before.processed_at.clone(),
        outcome_type: req.outcome_type.clone(),
        outcome_timestamp: observed_at.to_rfc3339(),
        outcome_source: source.clone(),
        outcome_notes: req.notes.clone(),
        lead_time_seconds,
        annotated_at: now.to_rfc3339(),
    };
    if let Ok(line) = serde_json::to_string(&annotation) {
        println!("{line}");
    }

    (StatusCode::OK, Json(updated)).into_response()
}
