//! `GET /api/evidence` and `GET /api/evidence/health` (SPEC_FULL §4.I,
//! §4.J). Sources merchants from the warning store, artifacts from recent
//! DLQ entries (the system's only persistent record of anomalous
//! processing), and narratives from warnings carrying an observed outcome
//! (the closest thing this system has to a human-authored note).

use crate::evidence::{build_envelope, merchants_from_warnings, RawRecord};
use crate::state::AppState;
use axum::extract::State;
use axum::response::{IntoResponse, Response};
use axum::Json;
use chrono::Utc;
use serde_json::json;
use std::sync::Arc;

const MAX_ARTIFACTS: usize = 500;
const MAX_NARRATIVES: usize = 500;

pub async fn get_evidence(State(state): State<Arc<AppState>>) -> Response {
    let warnings = state.warning_store.list(1000, None);
    let merchants = merchants_from_warnings(&warnings);

    let artifacts = match state.stream.recent_entries(&state.config.dlq_stream_key, MAX_ARTIFACTS).await {
        Ok(entries) => entries
            .into_iter()
            .filter_map(|e| {
                let raw = e.fields.get("data")?.as_str()?;
                let dlq: crate::models::DlqEntry = serde_json::from_str(raw).ok()?;
                Some(RawRecord {
                    id: e.id,
                    entity_id: Some(dlq.original_id),
                    timestamp: dlq.timestamp,
                    severity: "warning".to_string(),
                    data: json!({ "reason": dlq.reason }),
                })
            })
            .collect(),
        Err(e) => {
            tracing::warn!(error = %e, "failed to read dlq for evidence artifacts");
            Vec::new()
        }
    };

    let narratives: Vec<RawRecord> = warnings
        .iter()
        .filter(|w| w.outcome_observed)
        .take(MAX_NARRATIVES)
        .map(|w| RawRecord {
            id: w.warning_id.clone(),
            entity_id: w.merchant_id_hash.clone(),
            timestamp: w.outcome_updated_at.clone().unwrap_or_else(|| w.processed_at.clone()),
            severity: w.risk_band.clone(),
            data: json!({
                "processor": w.processor,
                "outcome_type": w.outcome_type,
                "outcome_notes": w.outcome_notes,
            }),
        })
        .collect();

    let envelope = build_envelope(merchants, artifacts, narratives, json!({}), Utc::now(), &state.evidence_counters);
    Json(envelope).into_response()
}

pub async fn evidence_health(State(state): State<Arc<AppState>>) -> Response {
    Json(state.evidence_counters.snapshot()).into_response()
}
