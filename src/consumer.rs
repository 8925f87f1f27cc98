//! Consumer loop (SPEC_FULL §4.E). Alternates a reclaim phase (auto-claim
//! entries idle past the threshold) and a read phase (block for new
//! entries), acking before any downstream side-effect so export is
//! best-effort relative to the queue rather than a source of redelivery.

use crate::models::{DlqEntry, DlqReason, Event};
use crate::state::AppState;
use chrono::Utc;
use rand::Rng;
use std::sync::Arc;
use std::time::Duration;

const RECLAIM_IDLE_MS: usize = 30_000;
const READ_BLOCK_MS: usize = 2_000;
const READ_COUNT: usize = 50;
const RECLAIM_COUNT: usize = 50;
pub(crate) const MAX_DELIVERY_COUNT: i64 = 5;
const BASE_BACKOFF_MS: u64 = 100;
const MAX_BACKOFF_EXP: u32 = 4;
const MAX_BACKOFF_MS: u64 = 2_000;

/// Generates `hostname-pid-<random 8 hex>`. The `HOSTNAME` env var is the
/// common container convention; there is no portable hostname syscall
/// wrapper in this dependency stack, so this avoids reaching for one.
pub fn generate_consumer_name() -> String {
    let host = std::env::var("HOSTNAME").unwrap_or_else(|_| "paysentry".to_string());
    let pid = std::process::id();
    let suffix: String = {
        let mut rng = rand::thread_rng();
        (0..8).map(|_| std::char::from_digit(rng.gen_range(0..16), 16).unwrap()).collect()
    };
    format!("{host}-{pid}-{suffix}")
}

/// Runs the loop until the process exits or `main`'s panic-policy
/// supervisor decides to restart this task.
pub async fn run(state: Arc<AppState>, stream_key: String, dlq_key: String, group: String) {
    let mut reclaim_cursor = "0-0".to_string();
    let mut attempt: u32 = 0;

    loop {
        let iteration = run_iteration(&state, &stream_key, &dlq_key, &group, &mut reclaim_cursor).await;
        match iteration {
            Ok(()) => {
                attempt = 0;
            }
            Err(e) => {
                tracing::warn!(error = %e, attempt, "consumer iteration failed, backing off");
                let backoff_ms = (BASE_BACKOFF_MS * 2u64.pow(attempt.min(MAX_BACKOFF_EXP))).min(MAX_BACKOFF_MS);
                tokio::time::sleep(Duration::from_millis(backoff_ms)).await;
                attempt = attempt.saturating_add(1);
            }
        }
    }
}

async fn run_iteration(
    state: &Arc<AppState>,
    stream_key: &str,
    dlq_key: &str,
    group: &str,
    reclaim_cursor: &mut String,
) -> Result<(), crate::errors::StreamError> {
    let (next_cursor, reclaimed) = state
        .stream
        .auto_claim(stream_key, group, &state.consumer_name, RECLAIM_IDLE_MS, reclaim_cursor, RECLAIM_COUNT)
        .await?;
    *reclaim_cursor = next_cursor;
    for entry in reclaimed {
        process_entry(state, stream_key, dlq_key, group, &entry.id, &entry.fields).await;
    }

    let entries = state
        .stream
        .read_group(stream_key, group, &state.consumer_name, READ_COUNT, READ_BLOCK_MS)
        .await?;
    for entry in entries {
        process_entry(state, stream_key, dlq_key, group, &entry.id, &entry.fields).await;
    }

    Ok(())
}

async fn process_entry(
    state: &Arc<AppState>,
    stream_key: &str,
    dlq_key: &str,
    group: &str,
    id: &str,
    fields: &std::collections::HashMap<String, crate::stream::FieldValue>,
) {
    let delivery_count = match state.stream.pending_for(stream_key, group, id).await {
        Ok(Some(p)) => p.delivery_count,
        Ok(None) => 1,
        Err(e) => {
            tracing::warn!(error = %e, id, "could not read pending metadata, proceeding without retry check");
            1
        }
    };

    if delivery_count > MAX_DELIVERY_COUNT {
        dlq(state, dlq_key, id, fields.get("data").and_then(|v| v.as_str()), DlqReason::MaxRetriesExceeded).await;
        ack(state, stream_key, group, id).await;
        return;
    }

    let raw = match fields.get("data") {
        None => {
            dlq(state, dlq_key, id, None, DlqReason::MissingDataField).await;
            ack(state, stream_key, group, id).await;
            return;
        }
        Some(field) => match field.as_str() {
            Some(s) => s,
            None => {
                dlq(state, dlq_key, id, None, DlqReason::InvalidDataType).await;
                ack(state, stream_key, group, id).await;
                return;
            }
        },
    };

    let event: Event = match serde_json::from_str(raw) {
        Ok(e) => e,
        Err(parse_err) => {
            if let Ok(value) = serde_json::from_str::<serde_json::Value>(raw) {
                tracing::debug!(id, error = %parse_err, payload = %crate::logsafe::redact(&value), "entry failed to unmarshal into an event");
            } else {
                tracing::debug!(id, error = %parse_err, "entry failed to unmarshal into an event; payload is not valid json");
            }
            dlq(state, dlq_key, id, Some(raw), DlqReason::UnmarshalFailed).await;
            ack(state, stream_key, group, id).await;
            return;
        }
    };

    ack(state, stream_key, group, id).await;
    state.metrics.consumer_processed_total.inc();

    state.export.process(
        &event,
        id,
        &state.consumer_name,
        state.risk_scorer.as_ref(),
        &state.warning_store,
        &state.metrics,
        Utc::now(),
    );
}

async fn ack(state: &Arc<AppState>, stream_key: &str, group: &str, id: &str) {
    if let Err(e) = state.stream.ack(stream_key, group, id).await {
        tracing::error!(error = %e, id, "failed to ack entry");
    }
}

async fn dlq(state: &Arc<AppState>, dlq_key: &str, original_id: &str, data: Option<&str>, reason: DlqReason) {
    let entry = DlqEntry {
        data: data.unwrap_or_default().to_string(),
        original_id: original_id.to_string(),
        reason: reason.as_str().to_string(),
        timestamp: Utc::now().to_rfc3339(),
    };
    state.metrics.dlq_total.with_label_values(&[reason.as_str()]).inc();
    match serde_json::to_string(&entry) {
        Ok(json) => {
            if let Err(e) = state.stream.append(dlq_key, &json, None).await {
                tracing::error!(error = %e, original_id, reason = reason.as_str(), "failed to append to dlq");
            }
        }
        Err(e) => tracing::error!(error = %e, original_id, "failed to serialise dlq entry"),
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn consumer_name_has_expected_shape() {
        let name = generate_consumer_name();
        let parts: Vec<&str> = name.rsplitn(2, '-').collect();
        assert_eq!(parts[0].len(), 8);
        assert!(parts[0].chars().all(|c| c.is_ascii_hexdigit()));
    }

    #[test]
    fn backoff_caps_at_max() {
        let backoff = |attempt: u32| (BASE_BACKOFF_MS * 2u64.pow(attempt.min(MAX_BACKOFF_EXP))).min(MAX_BACKOFF_MS);
        assert_eq!(backoff(0), 100);
        assert_eq!(backoff(1), 200);
        assert_eq!(backoff(4), 1600);
        assert_eq!(backoff(10), MAX_BACKOFF_MS);
    }
}
