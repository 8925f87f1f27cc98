//! Backpressure probe (SPEC_FULL §4.K): every 10 s, samples stream length
//! and pending count, logging a structured warning when length exceeds the
//! configured threshold.

use crate::state::AppState;
use std::sync::Arc;
use std::time::Duration;

const PROBE_INTERVAL: Duration = Duration::from_secs(10);
const PENDING_SAMPLE_COUNT: usize = 200;

pub async fn run(state: Arc<AppState>, stream_key: String, group: String) {
    let mut interval = tokio::time::interval(PROBE_INTERVAL);
    loop {
        interval.tick().await;

        let length = match state.stream.stream_len(&stream_key).await {
            Ok(n) => n,
            Err(e) => {
                tracing::warn!(error = %e, "backpressure probe failed to read stream length");
                continue;
            }
        };
        let pending = state.stream.pending_count(&stream_key, &group).await.unwrap_or(0);

        state.metrics.stream_length.set(length as i64);
        state.metrics.pending_messages.set(pending as i64);

        if length > state.config.backpressure_threshold {
            state.metrics.backpressure_warnings_total.inc();
            tracing::warn!(
                depth = length,
                pending,
                threshold = state.config.backpressure_threshold,
                "stream depth exceeds backpressure threshold"
            );
        }

        // Sample the front of the pending list for entries nearing the DLQ
        // retry budget, catching a stuck consumer before it quarantines them.
        match state.stream.pending_range(&stream_key, &group, PENDING_SAMPLE_COUNT).await {
            Ok(sample) => {
                if let Some(worst) = sample.iter().max_by_key(|p| p.delivery_count) {
                    if worst.delivery_count >= crate::consumer::MAX_DELIVERY_COUNT {
                        tracing::warn!(
                            id = %worst.id,
                            consumer = %worst.consumer,
                            delivery_count = worst.delivery_count,
                            idle_ms = worst.idle_ms,
                            "pending entry approaching or past the delivery retry budget"
                        );
                    }
                }
            }
            Err(e) => tracing::warn!(error = %e, "backpressure probe failed to sample pending entries"),
        }
    }
}
