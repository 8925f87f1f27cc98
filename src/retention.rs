//! Raw-event retention task (SPEC_FULL §4.D): runs once at startup, then
//! hourly. Cutoff = `now - TTL_days`; idempotent and safe against
//! concurrent appends since `XTRIM MINID` only ever removes entries older
//! than the cutoff.

use crate::state::AppState;
use chrono::Utc;
use std::sync::Arc;
use std::time::Duration;

const HOURLY: Duration = Duration::from_secs(3600);

pub async fn run(state: Arc<AppState>, stream_key: String) {
    loop {
        let cutoff_ms = Utc::now().timestamp_millis() - (state.config.raw_event_ttl_days as i64) * 86_400_000;
        if let Err(e) = state.stream.trim_before(&stream_key, cutoff_ms).await {
            tracing::warn!(error = %e, "retention trim failed");
        } else {
            tracing::info!(cutoff_ms, "retention trim complete");
        }
        tokio::time::sleep(HOURLY).await;
    }
}
