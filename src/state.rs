//! Application-wide singleton bundle, constructed once during boot and
//! shared behind an `Arc` the same way this codebase's route states are
//! shared (c.f. `HealthState`, `AuthState`).

use crate::auth::ApiKeyAuth;
use crate::config::AppConfig;
use crate::dedup::DedupStore;
use crate::evidence::EvidenceCounters;
use crate::export::ExportPipeline;
use crate::metrics::Metrics;
use crate::rate_limit::RateLimiters;
use crate::risk::RiskScorer;
use crate::stream::StreamClient;
use crate::warnings::WarningStore;
use std::sync::atomic::AtomicBool;

pub struct AppState {
    pub config: AppConfig,
    pub fingerprint: String,
    pub metrics: Metrics,
    pub auth: ApiKeyAuth,
    pub rate_limiters: RateLimiters,
    pub dedup: DedupStore,
    pub stream: StreamClient,
    pub risk_scorer: Option<RiskScorer>,
    pub warning_store: WarningStore,
    pub evidence_counters: EvidenceCounters,
    pub export: ExportPipeline,
    pub consumer_name: String,

    /// Flips false once the ingest kill switch trips at runtime without a
    /// restart (e.g. a future admin endpoint); read by the ingest handler
    /// ahead of config's own static `ingest_enabled` flag.
    pub ingest_enabled: AtomicBool,
}

impl AppState {
    pub fn ingest_enabled(&self) -> bool {
        self.config.ingest_enabled && self.ingest_enabled.load(std::sync::atomic::Ordering::Relaxed)
    }
}
