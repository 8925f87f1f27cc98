//! Observability taxonomy (SPEC_FULL §4.K). One `prometheus::Registry`
//! owns every counter/gauge/histogram, constructed once at boot and
//! threaded through every component that needs to record against it —
//! mirrors this codebase's existing `Metrics` struct pattern.

use prometheus::{
    Encoder, Histogram, HistogramOpts, HistogramVec, IntCounter, IntCounterVec, IntGauge, IntGaugeVec, Opts,
    Registry, TextEncoder,
};

pub struct Metrics {
    pub registry: Registry,

    pub ingest_accepted_total: IntCounterVec,
    pub ingest_rejected_total: IntCounterVec,
    pub ingest_duplicate_total: IntCounter,
    pub ingest_latency: Histogram,

    pub consumer_processed_total: IntCounter,
    pub dlq_total: IntCounterVec,
    pub stream_length: IntGauge,
    pub pending_messages: IntGauge,

    pub events_exported: IntCounterVec,
    pub export_errors: IntCounterVec,

    pub risk_events_by_band: IntCounterVec,
    pub risk_last_score: prometheus::GaugeVec,

    pub warning_outcome_set_total: IntCounterVec,
    pub warning_outcome_lead_time: Histogram,
    pub warning_latency: Histogram,
    pub warning_suppressed_total: IntCounter,

    pub auth_failures_total: IntCounterVec,
    pub rate_limit_denials_total: IntCounterVec,
    pub backpressure_warnings_total: IntCounter,

    pub dep_up: IntGaugeVec,
}

impl Metrics {
    pub fn new() -> Self {
        let registry = Registry::new();

        let ingest_accepted_total = IntCounterVec::new(
            Opts::new("paysentry_ingest_accepted_total", "Accepted ingest requests"),
            &["processor"],
        )
        .unwrap();
        let ingest_rejected_total = IntCounterVec::new(
            Opts::new("paysentry_ingest_rejected_total", "Rejected ingest requests"),
            &["reason"],
        )
        .unwrap();
        let ingest_duplicate_total =
            IntCounter::new("paysentry_ingest_duplicate_total", "Duplicate ingest requests").unwrap();
        let ingest_latency = Histogram::with_opts(HistogramOpts::new(
            "paysentry_ingest_latency_seconds",
            "Ingest handler latency",
        ))
        .unwrap();

        let consumer_processed_total =
            IntCounter::new("paysentry_consumer_processed_total", "Entries processed by the consumer loop").unwrap();
        let dlq_total = IntCounterVec::new(Opts::new("paysentry_dlq_total", "Entries quarantined to the DLQ"), &["reason"]).unwrap();
        let stream_length = IntGauge::new("paysentry_stream_length", "Primary stream length").unwrap();
        let pending_messages = IntGauge::new("paysentry_pending_messages", "Pending entries in the consumer group").unwrap();

        let events_exported = IntCounterVec::new(Opts::new("paysentry_events_exported_total", "Events exported"), &["destination"]).unwrap();
        let export_errors = IntCounterVec::new(Opts::new("paysentry_export_errors_total", "Export write failures"), &["destination", "reason"]).unwrap();

        let risk_events_by_band = IntCounterVec::new(Opts::new("paysentry_risk_events_by_band_total", "Events scored by band"), &["processor", "band"]).unwrap();
        let risk_last_score = prometheus::GaugeVec::new(Opts::new("paysentry_risk_last_score", "Most recent risk score"), &["processor"]).unwrap();

        let warning_outcome_set_total = IntCounterVec::new(Opts::new("paysentry_warning_outcome_set_total", "Outcome annotations recorded"), &["type", "source"]).unwrap();
        let warning_outcome_lead_time = Histogram::with_opts(HistogramOpts::new("paysentry_warning_outcome_lead_time_seconds", "Lead time between warning and observed outcome")).unwrap();
        let warning_latency = Histogram::with_opts(HistogramOpts::new("paysentry_warning_latency_seconds", "Latency between event timestamp and warning creation")).unwrap();
        let warning_suppressed_total = IntCounter::new("paysentry_warning_suppressed_total", "Warnings suppressed because warnings are disabled").unwrap();

        let auth_failures_total = IntCounterVec::new(Opts::new("paysentry_auth_failures_total", "Rejected authentication attempts"), &["reason"]).unwrap();
        let rate_limit_denials_total = IntCounterVec::new(Opts::new("paysentry_rate_limit_denials_total", "Rate limit rejections"), &["endpoint"]).unwrap();
        let backpressure_warnings_total = IntCounter::new("paysentry_backpressure_warnings_total", "Backpressure threshold breaches observed").unwrap();

        let dep_up = IntGaugeVec::new(Opts::new("paysentry_dependency_up", "Dependency health (1=up, 0=down)"), &["dependency"]).unwrap();

        for c in [&ingest_duplicate_total, &consumer_processed_total, &warning_suppressed_total, &backpressure_warnings_total] {
            registry.register(Box::new(c.clone())).unwrap();
        }
        for g in [&stream_length, &pending_messages] {
            registry.register(Box::new(g.clone())).unwrap();
        }
        for h in [&ingest_latency, &warning_outcome_lead_time, &warning_latency] {
            registry.register(Box::new(h.clone())).unwrap();
        }
        registry.register(Box::new(ingest_accepted_total.clone())).unwrap();
        registry.register(Box::new(ingest_rejected_total.clone())).unwrap();
        registry.register(Box::new(dlq_total.clone())).unwrap();
        registry.register(Box::new(events_exported.clone())).unwrap();
        registry.register(Box::new(export_errors.clone())).unwrap();
        registry.register(Box::new(risk_events_by_band.clone())).unwrap();
        registry.register(Box::new(risk_last_score.clone())).unwrap();
        registry.register(Box::new(warning_outcome_set_total.clone())).unwrap();
        registry.register(Box::new(auth_failures_total.clone())).unwrap();
        registry.register(Box::new(rate_limit_denials_total.clone())).unwrap();
        registry.register(Box::new(dep_up.clone())).unwrap();

        Self {
            registry,
            ingest_accepted_total,
            ingest_rejected_total,
            ingest_duplicate_total,
            ingest_latency,
            consumer_processed_total,
            dlq_total,
            stream_length,
            pending_messages,
            events_exported,
            export_errors,
            risk_events_by_band,
            risk_last_score,
            warning_outcome_set_total,
            warning_outcome_lead_time,
            warning_latency,
            warning_suppressed_total,
            auth_failures_total,
            rate_limit_denials_total,
            backpressure_warnings_total,
            dep_up,
        }
    }

    pub fn render(&self) -> String {
        let encoder = TextEncoder::new();
        let families = self.registry.gather();
        let mut buf = Vec::new();
        encoder.encode(&families, &mut buf).unwrap();
        String::from_utf8(buf).unwrap_or_default()
    }
}

impl Default for Metrics {
    fn default() -> Self {
        Self::new()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn render_includes_registered_families() {
        let metrics = Metrics::new();
        metrics.ingest_duplicate_total.inc();
        let rendered = metrics.render();
        assert!(rendered.contains("paysentry_ingest_duplicate_total"));
    }
}
