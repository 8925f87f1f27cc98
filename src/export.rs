//! Export pipeline (SPEC_FULL §4.H). Builds the export record, applies
//! tier-gated enrichment, optionally raises a Warning, and fans out to
//! every enabled sink.

use crate::errors::SinkError;
use crate::metrics::Metrics;
use crate::models::{Event, ExportRecord, RiskScore, Warning};
use crate::risk::RiskScorer;
use crate::warnings::WarningStore;
use chrono::{DateTime, Utc};
use std::fs::OpenOptions;
use std::io::Write;
use std::sync::atomic::{AtomicI64, Ordering};
use std::sync::Mutex;

/// The export pipeline's only polymorphism point (SPEC_FULL §9): a
/// destination that can accept a line of already-serialised JSON.
pub trait ExportSink: Send + Sync {
    fn name(&self) -> &'static str;
    fn write(&self, line: &[u8]) -> Result<(), SinkError>;
}

pub struct StdoutSink;

impl ExportSink for StdoutSink {
    fn name(&self) -> &'static str {
        "stdout"
    }

    fn write(&self, line: &[u8]) -> Result<(), SinkError> {
        let mut out = std::io::stdout().lock();
        out.write_all(line)?;
        out.write_all(b"\n")?;
        out.flush()?;
        Ok(())
    }
}

pub struct FileSink {
    writer: Mutex<std::io::BufWriter<std::fs::File>>,
}

impl FileSink {
    pub fn open(path: &str) -> Result<Self, SinkError> {
        let file = OpenOptions::new().create(true).append(true).open(path)?;
        Ok(Self {
            writer: Mutex::new(std::io::BufWriter::new(file)),
        })
    }
}

impl ExportSink for FileSink {
    fn name(&self) -> &'static str {
        "file"
    }

    fn write(&self, line: &[u8]) -> Result<(), SinkError> {
        let mut w = self.writer.lock().unwrap();
        w.write_all(line)?;
        w.write_all(b"\n")?;
        w.flush()?;
        Ok(())
    }
}

pub struct SinkHealth {
    pub last_success_unix: AtomicI64,
    pub last_error_unix: AtomicI64,
    pub last_error_reason: Mutex<Option<String>>,
}

impl Default for SinkHealth {
    fn default() -> Self {
        Self {
            last_success_unix: AtomicI64::new(0),
            last_error_unix: AtomicI64::new(0),
            last_error_reason: Mutex::new(None),
        }
    }
}

pub struct ExportPipeline {
    pub sinks: Vec<Box<dyn ExportSink>>,
    pub health: Vec<SinkHealth>,
    pub tier: String,
    pub tier2_enabled: bool,
    pub risk_scoring_enabled: bool,
    pub warnings_enabled: bool,
    pub pilot_mode: bool,
}

pub struct ExportOutcome {
    pub record: ExportRecord,
    pub warning: Option<Warning>,
}

impl ExportPipeline {
    pub fn new(sinks: Vec<Box<dyn ExportSink>>, tier: String, tier2_enabled: bool, risk_scoring_enabled: bool, warnings_enabled: bool, pilot_mode: bool) -> Self {
        let health = sinks.iter().map(|_| SinkHealth::default()).collect();
        Self {
            sinks,
            health,
            tier,
            tier2_enabled,
            risk_scoring_enabled,
            warnings_enabled,
            pilot_mode,
        }
    }

    /// Runs the full per-event pipeline: score, tier-gate, optionally raise
    /// a warning, serialise, and fan out to every sink.
    #[allow(clippy::too_many_arguments)]
    pub fn process(
        &self,
        event: &Event,
        stream_message_id: &str,
        consumer_name: &str,
        scorer: Option<&RiskScorer>,
        warning_store: &WarningStore,
        metrics: &Metrics,
        now: DateTime<Utc>,
    ) -> ExportOutcome {
        let processed_at = now.to_rfc3339();

        let mut record = ExportRecord {
            event_id: event.event_id.clone(),
            event_type: event.event_type.clone(),
            event_timestamp: event.event_timestamp.clone(),
            processor: event.processor.clone(),
            stream_message_id: stream_message_id.to_string(),
            consumer_name: consumer_name.to_string(),
            processed_at: processed_at.clone(),
            processor_risk_score: None,
            processor_risk_band: None,
            processor_risk_drivers: None,
            upgrade_hint: None,
            processor_playbook_context: None,
            risk_trajectory: None,
        };

        let mut warning = None;

        let score: Option<RiskScore> = if self.risk_scoring_enabled {
            scorer.map(|s| {
                s.record_and_score(
                    &event.processor,
                    event.failure_category.as_deref(),
                    event.retry_count.unwrap_or(0),
                    event.geo_bucket.as_deref(),
                    now.timestamp().max(0) as u64,
                )
            })
        } else {
            None
        };

        if let Some(score) = &score {
            record.processor_risk_score = Some(score.score);
            record.processor_risk_band = Some(score.band.as_str().to_string());
            record.processor_risk_drivers = Some(score.drivers.clone());
            metrics.risk_events_by_band.with_label_values(&[&event.processor, score.band.as_str()]).inc();
            metrics.risk_last_score.with_label_values(&[&event.processor]).set(score.score);

            let is_low = score.band == crate::models::RiskBand::Low;

            if self.tier == "tier1" {
                record.upgrade_hint = if !is_low {
                    Some("Upgrade to tier 2 for trajectory and playbook context on elevated-risk events.".to_string())
                } else {
                    None
                };
            } else if self.tier == "tier2" && self.tier2_enabled {
                record.processor_playbook_context = Some(playbook_context(score));
                record.risk_trajectory = score.trajectory.clone();
            }

            if self.pilot_mode && !is_low {
                if self.warnings_enabled {
                    let w = Warning {
                        warning_id: stream_message_id.to_string(),
                        event_id: event.event_id.clone(),
                        processor: event.processor.clone(),
                        merchant_id_hash: event.merchant_id_hash.clone(),
                        processed_at: processed_at.clone(),
                        risk_score: score.score,
                        risk_band: score.band.as_str().to_string(),
                        risk_drivers: score.drivers.clone(),
                        playbook_context: record.processor_playbook_context.clone(),
                        risk_trajectory: score.trajectory.clone(),
                        outcome_observed: false,
                        outcome_type: None,
                        outcome_timestamp: None,
                        outcome_source: None,
                        outcome_notes: None,
                        outcome_updated_at: None,
                    };
                    warning_store.add(w.clone());
                    if let Ok(event_ts) = DateTime::parse_from_rfc3339(&event.event_timestamp) {
                        let latency = (now - event_ts.with_timezone(&Utc)).num_milliseconds();
                        if latency >= 0 {
                            metrics.warning_latency.observe(latency as f64 / 1000.0);
                        }
                    }
                    warning = Some(w);
                } else {
                    metrics.warning_suppressed_total.inc();
                }
            }
        }

        self.fan_out(&record, metrics);

        ExportOutcome { record, warning }
    }

    fn fan_out(&self, record: &ExportRecord, metrics: &Metrics) {
        let line = match serde_json::to_vec(record) {
            Ok(v) => v,
            Err(_) => return,
        };
        for (sink, health) in self.sinks.iter().zip(self.health.iter()) {
            match sink.write(&line) {
                Ok(()) => {
                    health.last_success_unix.store(chrono::Utc::now().timestamp(), Ordering::Relaxed);
                    metrics.events_exported.with_label_values(&[sink.name()]).inc();
                }
                Err(e) => {
                    health.last_error_unix.store(chrono::Utc::now().timestamp(), Ordering::Relaxed);
                    *health.last_error_reason.lock().unwrap() = Some(e.to_string());
                    metrics.export_errors.with_label_values(&[sink.name(), "write_failed"]).inc();
                }
            }
        }
    }
}

fn playbook_context(score: &RiskScore) -> String {
    format!(
        "Observed pattern suggests elevated failure pressure ({}); drivers: {}. This is a probabilistic signal, not a guarantee or recommendation.",
        score.band.as_str(),
        score.drivers.join(", ")
    )
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::atomic::AtomicUsize;

    struct CountingSink {
        calls: AtomicUsize,
        fail: bool,
    }

    impl ExportSink for CountingSink {
        fn name(&self) -> &'static str {
            "counting"
        }
        fn write(&self, _line: &[u8]) -> Result<(), SinkError> {
            self.calls.fetch_add(1, Ordering::SeqCst);
            if self.fail {
                Err(SinkError::Io(std::io::Error::new(std::io::ErrorKind::Other, "boom")))
            } else {
                Ok(())
            }
        }
    }

    fn sample_event() -> Event {
        Event {
            event_id: "11111111-1111-1111-1111-111111111111".to_string(),
            event_timestamp: chrono::Utc::now().to_rfc3339(),
            event_type: "payment_exhaust".to_string(),
            processor: "stripe".to_string(),
            merchant_id_hash: None,
            payment_intent_id_hash: None,
            failure_category: None,
            geo_bucket: None,
            retry_count: None,
            extra: serde_json::Map::new(),
        }
    }

    #[test]
    fn tier1_attaches_upgrade_hint_only_when_not_low() {
        let metrics = Metrics::new();
        let scorer = RiskScorer::new(300, crate::risk::RiskThresholds { elevated: 0.0, high: 0.6, critical: 0.8 });
        // warm up with enough events to clear the insufficient-data floor and trip elevated.
        for _ in 0..10 {
            scorer.record_and_score("stripe", Some("processor_timeout"), 2, Some("EU"), 1000);
        }
        let pipeline = ExportPipeline::new(vec![], "tier1".to_string(), false, true, false, false);
        let store = WarningStore::new(10);
        let outcome = pipeline.process(&sample_event(), "1-0", "consumer-1", Some(&scorer), &store, &metrics, chrono::Utc::now());
        assert!(outcome.record.upgrade_hint.is_some());
        assert!(outcome.record.processor_playbook_context.is_none());
    }

    #[test]
    fn export_error_is_recorded_on_health() {
        let metrics = Metrics::new();
        let pipeline = ExportPipeline {
            sinks: vec![Box::new(CountingSink { calls: AtomicUsize::new(0), fail: true })],
            health: vec![SinkHealth::default()],
            tier: "tier1".to_string(),
            tier2_enabled: false,
            risk_scoring_enabled: false,
            warnings_enabled: false,
            pilot_mode: false,
        };
        let store = WarningStore::new(10);
        pipeline.process(&sample_event(), "1-0", "consumer-1", None, &store, &metrics, chrono::Utc::now());
        assert!(pipeline.health[0].last_error_unix.load(Ordering::SeqCst) > 0);
    }
}
