//! Evidence envelope (SPEC_FULL §4.I). A pure, deterministic read-side
//! transform: the same raw inputs and the same `now` always canonicalise to
//! the same byte sequence, regardless of original key order. Counters
//! (`degraded`, `drop`, `contract_violation`) and `lastGoodAt` are the only
//! process-wide side effect; the returned `Envelope` itself carries none of
//! that state.

use crate::models::{RiskBand, Warning};
use chrono::{DateTime, Utc};
use serde::Serialize;
use serde_json::Value;
use std::collections::HashMap;
use std::sync::atomic::{AtomicI64, AtomicU64, Ordering};
use std::sync::Mutex;

/// Prototype-pollution-class keys, stripped from canonicalised payloads at
/// every depth and rejected as record/entity identifiers outright.
pub const FORBIDDEN_KEYS: &[&str] = &["__proto__", "proto", "constructor", "prototype", "toString", "valueOf"];

const SCHEMA_VERSION: u32 = 1;
const MAX_COLLECTION_LEN: usize = 5000;

fn is_forbidden(key: &str) -> bool {
    FORBIDDEN_KEYS.contains(&key)
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "lowercase")]
pub enum Severity {
    Neutral,
    Info,
    Warning,
    Critical,
    Success,
    Error,
}

impl Severity {
    fn parse(raw: &str) -> Self {
        match raw.trim().to_lowercase().as_str() {
            "info" => Severity::Info,
            "warning" => Severity::Warning,
            "critical" => Severity::Critical,
            "success" => Severity::Success,
            "error" => Severity::Error,
            _ => Severity::Neutral,
        }
    }

    fn for_band(band: RiskBand) -> Self {
        match band {
            RiskBand::Low => Severity::Info,
            RiskBand::Elevated | RiskBand::High => Severity::Warning,
            RiskBand::Critical => Severity::Critical,
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "UPPERCASE")]
pub enum SourceStatus {
    Ok,
    Degraded,
}

#[derive(Debug, Clone, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct Meta {
    pub source_status: SourceStatus,
    pub diagnostics: Vec<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub last_good_at: Option<String>,
}

#[derive(Debug, Clone, Serialize)]
pub struct Merchant {
    pub id: String,
    pub severity: Severity,
    pub vol: u64,
}

#[derive(Debug, Clone, Serialize)]
pub struct Artifact {
    pub id: String,
    pub timestamp: String,
    pub severity: Severity,
    pub data: Value,
}

#[derive(Debug, Clone, Serialize)]
pub struct Payload {
    pub merchants: Vec<Merchant>,
    pub artifacts: Vec<Artifact>,
    pub narratives: Vec<Artifact>,
    pub system_state: Value,
}

#[derive(Debug, Clone, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct Envelope {
    pub schema_version: u32,
    pub generated_at: String,
    pub meta: Meta,
    pub payload: Payload,
}

/// Raw, not-yet-canonicalised record fed into the envelope builder.
#[derive(Debug, Clone)]
pub struct RawRecord {
    pub id: String,
    pub entity_id: Option<String>,
    pub timestamp: String,
    pub severity: String,
    pub data: Value,
}

#[derive(Debug, Clone)]
pub struct RawMerchant {
    pub id: String,
    pub band: RiskBand,
    pub vol: u64,
}

/// Summarises the current warning store into one synthesised merchant per
/// distinct `merchant_id_hash`, severity taken from the highest risk band
/// observed for that hash. This system carries no standalone merchant
/// directory (that is an external collaborator, out of scope per §1), so
/// the warning store is the only faithful source for this collection.
pub fn merchants_from_warnings(warnings: &[Warning]) -> Vec<RawMerchant> {
    let mut acc: HashMap<String, (RiskBand, u64)> = HashMap::new();
    for w in warnings {
        let Some(hash) = w.merchant_id_hash.clone() else { continue };
        let band = RiskBand::parse(&w.risk_band);
        let entry = acc.entry(hash).or_insert((RiskBand::Low, 0));
        entry.1 += 1;
        if band > entry.0 {
            entry.0 = band;
        }
    }
    acc.into_iter().map(|(id, (band, vol))| RawMerchant { id, band, vol }).collect()
}

/// Process-wide evidence pipeline health counters (SPEC_FULL §5: "Evidence
/// counters ... and `lastGoodAt` are atomics").
pub struct EvidenceCounters {
    pub degraded_total: AtomicU64,
    pub drop_total: AtomicU64,
    pub contract_violation_total: AtomicU64,
    last_good_at_unix: AtomicI64,
    last_diagnostics: Mutex<Vec<String>>,
}

impl Default for EvidenceCounters {
    fn default() -> Self {
        Self {
            degraded_total: AtomicU64::new(0),
            drop_total: AtomicU64::new(0),
            contract_violation_total: AtomicU64::new(0),
            last_good_at_unix: AtomicI64::new(0),
            last_diagnostics: Mutex::new(Vec::new()),
        }
    }
}

impl EvidenceCounters {
    pub fn snapshot(&self) -> EvidenceHealth {
        let last_good = self.last_good_at_unix.load(Ordering::Relaxed);
        EvidenceHealth {
            degraded_total: self.degraded_total.load(Ordering::Relaxed),
            drop_total: self.drop_total.load(Ordering::Relaxed),
            contract_violation_total: self.contract_violation_total.load(Ordering::Relaxed),
            last_good_at: if last_good > 0 {
                DateTime::from_timestamp(last_good, 0).map(|d| d.to_rfc3339())
            } else {
                None
            },
            last_diagnostics: self.last_diagnostics.lock().unwrap().clone(),
        }
    }
}

#[derive(Debug, Clone, Serialize)]
pub struct EvidenceHealth {
    pub degraded_total: u64,
    pub drop_total: u64,
    pub contract_violation_total: u64,
    pub last_good_at: Option<String>,
    pub last_diagnostics: Vec<String>,
}

/// Builds the canonical envelope from raw inputs, bumping `counters` as a
/// side effect. The returned `Envelope` is a pure function of
/// `(merchants, artifacts, narratives, system_state, now)`.
#[allow(clippy::too_many_arguments)]
pub fn build_envelope(
    merchants: Vec<RawMerchant>,
    artifacts: Vec<RawRecord>,
    narratives: Vec<RawRecord>,
    system_state: Value,
    now: DateTime<Utc>,
    counters: &EvidenceCounters,
) -> Envelope {
    let mut diagnostics = Vec::new();
    let mut degraded = false;
    let mut drops = 0u64;
    let mut contract_violations = 0u64;

    let mut merchants: Vec<Merchant> = merchants
        .into_iter()
        .filter_map(|m| {
            if is_forbidden(&m.id) {
                diagnostics.push(format!("dropped merchant {}: forbidden id", m.id));
                degraded = true;
                drops += 1;
                contract_violations += 1;
                return None;
            }
            Some(Merchant { id: m.id, severity: Severity::for_band(m.band), vol: m.vol })
        })
        .collect();

    let mut artifacts = filter_records("artifact", artifacts, &mut diagnostics, &mut degraded, &mut drops, &mut contract_violations);
    let mut narratives = filter_records("narrative", narratives, &mut diagnostics, &mut degraded, &mut drops, &mut contract_violations);

    merchants.sort_by(|a, b| a.id.cmp(&b.id));
    artifacts.sort_by(|a, b| b.timestamp.cmp(&a.timestamp).then_with(|| b.id.cmp(&a.id)));
    narratives.sort_by(|a, b| b.timestamp.cmp(&a.timestamp).then_with(|| b.id.cmp(&a.id)));

    merchants.truncate(MAX_COLLECTION_LEN);
    artifacts.truncate(MAX_COLLECTION_LEN);
    narratives.truncate(MAX_COLLECTION_LEN);

    let source_status = if degraded { SourceStatus::Degraded } else { SourceStatus::Ok };

    counters.drop_total.fetch_add(drops, Ordering::Relaxed);
    counters.contract_violation_total.fetch_add(contract_violations, Ordering::Relaxed);
    if degraded {
        counters.degraded_total.fetch_add(1, Ordering::Relaxed);
    } else {
        counters.last_good_at_unix.store(now.timestamp(), Ordering::Relaxed);
    }
    *counters.last_diagnostics.lock().unwrap() = diagnostics.clone();

    let last_good_at = {
        let unix = counters.last_good_at_unix.load(Ordering::Relaxed);
        if unix > 0 {
            DateTime::from_timestamp(unix, 0).map(|d| d.to_rfc3339())
        } else {
            None
        }
    };

    Envelope {
        schema_version: SCHEMA_VERSION,
        generated_at: now.to_rfc3339(),
        meta: Meta { source_status, diagnostics, last_good_at },
        payload: Payload {
            merchants,
            artifacts,
            narratives,
            system_state: canonicalize_value(system_state),
        },
    }
}

fn filter_records(
    kind: &str,
    records: Vec<RawRecord>,
    diagnostics: &mut Vec<String>,
    degraded: &mut bool,
    drops: &mut u64,
    contract_violations: &mut u64,
) -> Vec<Artifact> {
    let mut out = Vec::with_capacity(records.len());
    for r in records {
        if is_forbidden(&r.id) || r.entity_id.as_deref().map(is_forbidden).unwrap_or(false) {
            diagnostics.push(format!("dropped {kind} {}: forbidden id", r.id));
            *degraded = true;
            *drops += 1;
            *contract_violations += 1;
            continue;
        }
        let timestamp = match DateTime::parse_from_rfc3339(&r.timestamp) {
            Ok(dt) => dt.with_timezone(&Utc).to_rfc3339(),
            Err(_) => {
                diagnostics.push(format!("dropped {kind} {}: unparseable timestamp", r.id));
                *degraded = true;
                *drops += 1;
                continue;
            }
        };
        out.push(Artifact {
            id: r.id,
            timestamp,
            severity: Severity::parse(&r.severity),
            data: canonicalize_value(r.data),
        });
    }
    out
}

/// Recursively strips forbidden keys and relies on `serde_json::Map`'s
/// default `BTreeMap` backing (this crate does not enable the
/// `preserve_order` feature) to produce lexicographically sorted keys on
/// serialisation — no explicit sort step is needed here.
fn canonicalize_value(value: Value) -> Value {
    match value {
        Value::Object(map) => {
            let mut out = serde_json::Map::new();
            for (k, v) in map {
                if is_forbidden(&k) {
                    continue;
                }
                out.insert(k, canonicalize_value(v));
            }
            Value::Object(out)
        }
        Value::Array(items) => Value::Array(items.into_iter().map(canonicalize_value).collect()),
        other => other,
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    fn rec(id: &str, ts: &str) -> RawRecord {
        RawRecord {
            id: id.to_string(),
            entity_id: None,
            timestamp: ts.to_string(),
            severity: "WARNING".to_string(),
            data: json!({"b": 1, "a": 2}),
        }
    }

    #[test]
    fn determinism_across_two_builds() {
        let counters = EvidenceCounters::default();
        let now = DateTime::parse_from_rfc3339("2026-02-01T00:00:00Z").unwrap().with_timezone(&Utc);
        let artifacts = vec![rec("a1", "2026-01-01T00:00:00Z"), rec("a2", "2026-01-02T00:00:00Z")];

        let e1 = build_envelope(vec![], artifacts.clone(), vec![], json!({}), now, &counters);
        let e2 = build_envelope(vec![], artifacts, vec![], json!({}), now, &counters);

        assert_eq!(serde_json::to_string(&e1).unwrap(), serde_json::to_string(&e2).unwrap());
    }

    #[test]
    fn canonicalisation_sorts_nested_keys() {
        let counters = EvidenceCounters::default();
        let now = Utc::now();
        let artifacts = vec![rec("a1", "2026-01-01T00:00:00Z")];
        let envelope = build_envelope(vec![], artifacts, vec![], json!({}), now, &counters);
        let rendered = serde_json::to_string(&envelope.payload.artifacts[0].data).unwrap();
        assert!(rendered.find("\"a\"").unwrap() < rendered.find("\"b\"").unwrap());
    }

    #[test]
    fn scenario_s7_bad_timestamp_degrades_and_drops() {
        let counters = EvidenceCounters::default();
        let now = Utc::now();
        let artifacts = vec![rec("good", "2026-01-01T00:00:00Z"), rec("bad", "not-a-date")];
        let envelope = build_envelope(vec![], artifacts, vec![], json!({}), now, &counters);

        assert_eq!(envelope.meta.source_status, SourceStatus::Degraded);
        assert!(envelope.meta.diagnostics.iter().any(|d| d.contains("dropped artifact bad")));
        assert_eq!(envelope.payload.artifacts.len(), 1);
        assert_eq!(envelope.payload.artifacts[0].id, "good");
        assert_eq!(counters.drop_total.load(Ordering::Relaxed), 1);
    }

    #[test]
    fn forbidden_keys_stripped_at_every_depth() {
        let counters = EvidenceCounters::default();
        let now = Utc::now();
        let mut r = rec("a1", "2026-01-01T00:00:00Z");
        r.data = json!({"__proto__": {"x": 1}, "nested": {"constructor": "evil", "ok": 1}});
        let envelope = build_envelope(vec![], vec![r], vec![], json!({}), now, &counters);
        let rendered = serde_json::to_string(&envelope.payload.artifacts[0].data).unwrap();
        assert!(!rendered.contains("__proto__"));
        assert!(!rendered.contains("constructor"));
        assert!(rendered.contains("\"ok\":1"));
    }

    #[test]
    fn forbidden_record_id_is_dropped_not_included() {
        let counters = EvidenceCounters::default();
        let now = Utc::now();
        let r = rec("__proto__", "2026-01-01T00:00:00Z");
        let envelope = build_envelope(vec![], vec![r], vec![], json!({}), now, &counters);
        assert!(envelope.payload.artifacts.is_empty());
        assert_eq!(counters.contract_violation_total.load(Ordering::Relaxed), 1);
    }

    #[test]
    fn sorts_artifacts_newest_first_with_id_tiebreak() {
        let counters = EvidenceCounters::default();
        let now = Utc::now();
        let artifacts = vec![rec("z", "2026-01-01T00:00:00Z"), rec("a", "2026-01-01T00:00:00Z"), rec("m", "2026-02-01T00:00:00Z")];
        let envelope = build_envelope(vec![], artifacts, vec![], json!({}), now, &counters);
        let ids: Vec<&str> = envelope.payload.artifacts.iter().map(|a| a.id.as_str()).collect();
        assert_eq!(ids, vec!["m", "z", "a"]);
    }

    #[test]
    fn merchants_from_warnings_takes_highest_band() {
        let mut w1 = sample_warning("w1");
        w1.merchant_id_hash = Some("m1".to_string());
        w1.risk_band = "elevated".to_string();
        let mut w2 = sample_warning("w2");
        w2.merchant_id_hash = Some("m1".to_string());
        w2.risk_band = "critical".to_string();

        let raw = merchants_from_warnings(&[w1, w2]);
        assert_eq!(raw.len(), 1);
        assert_eq!(raw[0].band, RiskBand::Critical);
        assert_eq!(raw[0].vol, 2);
    }

    fn sample_warning(id: &str) -> Warning {
        Warning {
            warning_id: id.to_string(),
            event_id: format!("evt-{id}"),
            processor: "stripe".to_string(),
            merchant_id_hash: None,
            processed_at: "2026-01-01T00:00:00Z".to_string(),
            risk_score: 0.5,
            risk_band: "elevated".to_string(),
            risk_drivers: vec![],
            playbook_context: None,
            risk_trajectory: None,
            outcome_observed: false,
            outcome_type: None,
            outcome_timestamp: None,
            outcome_source: None,
            outcome_notes: None,
            outcome_updated_at: None,
        }
    }
}
