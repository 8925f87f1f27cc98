//! Wire and domain types shared across the ingest, consumer, scoring, and
//! export stages. Kept dependency-free (no `AppState`, no I/O) so every
//! other module can import from here without a cycle.

use serde::{Deserialize, Serialize};

/// Enumerated upstream payment processors. Anything else is a validation
/// rejection at ingest time.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Processor {
    Stripe,
    Adyen,
    Checkout,
    Internal,
}

impl Processor {
    pub fn as_str(&self) -> &'static str {
        match self {
            Processor::Stripe => "stripe",
            Processor::Adyen => "adyen",
            Processor::Checkout => "checkout",
            Processor::Internal => "internal",
        }
    }

    pub fn parse(s: &str) -> Option<Self> {
        match s {
            "stripe" => Some(Processor::Stripe),
            "adyen" => Some(Processor::Adyen),
            "checkout" => Some(Processor::Checkout),
            "internal" => Some(Processor::Internal),
            _ => None,
        }
    }
}

/// Inbound payment-failure event, already past structural validation.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Event {
    pub event_id: String,
    pub event_timestamp: String,
    pub event_type: String,
    pub processor: String,

    #[serde(skip_serializing_if = "Option::is_none")]
    pub merchant_id_hash: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub payment_intent_id_hash: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub failure_category: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub geo_bucket: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub retry_count: Option<i64>,

    /// Opaque bucket fields the ingest layer does not interpret:
    /// amount, method, channel, source, retry_result, failure_origin, ...
    #[serde(flatten)]
    pub extra: serde_json::Map<String, serde_json::Value>,
}

/// Reasons a queue entry can be quarantined to the DLQ. Closed set — never
/// extend with a free-form string.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum DlqReason {
    MaxRetriesExceeded,
    MissingDataField,
    InvalidDataType,
    UnmarshalFailed,
}

impl DlqReason {
    pub fn as_str(&self) -> &'static str {
        match self {
            DlqReason::MaxRetriesExceeded => "max_retries_exceeded",
            DlqReason::MissingDataField => "missing_data_field",
            DlqReason::InvalidDataType => "invalid_data_type",
            DlqReason::UnmarshalFailed => "unmarshal_failed",
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct DlqEntry {
    pub data: String,
    pub original_id: String,
    pub reason: String,
    pub timestamp: String,
}

/// Categorical risk level.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum RiskBand {
    Low,
    Elevated,
    High,
    Critical,
}

impl RiskBand {
    pub fn as_str(&self) -> &'static str {
        match self {
            RiskBand::Low => "low",
            RiskBand::Elevated => "elevated",
            RiskBand::High => "high",
            RiskBand::Critical => "critical",
        }
    }

    /// Parses a band string, defaulting unrecognised values to `Low` rather
    /// than failing — callers summarising historical data should degrade
    /// gracefully, not reject.
    pub fn parse(s: &str) -> Self {
        match s {
            "elevated" => RiskBand::Elevated,
            "high" => RiskBand::High,
            "critical" => RiskBand::Critical,
            _ => RiskBand::Low,
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct RiskTrajectory {
    pub multiplier: f64,
    pub direction: String,
    pub current_fr: f64,
    pub baseline_fr: f64,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct RiskScore {
    pub score: f64,
    pub band: RiskBand,
    pub drivers: Vec<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub trajectory: Option<RiskTrajectory>,
}

/// A persistent record for a non-low scored event, annotated later with an
/// observed outcome. See SPEC_FULL §3 Warning.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Warning {
    pub warning_id: String,
    pub event_id: String,
    pub processor: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub merchant_id_hash: Option<String>,
    pub processed_at: String,
    pub risk_score: f64,
    pub risk_band: String,
    pub risk_drivers: Vec<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub playbook_context: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub risk_trajectory: Option<RiskTrajectory>,

    pub outcome_observed: bool,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub outcome_type: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub outcome_timestamp: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub outcome_source: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub outcome_notes: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub outcome_updated_at: Option<String>,
}

pub const VALID_OUTCOME_TYPES: &[&str] = &[
    "throttle",
    "review",
    "hold",
    "auth_degradation",
    "rate_limit",
    "other",
    "none",
];

pub const VALID_OUTCOME_SOURCES: &[&str] = &["manual", "stripe_webhook", "adyen_webhook", "other"];

pub fn is_valid_outcome_type(t: &str) -> bool {
    VALID_OUTCOME_TYPES.contains(&t)
}

pub fn is_valid_outcome_source(s: &str) -> bool {
    VALID_OUTCOME_SOURCES.contains(&s)
}

/// Superset of the source Event emitted to downstream sinks. Field order
/// is stable per SPEC_FULL §6 Outbound export schema.
#[derive(Debug, Clone, Serialize)]
pub struct ExportRecord {
    pub event_id: String,
    pub event_type: String,
    pub event_timestamp: String,
    pub processor: String,
    pub stream_message_id: String,
    pub consumer_name: String,
    pub processed_at: String,

    #[serde(skip_serializing_if = "Option::is_none")]
    pub processor_risk_score: Option<f64>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub processor_risk_band: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub processor_risk_drivers: Option<Vec<String>>,

    #[serde(skip_serializing_if = "Option::is_none")]
    pub upgrade_hint: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub processor_playbook_context: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub risk_trajectory: Option<RiskTrajectory>,
}

/// Outcome annotation "proof capture" line emitted to stdout by 4.L.
#[derive(Debug, Clone, Serialize)]
pub struct PilotOutcomeAnnotation {
    #[serde(rename = "type")]
    pub kind: &'static str,
    pub warning_id: String,
    pub event_id: String,
    pub processor: String,
    pub risk_band: String,
    pub risk_score: f64,
    pub warning_at: String,
    pub outcome_type: String,
    pub outcome_timestamp: String,
    pub outcome_source: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub outcome_notes: Option<String>,
    pub lead_time_seconds: i64,
    pub annotated_at: String,
}
