//! Ambient configuration load (SPEC_FULL §4.M). `AppConfig::from_env` is a
//! best-effort parse with defaults; `validate::validate` (run once at boot,
//! before `from_env`'s output is trusted) is the authoritative gate.

use std::env;

#[derive(Debug, Clone)]
pub struct AppConfig {
    pub api_keys: Vec<String>,
    pub revoked_keys: Vec<String>,

    pub redis_addr: String,
    pub redis_password: Option<String>,
    pub stream_key: String,
    pub dlq_stream_key: String,
    pub group_name: String,
    pub consumer_name: Option<String>,

    pub export_mode: String, // stdout | file | both
    pub export_file_path: Option<String>,

    pub tier: String, // tier1 | tier2
    pub tier2_enabled: bool,
    pub ingest_enabled: bool,
    pub warnings_enabled: bool,
    pub pilot_mode: bool,

    pub environment: String, // dev | prod
    pub panic_mode: String,  // crash | recover

    pub ingest_rl_per_min: u32,
    pub ingest_rl_burst: u32,
    pub outcome_rl_per_min: u32,
    pub outcome_rl_burst: u32,

    pub backpressure_threshold: u64,
    pub stream_max_len: Option<u64>,
    pub raw_event_ttl_days: u64,

    pub risk_scoring_enabled: bool,
    pub risk_threshold_elevated: f64,
    pub risk_threshold_high: f64,
    pub risk_threshold_critical: f64,
    pub risk_window_sec: u64,

    pub warning_store_capacity: usize,

    pub host: String,
    pub port: u16,

    pub tier_membership_path: Option<String>,
    pub tier_entitlements_path: Option<String>,
    pub signal_definitions_path: Option<String>,

    pub conn_limit_enabled: bool,
}

fn env_or(key: &str, default: &str) -> String {
    env::var(key).unwrap_or_else(|_| default.to_string())
}

fn env_bool(key: &str, default: bool) -> bool {
    match env::var(key) {
        Ok(v) => matches!(v.to_lowercase().as_str(), "1" | "true" | "yes" | "on"),
        Err(_) => default,
    }
}

fn csv_list(raw: &str) -> Vec<String> {
    raw.split(',')
        .map(|s| s.trim().to_string())
        .filter(|s| !s.is_empty())
        .collect()
}

impl AppConfig {
    pub fn from_env() -> Result<Self, String> {
        dotenvy::dotenv().ok();

        let parse_f64 = |key: &str, default: &str| -> Result<f64, String> {
            env_or(key, default).parse::<f64>().map_err(|e| format!("{key}: {e}"))
        };
        let parse_u64 = |key: &str, default: &str| -> Result<u64, String> {
            env_or(key, default).parse::<u64>().map_err(|e| format!("{key}: {e}"))
        };
        let parse_u32 = |key: &str, default: &str| -> Result<u32, String> {
            env_or(key, default).parse::<u32>().map_err(|e| format!("{key}: {e}"))
        };

        Ok(Self {
            api_keys: csv_list(&env_or("PAYSENTRY_API_KEYS", &env_or("PAYSENTRY_API_KEY", ""))),
            revoked_keys: csv_list(&env_or("PAYSENTRY_REVOKED_KEYS", "")),

            redis_addr: env_or("REDIS_ADDR", "127.0.0.1:6379"),
            redis_password: env::var("REDIS_PASSWORD").ok().filter(|s| !s.is_empty()),
            stream_key: env_or("STREAM_KEY", "payment_exhaust_events"),
            dlq_stream_key: env_or("DLQ_STREAM_KEY", "payment_exhaust_events.dlq"),
            group_name: env_or("GROUP_NAME", "paysentry-consumers"),
            consumer_name: env::var("CONSUMER_NAME").ok().filter(|s| !s.is_empty()),

            export_mode: env_or("EXPORT_MODE", "stdout"),
            export_file_path: env::var("EXPORT_FILE_PATH").ok().filter(|s| !s.is_empty()),

            tier: env_or("TIER", "tier1"),
            tier2_enabled: env_bool("TIER2_ENABLED", false),
            ingest_enabled: env_bool("INGEST_ENABLED", true),
            warnings_enabled: env_bool("WARNINGS_ENABLED", true),
            pilot_mode: env_bool("PILOT_MODE", true),

            environment: env_or("ENVIRONMENT", "dev"),
            panic_mode: env_or("PANIC_MODE", "crash"),

            ingest_rl_per_min: parse_u32("INGEST_RL_PER_MIN", "6000")?,
            ingest_rl_burst: parse_u32("INGEST_RL_BURST", "200")?,
            outcome_rl_per_min: parse_u32("OUTCOME_RL_PER_MIN", "60")?,
            outcome_rl_burst: parse_u32("OUTCOME_RL_BURST", "10")?,

            backpressure_threshold: parse_u64("BACKPRESSURE_THRESHOLD", "10000")?,
            stream_max_len: env::var("STREAM_MAX_LEN").ok().and_then(|s| s.parse().ok()),
            raw_event_ttl_days: parse_u64("RAW_EVENT_TTL_DAYS", "7")?,

            risk_scoring_enabled: env_bool("RISK_SCORING_ENABLED", true),
            risk_threshold_elevated: parse_f64("RISK_THRESHOLD_ELEVATED", "0.3")?,
            risk_threshold_high: parse_f64("RISK_THRESHOLD_HIGH", "0.6")?,
            risk_threshold_critical: parse_f64("RISK_THRESHOLD_CRITICAL", "0.8")?,
            risk_window_sec: parse_u64("RISK_WINDOW_SEC", "300")?,

            warning_store_capacity: env_or("WARNING_STORE_CAPACITY", "1000")
                .parse()
                .map_err(|e| format!("WARNING_STORE_CAPACITY: {e}"))?,

            host: env_or("HOST", "0.0.0.0"),
            port: env_or("PORT", "8080").parse().map_err(|e| format!("PORT: {e}"))?,

            tier_membership_path: env::var("TIER_MEMBERSHIP_PATH").ok(),
            tier_entitlements_path: env::var("TIER_ENTITLEMENTS_PATH").ok(),
            signal_definitions_path: env::var("SIGNAL_DEFINITIONS_PATH").ok(),

            conn_limit_enabled: env_bool("CONN_LIMIT_ENABLED", false),
        })
    }
}

/// Fixed, sorted list of env keys that feed the config fingerprint (§4.A).
/// Sorted order is asserted by a test so fingerprint byte-stability can
/// never silently drift from this list.
pub const FINGERPRINT_ENV_KEYS: &[&str] = &[
    "BACKPRESSURE_THRESHOLD",
    "CONN_LIMIT_ENABLED",
    "DLQ_STREAM_KEY",
    "ENVIRONMENT",
    "EXPORT_FILE_PATH",
    "EXPORT_MODE",
    "GROUP_NAME",
    "HOST",
    "INGEST_ENABLED",
    "INGEST_RL_BURST",
    "INGEST_RL_PER_MIN",
    "OUTCOME_RL_BURST",
    "OUTCOME_RL_PER_MIN",
    "PANIC_MODE",
    "PAYSENTRY_API_KEYS",
    "PAYSENTRY_REVOKED_KEYS",
    "PILOT_MODE",
    "PORT",
    "RAW_EVENT_TTL_DAYS",
    "REDIS_ADDR",
    "REDIS_PASSWORD",
    "RISK_SCORING_ENABLED",
    "RISK_THRESHOLD_CRITICAL",
    "RISK_THRESHOLD_ELEVATED",
    "RISK_THRESHOLD_HIGH",
    "RISK_WINDOW_SEC",
    "STREAM_KEY",
    "STREAM_MAX_LEN",
    "TIER",
    "TIER2_ENABLED",
    "WARNING_STORE_CAPACITY",
    "WARNINGS_ENABLED",
];

/// Secret-bearing keys redacted in any summary/diagnostic view of the
/// fingerprint inputs (never in the hash itself).
pub const SECRET_ENV_KEYS: &[&str] = &["PAYSENTRY_API_KEYS", "PAYSENTRY_REVOKED_KEYS", "REDIS_PASSWORD"];

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn fingerprint_keys_are_sorted() {
        let mut sorted = FINGERPRINT_ENV_KEYS.to_vec();
        sorted.sort();
        assert_eq!(FINGERPRINT_ENV_KEYS, sorted.as_slice(), "fingerprint key list must stay sorted");
    }
}
