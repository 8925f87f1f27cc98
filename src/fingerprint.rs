//! Deterministic config fingerprint (SPEC_FULL §4.A). SHA-256 over sorted
//! known env keys and the sorted contents of the fixed runtime JSON files.
//! Secrets are hashed but never shown back in the summary view.

use crate::config::{AppConfig, FINGERPRINT_ENV_KEYS, SECRET_ENV_KEYS};
use sha2::{Digest, Sha256};
use std::env;

#[derive(Debug, Clone)]
pub struct Fingerprint {
    pub hash: String,
    pub short: String,
}

pub fn compute(cfg: &AppConfig) -> Fingerprint {
    let mut hasher = Sha256::new();

    for key in FINGERPRINT_ENV_KEYS {
        match env::var(key) {
            Ok(value) => hasher.update(format!("{key}={value}\n").as_bytes()),
            Err(_) => hasher.update(format!("{key}\n").as_bytes()),
        };
    }

    let mut paths: Vec<&String> = [
        &cfg.tier_membership_path,
        &cfg.tier_entitlements_path,
        &cfg.signal_definitions_path,
    ]
    .into_iter()
    .flatten()
    .collect();
    paths.sort();

    for path in paths {
        match std::fs::read(path) {
            Ok(data) => {
                hasher.update(path.as_bytes());
                hasher.update(b":");
                hasher.update(&data);
                hasher.update(b"\n");
            }
            Err(e) => {
                hasher.update(format!("{path}:error:{e}\n").as_bytes());
            }
        }
    }

    let digest = hasher.finalize();
    let hash = hex::encode(digest);
    let short = hash[..12].to_string();
    Fingerprint { hash, short }
}

/// Redacted view of the fingerprint's env inputs: secret-bearing keys
/// collapse to a count or length marker, everything else renders verbatim.
/// Never touches the hash computation above.
pub fn env_summary() -> Vec<(String, String)> {
    FINGERPRINT_ENV_KEYS
        .iter()
        .map(|key| {
            let value = env::var(key).unwrap_or_default();
            let rendered = if SECRET_ENV_KEYS.contains(key) {
                if value.contains(',') || !value.is_empty() {
                    let count = value.split(',').filter(|s| !s.trim().is_empty()).count();
                    if count > 0 {
                        format!("<{count} keys>")
                    } else {
                        format!("<len:{}>", value.len())
                    }
                } else {
                    format!("<len:{}>", value.len())
                }
            } else {
                value
            };
            (key.to_string(), rendered)
        })
        .collect()
}

#[cfg(test)]
mod tests {
    use super::*;

    fn cfg_with_no_files() -> AppConfig {
        AppConfig {
            api_keys: vec!["a-valid-test-key-0001".to_string()],
            revoked_keys: vec![],
            redis_addr: "127.0.0.1:6379".to_string(),
            redis_password: None,
            stream_key: "s".to_string(),
            dlq_stream_key: "s.dlq".to_string(),
            group_name: "g".to_string(),
            consumer_name: None,
            export_mode: "stdout".to_string(),
            export_file_path: None,
            tier: "tier1".to_string(),
            tier2_enabled: false,
            ingest_enabled: true,
            warnings_enabled: true,
            pilot_mode: true,
            environment: "dev".to_string(),
            panic_mode: "crash".to_string(),
            ingest_rl_per_min: 100,
            ingest_rl_burst: 10,
            outcome_rl_per_min: 10,
            outcome_rl_burst: 5,
            backpressure_threshold: 1000,
            stream_max_len: None,
            raw_event_ttl_days: 7,
            risk_scoring_enabled: true,
            risk_threshold_elevated: 0.3,
            risk_threshold_high: 0.6,
            risk_threshold_critical: 0.8,
            risk_window_sec: 300,
            warning_store_capacity: 1000,
            host: "0.0.0.0".to_string(),
            port: 8080,
            tier_membership_path: None,
            tier_entitlements_path: None,
            signal_definitions_path: None,
            conn_limit_enabled: false,
        }
    }

    #[test]
    fn fingerprint_is_deterministic() {
        let cfg = cfg_with_no_files();
        let a = compute(&cfg);
        let b = compute(&cfg);
        assert_eq!(a.hash, b.hash);
        assert_eq!(a.short.len(), 12);
    }

    #[test]
    fn unset_key_hashes_differently_from_empty_key() {
        let cfg = cfg_with_no_files();
        std::env::remove_var("BACKPRESSURE_THRESHOLD");
        let unset = compute(&cfg);
        std::env::set_var("BACKPRESSURE_THRESHOLD", "");
        let empty = compute(&cfg);
        std::env::remove_var("BACKPRESSURE_THRESHOLD");
        assert_ne!(unset.hash, empty.hash, "set-to-empty must hash differently from unset");
    }

    #[test]
    fn short_is_prefix_of_full_hash() {
        let cfg = cfg_with_no_files();
        let fp = compute(&cfg);
        assert!(fp.hash.starts_with(&fp.short));
    }
}
