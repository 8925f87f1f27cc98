//! Pre-flight configuration validation (SPEC_FULL §4.A). Runs once,
//! synchronously, before any listener binds. Every failure is accumulated;
//! the caller never exits on the first one.

use crate::config::AppConfig;
use std::path::Path;

const PLACEHOLDER_KEYS: &[&str] = &["changeme", "test", "example", "placeholder", "replace-me"];

#[derive(Debug, Default)]
pub struct ConfigErrors {
    pub failures: Vec<String>,
}

impl ConfigErrors {
    fn add(&mut self, msg: impl Into<String>) {
        self.failures.push(msg.into());
    }

    fn addf(&mut self, args: std::fmt::Arguments<'_>) {
        self.failures.push(args.to_string());
    }

    pub fn is_ok(&self) -> bool {
        self.failures.is_empty()
    }
}

pub fn validate(cfg: &AppConfig) -> ConfigErrors {
    let mut errs = ConfigErrors::default();

    validate_auth(cfg, &mut errs);
    validate_redis(cfg, &mut errs);
    validate_export(cfg, &mut errs);
    validate_risk_scoring(cfg, &mut errs);
    validate_tier(cfg, &mut errs);
    validate_env(cfg, &mut errs);
    validate_panic_mode(cfg, &mut errs);
    validate_rate_limits(cfg, &mut errs);
    validate_runtime_configs(cfg, &mut errs);

    errs
}

fn validate_auth(cfg: &AppConfig, errs: &mut ConfigErrors) {
    if cfg.api_keys.is_empty() {
        errs.add("at least one API key must be configured");
        return;
    }
    if cfg.environment == "prod" {
        for k in &cfg.api_keys {
            if k.len() < 16 {
                errs.addf(format_args!("api key '{}...' is shorter than 16 chars", &k[..k.len().min(4)]));
            }
            let lower = k.to_lowercase();
            if PLACEHOLDER_KEYS.iter().any(|p| lower.contains(p)) {
                errs.add("api key matches a known placeholder pattern; not permitted in production");
            }
        }
    }
}

fn validate_redis(cfg: &AppConfig, errs: &mut ConfigErrors) {
    if !cfg.redis_addr.contains(':') {
        errs.addf(format_args!("REDIS_ADDR '{}' must contain a port", cfg.redis_addr));
    }
}

fn validate_export(cfg: &AppConfig, errs: &mut ConfigErrors) {
    match cfg.export_mode.as_str() {
        "stdout" => {}
        "file" | "both" => match &cfg.export_file_path {
            None => errs.add("EXPORT_FILE_PATH is required when EXPORT_MODE is 'file' or 'both'"),
            Some(p) => {
                let parent = Path::new(p).parent();
                if let Some(dir) = parent {
                    if !dir.as_os_str().is_empty() && !dir.exists() {
                        errs.addf(format_args!("export file directory does not exist: {}", dir.display()));
                    }
                }
            }
        },
        other => errs.addf(format_args!("EXPORT_MODE '{other}' must be one of stdout, file, both")),
    }
}

fn validate_risk_scoring(cfg: &AppConfig, errs: &mut ConfigErrors) {
    let (t1, t2, t3) = (
        cfg.risk_threshold_elevated,
        cfg.risk_threshold_high,
        cfg.risk_threshold_critical,
    );
    for (name, v) in [("elevated", t1), ("high", t2), ("critical", t3)] {
        if !(0.0..=1.0).contains(&v) {
            errs.addf(format_args!("risk threshold '{name}' must be in [0,1], got {v}"));
        }
    }
    if !(t1 < t2 && t2 < t3) {
        errs.add("risk thresholds must be strictly ascending: elevated < high < critical");
    }
    if cfg.risk_window_sec < 10 {
        errs.add("RISK_WINDOW_SEC must be >= 10");
    }
}

fn validate_tier(cfg: &AppConfig, errs: &mut ConfigErrors) {
    if cfg.tier != "tier1" && cfg.tier != "tier2" {
        errs.addf(format_args!("TIER '{}' must be one of tier1, tier2", cfg.tier));
    }
}

fn validate_env(cfg: &AppConfig, errs: &mut ConfigErrors) {
    if cfg.environment != "dev" && cfg.environment != "prod" {
        errs.addf(format_args!("ENVIRONMENT '{}' must be one of dev, prod", cfg.environment));
    }
}

fn validate_panic_mode(cfg: &AppConfig, errs: &mut ConfigErrors) {
    if cfg.panic_mode != "crash" && cfg.panic_mode != "recover" {
        errs.addf(format_args!("PANIC_MODE '{}' must be one of crash, recover", cfg.panic_mode));
    }
}

fn validate_rate_limits(cfg: &AppConfig, errs: &mut ConfigErrors) {
    for (name, v) in [
        ("INGEST_RL_PER_MIN", cfg.ingest_rl_per_min),
        ("INGEST_RL_BURST", cfg.ingest_rl_burst),
        ("OUTCOME_RL_PER_MIN", cfg.outcome_rl_per_min),
        ("OUTCOME_RL_BURST", cfg.outcome_rl_burst),
    ] {
        if v == 0 {
            errs.addf(format_args!("{name} must be a positive integer"));
        }
    }
    // raw_event_ttl_days and backpressure_threshold are unsigned already,
    // so "non-negative" is structurally guaranteed; no further check needed.
}

fn validate_runtime_configs(cfg: &AppConfig, errs: &mut ConfigErrors) {
    for path in [
        &cfg.tier_membership_path,
        &cfg.tier_entitlements_path,
        &cfg.signal_definitions_path,
    ]
    .into_iter()
    .flatten()
    {
        validate_json_file(path, errs);
    }
}

fn validate_json_file(path: &str, errs: &mut ConfigErrors) {
    let contents = match std::fs::read_to_string(path) {
        Ok(c) => c,
        Err(e) => {
            errs.addf(format_args!("failed to read runtime config file {path}: {e}"));
            return;
        }
    };
    match serde_json::from_str::<serde_json::Value>(&contents) {
        Ok(serde_json::Value::Object(map)) if !map.is_empty() => {}
        Ok(_) => errs.addf(format_args!("runtime config file {path} must contain a non-empty JSON object")),
        Err(e) => errs.addf(format_args!("runtime config file {path} is not valid JSON: {e}")),
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn base_config() -> AppConfig {
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
    fn valid_config_passes() {
        let cfg = base_config();
        assert!(validate(&cfg).is_ok());
    }

    #[test]
    fn rejects_no_api_keys() {
        let mut cfg = base_config();
        cfg.api_keys.clear();
        let errs = validate(&cfg);
        assert!(!errs.is_ok());
        assert!(errs.failures.iter().any(|f| f.contains("API key")));
    }

    #[test]
    fn rejects_non_ascending_thresholds() {
        let mut cfg = base_config();
        cfg.risk_threshold_high = 0.2;
        let errs = validate(&cfg);
        assert!(errs.failures.iter().any(|f| f.contains("ascending")));
    }

    #[test]
    fn accumulates_multiple_failures_without_short_circuit() {
        let mut cfg = base_config();
        cfg.api_keys.clear();
        cfg.redis_addr = "no-port-here".to_string();
        cfg.tier = "tier9".to_string();
        let errs = validate(&cfg);
        assert!(errs.failures.len() >= 3);
    }

    #[test]
    fn rejects_file_export_without_path() {
        let mut cfg = base_config();
        cfg.export_mode = "file".to_string();
        let errs = validate(&cfg);
        assert!(errs.failures.iter().any(|f| f.contains("EXPORT_FILE_PATH")));
    }
}
