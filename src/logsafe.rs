//! Denylist-based redaction for any diagnostic path that might otherwise
//! echo inbound payloads (SPEC_FULL §4.O / §7 Logging discipline). Not used
//! on the hot ingest path — `tracing` fields there are built from named,
//! already-validated struct fields, never from a raw `Value`.

use serde_json::Value;

const SENSITIVE_KEYS: &[&str] = &[
    "authorization",
    "x-api-key",
    "api_key",
    "api_keys",
    "password",
    "secret",
    "token",
    "card_number",
    "cvv",
    "cvc",
    "account_number",
    "routing_number",
    "iban",
    "ssn",
    "email",
    "phone",
    "billing_address",
    "billing_details",
    "payment_method",
    "raw_body",
    "signature",
    "metadata",
];

fn is_sensitive(key: &str) -> bool {
    let lower = key.to_lowercase();
    SENSITIVE_KEYS.iter().any(|s| lower == *s || lower.contains(s))
}

/// Recursively strips sensitive keys from a JSON value, replacing their
/// values with a fixed placeholder. Arrays are walked element-wise.
pub fn redact(value: &Value) -> Value {
    match value {
        Value::Object(map) => {
            let mut out = serde_json::Map::new();
            for (k, v) in map {
                if is_sensitive(k) {
                    out.insert(k.clone(), Value::String("[redacted]".to_string()));
                } else {
                    out.insert(k.clone(), redact(v));
                }
            }
            Value::Object(out)
        }
        Value::Array(items) => Value::Array(items.iter().map(redact).collect()),
        other => other.clone(),
    }
}

/// 8-character prefix + ellipsis, the only form an API key may take in a
/// log line (§7 Logging discipline).
pub fn key_prefix(key: &str) -> String {
    let n = key.len().min(8);
    format!("{}...", &key[..n])
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn redacts_nested_sensitive_keys() {
        let input = json!({
            "event_id": "abc",
            "metadata": {"card_number": "4111111111111111"},
            "nested": [{"password": "hunter2"}, {"ok": 1}],
        });
        let out = redact(&input);
        assert_eq!(out["event_id"], "abc");
        assert_eq!(out["metadata"], "[redacted]");
        assert_eq!(out["nested"][0]["password"], "[redacted]");
        assert_eq!(out["nested"][1]["ok"], 1);
    }

    #[test]
    fn key_prefix_truncates() {
        assert_eq!(key_prefix("abcdefghijklmnop"), "abcdefgh...");
        assert_eq!(key_prefix("ab"), "ab...");
    }
}
