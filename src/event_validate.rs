//! Structural validation of inbound events (SPEC_FULL §3 Event). Runs after
//! JSON decode, before the dedup reservation — nothing here ever touches
//! durable storage on failure.

use crate::models::{Event, Processor};
use chrono::DateTime;
use uuid::Uuid;

const MAX_MERCHANT_HASH_LEN: usize = 100;
const MAX_PAYMENT_INTENT_HASH_LEN: usize = 100;
const MAX_FAILURE_CATEGORY_LEN: usize = 100;
const MAX_GEO_BUCKET_LEN: usize = 20;
const MIN_RETRY_COUNT: i64 = 0;
const MAX_RETRY_COUNT: i64 = 100;

pub fn validate_event(event: &Event) -> Result<(), String> {
    if Uuid::parse_str(&event.event_id).is_err() {
        return Err(format!("event_id '{}' is not a valid UUID", event.event_id));
    }
    if DateTime::parse_from_rfc3339(&event.event_timestamp).is_err() {
        return Err(format!(
            "event_timestamp '{}' is not a valid RFC3339 timestamp",
            event.event_timestamp
        ));
    }
    if event.event_type.trim().is_empty() {
        return Err("event_type must be non-empty".to_string());
    }
    if Processor::parse(&event.processor).is_none() {
        return Err(format!(
            "processor '{}' must be one of stripe, adyen, checkout, internal",
            event.processor
        ));
    }

    check_len("merchant_id_hash", event.merchant_id_hash.as_deref(), MAX_MERCHANT_HASH_LEN)?;
    check_len(
        "payment_intent_id_hash",
        event.payment_intent_id_hash.as_deref(),
        MAX_PAYMENT_INTENT_HASH_LEN,
    )?;
    check_len("failure_category", event.failure_category.as_deref(), MAX_FAILURE_CATEGORY_LEN)?;
    check_len("geo_bucket", event.geo_bucket.as_deref(), MAX_GEO_BUCKET_LEN)?;

    if let Some(retry_count) = event.retry_count {
        if !(MIN_RETRY_COUNT..=MAX_RETRY_COUNT).contains(&retry_count) {
            return Err(format!("retry_count {retry_count} out of bounds [0,100]"));
        }
    }

    Ok(())
}

fn check_len(field: &str, value: Option<&str>, max: usize) -> Result<(), String> {
    if let Some(v) = value {
        if v.len() > max {
            return Err(format!("{field} exceeds max length {max} ({} chars)", v.len()));
        }
    }
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;

    fn valid_event() -> Event {
        Event {
            event_id: "11111111-1111-1111-1111-111111111111".to_string(),
            event_timestamp: "2026-02-01T00:00:00Z".to_string(),
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
    fn accepts_valid_event() {
        assert!(validate_event(&valid_event()).is_ok());
    }

    #[test]
    fn rejects_bad_processor() {
        let mut e = valid_event();
        e.processor = "paypal".to_string();
        let err = validate_event(&e).unwrap_err();
        assert!(err.contains("paypal"));
    }

    #[test]
    fn rejects_non_uuid_event_id() {
        let mut e = valid_event();
        e.event_id = "not-a-uuid".to_string();
        assert!(validate_event(&e).is_err());
    }

    #[test]
    fn rejects_bad_timestamp() {
        let mut e = valid_event();
        e.event_timestamp = "yesterday".to_string();
        assert!(validate_event(&e).is_err());
    }

    #[test]
    fn rejects_oversized_geo_bucket() {
        let mut e = valid_event();
        e.geo_bucket = Some("x".repeat(21));
        assert!(validate_event(&e).is_err());
    }

    #[test]
    fn rejects_retry_count_out_of_bounds() {
        let mut e = valid_event();
        e.retry_count = Some(101);
        assert!(validate_event(&e).is_err());

        let mut e2 = valid_event();
        e2.retry_count = Some(-1);
        assert!(validate_event(&e2).is_err());
    }

    #[test]
    fn accepts_boundary_lengths() {
        let mut e = valid_event();
        e.geo_bucket = Some("x".repeat(20));
        e.failure_category = Some("x".repeat(100));
        e.retry_count = Some(100);
        assert!(validate_event(&e).is_ok());
    }
}
