//! Bounded LRU warning store (SPEC_FULL §4.G). One reader/writer lock;
//! write-locked for `add`/`set_outcome`, read-locked for `get`/`list`.
//!
//! Ordering is a hand-rolled front/back deque of keys rather than a
//! generic LRU crate: the eviction rule here (update-in-place moves to
//! front, eviction takes from the back) is simple enough that a third
//! party crate's generic policy would need fighting more than following.

use crate::models::{is_valid_outcome_source, is_valid_outcome_type, Warning};
use std::collections::{HashMap, VecDeque};
use std::sync::RwLock;

pub struct WarningStore {
    capacity: usize,
    inner: RwLock<Inner>,
}

struct Inner {
    entries: HashMap<String, Warning>,
    /// Front = newest, back = oldest (eviction candidate).
    order: VecDeque<String>,
}

#[derive(Debug)]
pub enum OutcomeError {
    NotFound,
    InvalidType,
    InvalidSource,
}

impl WarningStore {
    pub fn new(capacity: usize) -> Self {
        Self {
            capacity: capacity.max(1),
            inner: RwLock::new(Inner {
                entries: HashMap::new(),
                order: VecDeque::new(),
            }),
        }
    }

    pub fn add(&self, warning: Warning) {
        let mut inner = self.inner.write().unwrap();
        let id = warning.warning_id.clone();

        if inner.entries.contains_key(&id) {
            inner.entries.insert(id.clone(), warning);
            move_to_front(&mut inner.order, &id);
            return;
        }

        if inner.entries.len() >= self.capacity {
            if let Some(oldest) = inner.order.pop_back() {
                inner.entries.remove(&oldest);
            }
        }

        inner.entries.insert(id.clone(), warning);
        inner.order.push_front(id);
    }

    pub fn get(&self, warning_id: &str) -> Option<Warning> {
        let inner = self.inner.read().unwrap();
        inner.entries.get(warning_id).cloned()
    }

    pub fn set_outcome(
        &self,
        warning_id: &str,
        outcome_type: &str,
        outcome_timestamp: &str,
        outcome_source: &str,
        outcome_notes: Option<String>,
        now_rfc3339: &str,
    ) -> Result<Warning, OutcomeError> {
        if !is_valid_outcome_type(outcome_type) {
            return Err(OutcomeError::InvalidType);
        }
        if !is_valid_outcome_source(outcome_source) {
            return Err(OutcomeError::InvalidSource);
        }

        let mut inner = self.inner.write().unwrap();
        let warning = inner.entries.get_mut(warning_id).ok_or(OutcomeError::NotFound)?;

        warning.outcome_type = Some(outcome_type.to_string());
        warning.outcome_timestamp = Some(outcome_timestamp.to_string());
        warning.outcome_source = Some(outcome_source.to_string());
        warning.outcome_notes = outcome_notes;
        warning.outcome_observed = outcome_type != "none";
        warning.outcome_updated_at = Some(now_rfc3339.to_string());

        let updated = warning.clone();
        move_to_front(&mut inner.order, warning_id);
        Ok(updated)
    }

    /// Newest-first iteration, optionally filtered by processor.
    pub fn list(&self, limit: usize, processor: Option<&str>) -> Vec<Warning> {
        let inner = self.inner.read().unwrap();
        inner
            .order
            .iter()
            .filter_map(|id| inner.entries.get(id))
            .filter(|w| processor.map(|p| w.processor == p).unwrap_or(true))
            .take(limit)
            .cloned()
            .collect()
    }

    pub fn count(&self) -> usize {
        self.inner.read().unwrap().entries.len()
    }
}

fn move_to_front(order: &mut VecDeque<String>, id: &str) {
    if let Some(pos) = order.iter().position(|k| k == id) {
        order.remove(pos);
    }
    order.push_front(id.to_string());
}

#[cfg(test)]
mod tests {
    use super::*;

    fn warning(id: &str) -> Warning {
        Warning {
            warning_id: id.to_string(),
            event_id: format!("evt-{id}"),
            processor: "stripe".to_string(),
            merchant_id_hash: None,
            processed_at: "2026-01-01T00:00:00Z".to_string(),
            risk_score: 0.7,
            risk_band: "high".to_string(),
            risk_drivers: vec!["high_failure_rate".to_string()],
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

    #[test]
    fn add_and_get_roundtrip() {
        let store = WarningStore::new(10);
        store.add(warning("w1"));
        assert!(store.get("w1").is_some());
        assert!(store.get("missing").is_none());
    }

    #[test]
    fn evicts_oldest_when_at_capacity() {
        let store = WarningStore::new(2);
        store.add(warning("w1"));
        store.add(warning("w2"));
        store.add(warning("w3"));
        assert!(store.get("w1").is_none());
        assert!(store.get("w2").is_some());
        assert!(store.get("w3").is_some());
        assert_eq!(store.count(), 2);
    }

    #[test]
    fn update_existing_moves_to_front_without_evicting() {
        let store = WarningStore::new(2);
        store.add(warning("w1"));
        store.add(warning("w2"));
        store.add(warning("w1")); // update, should move to front
        store.add(warning("w3")); // evicts oldest (w2), not w1
        assert!(store.get("w1").is_some());
        assert!(store.get("w2").is_none());
        assert!(store.get("w3").is_some());
    }

    #[test]
    fn set_outcome_validates_enums() {
        let store = WarningStore::new(10);
        store.add(warning("w1"));
        let err = store
            .set_outcome("w1", "bogus", "2026-01-01T00:00:00Z", "manual", None, "2026-01-01T00:00:00Z")
            .unwrap_err();
        assert!(matches!(err, OutcomeError::InvalidType));

        let ok = store
            .set_outcome("w1", "throttle", "2026-01-01T00:00:00Z", "manual", None, "2026-01-01T00:00:00Z")
            .unwrap();
        assert!(ok.outcome_observed);
        assert_eq!(ok.outcome_type.as_deref(), Some("throttle"));
    }

    #[test]
    fn outcome_type_none_clears_observed_flag() {
        let store = WarningStore::new(10);
        store.add(warning("w1"));
        let updated = store
            .set_outcome("w1", "none", "2026-01-01T00:00:00Z", "manual", None, "2026-01-01T00:00:00Z")
            .unwrap();
        assert!(!updated.outcome_observed);
    }

    #[test]
    fn list_filters_by_processor_newest_first() {
        let store = WarningStore::new(10);
        let mut w2 = warning("w2");
        w2.processor = "adyen".to_string();
        store.add(warning("w1"));
        store.add(w2);
        store.add(warning("w3"));

        let all = store.list(10, None);
        assert_eq!(all.iter().map(|w| w.warning_id.clone()).collect::<Vec<_>>(), vec!["w3", "w2", "w1"]);

        let stripe_only = store.list(10, Some("stripe"));
        assert_eq!(stripe_only.len(), 2);
    }
}
