//! Per-API-key token-bucket rate limiting (SPEC_FULL §4.B). Two independent
//! bucket families — ingest and outcome — each created lazily on first use.
//! `DashMap` supplies the double-checked-locking shape the spec calls for
//! (a sharded read lock for the common case, upgraded only on insert) the
//! same way this codebase's existing `KeyedLimiters` does.

use dashmap::DashMap;
use governor::{
    clock::{Clock, DefaultClock},
    state::{InMemoryState, NotKeyed},
    Quota, RateLimiter,
};
use std::num::NonZeroU32;
use std::sync::Arc;
use std::time::Duration;

type Limiter = Arc<RateLimiter<NotKeyed, InMemoryState, DefaultClock>>;

pub struct RateLimiters {
    ingest: DashMap<String, Limiter>,
    outcome: DashMap<String, Limiter>,
    ingest_per_min: u32,
    ingest_burst: u32,
    outcome_per_min: u32,
    outcome_burst: u32,
}

impl RateLimiters {
    pub fn new(ingest_per_min: u32, ingest_burst: u32, outcome_per_min: u32, outcome_burst: u32) -> Self {
        Self {
            ingest: DashMap::new(),
            outcome: DashMap::new(),
            ingest_per_min,
            ingest_burst,
            outcome_per_min,
            outcome_burst,
        }
    }

    fn limiter_for(map: &DashMap<String, Limiter>, key: &str, per_min: u32, burst: u32) -> Limiter {
        if let Some(existing) = map.get(key) {
            return existing.clone();
        }
        let quota = Quota::per_minute(NonZeroU32::new(per_min.max(1)).unwrap())
            .allow_burst(NonZeroU32::new(burst.max(1)).unwrap());
        let limiter = Arc::new(RateLimiter::direct(quota));
        map.entry(key.to_string()).or_insert_with(|| limiter).clone()
    }

    pub fn check_ingest(&self, key: &str) -> Result<(), Duration> {
        if self.ingest_per_min == 0 || self.ingest_burst == 0 {
            return Err(Duration::from_secs(1));
        }
        let lim = Self::limiter_for(&self.ingest, key, self.ingest_per_min, self.ingest_burst);
        lim.check().map_err(|n| n.wait_time_from(DefaultClock::default().now()))
    }

    pub fn check_outcome(&self, key: &str) -> Result<(), Duration> {
        if self.outcome_per_min == 0 || self.outcome_burst == 0 {
            return Err(Duration::from_secs(1));
        }
        let lim = Self::limiter_for(&self.outcome, key, self.outcome_per_min, self.outcome_burst);
        lim.check().map_err(|n| n.wait_time_from(DefaultClock::default().now()))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn allows_within_burst_then_denies() {
        let limiters = RateLimiters::new(60, 2, 60, 2);
        assert!(limiters.check_ingest("key-a").is_ok());
        assert!(limiters.check_ingest("key-a").is_ok());
        assert!(limiters.check_ingest("key-a").is_err());
    }

    #[test]
    fn buckets_are_independent_per_key() {
        let limiters = RateLimiters::new(60, 1, 60, 1);
        assert!(limiters.check_ingest("key-a").is_ok());
        assert!(limiters.check_ingest("key-a").is_err());
        assert!(limiters.check_ingest("key-b").is_ok());
    }

    #[test]
    fn ingest_and_outcome_are_independent_families() {
        let limiters = RateLimiters::new(60, 1, 60, 1);
        assert!(limiters.check_ingest("key-a").is_ok());
        assert!(limiters.check_outcome("key-a").is_ok());
    }

    #[test]
    fn fails_closed_on_zero_capacity() {
        let limiters = RateLimiters::new(0, 1, 1, 0);
        assert!(limiters.check_ingest("key-a").is_err());
        assert!(limiters.check_outcome("key-a").is_err());
    }
}
