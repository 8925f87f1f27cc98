//! Per-processor sliding-window risk scorer (SPEC_FULL §4.F). One mutex per
//! scorer instance covers all reads and writes of the processor ring; the
//! critical section is O(numBuckets), acceptable because the ring is tiny.
//!
//! Buckets rotate (clear) when read after going stale — the ring never
//! retains data older than its own width. A variant that skips this
//! rotation silently accumulates data across unrelated time windows; that
//! is the defect class this implementation avoids.

use crate::models::{RiskBand, RiskScore, RiskTrajectory};
use std::collections::{HashMap, HashSet};
use std::sync::Mutex;

const BUCKET_SIZE_SEC: u64 = 10;
const MAX_UNIQUE_GEOS: usize = 50;
const MAX_PROCESSORS: usize = 100;
const MIN_EVENTS_FOR_SCORE: u64 = 5;

#[derive(Debug, Clone, Default)]
struct Bucket {
    total: u64,
    failures: u64,
    timeouts: u64,
    auth_fails: u64,
    retry_sum: u64,
    unique_geos: HashSet<String>,
    last_updated_sec: u64,
}

impl Bucket {
    fn clear(&mut self) {
        *self = Bucket::default();
    }
}

struct ProcessorWindow {
    buckets: Vec<Bucket>,
}

impl ProcessorWindow {
    fn new(num_buckets: usize) -> Self {
        Self {
            buckets: vec![Bucket::default(); num_buckets],
        }
    }
}

pub struct RiskThresholds {
    pub elevated: f64,
    pub high: f64,
    pub critical: f64,
}

pub struct RiskScorer {
    window_sec: u64,
    num_buckets: usize,
    thresholds: RiskThresholds,
    inner: Mutex<HashMap<String, ProcessorWindow>>,
}

fn clamp01(v: f64) -> f64 {
    v.clamp(0.0, 1.0)
}

fn round2(v: f64) -> f64 {
    (v * 100.0).round() / 100.0
}

fn round1(v: f64) -> f64 {
    (v * 10.0).round() / 10.0
}

impl RiskScorer {
    pub fn new(window_sec: u64, thresholds: RiskThresholds) -> Self {
        let num_buckets = (window_sec / BUCKET_SIZE_SEC).max(1) as usize;
        Self {
            window_sec,
            num_buckets,
            thresholds,
            inner: Mutex::new(HashMap::new()),
        }
    }

    #[allow(dead_code)]
    pub fn window_sec(&self) -> u64 {
        self.window_sec
    }

    fn over_capacity_result() -> RiskScore {
        RiskScore {
            score: 0.0,
            band: RiskBand::Low,
            drivers: vec!["insufficient_data".to_string()],
            trajectory: None,
        }
    }

    fn insufficient_data_result() -> RiskScore {
        Self::over_capacity_result()
    }

    /// Records one event into the processor's ring, rotating the current
    /// bucket if stale, then returns the freshly-aggregated score.
    pub fn record_and_score(
        &self,
        processor: &str,
        failure_category: Option<&str>,
        retry_count: i64,
        geo_bucket: Option<&str>,
        now_sec: u64,
    ) -> RiskScore {
        let mut map = self.inner.lock().unwrap();

        if !map.contains_key(processor) && map.len() >= MAX_PROCESSORS {
            return Self::over_capacity_result();
        }

        let window = map
            .entry(processor.to_string())
            .or_insert_with(|| ProcessorWindow::new(self.num_buckets));

        let idx = ((now_sec / BUCKET_SIZE_SEC) as usize) % self.num_buckets;
        let bucket = &mut window.buckets[idx];

        if bucket.last_updated_sec == 0 || now_sec.saturating_sub(bucket.last_updated_sec) >= BUCKET_SIZE_SEC {
            bucket.clear();
        }
        bucket.last_updated_sec = now_sec;

        bucket.total += 1;
        bucket.retry_sum += retry_count.max(0) as u64;

        if let Some(cat) = failure_category {
            if !cat.is_empty() {
                bucket.failures += 1;
                let lower = cat.to_lowercase();
                if lower.contains("timeout") {
                    bucket.timeouts += 1;
                }
                if lower.contains("auth") {
                    bucket.auth_fails += 1;
                }
            }
        }

        if let Some(geo) = geo_bucket {
            if !geo.is_empty() && bucket.unique_geos.len() < MAX_UNIQUE_GEOS {
                bucket.unique_geos.insert(geo.to_string());
            }
        }

        self.score_locked(&window.buckets, idx)
    }

    fn score_locked(&self, buckets: &[Bucket], current_idx: usize) -> RiskScore {
        let total: u64 = buckets.iter().map(|b| b.total).sum();
        if total < MIN_EVENTS_FOR_SCORE {
            return Self::insufficient_data_result();
        }

        let failures: u64 = buckets.iter().map(|b| b.failures).sum();
        let timeouts: u64 = buckets.iter().map(|b| b.timeouts).sum();
        let auth_fails: u64 = buckets.iter().map(|b| b.auth_fails).sum();
        let retry_sum: u64 = buckets.iter().map(|b| b.retry_sum).sum();
        let unique_geos: usize = buckets
            .iter()
            .flat_map(|b| b.unique_geos.iter())
            .collect::<HashSet<_>>()
            .len();

        let current = &buckets[current_idx];
        let other_totals: Vec<u64> = buckets
            .iter()
            .enumerate()
            .filter(|(i, _)| *i != current_idx)
            .map(|(_, b)| b.total)
            .collect();
        let mean_other = if other_totals.is_empty() {
            0.0
        } else {
            other_totals.iter().sum::<u64>() as f64 / other_totals.len() as f64
        };

        let fail_rate = clamp01(failures as f64 / total as f64);
        let retry_pressure = clamp01((retry_sum as f64 / total as f64) / 3.0);
        let timeout_mix = clamp01(if failures > 0 { timeouts as f64 / failures as f64 } else { 0.0 });
        let auth_fail_mix = clamp01(if failures > 0 { auth_fails as f64 / failures as f64 } else { 0.0 });
        let traffic_spike = clamp01((current.total as f64 / mean_other.max(1.0)) / 2.0);
        let geo_entropy = clamp01(unique_geos as f64 / 10.0);

        let score = round2(
            0.25 * fail_rate
                + 0.20 * retry_pressure
                + 0.15 * timeout_mix
                + 0.15 * traffic_spike
                + 0.10 * auth_fail_mix
                + 0.15 * geo_entropy,
        );

        let band = if score >= self.thresholds.critical {
            RiskBand::Critical
        } else if score >= self.thresholds.high {
            RiskBand::High
        } else if score >= self.thresholds.elevated {
            RiskBand::Elevated
        } else {
            RiskBand::Low
        };

        let mut drivers = Vec::new();
        if fail_rate > 0.4 {
            drivers.push("high_failure_rate".to_string());
        }
        if retry_pressure > 0.5 {
            drivers.push("retry_pressure_spike".to_string());
        }
        if timeout_mix > 0.5 {
            drivers.push("timeout_clustering".to_string());
        }
        if traffic_spike > 0.5 {
            drivers.push("traffic_volatility".to_string());
        }
        if auth_fail_mix > 0.5 {
            drivers.push("auth_failure_cluster".to_string());
        }
        if geo_entropy > 0.5 {
            drivers.push("geo_entropy_increase".to_string());
        }
        if drivers.is_empty() {
            drivers.push("nominal_behavior".to_string());
        }

        let other_failures: u64 = buckets
            .iter()
            .enumerate()
            .filter(|(i, _)| *i != current_idx)
            .map(|(_, b)| b.failures)
            .sum();
        let other_total: u64 = other_totals.iter().sum();

        let current_fr = if current.total > 0 {
            current.failures as f64 / current.total as f64
        } else {
            0.0
        };
        let baseline_fr = if other_total > 0 {
            other_failures as f64 / other_total as f64
        } else {
            0.0
        };

        let multiplier = if baseline_fr > 0.01 {
            current_fr / baseline_fr
        } else if current_fr > 0.1 {
            10.0
        } else {
            1.0
        };
        let multiplier = round1(multiplier);

        let direction = if multiplier >= 2.0 {
            "accelerating"
        } else if multiplier <= 0.5 && baseline_fr > 0.05 {
            "decelerating"
        } else {
            "stable"
        };

        RiskScore {
            score,
            band,
            drivers,
            trajectory: Some(RiskTrajectory {
                multiplier,
                direction: direction.to_string(),
                current_fr: round2(current_fr),
                baseline_fr: round2(baseline_fr),
            }),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn scorer() -> RiskScorer {
        RiskScorer::new(
            300,
            RiskThresholds {
                elevated: 0.3,
                high: 0.6,
                critical: 0.8,
            },
        )
    }

    #[test]
    fn insufficient_data_below_five_events() {
        let s = scorer();
        let mut last = None;
        for _ in 0..4 {
            last = Some(s.record_and_score("stripe", None, 0, Some("US"), 1000));
        }
        let r = last.unwrap();
        assert_eq!(r.score, 0.0);
        assert_eq!(r.band, RiskBand::Low);
        assert_eq!(r.drivers, vec!["insufficient_data"]);
    }

    #[test]
    fn low_band_for_clean_traffic() {
        let s = scorer();
        let mut last = None;
        for _ in 0..10 {
            last = Some(s.record_and_score("stripe", None, 0, Some("US"), 1000));
        }
        let r = last.unwrap();
        assert_eq!(r.band, RiskBand::Low);
    }

    #[test]
    fn scenario_s4_high_failure_scores_elevated_or_above() {
        let s = scorer();
        for _ in 0..10 {
            s.record_and_score("stripe", None, 0, Some("US"), 1000);
        }
        let mut last = None;
        for _ in 0..20 {
            last = Some(s.record_and_score("stripe", Some("processor_timeout"), 5, Some("EU"), 1005));
        }
        let r = last.unwrap();
        assert!(r.score >= 0.6, "expected score >= 0.6, got {}", r.score);
        assert!(matches!(r.band, RiskBand::High | RiskBand::Critical));
        assert!(r.drivers.contains(&"timeout_clustering".to_string()));
    }

    #[test]
    fn over_capacity_processor_returns_insufficient_data() {
        let s = scorer();
        for i in 0..MAX_PROCESSORS {
            s.record_and_score(&format!("proc-{i}"), None, 0, None, 1000);
        }
        let r = s.record_and_score("proc-overflow", None, 0, None, 1000);
        assert_eq!(r.band, RiskBand::Low);
        assert_eq!(r.drivers, vec!["insufficient_data"]);
    }

    #[test]
    fn scenario_s5_trajectory_accelerating() {
        let s = scorer();
        // num_buckets = max(1, 300/10) = 30. Fill every non-current bucket
        // (29 of them) with 20 events / 2 failures, then the current bucket
        // with 20 events / 10 failures, all landing in distinct bucket slots
        // by choosing now_sec values 10s apart.
        let base_sec: u64 = 10_000 * BUCKET_SIZE_SEC;
        for bucket_offset in 1..30u64 {
            let now = base_sec + bucket_offset * BUCKET_SIZE_SEC;
            for i in 0..20 {
                let fc = if i < 2 { Some("generic_decline") } else { None };
                s.record_and_score("stripe", fc, 0, None, now);
            }
        }
        let mut last = None;
        for i in 0..20 {
            let fc = if i < 10 { Some("generic_decline") } else { None };
            last = Some(s.record_and_score("stripe", fc, 0, None, base_sec));
        }
        let r = last.unwrap();
        let traj = r.trajectory.unwrap();
        assert_eq!(traj.direction, "accelerating");
        assert!((traj.multiplier - 5.0).abs() < 0.6, "multiplier was {}", traj.multiplier);
    }
}
