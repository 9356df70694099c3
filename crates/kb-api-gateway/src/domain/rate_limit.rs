//! Backend throttling metadata.
//!
//! Every backend operation reports the rate-limit "tanks" it touched. A single
//! gateway call can hit the backend several times (address resolution, then
//! the actual operation), so records are collected per call and collapsed to
//! one record per tank before they are attached to the reply.

use chrono::{DateTime, Utc};
use parking_lot::Mutex;
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;
use std::sync::Arc;

/// Rate-limit record as reported by a backend
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct RateLimit {
    /// Tank name
    pub name: String,
    /// Calls left in the current window
    pub calls_remaining: i64,
    /// When the window resets
    pub window_reset: DateTime<Utc>,
    /// Window capacity
    pub max_calls: i64,
}

impl RateLimit {
    /// Wire representation used inside results and error data
    pub fn to_wire(&self) -> RateLimitRes {
        RateLimitRes {
            tank: self.name.clone(),
            capacity: self.max_calls,
            reset: self.window_reset,
            gas: self.calls_remaining,
        }
    }
}

/// Rate-limit entry as it appears on the wire:
/// `{"tank": name, "capacity": int, "reset": timestamp, "gas": int}`
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct RateLimitRes {
    pub tank: String,
    pub capacity: i64,
    #[serde(with = "chrono::serde::ts_seconds")]
    pub reset: DateTime<Utc>,
    pub gas: i64,
}

/// Collapse records to one per tank name.
///
/// The later record in input order wins. Output is sorted by name.
pub fn aggregate(records: &[RateLimit]) -> Vec<RateLimit> {
    let mut latest: BTreeMap<&str, &RateLimit> = BTreeMap::new();
    for record in records {
        latest.insert(record.name.as_str(), record);
    }
    latest.into_values().cloned().collect()
}

/// Accumulates rate-limit records across the backend calls of one request.
///
/// Cheap to clone; clones share the same buffer.
#[derive(Debug, Clone, Default)]
pub struct RateLimitCollector {
    records: Arc<Mutex<Vec<RateLimit>>>,
}

impl RateLimitCollector {
    pub fn new() -> Self {
        Self::default()
    }

    /// Record the limits reported by one backend call
    pub fn record(&self, limits: impl IntoIterator<Item = RateLimit>) {
        self.records.lock().extend(limits);
    }

    /// Aggregated wire entries for everything recorded so far
    pub fn summary(&self) -> Vec<RateLimitRes> {
        aggregate(&self.records.lock())
            .iter()
            .map(RateLimit::to_wire)
            .collect()
    }

    pub fn is_empty(&self) -> bool {
        self.records.lock().is_empty()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::TimeZone;
    use proptest::prelude::*;

    fn limit(name: &str, remaining: i64) -> RateLimit {
        RateLimit {
            name: name.to_string(),
            calls_remaining: remaining,
            window_reset: Utc.timestamp_opt(1_700_000_000, 0).unwrap(),
            max_calls: 10,
        }
    }

    #[test]
    fn test_last_record_wins() {
        let out = aggregate(&[limit("a", 1), limit("a", 5), limit("b", 2)]);
        assert_eq!(out.len(), 2);
        assert_eq!(out[0].name, "a");
        assert_eq!(out[0].calls_remaining, 5);
        assert_eq!(out[1].name, "b");
        assert_eq!(out[1].calls_remaining, 2);
    }

    #[test]
    fn test_output_sorted_by_name() {
        let out = aggregate(&[limit("zeta", 1), limit("alpha", 1), limit("mid", 1)]);
        let names: Vec<_> = out.iter().map(|r| r.name.as_str()).collect();
        assert_eq!(names, vec!["alpha", "mid", "zeta"]);
    }

    #[test]
    fn test_wire_format() {
        let json = serde_json::to_value(limit("chat", 7).to_wire()).unwrap();
        assert_eq!(
            json,
            serde_json::json!({"tank": "chat", "capacity": 10, "reset": 1_700_000_000, "gas": 7})
        );
    }

    #[test]
    fn test_collector_shared_between_clones() {
        let collector = RateLimitCollector::new();
        let clone = collector.clone();
        clone.record(vec![limit("a", 3)]);
        collector.record(vec![limit("a", 2), limit("b", 9)]);

        let summary = collector.summary();
        assert_eq!(summary.len(), 2);
        assert_eq!(summary[0].gas, 2);
    }

    proptest! {
        #[test]
        fn prop_one_record_per_name(entries in proptest::collection::vec((0u8..5, 0i64..100), 0..40)) {
            let records: Vec<_> = entries
                .iter()
                .map(|(n, r)| limit(&format!("tank-{}", n), *r))
                .collect();
            let out = aggregate(&records);

            let mut names: Vec<_> = out.iter().map(|r| r.name.clone()).collect();
            let before = names.len();
            names.dedup();
            prop_assert_eq!(before, names.len());

            for record in &out {
                let last = records.iter().rev().find(|r| r.name == record.name).unwrap();
                prop_assert_eq!(record.calls_remaining, last.calls_remaining);
            }
        }
    }
}
