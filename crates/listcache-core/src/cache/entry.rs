use std::time::Duration;

use serde::{Deserialize, Serialize};
use serde_json::Value;

/// Stored envelope: the value plus when it was written and how long it lives.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct CacheEntry {
    pub value: Value,
    /// Milliseconds since the Unix epoch.
    pub timestamp: i64,
    /// Lifetime in milliseconds.
    pub ttl: u64,
}

impl CacheEntry {
    pub fn new(value: Value, now_millis: i64, ttl: Duration) -> Self {
        Self {
            value,
            timestamp: now_millis,
            ttl: u64::try_from(ttl.as_millis()).unwrap_or(u64::MAX),
        }
    }

    /// `None` when the timestamp is too far from `now_millis` to compute.
    pub fn age_millis(&self, now_millis: i64) -> Option<i64> {
        now_millis.checked_sub(self.timestamp)
    }

    /// Valid while `now - timestamp <= ttl`. An entry stamped in the future
    /// (clock skew) counts as fresh; one whose age overflows is expired.
    pub fn is_expired(&self, now_millis: i64) -> bool {
        match self.age_millis(now_millis) {
            Some(age) => u64::try_from(age).is_ok_and(|age| age > self.ttl),
            None => true,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn test_entry_expiry_boundary() {
        let entry = CacheEntry::new(json!(1), 1_000, Duration::from_millis(500));
        assert!(!entry.is_expired(1_000));
        assert!(!entry.is_expired(1_500));
        assert!(entry.is_expired(1_501));
    }

    #[test]
    fn test_entry_clock_skew_is_fresh() {
        let entry = CacheEntry::new(json!("x"), 10_000, Duration::from_millis(1));
        assert!(!entry.is_expired(5_000));
    }

    #[test]
    fn test_entry_with_out_of_range_timestamp_is_expired() {
        let ancient = CacheEntry {
            value: json!(1),
            timestamp: i64::MIN,
            ttl: 1,
        };
        assert_eq!(ancient.age_millis(1_000), None);
        assert!(ancient.is_expired(1_000));

        let far_future = CacheEntry {
            value: json!(1),
            timestamp: i64::MAX,
            ttl: 1,
        };
        assert_eq!(far_future.age_millis(-1_000), None);
        assert!(far_future.is_expired(-1_000));
    }

    #[test]
    fn test_entry_wire_format() {
        let entry = CacheEntry::new(json!({"id": 7}), 42, Duration::from_secs(300));
        let encoded = serde_json::to_value(&entry).unwrap();
        assert_eq!(
            encoded,
            json!({"value": {"id": 7}, "timestamp": 42, "ttl": 300_000})
        );
    }
}
