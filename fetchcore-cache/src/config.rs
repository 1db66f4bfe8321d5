//! Retention settings for [`SharedTransport`](crate::SharedTransport).

use nutype::nutype;
use serde::{Deserialize, Serialize};
use std::time::Duration;

/// How long a successful value stays cached, in milliseconds.
///
/// Validated to be between 1ms and 24 hours.
#[nutype(
    validate(greater_or_equal = 1, less_or_equal = 86_400_000),
    derive(
        Debug,
        Clone,
        Copy,
        PartialEq,
        Eq,
        PartialOrd,
        Ord,
        Into,
        Serialize,
        Deserialize
    )
)]
pub struct CacheTtlMs(u64);

impl CacheTtlMs {
    /// Convert to Duration for freshness checks.
    pub fn as_duration(self) -> Duration {
        Duration::from_millis(self.into())
    }
}

/// Maximum number of retained values. The oldest value is evicted first.
///
/// Validated to be between 1 and 1,000,000; defaults to 256.
#[nutype(
    validate(greater_or_equal = 1, less_or_equal = 1_000_000),
    default = 256,
    derive(
        Debug,
        Clone,
        Copy,
        PartialEq,
        Eq,
        PartialOrd,
        Ord,
        Into,
        Default,
        Serialize,
        Deserialize
    )
)]
pub struct CacheCapacity(usize);

/// Configuration of a [`SharedTransport`](crate::SharedTransport).
///
/// Without a time-to-live only in-flight fetches are shared; nothing is kept
/// once a fetch completes.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(default)]
pub struct CacheConfig {
    /// Retention of successful values; `None` disables retention.
    pub time_to_live: Option<CacheTtlMs>,
    /// Upper bound on retained values.
    pub capacity: CacheCapacity,
}

impl CacheConfig {
    /// Retains successful values for `time_to_live`.
    #[must_use]
    pub const fn with_time_to_live(mut self, time_to_live: CacheTtlMs) -> Self {
        self.time_to_live = Some(time_to_live);
        self
    }

    /// Bounds the number of retained values.
    #[must_use]
    pub const fn with_capacity(mut self, capacity: CacheCapacity) -> Self {
        self.capacity = capacity;
        self
    }

    pub(crate) fn retention(&self) -> Option<Duration> {
        self.time_to_live.map(CacheTtlMs::as_duration)
    }

    pub(crate) fn max_entries(&self) -> usize {
        self.capacity.into()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn default_config_shares_without_retaining() {
        let config = CacheConfig::default();

        assert_eq!(config.retention(), None);
        assert_eq!(config.max_entries(), 256);
    }

    #[test]
    fn ttl_bounds_are_enforced() {
        assert!(CacheTtlMs::try_new(0).is_err());
        assert!(CacheTtlMs::try_new(86_400_001).is_err());

        let ttl = CacheTtlMs::try_new(1_500).expect("valid ttl");
        assert_eq!(ttl.as_duration(), Duration::from_millis(1_500));
    }

    #[test]
    fn capacity_rejects_zero() {
        assert!(CacheCapacity::try_new(0).is_err());
    }

    #[test]
    fn config_deserializes_partial_json() {
        let config: CacheConfig =
            serde_json::from_str(r#"{ "time_to_live": 5000 }"#).expect("valid config json");

        assert_eq!(config.retention(), Some(Duration::from_secs(5)));
        assert_eq!(config.capacity, CacheCapacity::default());
    }
}
