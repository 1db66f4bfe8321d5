//! Loader configuration with type-safe validation.
//!
//! Configuration values use `nutype` validation so that an invalid name or
//! timeout cannot be constructed in the first place.

use nutype::nutype;
use serde::{Deserialize, Serialize};
use std::time::Duration;

/// Human-readable name of a loader, used in log fields and error messages.
///
/// Validated to be non-empty after trimming and at most 128 characters.
#[nutype(
    sanitize(trim),
    validate(not_empty, len_char_max = 128),
    derive(
        Debug,
        Clone,
        PartialEq,
        Eq,
        Hash,
        AsRef,
        Display,
        Serialize,
        Deserialize
    )
)]
pub struct LoaderName(String);

impl Default for LoaderName {
    fn default() -> Self {
        Self::try_new("resource-loader").expect("default loader name is valid")
    }
}

/// Timeout applied by the [`Timeout`](crate::Timeout) transport adapter, in
/// milliseconds.
///
/// Validated to be between 1ms and 10 minutes.
#[nutype(
    validate(greater_or_equal = 1, less_or_equal = 600_000),
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
pub struct FetchTimeoutMs(u64);

impl FetchTimeoutMs {
    /// Convert to Duration for use with `tokio::time::timeout`.
    pub fn as_duration(self) -> Duration {
        Duration::from_millis(self.into())
    }
}

/// What happens to the in-flight task of a request that has been superseded
/// by a newer key or cancelled by disposal.
///
/// Either way the outcome of a superseded request never reaches the published
/// state; the policy only controls whether the work itself is stopped early.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum CancellationPolicy {
    /// Let the request run to completion and drop its outcome on arrival.
    #[default]
    DiscardOnArrival,
    /// Abort the spawned request task as soon as it is superseded.
    AbortInFlight,
}

/// Configuration for a [`ResourceLoader`](crate::ResourceLoader).
#[derive(Debug, Clone, PartialEq, Eq, Default, Serialize, Deserialize)]
pub struct LoaderConfig {
    /// Name used in logs and errors.
    pub name: LoaderName,
    /// Handling of superseded in-flight requests.
    #[serde(default)]
    pub cancellation: CancellationPolicy,
}

impl LoaderConfig {
    /// Sets the loader name.
    #[must_use]
    pub fn with_name(mut self, name: LoaderName) -> Self {
        self.name = name;
        self
    }

    /// Sets the cancellation policy.
    #[must_use]
    pub fn with_cancellation(mut self, cancellation: CancellationPolicy) -> Self {
        self.cancellation = cancellation;
        self
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn default_config_discards_on_arrival() {
        let config = LoaderConfig::default();

        assert_eq!(config.cancellation, CancellationPolicy::DiscardOnArrival);
        assert_eq!(config.name.as_ref(), "resource-loader");
    }

    #[test]
    fn builder_methods_override_defaults() {
        let name = LoaderName::try_new("posts").expect("valid name");

        let config = LoaderConfig::default()
            .with_name(name.clone())
            .with_cancellation(CancellationPolicy::AbortInFlight);

        assert_eq!(config.name, name);
        assert_eq!(config.cancellation, CancellationPolicy::AbortInFlight);
    }

    #[test]
    fn loader_name_rejects_blank_and_oversized_values() {
        assert!(LoaderName::try_new("  ").is_err());
        assert!(LoaderName::try_new("x".repeat(129)).is_err());
        assert!(LoaderName::try_new("x".repeat(128)).is_ok());
    }

    #[test]
    fn fetch_timeout_bounds_are_enforced() {
        assert!(FetchTimeoutMs::try_new(0).is_err());
        assert!(FetchTimeoutMs::try_new(600_001).is_err());

        let timeout = FetchTimeoutMs::try_new(250).expect("valid timeout");
        assert_eq!(timeout.as_duration(), Duration::from_millis(250));
    }

    #[test]
    fn config_deserializes_with_default_policy() {
        let config: LoaderConfig =
            serde_json::from_str(r#"{ "name": "users" }"#).expect("valid config json");

        assert_eq!(config.name.as_ref(), "users");
        assert_eq!(config.cancellation, CancellationPolicy::DiscardOnArrival);
    }

    #[test]
    fn config_rejects_invalid_name_on_deserialize() {
        let result = serde_json::from_str::<LoaderConfig>(r#"{ "name": "   " }"#);

        assert!(result.is_err());
    }
}
