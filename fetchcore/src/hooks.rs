//! Lifecycle hooks for observing what a loader does internally.
//!
//! Hooks see more than consumers do: besides every published state they are
//! told about issued requests and about outcomes that were discarded because
//! their request had been superseded. They are meant for metrics and test
//! instrumentation, not for driving UI.
//!
//! Hooks are invoked synchronously while the loader holds its internal lock,
//! in the exact order the events happen, so implementations must be cheap and
//! must not call back into the loader.

use crate::config::LoaderName;
use crate::state::ResourceState;
use std::sync::atomic::{AtomicU64, Ordering};
use std::time::Duration;

/// Why a request outcome was dropped instead of being published.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum DiscardReason {
    /// A newer key was observed, or the same key was refetched, before the
    /// response arrived.
    Superseded,
    /// The loader was disposed before the response arrived.
    Disposed,
}

/// Context passed to request-level hook methods.
#[derive(Debug, Clone, Copy)]
pub struct RequestEvent<'a, K> {
    /// Name of the loader issuing the request.
    pub loader: &'a LoaderName,
    /// Key of the request.
    pub key: &'a K,
    /// Time since the request was issued; zero when it is being issued.
    pub elapsed: Duration,
}

/// Observer of loader internals. Every method defaults to doing nothing.
pub trait LoaderHook<K, T>: Send + Sync {
    /// A new request cycle started for `event.key`.
    fn on_request_issued(&self, _event: &RequestEvent<'_, K>) {}

    /// `state` was published to consumers.
    fn on_state_published(&self, _state: &ResourceState<K, T>) {}

    /// A response arrived but belonged to a request that is no longer current.
    fn on_discarded(&self, _event: &RequestEvent<'_, K>, _reason: DiscardReason) {}

    /// The task of a superseded request was aborted before it completed.
    fn on_aborted(&self, _event: &RequestEvent<'_, K>) {}
}

/// Point-in-time copy of [`LoaderMetrics`] counters.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct MetricsSnapshot {
    /// Requests issued.
    pub issued: u64,
    /// Successful outcomes published.
    pub succeeded: u64,
    /// Failed outcomes published.
    pub failed: u64,
    /// Outcomes dropped because a newer request had been issued.
    pub superseded: u64,
    /// Outcomes dropped because the loader had been disposed.
    pub dropped_after_dispose: u64,
    /// In-flight tasks aborted.
    pub aborted: u64,
}

/// Counting hook; attach it to any number of loaders.
///
/// ```rust,ignore
/// let metrics = Arc::new(LoaderMetrics::default());
/// let loader = ResourceLoader::builder(transport)
///     .hook(metrics.clone())
///     .build();
/// // ...
/// assert_eq!(metrics.snapshot().issued, 1);
/// ```
#[derive(Debug, Default)]
pub struct LoaderMetrics {
    issued: AtomicU64,
    succeeded: AtomicU64,
    failed: AtomicU64,
    superseded: AtomicU64,
    dropped_after_dispose: AtomicU64,
    aborted: AtomicU64,
}

impl LoaderMetrics {
    /// Reads all counters.
    pub fn snapshot(&self) -> MetricsSnapshot {
        MetricsSnapshot {
            issued: self.issued.load(Ordering::Relaxed),
            succeeded: self.succeeded.load(Ordering::Relaxed),
            failed: self.failed.load(Ordering::Relaxed),
            superseded: self.superseded.load(Ordering::Relaxed),
            dropped_after_dispose: self.dropped_after_dispose.load(Ordering::Relaxed),
            aborted: self.aborted.load(Ordering::Relaxed),
        }
    }
}

impl<K, T> LoaderHook<K, T> for LoaderMetrics {
    fn on_request_issued(&self, _event: &RequestEvent<'_, K>) {
        let _ = self.issued.fetch_add(1, Ordering::Relaxed);
    }

    fn on_state_published(&self, state: &ResourceState<K, T>) {
        match state {
            ResourceState::Success { .. } => {
                let _ = self.succeeded.fetch_add(1, Ordering::Relaxed);
            }
            ResourceState::Error { .. } => {
                let _ = self.failed.fetch_add(1, Ordering::Relaxed);
            }
            ResourceState::Idle | ResourceState::Loading { .. } => {}
        }
    }

    fn on_discarded(&self, _event: &RequestEvent<'_, K>, reason: DiscardReason) {
        let counter = match reason {
            DiscardReason::Superseded => &self.superseded,
            DiscardReason::Disposed => &self.dropped_after_dispose,
        };
        let _ = counter.fetch_add(1, Ordering::Relaxed);
    }

    fn on_aborted(&self, _event: &RequestEvent<'_, K>) {
        let _ = self.aborted.fetch_add(1, Ordering::Relaxed);
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::errors::{ErrorInfo, ErrorKind};

    fn event<'a>(loader: &'a LoaderName, key: &'a &'static str) -> RequestEvent<'a, &'static str> {
        RequestEvent {
            loader,
            key,
            elapsed: Duration::ZERO,
        }
    }

    #[test]
    fn metrics_start_at_zero() {
        let metrics = LoaderMetrics::default();

        assert_eq!(metrics.snapshot(), MetricsSnapshot::default());
    }

    #[test]
    fn metrics_count_each_kind_of_event() {
        let metrics = LoaderMetrics::default();
        let name = LoaderName::default();
        let key = "a";
        let hook: &dyn LoaderHook<&'static str, u8> = &metrics;

        hook.on_request_issued(&event(&name, &key));
        hook.on_request_issued(&event(&name, &key));
        hook.on_state_published(&ResourceState::Loading { key });
        hook.on_state_published(&ResourceState::Success { key, data: 1 });
        hook.on_state_published(&ResourceState::Error {
            key,
            error: ErrorInfo::new(ErrorKind::Other, "boom"),
        });
        hook.on_discarded(&event(&name, &key), DiscardReason::Superseded);
        hook.on_discarded(&event(&name, &key), DiscardReason::Disposed);
        hook.on_aborted(&event(&name, &key));

        assert_eq!(
            metrics.snapshot(),
            MetricsSnapshot {
                issued: 2,
                succeeded: 1,
                failed: 1,
                superseded: 1,
                dropped_after_dispose: 1,
                aborted: 1,
            }
        );
    }
}
