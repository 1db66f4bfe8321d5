//! Failure and latency injection for transports.
//!
//! [`ChaosTransport`] wraps any transport and, per fetch, may add a random
//! delay and may fail the fetch before it reaches the wrapped transport. With
//! a deterministic seed the same sequence of fetches sees the same faults,
//! which makes out-of-order arrival reproducible in tests.

use fetchcore::{ErrorKind, Transport};
use nutype::nutype;
use parking_lot::Mutex;
use rand::{random, rngs::StdRng, Rng, SeedableRng};
use std::future::Future;
use std::time::Duration;
use thiserror::Error;
use tracing::debug;

/// Probability value for chaos injection rates.
///
/// Probability represents a value in the range [0.0, 1.0] where 0.0 means
/// never inject and 1.0 means always inject.
///
/// ```ignore
/// let sometimes = Probability::try_new(0.5).unwrap();
/// assert!(Probability::try_new(1.5).is_err());
/// ```
#[nutype(
    validate(greater_or_equal = 0.0, less_or_equal = 1.0),
    derive(Debug, Clone, Copy, PartialEq, PartialOrd, Display, Into)
)]
pub struct Probability(f32);

impl Probability {
    fn clamped(value: f32) -> Self {
        Self::try_new(value.clamp(0.0, 1.0)).unwrap_or_else(|_| Self::never())
    }

    fn never() -> Self {
        Self::try_new(0.0).expect("0.0 is a valid probability")
    }
}

/// What a [`ChaosTransport`] injects.
#[derive(Debug, Clone)]
pub struct ChaosConfig {
    deterministic_seed: Option<u64>,
    failure_probability: Probability,
    max_latency: Duration,
}

impl ChaosConfig {
    /// Injects nothing, seeded with 0.
    pub fn deterministic() -> Self {
        Self::seeded(0)
    }

    /// Injects nothing, seeded with `seed`.
    pub fn seeded(seed: u64) -> Self {
        Self {
            deterministic_seed: Some(seed),
            ..Self::default()
        }
    }

    /// Fails each fetch with `probability`, clamped to [0.0, 1.0].
    #[must_use]
    pub fn with_failure_probability(mut self, probability: f32) -> Self {
        self.failure_probability = Probability::clamped(probability);
        self
    }

    /// Delays each fetch by a uniformly random duration up to `max_latency`.
    #[must_use]
    pub const fn with_latency_jitter(mut self, max_latency: Duration) -> Self {
        self.max_latency = max_latency;
        self
    }
}

impl Default for ChaosConfig {
    fn default() -> Self {
        Self {
            deterministic_seed: None,
            failure_probability: Probability::never(),
            max_latency: Duration::ZERO,
        }
    }
}

/// Failure of a fetch through a [`ChaosTransport`].
#[derive(Debug, Error)]
pub enum ChaosError<E> {
    /// The failure was injected; the wrapped transport was not called.
    #[error("injected transport failure")]
    Injected,

    /// The wrapped transport failed on its own.
    #[error(transparent)]
    Transport(E),
}

/// Transport decorator injecting failures and latency.
pub struct ChaosTransport<Tr> {
    inner: Tr,
    config: ChaosConfig,
    rng: Mutex<StdRng>,
}

impl<Tr> ChaosTransport<Tr> {
    /// Wraps `inner` with the faults described by `config`.
    pub fn new(inner: Tr, config: ChaosConfig) -> Self {
        let rng = match config.deterministic_seed {
            Some(seed) => StdRng::seed_from_u64(seed),
            None => StdRng::seed_from_u64(random()),
        };

        Self {
            inner,
            config,
            rng: Mutex::new(rng),
        }
    }

    /// The wrapped transport.
    pub const fn inner(&self) -> &Tr {
        &self.inner
    }

    fn should_fail(&self) -> bool {
        let probability: f32 = self.config.failure_probability.into();

        if probability <= 0.0 {
            return false;
        }

        if probability >= 1.0 {
            return true;
        }

        self.rng.lock().random_bool(f64::from(probability))
    }

    fn latency(&self) -> Duration {
        let max_micros = u64::try_from(self.config.max_latency.as_micros()).unwrap_or(u64::MAX);

        if max_micros == 0 {
            return Duration::ZERO;
        }

        Duration::from_micros(self.rng.lock().random_range(0..=max_micros))
    }
}

impl<K, T, Tr> Transport<K, T> for ChaosTransport<Tr>
where
    Tr: Transport<K, T>,
    K: Send + 'static,
{
    type Error = ChaosError<Tr::Error>;

    fn fetch(&self, key: K) -> impl Future<Output = Result<T, Self::Error>> + Send {
        let latency = self.latency();
        let should_fail = self.should_fail();
        let inner = &self.inner;

        async move {
            if !latency.is_zero() {
                tokio::time::sleep(latency).await;
            }

            if should_fail {
                debug!(latency = ?latency, "injecting transport failure");
                return Err(ChaosError::Injected);
            }

            inner.fetch(key).await.map_err(ChaosError::Transport)
        }
    }

    fn classify(&self, error: &Self::Error) -> ErrorKind {
        match error {
            ChaosError::Injected => ErrorKind::Network,
            ChaosError::Transport(inner) => self.inner.classify(inner),
        }
    }
}

/// Adds [`with_chaos`](ChaosTransportExt::with_chaos) to every transport.
pub trait ChaosTransportExt: Sized {
    /// Wraps this transport in a [`ChaosTransport`].
    fn with_chaos(self, config: ChaosConfig) -> ChaosTransport<Self>;
}

impl<Tr> ChaosTransportExt for Tr {
    fn with_chaos(self, config: ChaosConfig) -> ChaosTransport<Self> {
        ChaosTransport::new(self, config)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::scripted::{Reply, ScriptedTransport};

    fn scripted() -> ScriptedTransport<&'static str, u32> {
        let transport = ScriptedTransport::new();
        transport.script("a", Reply::ok(1));
        transport
    }

    #[test]
    fn deterministic_config_sets_seed() {
        let default_is_none = ChaosConfig::default().deterministic_seed.is_none();
        let deterministic_is_some = ChaosConfig::deterministic().deterministic_seed.is_some();

        assert!(default_is_none && deterministic_is_some);
    }

    #[test]
    fn out_of_range_probability_is_clamped() {
        let config = ChaosConfig::deterministic().with_failure_probability(7.0);

        let probability: f32 = config.failure_probability.into();
        assert!((probability - 1.0).abs() < f32::EPSILON);
    }

    #[tokio::test]
    async fn zero_probability_passes_through() {
        let inner = scripted();
        let transport = inner.clone().with_chaos(ChaosConfig::deterministic());

        let result = Transport::<&str, u32>::fetch(&transport, "a").await;

        assert!(matches!(result, Ok(1)));
        assert_eq!(inner.call_count(), 1);
    }

    #[tokio::test]
    async fn full_probability_never_reaches_the_inner_transport() {
        let inner = scripted();
        let transport = inner
            .clone()
            .with_chaos(ChaosConfig::deterministic().with_failure_probability(1.0));

        let error = Transport::<&str, u32>::fetch(&transport, "a")
            .await
            .expect_err("failure injected");

        assert!(matches!(error, ChaosError::Injected));
        assert_eq!(
            Transport::<&str, u32>::classify(&transport, &error),
            ErrorKind::Network
        );
        assert_eq!(inner.call_count(), 0);
    }

    #[test]
    fn same_seed_injects_the_same_faults() {
        let config = ChaosConfig::seeded(42)
            .with_failure_probability(0.5)
            .with_latency_jitter(Duration::from_millis(20));
        let left = ChaosTransport::new((), config.clone());
        let right = ChaosTransport::new((), config);

        let left_faults: Vec<_> = (0..32).map(|_| (left.should_fail(), left.latency())).collect();
        let right_faults: Vec<_> = (0..32).map(|_| (right.should_fail(), right.latency())).collect();

        assert_eq!(left_faults, right_faults);
    }

    #[test]
    fn latency_stays_within_jitter() {
        let transport = ChaosTransport::new(
            (),
            ChaosConfig::deterministic().with_latency_jitter(Duration::from_millis(5)),
        );

        assert!((0..64).all(|_| transport.latency() <= Duration::from_millis(5)));
    }
}
