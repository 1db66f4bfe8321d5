//! The resource loader state machine.
//!
//! A [`ResourceLoader`] tracks one key at a time. Observing a key that differs
//! from the tracked one starts a new *request cycle*:
//!
//! 1. a fresh request token is minted, making every earlier token stale;
//! 2. `Loading { key }` is published;
//! 3. the transport is invoked on a spawned task;
//! 4. when the task completes it re-checks its token under the loader lock and
//!    publishes `Success`/`Error` only if the token is still current and the
//!    loader has not been disposed. Otherwise the outcome is dropped without a
//!    trace.
//!
//! Step 4 is what makes the last observed key win even when responses arrive
//! out of order. Nothing relies on the transport being cancellable.
//!
//! ```text
//!   Idle ──observe(k)──► Loading(k) ──ok──► Success(k)
//!                          │   ▲   └─err──► Error(k)
//!                          │   └──observe(k') / refetch()──┘ (from any state)
//!                          └── dispose() freezes the current state
//! ```

use crate::config::{CancellationPolicy, LoaderConfig, LoaderName};
use crate::errors::{ErrorInfo, LoaderError, LoaderResult};
use crate::hooks::{DiscardReason, LoaderHook, RequestEvent};
use crate::key::ResourceKey;
use crate::state::ResourceState;
use crate::token::{RequestToken, TokenMint};
use crate::transport::Transport;
use parking_lot::Mutex;
use std::sync::Arc;
use std::time::Duration;
use tokio::sync::watch;
use tokio::task::JoinHandle;
use tokio::time::Instant;
use tracing::{debug, info, warn, Instrument};

/// Controller driving fetches for a changing key.
///
/// The loader must be created and used inside a Tokio runtime: every request
/// cycle runs its transport call on a spawned task. Dropping the loader
/// disposes it.
///
/// # Example
///
/// ```rust,ignore
/// let loader = ResourceLoader::new(transport_fn(fetch_posts));
///
/// // Called on every render; only a changed key issues a request.
/// let state = loader.observe(current_page);
/// render(&state);
/// ```
pub struct ResourceLoader<K, T, Tr>
where
    K: ResourceKey,
    T: Clone + Send + Sync + 'static,
    Tr: Transport<K, T>,
{
    inner: Arc<Shared<K, T, Tr>>,
}

/// State shared between the loader handle and its in-flight request tasks.
struct Shared<K, T, Tr> {
    config: LoaderConfig,
    transport: Tr,
    hooks: Vec<Arc<dyn LoaderHook<K, T>>>,
    cycle: Mutex<Cycle<K>>,
    states: watch::Sender<ResourceState<K, T>>,
    disposed: watch::Sender<bool>,
}

/// Bookkeeping for the current request cycle. Guarded by `Shared::cycle`;
/// every state publication happens while this lock is held.
struct Cycle<K> {
    tokens: TokenMint,
    key: Option<K>,
    in_flight: Option<InFlight>,
    disposed: bool,
}

struct InFlight {
    token: RequestToken,
    issued_at: Instant,
    task: JoinHandle<()>,
}

impl<K> Cycle<K> {
    fn is_current(&self, token: RequestToken) -> bool {
        self.in_flight
            .as_ref()
            .is_some_and(|in_flight| in_flight.token == token)
    }
}

impl<K, T, Tr> ResourceLoader<K, T, Tr>
where
    K: ResourceKey,
    T: Clone + Send + Sync + 'static,
    Tr: Transport<K, T>,
{
    /// Creates a loader with the default configuration and no hooks.
    pub fn new(transport: Tr) -> Self {
        Self::builder(transport).build()
    }

    /// Creates a loader with `config` and no hooks.
    pub fn with_config(transport: Tr, config: LoaderConfig) -> Self {
        Self::builder(transport).config(config).build()
    }

    /// Starts building a loader around `transport`.
    pub fn builder(transport: Tr) -> LoaderBuilder<K, T, Tr> {
        LoaderBuilder {
            transport,
            config: LoaderConfig::default(),
            hooks: Vec::new(),
        }
    }

    /// Tracks `key` and returns the resulting state.
    ///
    /// If `key` equals the tracked key and its cycle is loading or succeeded,
    /// this is a pure read: no request is issued and an in-flight `Loading` is
    /// not reset. Otherwise a new request cycle starts and the returned state
    /// is `Loading { key }`; in particular, observing a key whose cycle failed
    /// retries it.
    ///
    /// After [`dispose`](Self::dispose) the frozen state is returned and a
    /// warning is logged; use [`try_observe`](Self::try_observe) to get an error
    /// instead.
    pub fn observe(&self, key: K) -> ResourceState<K, T> {
        let mut cycle = self.inner.cycle.lock();

        if cycle.disposed {
            warn!(
                loader = %self.inner.config.name,
                key = ?key,
                "observe called on disposed loader"
            );
            return self.state();
        }

        if self.inner.is_tracking(&cycle, &key) {
            return self.state();
        }

        self.inner.begin_cycle(&mut cycle, key)
    }

    /// Like [`observe`](Self::observe), but fails once the loader is disposed.
    pub fn try_observe(&self, key: K) -> LoaderResult<ResourceState<K, T>> {
        let mut cycle = self.inner.cycle.lock();

        if cycle.disposed {
            return Err(self.inner.disposed_error());
        }

        if self.inner.is_tracking(&cycle, &key) {
            return Ok(self.state());
        }

        Ok(self.inner.begin_cycle(&mut cycle, key))
    }

    /// Starts a new request cycle for the tracked key.
    ///
    /// Unlike [`observe`](Self::observe), this also reloads a key that is
    /// loading or succeeded. The loader never retries on its own. Any request
    /// still in flight for the key is superseded.
    pub fn refetch(&self) -> LoaderResult<ResourceState<K, T>> {
        let mut cycle = self.inner.cycle.lock();

        if cycle.disposed {
            return Err(self.inner.disposed_error());
        }

        let key = cycle.key.clone().ok_or_else(|| self.inner.not_observing_error())?;

        Ok(self.inner.begin_cycle(&mut cycle, key))
    }

    /// Stops the loader. The in-flight request, if any, can no longer publish
    /// and no further state transition will ever happen. Idempotent.
    pub fn dispose(&self) {
        self.inner.dispose();
    }

    /// Waits until the current request cycle has produced its outcome.
    ///
    /// If the key changes while waiting, the outcome of the newest cycle is
    /// returned; outcomes of superseded cycles are never seen here either.
    ///
    /// # Errors
    ///
    /// - [`LoaderError::NotObserving`] if no key has been observed yet.
    /// - [`LoaderError::Disposed`] if the loader is, or becomes, disposed before
    ///   the cycle settles.
    pub async fn settled(&self) -> LoaderResult<ResourceState<K, T>> {
        let mut states = self.inner.states.subscribe();
        let mut disposed = self.inner.disposed.subscribe();

        if *disposed.borrow() {
            return Err(self.inner.disposed_error());
        }

        if matches!(*states.borrow(), ResourceState::Idle) {
            return Err(self.inner.not_observing_error());
        }

        tokio::select! {
            biased;
            settled = states.wait_for(ResourceState::is_settled) => {
                settled
                    .map(|state| (*state).clone())
                    .map_err(|_| self.inner.disposed_error())
            }
            _ = disposed.wait_for(|disposed| *disposed) => Err(self.inner.disposed_error()),
        }
    }

    /// The current state, without side effects.
    pub fn state(&self) -> ResourceState<K, T> {
        self.inner.states.borrow().clone()
    }

    /// Receiver notified of every state published from now on.
    pub fn subscribe(&self) -> watch::Receiver<ResourceState<K, T>> {
        self.inner.states.subscribe()
    }

    /// The tracked key, if any.
    pub fn key(&self) -> Option<K> {
        self.inner.cycle.lock().key.clone()
    }

    /// Whether [`dispose`](Self::dispose) has been called.
    pub fn is_disposed(&self) -> bool {
        self.inner.cycle.lock().disposed
    }

    /// The configured loader name.
    pub fn name(&self) -> &LoaderName {
        &self.inner.config.name
    }
}

impl<K, T, Tr> Drop for ResourceLoader<K, T, Tr>
where
    K: ResourceKey,
    T: Clone + Send + Sync + 'static,
    Tr: Transport<K, T>,
{
    fn drop(&mut self) {
        self.inner.dispose();
    }
}

impl<K, T, Tr> Shared<K, T, Tr>
where
    K: ResourceKey,
    T: Clone + Send + Sync + 'static,
    Tr: Transport<K, T>,
{
    /// Whether observing `key` leaves the current cycle alone. A failed cycle
    /// does not count, so observing its key again retries it.
    fn is_tracking(&self, cycle: &Cycle<K>, key: &K) -> bool {
        cycle.key.as_ref() == Some(key)
            && !matches!(*self.states.borrow(), ResourceState::Error { .. })
    }

    fn begin_cycle(self: &Arc<Self>, cycle: &mut Cycle<K>, key: K) -> ResourceState<K, T> {
        self.retire_in_flight(cycle);

        let token = cycle.tokens.mint();
        debug!(
            loader = %self.config.name,
            key = ?key,
            token = %token,
            "issuing request"
        );

        let event = self.request_event(&key, Duration::ZERO);
        for hook in &self.hooks {
            hook.on_request_issued(&event);
        }

        let loading = ResourceState::Loading { key: key.clone() };
        self.publish(loading.clone());
        cycle.key = Some(key.clone());

        let task = tokio::spawn(Arc::clone(self).run_request(key, token).in_current_span());
        cycle.in_flight = Some(InFlight {
            token,
            issued_at: Instant::now(),
            task,
        });

        loading
    }

    async fn run_request(self: Arc<Self>, key: K, token: RequestToken) {
        let started = Instant::now();
        let outcome = self.transport.fetch(key.clone()).await;
        let elapsed = started.elapsed();

        let mut cycle = self.cycle.lock();

        if cycle.disposed {
            debug!(
                loader = %self.config.name,
                key = ?key,
                token = %token,
                "discarding response after dispose"
            );
            self.notify_discarded(&key, elapsed, DiscardReason::Disposed);
            return;
        }

        if !cycle.is_current(token) {
            debug!(
                loader = %self.config.name,
                key = ?key,
                token = %token,
                "discarding superseded response"
            );
            self.notify_discarded(&key, elapsed, DiscardReason::Superseded);
            return;
        }

        cycle.in_flight = None;

        let state = match outcome {
            Ok(data) => ResourceState::Success { key, data },
            Err(error) => {
                let kind = self.transport.classify(&error);
                ResourceState::Error {
                    key,
                    error: ErrorInfo::from_error(kind, error),
                }
            }
        };

        debug!(
            loader = %self.config.name,
            token = %token,
            status = ?state.status(),
            elapsed_ms = u64::try_from(elapsed.as_millis()).unwrap_or(u64::MAX),
            "request settled"
        );
        self.publish(state);
    }

    /// Lets go of the in-flight request, aborting its task when configured to.
    fn retire_in_flight(&self, cycle: &mut Cycle<K>) {
        let Some(previous) = cycle.in_flight.take() else {
            return;
        };

        if self.config.cancellation != CancellationPolicy::AbortInFlight
            || previous.task.is_finished()
        {
            return;
        }

        previous.task.abort();

        if let Some(key) = cycle.key.as_ref() {
            debug!(
                loader = %self.config.name,
                key = ?key,
                token = %previous.token,
                "aborted in-flight request"
            );
            let event = self.request_event(key, previous.issued_at.elapsed());
            for hook in &self.hooks {
                hook.on_aborted(&event);
            }
        }
    }

    fn dispose(&self) {
        let mut cycle = self.cycle.lock();

        if cycle.disposed {
            return;
        }

        cycle.disposed = true;
        self.retire_in_flight(&mut cycle);
        self.disposed.send_replace(true);

        info!(loader = %self.config.name, "loader disposed");
    }

    fn publish(&self, state: ResourceState<K, T>) {
        for hook in &self.hooks {
            hook.on_state_published(&state);
        }
        self.states.send_replace(state);
    }

    fn notify_discarded(&self, key: &K, elapsed: Duration, reason: DiscardReason) {
        let event = self.request_event(key, elapsed);
        for hook in &self.hooks {
            hook.on_discarded(&event, reason);
        }
    }

    fn request_event<'a>(&'a self, key: &'a K, elapsed: Duration) -> RequestEvent<'a, K> {
        RequestEvent {
            loader: &self.config.name,
            key,
            elapsed,
        }
    }

    fn disposed_error(&self) -> LoaderError {
        LoaderError::Disposed(self.config.name.clone())
    }

    fn not_observing_error(&self) -> LoaderError {
        LoaderError::NotObserving(self.config.name.clone())
    }
}

/// Builder for [`ResourceLoader`]; obtained from [`ResourceLoader::builder`].
pub struct LoaderBuilder<K, T, Tr> {
    transport: Tr,
    config: LoaderConfig,
    hooks: Vec<Arc<dyn LoaderHook<K, T>>>,
}

impl<K, T, Tr> LoaderBuilder<K, T, Tr>
where
    K: ResourceKey,
    T: Clone + Send + Sync + 'static,
    Tr: Transport<K, T>,
{
    /// Replaces the whole configuration.
    #[must_use]
    pub fn config(mut self, config: LoaderConfig) -> Self {
        self.config = config;
        self
    }

    /// Sets the loader name.
    #[must_use]
    pub fn name(mut self, name: LoaderName) -> Self {
        self.config = self.config.with_name(name);
        self
    }

    /// Sets the cancellation policy.
    #[must_use]
    pub fn cancellation(mut self, cancellation: CancellationPolicy) -> Self {
        self.config = self.config.with_cancellation(cancellation);
        self
    }

    /// Adds a lifecycle hook. Hooks run in the order they were added.
    #[must_use]
    pub fn hook<H>(mut self, hook: Arc<H>) -> Self
    where
        H: LoaderHook<K, T> + 'static,
    {
        self.hooks.push(hook);
        self
    }

    /// Builds the loader in the `Idle` state.
    pub fn build(self) -> ResourceLoader<K, T, Tr> {
        let (states, _) = watch::channel(ResourceState::Idle);
        let (disposed, _) = watch::channel(false);

        ResourceLoader {
            inner: Arc::new(Shared {
                config: self.config,
                transport: self.transport,
                hooks: self.hooks,
                cycle: Mutex::new(Cycle {
                    tokens: TokenMint::default(),
                    key: None,
                    in_flight: None,
                    disposed: false,
                }),
                states,
                disposed,
            }),
        }
    }
}
