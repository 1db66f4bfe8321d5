//! The request-sharing transport decorator.

use crate::config::CacheConfig;
use fetchcore::{ErrorKind, ResourceKey, Transport};
use futures::future::{BoxFuture, FutureExt, Shared, WeakShared};
use parking_lot::Mutex;
use std::collections::HashMap;
use std::fmt;
use std::future::Future;
use std::sync::Arc;
use std::time::Duration;
use tokio::time::Instant;
use tracing::debug;

/// Failure of a shared fetch. Every caller that joined the fetch receives a
/// clone of the same underlying error.
pub struct SharedError<E>(Arc<E>);

impl<E> SharedError<E> {
    fn new(error: E) -> Self {
        Self(Arc::new(error))
    }

    /// The error produced by the wrapped transport.
    pub fn inner(&self) -> &E {
        &self.0
    }
}

impl<E> Clone for SharedError<E> {
    fn clone(&self) -> Self {
        Self(Arc::clone(&self.0))
    }
}

impl<E: fmt::Debug> fmt::Debug for SharedError<E> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_tuple("SharedError").field(&self.0).finish()
    }
}

impl<E: fmt::Display> fmt::Display for SharedError<E> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        fmt::Display::fmt(&self.0, f)
    }
}

impl<E: std::error::Error> std::error::Error for SharedError<E> {
    fn source(&self) -> Option<&(dyn std::error::Error + 'static)> {
        std::error::Error::source(self.0.as_ref())
    }
}

type SharedFetch<T, E> = Shared<BoxFuture<'static, Result<T, SharedError<E>>>>;
type WeakFetch<T, E> = WeakShared<BoxFuture<'static, Result<T, SharedError<E>>>>;

/// A pending slot only holds a weak handle: the fetch lives as long as some
/// caller still awaits it.
enum Slot<T, E> {
    Pending {
        generation: u64,
        fetch: WeakFetch<T, E>,
    },
    Ready {
        value: T,
        stored_at: Instant,
    },
}

struct Slots<K, T, E> {
    entries: HashMap<K, Slot<T, E>>,
    generations: u64,
}

enum Lookup<T, E> {
    Hit(T),
    Join(SharedFetch<T, E>),
}

/// Clears the pending slot of a fetch that is dropped before it settles,
/// which happens when every caller awaiting it was cancelled.
struct PendingGuard<K, T, E>
where
    K: ResourceKey,
    T: Clone,
{
    slots: Arc<Mutex<Slots<K, T, E>>>,
    key: K,
    generation: u64,
}

impl<K, T, E> Drop for PendingGuard<K, T, E>
where
    K: ResourceKey,
    T: Clone,
{
    fn drop(&mut self) {
        self.slots.lock().forget_pending(&self.key, self.generation);
    }
}

impl<K, T, E> Slots<K, T, E>
where
    K: ResourceKey,
    T: Clone,
{
    fn is_fresh(stored_at: Instant, retention: Option<Duration>, now: Instant) -> bool {
        retention.is_some_and(|ttl| now.saturating_duration_since(stored_at) < ttl)
    }

    fn purge_expired(&mut self, retention: Option<Duration>, now: Instant) {
        self.entries.retain(|_, slot| match slot {
            Slot::Pending { .. } => true,
            Slot::Ready { stored_at, .. } => Self::is_fresh(*stored_at, retention, now),
        });
    }

    fn pending_len(&self) -> usize {
        self.entries
            .values()
            .filter(|slot| matches!(slot, Slot::Pending { .. }))
            .count()
    }

    fn is_pending(&self, key: &K, generation: u64) -> bool {
        matches!(
            self.entries.get(key),
            Some(Slot::Pending { generation: current, .. }) if *current == generation
        )
    }

    fn forget_pending(&mut self, key: &K, generation: u64) {
        if self.is_pending(key, generation) {
            debug!(key = ?key, generation, "dropping abandoned fetch");
            let _ = self.entries.remove(key);
        }
    }

    fn ready_len(&self) -> usize {
        self.entries
            .values()
            .filter(|slot| matches!(slot, Slot::Ready { .. }))
            .count()
    }

    fn evict_oldest(&mut self, max_entries: usize) {
        while self.ready_len() > max_entries {
            let oldest = self
                .entries
                .iter()
                .filter_map(|(key, slot)| match slot {
                    Slot::Ready { stored_at, .. } => Some((key, *stored_at)),
                    Slot::Pending { .. } => None,
                })
                .min_by_key(|(_, stored_at)| *stored_at)
                .map(|(key, _)| key.clone());

            let Some(oldest) = oldest else {
                return;
            };
            debug!(key = ?oldest, "evicting oldest cached value");
            let _ = self.entries.remove(&oldest);
        }
    }

    /// Records the outcome of the fetch started as `generation`, unless the
    /// key was invalidated or refetched in the meantime.
    fn settle(
        &mut self,
        key: K,
        generation: u64,
        result: &Result<T, SharedError<E>>,
        config: &CacheConfig,
    ) {
        if !self.is_pending(&key, generation) {
            return;
        }

        match (result, config.retention()) {
            (Ok(value), Some(_)) => {
                let _ = self.entries.insert(
                    key,
                    Slot::Ready {
                        value: value.clone(),
                        stored_at: Instant::now(),
                    },
                );
                self.evict_oldest(config.max_entries());
            }
            _ => {
                let _ = self.entries.remove(&key);
            }
        }
    }
}

/// Transport decorator sharing concurrent fetches of the same key.
///
/// Clones share the same in-flight fetches and retained values, so hand a
/// clone to every loader that should cooperate. Failures are never retained.
pub struct SharedTransport<K, T, Tr>
where
    Tr: Transport<K, T>,
{
    inner: Arc<Tr>,
    config: CacheConfig,
    slots: Arc<Mutex<Slots<K, T, Tr::Error>>>,
}

impl<K, T, Tr> Clone for SharedTransport<K, T, Tr>
where
    Tr: Transport<K, T>,
{
    fn clone(&self) -> Self {
        Self {
            inner: Arc::clone(&self.inner),
            config: self.config,
            slots: Arc::clone(&self.slots),
        }
    }
}

impl<K, T, Tr> SharedTransport<K, T, Tr>
where
    K: ResourceKey,
    T: Clone + Send + Sync + 'static,
    Tr: Transport<K, T>,
{
    /// Wraps `inner` with the retention described by `config`.
    pub fn new(inner: Tr, config: CacheConfig) -> Self {
        Self {
            inner: Arc::new(inner),
            config,
            slots: Arc::new(Mutex::new(Slots {
                entries: HashMap::new(),
                generations: 0,
            })),
        }
    }

    /// Forgets `key`. A fetch still in flight for it keeps running for the
    /// callers already waiting on it, but its outcome is not retained and the
    /// next fetch of `key` starts a new call.
    pub fn invalidate(&self, key: &K) {
        if self.slots.lock().entries.remove(key).is_some() {
            debug!(key = ?key, "invalidated cache entry");
        }
    }

    /// Forgets every key.
    pub fn clear(&self) {
        self.slots.lock().entries.clear();
        debug!("cleared cache");
    }

    /// Number of retained, unexpired values.
    pub fn cached_len(&self) -> usize {
        let mut slots = self.slots.lock();
        slots.purge_expired(self.config.retention(), Instant::now());
        slots.ready_len()
    }

    /// Number of fetches currently in flight.
    pub fn pending_len(&self) -> usize {
        self.slots.lock().pending_len()
    }

    /// Whether an unexpired value for `key` is retained.
    pub fn is_cached(&self, key: &K) -> bool {
        let retention = self.config.retention();
        let now = Instant::now();
        matches!(
            self.slots.lock().entries.get(key),
            Some(Slot::Ready { stored_at, .. }) if Slots::<K, T, Tr::Error>::is_fresh(*stored_at, retention, now)
        )
    }

    /// The wrapped transport.
    pub fn inner(&self) -> &Tr {
        &self.inner
    }

    fn lookup(&self, key: &K) -> Lookup<T, Tr::Error> {
        let retention = self.config.retention();
        let now = Instant::now();
        let mut slots = self.slots.lock();

        match slots.entries.get(key) {
            Some(Slot::Ready { value, stored_at })
                if Slots::<K, T, Tr::Error>::is_fresh(*stored_at, retention, now) =>
            {
                debug!(key = ?key, "serving cached value");
                return Lookup::Hit(value.clone());
            }
            Some(Slot::Pending { fetch, .. }) => {
                if let Some(fetch) = fetch.upgrade() {
                    debug!(key = ?key, "joining in-flight fetch");
                    return Lookup::Join(fetch);
                }
            }
            _ => {}
        }

        slots.generations += 1;
        let generation = slots.generations;

        let inner = Arc::clone(&self.inner);
        let config = self.config;
        let guard = PendingGuard {
            slots: Arc::clone(&self.slots),
            key: key.clone(),
            generation,
        };
        let fetch = async move {
            let result = inner
                .fetch(guard.key.clone())
                .await
                .map_err(SharedError::new);
            guard
                .slots
                .lock()
                .settle(guard.key.clone(), generation, &result, &config);
            result
        }
        .boxed()
        .shared();

        debug!(key = ?key, generation, "starting shared fetch");
        if let Some(weak) = fetch.downgrade() {
            let _ = slots.entries.insert(
                key.clone(),
                Slot::Pending {
                    generation,
                    fetch: weak,
                },
            );
        }

        Lookup::Join(fetch)
    }
}

impl<K, T, Tr> Transport<K, T> for SharedTransport<K, T, Tr>
where
    K: ResourceKey,
    T: Clone + Send + Sync + 'static,
    Tr: Transport<K, T>,
{
    type Error = SharedError<Tr::Error>;

    fn fetch(&self, key: K) -> impl Future<Output = Result<T, Self::Error>> + Send {
        let lookup = self.lookup(&key);

        async move {
            match lookup {
                Lookup::Hit(value) => Ok(value),
                Lookup::Join(fetch) => fetch.await,
            }
        }
    }

    fn classify(&self, error: &Self::Error) -> ErrorKind {
        self.inner.classify(error.inner())
    }
}
