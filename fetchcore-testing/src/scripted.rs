//! Transport with per-key scripted replies.
//!
//! Replies for a key are consumed in the order they were scripted. The last
//! reply for a key is sticky: once the queue is down to one entry, every
//! further fetch of that key gets a copy of it.
//!
//! ```rust,ignore
//! let transport = ScriptedTransport::new();
//! transport.script("a", Reply::ok(1).after(Duration::from_millis(50)));
//! transport.script("b", Reply::ok(2).after(Duration::from_millis(5)));
//! let gate = transport.gate("c", Reply::err("offline"));
//!
//! let loader = ResourceLoader::new(transport.clone());
//! // ...
//! gate.open();
//! assert_eq!(transport.call_count(), 3);
//! ```

use fetchcore::{ErrorKind, Transport};
use parking_lot::Mutex;
use std::collections::{HashMap, VecDeque};
use std::future::Future;
use std::hash::Hash;
use std::sync::Arc;
use std::time::Duration;
use thiserror::Error;
use tokio::sync::watch;

/// Failure produced by a [`ScriptedTransport`].
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum ScriptedError {
    /// A key was fetched that has no scripted reply.
    #[error("no reply scripted for key {0}")]
    Unscripted(String),

    /// A failure scripted with [`Reply::err`] or [`Reply::err_with`].
    #[error("{message}")]
    Scripted {
        /// Classification reported through [`Transport::classify`].
        kind: ErrorKind,
        /// Display string of the failure.
        message: String,
    },
}

/// One scripted reply: an outcome and how long it takes to arrive.
#[derive(Debug, Clone)]
pub struct Reply<T> {
    outcome: Result<T, ScriptedError>,
    delay: Duration,
}

impl<T> Reply<T> {
    /// Succeeds with `data`.
    pub const fn ok(data: T) -> Self {
        Self {
            outcome: Ok(data),
            delay: Duration::ZERO,
        }
    }

    /// Fails with a network error carrying `message`.
    pub fn err(message: impl Into<String>) -> Self {
        Self::err_with(ErrorKind::Network, message)
    }

    /// Fails with the given classification and message.
    pub fn err_with(kind: ErrorKind, message: impl Into<String>) -> Self {
        Self {
            outcome: Err(ScriptedError::Scripted {
                kind,
                message: message.into(),
            }),
            delay: Duration::ZERO,
        }
    }

    /// Delays the reply by `delay` after the fetch starts.
    #[must_use]
    pub const fn after(mut self, delay: Duration) -> Self {
        self.delay = delay;
        self
    }
}

/// Handle releasing a gated reply; see [`ScriptedTransport::gate`].
///
/// A gate stays open once opened, so every fetch using it completes.
#[derive(Debug, Clone)]
pub struct Gate {
    sender: Arc<watch::Sender<bool>>,
}

impl Gate {
    fn new() -> Self {
        let (sender, _) = watch::channel(false);
        Self {
            sender: Arc::new(sender),
        }
    }

    /// Releases every fetch waiting on this gate.
    pub fn open(&self) {
        self.sender.send_replace(true);
    }

    /// Whether [`open`](Self::open) has been called.
    pub fn is_open(&self) -> bool {
        *self.sender.borrow()
    }
}

#[derive(Debug, Clone)]
enum Step<T> {
    Timed(Reply<T>),
    Gated(Reply<T>, Gate),
}

struct Script<K, T> {
    steps: HashMap<K, VecDeque<Step<T>>>,
    calls: Vec<K>,
}

/// Transport replying from a per-key script. Clones share the same script and
/// call log.
pub struct ScriptedTransport<K, T> {
    script: Arc<Mutex<Script<K, T>>>,
}

impl<K, T> Clone for ScriptedTransport<K, T> {
    fn clone(&self) -> Self {
        Self {
            script: Arc::clone(&self.script),
        }
    }
}

impl<K, T> Default for ScriptedTransport<K, T> {
    fn default() -> Self {
        Self {
            script: Arc::new(Mutex::new(Script {
                steps: HashMap::new(),
                calls: Vec::new(),
            })),
        }
    }
}

impl<K, T> ScriptedTransport<K, T>
where
    K: Clone + Eq + Hash,
    T: Clone,
{
    /// Creates a transport with an empty script.
    pub fn new() -> Self {
        Self::default()
    }

    /// Appends `reply` to the replies for `key`.
    pub fn script(&self, key: K, reply: Reply<T>) -> &Self {
        self.push(key, Step::Timed(reply));
        self
    }

    /// Appends a reply for `key` that is held back until the returned gate is
    /// opened. The reply's own delay, if any, starts counting after that.
    pub fn gate(&self, key: K, reply: Reply<T>) -> Gate {
        let gate = Gate::new();
        self.push(key, Step::Gated(reply, gate.clone()));
        gate
    }

    /// Every fetched key, in call order.
    pub fn calls(&self) -> Vec<K> {
        self.script.lock().calls.clone()
    }

    /// Number of fetches so far.
    pub fn call_count(&self) -> usize {
        self.script.lock().calls.len()
    }

    /// Number of fetches of `key` so far.
    pub fn calls_for(&self, key: &K) -> usize {
        self.script
            .lock()
            .calls
            .iter()
            .filter(|called| *called == key)
            .count()
    }

    fn push(&self, key: K, step: Step<T>) {
        self.script
            .lock()
            .steps
            .entry(key)
            .or_default()
            .push_back(step);
    }

    fn next_step(&self, key: &K) -> Option<Step<T>> {
        let mut script = self.script.lock();
        script.calls.push(key.clone());

        let queue = script.steps.get_mut(key)?;
        if queue.len() > 1 {
            queue.pop_front()
        } else {
            queue.front().cloned()
        }
    }
}

impl<K, T> Transport<K, T> for ScriptedTransport<K, T>
where
    K: Clone + Eq + Hash + std::fmt::Debug + Send + Sync + 'static,
    T: Clone + Send + Sync + 'static,
{
    type Error = ScriptedError;

    fn fetch(&self, key: K) -> impl Future<Output = Result<T, ScriptedError>> + Send {
        let step = self.next_step(&key);

        async move {
            let reply = match step {
                None => return Err(ScriptedError::Unscripted(format!("{key:?}"))),
                Some(Step::Timed(reply)) => reply,
                Some(Step::Gated(reply, gate)) => {
                    let mut opened = gate.sender.subscribe();
                    let _ = opened.wait_for(|open| *open).await;
                    reply
                }
            };

            if !reply.delay.is_zero() {
                tokio::time::sleep(reply.delay).await;
            }

            reply.outcome
        }
    }

    fn classify(&self, error: &ScriptedError) -> ErrorKind {
        match error {
            ScriptedError::Unscripted(_) => ErrorKind::Other,
            ScriptedError::Scripted { kind, .. } => *kind,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn unscripted_key_fails() {
        let transport: ScriptedTransport<&str, u32> = ScriptedTransport::new();

        let error = transport.fetch("missing").await.expect_err("no reply scripted");

        assert_eq!(error, ScriptedError::Unscripted("\"missing\"".to_string()));
        assert_eq!(transport.classify(&error), ErrorKind::Other);
    }

    #[tokio::test]
    async fn replies_are_consumed_in_order_and_the_last_one_sticks() {
        let transport = ScriptedTransport::new();
        transport
            .script("a", Reply::ok(1))
            .script("a", Reply::ok(2));

        let first = transport.fetch("a").await;
        let second = transport.fetch("a").await;
        let third = transport.fetch("a").await;

        assert_eq!(first, Ok(1));
        assert_eq!(second, Ok(2));
        assert_eq!(third, Ok(2));
        assert_eq!(transport.calls(), vec!["a", "a", "a"]);
    }

    #[tokio::test]
    async fn scripted_failures_carry_their_kind() {
        let transport: ScriptedTransport<&str, u32> = ScriptedTransport::new();
        transport.script("x", Reply::err_with(ErrorKind::Response(503), "unavailable"));

        let error = transport.fetch("x").await.expect_err("scripted failure");

        assert_eq!(error.to_string(), "unavailable");
        assert_eq!(transport.classify(&error), ErrorKind::Response(503));
    }

    #[tokio::test(start_paused = true)]
    async fn delayed_reply_waits_for_its_delay() {
        let transport = ScriptedTransport::new();
        transport.script("slow", Reply::ok("done").after(Duration::from_millis(50)));
        let started = tokio::time::Instant::now();

        let result = transport.fetch("slow").await;

        assert_eq!(result, Ok("done"));
        assert!(started.elapsed() >= Duration::from_millis(50));
    }

    #[tokio::test]
    async fn gated_reply_waits_until_opened() {
        let transport = ScriptedTransport::new();
        let gate = transport.gate("held", Reply::ok(7_u8));

        let fetch = tokio::spawn({
            let transport = transport.clone();
            async move { transport.fetch("held").await }
        });
        tokio::task::yield_now().await;
        assert!(!fetch.is_finished());
        assert!(!gate.is_open());

        gate.open();

        assert_eq!(fetch.await.expect("task completes"), Ok(7));
        assert_eq!(transport.calls_for(&"held"), 1);
    }
}
