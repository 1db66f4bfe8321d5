//! Hook recording every state a loader publishes.
//!
//! Subscribers of a loader's watch channel may miss intermediate states when
//! several are published between two polls. `StateCollector` is attached as a
//! hook instead, so it sees the complete sequence in publication order.
//!
//! # Example
//!
//! ```ignore
//! let collector = Arc::new(StateCollector::new());
//! let loader = ResourceLoader::builder(transport)
//!     .hook(collector.clone())
//!     .build();
//!
//! loader.observe("posts");
//! loader.settled().await?;
//!
//! assert_eq!(collector.len(), 2);
//! ```

use fetchcore::{LoaderHook, ResourceState};
use parking_lot::Mutex;

/// A [`LoaderHook`] accumulating published states for assertions.
#[derive(Debug)]
pub struct StateCollector<K, T> {
    states: Mutex<Vec<ResourceState<K, T>>>,
}

impl<K, T> Default for StateCollector<K, T> {
    fn default() -> Self {
        Self {
            states: Mutex::new(Vec::new()),
        }
    }
}

impl<K, T> StateCollector<K, T>
where
    K: Clone,
    T: Clone,
{
    /// Creates an empty collector.
    pub fn new() -> Self {
        Self::default()
    }

    /// Returns a copy of every state recorded so far.
    pub fn states(&self) -> Vec<ResourceState<K, T>> {
        self.states.lock().clone()
    }

    /// Returns only the `Success` and `Error` states.
    pub fn settled(&self) -> Vec<ResourceState<K, T>> {
        self.states
            .lock()
            .iter()
            .filter(|state| state.is_settled())
            .cloned()
            .collect()
    }

    /// The most recently recorded state.
    pub fn last(&self) -> Option<ResourceState<K, T>> {
        self.states.lock().last().cloned()
    }

    /// Number of recorded states.
    pub fn len(&self) -> usize {
        self.states.lock().len()
    }

    /// Whether nothing has been recorded.
    pub fn is_empty(&self) -> bool {
        self.states.lock().is_empty()
    }
}

impl<K, T> LoaderHook<K, T> for StateCollector<K, T>
where
    K: Clone + Send,
    T: Clone + Send,
{
    fn on_state_published(&self, state: &ResourceState<K, T>) {
        self.states.lock().push(state.clone());
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn records_states_in_publication_order() {
        let collector: StateCollector<&str, u8> = StateCollector::new();

        collector.on_state_published(&ResourceState::Loading { key: "a" });
        collector.on_state_published(&ResourceState::Loading { key: "b" });
        collector.on_state_published(&ResourceState::Success { key: "b", data: 2 });

        assert_eq!(
            collector.states(),
            vec![
                ResourceState::Loading { key: "a" },
                ResourceState::Loading { key: "b" },
                ResourceState::Success { key: "b", data: 2 },
            ]
        );
        assert_eq!(
            collector.settled(),
            vec![ResourceState::Success { key: "b", data: 2 }]
        );
        assert_eq!(collector.last(), Some(ResourceState::Success { key: "b", data: 2 }));
    }

    #[test]
    fn starts_empty() {
        let collector: StateCollector<String, String> = StateCollector::new();

        assert!(collector.is_empty());
        assert_eq!(collector.last(), None);
    }
}
