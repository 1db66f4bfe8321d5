use fetchcore::ResourceState;
use std::fmt::Debug;
use std::time::Duration;

/// Error returned by [`eventually`].
#[derive(Debug, thiserror::Error)]
pub enum WaitError {
    /// The condition did not hold before the timeout expired.
    #[error("condition not met within {0:?}")]
    Timeout(Duration),
}

/// Asserts that `states` is a lifecycle a loader can legally publish.
///
/// - `Idle` may only appear first.
/// - Every `Success`/`Error` directly follows `Loading` for the same key: a
///   request cycle produces at most one outcome, and only while it is current.
///
/// # Panics
///
/// Panics with the offending position when either rule is broken.
pub fn assert_consistent<K, T>(states: &[ResourceState<K, T>])
where
    K: PartialEq + Debug,
    T: Debug,
{
    for (index, state) in states.iter().enumerate() {
        match state {
            ResourceState::Idle => {
                assert!(index == 0, "Idle published at position {index}: {states:?}");
            }
            ResourceState::Loading { .. } => {}
            ResourceState::Success { key, .. } | ResourceState::Error { key, .. } => {
                let previous = index.checked_sub(1).and_then(|prev| states.get(prev));
                let follows_loading = matches!(
                    previous,
                    Some(ResourceState::Loading { key: loading }) if loading == key
                );
                assert!(
                    follows_loading,
                    "outcome for {key:?} at position {index} does not follow Loading for the same key: {states:?}"
                );
            }
        }
    }
}

/// Asserts that no `Success`/`Error` for `key` appears in `states`.
///
/// Meant for keys that were superseded while loading and never observed again.
///
/// # Panics
///
/// Panics when an outcome for `key` was published.
pub fn assert_superseded_never_published<K, T>(states: &[ResourceState<K, T>], key: &K)
where
    K: PartialEq + Debug,
    T: Debug,
{
    let leaked: Vec<_> = states
        .iter()
        .filter(|state| state.is_settled() && state.key() == Some(key))
        .collect();

    assert!(
        leaked.is_empty(),
        "superseded key {key:?} published outcome(s): {leaked:?}"
    );
}

/// Polls `condition` until it holds or `timeout` expires.
///
/// The condition is checked once before any waiting, then every millisecond.
pub async fn eventually<F>(timeout: Duration, mut condition: F) -> Result<(), WaitError>
where
    F: FnMut() -> bool,
{
    let poll = async {
        while !condition() {
            tokio::time::sleep(Duration::from_millis(1)).await;
        }
    };

    tokio::time::timeout(timeout, poll)
        .await
        .map_err(|_| WaitError::Timeout(timeout))
}
