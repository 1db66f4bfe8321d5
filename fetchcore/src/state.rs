//! Observable lifecycle state of a loader.
//!
//! [`ResourceState`] is a tagged union: every variant carries exactly the
//! fields that are meaningful for it, so a `Success` without data or an `Error`
//! with stale data cannot be represented.

use crate::errors::ErrorInfo;
use serde::{Deserialize, Serialize, Serializer};

/// Discriminant of a [`ResourceState`].
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum ResourceStatus {
    /// No key has been observed yet.
    Idle,
    /// A request for the tracked key is in flight.
    Loading,
    /// The latest request for the tracked key succeeded.
    Success,
    /// The latest request for the tracked key failed.
    Error,
}

/// The complete observable state of a loader at one instant.
///
/// `Idle` only ever appears before the first key is observed. A key change from
/// any later state goes back to `Loading`, clearing data and error.
#[derive(Debug, Clone, PartialEq)]
pub enum ResourceState<K, T> {
    /// Nothing observed yet.
    Idle,
    /// Waiting for the response to the request for `key`.
    Loading {
        /// Key being fetched.
        key: K,
    },
    /// `key` was fetched successfully.
    Success {
        /// Key the data belongs to.
        key: K,
        /// Fetched resource.
        data: T,
    },
    /// Fetching `key` failed.
    Error {
        /// Key the failure belongs to.
        key: K,
        /// Classified transport failure.
        error: ErrorInfo,
    },
}

impl<K, T> ResourceState<K, T> {
    /// The discriminant of this state.
    pub const fn status(&self) -> ResourceStatus {
        match self {
            Self::Idle => ResourceStatus::Idle,
            Self::Loading { .. } => ResourceStatus::Loading,
            Self::Success { .. } => ResourceStatus::Success,
            Self::Error { .. } => ResourceStatus::Error,
        }
    }

    /// The key this state corresponds to; `None` only while idle.
    pub const fn key(&self) -> Option<&K> {
        match self {
            Self::Idle => None,
            Self::Loading { key } | Self::Success { key, .. } | Self::Error { key, .. } => {
                Some(key)
            }
        }
    }

    /// The fetched data, present only on success.
    pub const fn data(&self) -> Option<&T> {
        match self {
            Self::Success { data, .. } => Some(data),
            _ => None,
        }
    }

    /// The failure, present only on error.
    pub const fn error(&self) -> Option<&ErrorInfo> {
        match self {
            Self::Error { error, .. } => Some(error),
            _ => None,
        }
    }

    /// Consumes the state and returns the fetched data, if any.
    pub fn into_data(self) -> Option<T> {
        match self {
            Self::Success { data, .. } => Some(data),
            _ => None,
        }
    }

    /// Whether a request is in flight.
    pub const fn is_loading(&self) -> bool {
        matches!(self, Self::Loading { .. })
    }

    /// Whether the latest request has produced its outcome.
    pub const fn is_settled(&self) -> bool {
        matches!(self, Self::Success { .. } | Self::Error { .. })
    }
}

impl<K, T> Default for ResourceState<K, T> {
    fn default() -> Self {
        Self::Idle
    }
}

/// Flat wire shape: `{ "status", "key", "data", "error" }` with absent fields
/// as `null`.
#[derive(Serialize)]
struct FlatState<'a, K, T> {
    status: ResourceStatus,
    key: Option<&'a K>,
    data: Option<&'a T>,
    error: Option<&'a ErrorInfo>,
}

impl<K, T> Serialize for ResourceState<K, T>
where
    K: Serialize,
    T: Serialize,
{
    fn serialize<S>(&self, serializer: S) -> Result<S::Ok, S::Error>
    where
        S: Serializer,
    {
        FlatState {
            status: self.status(),
            key: self.key(),
            data: self.data(),
            error: self.error(),
        }
        .serialize(serializer)
    }
}
