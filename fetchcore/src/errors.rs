//! Error types for FetchCore.
//!
//! Two families of errors exist:
//!
//! - **ErrorInfo**: a classified transport failure. This is not returned from
//!   any loader method; it is *published* as part of
//!   [`ResourceState::Error`](crate::ResourceState::Error) when the latest
//!   request for the tracked key fails.
//! - **LoaderError**: misuse of the loader API, such as asking a disposed loader
//!   to refetch.
//!
//! Results belonging to superseded requests are never errors. They are
//! absorbed inside the loader and leave no trace in the published state.

use crate::config::LoaderName;
use serde::{Deserialize, Serialize};
use std::fmt;
use std::sync::Arc;
use std::time::Duration;
use thiserror::Error;

/// Broad classification of a transport failure.
///
/// The loader itself never inspects responses; the kind is supplied by
/// [`Transport::classify`](crate::Transport::classify) so that consumers can
/// render different messages for, say, a timeout and a 404.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ErrorKind {
    /// The request never produced a response (DNS, connection reset, ...).
    Network,
    /// A response arrived with a non-success status code.
    Response(u16),
    /// The fetch exceeded a timeout imposed by the transport.
    Timeout,
    /// The response body could not be decoded into the resource type.
    Decode,
    /// Any other failure.
    Other,
}

impl fmt::Display for ErrorKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Network => f.write_str("network error"),
            Self::Response(status) => write!(f, "response {status}"),
            Self::Timeout => f.write_str("timeout"),
            Self::Decode => f.write_str("decode error"),
            Self::Other => f.write_str("transport error"),
        }
    }
}

/// A transport failure as published in [`ResourceState::Error`](crate::ResourceState::Error).
///
/// The underlying error is kept as the [`source`](std::error::Error::source) so
/// the full cause chain stays available; `message` is its display string,
/// surfaced verbatim.
///
/// # Example
///
/// ```rust,ignore
/// if let ResourceState::Error { error, .. } = loader.state() {
///     match error.kind() {
///         ErrorKind::Response(404) => render_not_found(),
///         ErrorKind::Timeout => render_retry_button(),
///         _ => render_message(error.message()),
///     }
/// }
/// ```
#[derive(Debug, Clone, Error, Serialize)]
#[error("{kind}: {message}")]
pub struct ErrorInfo {
    kind: ErrorKind,
    message: String,
    #[serde(skip)]
    #[source]
    source: Option<Arc<dyn std::error::Error + Send + Sync>>,
}

impl ErrorInfo {
    /// Creates an error with a message and no underlying cause.
    pub fn new(kind: ErrorKind, message: impl Into<String>) -> Self {
        Self {
            kind,
            message: message.into(),
            source: None,
        }
    }

    /// Wraps a transport error, keeping it as the source of this error.
    pub fn from_error<E>(kind: ErrorKind, error: E) -> Self
    where
        E: std::error::Error + Send + Sync + 'static,
    {
        Self {
            kind,
            message: error.to_string(),
            source: Some(Arc::new(error)),
        }
    }

    /// The classification of this failure.
    pub const fn kind(&self) -> ErrorKind {
        self.kind
    }

    /// The display string of the underlying failure.
    pub fn message(&self) -> &str {
        &self.message
    }
}

impl PartialEq for ErrorInfo {
    fn eq(&self, other: &Self) -> bool {
        self.kind == other.kind && self.message == other.message
    }
}

/// Errors returned by the fallible [`ResourceLoader`](crate::ResourceLoader)
/// operations.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum LoaderError {
    /// The loader was disposed; it accepts no further requests and publishes
    /// no further states.
    #[error("loader '{0}' has been disposed")]
    Disposed(LoaderName),

    /// The operation needs a tracked key but nothing has been observed yet.
    #[error("loader '{0}' is not observing any key")]
    NotObserving(LoaderName),
}

/// Type alias for loader operation results.
pub type LoaderResult<T> = Result<T, LoaderError>;

/// Failure of a fetch wrapped by the [`Timeout`](crate::Timeout) adapter.
#[derive(Debug, Error)]
pub enum TimeoutError<E> {
    /// The wrapped fetch did not finish in time.
    #[error("fetch timed out after {0:?}")]
    Elapsed(Duration),

    /// The wrapped fetch failed on its own.
    #[error(transparent)]
    Transport(E),
}
