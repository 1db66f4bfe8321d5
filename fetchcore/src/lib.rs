//! `FetchCore` - keyed asynchronous resource loading
//!
//! This library implements the remote-resource fetch lifecycle that UI layers
//! and other consumers need to drive one or more fetches keyed by a changing
//! identifier. A [`ResourceLoader`] issues a request through a consumer-supplied
//! [`Transport`], publishes `Loading`, `Success` and `Error` states, and makes
//! sure only the outcome of the most recently requested key ever becomes
//! visible, no matter in which order responses arrive.
//!
//! # Example
//!
//! ```rust,ignore
//! use fetchcore::{transport_fn, ResourceLoader, ResourceState};
//!
//! let loader = ResourceLoader::new(transport_fn(|url: String| async move {
//!     http_get(&url).await
//! }));
//!
//! loader.observe("/posts".to_string());
//! loader.observe("/users".to_string()); // "/posts" can no longer win
//!
//! match loader.settled().await? {
//!     ResourceState::Success { data, .. } => render(data),
//!     ResourceState::Error { error, .. } => show_error(&error),
//!     _ => unreachable!("settled states are success or error"),
//! }
//! ```

#![forbid(unsafe_code)]
#![warn(missing_docs)]

pub mod config;
pub mod errors;
pub mod hooks;
pub mod key;
pub mod loader;
pub mod state;
pub mod transport;

mod token;

pub use config::{CancellationPolicy, FetchTimeoutMs, LoaderConfig, LoaderName};
pub use errors::{ErrorInfo, ErrorKind, LoaderError, LoaderResult, TimeoutError};
pub use hooks::{DiscardReason, LoaderHook, LoaderMetrics, MetricsSnapshot, RequestEvent};
pub use key::{ResourceKey, ResourcePath};
pub use loader::{LoaderBuilder, ResourceLoader};
pub use state::{ResourceState, ResourceStatus};
pub use transport::{transport_fn, FnTransport, Timeout, Transport, TransportExt};
