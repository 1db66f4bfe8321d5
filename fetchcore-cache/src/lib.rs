//! Request sharing for `fetchcore` transports.
//!
//! [`SharedTransport`] decorates a transport so that concurrent fetches of the
//! same key, from any number of loaders, share a single underlying call.
//! Successful values can optionally be retained for a short time-to-live.
//!
//! ```rust,ignore
//! let api = SharedTransport::new(
//!     PostsApi::new(client),
//!     CacheConfig::default().with_time_to_live(CacheTtlMs::try_new(30_000)?),
//! );
//!
//! let sidebar = ResourceLoader::new(api.clone());
//! let main = ResourceLoader::new(api.clone());
//! sidebar.observe(page);
//! main.observe(page); // joins the sidebar's request
//! ```
//!
//! The decorator does not change loader semantics: each loader still discards
//! responses for keys it no longer tracks.

#![forbid(unsafe_code)]
#![warn(missing_docs)]

pub mod config;
pub mod shared;

pub use config::{CacheCapacity, CacheConfig, CacheTtlMs};
pub use shared::{SharedError, SharedTransport};
