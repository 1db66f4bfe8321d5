//! Example consumers of the `fetchcore` resource loader.

#![forbid(unsafe_code)]
#![warn(missing_docs)]
// These are examples, so we don't need to be as pedantic
#![allow(clippy::missing_const_for_fn)]

/// Posts feed: a paginated list fetched from a simulated HTTP API
pub mod posts;
