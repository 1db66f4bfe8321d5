//! Test support for code built on `fetchcore`.
//!
//! - [`ScriptedTransport`]: transport whose replies are scripted per key, with
//!   delays or manually opened gates.
//! - [`ChaosTransport`]: decorator injecting random failures and latency.
//! - [`StateCollector`]: hook recording every state a loader publishes.
//! - [`assertions`]: checks over recorded state sequences.
//! - [`contract`]: behavioral contract every transport decorator must keep,
//!   runnable through [`loader_contract_tests!`].

#![forbid(unsafe_code)]
#![warn(missing_docs)]

/// Checks over recorded state sequences.
pub mod assertions;
pub mod chaos;
pub mod collector;
pub mod contract;
pub mod scripted;

pub use assertions::{assert_consistent, assert_superseded_never_published, eventually, WaitError};
pub use chaos::{ChaosConfig, ChaosError, ChaosTransport, ChaosTransportExt, Probability};
pub use collector::StateCollector;
pub use scripted::{Gate, Reply, ScriptedError, ScriptedTransport};
