//! ember-provider — compute provider capability for embergrid.
//!
//! The orchestrator and watchdog talk to the cloud through the
//! [`ComputeProvider`] trait: instance insert/delete return long-running
//! [`Operation`] handles that callers poll to a terminal state, instance
//! listings expose discovered addresses, and firewall inserts are
//! idempotent.
//!
//! Two implementations ship here: [`HttpCompute`], a reqwest client for a
//! REST compute API, and [`SimCompute`], a deterministic in-memory
//! provider with scriptable operation timelines for tests and dry runs.

pub mod client;
pub mod error;
pub mod http;
pub mod sim;
pub mod types;

pub use client::ComputeProvider;
pub use error::{ProviderError, ProviderResult};
pub use http::HttpCompute;
pub use sim::SimCompute;
pub use types::*;
