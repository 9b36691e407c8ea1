//! ember-probe — TCP readiness probing.
//!
//! A single probe is one TCP connect, immediately dropped. The bounded
//! outer loop in [`ReadinessProbe::wait_ready`] supplies the retry
//! cadence, the deadline, and cancellation.

pub mod probe;

pub use probe::{port_open, ProbeError, ReadinessProbe};
