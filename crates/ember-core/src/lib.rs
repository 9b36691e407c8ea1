//! ember-core — shared domain model for embergrid.
//!
//! Defines the cluster identity/spec/endpoint types used by every other
//! crate, spec validation, the startup command contract consumed by the
//! node bootstrap, and the `ember.toml` configuration parser.

pub mod config;
pub mod error;
pub mod types;

pub use config::{EmberConfig, NotifyConfig, PollConfig, ProviderConfig, SpawnDefaults};
pub use error::SpecError;
pub use types::*;
