//! Lifecycle error types.

use std::time::Duration;

use ember_core::SpecError;
use ember_probe::ProbeError;
use ember_provider::ProviderError;
use thiserror::Error;

/// Convenience alias for lifecycle operations.
pub type ProvisionResult<T> = Result<T, ProvisionError>;

/// Errors surfaced by spawn, delete, and the polling helpers.
#[derive(Debug, Error)]
pub enum ProvisionError {
    /// The requested cluster shape failed validation before any
    /// provider call was made.
    #[error("invalid cluster spec: {0}")]
    InvalidSpec(#[from] SpecError),

    /// The provider reported the operation DONE with an error payload.
    /// The message is the provider's own wording, joined verbatim.
    #[error("operation {id} failed: {message}")]
    Operation { id: String, message: String },

    /// The operation never reached DONE within the polling deadline.
    #[error("operation {id} not done after {waited:?}")]
    OperationTimeout { id: String, waited: Duration },

    /// The instance never appeared in listings with a reachable
    /// address within the discovery deadline.
    #[error("instance {name} has no reachable address after {waited:?}")]
    DiscoveryTimeout { name: String, waited: Duration },

    /// The instance was discovered but its service ports never
    /// accepted a connection.
    #[error("readiness probe failed: {0}")]
    Probe(ProbeError),

    #[error("provider call failed: {0}")]
    Provider(#[from] ProviderError),

    /// Shutdown was requested while a lifecycle step was in flight.
    #[error("provisioning cancelled")]
    Cancelled,
}
