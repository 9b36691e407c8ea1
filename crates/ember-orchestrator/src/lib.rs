//! ember-orchestrator — cluster lifecycle state machine.
//!
//! Drives provisioning and teardown of ephemeral clusters against an
//! injected [`ComputeProvider`](ember_provider::ComputeProvider):
//!
//! ```text
//!   spawn ──▶ [existence check] ──found──▶ notify ──▶ Ready
//!                   │
//!               not found
//!                   ▼
//!    firewall ▶ image ▶ create ──▶ operation poll ──▶ discovery poll
//!                                       │                  │
//!                                  DONE+error          addresses
//!                                       ▼                  ▼
//!                                     fail          readiness probe
//!                                                   (8786 ∧ 8787)
//!                                                          │
//!                                                          ▼
//!                                                 notify ▶ Ready
//! ```
//!
//! Every loop is bounded by a deadline and cancellable through a
//! `watch` channel. An error payload inside a DONE operation is always
//! terminal; transient transport failures while polling are retried
//! with doubling backoff.

pub mod error;
pub mod operation;
pub mod orchestrator;

pub use error::{ProvisionError, ProvisionResult};
pub use operation::{await_operation, OperationPoll};
pub use orchestrator::{Orchestrator, SpawnPhase};
