//! Polling for long-running provider operations.
//!
//! Every mutating provider call returns an [`Operation`] handle that
//! must be polled to completion. The rules are the same for create and
//! delete, so both flows (and the idle watchdog) share this helper:
//! a DONE status with an error payload is a permanent failure reported
//! verbatim, transport failures are retried with doubling backoff, and
//! the whole wait is bounded by a deadline and a shutdown signal.

use std::time::Duration;

use tokio::sync::watch;
use tokio::time::{sleep, Instant};
use tracing::{debug, warn};

use ember_provider::{ComputeProvider, Operation};

use crate::error::{ProvisionError, ProvisionResult};

/// Pacing for one operation wait.
#[derive(Debug, Clone)]
pub struct OperationPoll {
    /// Delay between status reads while the provider is healthy.
    pub interval: Duration,
    /// Hard deadline for the operation to reach DONE.
    pub timeout: Duration,
    /// Ceiling for the backoff applied after transport failures.
    pub max_backoff: Duration,
}

impl Default for OperationPoll {
    fn default() -> Self {
        OperationPoll {
            interval: Duration::from_secs(1),
            timeout: Duration::from_secs(300),
            max_backoff: Duration::from_secs(30),
        }
    }
}

/// Poll `operation` until it reaches DONE or the deadline passes.
///
/// Returns the final operation on clean completion. A DONE operation
/// carrying an error payload fails with the provider's own message and
/// is never retried. Transient transport errors double the poll delay
/// up to `poll.max_backoff`; if the deadline expires during such a
/// streak the last transport error is surfaced instead of a bare
/// timeout. Any wake of `shutdown` abandons the wait.
pub async fn await_operation(
    provider: &dyn ComputeProvider,
    project: &str,
    zone: &str,
    operation: Operation,
    poll: &OperationPoll,
    mut shutdown: watch::Receiver<bool>,
) -> ProvisionResult<Operation> {
    let started = Instant::now();
    let mut delay = poll.interval;
    let mut last_transport: Option<ProvisionError> = None;
    let mut current = operation;

    loop {
        if current.is_done() {
            return match current.error.take() {
                Some(error) => Err(ProvisionError::Operation {
                    id: current.id,
                    message: error.message(),
                }),
                None => Ok(current),
            };
        }

        if started.elapsed() >= poll.timeout {
            return Err(last_transport.unwrap_or(ProvisionError::OperationTimeout {
                id: current.id,
                waited: started.elapsed(),
            }));
        }

        tokio::select! {
            _ = sleep(delay) => {}
            _ = shutdown.changed() => return Err(ProvisionError::Cancelled),
        }

        match provider.get_operation(project, zone, &current.id).await {
            Ok(next) => {
                debug!(operation = %next.id, status = %next.status, "operation polled");
                delay = poll.interval;
                last_transport = None;
                current = next;
            }
            Err(err) if err.is_transient() => {
                warn!(operation = %current.id, error = %err, "operation poll failed, backing off");
                last_transport = Some(ProvisionError::Provider(err));
                delay = (delay * 2).min(poll.max_backoff);
            }
            Err(err) => return Err(ProvisionError::Provider(err)),
        }
    }
}
