//! The burnout loop.

use std::sync::Arc;
use std::time::Duration;

use thiserror::Error;
use tokio::sync::watch;
use tokio::time::{sleep, Instant};
use tracing::{debug, info, warn};

use ember_core::ClusterIdentity;
use ember_notify::{shutdown_message, Notifier};
use ember_orchestrator::{await_operation, OperationPoll, ProvisionError};
use ember_provider::ComputeProvider;

use crate::activity::ActivitySource;

/// Ceiling for the fetch retry backoff after the scheduler was reachable
/// at least once.
const FETCH_BACKOFF_CAP: Duration = Duration::from_secs(60);

pub type WatchdogResult<T> = Result<T, WatchdogError>;

#[derive(Debug, Error)]
pub enum WatchdogError {
    /// The grace elapsed but the cluster could not be deleted.
    #[error("cluster delete failed: {0}")]
    Delete(#[from] ProvisionError),
}

/// How a watchdog run ended.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum WatchdogOutcome {
    /// A full idle grace elapsed and the cluster was deleted.
    Deleted,
    /// Shutdown was requested first.
    Cancelled,
}

/// Watches the cluster it runs on and deletes it once no worker has
/// executed a task for a full grace period.
///
/// The run is one-shot: it ends in exactly one deletion, a cancellation,
/// or a delete error. Activity fetch failures are retried with backoff
/// and are not activity; the idle timer keeps running through them.
pub struct IdleWatchdog {
    source: Arc<dyn ActivitySource>,
    provider: Arc<dyn ComputeProvider>,
    notifier: Arc<dyn Notifier>,
    identity: ClusterIdentity,
    idle_grace: Duration,
    poll_interval: Duration,
    connect_interval: Duration,
    operation_poll: OperationPoll,
}

impl IdleWatchdog {
    pub fn new(
        source: Arc<dyn ActivitySource>,
        provider: Arc<dyn ComputeProvider>,
        notifier: Arc<dyn Notifier>,
        identity: ClusterIdentity,
        idle_grace: Duration,
    ) -> Self {
        IdleWatchdog {
            source,
            provider,
            notifier,
            identity,
            idle_grace,
            poll_interval: Duration::from_secs(5),
            connect_interval: Duration::from_secs(5),
            operation_poll: OperationPoll::default(),
        }
    }

    pub fn with_intervals(mut self, poll: Duration, connect: Duration) -> Self {
        self.poll_interval = poll;
        self.connect_interval = connect;
        self
    }

    pub fn with_operation_poll(mut self, poll: OperationPoll) -> Self {
        self.operation_poll = poll;
        self
    }

    /// Run to a terminal state.
    ///
    /// The idle clock starts at the first successful fetch, not at
    /// process start, so a slow node boot never counts against the
    /// grace.
    pub async fn run(
        &self,
        mut shutdown: watch::Receiver<bool>,
    ) -> WatchdogResult<WatchdogOutcome> {
        // Connect phase. The scheduler may still be booting, so there is
        // no deadline here, only cancellation.
        let first = loop {
            match self.source.fetch().await {
                Ok(snapshot) => break snapshot,
                Err(err) => {
                    debug!(cluster = %self.identity, error = %err, "scheduler not answering yet");
                }
            }
            tokio::select! {
                _ = sleep(self.connect_interval) => {}
                _ = shutdown.changed() => return Ok(WatchdogOutcome::Cancelled),
            }
        };
        info!(
            cluster = %self.identity,
            workers = first.workers.len(),
            grace = ?self.idle_grace,
            "watchdog connected"
        );

        let mut last_active = Instant::now();
        let mut delay = self.poll_interval;
        loop {
            if last_active.elapsed() >= self.idle_grace {
                info!(
                    cluster = %self.identity,
                    idle_for = ?last_active.elapsed(),
                    "idle grace elapsed, burning out"
                );
                return self.burn_out(shutdown).await;
            }

            tokio::select! {
                _ = sleep(delay) => {}
                _ = shutdown.changed() => return Ok(WatchdogOutcome::Cancelled),
            }

            match self.source.fetch().await {
                Ok(snapshot) => {
                    delay = self.poll_interval;
                    if !snapshot.is_idle() {
                        debug!(
                            cluster = %self.identity,
                            busy = snapshot.busy_workers(),
                            "workers busy, idle timer reset"
                        );
                        last_active = Instant::now();
                    }
                }
                Err(err) => {
                    warn!(cluster = %self.identity, error = %err, "activity fetch failed");
                    delay = (delay * 2).min(FETCH_BACKOFF_CAP);
                }
            }
        }
    }

    /// Farewell message, then delete the cluster this process runs on
    /// and wait for the operation to finish. The notification goes out
    /// first; once the delete lands this process has no network to
    /// speak from.
    async fn burn_out(&self, shutdown: watch::Receiver<bool>) -> WatchdogResult<WatchdogOutcome> {
        match self.notifier.notify(&shutdown_message(&self.identity)).await {
            Ok(status) => debug!(status, "shutdown notification delivered"),
            Err(err) => warn!(error = %err, "shutdown notification failed"),
        }

        let operation = self
            .provider
            .delete_instance(&self.identity)
            .await
            .map_err(ProvisionError::Provider)?;
        match await_operation(
            self.provider.as_ref(),
            &self.identity.project,
            &self.identity.zone,
            operation,
            &self.operation_poll,
            shutdown,
        )
        .await
        {
            Ok(done) => {
                info!(cluster = %self.identity, operation = %done.id, "cluster deleted");
                Ok(WatchdogOutcome::Deleted)
            }
            Err(ProvisionError::Cancelled) => Ok(WatchdogOutcome::Cancelled),
            Err(err) => Err(WatchdogError::Delete(err)),
        }
    }
}
