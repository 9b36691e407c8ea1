//! Spawn and delete flows.

use std::sync::Arc;
use std::time::Duration;

use tokio::sync::watch;
use tokio::time::{sleep, Instant};
use tracing::{debug, info, warn};

use ember_core::{
    ClusterEndpoint, ClusterIdentity, ClusterSpec, PollConfig, DASHBOARD_PORT, SCHEDULER_PORT,
};
use ember_notify::{spawn_message, Notifier};
use ember_probe::{ProbeError, ReadinessProbe};
use ember_provider::{
    ComputeProvider, FirewallRule, Instance, InstanceRequest, FIREWALL_RULE_NAME,
};

use crate::error::{ProvisionError, ProvisionResult};
use crate::operation::{await_operation, OperationPoll};

/// Where a spawn currently is. Logged on every transition so a stuck
/// provision can be read off the log tail.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SpawnPhase {
    CheckingExisting,
    EnsuringIngress,
    ResolvingImage,
    Creating,
    Discovering,
    Probing,
    Ready,
}

impl SpawnPhase {
    pub fn as_str(&self) -> &'static str {
        match self {
            SpawnPhase::CheckingExisting => "checking-existing",
            SpawnPhase::EnsuringIngress => "ensuring-ingress",
            SpawnPhase::ResolvingImage => "resolving-image",
            SpawnPhase::Creating => "creating",
            SpawnPhase::Discovering => "discovering",
            SpawnPhase::Probing => "probing",
            SpawnPhase::Ready => "ready",
        }
    }
}

impl std::fmt::Display for SpawnPhase {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Drives cluster lifecycles against an injected provider and notifier.
///
/// `spawn` is idempotent per identity: a cluster that already appears in
/// the provider's listing is returned as-is and never re-created.
/// Concurrent spawns of the same identity from different processes can
/// still race the existence check; callers own that serialization.
pub struct Orchestrator {
    provider: Arc<dyn ComputeProvider>,
    notifier: Arc<dyn Notifier>,
    operation_poll: OperationPoll,
    discovery_interval: Duration,
    discovery_timeout: Duration,
    probe: ReadinessProbe,
}

impl Orchestrator {
    pub fn new(provider: Arc<dyn ComputeProvider>, notifier: Arc<dyn Notifier>) -> Self {
        Orchestrator {
            provider,
            notifier,
            operation_poll: OperationPoll::default(),
            discovery_interval: Duration::from_secs(5),
            discovery_timeout: Duration::from_secs(600),
            probe: ReadinessProbe::default(),
        }
    }

    /// Apply every pacing knob from the config in one go.
    pub fn with_poll_config(mut self, poll: &PollConfig) -> Self {
        self.operation_poll = OperationPoll {
            interval: poll.operation_interval(),
            timeout: poll.operation_timeout(),
            ..OperationPoll::default()
        };
        self.discovery_interval = poll.discovery_interval();
        self.discovery_timeout = poll.discovery_timeout();
        self.probe = ReadinessProbe::new(
            poll.connect_timeout(),
            poll.readiness_interval(),
            poll.readiness_timeout(),
        );
        self
    }

    pub fn with_operation_poll(mut self, poll: OperationPoll) -> Self {
        self.operation_poll = poll;
        self
    }

    pub fn with_discovery(mut self, interval: Duration, timeout: Duration) -> Self {
        self.discovery_interval = interval;
        self.discovery_timeout = timeout;
        self
    }

    pub fn with_probe(mut self, probe: ReadinessProbe) -> Self {
        self.probe = probe;
        self
    }

    /// Bring a cluster up and return its reachable endpoint.
    ///
    /// With `check_existing`, an instance already present in the listing
    /// short-circuits the flow: its addresses are returned without
    /// re-creating anything and without a readiness probe, since a
    /// listed cluster was probed when it first came up. A listed
    /// instance whose addresses have not been attached yet skips
    /// creation and joins at the discovery wait.
    pub async fn spawn(
        &self,
        identity: &ClusterIdentity,
        spec: &ClusterSpec,
        check_existing: bool,
        shutdown: watch::Receiver<bool>,
    ) -> ProvisionResult<ClusterEndpoint> {
        spec.validate()?;

        if check_existing {
            debug!(cluster = %identity, phase = %SpawnPhase::CheckingExisting, "spawn requested");
            if let Some(instance) = self.find_instance(identity).await? {
                let endpoint = match instance.endpoint() {
                    Some(endpoint) => endpoint,
                    None => {
                        debug!(cluster = %identity, phase = %SpawnPhase::Discovering, "instance listed without addresses");
                        self.discover(identity, shutdown).await?
                    }
                };
                info!(
                    cluster = %identity,
                    external = %endpoint.external_address,
                    "cluster already running, reusing"
                );
                self.announce(&spawn_message(identity, spec, &endpoint)).await;
                return Ok(endpoint);
            }
        }

        let endpoint = self.provision(identity, spec, shutdown).await?;
        info!(
            cluster = %identity,
            external = %endpoint.external_address,
            internal = %endpoint.internal_address,
            phase = %SpawnPhase::Ready,
            "cluster ready"
        );
        self.announce(&spawn_message(identity, spec, &endpoint)).await;
        Ok(endpoint)
    }

    /// Tear the cluster down and wait for the delete to complete.
    pub async fn delete(
        &self,
        identity: &ClusterIdentity,
        shutdown: watch::Receiver<bool>,
    ) -> ProvisionResult<()> {
        info!(cluster = %identity, "deleting cluster");
        let operation = self.provider.delete_instance(identity).await?;
        let done = await_operation(
            self.provider.as_ref(),
            &identity.project,
            &identity.zone,
            operation,
            &self.operation_poll,
            shutdown,
        )
        .await?;
        info!(cluster = %identity, operation = %done.id, "cluster deleted");
        Ok(())
    }

    /// Fresh provision: ingress rule, image, create, then wait until the
    /// node answers on both service ports.
    async fn provision(
        &self,
        identity: &ClusterIdentity,
        spec: &ClusterSpec,
        shutdown: watch::Receiver<bool>,
    ) -> ProvisionResult<ClusterEndpoint> {
        debug!(cluster = %identity, phase = %SpawnPhase::EnsuringIngress, rule = FIREWALL_RULE_NAME, "ensuring ingress rule");
        self.provider
            .insert_firewall_rule(&identity.project, &FirewallRule::cluster_ingress())
            .await?;

        debug!(cluster = %identity, phase = %SpawnPhase::ResolvingImage, family = %spec.image_family, "resolving image");
        let image = self
            .provider
            .get_image_from_family(&spec.image_project, &spec.image_family)
            .await?;

        let request = InstanceRequest::for_cluster(identity, spec, &image);
        info!(
            cluster = %identity,
            phase = %SpawnPhase::Creating,
            machine_type = %request.machine_type,
            workers = spec.worker_count,
            "creating instance"
        );
        let operation = self
            .provider
            .insert_instance(&identity.project, &identity.zone, &request)
            .await?;
        let done = await_operation(
            self.provider.as_ref(),
            &identity.project,
            &identity.zone,
            operation,
            &self.operation_poll,
            shutdown.clone(),
        )
        .await?;
        debug!(cluster = %identity, operation = %done.id, "create operation done");

        debug!(cluster = %identity, phase = %SpawnPhase::Discovering, "waiting for addresses");
        let endpoint = self.discover(identity, shutdown.clone()).await?;

        debug!(
            cluster = %identity,
            phase = %SpawnPhase::Probing,
            external = %endpoint.external_address,
            "probing service ports"
        );
        match self
            .probe
            .wait_ready(
                &endpoint.external_address,
                &[SCHEDULER_PORT, DASHBOARD_PORT],
                shutdown,
            )
            .await
        {
            Ok(()) => Ok(endpoint),
            Err(ProbeError::Cancelled) => Err(ProvisionError::Cancelled),
            Err(err) => Err(ProvisionError::Probe(err)),
        }
    }

    /// Poll the listing until the instance shows up with addresses.
    /// Listing failures propagate; only absence is waited out.
    async fn discover(
        &self,
        identity: &ClusterIdentity,
        mut shutdown: watch::Receiver<bool>,
    ) -> ProvisionResult<ClusterEndpoint> {
        let started = Instant::now();
        loop {
            if let Some(instance) = self.find_instance(identity).await? {
                if let Some(endpoint) = instance.endpoint() {
                    debug!(
                        cluster = %identity,
                        external = %endpoint.external_address,
                        waited_ms = started.elapsed().as_millis() as u64,
                        "addresses attached"
                    );
                    return Ok(endpoint);
                }
            }

            if started.elapsed() >= self.discovery_timeout {
                return Err(ProvisionError::DiscoveryTimeout {
                    name: identity.name.clone(),
                    waited: started.elapsed(),
                });
            }

            tokio::select! {
                _ = sleep(self.discovery_interval) => {}
                _ = shutdown.changed() => return Err(ProvisionError::Cancelled),
            }
        }
    }

    async fn find_instance(&self, identity: &ClusterIdentity) -> ProvisionResult<Option<Instance>> {
        let instances = self
            .provider
            .list_instances(&identity.project, &identity.zone)
            .await?;
        Ok(instances
            .into_iter()
            .find(|instance| instance.name == identity.name))
    }

    /// Best-effort delivery. Failures are logged and never fail the flow.
    async fn announce(&self, text: &str) {
        match self.notifier.notify(text).await {
            Ok(status) => debug!(status, "notification delivered"),
            Err(err) => warn!(error = %err, "notification failed"),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    use ember_notify::MemoryNotifier;
    use ember_provider::{OperationStatus, ProviderError, SimCompute};

    fn identity() -> ClusterIdentity {
        ClusterIdentity::new("ember-1", "proj", "zone-a")
    }

    fn spec() -> ClusterSpec {
        ClusterSpec {
            image_project: "img-project".to_string(),
            image_family: "ubuntu-2204-lts".to_string(),
            cpu: 2,
            ram_mb: 1024,
            worker_count: 3,
            disk_size_gb: 10,
            preemptible: false,
            idle_grace_secs: 60,
        }
    }

    struct Fixture {
        sim: Arc<SimCompute>,
        notifier: Arc<MemoryNotifier>,
        orchestrator: Orchestrator,
    }

    /// Orchestrator with near-zero pacing. The probe deadline is zero,
    /// so fresh provisions fail at the probe unless a test overrides it;
    /// paths that never probe are unaffected.
    fn fixture() -> Fixture {
        let sim = Arc::new(SimCompute::new());
        let notifier = Arc::new(MemoryNotifier::new());
        let orchestrator = Orchestrator::new(sim.clone(), notifier.clone())
            .with_operation_poll(OperationPoll {
                interval: Duration::ZERO,
                timeout: Duration::from_secs(5),
                max_backoff: Duration::from_millis(1),
            })
            .with_discovery(Duration::ZERO, Duration::from_secs(5))
            .with_probe(ReadinessProbe::new(
                Duration::from_millis(50),
                Duration::ZERO,
                Duration::ZERO,
            ));
        Fixture {
            sim,
            notifier,
            orchestrator,
        }
    }

    #[tokio::test]
    async fn rejects_invalid_spec_before_any_provider_call() {
        let f = fixture();
        let bad = ClusterSpec { cpu: 0, ..spec() };
        let (_tx, rx) = watch::channel(false);

        let err = f
            .orchestrator
            .spawn(&identity(), &bad, true, rx)
            .await
            .unwrap_err();
        assert!(matches!(err, ProvisionError::InvalidSpec(_)));
        assert_eq!(f.sim.list_calls().await, 0);
        assert_eq!(f.sim.insert_calls().await, 0);
    }

    #[tokio::test]
    async fn existing_cluster_is_reused_and_announced() {
        let f = fixture();
        f.sim
            .seed_instance(&identity(), "203.0.113.7", "10.0.0.7")
            .await;
        let (_tx, rx) = watch::channel(false);

        let endpoint = f
            .orchestrator
            .spawn(&identity(), &spec(), true, rx)
            .await
            .unwrap();
        assert_eq!(endpoint.external_address, "203.0.113.7");
        assert_eq!(endpoint.internal_address, "10.0.0.7");
        assert_eq!(f.sim.insert_calls().await, 0);
        assert_eq!(f.sim.firewall_inserts().await, 0);

        let messages = f.notifier.messages().await;
        assert_eq!(messages.len(), 1);
        assert!(messages[0].contains("Spawned compute cluster."));
        assert!(messages[0].contains("http://203.0.113.7:8787"));
    }

    #[tokio::test]
    async fn skipping_existence_check_always_creates() {
        let f = fixture();
        f.sim
            .seed_instance(&identity(), "203.0.113.7", "10.0.0.7")
            .await;
        let (_tx, rx) = watch::channel(false);

        let err = f
            .orchestrator
            .spawn(&identity(), &spec(), false, rx)
            .await
            .unwrap_err();
        // the create happened even though the instance was already listed
        assert!(matches!(err, ProvisionError::Probe(_)));
        assert_eq!(f.sim.insert_calls().await, 1);
    }

    #[tokio::test]
    async fn listed_instance_without_addresses_is_not_recreated() {
        let f = fixture();
        f.sim.seed_bare_instance(&identity()).await;
        let orchestrator = f
            .orchestrator
            .with_discovery(Duration::ZERO, Duration::ZERO);
        let (_tx, rx) = watch::channel(false);

        let err = orchestrator
            .spawn(&identity(), &spec(), true, rx)
            .await
            .unwrap_err();
        assert!(matches!(err, ProvisionError::DiscoveryTimeout { .. }));
        assert_eq!(f.sim.insert_calls().await, 0);
        assert!(f.notifier.messages().await.is_empty());
    }

    #[tokio::test]
    async fn failed_create_operation_is_fatal_with_provider_wording() {
        let f = fixture();
        f.sim
            .script_operation(
                vec![OperationStatus::Running, OperationStatus::Done],
                Some("QUOTA_EXCEEDED"),
            )
            .await;
        let (_tx, rx) = watch::channel(false);

        let err = f
            .orchestrator
            .spawn(&identity(), &spec(), true, rx)
            .await
            .unwrap_err();
        match err {
            ProvisionError::Operation { message, .. } => assert_eq!(message, "QUOTA_EXCEEDED"),
            other => panic!("unexpected error: {other}"),
        }
        assert!(!f.sim.has_instance(&identity()).await);
        assert!(f.notifier.messages().await.is_empty());
    }

    #[tokio::test]
    async fn discovery_outlasts_slow_listings() {
        let f = fixture();
        // existence check and the first two discovery passes see nothing
        f.sim.hide_listings(3).await;
        let (_tx, rx) = watch::channel(false);

        let err = f
            .orchestrator
            .spawn(&identity(), &spec(), true, rx)
            .await
            .unwrap_err();
        // reaching the probe proves discovery found the instance
        assert!(matches!(err, ProvisionError::Probe(_)));
        assert_eq!(f.sim.insert_calls().await, 1);
        assert_eq!(f.sim.firewall_inserts().await, 1);
        assert!(f.sim.list_calls().await >= 4);
    }

    #[tokio::test]
    async fn discovery_deadline_is_an_error() {
        let f = fixture();
        f.sim.hide_listings(u32::MAX).await;
        let orchestrator = f
            .orchestrator
            .with_discovery(Duration::ZERO, Duration::ZERO);
        let (_tx, rx) = watch::channel(false);

        let err = orchestrator
            .spawn(&identity(), &spec(), true, rx)
            .await
            .unwrap_err();
        match err {
            ProvisionError::DiscoveryTimeout { name, .. } => assert_eq!(name, "ember-1"),
            other => panic!("unexpected error: {other}"),
        }
    }

    #[tokio::test]
    async fn unreachable_endpoint_fails_the_probe() {
        let f = fixture();
        let (_tx, rx) = watch::channel(false);

        let err = f
            .orchestrator
            .spawn(&identity(), &spec(), true, rx)
            .await
            .unwrap_err();
        match err {
            ProvisionError::Probe(ProbeError::NeverReady { ports, .. }) => {
                assert_eq!(ports, vec![SCHEDULER_PORT, DASHBOARD_PORT]);
            }
            other => panic!("unexpected error: {other}"),
        }
        // instance was created; only readiness failed
        assert!(f.sim.has_instance(&identity()).await);
        assert!(f.notifier.messages().await.is_empty());
    }

    #[tokio::test]
    async fn notification_failure_does_not_fail_spawn() {
        let f = fixture();
        f.sim
            .seed_instance(&identity(), "203.0.113.7", "10.0.0.7")
            .await;
        f.notifier.set_failing(true).await;
        let (_tx, rx) = watch::channel(false);

        let endpoint = f
            .orchestrator
            .spawn(&identity(), &spec(), true, rx)
            .await
            .unwrap();
        assert_eq!(endpoint.external_address, "203.0.113.7");
        assert!(f.notifier.messages().await.is_empty());
    }

    #[tokio::test]
    async fn shutdown_during_create_wait_cancels_spawn() {
        let f = fixture();
        f.sim
            .script_operation(vec![OperationStatus::Pending], None)
            .await;
        let orchestrator = f.orchestrator.with_operation_poll(OperationPoll {
            interval: Duration::from_secs(60),
            timeout: Duration::from_secs(120),
            max_backoff: Duration::from_secs(60),
        });
        let (tx, rx) = watch::channel(false);

        let handle =
            tokio::spawn(async move { orchestrator.spawn(&identity(), &spec(), true, rx).await });
        tx.send(true).unwrap();

        let err = handle.await.unwrap().unwrap_err();
        assert!(matches!(err, ProvisionError::Cancelled));
    }

    #[tokio::test]
    async fn delete_waits_for_operation_done() {
        let f = fixture();
        f.sim
            .seed_instance(&identity(), "203.0.113.7", "10.0.0.7")
            .await;
        f.sim
            .script_operation(vec![OperationStatus::Running, OperationStatus::Done], None)
            .await;
        let (_tx, rx) = watch::channel(false);

        f.orchestrator.delete(&identity(), rx).await.unwrap();
        assert!(!f.sim.has_instance(&identity()).await);
        assert_eq!(f.sim.delete_calls().await, 1);
    }

    #[tokio::test]
    async fn delete_of_missing_cluster_propagates_not_found() {
        let f = fixture();
        let (_tx, rx) = watch::channel(false);

        let err = f.orchestrator.delete(&identity(), rx).await.unwrap_err();
        assert!(matches!(
            err,
            ProvisionError::Provider(ProviderError::NotFound(_))
        ));
    }

    #[tokio::test]
    async fn failed_delete_operation_leaves_instance() {
        let f = fixture();
        f.sim
            .seed_instance(&identity(), "203.0.113.7", "10.0.0.7")
            .await;
        f.sim
            .script_operation(vec![OperationStatus::Done], Some("RESOURCE_IN_USE"))
            .await;
        let (_tx, rx) = watch::channel(false);

        let err = f.orchestrator.delete(&identity(), rx).await.unwrap_err();
        match err {
            ProvisionError::Operation { message, .. } => assert_eq!(message, "RESOURCE_IN_USE"),
            other => panic!("unexpected error: {other}"),
        }
        assert!(f.sim.has_instance(&identity()).await);
    }
}
