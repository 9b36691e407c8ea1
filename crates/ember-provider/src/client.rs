//! Compute provider capability.

use async_trait::async_trait;

use ember_core::ClusterIdentity;

use crate::error::ProviderResult;
use crate::types::{FirewallRule, Image, Instance, InstanceRequest, Operation};

/// Capability over a cloud compute API.
///
/// Mutating calls return a long-running [`Operation`]; the caller must
/// poll it to a terminal state before trusting the side effect. Every
/// call is a network round trip and may be arbitrarily slow.
#[async_trait]
pub trait ComputeProvider: Send + Sync {
    /// Submit an instance create request for the zone.
    async fn insert_instance(
        &self,
        project: &str,
        zone: &str,
        request: &InstanceRequest,
    ) -> ProviderResult<Operation>;

    /// Submit a delete request for the named instance.
    async fn delete_instance(&self, identity: &ClusterIdentity) -> ProviderResult<Operation>;

    /// Fetch the current view of a zone operation.
    async fn get_operation(&self, project: &str, zone: &str, id: &str)
        -> ProviderResult<Operation>;

    /// List instances in a zone.
    async fn list_instances(&self, project: &str, zone: &str) -> ProviderResult<Vec<Instance>>;

    /// Resolve the newest image of a family.
    async fn get_image_from_family(&self, project: &str, family: &str) -> ProviderResult<Image>;

    /// Insert a firewall rule. Implementations treat an already existing
    /// rule as success, so callers can re-assert the rule on every spawn.
    async fn insert_firewall_rule(&self, project: &str, rule: &FirewallRule)
        -> ProviderResult<()>;
}
