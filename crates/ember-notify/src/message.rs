//! Alert message formatting.

use chrono::Utc;

use ember_core::{ClusterEndpoint, ClusterIdentity, ClusterSpec};

/// Alert text for a completed spawn.
pub fn spawn_message(
    identity: &ClusterIdentity,
    spec: &ClusterSpec,
    endpoint: &ClusterEndpoint,
) -> String {
    format!(
        "Spawned compute cluster.\n\
         *Time spawned*: {}\n\
         *Cluster name*: {}\n\
         *CPU cores*: {}\n\
         *RAM (MB)*: {}\n\
         *Worker count*: {}\n\
         *Dashboard*: {}",
        Utc::now().format("%Y-%m-%d %H:%M:%S UTC"),
        identity.name,
        spec.cpu,
        spec.ram_mb,
        spec.worker_count,
        endpoint.dashboard_url(),
    )
}

/// Alert text for an idle self-shutdown.
pub fn shutdown_message(identity: &ClusterIdentity) -> String {
    format!(
        "Gracefully deleted idle compute cluster.\n\
         *Time shutdown*: {}\n\
         *Cluster name*: {}",
        Utc::now().format("%Y-%m-%d %H:%M:%S UTC"),
        identity.name,
    )
}
