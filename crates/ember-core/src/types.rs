//! Domain types for embergrid clusters.
//!
//! These types describe the desired and observed shape of an ephemeral
//! cluster: the identity it is addressed by, the machine spec it is
//! provisioned with, the addresses discovered once the provider reports
//! it, and the worker activity snapshots the idle watchdog consumes.

use serde::{Deserialize, Serialize};
use std::collections::HashMap;
use std::fmt;
use std::time::Duration;

use crate::error::SpecError;

/// Scheduler control port. Fixed by the node image.
pub const SCHEDULER_PORT: u16 = 8786;

/// Dashboard HTTP port. Fixed by the node image.
pub const DASHBOARD_PORT: u16 = 8787;

// ── Identity ──────────────────────────────────────────────────────

/// Uniquely identifies a cluster instance. Immutable once created; the
/// provider enforces at most one live instance per name within a
/// (project, zone) pair.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct ClusterIdentity {
    pub name: String,
    pub project: String,
    pub zone: String,
}

impl ClusterIdentity {
    pub fn new(
        name: impl Into<String>,
        project: impl Into<String>,
        zone: impl Into<String>,
    ) -> Self {
        ClusterIdentity {
            name: name.into(),
            project: project.into(),
            zone: zone.into(),
        }
    }
}

impl fmt::Display for ClusterIdentity {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}/{}/{}", self.project, self.zone, self.name)
    }
}

// ── Spec ──────────────────────────────────────────────────────────

/// Desired shape of a cluster. Supplied by the caller, validated before
/// any provider call, never mutated afterwards.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ClusterSpec {
    /// Project that owns the boot image family.
    pub image_project: String,
    /// Image family to boot from (e.g. "ubuntu-2204-lts").
    pub image_family: String,
    /// CPU core count for the custom machine type.
    pub cpu: u32,
    /// RAM in MB. The provider only accepts multiples of 256.
    pub ram_mb: u32,
    /// Worker processes launched next to the scheduler.
    pub worker_count: u32,
    /// Boot disk size in GB.
    pub disk_size_gb: u32,
    /// Provision a preemptible machine.
    pub preemptible: bool,
    /// Seconds of continuous zero activity before the node deletes itself.
    pub idle_grace_secs: u64,
}

impl ClusterSpec {
    /// Check the provider-facing constraints.
    pub fn validate(&self) -> Result<(), SpecError> {
        if self.cpu < 1 {
            return Err(SpecError::CpuTooSmall { cpu: self.cpu });
        }
        if self.ram_mb % 256 != 0 {
            return Err(SpecError::RamNotAligned { ram_mb: self.ram_mb });
        }
        if self.worker_count < 1 {
            return Err(SpecError::NoWorkers);
        }
        Ok(())
    }

    pub fn idle_grace(&self) -> Duration {
        Duration::from_secs(self.idle_grace_secs)
    }
}

// ── Endpoint ──────────────────────────────────────────────────────

/// Addresses of a provisioned cluster, extracted from the provider's
/// instance listing. Discovered, never constructed by hand.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ClusterEndpoint {
    /// Externally routable address (NAT).
    pub external_address: String,
    /// Address on the provider-internal network.
    pub internal_address: String,
}

impl ClusterEndpoint {
    /// Dashboard URL served on the external address.
    pub fn dashboard_url(&self) -> String {
        format!("http://{}:{}", self.external_address, DASHBOARD_PORT)
    }
}

// ── Worker activity ───────────────────────────────────────────────

/// Activity counters for a single worker, as reported by the scheduler.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct WorkerActivity {
    /// Tasks the worker is executing right now.
    pub executing: u64,
}

/// Point-in-time map of worker id to activity, read from the scheduler's
/// workers endpoint. Consumed by the idle watchdog; never persisted.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct WorkerActivitySnapshot {
    pub workers: HashMap<String, WorkerActivity>,
}

impl WorkerActivitySnapshot {
    /// True when no worker reports an executing task. An empty snapshot
    /// counts as idle.
    pub fn is_idle(&self) -> bool {
        self.workers.values().all(|w| w.executing == 0)
    }

    /// Number of workers currently executing at least one task.
    pub fn busy_workers(&self) -> usize {
        self.workers.values().filter(|w| w.executing > 0).count()
    }
}

// ── Startup command ───────────────────────────────────────────────

/// Render the startup command placed in the instance metadata. The node
/// bootstrap parses the leading assignments to launch the scheduler, the
/// workers, and the idle watchdog with matching parameters.
pub fn startup_command(identity: &ClusterIdentity, spec: &ClusterSpec) -> String {
    format!(
        "worker_count={} name={} project={} zone={} idle_grace_secs={} \
         docker-compose -f docker-compose.yaml up --build",
        spec.worker_count, identity.name, identity.project, identity.zone, spec.idle_grace_secs
    )
}
