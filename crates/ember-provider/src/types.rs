//! Wire types for the compute provider API.
//!
//! Shapes mirror the provider's REST resources: long-running operations,
//! instances with NAT'd network interfaces, create requests, firewall
//! rules, and images. Field names follow the provider's camelCase wire
//! format, including its legacy `natIP`/`networkIP`/`IPProtocol` spellings.

use serde::{Deserialize, Serialize};

use ember_core::{
    startup_command, ClusterEndpoint, ClusterIdentity, ClusterSpec, DASHBOARD_PORT, SCHEDULER_PORT,
};

/// Network tag attached to every cluster node; firewall rules target it.
pub const CLUSTER_TAG: &str = "ember";

/// Name of the shared ingress rule opening the cluster ports.
pub const FIREWALL_RULE_NAME: &str = "ember-network";

// ── Operations ────────────────────────────────────────────────────

/// Handle for an in-flight infrastructure mutation. Returned by every
/// mutating call; polled via `get_operation` until `status` is DONE.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Operation {
    pub id: String,
    pub status: OperationStatus,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub error: Option<OperationError>,
}

impl Operation {
    pub fn is_done(&self) -> bool {
        self.status == OperationStatus::Done
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum OperationStatus {
    Pending,
    Running,
    Done,
}

impl OperationStatus {
    pub fn as_str(&self) -> &'static str {
        match self {
            OperationStatus::Pending => "PENDING",
            OperationStatus::Running => "RUNNING",
            OperationStatus::Done => "DONE",
        }
    }
}

impl std::fmt::Display for OperationStatus {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Error payload attached to a failed operation. A DONE operation that
/// carries one of these failed permanently.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct OperationError {
    #[serde(default)]
    pub errors: Vec<OperationErrorDetail>,
}

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct OperationErrorDetail {
    pub code: String,
    #[serde(default)]
    pub message: String,
}

impl OperationError {
    pub fn with_code(code: &str) -> Self {
        OperationError {
            errors: vec![OperationErrorDetail {
                code: code.to_string(),
                message: String::new(),
            }],
        }
    }

    /// Flatten the provider's error entries into one line, preserving
    /// codes and messages verbatim.
    pub fn message(&self) -> String {
        if self.errors.is_empty() {
            return "unspecified operation error".to_string();
        }
        self.errors
            .iter()
            .map(|e| {
                if e.message.is_empty() {
                    e.code.clone()
                } else {
                    format!("{}: {}", e.code, e.message)
                }
            })
            .collect::<Vec<_>>()
            .join("; ")
    }
}

// ── Instances ─────────────────────────────────────────────────────

/// An instance as reported by the provider's listing.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Instance {
    pub name: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub status: Option<String>,
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub network_interfaces: Vec<NetworkInterface>,
}

impl Instance {
    /// Build a fully addressed instance record.
    pub fn addressed(name: &str, external: &str, internal: &str) -> Self {
        Instance {
            name: name.to_string(),
            status: Some("RUNNING".to_string()),
            network_interfaces: vec![NetworkInterface {
                network: None,
                network_ip: Some(internal.to_string()),
                access_configs: vec![AccessConfig {
                    access_type: Some("ONE_TO_ONE_NAT".to_string()),
                    name: Some("External NAT".to_string()),
                    nat_ip: Some(external.to_string()),
                }],
            }],
        }
    }

    /// Extract the discovered addresses from the first network
    /// interface, if the provider has attached them yet.
    pub fn endpoint(&self) -> Option<ClusterEndpoint> {
        let nic = self.network_interfaces.first()?;
        let external = nic.access_configs.first()?.nat_ip.clone()?;
        let internal = nic.network_ip.clone()?;
        Some(ClusterEndpoint {
            external_address: external,
            internal_address: internal,
        })
    }
}

/// List response wrapper; the provider omits `items` when empty.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct InstanceList {
    #[serde(default)]
    pub items: Vec<Instance>,
}

/// Network interface, used in both create requests (network + access
/// config shell) and listings (populated addresses).
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct NetworkInterface {
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub network: Option<String>,
    #[serde(
        rename = "networkIP",
        default,
        skip_serializing_if = "Option::is_none"
    )]
    pub network_ip: Option<String>,
    #[serde(
        rename = "accessConfigs",
        default,
        skip_serializing_if = "Vec::is_empty"
    )]
    pub access_configs: Vec<AccessConfig>,
}

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct AccessConfig {
    #[serde(rename = "type", default, skip_serializing_if = "Option::is_none")]
    pub access_type: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub name: Option<String>,
    #[serde(rename = "natIP", default, skip_serializing_if = "Option::is_none")]
    pub nat_ip: Option<String>,
}

// ── Create request ────────────────────────────────────────────────

/// Instance creation request body.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct InstanceRequest {
    pub name: String,
    pub machine_type: String,
    pub tags: Tags,
    pub disks: Vec<AttachedDisk>,
    pub network_interfaces: Vec<NetworkInterface>,
    pub service_accounts: Vec<ServiceAccount>,
    pub metadata: Metadata,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub scheduling: Option<Scheduling>,
}

#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct Tags {
    pub items: Vec<String>,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct AttachedDisk {
    pub boot: bool,
    pub auto_delete: bool,
    pub initialize_params: InitializeParams,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct InitializeParams {
    pub source_image: String,
    pub disk_size_gb: u32,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ServiceAccount {
    pub email: String,
    pub scopes: Vec<String>,
}

#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct Metadata {
    pub items: Vec<MetadataEntry>,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct MetadataEntry {
    pub key: String,
    pub value: String,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Scheduling {
    pub preemptible: bool,
}

/// Encode the custom machine type path for the given shape.
pub fn custom_machine_type(zone: &str, cpu: u32, ram_mb: u32) -> String {
    format!("zones/{}/machineTypes/custom-{}-{}-ext", zone, cpu, ram_mb)
}

impl InstanceRequest {
    /// Build the create request for a cluster node: custom machine type,
    /// auto-deleting boot disk from the resolved image, NAT'd default
    /// network, the cluster network tag, and the startup command in
    /// metadata. The compute scope lets the node delete itself when the
    /// idle watchdog fires.
    pub fn for_cluster(identity: &ClusterIdentity, spec: &ClusterSpec, image: &Image) -> Self {
        InstanceRequest {
            name: identity.name.clone(),
            machine_type: custom_machine_type(&identity.zone, spec.cpu, spec.ram_mb),
            tags: Tags {
                items: vec![CLUSTER_TAG.to_string()],
            },
            disks: vec![AttachedDisk {
                boot: true,
                auto_delete: true,
                initialize_params: InitializeParams {
                    source_image: image.self_link.clone(),
                    disk_size_gb: spec.disk_size_gb,
                },
            }],
            network_interfaces: vec![NetworkInterface {
                network: Some("global/networks/default".to_string()),
                network_ip: None,
                access_configs: vec![AccessConfig {
                    access_type: Some("ONE_TO_ONE_NAT".to_string()),
                    name: Some("External NAT".to_string()),
                    nat_ip: None,
                }],
            }],
            service_accounts: vec![ServiceAccount {
                email: "default".to_string(),
                scopes: vec![
                    "storage-rw".to_string(),
                    "logging-write".to_string(),
                    "compute".to_string(),
                ],
            }],
            metadata: Metadata {
                items: vec![MetadataEntry {
                    key: "startup-script".to_string(),
                    value: startup_command(identity, spec),
                }],
            },
            scheduling: spec.preemptible.then(|| Scheduling { preemptible: true }),
        }
    }
}

// ── Firewall & images ─────────────────────────────────────────────

/// Firewall rule resource.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct FirewallRule {
    pub name: String,
    pub direction: String,
    pub priority: u32,
    pub source_ranges: Vec<String>,
    pub target_tags: Vec<String>,
    pub allowed: Vec<FirewallAllowed>,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct FirewallAllowed {
    #[serde(rename = "IPProtocol")]
    pub ip_protocol: String,
    pub ports: Vec<String>,
}

impl FirewallRule {
    /// Ingress rule opening the scheduler and dashboard ports for nodes
    /// carrying the cluster tag.
    pub fn cluster_ingress() -> Self {
        FirewallRule {
            name: FIREWALL_RULE_NAME.to_string(),
            direction: "INGRESS".to_string(),
            priority: 1000,
            source_ranges: vec!["0.0.0.0/0".to_string()],
            target_tags: vec![CLUSTER_TAG.to_string()],
            allowed: vec![FirewallAllowed {
                ip_protocol: "tcp".to_string(),
                ports: vec![SCHEDULER_PORT.to_string(), DASHBOARD_PORT.to_string()],
            }],
        }
    }
}

/// Resolved boot image.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Image {
    pub self_link: String,
}

#[cfg(test)]
mod tests {
    use super::*;

    fn identity() -> ClusterIdentity {
        ClusterIdentity::new("ember-1", "proj", "us-central1-a")
    }

    fn spec() -> ClusterSpec {
        ClusterSpec {
            image_project: "img-project".to_string(),
            image_family: "ubuntu-2204-lts".to_string(),
            cpu: 2,
            ram_mb: 512,
            worker_count: 4,
            disk_size_gb: 30,
            preemptible: false,
            idle_grace_secs: 180,
        }
    }

    #[test]
    fn machine_type_encoding() {
        assert_eq!(
            custom_machine_type("us-central1-a", 2, 512),
            "zones/us-central1-a/machineTypes/custom-2-512-ext"
        );
    }

    #[test]
    fn request_wire_format() {
        let image = Image {
            self_link: "projects/img-project/global/images/ubuntu-2204".to_string(),
        };
        let request = InstanceRequest::for_cluster(&identity(), &spec(), &image);
        let json = serde_json::to_value(&request).unwrap();

        assert_eq!(json["name"], "ember-1");
        assert_eq!(
            json["machineType"],
            "zones/us-central1-a/machineTypes/custom-2-512-ext"
        );
        assert_eq!(json["tags"]["items"][0], "ember");
        assert_eq!(json["disks"][0]["autoDelete"], true);
        assert_eq!(json["disks"][0]["initializeParams"]["diskSizeGb"], 30);
        assert_eq!(
            json["networkInterfaces"][0]["accessConfigs"][0]["type"],
            "ONE_TO_ONE_NAT"
        );
        let startup = json["metadata"]["items"][0]["value"].as_str().unwrap();
        assert!(startup.contains("worker_count=4"));
        assert!(startup.contains("idle_grace_secs=180"));
        // non-preemptible requests omit scheduling entirely
        assert!(json.get("scheduling").is_none());
    }

    #[test]
    fn preemptible_sets_scheduling() {
        let mut s = spec();
        s.preemptible = true;
        let image = Image {
            self_link: "img".to_string(),
        };
        let request = InstanceRequest::for_cluster(&identity(), &s, &image);
        let json = serde_json::to_value(&request).unwrap();
        assert_eq!(json["scheduling"]["preemptible"], true);
    }

    #[test]
    fn endpoint_extraction() {
        let instance = Instance::addressed("ember-1", "203.0.113.9", "10.0.0.9");
        let endpoint = instance.endpoint().unwrap();
        assert_eq!(endpoint.external_address, "203.0.113.9");
        assert_eq!(endpoint.internal_address, "10.0.0.9");
    }

    #[test]
    fn endpoint_absent_without_nat() {
        let instance = Instance {
            name: "ember-1".to_string(),
            status: Some("PROVISIONING".to_string()),
            network_interfaces: vec![NetworkInterface {
                network: None,
                network_ip: Some("10.0.0.9".to_string()),
                access_configs: vec![],
            }],
        };
        assert!(instance.endpoint().is_none());
    }

    #[test]
    fn instance_listing_round_trip() {
        // natIP/networkIP spellings must survive both directions
        let json = r#"{
            "items": [{
                "name": "ember-1",
                "status": "RUNNING",
                "networkInterfaces": [{
                    "networkIP": "10.0.0.3",
                    "accessConfigs": [{"type": "ONE_TO_ONE_NAT", "name": "External NAT", "natIP": "203.0.113.3"}]
                }]
            }]
        }"#;
        let list: InstanceList = serde_json::from_str(json).unwrap();
        let endpoint = list.items[0].endpoint().unwrap();
        assert_eq!(endpoint.external_address, "203.0.113.3");
        assert_eq!(endpoint.internal_address, "10.0.0.3");

        let empty: InstanceList = serde_json::from_str("{}").unwrap();
        assert!(empty.items.is_empty());
    }

    #[test]
    fn operation_error_message_flattening() {
        let error = OperationError::with_code("QUOTA_EXCEEDED");
        assert_eq!(error.message(), "QUOTA_EXCEEDED");

        let detailed = OperationError {
            errors: vec![
                OperationErrorDetail {
                    code: "QUOTA_EXCEEDED".to_string(),
                    message: "CPUS quota exceeded".to_string(),
                },
                OperationErrorDetail {
                    code: "ZONE_RESOURCE_POOL_EXHAUSTED".to_string(),
                    message: String::new(),
                },
            ],
        };
        assert_eq!(
            detailed.message(),
            "QUOTA_EXCEEDED: CPUS quota exceeded; ZONE_RESOURCE_POOL_EXHAUSTED"
        );
        assert_eq!(
            OperationError::default().message(),
            "unspecified operation error"
        );
    }

    #[test]
    fn operation_status_wire_names() {
        let op: Operation =
            serde_json::from_str(r#"{"id": "op-1", "status": "PENDING"}"#).unwrap();
        assert_eq!(op.status, OperationStatus::Pending);
        assert!(op.error.is_none());
        assert_eq!(
            serde_json::to_value(OperationStatus::Done).unwrap(),
            "DONE"
        );
    }

    #[test]
    fn firewall_rule_shape() {
        let rule = FirewallRule::cluster_ingress();
        let json = serde_json::to_value(&rule).unwrap();
        assert_eq!(json["name"], "ember-network");
        assert_eq!(json["direction"], "INGRESS");
        assert_eq!(json["allowed"][0]["IPProtocol"], "tcp");
        assert_eq!(json["allowed"][0]["ports"][0], "8786");
        assert_eq!(json["allowed"][0]["ports"][1], "8787");
        assert_eq!(json["targetTags"][0], "ember");
    }
}
