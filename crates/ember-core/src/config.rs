//! ember.toml configuration parser.
//!
//! Holds everything the CLI needs that is not part of a single spawn
//! request: the provider endpoint, webhook settings, poll tuning, and
//! default spec values. CLI flags override file values.

use serde::{Deserialize, Serialize};
use std::path::Path;
use std::time::Duration;

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct EmberConfig {
    pub provider: ProviderConfig,
    pub notify: Option<NotifyConfig>,
    #[serde(default)]
    pub poll: PollConfig,
    pub defaults: Option<SpawnDefaults>,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ProviderConfig {
    /// Base URL of the compute API, without a trailing slash.
    pub base_url: String,
    /// Bearer token attached to every request when set.
    pub auth_token: Option<String>,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct NotifyConfig {
    pub webhook_url: String,
    pub username: Option<String>,
    pub icon_url: Option<String>,
}

/// Cadences and bounds for every polling loop the system runs. The
/// deadlines are upper bounds on loops the provider ultimately drives;
/// hitting one is an error, not a retry trigger.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct PollConfig {
    /// Seconds between operation status fetches.
    pub operation_interval_secs: u64,
    /// Give up on an operation that has not reached DONE after this long.
    pub operation_timeout_secs: u64,
    /// Seconds between instance listing attempts during discovery.
    pub discovery_interval_secs: u64,
    /// Give up on discovery after this long.
    pub discovery_timeout_secs: u64,
    /// Seconds between readiness probe passes.
    pub readiness_interval_secs: u64,
    /// Give up on readiness after this long.
    pub readiness_timeout_secs: u64,
    /// TCP connect timeout for a single probe attempt.
    pub connect_timeout_secs: u64,
}

impl Default for PollConfig {
    fn default() -> Self {
        PollConfig {
            operation_interval_secs: 1,
            operation_timeout_secs: 300,
            discovery_interval_secs: 5,
            discovery_timeout_secs: 600,
            readiness_interval_secs: 5,
            readiness_timeout_secs: 600,
            connect_timeout_secs: 5,
        }
    }
}

impl PollConfig {
    pub fn operation_interval(&self) -> Duration {
        Duration::from_secs(self.operation_interval_secs)
    }

    pub fn operation_timeout(&self) -> Duration {
        Duration::from_secs(self.operation_timeout_secs)
    }

    pub fn discovery_interval(&self) -> Duration {
        Duration::from_secs(self.discovery_interval_secs)
    }

    pub fn discovery_timeout(&self) -> Duration {
        Duration::from_secs(self.discovery_timeout_secs)
    }

    pub fn readiness_interval(&self) -> Duration {
        Duration::from_secs(self.readiness_interval_secs)
    }

    pub fn readiness_timeout(&self) -> Duration {
        Duration::from_secs(self.readiness_timeout_secs)
    }

    pub fn connect_timeout(&self) -> Duration {
        Duration::from_secs(self.connect_timeout_secs)
    }
}

/// Spec fields applied when the matching CLI flag is left unset.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct SpawnDefaults {
    pub image_project: Option<String>,
    pub image_family: Option<String>,
    pub cpu: Option<u32>,
    pub ram_mb: Option<u32>,
    pub worker_count: Option<u32>,
    pub disk_size_gb: Option<u32>,
    pub preemptible: Option<bool>,
    pub idle_grace_secs: Option<u64>,
}

impl EmberConfig {
    pub fn from_file(path: &Path) -> anyhow::Result<Self> {
        let content = std::fs::read_to_string(path)?;
        let config: EmberConfig = toml::from_str(&content)?;
        Ok(config)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn parse_minimal() {
        let toml_str = r#"
[provider]
base_url = "https://compute.example.test/v1"
"#;
        let config: EmberConfig = toml::from_str(toml_str).unwrap();
        assert_eq!(config.provider.base_url, "https://compute.example.test/v1");
        assert!(config.notify.is_none());
        assert_eq!(config.poll.operation_interval_secs, 1);
        assert_eq!(config.poll.discovery_interval_secs, 5);
    }

    #[test]
    fn parse_full() {
        let toml_str = r#"
[provider]
base_url = "https://compute.example.test/v1"
auth_token = "secret"

[notify]
webhook_url = "https://hooks.example.test/T000/B000"
username = "ember alerts"

[poll]
operation_timeout_secs = 60
readiness_interval_secs = 2

[defaults]
image_project = "img-project"
image_family = "ubuntu-2204-lts"
cpu = 2
ram_mb = 1024
"#;
        let config: EmberConfig = toml::from_str(toml_str).unwrap();
        let notify = config.notify.unwrap();
        assert_eq!(notify.username.as_deref(), Some("ember alerts"));
        assert!(notify.icon_url.is_none());
        assert_eq!(config.poll.operation_timeout_secs, 60);
        assert_eq!(config.poll.readiness_interval_secs, 2);
        // untouched knobs keep their defaults
        assert_eq!(config.poll.operation_interval_secs, 1);
        let defaults = config.defaults.unwrap();
        assert_eq!(defaults.cpu, Some(2));
        assert_eq!(defaults.ram_mb, Some(1024));
        assert!(defaults.preemptible.is_none());
    }

    #[test]
    fn poll_durations() {
        let poll = PollConfig::default();
        assert_eq!(poll.operation_interval(), Duration::from_secs(1));
        assert_eq!(poll.discovery_timeout(), Duration::from_secs(600));
        assert_eq!(poll.connect_timeout(), Duration::from_secs(5));
    }
}
