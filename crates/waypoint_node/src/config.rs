//! Node runtime configuration.

use serde::{Deserialize, Serialize};

/// Default delta channel name
fn default_delta_channel() -> String {
    "topology.delta".to_string()
}

/// Default snapshot channel name
fn default_snapshot_channel() -> String {
    "topology.snapshot".to_string()
}

/// Default snapshot publication interval in seconds
fn default_snapshot_interval() -> u64 {
    30
}

/// Configuration for one Waypoint node.
///
/// A "node" is any process participating in the mesh: the monolith, a
/// dedicated service instance, or a pure consumer that only resolves. The
/// same configuration shape covers all three; what varies is which services
/// the node announces and whether it hosts the snapshot authority.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct NodeConfig {
    /// Physical identity of this process on the mesh
    pub instance_id: String,
    /// Destination for every service name the table does not know.
    /// In monolith mode this is the monolith's own instance id, which is
    /// what makes an unconfigured service name degrade gracefully.
    pub default_instance_id: String,
    /// Logical services this process announces on startup and withdraws on
    /// graceful shutdown
    #[serde(default)]
    pub serves: Vec<String>,
    /// Whether this node hosts the snapshot authority role. Enable on the
    /// monolith, or on exactly one instance of a dedicated fleet.
    #[serde(default)]
    pub authority: bool,
    /// Bus channel carrying incremental mapping events
    #[serde(default = "default_delta_channel")]
    pub delta_channel: String,
    /// Bus channel carrying full topology snapshots
    #[serde(default = "default_snapshot_channel")]
    pub snapshot_channel: String,
    /// Seconds between snapshot publications (authority only)
    #[serde(default = "default_snapshot_interval")]
    pub snapshot_interval_secs: u64,
}

impl Default for NodeConfig {
    fn default() -> Self {
        Self {
            instance_id: "waypoint-monolith".to_string(),
            default_instance_id: "waypoint-monolith".to_string(),
            serves: vec![],
            authority: true,
            delta_channel: default_delta_channel(),
            snapshot_channel: default_snapshot_channel(),
            snapshot_interval_secs: default_snapshot_interval(),
        }
    }
}

impl NodeConfig {
    /// Applies environment overrides for instance identity.
    ///
    /// Deployment tooling stamps each container with its identity rather
    /// than templating config files.
    ///
    /// # Environment Variables
    ///
    /// * `WAYPOINT_INSTANCE_ID` - overrides `instance_id`
    /// * `WAYPOINT_DEFAULT_INSTANCE_ID` - overrides `default_instance_id`
    pub fn with_env_overrides(mut self) -> Self {
        if let Ok(id) = std::env::var("WAYPOINT_INSTANCE_ID") {
            if !id.is_empty() {
                self.instance_id = id;
            }
        }
        if let Ok(id) = std::env::var("WAYPOINT_DEFAULT_INSTANCE_ID") {
            if !id.is_empty() {
                self.default_instance_id = id;
            }
        }
        self
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_defaults_describe_a_monolith() {
        let config = NodeConfig::default();
        assert_eq!(config.instance_id, "waypoint-monolith");
        assert_eq!(config.default_instance_id, "waypoint-monolith");
        assert!(config.authority);
        assert!(config.serves.is_empty());
        assert_eq!(config.delta_channel, "topology.delta");
        assert_eq!(config.snapshot_channel, "topology.snapshot");
        assert_eq!(config.snapshot_interval_secs, 30);
    }

    #[test]
    fn test_deserialization_fills_defaults() {
        let config: NodeConfig = serde_json::from_str(
            r#"{"instance_id": "waypoint-accounts-1", "default_instance_id": "waypoint-monolith"}"#,
        )
        .expect("minimal config should deserialize");

        assert_eq!(config.instance_id, "waypoint-accounts-1");
        assert!(!config.authority);
        assert_eq!(config.delta_channel, "topology.delta");
        assert_eq!(config.snapshot_interval_secs, 30);
    }

    #[test]
    fn test_env_overrides_replace_identity() {
        std::env::set_var("WAYPOINT_INSTANCE_ID", "waypoint-accounts-7");

        let config = NodeConfig::default().with_env_overrides();
        assert_eq!(config.instance_id, "waypoint-accounts-7");
        // Untouched fields keep their values
        assert_eq!(config.default_instance_id, "waypoint-monolith");

        std::env::remove_var("WAYPOINT_INSTANCE_ID");
    }
}
