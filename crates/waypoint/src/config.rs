//! Configuration management for the Waypoint node binary.
//!
//! Handles loading, validation, and conversion of node configuration from
//! TOML files and command-line arguments.

use serde::{Deserialize, Serialize};
use std::path::PathBuf;
use tracing::info;
use waypoint_node::NodeConfig;

/// Default introspection bind address
fn default_bind_address() -> String {
    "127.0.0.1:8090".to_string()
}

/// Application configuration loaded from TOML file.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct AppConfig {
    /// Node identity and role settings
    pub node: NodeSettings,
    /// Bus channel settings
    #[serde(default)]
    pub bus: BusSettings,
    /// Introspection endpoint settings
    #[serde(default)]
    pub introspection: IntrospectionSettings,
    /// Logging settings
    #[serde(default)]
    pub logging: LoggingSettings,
}

/// Identity and role of this process on the mesh.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct NodeSettings {
    /// Instance id this process registers under
    pub instance_id: String,
    /// Fallback destination for unregistered service names
    pub default_instance_id: String,
    /// Logical services this process serves
    #[serde(default)]
    pub serves: Vec<String>,
    /// Whether this node hosts the snapshot authority role
    #[serde(default)]
    pub authority: bool,
}

/// Bus channel names and snapshot cadence.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct BusSettings {
    /// Channel carrying incremental mapping events
    pub delta_channel: String,
    /// Channel carrying full topology snapshots
    pub snapshot_channel: String,
    /// Seconds between snapshot publications (authority only)
    pub snapshot_interval_secs: u64,
}

impl Default for BusSettings {
    fn default() -> Self {
        let defaults = NodeConfig::default();
        Self {
            delta_channel: defaults.delta_channel,
            snapshot_channel: defaults.snapshot_channel,
            snapshot_interval_secs: defaults.snapshot_interval_secs,
        }
    }
}

/// Introspection endpoint settings.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct IntrospectionSettings {
    /// Address the read-only HTTP endpoint binds to
    #[serde(default = "default_bind_address")]
    pub bind_address: String,
}

impl Default for IntrospectionSettings {
    fn default() -> Self {
        Self {
            bind_address: default_bind_address(),
        }
    }
}

/// Logging system configuration.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct LoggingSettings {
    /// Log level filter (trace, debug, info, warn, error)
    pub level: String,
    /// Whether to output logs in JSON format
    pub json_format: bool,
}

impl Default for LoggingSettings {
    fn default() -> Self {
        Self {
            level: "info".to_string(),
            json_format: false,
        }
    }
}

impl Default for AppConfig {
    fn default() -> Self {
        Self {
            node: NodeSettings {
                instance_id: "waypoint-monolith".to_string(),
                default_instance_id: "waypoint-monolith".to_string(),
                serves: vec![],
                authority: true,
            },
            bus: BusSettings::default(),
            introspection: IntrospectionSettings::default(),
            logging: LoggingSettings::default(),
        }
    }
}

impl AppConfig {
    /// Loads configuration from a TOML file.
    ///
    /// If the file doesn't exist, creates a default configuration file at
    /// the specified path and returns the default configuration.
    pub async fn load_from_file(path: &PathBuf) -> Result<Self, Box<dyn std::error::Error>> {
        if path.exists() {
            let content = tokio::fs::read_to_string(path).await?;
            let config: AppConfig = toml::from_str(&content)?;
            Ok(config)
        } else {
            // Create default config file
            let default_config = AppConfig::default();
            let toml_content = toml::to_string_pretty(&default_config)?;
            tokio::fs::write(path, toml_content).await?;
            info!("Created default configuration file: {}", path.display());
            Ok(default_config)
        }
    }

    /// Converts the application configuration into the node runtime's shape,
    /// applying environment overrides for instance identity.
    pub fn to_node_config(&self) -> NodeConfig {
        NodeConfig {
            instance_id: self.node.instance_id.clone(),
            default_instance_id: self.node.default_instance_id.clone(),
            serves: self.node.serves.clone(),
            authority: self.node.authority,
            delta_channel: self.bus.delta_channel.clone(),
            snapshot_channel: self.bus.snapshot_channel.clone(),
            snapshot_interval_secs: self.bus.snapshot_interval_secs,
        }
        .with_env_overrides()
    }

    /// Validates the configuration for consistency and correctness.
    pub fn validate(&self) -> Result<(), String> {
        if self.node.instance_id.is_empty() {
            return Err("node.instance_id cannot be empty".to_string());
        }
        if self.node.default_instance_id.is_empty() {
            return Err("node.default_instance_id cannot be empty".to_string());
        }
        if self.node.serves.iter().any(|s| s.is_empty()) {
            return Err("node.serves cannot contain empty service names".to_string());
        }

        if self.bus.delta_channel.is_empty() || self.bus.snapshot_channel.is_empty() {
            return Err("bus channel names cannot be empty".to_string());
        }
        if self.bus.delta_channel == self.bus.snapshot_channel {
            return Err("delta and snapshot channels must be distinct".to_string());
        }
        if self.bus.snapshot_interval_secs == 0 {
            return Err("bus.snapshot_interval_secs must be at least 1".to_string());
        }

        if self
            .introspection
            .bind_address
            .parse::<std::net::SocketAddr>()
            .is_err()
        {
            return Err(format!(
                "Invalid introspection bind address: {}",
                &self.introspection.bind_address
            ));
        }

        let valid_levels = ["trace", "debug", "info", "warn", "error"];
        if !valid_levels.contains(&self.logging.level.as_str()) {
            return Err(format!(
                "Invalid log level: {}. Must be one of: {valid_levels:?}",
                &self.logging.level
            ));
        }

        Ok(())
    }
}
