//! Command line interface for the Waypoint node.

use clap::{Arg, Command};
use std::path::PathBuf;

/// Parsed command line arguments.
#[derive(Debug, Clone)]
pub struct CliArgs {
    /// Path to the TOML configuration file
    pub config_path: PathBuf,
    /// Override for the introspection bind address
    pub bind_address: Option<String>,
    /// Override for this process's instance id
    pub instance_id: Option<String>,
    /// Override for the log level
    pub log_level: Option<String>,
    /// Force JSON log output
    pub json_logs: bool,
}

impl CliArgs {
    /// Parses command line arguments.
    pub fn parse() -> Self {
        let matches = Command::new("Waypoint Topology Node")
            .version(env!("CARGO_PKG_VERSION"))
            .about("Service-topology resolution node for plugin-structured game backends")
            .arg(
                Arg::new("config")
                    .short('c')
                    .long("config")
                    .value_name("FILE")
                    .help("Configuration file path")
                    .default_value("waypoint.toml"),
            )
            .arg(
                Arg::new("bind")
                    .short('b')
                    .long("bind")
                    .value_name("ADDRESS")
                    .help("Introspection bind address (e.g., 127.0.0.1:8090)"),
            )
            .arg(
                Arg::new("instance-id")
                    .short('i')
                    .long("instance-id")
                    .value_name("ID")
                    .help("Instance id this process registers under"),
            )
            .arg(
                Arg::new("log-level")
                    .short('l')
                    .long("log-level")
                    .value_name("LEVEL")
                    .help("Log level (trace, debug, info, warn, error)"),
            )
            .arg(
                Arg::new("json-logs")
                    .long("json-logs")
                    .help("Output logs in JSON format")
                    .action(clap::ArgAction::SetTrue),
            )
            .get_matches();

        Self {
            config_path: PathBuf::from(
                matches
                    .get_one::<String>("config")
                    .expect("Default config path should always be set"),
            ),
            bind_address: matches.get_one::<String>("bind").cloned(),
            instance_id: matches.get_one::<String>("instance-id").cloned(),
            log_level: matches.get_one::<String>("log-level").cloned(),
            json_logs: matches.get_flag("json-logs"),
        }
    }
}
