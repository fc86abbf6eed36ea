//! Main application entry point for the Waypoint topology node.
//!
//! Provides CLI interface, configuration loading, and node startup: the
//! topology store and its consumer loops, the registration emitter, the
//! optional snapshot authority role, and the introspection endpoint.

use anyhow::Result;
use std::net::SocketAddr;
use std::sync::Arc;
use tracing::{error, info};
use tracing_subscriber::{fmt, layer::SubscriberExt, util::SubscriberInitExt, EnvFilter};

use waypoint_bus::InMemoryBus;
use waypoint_node::{serve_introspection, WaypointNode};

mod cli;
mod config;
mod signals;

use cli::CliArgs;
use config::{AppConfig, LoggingSettings};

// ============================================================================
// Logging Setup
// ============================================================================

/// Initialize the logging system.
///
/// Structured logging through tracing, filter controlled by `RUST_LOG` with
/// the configured level as fallback, optional JSON output for aggregation.
fn setup_logging(config: &LoggingSettings, json_format: bool) -> Result<()> {
    let filter =
        EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new(&config.level));

    let registry = tracing_subscriber::registry().with(filter);

    if json_format || config.json_format {
        registry
            .with(fmt::layer().json().with_target(false))
            .init();
    } else {
        registry
            .with(fmt::layer().with_ansi(true).with_target(false))
            .init();
    }

    Ok(())
}

// ============================================================================
// Application
// ============================================================================

/// Main application: configuration plus the wired node.
pub struct Application {
    config: AppConfig,
    node: Arc<WaypointNode>,
    bind_address: SocketAddr,
}

impl Application {
    /// Creates the application from CLI arguments.
    pub async fn new(args: CliArgs) -> Result<Self, Box<dyn std::error::Error>> {
        // Load configuration first (before logging setup)
        let mut config = AppConfig::load_from_file(&args.config_path).await?;

        // Apply CLI overrides
        if let Some(bind_address) = args.bind_address {
            config.introspection.bind_address = bind_address;
        }
        if let Some(instance_id) = args.instance_id {
            config.node.instance_id = instance_id;
        }
        if let Some(log_level) = args.log_level {
            config.logging.level = log_level;
        }
        if args.json_logs {
            config.logging.json_format = true;
        }

        // Validate configuration
        if let Err(e) = config.validate() {
            return Err(format!("Configuration validation failed: {e}").into());
        }

        setup_logging(&config.logging, args.json_logs)?;

        let bind_address: SocketAddr = config.introspection.bind_address.parse()?;

        // Monolith mode runs on the in-process bus; fleet deployments swap
        // in their broker's BusClient implementation here
        let bus = Arc::new(InMemoryBus::new());
        let node = Arc::new(WaypointNode::new(config.to_node_config(), bus)?);

        info!("🧭 Waypoint Topology Node v{}", env!("CARGO_PKG_VERSION"));
        info!(
            "📂 Config: {} | Instance: {} | Authority: {}",
            args.config_path.display(),
            config.node.instance_id,
            config.node.authority
        );

        Ok(Self {
            config,
            node,
            bind_address,
        })
    }

    /// Runs the node until a shutdown signal arrives.
    pub async fn run(self) -> Result<(), Box<dyn std::error::Error>> {
        info!("📋 Configuration Summary:");
        info!("  🌐 Introspection: http://{}", self.bind_address);
        info!(
            "  📮 Channels: {} / {}",
            self.config.bus.delta_channel, self.config.bus.snapshot_channel
        );
        info!(
            "  🗺️ Snapshot interval: {}s",
            self.config.bus.snapshot_interval_secs
        );
        info!(
            "  🎯 Default instance: {}",
            self.config.node.default_instance_id
        );
        if self.config.node.serves.is_empty() {
            info!("  🔌 Serves: (resolver only)");
        } else {
            info!("  🔌 Serves: {}", self.config.node.serves.join(", "));
        }

        self.node.start().await?;

        // Introspection endpoint runs alongside the node, sharing its
        // shutdown signal
        let introspection_handle = {
            let state = self.node.introspection_state();
            let shutdown = self.node.shutdown_signal();
            let bind_address = self.bind_address;
            tokio::spawn(async move {
                if let Err(e) = serve_introspection(state, bind_address, shutdown).await {
                    error!("❌ Introspection endpoint error: {e}");
                }
            })
        };

        // Periodic visibility into routing traffic
        let monitoring_handle = {
            let facade = self.node.facade();
            let store = self.node.store();
            tokio::spawn(async move {
                let mut interval = tokio::time::interval(tokio::time::Duration::from_secs(60));
                interval.tick().await; // skip the immediate first tick
                loop {
                    interval.tick().await;
                    let routing = facade.stats();
                    info!(
                        "📊 Topology health - {} mappings | {} resolutions | {} default-routed",
                        store.len(),
                        routing.resolutions,
                        routing.default_routes
                    );
                }
            })
        };

        info!("✅ Waypoint node is running! Press Ctrl+C to gracefully shutdown");

        signals::wait_for_shutdown().await?;

        info!("🛑 Shutdown signal received, withdrawing registrations...");

        monitoring_handle.abort();
        self.node.shutdown().await;

        if let Err(e) = introspection_handle.await {
            error!("Introspection task ended abnormally: {e}");
        }

        let routing = self.node.facade().stats();
        info!("📊 Final statistics:");
        info!("  - Resolutions served: {}", routing.resolutions);
        info!("  - Default-routed: {}", routing.default_routes);
        info!("👋 Waypoint node shutdown complete");

        Ok(())
    }
}

// ============================================================================
// Entry Point
// ============================================================================

#[tokio::main(flavor = "multi_thread")]
async fn main() -> Result<(), Box<dyn std::error::Error>> {
    let args = CliArgs::parse();

    match Application::new(args).await {
        Ok(app) => {
            if let Err(e) = app.run().await {
                error!("❌ Application error: {e:?}");
                std::process::exit(1);
            }
        }
        Err(e) => {
            eprintln!("❌ Failed to start application: {e:?}");
            std::process::exit(1);
        }
    }

    Ok(())
}
