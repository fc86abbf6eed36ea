//! Node wiring.
//!
//! [`WaypointNode`] assembles the topology components for one process: the
//! store, the delta router and snapshot reconciler with their consumer
//! loops, the registration emitter, and (when configured) the snapshot
//! authority. The hosting application owns the bus client and the
//! introspection HTTP server; the node owns everything in between.

use crate::config::NodeConfig;
use crate::emitter::RegistrationEmitter;
use crate::error::NodeError;
use crate::introspection::IntrospectionState;
use crate::listeners::{spawn_delta_listener, spawn_snapshot_listener};
use crate::orchestrator::SnapshotAuthority;
use futures::future::join_all;
use std::sync::Arc;
use tokio::sync::{watch, Mutex};
use tokio::task::JoinHandle;
use tracing::{info, warn};
use waypoint_bus::BusClient;
use waypoint_topology::{
    DeltaRouter, InstanceId, RoutingFacade, ServiceName, SnapshotReconciler, TopologyStore,
};

/// One process's view of the Waypoint mesh.
///
/// # Lifecycle
///
/// 1. [`new`](Self::new) wires the components against a bus client
/// 2. [`start`](Self::start) spawns the consumer loops, starts the authority
///    role if configured, and announces this node's services
/// 3. the application serves requests, resolving through
///    [`facade`](Self::facade) on every outbound call
/// 4. [`shutdown`](Self::shutdown) withdraws the registrations, stops the
///    loops, and drains in-flight handler calls
pub struct WaypointNode {
    config: NodeConfig,
    bus: Arc<dyn BusClient>,
    store: Arc<TopologyStore>,
    facade: Arc<RoutingFacade>,
    router: Arc<DeltaRouter>,
    reconciler: Arc<SnapshotReconciler>,
    emitter: RegistrationEmitter,
    authority: Option<Arc<SnapshotAuthority>>,
    shutdown_tx: watch::Sender<bool>,
    tasks: Mutex<Vec<JoinHandle<()>>>,
}

impl std::fmt::Debug for WaypointNode {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("WaypointNode")
            .field("instance_id", &self.config.instance_id)
            .field("authority", &self.authority.is_some())
            .field("serves", &self.config.serves)
            .finish()
    }
}

impl WaypointNode {
    /// Wires a node from its configuration and a bus client.
    pub fn new(config: NodeConfig, bus: Arc<dyn BusClient>) -> Result<Self, NodeError> {
        if config.instance_id.is_empty() {
            return Err(NodeError::Config("instance_id cannot be empty".to_string()));
        }
        if config.default_instance_id.is_empty() {
            return Err(NodeError::Config(
                "default_instance_id cannot be empty".to_string(),
            ));
        }

        let store = Arc::new(TopologyStore::new(InstanceId::new(
            config.default_instance_id.clone(),
        )));
        let facade = Arc::new(RoutingFacade::new(Arc::clone(&store)));
        let router = Arc::new(DeltaRouter::new(Arc::clone(&store)));
        let reconciler = Arc::new(SnapshotReconciler::new(Arc::clone(&store)));
        let emitter = RegistrationEmitter::new(Arc::clone(&bus), &config);
        let authority = if config.authority {
            Some(Arc::new(SnapshotAuthority::new(Arc::clone(&bus), &config)))
        } else {
            None
        };
        let (shutdown_tx, _) = watch::channel(false);

        Ok(Self {
            config,
            bus,
            store,
            facade,
            router,
            reconciler,
            emitter,
            authority,
            shutdown_tx,
            tasks: Mutex::new(Vec::new()),
        })
    }

    /// The local topology store.
    pub fn store(&self) -> Arc<TopologyStore> {
        Arc::clone(&self.store)
    }

    /// The per-call resolution facade.
    pub fn facade(&self) -> Arc<RoutingFacade> {
        Arc::clone(&self.facade)
    }

    /// This node's configuration.
    pub fn config(&self) -> &NodeConfig {
        &self.config
    }

    /// Resolves a destination through the facade; the convenience form the
    /// generated service clients call.
    pub fn resolve_destination(&self, service: &ServiceName) -> InstanceId {
        self.facade.resolve_destination(service)
    }

    /// A shutdown signal receiver, for tasks the application runs alongside
    /// the node (e.g. the introspection server).
    pub fn shutdown_signal(&self) -> watch::Receiver<bool> {
        self.shutdown_tx.subscribe()
    }

    /// Shared handles for the introspection endpoint's read-only view.
    pub fn introspection_state(&self) -> IntrospectionState {
        IntrospectionState {
            store: Arc::clone(&self.store),
            facade: Arc::clone(&self.facade),
            reconciler: Arc::clone(&self.reconciler),
        }
    }

    /// Starts consumer loops and the authority role, then announces this
    /// node's services on the delta channel.
    pub async fn start(&self) -> Result<(), NodeError> {
        info!(
            "🚀 Starting Waypoint node '{}' (default instance '{}')",
            self.config.instance_id, self.config.default_instance_id
        );

        // Open every subscription before announcing anything, so this
        // node's own registrations land in its table and ledger too
        let delta_subscription = self.bus.subscribe(&self.config.delta_channel).await?;
        let snapshot_subscription = self.bus.subscribe(&self.config.snapshot_channel).await?;

        let mut tasks = self.tasks.lock().await;
        tasks.push(spawn_delta_listener(
            delta_subscription,
            Arc::clone(&self.router),
            self.shutdown_tx.subscribe(),
        ));
        tasks.push(spawn_snapshot_listener(
            snapshot_subscription,
            Arc::clone(&self.reconciler),
            self.shutdown_tx.subscribe(),
        ));

        if let Some(authority) = &self.authority {
            tasks.extend(
                Arc::clone(authority)
                    .start(self.shutdown_tx.subscribe())
                    .await?,
            );
        }
        drop(tasks);

        self.emitter.announce().await;

        info!(
            "✅ Waypoint node '{}' running ({} services announced, authority: {})",
            self.config.instance_id,
            self.emitter.services().len(),
            self.authority.is_some()
        );
        Ok(())
    }

    /// Withdraws this node's registrations and stops all loops, draining
    /// in-flight handler calls before returning.
    pub async fn shutdown(&self) {
        info!("🛑 Shutting down Waypoint node '{}'", self.config.instance_id);

        // Withdraw first, while the bus connection is still healthy
        self.emitter.withdraw().await;

        if self.shutdown_tx.send(true).is_err() {
            // No live receivers; loops are already gone
            warn!("Shutdown signalled with no running topology tasks");
        }

        let tasks = std::mem::take(&mut *self.tasks.lock().await);
        for result in join_all(tasks).await {
            if let Err(e) = result {
                warn!("Topology task ended abnormally: {}", e);
            }
        }

        info!("✅ Waypoint node '{}' stopped", self.config.instance_id);
    }
}
