//! The snapshot authority (orchestrator) role.
//!
//! Exactly one node in a deployment publishes periodic full snapshots of the
//! routing table: the monolith in monolith mode, or a designated instance in
//! a fleet. The authority keeps its own registration ledger, fed by the same
//! delta channel everyone else consumes, and every interval broadcasts the
//! ledger wholesale on the snapshot channel. Followers replace their tables
//! with it, which repairs whatever the lossy delta path left behind.
//!
//! How the authority is elected, and how it detects crashed instances to
//! omit them from the ledger, are separate concerns fed to it from outside;
//! here the role is assigned by static configuration.

use crate::config::NodeConfig;
use dashmap::DashMap;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Arc;
use std::time::Duration;
use tokio::sync::watch;
use tokio::task::JoinHandle;
use tokio::time::interval;
use tracing::{debug, error, info, warn};
use waypoint_bus::{BusClient, BusError};
use waypoint_topology::{
    InstanceId, MappingAction, MappingEvent, ServiceName, TopologySnapshot,
};

/// One registration as the authority remembers it.
#[derive(Debug, Clone)]
struct LedgerEntry {
    instance_id: InstanceId,
    updated_at: u64,
}

/// Maintains the authoritative registration ledger and publishes snapshots.
pub struct SnapshotAuthority {
    bus: Arc<dyn BusClient>,
    ledger: DashMap<ServiceName, LedgerEntry>,
    delta_channel: String,
    snapshot_channel: String,
    publish_interval: Duration,
    snapshots_published: AtomicU64,
}

impl std::fmt::Debug for SnapshotAuthority {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("SnapshotAuthority")
            .field("ledger", &self.ledger.len())
            .field("snapshot_channel", &self.snapshot_channel)
            .field("publish_interval", &self.publish_interval)
            .field("snapshots_published", &self.snapshots_published)
            .finish()
    }
}

impl SnapshotAuthority {
    /// Creates an authority publishing on the channels named in the config.
    pub fn new(bus: Arc<dyn BusClient>, config: &NodeConfig) -> Self {
        Self {
            bus,
            ledger: DashMap::new(),
            delta_channel: config.delta_channel.clone(),
            snapshot_channel: config.snapshot_channel.clone(),
            publish_interval: Duration::from_secs(config.snapshot_interval_secs),
            snapshots_published: AtomicU64::new(0),
        }
    }

    /// Folds one mapping event into the ledger.
    ///
    /// The same timestamp discipline as the follower store: an event older
    /// than what the ledger already holds for that service is ignored.
    pub fn observe(&self, event: &MappingEvent) {
        match event.action {
            MappingAction::Register | MappingAction::Update => {
                let instance_id = match event.instance_id.clone() {
                    Some(instance_id) => instance_id,
                    None => {
                        warn!(
                            "Ledger ignoring {} for '{}' without an instance id",
                            event.action, event.service_name
                        );
                        return;
                    }
                };
                match self.ledger.entry(event.service_name.clone()) {
                    dashmap::mapref::entry::Entry::Occupied(mut occupied) => {
                        let entry = occupied.get_mut();
                        if event.timestamp >= entry.updated_at {
                            entry.instance_id = instance_id;
                            entry.updated_at = event.timestamp;
                        }
                    }
                    dashmap::mapref::entry::Entry::Vacant(vacant) => {
                        vacant.insert(LedgerEntry {
                            instance_id,
                            updated_at: event.timestamp,
                        });
                    }
                }
            }
            MappingAction::Unregister => {
                self.ledger.remove_if(&event.service_name, |_, entry| {
                    event.timestamp >= entry.updated_at
                });
            }
        }
    }

    /// Assembles the current ledger into a snapshot stamped now.
    pub fn assemble_snapshot(&self) -> TopologySnapshot {
        TopologySnapshot::new(
            self.ledger
                .iter()
                .map(|entry| (entry.key().clone(), entry.value().instance_id.clone()))
                .collect(),
        )
    }

    /// Publishes one snapshot of the current ledger.
    pub async fn publish_snapshot(&self) {
        let snapshot = self.assemble_snapshot();
        let mapping_count = snapshot.mappings.len();

        let payload = match snapshot.to_bytes() {
            Ok(payload) => payload,
            Err(e) => {
                error!("Failed to encode topology snapshot: {}", e);
                return;
            }
        };

        match self.bus.publish(&self.snapshot_channel, payload).await {
            Ok(()) => {
                self.snapshots_published.fetch_add(1, Ordering::Relaxed);
                debug!(
                    "🗺️ Published topology snapshot: {} mappings on '{}'",
                    mapping_count, self.snapshot_channel
                );
            }
            Err(e) => warn!("Failed to publish topology snapshot: {}", e),
        }
    }

    /// Snapshots published since startup.
    pub fn snapshots_published(&self) -> u64 {
        self.snapshots_published.load(Ordering::Relaxed)
    }

    /// Starts the authority's two loops: the ledger feed consuming the delta
    /// channel, and the periodic snapshot publisher.
    ///
    /// The ledger subscription is opened before either loop spawns, so
    /// registrations published immediately after startup are not missed.
    pub async fn start(
        self: Arc<Self>,
        shutdown: watch::Receiver<bool>,
    ) -> Result<Vec<JoinHandle<()>>, BusError> {
        let subscription = self.bus.subscribe(&self.delta_channel).await?;
        Ok(vec![
            Arc::clone(&self).spawn_ledger_feed(subscription, shutdown.clone()),
            self.spawn_publisher(shutdown),
        ])
    }

    fn spawn_ledger_feed(
        self: Arc<Self>,
        mut subscription: waypoint_bus::BusSubscription,
        mut shutdown: watch::Receiver<bool>,
    ) -> JoinHandle<()> {
        tokio::spawn(async move {
            info!("🏛️ Snapshot authority ledger feeding from '{}'", self.delta_channel);

            loop {
                tokio::select! {
                    changed = shutdown.changed() => {
                        if changed.is_err() || *shutdown.borrow() {
                            break;
                        }
                    }
                    message = subscription.recv() => {
                        match message {
                            Some(payload) => match MappingEvent::from_bytes(&payload) {
                                Ok(event) => self.observe(&event),
                                Err(e) => warn!("Ledger dropping undecodable event: {}", e),
                            },
                            None => break,
                        }
                    }
                }
            }
            info!("Snapshot authority ledger feed stopped");
        })
    }

    fn spawn_publisher(self: Arc<Self>, mut shutdown: watch::Receiver<bool>) -> JoinHandle<()> {
        tokio::spawn(async move {
            let mut ticker = interval(self.publish_interval);
            // The first tick fires immediately; use it to seed followers
            info!(
                "🏛️ Snapshot authority publishing every {:?} on '{}'",
                self.publish_interval, self.snapshot_channel
            );

            loop {
                tokio::select! {
                    changed = shutdown.changed() => {
                        if changed.is_err() || *shutdown.borrow() {
                            break;
                        }
                    }
                    _ = ticker.tick() => {
                        self.publish_snapshot().await;
                    }
                }
            }
            info!("Snapshot authority publisher stopped");
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use waypoint_bus::InMemoryBus;

    fn authority() -> (Arc<InMemoryBus>, SnapshotAuthority) {
        let bus = Arc::new(InMemoryBus::new());
        let authority = SnapshotAuthority::new(bus.clone(), &NodeConfig::default());
        (bus, authority)
    }

    #[test]
    fn test_ledger_follows_register_and_unregister() {
        let (_bus, authority) = authority();

        authority.observe(&MappingEvent::register("accounts".into(), "a-1".into()));
        authority.observe(&MappingEvent::register("inventory".into(), "b-2".into()));
        authority.observe(&MappingEvent::unregister("accounts".into()));

        let snapshot = authority.assemble_snapshot();
        assert_eq!(snapshot.mappings.len(), 1);
        assert_eq!(
            snapshot.mappings.get(&ServiceName::from("inventory")),
            Some(&InstanceId::from("b-2"))
        );
    }

    #[test]
    fn test_ledger_discards_stale_updates() {
        let (_bus, authority) = authority();

        let mut newer = MappingEvent::register("accounts".into(), "a-2".into());
        newer.timestamp = 100;
        let mut stale = MappingEvent::update("accounts".into(), "a-1".into());
        stale.timestamp = 50;

        authority.observe(&newer);
        authority.observe(&stale);

        let snapshot = authority.assemble_snapshot();
        assert_eq!(
            snapshot.mappings.get(&ServiceName::from("accounts")),
            Some(&InstanceId::from("a-2"))
        );
    }

    #[test]
    fn test_ledger_discards_stale_unregister() {
        let (_bus, authority) = authority();

        let mut register = MappingEvent::register("accounts".into(), "a-1".into());
        register.timestamp = 100;
        let mut stale_unregister = MappingEvent::unregister("accounts".into());
        stale_unregister.timestamp = 50;

        authority.observe(&register);
        authority.observe(&stale_unregister);

        assert_eq!(authority.assemble_snapshot().mappings.len(), 1);
    }

    #[tokio::test]
    async fn test_publish_snapshot_reaches_subscribers() {
        let (bus, authority) = authority();
        let mut sub = bus
            .subscribe("topology.snapshot")
            .await
            .expect("subscribe should succeed");

        authority.observe(&MappingEvent::register("accounts".into(), "a-1".into()));
        authority.publish_snapshot().await;

        let payload = sub.recv().await.expect("snapshot should arrive");
        let snapshot = TopologySnapshot::from_bytes(&payload).expect("snapshot should decode");
        assert_eq!(
            snapshot.mappings.get(&ServiceName::from("accounts")),
            Some(&InstanceId::from("a-1"))
        );
        assert_eq!(authority.snapshots_published(), 1);
    }
}
