//! Topology consumer loops.
//!
//! Each node runs two independent message-consumer tasks: one draining the
//! delta channel into the [`DeltaRouter`], one draining the snapshot channel
//! into the [`SnapshotReconciler`]. Both follow the same discipline: decode,
//! apply, and above all keep going - a malformed payload is logged and
//! dropped, never allowed to stall the messages behind it.
//!
//! The caller opens the subscriptions before spawning the loops, so nothing
//! published after startup (this node's own registrations included) can slip
//! past an unattached listener.
//!
//! The loops are the only suspension points in the protocol. Resolution
//! never waits on them; it reads whatever the loops have applied so far.

use std::sync::Arc;
use tokio::sync::watch;
use tokio::task::JoinHandle;
use tracing::{info, warn};
use waypoint_bus::BusSubscription;
use waypoint_topology::{DeltaRouter, MappingEvent, SnapshotReconciler, TopologySnapshot};

/// Spawns the delta-channel consumer loop over an open subscription.
///
/// The loop exits when the shutdown flag flips or the channel closes,
/// draining the in-flight apply before returning.
pub fn spawn_delta_listener(
    mut subscription: BusSubscription,
    router: Arc<DeltaRouter>,
    mut shutdown: watch::Receiver<bool>,
) -> JoinHandle<()> {
    tokio::spawn(async move {
        info!(
            "📡 Topology delta listener consuming '{}'",
            subscription.channel()
        );

        loop {
            tokio::select! {
                changed = shutdown.changed() => {
                    if changed.is_err() || *shutdown.borrow() {
                        break;
                    }
                }
                message = subscription.recv() => {
                    match message {
                        Some(payload) => apply_delta(&router, &payload),
                        None => {
                            warn!(
                                "Delta channel '{}' closed; listener exiting",
                                subscription.channel()
                            );
                            break;
                        }
                    }
                }
            }
        }
        info!(
            "Topology delta listener on '{}' stopped",
            subscription.channel()
        );
    })
}

/// Decodes and applies one delta payload. Failures are logged and dropped.
fn apply_delta(router: &DeltaRouter, payload: &[u8]) {
    match MappingEvent::from_bytes(payload) {
        Ok(event) => {
            if let Err(e) = router.apply(&event) {
                warn!("Dropping mapping event {}: {}", event.event_id, e);
            }
        }
        Err(e) => {
            warn!("Dropping undecodable mapping event: {}", e);
        }
    }
}

/// Spawns the snapshot-channel consumer loop over an open subscription.
pub fn spawn_snapshot_listener(
    mut subscription: BusSubscription,
    reconciler: Arc<SnapshotReconciler>,
    mut shutdown: watch::Receiver<bool>,
) -> JoinHandle<()> {
    tokio::spawn(async move {
        info!(
            "📡 Topology snapshot listener consuming '{}'",
            subscription.channel()
        );

        loop {
            tokio::select! {
                changed = shutdown.changed() => {
                    if changed.is_err() || *shutdown.borrow() {
                        break;
                    }
                }
                message = subscription.recv() => {
                    match message {
                        Some(payload) => {
                            match TopologySnapshot::from_bytes(&payload) {
                                Ok(snapshot) => {
                                    reconciler.apply(&snapshot);
                                }
                                Err(e) => {
                                    warn!("Dropping undecodable topology snapshot: {}", e);
                                }
                            }
                        }
                        None => {
                            warn!(
                                "Snapshot channel '{}' closed; listener exiting",
                                subscription.channel()
                            );
                            break;
                        }
                    }
                }
            }
        }
        info!(
            "Topology snapshot listener on '{}' stopped",
            subscription.channel()
        );
    })
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::collections::HashMap;
    use std::time::Duration;
    use tokio::time::sleep;
    use waypoint_bus::{BusClient, InMemoryBus};
    use waypoint_topology::{InstanceId, ServiceName, TopologyStore};

    /// Polls until the condition holds or the deadline passes.
    async fn wait_for(mut condition: impl FnMut() -> bool) {
        for _ in 0..100 {
            if condition() {
                return;
            }
            sleep(Duration::from_millis(10)).await;
        }
        panic!("condition not reached within deadline");
    }

    #[tokio::test]
    async fn test_delta_listener_applies_events() {
        let bus = InMemoryBus::new();
        let store = Arc::new(TopologyStore::new(InstanceId::new("waypoint-monolith")));
        let router = Arc::new(DeltaRouter::new(Arc::clone(&store)));
        let (shutdown_tx, shutdown_rx) = watch::channel(false);

        let subscription = bus
            .subscribe("topology.delta")
            .await
            .expect("subscribe should succeed");
        let handle = spawn_delta_listener(subscription, Arc::clone(&router), shutdown_rx);

        let event = MappingEvent::register("accounts".into(), "a-1".into());
        bus.publish("topology.delta", event.to_bytes().expect("encode"))
            .await
            .expect("publish should succeed");

        wait_for(|| store.resolve(&"accounts".into()) == InstanceId::new("a-1")).await;

        shutdown_tx.send(true).expect("listener should be alive");
        handle.await.expect("listener should exit cleanly");
    }

    #[tokio::test]
    async fn test_malformed_delta_does_not_stall_the_loop() {
        let bus = InMemoryBus::new();
        let store = Arc::new(TopologyStore::new(InstanceId::new("waypoint-monolith")));
        let router = Arc::new(DeltaRouter::new(Arc::clone(&store)));
        let (shutdown_tx, shutdown_rx) = watch::channel(false);

        let subscription = bus
            .subscribe("topology.delta")
            .await
            .expect("subscribe should succeed");
        let handle = spawn_delta_listener(subscription, Arc::clone(&router), shutdown_rx);

        // Garbage first, then a well-formed event behind it
        bus.publish("topology.delta", b"definitely not json".to_vec())
            .await
            .expect("publish should succeed");
        let event = MappingEvent::register("inventory".into(), "b-2".into());
        bus.publish("topology.delta", event.to_bytes().expect("encode"))
            .await
            .expect("publish should succeed");

        wait_for(|| store.resolve(&"inventory".into()) == InstanceId::new("b-2")).await;

        shutdown_tx.send(true).expect("listener should be alive");
        handle.await.expect("listener should exit cleanly");
    }

    #[tokio::test]
    async fn test_snapshot_listener_replaces_table() {
        let bus = InMemoryBus::new();
        let store = Arc::new(TopologyStore::new(InstanceId::new("waypoint-monolith")));
        let reconciler = Arc::new(SnapshotReconciler::new(Arc::clone(&store)));
        let (shutdown_tx, shutdown_rx) = watch::channel(false);

        let subscription = bus
            .subscribe("topology.snapshot")
            .await
            .expect("subscribe should succeed");
        let handle = spawn_snapshot_listener(subscription, Arc::clone(&reconciler), shutdown_rx);

        store.upsert("ghost".into(), "nowhere".into(), 1);

        let mut mappings = HashMap::new();
        mappings.insert(ServiceName::from("accounts"), InstanceId::from("a-1"));
        let snapshot = TopologySnapshot::new(mappings);
        bus.publish("topology.snapshot", snapshot.to_bytes().expect("encode"))
            .await
            .expect("publish should succeed");

        wait_for(|| reconciler.stats().snapshots_applied == 1).await;

        assert_eq!(store.resolve(&"accounts".into()), InstanceId::new("a-1"));
        assert_eq!(
            store.resolve(&"ghost".into()),
            InstanceId::new("waypoint-monolith")
        );

        shutdown_tx.send(true).expect("listener should be alive");
        handle.await.expect("listener should exit cleanly");
    }

    #[tokio::test]
    async fn test_listeners_exit_on_shutdown_signal() {
        let bus = InMemoryBus::new();
        let store = Arc::new(TopologyStore::new(InstanceId::new("waypoint-monolith")));
        let router = Arc::new(DeltaRouter::new(Arc::clone(&store)));
        let reconciler = Arc::new(SnapshotReconciler::new(Arc::clone(&store)));
        let (shutdown_tx, shutdown_rx) = watch::channel(false);

        let delta_sub = bus
            .subscribe("topology.delta")
            .await
            .expect("subscribe should succeed");
        let snapshot_sub = bus
            .subscribe("topology.snapshot")
            .await
            .expect("subscribe should succeed");

        let delta = spawn_delta_listener(delta_sub, router, shutdown_rx.clone());
        let snapshot = spawn_snapshot_listener(snapshot_sub, reconciler, shutdown_rx);

        shutdown_tx.send(true).expect("listeners should be alive");
        delta.await.expect("delta listener should exit cleanly");
        snapshot.await.expect("snapshot listener should exit cleanly");
    }
}
