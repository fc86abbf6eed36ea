//! Snapshot reconciliation - the anti-entropy half of the protocol.
//!
//! Deltas keep the table fresh; snapshots keep it *correct*. However many
//! deltas were lost, duplicated, or misordered since the last interval, one
//! snapshot replacement converges this node to the authority's view.

use crate::events::TopologySnapshot;
use crate::store::TopologyStore;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Arc;
use tracing::{debug, info};

/// Counters describing snapshot traffic seen by this node.
#[derive(Debug, Default, Clone)]
pub struct ReconcilerStats {
    /// Snapshots accepted and applied as full replacements
    pub snapshots_applied: u64,
    /// Snapshots discarded as older than one already applied
    pub snapshots_discarded: u64,
    /// Timestamp of the newest applied snapshot (0 before the first)
    pub last_snapshot_at: u64,
}

/// Applies authoritative [`TopologySnapshot`]s to the local store.
///
/// The snapshot producer is the orchestrator role elsewhere in the fleet;
/// this side only defines how followers must react: wholesale table
/// replacement, no merging. If the authority goes quiet the table simply
/// stops refreshing and resolution keeps serving last-known-good state.
pub struct SnapshotReconciler {
    store: Arc<TopologyStore>,
    snapshots_applied: AtomicU64,
    snapshots_discarded: AtomicU64,
    last_snapshot_at: AtomicU64,
}

impl std::fmt::Debug for SnapshotReconciler {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("SnapshotReconciler")
            .field("snapshots_applied", &self.snapshots_applied)
            .field("last_snapshot_at", &self.last_snapshot_at)
            .finish()
    }
}

impl SnapshotReconciler {
    /// Creates a reconciler writing into the given store.
    pub fn new(store: Arc<TopologyStore>) -> Self {
        Self {
            store,
            snapshots_applied: AtomicU64::new(0),
            snapshots_discarded: AtomicU64::new(0),
            last_snapshot_at: AtomicU64::new(0),
        }
    }

    /// Applies a snapshot as a full overwrite of the local table.
    ///
    /// Returns `true` if the snapshot was applied, `false` if it was
    /// discarded as older than one already seen.
    pub fn apply(&self, snapshot: &TopologySnapshot) -> bool {
        let applied = self
            .store
            .replace_all(snapshot.mappings.clone(), snapshot.snapshot_timestamp);

        if applied {
            self.snapshots_applied.fetch_add(1, Ordering::Relaxed);
            self.last_snapshot_at
                .store(snapshot.snapshot_timestamp, Ordering::Relaxed);
            info!(
                "🗺️ Applied topology snapshot: {} mappings as of {}",
                snapshot.mappings.len(),
                snapshot.snapshot_timestamp
            );
        } else {
            self.snapshots_discarded.fetch_add(1, Ordering::Relaxed);
            debug!(
                "Discarded out-of-date topology snapshot at {}",
                snapshot.snapshot_timestamp
            );
        }
        applied
    }

    /// Returns a point-in-time copy of the snapshot counters.
    pub fn stats(&self) -> ReconcilerStats {
        ReconcilerStats {
            snapshots_applied: self.snapshots_applied.load(Ordering::Relaxed),
            snapshots_discarded: self.snapshots_discarded.load(Ordering::Relaxed),
            last_snapshot_at: self.last_snapshot_at.load(Ordering::Relaxed),
        }
    }
}
