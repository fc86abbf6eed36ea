//! The process-local topology store.
//!
//! This is the single shared mutable resource of the whole protocol: a
//! concurrency-safe table of `service name -> instance id` with a well-known
//! default for anything absent. Writers are the delta handler and the
//! snapshot reconciler; readers are the routing facade and the introspection
//! endpoint. Nothing here suspends or touches the network.

use crate::types::{InstanceId, ServiceName};
use dashmap::mapref::entry::Entry;
use dashmap::DashMap;
use std::collections::HashMap;
use std::sync::atomic::{AtomicU64, Ordering};
use tracing::debug;

// ============================================================================
// Entries
// ============================================================================

/// A single slot in the topology table.
///
/// `instance_id: None` is a removal tombstone: the slot remembers *when* the
/// mapping was removed so that a late-arriving older register cannot
/// resurrect it. Tombstones resolve to the default instance and are invisible
/// to introspection; every snapshot replacement clears them, which bounds
/// their memory to one snapshot interval.
#[derive(Debug, Clone)]
pub struct MappingEntry {
    /// Instance currently serving the name, or `None` for a tombstone
    pub instance_id: Option<InstanceId>,
    /// Timestamp of the event that last wrote this slot; the ordering guard
    pub last_applied_at: u64,
}

/// Counters describing the write traffic the store has seen.
#[derive(Debug, Default, Clone)]
pub struct TopologyStoreStats {
    /// Upserts that passed the ordering guard and mutated the table
    pub upserts_applied: u64,
    /// Upserts discarded as older than the current slot or snapshot floor
    pub upserts_discarded: u64,
    /// Removes that passed the ordering guard and tombstoned a slot
    pub removes_applied: u64,
    /// Removes discarded as older than the current slot or snapshot floor
    pub removes_discarded: u64,
    /// Full snapshot replacements applied
    pub snapshots_applied: u64,
}

// ============================================================================
// Store
// ============================================================================

/// Concurrency-safe routing table with a monolith-mode default.
///
/// Every operation is safe under arbitrary concurrent readers and writers;
/// contention is limited to the touched map shard. Resolution never fails
/// and never blocks on I/O: an unknown or tombstoned name resolves to the
/// configured default instance, which is what makes a single-process
/// monolith deployment the safe degenerate case of the protocol.
///
/// # Ordering Policy
///
/// The bus delivers deltas at-least-once with no ordering guarantee, so each
/// slot keeps the timestamp of the event that last wrote it and discards
/// older arrivals. Snapshot replacement is authoritative: it raises a floor
/// timestamp below which all subsequent deltas are rejected, while deltas
/// newer than the snapshot still apply on top.
///
/// # Examples
///
/// ```rust
/// use waypoint_topology::{InstanceId, ServiceName, TopologyStore};
///
/// let store = TopologyStore::new(InstanceId::new("waypoint-monolith"));
/// let accounts = ServiceName::new("accounts");
///
/// // Nothing registered yet: route to the monolith
/// assert_eq!(store.resolve(&accounts).as_str(), "waypoint-monolith");
///
/// store.upsert(accounts.clone(), InstanceId::new("waypoint-accounts-1"), 1);
/// assert_eq!(store.resolve(&accounts).as_str(), "waypoint-accounts-1");
/// ```
#[derive(Debug)]
pub struct TopologyStore {
    /// The table itself; tombstones included
    entries: DashMap<ServiceName, MappingEntry>,
    /// Destination for every name the table does not know
    default_instance: InstanceId,
    /// Timestamp of the last applied snapshot; deltas below it are stale
    authority_floor: AtomicU64,
    upserts_applied: AtomicU64,
    upserts_discarded: AtomicU64,
    removes_applied: AtomicU64,
    removes_discarded: AtomicU64,
    snapshots_applied: AtomicU64,
}

impl TopologyStore {
    /// Creates an empty store that routes everything to `default_instance`.
    pub fn new(default_instance: InstanceId) -> Self {
        Self {
            entries: DashMap::new(),
            default_instance,
            authority_floor: AtomicU64::new(0),
            upserts_applied: AtomicU64::new(0),
            upserts_discarded: AtomicU64::new(0),
            removes_applied: AtomicU64::new(0),
            removes_discarded: AtomicU64::new(0),
            snapshots_applied: AtomicU64::new(0),
        }
    }

    /// Returns the configured default instance.
    pub fn default_instance(&self) -> &InstanceId {
        &self.default_instance
    }

    /// Looks up the live mapping for a service, if one exists.
    ///
    /// Returns `None` for absent names and tombstones alike; callers that
    /// want the never-fails contract use [`resolve`](Self::resolve).
    pub fn lookup(&self, service: &ServiceName) -> Option<InstanceId> {
        self.entries
            .get(service)
            .and_then(|entry| entry.instance_id.clone())
    }

    /// Resolves a service name to a destination instance.
    ///
    /// Never fails and never blocks beyond shard contention: absence of a
    /// mapping is meaningful state ("route to the default"), not an error.
    pub fn resolve(&self, service: &ServiceName) -> InstanceId {
        self.lookup(service)
            .unwrap_or_else(|| self.default_instance.clone())
    }

    /// Applies a register/update observed at `observed_at`.
    ///
    /// Returns `true` if the table changed, `false` if the event was
    /// discarded as stale. An event with a timestamp equal to the slot's is
    /// applied, which keeps duplicate delivery of the same event a no-op in
    /// effect while letting genuine same-millisecond rewrites through.
    pub fn upsert(&self, service: ServiceName, instance: InstanceId, observed_at: u64) -> bool {
        if observed_at < self.authority_floor.load(Ordering::Acquire) {
            self.upserts_discarded.fetch_add(1, Ordering::Relaxed);
            debug!(
                "Discarding upsert for '{}': older than last snapshot",
                service
            );
            return false;
        }

        let applied = match self.entries.entry(service) {
            Entry::Occupied(mut occupied) => {
                let entry = occupied.get_mut();
                if observed_at < entry.last_applied_at {
                    false
                } else {
                    entry.instance_id = Some(instance);
                    entry.last_applied_at = observed_at;
                    true
                }
            }
            Entry::Vacant(vacant) => {
                vacant.insert(MappingEntry {
                    instance_id: Some(instance),
                    last_applied_at: observed_at,
                });
                true
            }
        };

        if applied {
            self.upserts_applied.fetch_add(1, Ordering::Relaxed);
        } else {
            self.upserts_discarded.fetch_add(1, Ordering::Relaxed);
        }
        applied
    }

    /// Applies an unregister observed at `observed_at`.
    ///
    /// The slot is tombstoned rather than deleted so the removal timestamp
    /// keeps guarding against out-of-order older upserts. Removing a name
    /// that was never registered still writes a tombstone: the removal may
    /// simply have overtaken its own register on the bus.
    pub fn remove(&self, service: ServiceName, observed_at: u64) -> bool {
        if observed_at < self.authority_floor.load(Ordering::Acquire) {
            self.removes_discarded.fetch_add(1, Ordering::Relaxed);
            debug!(
                "Discarding remove for '{}': older than last snapshot",
                service
            );
            return false;
        }

        let applied = match self.entries.entry(service) {
            Entry::Occupied(mut occupied) => {
                let entry = occupied.get_mut();
                if observed_at < entry.last_applied_at {
                    false
                } else {
                    entry.instance_id = None;
                    entry.last_applied_at = observed_at;
                    true
                }
            }
            Entry::Vacant(vacant) => {
                vacant.insert(MappingEntry {
                    instance_id: None,
                    last_applied_at: observed_at,
                });
                true
            }
        };

        if applied {
            self.removes_applied.fetch_add(1, Ordering::Relaxed);
        } else {
            self.removes_discarded.fetch_add(1, Ordering::Relaxed);
        }
        applied
    }

    /// Replaces the entire table with an authoritative snapshot.
    ///
    /// A full overwrite, not a merge: prior entries absent from the snapshot
    /// vanish, tombstones included. Raises the authority floor so deltas
    /// older than the snapshot are rejected afterwards. A snapshot older
    /// than the one already applied is itself discarded.
    ///
    /// Returns `true` if the snapshot was applied.
    pub fn replace_all(&self, mappings: HashMap<ServiceName, InstanceId>, snapshot_at: u64) -> bool {
        let floor = self.authority_floor.load(Ordering::Acquire);
        if snapshot_at < floor {
            debug!(
                "Discarding snapshot at {}: older than applied snapshot at {}",
                snapshot_at, floor
            );
            return false;
        }

        self.authority_floor.store(snapshot_at, Ordering::Release);
        self.entries.clear();
        for (service, instance) in mappings {
            self.entries.insert(
                service,
                MappingEntry {
                    instance_id: Some(instance),
                    last_applied_at: snapshot_at,
                },
            );
        }
        self.snapshots_applied.fetch_add(1, Ordering::Relaxed);
        true
    }

    /// Returns the live (non-tombstone) mappings, for introspection and
    /// snapshot assembly.
    pub fn mappings(&self) -> HashMap<ServiceName, InstanceId> {
        self.entries
            .iter()
            .filter_map(|entry| {
                entry
                    .value()
                    .instance_id
                    .clone()
                    .map(|instance| (entry.key().clone(), instance))
            })
            .collect()
    }

    /// Number of live mappings (tombstones excluded).
    pub fn len(&self) -> usize {
        self.entries
            .iter()
            .filter(|entry| entry.value().instance_id.is_some())
            .count()
    }

    /// True when no live mapping exists.
    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    /// Returns a point-in-time copy of the write counters.
    pub fn stats(&self) -> TopologyStoreStats {
        TopologyStoreStats {
            upserts_applied: self.upserts_applied.load(Ordering::Relaxed),
            upserts_discarded: self.upserts_discarded.load(Ordering::Relaxed),
            removes_applied: self.removes_applied.load(Ordering::Relaxed),
            removes_discarded: self.removes_discarded.load(Ordering::Relaxed),
            snapshots_applied: self.snapshots_applied.load(Ordering::Relaxed),
        }
    }
}
