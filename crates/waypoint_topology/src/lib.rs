//! # Waypoint Topology
//!
//! The process-local half of the Waypoint service-topology resolution
//! protocol: an eventually-consistent routing table that maps logical
//! service names to the physical instance currently responsible for them.
//!
//! The platform runs either as one omnipotent monolith or as a fleet of
//! independently scaled instances with no code changes between the two. The
//! trick is entirely in here: every node keeps its own replica of the
//! routing table, mutated only by broadcast events, and anything the table
//! does not know routes to a well-known default instance - the monolith.
//!
//! ## Core Pieces
//!
//! - [`TopologyStore`] - the concurrency-safe table with timestamp-guarded
//!   writes and a default-instance fallback
//! - [`MappingEvent`] / [`TopologySnapshot`] - the two wire payloads
//! - [`DeltaRouter`] - the action-to-handler registry applying deltas
//! - [`SnapshotReconciler`] - wholesale table replacement for anti-entropy
//! - [`RoutingFacade`] - the O(1), never-fails per-call resolution seam
//!
//! ## Consistency Model
//!
//! Eventual, not immediate: the bus guarantees neither ordering nor
//! exactly-once delivery, so the store discards events older than what it
//! already applied, and a periodic authoritative snapshot bounds the
//! staleness window regardless of how many deltas went missing. A stale or
//! missing mapping never fails a request; it degrades to the default.
//!
//! ## Quick Start
//!
//! ```rust
//! use std::sync::Arc;
//! use waypoint_topology::{
//!     DeltaRouter, InstanceId, MappingEvent, RoutingFacade, TopologyStore,
//! };
//!
//! let store = Arc::new(TopologyStore::new(InstanceId::new("waypoint-monolith")));
//! let router = DeltaRouter::new(Arc::clone(&store));
//! let facade = RoutingFacade::new(Arc::clone(&store));
//!
//! // A service instance elsewhere announces itself
//! let event = MappingEvent::register("accounts".into(), "waypoint-accounts-1".into());
//! router.apply(&event).expect("register should apply");
//!
//! // Every outbound call resolves through the facade
//! assert_eq!(
//!     facade.resolve_destination(&"accounts".into()).as_str(),
//!     "waypoint-accounts-1"
//! );
//! ```

mod error;
mod events;
mod facade;
mod handler;
mod reconciler;
mod store;
mod types;

pub use error::TopologyError;
pub use events::{MappingAction, MappingEvent, TopologySnapshot};
pub use facade::{RoutingFacade, RoutingStats};
pub use handler::{DeltaRouter, MappingEventHandler};
pub use reconciler::{ReconcilerStats, SnapshotReconciler};
pub use store::{MappingEntry, TopologyStore, TopologyStoreStats};
pub use types::{current_timestamp_ms, InstanceId, ServiceName};
