//! # Waypoint Node
//!
//! The per-process runtime of the Waypoint mesh. Where `waypoint_topology`
//! defines what the routing table *is*, this crate is everything a running
//! process does around it:
//!
//! * **Consumer loops** - independent tasks draining the delta and snapshot
//!   channels into the local table
//! * **Registration emitter** - announces this process's services on
//!   startup, withdraws them on graceful shutdown
//! * **Snapshot authority** - the orchestrator role, publishing periodic
//!   full snapshots from its registration ledger (enabled by configuration
//!   on exactly one node)
//! * **Introspection endpoint** - read-only HTTP view of the local table
//!
//! [`WaypointNode`] wires all of it together from a [`NodeConfig`] and a
//! `BusClient`; the hosting application only decides which broker to hand it
//! and when to start and stop.
//!
//! ## Monolith and Fleet, Same Code
//!
//! A monolith runs one node that is authority, serves every logical service,
//! and is its own default instance: every resolution loops back to itself
//! until dedicated instances start announcing. Scaling out is configuration,
//! not code: point new instances at the same bus and give them service
//! names to serve.

mod config;
mod emitter;
mod error;
mod introspection;
mod listeners;
mod node;
mod orchestrator;

pub use config::NodeConfig;
pub use emitter::RegistrationEmitter;
pub use error::NodeError;
pub use introspection::{serve_introspection, topology_routes, IntrospectionState};
pub use listeners::{spawn_delta_listener, spawn_snapshot_listener};
pub use node::WaypointNode;
pub use orchestrator::SnapshotAuthority;
