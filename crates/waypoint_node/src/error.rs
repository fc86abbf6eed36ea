//! Node runtime error types.

use waypoint_bus::BusError;
use waypoint_topology::TopologyError;

/// Errors surfaced while wiring or running a node.
///
/// These cover startup and the introspection surface. The steady-state
/// protocol paths deliberately have no fatal errors: consumer loops drop bad
/// messages, the emitter absorbs publish failures, and resolution cannot
/// fail at all.
#[derive(Debug, thiserror::Error)]
pub enum NodeError {
    /// Bus client failure during wiring
    #[error("Bus error: {0}")]
    Bus(#[from] BusError),
    /// Topology encode/decode failure during wiring
    #[error("Topology error: {0}")]
    Topology(#[from] TopologyError),
    /// Socket-level failure from the introspection endpoint
    #[error("Network error: {0}")]
    Network(#[from] std::io::Error),
    /// Invalid node configuration
    #[error("Configuration error: {0}")]
    Config(String),
}
