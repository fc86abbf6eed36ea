//! Error types for topology operations.

/// Errors that can occur while decoding or applying mapping traffic.
///
/// Nothing in this enum is fatal to the hosting process: consumer loops log
/// and drop, and the resolver itself has no failure mode at all (absence
/// routes to the default instance).
#[derive(Debug, thiserror::Error)]
pub enum TopologyError {
    /// Serialization failed when encoding an event or snapshot for the bus
    #[error("Serialization error: {0}")]
    Serialization(#[from] serde_json::Error),
    /// Deserialization failed when decoding a bus payload
    #[error("Deserialization error: {0}")]
    Deserialization(serde_json::Error),
    /// An event decoded cleanly but violates the protocol shape
    #[error("Malformed mapping event: {0}")]
    MalformedEvent(String),
    /// No handler registered for the event's action
    #[error("Handler not found for action: {0}")]
    HandlerNotFound(String),
}
