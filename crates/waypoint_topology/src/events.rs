//! Wire payload types for the two topology channels.
//!
//! Two message shapes cross the bus: incremental [`MappingEvent`] deltas on
//! the high-frequency delta channel, and full [`TopologySnapshot`] maps on
//! the low-frequency snapshot channel. Both are JSON with camelCase field
//! names so that every instance in the fleet, whatever generated its client
//! code, reads the same bytes the same way.

use crate::error::TopologyError;
use crate::types::{current_timestamp_ms, InstanceId, ServiceName};
use serde::{Deserialize, Serialize};
use std::collections::HashMap;
use uuid::Uuid;

// ============================================================================
// Delta Events
// ============================================================================

/// What a mapping event does to the routing table.
///
/// `Register` and `Update` are functionally identical upserts; the
/// distinction exists for observability and audit trails only, never for
/// different state transitions.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum MappingAction {
    /// A service instance announcing it now serves a logical name
    Register,
    /// A refresh of an existing mapping (same state transition as register)
    Update,
    /// A service instance withdrawing a logical name on graceful shutdown
    Unregister,
}

impl MappingAction {
    /// Returns the wire spelling of this action.
    pub fn as_str(&self) -> &'static str {
        match self {
            MappingAction::Register => "register",
            MappingAction::Update => "update",
            MappingAction::Unregister => "unregister",
        }
    }
}

impl std::fmt::Display for MappingAction {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", self.as_str())
    }
}

/// An incremental routing change broadcast on the delta channel.
///
/// The bus delivers these at-least-once with no ordering guarantee, so the
/// `timestamp` is the ordering key the store uses to reject stale arrivals,
/// and the whole apply path is idempotent so duplicates are harmless.
///
/// # Wire Shape
///
/// ```json
/// {
///   "eventId": "550e8400-e29b-41d4-a716-446655440000",
///   "timestamp": 1722470400123,
///   "serviceName": "accounts",
///   "instanceId": "waypoint-accounts-1",
///   "action": "register",
///   "metadata": { "version": "0.3.0" }
/// }
/// ```
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct MappingEvent {
    /// Unique identifier for idempotency tracking and log correlation
    pub event_id: Uuid,
    /// Event creation time in milliseconds since the Unix epoch; the
    /// ordering key for the store's stale-event guard
    pub timestamp: u64,
    /// Logical service the event targets
    pub service_name: ServiceName,
    /// Instance being registered or updated; absent (and ignored) for
    /// unregister
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub instance_id: Option<InstanceId>,
    /// What this event does to the table
    pub action: MappingAction,
    /// Advisory key-value bag (version, environment tags); never consulted
    /// for routing decisions
    #[serde(default, skip_serializing_if = "HashMap::is_empty")]
    pub metadata: HashMap<String, String>,
}

impl MappingEvent {
    /// Creates a register event with a fresh event id and timestamp.
    pub fn register(service_name: ServiceName, instance_id: InstanceId) -> Self {
        Self {
            event_id: Uuid::new_v4(),
            timestamp: current_timestamp_ms(),
            service_name,
            instance_id: Some(instance_id),
            action: MappingAction::Register,
            metadata: HashMap::new(),
        }
    }

    /// Creates an update event with a fresh event id and timestamp.
    pub fn update(service_name: ServiceName, instance_id: InstanceId) -> Self {
        Self {
            action: MappingAction::Update,
            ..Self::register(service_name, instance_id)
        }
    }

    /// Creates an unregister event with a fresh event id and timestamp.
    pub fn unregister(service_name: ServiceName) -> Self {
        Self {
            event_id: Uuid::new_v4(),
            timestamp: current_timestamp_ms(),
            service_name,
            instance_id: None,
            action: MappingAction::Unregister,
            metadata: HashMap::new(),
        }
    }

    /// Attaches an advisory metadata entry.
    pub fn with_metadata(mut self, key: impl Into<String>, value: impl Into<String>) -> Self {
        self.metadata.insert(key.into(), value.into());
        self
    }

    /// Encodes the event as JSON bytes for the bus.
    pub fn to_bytes(&self) -> Result<Vec<u8>, TopologyError> {
        serde_json::to_vec(self).map_err(TopologyError::Serialization)
    }

    /// Decodes an event from JSON bytes received off the bus.
    pub fn from_bytes(data: &[u8]) -> Result<Self, TopologyError> {
        serde_json::from_slice(data).map_err(TopologyError::Deserialization)
    }
}

// ============================================================================
// Snapshots
// ============================================================================

/// The authoritative full routing map, published periodically on the
/// snapshot channel by the orchestrator role.
///
/// Followers apply a snapshot as a wholesale replacement of their local
/// table, never a merge: absence from the snapshot destroys an entry. This
/// is the anti-entropy mechanism that bounds divergence no matter how many
/// deltas were lost, duplicated, or reordered in the interval.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct TopologySnapshot {
    /// Time the authority assembled this view, in milliseconds since the
    /// Unix epoch
    pub snapshot_timestamp: u64,
    /// The complete, authoritative service-to-instance map as of that time
    pub mappings: HashMap<ServiceName, InstanceId>,
}

impl TopologySnapshot {
    /// Creates a snapshot of the given mappings stamped with the current time.
    pub fn new(mappings: HashMap<ServiceName, InstanceId>) -> Self {
        Self {
            snapshot_timestamp: current_timestamp_ms(),
            mappings,
        }
    }

    /// Encodes the snapshot as JSON bytes for the bus.
    pub fn to_bytes(&self) -> Result<Vec<u8>, TopologyError> {
        serde_json::to_vec(self).map_err(TopologyError::Serialization)
    }

    /// Decodes a snapshot from JSON bytes received off the bus.
    pub fn from_bytes(data: &[u8]) -> Result<Self, TopologyError> {
        serde_json::from_slice(data).map_err(TopologyError::Deserialization)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_register_event_wire_shape() {
        let event = MappingEvent::register("accounts".into(), "waypoint-accounts-1".into())
            .with_metadata("version", "0.3.0");

        let json: serde_json::Value =
            serde_json::from_slice(&event.to_bytes().expect("event should encode"))
                .expect("encoded event should be valid JSON");

        assert_eq!(json["serviceName"], "accounts");
        assert_eq!(json["instanceId"], "waypoint-accounts-1");
        assert_eq!(json["action"], "register");
        assert_eq!(json["metadata"]["version"], "0.3.0");
        assert!(json["eventId"].is_string());
        assert!(json["timestamp"].is_u64());
    }

    #[test]
    fn test_unregister_event_omits_instance_id() {
        let event = MappingEvent::unregister("accounts".into());
        let json: serde_json::Value =
            serde_json::from_slice(&event.to_bytes().expect("event should encode"))
                .expect("encoded event should be valid JSON");

        assert_eq!(json["action"], "unregister");
        assert!(json.get("instanceId").is_none());
        assert!(json.get("metadata").is_none());
    }

    #[test]
    fn test_event_decodes_without_optional_fields() {
        // A minimal delta from another publisher: no metadata, no instance id
        let raw = br#"{
            "eventId": "550e8400-e29b-41d4-a716-446655440000",
            "timestamp": 1722470400123,
            "serviceName": "accounts",
            "action": "unregister"
        }"#;

        let event = MappingEvent::from_bytes(raw).expect("minimal event should decode");
        assert_eq!(event.service_name, ServiceName::from("accounts"));
        assert_eq!(event.action, MappingAction::Unregister);
        assert!(event.instance_id.is_none());
        assert!(event.metadata.is_empty());
    }

    #[test]
    fn test_malformed_event_is_an_error_not_a_panic() {
        assert!(MappingEvent::from_bytes(b"not json at all").is_err());
        assert!(MappingEvent::from_bytes(b"{\"action\":\"explode\"}").is_err());
    }

    #[test]
    fn test_snapshot_wire_shape() {
        let mut mappings = HashMap::new();
        mappings.insert(ServiceName::from("accounts"), InstanceId::from("a-1"));
        mappings.insert(ServiceName::from("inventory"), InstanceId::from("b-2"));

        let snapshot = TopologySnapshot::new(mappings);
        let json: serde_json::Value =
            serde_json::from_slice(&snapshot.to_bytes().expect("snapshot should encode"))
                .expect("encoded snapshot should be valid JSON");

        assert!(json["snapshotTimestamp"].is_u64());
        assert_eq!(json["mappings"]["accounts"], "a-1");
        assert_eq!(json["mappings"]["inventory"], "b-2");
    }

    #[test]
    fn test_update_and_register_share_shape() {
        let register = MappingEvent::register("accounts".into(), "a-1".into());
        let update = MappingEvent::update("accounts".into(), "a-1".into());

        assert_eq!(register.service_name, update.service_name);
        assert_eq!(register.instance_id, update.instance_id);
        assert_ne!(register.action, update.action);
    }
}
