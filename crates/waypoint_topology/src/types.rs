//! Core identity types shared across the topology protocol.
//!
//! Logical service names and physical instance ids are both strings on the
//! wire, but confusing one for the other is exactly the kind of bug a routing
//! layer cannot afford, so each gets its own wrapper type.

use serde::{Deserialize, Serialize};

// ============================================================================
// Identity Wrappers
// ============================================================================

/// Logical name of a service ("accounts", "inventory", ...).
///
/// A service name is the key callers route by. It says nothing about where
/// the service currently runs; that is what [`InstanceId`] is for.
///
/// # Examples
///
/// ```rust
/// use waypoint_topology::ServiceName;
///
/// let accounts = ServiceName::new("accounts");
/// assert_eq!(accounts.as_str(), "accounts");
/// ```
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(transparent)]
pub struct ServiceName(pub String);

impl ServiceName {
    /// Creates a service name from anything string-like.
    pub fn new(name: impl Into<String>) -> Self {
        Self(name.into())
    }

    /// Returns the name as a string slice.
    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl std::fmt::Display for ServiceName {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", self.0)
    }
}

impl From<&str> for ServiceName {
    fn from(name: &str) -> Self {
        Self(name.to_string())
    }
}

impl From<String> for ServiceName {
    fn from(name: String) -> Self {
        Self(name)
    }
}

/// Physical identity of a running process that serves one or more logical
/// services (e.g. "waypoint-accounts-1").
///
/// The resolver maps a [`ServiceName`] to the `InstanceId` currently
/// responsible for it; the transport layer turns the id into an actual
/// connection, which is outside this crate.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(transparent)]
pub struct InstanceId(pub String);

impl InstanceId {
    /// Creates an instance id from anything string-like.
    pub fn new(id: impl Into<String>) -> Self {
        Self(id.into())
    }

    /// Returns the id as a string slice.
    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl std::fmt::Display for InstanceId {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", self.0)
    }
}

impl From<&str> for InstanceId {
    fn from(id: &str) -> Self {
        Self(id.to_string())
    }
}

impl From<String> for InstanceId {
    fn from(id: String) -> Self {
        Self(id)
    }
}

// ============================================================================
// Timestamps
// ============================================================================

/// Returns the current Unix timestamp in milliseconds.
///
/// All mapping events use this function for timestamp generation so that the
/// ordering guard in the topology store compares like with like. Millisecond
/// resolution keeps two quick register/unregister cycles for the same service
/// distinguishable.
///
/// # Panics
///
/// Panics if the system clock is set to a time before the Unix epoch. This
/// should never happen in practice on modern systems.
pub fn current_timestamp_ms() -> u64 {
    std::time::SystemTime::now()
        .duration_since(std::time::UNIX_EPOCH)
        .expect("Time went backwards")
        .as_millis() as u64
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_service_name_roundtrip() {
        let name = ServiceName::new("accounts");
        assert_eq!(name.to_string(), "accounts");
        assert_eq!(ServiceName::from("accounts"), name);

        // Transparent serde: serializes as a bare string
        let json = serde_json::to_string(&name).expect("ServiceName should serialize");
        assert_eq!(json, "\"accounts\"");
    }

    #[test]
    fn test_instance_id_roundtrip() {
        let id = InstanceId::new("waypoint-accounts-1");
        assert_eq!(id.as_str(), "waypoint-accounts-1");

        let json = serde_json::to_string(&id).expect("InstanceId should serialize");
        let back: InstanceId = serde_json::from_str(&json).expect("InstanceId should deserialize");
        assert_eq!(back, id);
    }

    #[test]
    fn test_timestamps_are_monotonic_enough() {
        let a = current_timestamp_ms();
        let b = current_timestamp_ms();
        assert!(b >= a);
        // Sanity: well past 2020 in milliseconds
        assert!(a > 1_577_836_800_000);
    }
}
