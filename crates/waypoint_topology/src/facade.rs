//! The per-call routing seam.
//!
//! Every outbound inter-service invocation in the platform asks the facade
//! for a destination immediately before handing off to the transport layer.
//! The call is O(1), non-suspending, and cannot fail: a name nobody has
//! registered routes to the default instance, which in monolith mode is the
//! process itself.

use crate::store::TopologyStore;
use crate::types::{InstanceId, ServiceName};
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Arc;
use tracing::trace;

/// Counters describing resolution traffic.
#[derive(Debug, Default, Clone)]
pub struct RoutingStats {
    /// Total resolutions served
    pub resolutions: u64,
    /// Resolutions that fell through to the default instance
    pub default_routes: u64,
}

/// Resolves logical service names to destination instances.
///
/// This is the integration point the generated typed clients call on every
/// RPC. It reads the local [`TopologyStore`] and nothing else: no network,
/// no locks beyond a sharded map read, no failure path.
///
/// # Examples
///
/// ```rust
/// use std::sync::Arc;
/// use waypoint_topology::{InstanceId, RoutingFacade, ServiceName, TopologyStore};
///
/// let store = Arc::new(TopologyStore::new(InstanceId::new("waypoint-monolith")));
/// let facade = RoutingFacade::new(Arc::clone(&store));
///
/// // Unregistered names degrade to the monolith rather than failing
/// assert_eq!(
///     facade.resolve_destination(&ServiceName::new("accounts")).as_str(),
///     "waypoint-monolith"
/// );
/// ```
pub struct RoutingFacade {
    store: Arc<TopologyStore>,
    resolutions: AtomicU64,
    default_routes: AtomicU64,
}

impl std::fmt::Debug for RoutingFacade {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("RoutingFacade")
            .field("default_instance", self.store.default_instance())
            .field("resolutions", &self.resolutions)
            .field("default_routes", &self.default_routes)
            .finish()
    }
}

impl RoutingFacade {
    /// Creates a facade reading from the given store.
    pub fn new(store: Arc<TopologyStore>) -> Self {
        Self {
            store,
            resolutions: AtomicU64::new(0),
            default_routes: AtomicU64::new(0),
        }
    }

    /// Resolves the destination instance for a logical service name.
    ///
    /// Called synchronously on every outbound inter-service call. Never
    /// fails and never blocks: absence of a mapping means "route to the
    /// default instance", by design, so a newly introduced or unconfigured
    /// service name degrades gracefully instead of becoming unreachable.
    pub fn resolve_destination(&self, service: &ServiceName) -> InstanceId {
        self.resolutions.fetch_add(1, Ordering::Relaxed);

        let destination = match self.store.lookup(service) {
            Some(instance) => instance,
            None => {
                self.default_routes.fetch_add(1, Ordering::Relaxed);
                self.store.default_instance().clone()
            }
        };

        trace!("Resolved '{}' -> '{}'", service, destination);
        destination
    }

    /// Returns a point-in-time copy of the resolution counters.
    pub fn stats(&self) -> RoutingStats {
        RoutingStats {
            resolutions: self.resolutions.load(Ordering::Relaxed),
            default_routes: self.default_routes.load(Ordering::Relaxed),
        }
    }
}
