//! Registration emitter.
//!
//! Announces which logical services this process serves. One register event
//! per served service on startup, one unregister per service on graceful
//! shutdown, fire-and-forget in both directions: the emitter does not wait
//! for acknowledgement, and a dead bus is logged, not fatal.
//!
//! Crash death (kill -9, OOM) is deliberately NOT detected here. A crashed
//! instance's mappings stay registered until it comes back and re-registers,
//! or until the snapshot authority's liveness channel notices and omits the
//! entry from the next snapshot.

use crate::config::NodeConfig;
use std::sync::Arc;
use tracing::{info, warn};
use waypoint_bus::BusClient;
use waypoint_topology::{InstanceId, MappingEvent, ServiceName};

/// Publishes this process's service registrations on the delta channel.
pub struct RegistrationEmitter {
    bus: Arc<dyn BusClient>,
    delta_channel: String,
    instance_id: InstanceId,
    services: Vec<ServiceName>,
}

impl std::fmt::Debug for RegistrationEmitter {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("RegistrationEmitter")
            .field("delta_channel", &self.delta_channel)
            .field("instance_id", &self.instance_id)
            .field("services", &self.services)
            .finish()
    }
}

impl RegistrationEmitter {
    /// Creates an emitter for the services named in the node config.
    pub fn new(bus: Arc<dyn BusClient>, config: &NodeConfig) -> Self {
        Self {
            bus,
            delta_channel: config.delta_channel.clone(),
            instance_id: InstanceId::new(config.instance_id.clone()),
            services: config.serves.iter().map(ServiceName::new).collect(),
        }
    }

    /// The services this emitter announces.
    pub fn services(&self) -> &[ServiceName] {
        &self.services
    }

    /// Publishes a register event for every served service.
    ///
    /// Called once on startup. Publish failures are logged and skipped:
    /// an unreachable bus must not block the process from serving, and the
    /// mappings will converge once the snapshot authority sees a later
    /// registration or health signal.
    pub async fn announce(&self) {
        for service in &self.services {
            let event = MappingEvent::register(service.clone(), self.instance_id.clone())
                .with_metadata("version", env!("CARGO_PKG_VERSION"));

            match self.publish(&event).await {
                Ok(()) => info!(
                    "📣 Announced '{}' -> '{}' (event {})",
                    service, self.instance_id, event.event_id
                ),
                Err(e) => warn!("Failed to announce '{}': {}", service, e),
            }
        }
    }

    /// Publishes an unregister event for every served service.
    ///
    /// Called once during graceful shutdown, before the process stops
    /// accepting work, so the rest of the fleet reroutes to the default
    /// instance instead of a closing socket.
    pub async fn withdraw(&self) {
        for service in &self.services {
            let event = MappingEvent::unregister(service.clone());

            match self.publish(&event).await {
                Ok(()) => info!("👋 Withdrew '{}' (event {})", service, event.event_id),
                Err(e) => warn!("Failed to withdraw '{}': {}", service, e),
            }
        }
    }

    async fn publish(
        &self,
        event: &MappingEvent,
    ) -> Result<(), Box<dyn std::error::Error + Send + Sync>> {
        let payload = event.to_bytes()?;
        self.bus.publish(&self.delta_channel, payload).await?;
        Ok(())
    }
}
