//! Delta event application.
//!
//! Incoming [`MappingEvent`]s are dispatched through an explicit registry
//! mapping each [`MappingAction`] to a handler, populated at startup. The
//! registry exists so that hosts can bolt on additional actions (or wrap the
//! built-in ones for auditing) without touching the dispatch path.
//!
//! Application is idempotent end to end: the bus delivers at-least-once, and
//! replaying any event leaves the table exactly as a single delivery would.

use crate::error::TopologyError;
use crate::events::{MappingAction, MappingEvent};
use crate::store::TopologyStore;
use std::collections::HashMap;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Arc;
use tracing::debug;

// ============================================================================
// Handler Trait
// ============================================================================

/// Applies one category of mapping event to local state.
///
/// Handlers must be cheap and non-suspending: they run inline in the
/// delta-consumer loop, and a slow handler delays every event behind it.
pub trait MappingEventHandler: Send + Sync {
    /// Applies the event. An `Err` means the event was malformed for this
    /// action; the caller logs and drops it, never propagates it out of the
    /// consumer loop.
    fn handle(&self, event: &MappingEvent) -> Result<(), TopologyError>;

    /// Human-readable name for log correlation.
    fn handler_name(&self) -> &str;
}

/// Built-in handler for `register` and `update`: both upsert.
struct UpsertHandler {
    store: Arc<TopologyStore>,
}

impl MappingEventHandler for UpsertHandler {
    fn handle(&self, event: &MappingEvent) -> Result<(), TopologyError> {
        let instance = event.instance_id.clone().ok_or_else(|| {
            TopologyError::MalformedEvent(format!(
                "{} event for '{}' is missing an instance id",
                event.action, event.service_name
            ))
        })?;

        let applied =
            self.store
                .upsert(event.service_name.clone(), instance.clone(), event.timestamp);
        if applied {
            debug!(
                "Applied {} '{}' -> '{}' (event {})",
                event.action, event.service_name, instance, event.event_id
            );
        } else {
            debug!(
                "Discarded stale {} for '{}' (event {})",
                event.action, event.service_name, event.event_id
            );
        }
        Ok(())
    }

    fn handler_name(&self) -> &str {
        "topology_upsert"
    }
}

/// Built-in handler for `unregister`.
struct RemoveHandler {
    store: Arc<TopologyStore>,
}

impl MappingEventHandler for RemoveHandler {
    fn handle(&self, event: &MappingEvent) -> Result<(), TopologyError> {
        if event.instance_id.is_some() {
            // The field is advisory noise on an unregister; tolerate it
            debug!(
                "Ignoring instance id on unregister for '{}' (event {})",
                event.service_name, event.event_id
            );
        }

        let applied = self.store.remove(event.service_name.clone(), event.timestamp);
        if applied {
            debug!(
                "Applied unregister of '{}' (event {})",
                event.service_name, event.event_id
            );
        } else {
            debug!(
                "Discarded stale unregister for '{}' (event {})",
                event.service_name, event.event_id
            );
        }
        Ok(())
    }

    fn handler_name(&self) -> &str {
        "topology_remove"
    }
}

// ============================================================================
// Router
// ============================================================================

/// Dispatches mapping events to their action handlers.
///
/// This is the "Delta Event Handler" of the protocol: the consumer loop
/// decodes bus payloads and feeds them through [`apply`](Self::apply), which
/// looks up the action in the registry and invokes the matching handler.
///
/// # Examples
///
/// ```rust
/// use std::sync::Arc;
/// use waypoint_topology::{DeltaRouter, InstanceId, MappingEvent, TopologyStore};
///
/// let store = Arc::new(TopologyStore::new(InstanceId::new("waypoint-monolith")));
/// let router = DeltaRouter::new(Arc::clone(&store));
///
/// let event = MappingEvent::register("accounts".into(), "waypoint-accounts-1".into());
/// router.apply(&event).expect("register should apply");
/// assert_eq!(store.resolve(&"accounts".into()).as_str(), "waypoint-accounts-1");
/// ```
pub struct DeltaRouter {
    handlers: HashMap<MappingAction, Arc<dyn MappingEventHandler>>,
    events_applied: AtomicU64,
    events_dropped: AtomicU64,
}

impl std::fmt::Debug for DeltaRouter {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("DeltaRouter")
            .field("handlers", &self.handlers.len())
            .field("events_applied", &self.events_applied)
            .field("events_dropped", &self.events_dropped)
            .finish()
    }
}

impl DeltaRouter {
    /// Creates a router with the built-in handlers registered:
    /// `register`/`update` upsert into the store, `unregister` tombstones.
    pub fn new(store: Arc<TopologyStore>) -> Self {
        let upsert: Arc<dyn MappingEventHandler> = Arc::new(UpsertHandler {
            store: Arc::clone(&store),
        });

        let mut handlers: HashMap<MappingAction, Arc<dyn MappingEventHandler>> = HashMap::new();
        handlers.insert(MappingAction::Register, Arc::clone(&upsert));
        handlers.insert(MappingAction::Update, upsert);
        handlers.insert(MappingAction::Unregister, Arc::new(RemoveHandler { store }));

        Self {
            handlers,
            events_applied: AtomicU64::new(0),
            events_dropped: AtomicU64::new(0),
        }
    }

    /// Replaces the handler for an action.
    ///
    /// Registration happens at startup, before the consumer loop runs; the
    /// registry is not built for concurrent mutation afterwards.
    pub fn register_handler(
        &mut self,
        action: MappingAction,
        handler: Arc<dyn MappingEventHandler>,
    ) {
        debug!(
            "Registered topology handler '{}' for action '{}'",
            handler.handler_name(),
            action
        );
        self.handlers.insert(action, handler);
    }

    /// Dispatches an event to its handler.
    pub fn apply(&self, event: &MappingEvent) -> Result<(), TopologyError> {
        let handler = self
            .handlers
            .get(&event.action)
            .ok_or_else(|| TopologyError::HandlerNotFound(event.action.to_string()))?;

        match handler.handle(event) {
            Ok(()) => {
                self.events_applied.fetch_add(1, Ordering::Relaxed);
                Ok(())
            }
            Err(e) => {
                self.events_dropped.fetch_add(1, Ordering::Relaxed);
                Err(e)
            }
        }
    }

    /// Events successfully dispatched since startup.
    pub fn events_applied(&self) -> u64 {
        self.events_applied.load(Ordering::Relaxed)
    }

    /// Events rejected by a handler since startup.
    pub fn events_dropped(&self) -> u64 {
        self.events_dropped.load(Ordering::Relaxed)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::types::{InstanceId, ServiceName};

    fn router() -> (Arc<TopologyStore>, DeltaRouter) {
        let store = Arc::new(TopologyStore::new(InstanceId::new("waypoint-monolith")));
        let router = DeltaRouter::new(Arc::clone(&store));
        (store, router)
    }

    #[test]
    fn test_register_and_update_both_upsert() {
        let (store, router) = router();

        router
            .apply(&MappingEvent::register("accounts".into(), "a-1".into()))
            .expect("register should apply");
        assert_eq!(store.resolve(&"accounts".into()), InstanceId::new("a-1"));

        router
            .apply(&MappingEvent::update("accounts".into(), "a-2".into()))
            .expect("update should apply");
        assert_eq!(store.resolve(&"accounts".into()), InstanceId::new("a-2"));
        assert_eq!(router.events_applied(), 2);
    }

    #[test]
    fn test_unregister_dispatches_to_remove() {
        let (store, router) = router();

        router
            .apply(&MappingEvent::register("accounts".into(), "a-1".into()))
            .expect("register should apply");
        router
            .apply(&MappingEvent::unregister("accounts".into()))
            .expect("unregister should apply");

        assert_eq!(
            store.resolve(&"accounts".into()),
            InstanceId::new("waypoint-monolith")
        );
    }

    #[test]
    fn test_register_without_instance_id_is_malformed() {
        let (store, router) = router();

        let mut event = MappingEvent::register("accounts".into(), "a-1".into());
        event.instance_id = None;

        let result = router.apply(&event);
        assert!(matches!(result, Err(TopologyError::MalformedEvent(_))));
        assert_eq!(router.events_dropped(), 1);
        assert!(store.is_empty());
    }

    #[test]
    fn test_unregister_with_instance_id_is_tolerated() {
        let (store, router) = router();

        router
            .apply(&MappingEvent::register("accounts".into(), "a-1".into()))
            .expect("register should apply");

        let mut event = MappingEvent::unregister("accounts".into());
        event.instance_id = Some(InstanceId::new("a-1"));
        router
            .apply(&event)
            .expect("unregister with stray instance id should still apply");

        assert!(store.lookup(&ServiceName::from("accounts")).is_none());
    }

    #[test]
    fn test_replayed_event_leaves_table_unchanged() {
        let (store, router) = router();

        let event = MappingEvent::register("accounts".into(), "a-1".into());
        router.apply(&event).expect("first delivery should apply");
        let after_first = store.mappings();

        router.apply(&event).expect("redelivery should be a no-op");
        assert_eq!(store.mappings(), after_first);
    }

    #[test]
    fn test_custom_handler_replaces_builtin() {
        struct CountingHandler {
            count: AtomicU64,
        }
        impl MappingEventHandler for CountingHandler {
            fn handle(&self, _event: &MappingEvent) -> Result<(), TopologyError> {
                self.count.fetch_add(1, Ordering::Relaxed);
                Ok(())
            }
            fn handler_name(&self) -> &str {
                "counting"
            }
        }

        let (store, mut router) = router();
        let counting = Arc::new(CountingHandler {
            count: AtomicU64::new(0),
        });
        router.register_handler(MappingAction::Update, Arc::clone(&counting) as Arc<dyn MappingEventHandler>);

        router
            .apply(&MappingEvent::update("accounts".into(), "a-1".into()))
            .expect("custom handler should apply");

        assert_eq!(counting.count.load(Ordering::Relaxed), 1);
        // The custom handler swallowed the update: the store never saw it
        assert!(store.is_empty());
    }
}
