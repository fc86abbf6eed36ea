//! Read-only introspection endpoint.
//!
//! Exposes the node's current local routing table over HTTP for operational
//! diagnosis of split-brain or stale-routing incidents. Strictly read-only:
//! the table is mutated by bus traffic and nothing else, so no mutation
//! surface exists here to secure or to misuse.

use axum::extract::State;
use axum::routing::get;
use axum::{Json, Router};
use serde::Serialize;
use std::collections::HashMap;
use std::net::SocketAddr;
use std::sync::Arc;
use tokio::sync::watch;
use tracing::info;
use waypoint_topology::{
    InstanceId, RoutingFacade, ServiceName, SnapshotReconciler, TopologyStore,
};

use crate::error::NodeError;

/// Shared handles the HTTP handlers read from.
#[derive(Clone)]
pub struct IntrospectionState {
    /// The local routing table
    pub store: Arc<TopologyStore>,
    /// Resolution counters
    pub facade: Arc<RoutingFacade>,
    /// Snapshot counters
    pub reconciler: Arc<SnapshotReconciler>,
}

/// Response body for `GET /topology/health`.
#[derive(Debug, Serialize)]
#[serde(rename_all = "camelCase")]
struct TopologyHealth {
    status: &'static str,
    mapping_count: usize,
    mappings: HashMap<ServiceName, InstanceId>,
}

/// Response body for `GET /topology/stats`.
#[derive(Debug, Serialize)]
#[serde(rename_all = "camelCase")]
struct TopologyStats {
    default_instance: InstanceId,
    resolutions: u64,
    default_routes: u64,
    upserts_applied: u64,
    upserts_discarded: u64,
    removes_applied: u64,
    removes_discarded: u64,
    snapshots_applied: u64,
    last_snapshot_at: u64,
}

/// Builds the topology introspection router.
pub fn topology_routes(state: IntrospectionState) -> Router {
    Router::new()
        .route("/topology/health", get(topology_health))
        .route("/topology/stats", get(topology_stats))
        .with_state(state)
}

/// `GET /topology/health` - the full current local table plus entry count.
///
/// Status is always "ok": the endpoint answering with the local table *is*
/// the health signal, and stale-routing diagnosis happens by comparing the
/// returned mappings across nodes.
async fn topology_health(State(state): State<IntrospectionState>) -> Json<TopologyHealth> {
    let mappings = state.store.mappings();
    Json(TopologyHealth {
        status: "ok",
        mapping_count: mappings.len(),
        mappings,
    })
}

/// `GET /topology/stats` - counters from the store, facade, and reconciler.
async fn topology_stats(State(state): State<IntrospectionState>) -> Json<TopologyStats> {
    let store_stats = state.store.stats();
    let routing_stats = state.facade.stats();
    let reconciler_stats = state.reconciler.stats();

    Json(TopologyStats {
        default_instance: state.store.default_instance().clone(),
        resolutions: routing_stats.resolutions,
        default_routes: routing_stats.default_routes,
        upserts_applied: store_stats.upserts_applied,
        upserts_discarded: store_stats.upserts_discarded,
        removes_applied: store_stats.removes_applied,
        removes_discarded: store_stats.removes_discarded,
        snapshots_applied: store_stats.snapshots_applied,
        last_snapshot_at: reconciler_stats.last_snapshot_at,
    })
}

/// Serves the introspection router until the shutdown flag flips.
pub async fn serve_introspection(
    state: IntrospectionState,
    bind_address: SocketAddr,
    mut shutdown: watch::Receiver<bool>,
) -> Result<(), NodeError> {
    let app = topology_routes(state);
    let listener = tokio::net::TcpListener::bind(bind_address).await?;
    info!("🩺 Introspection endpoint listening on http://{}", bind_address);

    axum::serve(listener, app)
        .with_graceful_shutdown(async move {
            while shutdown.changed().await.is_ok() {
                if *shutdown.borrow() {
                    break;
                }
            }
        })
        .await?;

    info!("Introspection endpoint stopped");
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use axum::body::Body;
    use axum::http::{Request, StatusCode};
    use tower::ServiceExt;

    fn state() -> IntrospectionState {
        let store = Arc::new(TopologyStore::new(InstanceId::new("waypoint-monolith")));
        IntrospectionState {
            facade: Arc::new(RoutingFacade::new(Arc::clone(&store))),
            reconciler: Arc::new(SnapshotReconciler::new(Arc::clone(&store))),
            store,
        }
    }

    async fn get_json(app: Router, uri: &str) -> serde_json::Value {
        let response = app
            .oneshot(
                Request::builder()
                    .uri(uri)
                    .body(Body::empty())
                    .expect("request should build"),
            )
            .await
            .expect("request should be served");
        assert_eq!(response.status(), StatusCode::OK);

        let bytes = axum::body::to_bytes(response.into_body(), usize::MAX)
            .await
            .expect("body should be readable");
        serde_json::from_slice(&bytes).expect("body should be JSON")
    }

    #[tokio::test]
    async fn test_health_reports_the_local_table() {
        let state = state();
        state.store.upsert("accounts".into(), "a-1".into(), 1);
        state.store.upsert("inventory".into(), "b-2".into(), 2);

        let json = get_json(topology_routes(state), "/topology/health").await;

        assert_eq!(json["status"], "ok");
        assert_eq!(json["mappingCount"], 2);
        assert_eq!(json["mappings"]["accounts"], "a-1");
        assert_eq!(json["mappings"]["inventory"], "b-2");
    }

    #[tokio::test]
    async fn test_health_excludes_tombstones() {
        let state = state();
        state.store.upsert("accounts".into(), "a-1".into(), 1);
        state.store.remove("accounts".into(), 2);

        let json = get_json(topology_routes(state), "/topology/health").await;

        assert_eq!(json["status"], "ok");
        assert_eq!(json["mappingCount"], 0);
        assert!(json["mappings"]
            .as_object()
            .expect("mappings should be an object")
            .is_empty());
    }

    #[tokio::test]
    async fn test_stats_reports_counters() {
        let state = state();
        state.store.upsert("accounts".into(), "a-1".into(), 1);
        state.facade.resolve_destination(&"accounts".into());
        state.facade.resolve_destination(&"unknown".into());

        let json = get_json(topology_routes(state), "/topology/stats").await;

        assert_eq!(json["defaultInstance"], "waypoint-monolith");
        assert_eq!(json["resolutions"], 2);
        assert_eq!(json["defaultRoutes"], 1);
        assert_eq!(json["upsertsApplied"], 1);
    }

    #[tokio::test]
    async fn test_unknown_route_is_not_found() {
        let response = topology_routes(state())
            .oneshot(
                Request::builder()
                    .uri("/topology/flush")
                    .body(Body::empty())
                    .expect("request should build"),
            )
            .await
            .expect("request should be served");
        assert_eq!(response.status(), StatusCode::NOT_FOUND);
    }
}
