//! skiff-api: the platform service broker's REST surface.
//!
//! Deploys app services as a replication controller plus a service, reports
//! their status and streams their logs over a WebSocket.
//!
//! # API Routes
//!
//! | Method | Path | Description |
//! |---|---|---|
//! | GET | `/k8spsb-api/psb/info` | Broker description |
//! | POST | `/k8spsb-api/psb/app-services` | Deploy an app-service manifest |
//! | GET | `/k8spsb-api/psb/app-services/{space}/{id}` | App-service status |
//! | DELETE | `/k8spsb-api/psb/app-services/{space}/{id}` | Remove an app service |
//! | GET | `/k8spsb-api/psb/app-services/{space}/{id}/logs` | Log socket descriptor |
//! | GET | `/k8spsb-api/psb/app-services/{space}/{id}/logs/data` | Log WebSocket |
//! | GET | `/k8spsb-api/psb/spaces` | Namespaces as spaces |
//! | GET | `/k8spsb-api/state` | Liveness state |

pub mod error;
pub mod handlers;
pub mod logs;
pub mod manifest;

use std::sync::Arc;

use axum::Router;
use axum::routing::{get, post};
use skiff_client::ResourceClient;
use skiff_core::DeploymentType;
use skiff_logs::LogRelay;
use skiff_rollout::Coordinator;

pub use error::ApiError;
pub use manifest::{AppServiceManifest, BindPort, ServiceBinding};

/// Prefix every broker route is mounted under.
pub const API_PREFIX: &str = "/k8spsb-api";

/// Deployment-wide facts the handlers need.
#[derive(Debug, Clone, Default)]
pub struct BrokerSettings {
    pub deployment_type: DeploymentType,
    pub local_cluster_ip: Option<String>,
    /// `host:port` the broker is reachable at from inside the cluster.
    pub in_cluster_address: Option<String>,
}

/// Shared state for API handlers.
#[derive(Clone)]
pub struct ApiState {
    pub client: Arc<dyn ResourceClient>,
    pub coordinator: Arc<Coordinator>,
    pub relay: LogRelay,
    pub settings: Arc<BrokerSettings>,
}

impl ApiState {
    pub fn new(coordinator: Coordinator, relay: LogRelay, settings: BrokerSettings) -> Self {
        Self {
            client: Arc::clone(coordinator.client()),
            coordinator: Arc::new(coordinator),
            relay,
            settings: Arc::new(settings),
        }
    }
}

/// Build the broker router.
pub fn build_router(state: ApiState) -> Router {
    let routes = Router::new()
        .route("/psb/info", get(handlers::broker_info))
        .route("/psb/app-services", post(handlers::deploy_app_service))
        .route(
            "/psb/app-services/{space}/{id}",
            get(handlers::app_service_status).delete(handlers::delete_app_service),
        )
        .route("/psb/app-services/{space}/{id}/logs", get(logs::log_socket_info))
        .route("/psb/app-services/{space}/{id}/logs/data", get(logs::log_stream))
        .route("/psb/spaces", get(handlers::list_spaces))
        .route("/state", get(handlers::service_state))
        .with_state(state);

    Router::new().nest(API_PREFIX, routes)
}
