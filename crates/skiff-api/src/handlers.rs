//! REST API handlers.

use std::collections::BTreeMap;
use std::sync::Arc;

use axum::Json;
use axum::extract::rejection::JsonRejection;
use axum::extract::{Path, State};
use axum::http::StatusCode;
use axum::response::IntoResponse;
use serde::Serialize;
use skiff_client::{ClientError, ResourceKind};
use skiff_core::{Labels, ObjectExt, Service, ServiceExt};
use skiff_pipeline::root_url;
use skiff_rollout::{Coordinator, Readiness};
use tracing::{info, warn};

use crate::error::{ApiError, StatusBody};
use crate::manifest::{APP_SERVICE_ID_MAX_LEN, AppServiceManifest};
use crate::{ApiState, BrokerSettings};

#[derive(Debug, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct BrokerInfo {
    pub name: &'static str,
    pub version: &'static str,
    #[serde(rename = "type")]
    pub kind: &'static str,
    pub description: &'static str,
    pub app_service_id_max_length: usize,
}

pub const BROKER_INFO: BrokerInfo = BrokerInfo {
    name: "k8s-mini",
    version: "0.1",
    kind: "k8s",
    description: "K8S Mini PaaS",
    app_service_id_max_length: APP_SERVICE_ID_MAX_LEN,
};

#[derive(Debug, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct AppServiceInfo {
    pub name: String,
    pub status: &'static str,
    pub status_message: String,
    pub instances: u32,
    pub psb_metrics: BTreeMap<String, String>,
    #[serde(rename = "entryPointURL")]
    pub entry_point_url: String,
}

#[derive(Debug, Serialize)]
pub struct Space {
    pub name: String,
    pub properties: BTreeMap<String, String>,
}

#[derive(Debug, Serialize)]
pub struct ServiceState {
    pub name: &'static str,
    pub state: &'static str,
}

/// GET /k8spsb-api/psb/info
pub async fn broker_info() -> impl IntoResponse {
    Json(BROKER_INFO)
}

/// GET /k8spsb-api/state
pub async fn service_state() -> impl IntoResponse {
    Json(ServiceState {
        name: "k8spsb",
        state: "RUNNING",
    })
}

/// GET /k8spsb-api/psb/spaces
pub async fn list_spaces(State(state): State<ApiState>) -> Result<Json<Vec<Space>>, ApiError> {
    let namespaces = state.client.list(ResourceKind::Namespace, &Labels::new()).await?;
    let spaces = namespaces
        .into_iter()
        .map(|ns| Space {
            name: ns.name().to_string(),
            properties: BTreeMap::new(),
        })
        .collect();
    Ok(Json(spaces))
}

/// POST /k8spsb-api/psb/app-services
pub async fn deploy_app_service(
    State(state): State<ApiState>,
    manifest: Result<Json<AppServiceManifest>, JsonRejection>,
) -> Result<impl IntoResponse, ApiError> {
    let Json(manifest) = manifest
        .map_err(|e| ApiError::bad_request(format!("failed decoding app manifest: {e}")))?;
    manifest.validate()?;
    info!(
        app_service = %manifest.app_service_id,
        image = %manifest.image(),
        route = %manifest.route,
        bindings = manifest.service_bindings.len(),
        "deploying app service"
    );

    let workload = manifest
        .workload(&state.settings.deployment_type)
        .map_err(|e| ApiError::internal(format!("failed encoding bindings: {e}")))?;
    state.coordinator.create_or_adopt(&workload, false).await?;
    let service = state
        .coordinator
        .create_or_adopt_endpoint(&workload, false)
        .await?;

    tokio::spawn(watch_service(
        state.coordinator.clone(),
        service,
        state.settings.clone(),
    ));

    info!(app_service = %manifest.app_service_id, "app service submitted");
    Ok((StatusCode::CREATED, StatusBody::ok("app service deployed")))
}

/// Wait for a freshly deployed service and log where it can be reached.
async fn watch_service(
    coordinator: Arc<Coordinator>,
    service: Service,
    settings: Arc<BrokerSettings>,
) {
    let policy = coordinator.config().service_ready;
    match coordinator.wait_for_service_ready(&service, policy).await {
        Ok(ready) => match root_url(&ready, settings.local_cluster_ip.as_deref()) {
            Ok(url) => info!(service = ready.name(), url = %url, "app service reachable"),
            Err(e) => warn!(service = ready.name(), error = %e, "app service has no public route"),
        },
        Err(e) => warn!(service = service.name(), error = %e, "app service did not become ready"),
    }
}

/// GET /k8spsb-api/psb/app-services/{space}/{id}
pub async fn app_service_status(
    State(state): State<ApiState>,
    Path((_space, id)): Path<(String, String)>,
) -> Result<Json<AppServiceInfo>, ApiError> {
    let service = match state.client.get(ResourceKind::Service, &id).await {
        Ok(resource) => resource.into_service()?,
        Err(ClientError::NotFound { .. }) => {
            return Err(ApiError::not_found(format!("could not find service with id {id}")));
        }
        Err(e) => return Err(e.into()),
    };

    let grace = state.coordinator.config().cluster_local_grace;
    let (status, status_message, entry_point_url) =
        match Readiness::for_endpoint(&service.endpoint_type(), &id, grace) {
            Err(e) => ("error", e.to_string(), String::new()),
            Ok(readiness) if !readiness.is_ready(&service) => ("starting", String::new(), String::new()),
            Ok(_) => {
                let url = root_url(&service, state.settings.local_cluster_ip.as_deref())
                    .unwrap_or_default();
                ("running", String::new(), url)
            }
        };

    Ok(Json(AppServiceInfo {
        name: id,
        status,
        status_message,
        instances: 1,
        psb_metrics: BTreeMap::new(),
        entry_point_url,
    }))
}

/// DELETE /k8spsb-api/psb/app-services/{space}/{id}
pub async fn delete_app_service(
    State(state): State<ApiState>,
    Path((_space, id)): Path<(String, String)>,
) -> Result<impl IntoResponse, ApiError> {
    match state.client.get(ResourceKind::Service, &id).await {
        Ok(_) => {}
        Err(ClientError::NotFound { .. }) => {
            return Err(ApiError::not_found(format!("service not found for id {id}")));
        }
        Err(e) => return Err(e.into()),
    }

    state
        .client
        .delete(ResourceKind::ReplicationController, &id)
        .await
        .map_err(|e| {
            ApiError::internal(format!("failed deleting replication controller {id}: {e}"))
        })?;
    state
        .client
        .delete(ResourceKind::Service, &id)
        .await
        .map_err(|e| ApiError::internal(format!("failed deleting service {id}: {e}")))?;

    info!(app_service = %id, "app service deleted");
    Ok(StatusBody::ok("app service deleted"))
}
