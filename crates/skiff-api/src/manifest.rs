//! App-service manifests and their rendering into a workload.

use std::collections::BTreeMap;

use serde::{Deserialize, Serialize};
use skiff_core::{DeploymentType, EndpointSpec, EnvVar, Workload, env_var};

use crate::error::ApiError;

/// Longest app-service id the broker accepts; ids become object names.
pub const APP_SERVICE_ID_MAX_LEN: usize = 24;

/// Env var carrying the manifest's service bindings as JSON.
pub const BINDINGS_ENV: &str = "NAZ_MS_API_K8S_BINDINGS";

/// Port the app service is exposed on, in front of its HTTP port.
pub const SERVICE_PORT: i32 = 80;

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct BindPort {
    #[serde(default)]
    pub protocol: String,
    #[serde(default)]
    pub destination: String,
    #[serde(default)]
    pub port: i32,
}

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ServiceBinding {
    pub service_name: String,
    #[serde(default)]
    pub service_id: String,
    #[serde(default)]
    pub plan: String,
    #[serde(default)]
    pub bind_info: BTreeMap<String, String>,
    #[serde(default)]
    pub ports: Vec<BindPort>,
}

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase", default)]
pub struct AppServiceManifest {
    pub app_service_id: String,
    pub space: String,
    pub image_name: String,
    pub image_version: String,
    pub environment_variables: BTreeMap<String, String>,
    pub artifact_registry_type: String,
    pub artifact_registry_parameters: BTreeMap<String, String>,
    pub psb_settings: BTreeMap<String, String>,
    pub route: String,
    pub exposed_ports: Vec<i32>,
    pub http_port: i32,
    /// Bindings grouped by the broker that provided them.
    pub service_bindings: BTreeMap<String, Vec<ServiceBinding>>,
}

impl AppServiceManifest {
    pub fn validate(&self) -> Result<(), ApiError> {
        let id = &self.app_service_id;
        if id.is_empty() {
            return Err(ApiError::bad_request("missing appServiceId"));
        }
        if id.len() > APP_SERVICE_ID_MAX_LEN {
            return Err(ApiError::bad_request(format!(
                "appServiceId {id} is longer than {APP_SERVICE_ID_MAX_LEN} characters"
            )));
        }
        if self.image_name.is_empty() {
            return Err(ApiError::bad_request("missing imageName"));
        }
        if self.http_port <= 0 {
            return Err(ApiError::bad_request("missing httpPort"));
        }
        Ok(())
    }

    /// Image reference, tagged when a version is given.
    pub fn image(&self) -> String {
        if self.image_version.is_empty() {
            self.image_name.clone()
        } else {
            format!("{}:{}", self.image_name, self.image_version)
        }
    }

    /// `${service.key}` placeholders mapped to their bound values.
    fn placeholders(&self) -> BTreeMap<String, &str> {
        self.service_bindings
            .values()
            .flatten()
            .flat_map(|binding| {
                binding.bind_info.iter().map(move |(key, value)| {
                    (format!("${{{}.{key}}}", binding.service_name), value.as_str())
                })
            })
            .collect()
    }

    /// Container environment: the serialized bindings first, then the
    /// manifest's variables with binding placeholders expanded.
    pub fn environment(&self) -> serde_json::Result<Vec<EnvVar>> {
        let bindings = if self.service_bindings.is_empty() {
            String::new()
        } else {
            serde_json::to_string(&self.service_bindings)?
        };
        let mut env = vec![env_var(BINDINGS_ENV, bindings)];

        let placeholders = self.placeholders();
        for (name, value) in &self.environment_variables {
            let expanded = placeholders
                .iter()
                .fold(value.clone(), |acc, (key, bound)| acc.replace(key.as_str(), bound));
            env.push(env_var(name, expanded));
        }
        Ok(env)
    }

    /// The workload this manifest deploys, exposed the way the cluster's
    /// deployment type exposes public services.
    pub fn workload(&self, deployment_type: &DeploymentType) -> serde_json::Result<Workload> {
        let mut workload = Workload::new(&self.app_service_id, &self.image())
            .with_label("nazKind", "app")
            .with_container_port(self.http_port)
            .with_endpoint(
                EndpointSpec::new(
                    deployment_type.public_endpoint_type(),
                    SERVICE_PORT,
                    self.http_port,
                )
                .with_port_name("tcp"),
            );
        workload.env = self.environment()?;
        Ok(workload)
    }
}
