//! The site deployment sequence.

use std::sync::Arc;
use std::time::Duration;

use http::StatusCode;
use serde::Serialize;
use skiff_core::{
    DeploymentType, EndpointSpec, EndpointType, EnvVar, ObjectExt, Service, ServiceExt, Workload,
    env_var,
};
use skiff_rollout::{Coordinator, poll_until};
use tracing::{info, warn};

use crate::error::{PipelineError, PipelineResult};
use crate::orchestrator::Orchestrator;
use crate::route::{root_url, route_env};
use crate::settings::{DB_PASSWORD, OrchestratorSettings, SETTINGS_ENV};

const KIND_LABEL: &str = "nazKind";
const CONTAINER_PORT: i32 = 8080;
const SITE_URN: &str = "site";

/// Services hosted by the orchestrator that must report `RUNNING`.
const HOSTED_SERVICES: [&str; 5] = [
    "site-api",
    "hub-api",
    "hub-web-api",
    "protection-api",
    "shpan-copy-store-api",
];

/// Who and where the pipeline deploys.
#[derive(Debug, Clone)]
pub struct DeployContext {
    pub namespace: String,
    pub deployment_type: DeploymentType,
    /// Address of a local cluster's node, used for node port routes.
    pub cluster_ip: Option<String>,
    /// Cluster credentials handed to the services that talk to the cluster.
    pub username: String,
    pub password: String,
}

impl DeployContext {
    fn cluster_ip(&self) -> Option<&str> {
        self.cluster_ip.as_deref().filter(|ip| !ip.is_empty())
    }

    fn cluster_credentials(&self) -> Vec<EnvVar> {
        vec![
            env_var("K8S_USERNAME", &self.username),
            env_var("K8S_PASSWORD", &self.password),
            env_var("OCOPEA_NAMESPACE", &self.namespace),
        ]
    }
}

#[derive(Debug, Clone, Default)]
pub struct SiteOptions {
    /// Defaults to the local cluster IP.
    pub site_name: Option<String>,
    pub cleanup: bool,
    pub verbose_logging: bool,
}

/// Outcome of a site deployment.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SiteDeployment {
    pub site_name: String,
    pub root_url: String,
}

impl SiteDeployment {
    pub fn ui_url(&self) -> String {
        format!("{}/hub-web-api/html/nui/index.html", self.root_url)
    }
}

#[derive(Serialize)]
struct ResourceLocation<'a> {
    urn: &'a str,
    url: &'a str,
}

#[derive(Serialize)]
#[serde(rename_all = "camelCase")]
struct AddCrb<'a> {
    site_id: &'a str,
    crb_urn: &'a str,
    crb_url: &'a str,
}

#[derive(Serialize)]
#[serde(rename_all = "camelCase")]
struct AddDsb<'a> {
    site_id: &'a str,
    dsb_urn: &'a str,
    dsb_url: &'a str,
}

#[derive(Serialize)]
#[serde(rename_all = "camelCase")]
struct AddPsb<'a> {
    site_id: &'a str,
    psb_urn: &'a str,
    psb_url: &'a str,
}

#[derive(Serialize)]
#[serde(rename_all = "camelCase")]
struct AddArtifactRegistry<'a> {
    site_id: &'a str,
    name: &'a str,
    url: &'a str,
    username: &'a str,
    password: &'a str,
}

/// One service the pipeline rolls out: a controller behind a service.
struct Component {
    name: &'static str,
    image: &'static str,
    kind: &'static str,
    port: i32,
    target_port: i32,
    env: Vec<EnvVar>,
}

pub struct Pipeline {
    coordinator: Coordinator,
    orchestrator: Arc<dyn Orchestrator>,
    context: DeployContext,
}

impl Pipeline {
    pub fn new(
        coordinator: Coordinator,
        orchestrator: Arc<dyn Orchestrator>,
        context: DeployContext,
    ) -> Self {
        Self {
            coordinator,
            orchestrator,
            context,
        }
    }

    pub fn context(&self) -> &DeployContext {
        &self.context
    }

    /// Create the target namespace, first deleting it when `cleanup` is set.
    pub async fn prepare_namespace(&self, cleanup: bool) -> PipelineResult<()> {
        let namespace = &self.context.namespace;
        if cleanup {
            info!(namespace = %namespace, "cleaning up namespace");
            let policy = self.coordinator.config().namespace_termination;
            self.coordinator
                .delete_namespace_and_wait(namespace, policy)
                .await?;
        }
        self.coordinator.create_namespace(namespace).await?;
        Ok(())
    }

    fn workload(&self, component: &Component, public: bool) -> Workload {
        let endpoint_type = if public {
            self.context.deployment_type.public_endpoint_type()
        } else {
            EndpointType::ClusterLocal
        };
        let mut workload = Workload::new(component.name, component.image)
            .with_label(KIND_LABEL, component.kind)
            .with_pull_policy("IfNotPresent")
            .with_container_port(component.target_port)
            .with_env("OCOPEA_DEPLOYMENT_TYPE", self.context.deployment_type.as_str())
            .with_endpoint(EndpointSpec::new(
                endpoint_type,
                component.port,
                component.target_port,
            ));
        workload.env.extend(component.env.iter().cloned());
        workload
    }

    /// Roll out a component: its service first, then its controller wired
    /// with the routes the service was given.
    async fn deploy_component(
        &self,
        component: Component,
        public: bool,
        force: bool,
    ) -> PipelineResult<Service> {
        let mut workload = self.workload(&component, public);
        let service = self
            .coordinator
            .deploy_endpoint_and_wait(&workload, force)
            .await?;

        workload
            .env
            .extend(route_env(&service, self.context.cluster_ip())?);
        if self.context.deployment_type.is_local() {
            if let Some(ip) = self.context.cluster_ip() {
                workload.env.push(env_var("LOCAL_CLUSTER_IP", ip));
            }
        }
        self.coordinator.deploy_and_wait(&workload, force).await?;
        info!(component = component.name, "component deployed");
        Ok(service)
    }

    pub async fn deploy_postgres(&self) -> PipelineResult<Service> {
        info!("deploying the site datastore");
        let db = Component {
            name: "nazdb",
            image: "postgres",
            kind: "infra",
            port: 5432,
            target_port: 5432,
            env: vec![env_var("POSTGRES_PASSWORD", DB_PASSWORD)],
        };
        let service = self.deploy_component(db, false, true).await?;
        info!(cluster_ip = service.cluster_ip().unwrap_or("-"), "datastore deployed");
        Ok(service)
    }

    /// Deploy the orchestrator and wait until every hosted service runs.
    pub async fn deploy_orchestrator(
        &self,
        datastore: &Service,
        site_name: &str,
        verbose_logging: bool,
    ) -> PipelineResult<(Service, String)> {
        let settings = OrchestratorSettings {
            db_host: cluster_ip_of(datastore)?.to_string(),
            db_port: datastore.ports().first().map_or(5432, |p| p.port),
            site_name: site_name.to_string(),
            verbose_logging,
        };
        let mut env = self.context.cluster_credentials();
        env.push(env_var(SETTINGS_ENV, settings.to_json()?));

        let orcs = Component {
            name: "orcs",
            image: "ocopea/orcs-k8s-runner",
            kind: "orcs",
            port: 80,
            target_port: CONTAINER_PORT,
            env,
        };
        let service = self.deploy_component(orcs, true, true).await?;
        let root = root_url(&service, self.context.cluster_ip())?;
        info!(url = %format!("{root}/hub-web-api/html/ui/index.html"), "orchestrator deployed");

        tokio::time::sleep(Duration::from_secs(1)).await;
        for endpoint in HOSTED_SERVICES {
            self.wait_for_hosted_service(&root, endpoint).await?;
        }
        Ok((service, root))
    }

    /// Poll `{root}/{endpoint}/state` until it reports `RUNNING`.
    pub async fn wait_for_hosted_service(&self, root: &str, endpoint: &str) -> PipelineResult<()> {
        info!(endpoint, "waiting for hosted service to start");
        let policy = self.coordinator.config().service_state;
        let orchestrator = self.orchestrator.as_ref();
        let running = poll_until(policy, endpoint, |_| async move {
            let state = orchestrator.service_state(root, endpoint).await?;
            match state.as_deref() {
                Some("RUNNING") => Ok::<_, PipelineError>(Some(())),
                Some(other) => {
                    info!(endpoint, state = other, "hosted service not running yet");
                    Ok(None)
                }
                None => Ok(None),
            }
        })
        .await?;
        running.ok_or_else(|| PipelineError::ServiceNotStarted {
            endpoint: endpoint.to_string(),
            retries: policy.max_retries(),
        })?;
        info!(endpoint, "hosted service started");
        Ok(())
    }

    pub async fn deploy_k8spsb(&self, public: bool) -> PipelineResult<Service> {
        info!("deploying the kubernetes platform broker");
        let psb = Component {
            name: "k8spsb",
            image: "ocopea/go-k8s-psb",
            kind: "psb",
            port: 80,
            target_port: CONTAINER_PORT,
            env: self.context.cluster_credentials(),
        };
        self.deploy_component(psb, public, true).await
    }

    pub async fn deploy_mongodsb(&self, public: bool) -> PipelineResult<Service> {
        info!("deploying the mongo data service broker");
        let mut env = self.context.cluster_credentials();
        env.push(env_var("PORT", CONTAINER_PORT.to_string()));
        env.push(env_var("HOST", "0.0.0.0"));
        let dsb = Component {
            name: "mongo-k8s-dsb",
            image: "ocopea/mongo-k8s-dsb",
            kind: "dsb",
            port: 80,
            target_port: CONTAINER_PORT,
            env,
        };
        self.deploy_component(dsb, public, true).await
    }

    async fn site_id(&self, root: &str, urn: &str) -> PipelineResult<String> {
        let sites = self.orchestrator.sites(root).await?;
        sites
            .into_iter()
            .find(|s| s.urn == urn)
            .map(|s| s.id)
            .ok_or_else(|| PipelineError::SiteNotFound(urn.to_string()))
    }

    async fn command<T: Serialize>(
        &self,
        root: &str,
        command: &str,
        body: &T,
        expected: StatusCode,
    ) -> PipelineResult<()> {
        let body = serde_json::to_value(body)?;
        self.orchestrator
            .post_command(root, "hub-web", command, body, expected)
            .await?;
        info!(command, "orchestrator command accepted");
        Ok(())
    }

    /// Deploy a complete site and register its brokers.
    pub async fn deploy_site(&self, options: &SiteOptions) -> PipelineResult<SiteDeployment> {
        let site_name = match options.site_name.as_deref().filter(|s| !s.is_empty()) {
            Some(name) => name.to_string(),
            None => {
                let ip = self
                    .context
                    .cluster_ip()
                    .ok_or(PipelineError::MissingSiteName)?;
                info!(site_name = ip, "no site name given, using the cluster ip");
                ip.to_string()
            }
        };

        info!(namespace = %self.context.namespace, site = %site_name, "deploying site");
        self.prepare_namespace(options.cleanup).await?;

        let datastore = self.deploy_postgres().await?;
        let (orcs, root) = self
            .deploy_orchestrator(&datastore, &site_name, options.verbose_logging)
            .await?;

        let orcs_port = orcs.ports().first().map_or(80, |p| p.port);
        let internal = format!("http://{}:{orcs_port}", cluster_ip_of(&orcs)?);

        let site_url = format!("{internal}/site-api");
        self.command(
            &root,
            "add-site",
            &ResourceLocation {
                urn: SITE_URN,
                url: &site_url,
            },
            StatusCode::OK,
        )
        .await?;
        info!(site = %site_name, "site connected to the hub");

        let site_id = self.site_id(&root, SITE_URN).await?;
        let crb_url = format!("{internal}/shpan-copy-store-api");
        self.command(
            &root,
            "add-crb",
            &AddCrb {
                site_id: &site_id,
                crb_urn: "shpan-copy-store",
                crb_url: &crb_url,
            },
            StatusCode::NO_CONTENT,
        )
        .await?;

        let psb = self.deploy_k8spsb(false).await?;
        let dsb = self.deploy_mongodsb(false).await?;

        let dsb_url = format!("http://{}/dsb", cluster_ip_of(&dsb)?);
        self.command(
            &root,
            "add-dsb",
            &AddDsb {
                site_id: &site_id,
                dsb_urn: "mongo-k8s-dsb",
                dsb_url: &dsb_url,
            },
            StatusCode::OK,
        )
        .await?;

        let psb_url = format!("http://{}/k8spsb-api", cluster_ip_of(&psb)?);
        self.command(
            &root,
            "add-psb",
            &AddPsb {
                site_id: &site_id,
                psb_urn: "k8spsb",
                psb_url: &psb_url,
            },
            StatusCode::NO_CONTENT,
        )
        .await?;

        self.command(
            &root,
            "add-docker-artifact-registry",
            &AddArtifactRegistry {
                site_id: &site_id,
                name: "shpanRegistry",
                url: "https://registry.hub.docker.com",
                username: "",
                password: "",
            },
            StatusCode::NO_CONTENT,
        )
        .await?;

        let deployment = SiteDeployment { site_name, root_url: root };
        info!(url = %deployment.ui_url(), "site deployed");
        Ok(deployment)
    }

    /// Deploy the platform broker alone, publicly reachable. Returns its API url.
    pub async fn run_k8spsb(&self, cleanup: bool) -> PipelineResult<String> {
        self.prepare_namespace(cleanup).await?;
        let service = self.deploy_k8spsb(true).await?;
        let url = format!("{}/k8spsb-api", root_url(&service, self.context.cluster_ip())?);
        info!(url = %url, "k8spsb deployed");
        Ok(url)
    }

    /// Deploy the mongo broker alone, publicly reachable. Returns its API url.
    pub async fn run_mongodsb(&self, cleanup: bool) -> PipelineResult<String> {
        self.prepare_namespace(cleanup).await?;
        let service = self.deploy_mongodsb(true).await?;
        let url = format!("{}/dsb", root_url(&service, self.context.cluster_ip())?);
        info!(url = %url, "mongodsb deployed");
        Ok(url)
    }
}

fn cluster_ip_of(service: &Service) -> PipelineResult<&str> {
    service.cluster_ip().ok_or_else(|| {
        warn!(service = service.name(), "service has no cluster ip");
        PipelineError::Route {
            service: service.name().to_string(),
            reason: "service has no cluster ip".to_string(),
        }
    })
}
