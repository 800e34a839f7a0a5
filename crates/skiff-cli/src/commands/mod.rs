pub mod brokers;
pub mod site;

use std::sync::Arc;

use anyhow::Context;
use skiff_client::KubeClient;
use skiff_core::SkiffConfig;
use skiff_pipeline::{DeployContext, HttpOrchestrator, Pipeline};
use skiff_rollout::{Coordinator, RolloutConfig};
use tracing::info;

use crate::GlobalArgs;

/// Configuration file (if any), overridden by the given flags, validated.
pub fn resolve_config(args: &GlobalArgs) -> anyhow::Result<SkiffConfig> {
    let mut config = match &args.config {
        Some(path) => SkiffConfig::from_file(path)
            .with_context(|| format!("loading {}", path.display()))?,
        None => SkiffConfig::default(),
    };
    apply_args(&mut config, args);
    config
        .validate()
        .context("invalid configuration")?;
    Ok(config)
}

fn apply_args(config: &mut SkiffConfig, args: &GlobalArgs) {
    let cluster = &mut config.cluster;
    if let Some(url) = &args.url {
        cluster.url = url.clone();
    }
    if let Some(namespace) = &args.namespace {
        cluster.namespace = namespace.clone();
    }
    if let Some(kind) = &args.deployment_type {
        cluster.deployment_type = kind.clone();
    }
    if let Some(ip) = &args.local_cluster_ip {
        cluster.local_cluster_ip = Some(ip.clone());
    }
    if let Some(user) = &args.user {
        cluster.username = Some(user.clone());
    }
    if let Some(password) = &args.password {
        cluster.password = Some(password.clone());
    }
}

/// Connect to the cluster and assemble the deployment pipeline.
pub async fn pipeline(config: &SkiffConfig) -> anyhow::Result<Pipeline> {
    let cluster = &config.cluster;
    info!(url = %cluster.url, namespace = %cluster.namespace, "connecting to cluster");
    let client = KubeClient::connect(cluster)
        .await
        .with_context(|| format!("failed connecting to {}", cluster.url))?;

    let coordinator = Coordinator::new(Arc::new(client), RolloutConfig::from_section(&config.rollout)?);
    let context = DeployContext {
        namespace: cluster.namespace.clone(),
        deployment_type: cluster.deployment_type.clone(),
        cluster_ip: cluster.local_cluster_ip.clone(),
        username: cluster.username.clone().unwrap_or_default(),
        password: cluster.password.clone().unwrap_or_default(),
    };
    Ok(Pipeline::new(coordinator, Arc::new(HttpOrchestrator::new()), context))
}
