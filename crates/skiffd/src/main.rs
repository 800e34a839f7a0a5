//! skiffd, the Skiff broker daemon.
//!
//! Assembles the resource client, rollout coordinator and log relay behind
//! the broker's REST API.
//!
//! # Usage
//!
//! ```text
//! skiffd --config /etc/skiff/skiff.toml --port 8080
//! ```

use std::net::SocketAddr;
use std::path::{Path, PathBuf};
use std::sync::Arc;

use anyhow::Context;
use clap::{Parser, ValueEnum};
use skiff_api::{ApiState, BrokerSettings};
use skiff_client::{KubeClient, ResourceClient};
use skiff_core::{DeploymentType, SkiffConfig};
use skiff_logs::{LogRelay, RelayConfig};
use skiff_rollout::{Coordinator, RolloutConfig};
use tracing::info;

const DEFAULT_CONFIG: &str = "skiff.toml";

#[derive(Parser)]
#[command(name = "skiffd", about = "Skiff platform broker daemon")]
struct Cli {
    /// Configuration file. Defaults to ./skiff.toml when present.
    #[arg(long, env = "SKIFF_CONFIG")]
    config: Option<PathBuf>,

    /// Port to listen on.
    #[arg(long)]
    port: Option<u16>,

    /// Cluster API url.
    #[arg(long)]
    url: Option<String>,

    /// Namespace the broker deploys into.
    #[arg(long)]
    namespace: Option<String>,

    /// Log output format.
    #[arg(long, value_enum, default_value = "text")]
    log_format: LogFormat,
}

#[derive(Clone, Copy, ValueEnum)]
enum LogFormat {
    Text,
    Json,
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    let cli = Cli::parse();
    init_tracing(cli.log_format);

    let config = load_config(&cli)?;
    run(config).await
}

fn init_tracing(format: LogFormat) {
    let filter = tracing_subscriber::EnvFilter::try_from_default_env()
        .unwrap_or_else(|_| tracing_subscriber::EnvFilter::new("info,skiff=debug,skiffd=debug"));
    let builder = tracing_subscriber::fmt().with_env_filter(filter);
    match format {
        LogFormat::Text => builder.init(),
        LogFormat::Json => builder.json().init(),
    }
}

/// File, then environment, then flags; validated last.
fn load_config(cli: &Cli) -> anyhow::Result<SkiffConfig> {
    let mut config = match &cli.config {
        Some(path) => SkiffConfig::from_file(path)
            .with_context(|| format!("loading {}", path.display()))?,
        None if Path::new(DEFAULT_CONFIG).exists() => {
            SkiffConfig::from_file(Path::new(DEFAULT_CONFIG))?
        }
        None => SkiffConfig::default(),
    };
    config.apply_env();
    apply_flags(&mut config, cli);
    config.validate()?;
    Ok(config)
}

fn apply_flags(config: &mut SkiffConfig, cli: &Cli) {
    if let Some(port) = cli.port {
        config.broker.port = port;
    }
    if let Some(url) = &cli.url {
        config.cluster.url = url.clone();
    }
    if let Some(namespace) = &cli.namespace {
        config.cluster.namespace = namespace.clone();
    }
}

fn broker_settings(config: &SkiffConfig) -> BrokerSettings {
    BrokerSettings {
        deployment_type: config.cluster.deployment_type.clone(),
        local_cluster_ip: config.cluster.local_cluster_ip.clone(),
        in_cluster_address: config.broker.in_cluster_address.clone(),
    }
}

async fn run(config: SkiffConfig) -> anyhow::Result<()> {
    let cluster = &config.cluster;
    info!(
        url = %cluster.url,
        namespace = %cluster.namespace,
        deployment_type = %cluster.deployment_type,
        "skiff broker starting"
    );
    if cluster.deployment_type == DeploymentType::Local {
        info!(local_cluster_ip = ?cluster.local_cluster_ip, "local deployment");
    }

    // ── Initialize subsystems ──────────────────────────────────

    let client: Arc<dyn ResourceClient> = Arc::new(
        KubeClient::connect(cluster)
            .await
            .context("connecting to the cluster api")?,
    );

    let coordinator = Coordinator::new(
        Arc::clone(&client),
        RolloutConfig::from_section(&config.rollout)?,
    );
    let relay = LogRelay::new(client, RelayConfig::from_section(&config.relay)?);
    info!(capacity = relay.config().capacity, "log relay initialized");

    // ── Start API server ───────────────────────────────────────

    let router = skiff_api::build_router(ApiState::new(
        coordinator,
        relay,
        broker_settings(&config),
    ));
    let addr = SocketAddr::from(([0, 0, 0, 0], config.broker.port));
    info!(%addr, "API server starting");

    let listener = tokio::net::TcpListener::bind(addr).await?;
    axum::serve(listener, router)
        .with_graceful_shutdown(async {
            if let Err(e) = tokio::signal::ctrl_c().await {
                tracing::warn!(error = %e, "failed listening for shutdown signal");
                std::future::pending::<()>().await;
            }
            info!("shutdown signal received");
        })
        .await?;

    info!("skiff broker stopped");
    Ok(())
}
