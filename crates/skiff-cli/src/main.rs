use std::path::PathBuf;

use clap::{Args, Parser, Subcommand};
use skiff_core::DeploymentType;

mod commands;

#[derive(Parser)]
#[command(
    name = "skiff",
    about = "Deploy a site and its service brokers onto a cluster",
    version,
    propagate_version = true,
)]
struct Cli {
    #[command(flatten)]
    global: GlobalArgs,

    #[command(subcommand)]
    command: Commands,
}

/// Cluster access shared by every command. Unset flags fall back to the
/// configuration file, then to built-in defaults.
#[derive(Args, Debug, Clone, Default)]
pub struct GlobalArgs {
    /// Configuration file
    #[arg(long, global = true, env = "SKIFF_CONFIG")]
    pub config: Option<PathBuf>,

    /// Cluster API url (default http://localhost:8080)
    #[arg(long, global = true)]
    pub url: Option<String>,

    /// Namespace to deploy into (default ocopea)
    #[arg(long, global = true)]
    pub namespace: Option<String>,

    /// Deployment type: local, aws or gce (default local)
    #[arg(long, global = true)]
    pub deployment_type: Option<DeploymentType>,

    /// Address of the local cluster's node; required for local deployments
    #[arg(long, global = true)]
    pub local_cluster_ip: Option<String>,

    /// Cluster user name
    #[arg(long, global = true)]
    pub user: Option<String>,

    /// Cluster password
    #[arg(long, global = true)]
    pub password: Option<String>,
}

#[derive(Subcommand)]
enum Commands {
    /// Deploy a complete site: datastore, orchestrator and brokers.
    DeploySite {
        /// Site name (defaults to the local cluster ip)
        #[arg(long)]
        site_name: Option<String>,
        /// Delete the namespace first
        #[arg(long)]
        cleanup: bool,
        /// Make every hosted service log its JSON requests
        #[arg(long)]
        verbose_site_logging: bool,
    },
    /// Deploy the kubernetes platform broker on its own.
    DeployK8spsb {
        /// Delete the namespace first
        #[arg(long)]
        cleanup: bool,
    },
    /// Deploy the mongo data service broker on its own.
    DeployMongodsb {
        /// Delete the namespace first
        #[arg(long)]
        cleanup: bool,
    },
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    tracing_subscriber::fmt()
        .with_env_filter(
            tracing_subscriber::EnvFilter::from_default_env()
                .add_directive("skiff=info".parse()?),
        )
        .init();

    let cli = Cli::parse();
    let config = commands::resolve_config(&cli.global)?;

    match cli.command {
        Commands::DeploySite {
            site_name,
            cleanup,
            verbose_site_logging,
        } => commands::site::deploy(&config, site_name, cleanup, verbose_site_logging).await,
        Commands::DeployK8spsb { cleanup } => commands::brokers::deploy_k8spsb(&config, cleanup).await,
        Commands::DeployMongodsb { cleanup } => {
            commands::brokers::deploy_mongodsb(&config, cleanup).await
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn global_flags_follow_the_subcommand() {
        let cli = Cli::parse_from([
            "skiff",
            "deploy-site",
            "--site-name",
            "lab",
            "--cleanup",
            "--deployment-type",
            "aws",
            "--namespace",
            "staging",
        ]);
        assert_eq!(cli.global.deployment_type, Some(DeploymentType::Aws));
        assert_eq!(cli.global.namespace.as_deref(), Some("staging"));
        match cli.command {
            Commands::DeploySite {
                site_name,
                cleanup,
                verbose_site_logging,
            } => {
                assert_eq!(site_name.as_deref(), Some("lab"));
                assert!(cleanup);
                assert!(!verbose_site_logging);
            }
            _ => panic!("expected deploy-site"),
        }
    }
}
