//! Standalone broker deployments.

use skiff_core::SkiffConfig;

pub async fn deploy_k8spsb(config: &SkiffConfig, cleanup: bool) -> anyhow::Result<()> {
    let url = super::pipeline(config).await?.run_k8spsb(cleanup).await?;
    println!("k8spsb deployed, api available at:");
    println!("{url}");
    Ok(())
}

pub async fn deploy_mongodsb(config: &SkiffConfig, cleanup: bool) -> anyhow::Result<()> {
    let url = super::pipeline(config).await?.run_mongodsb(cleanup).await?;
    println!("mongo-k8s-dsb deployed, api available at:");
    println!("{url}");
    Ok(())
}
