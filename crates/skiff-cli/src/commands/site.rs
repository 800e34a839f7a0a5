use skiff_core::SkiffConfig;
use skiff_pipeline::SiteOptions;

/// Deploy a full site and print where its UI lives.
pub async fn deploy(
    config: &SkiffConfig,
    site_name: Option<String>,
    cleanup: bool,
    verbose_logging: bool,
) -> anyhow::Result<()> {
    let pipeline = super::pipeline(config).await?;
    let options = SiteOptions {
        site_name,
        cleanup,
        verbose_logging,
    };
    let site = pipeline.deploy_site(&options).await?;

    println!("Site {} deployed", site.site_name);
    println!("Visit the hub at:");
    println!("{}", site.ui_url());
    Ok(())
}
