use crate::collect::{self, ArtifactHubCrawler};
use crate::config::Config;
use log::info;
use std::path::PathBuf;

/// Crawl the registry and persist the snapshot without scanning anything.
pub async fn handle_crawl(config: Config, output: PathBuf) -> crate::Result<()> {
    let crawler = ArtifactHubCrawler::new(&config)?;
    let crawl = crawler.crawl().await?;
    info!(
        "Crawl completed with {} charts from {} repositories",
        crawl.total_packages, crawl.total_repos
    );
    collect::save_snapshot(&output, &crawl)?;
    println!(
        "Discovered {} charts across {} repositories -> {}",
        crawl.total_packages,
        crawl.total_repos,
        output.display()
    );
    Ok(())
}
