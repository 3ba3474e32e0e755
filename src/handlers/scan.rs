use crate::collect::{self, ArtifactHubCrawler};
use crate::config::Config;
use crate::report::{ResultUploader, writer};
use crate::scanner::{
    DependencyAggregator, ScanPipeline, WorkerPool, current_run_timestamp, pool,
};
use log::{error, info};
use std::path::PathBuf;
use std::sync::Arc;

const SNAPSHOT_FILE_NAME: &str = "crawl-snapshot.json";

pub struct ScanOptions {
    pub snapshot: Option<PathBuf>,
    pub results_dir: Option<PathBuf>,
    pub workers: Option<usize>,
    pub force_upload: bool,
}

/// Run the full pipeline: crawl (or replay), fan out over every discovered
/// organization, flush the global dependency tables, upload.
pub async fn handle_scan(config: Config, options: ScanOptions) -> crate::Result<()> {
    let scan_time = current_run_timestamp().to_string();
    let results_root = options
        .results_dir
        .unwrap_or_else(|| config.scanner.results_dir.clone());
    let results_path = results_root.join(&scan_time);
    std::fs::create_dir_all(&results_path)?;

    // Discover charts
    let crawl = match &options.snapshot {
        Some(path) => collect::load_snapshot(path)?,
        None => {
            let crawl = ArtifactHubCrawler::new(&config)?.crawl().await?;
            if let Err(e) = collect::save_snapshot(&results_path.join(SNAPSHOT_FILE_NAME), &crawl)
            {
                error!("Failed to save crawl snapshot: {}", e);
            }
            crawl
        }
    };
    info!(
        "Crawl completed with {} charts from {} repositories",
        crawl.total_packages, crawl.total_repos
    );

    // Upload sink is optional; a missing bucket disables it
    let uploader = match config.upload_bucket() {
        Some(bucket) => {
            info!("Uploading results to {}", bucket);
            Some(Arc::new(
                ResultUploader::new(bucket, scan_time.clone(), config.upload.mark_uploaded).await,
            ))
        }
        None => {
            if options.force_upload {
                error!("--upload requested but no bucket configured (RESULT_BUCKET or [upload] bucket)");
            }
            None
        }
    };

    let aggregator = Arc::new(DependencyAggregator::new());
    let pipeline = Arc::new(ScanPipeline::new(
        &config,
        results_path.clone(),
        Arc::clone(&aggregator),
        uploader.clone(),
    )?);

    pool::install_shutdown_handler();
    let worker_pool = match options.workers.or(config.scanner.workers) {
        Some(workers) => WorkerPool::new(workers),
        None => WorkerPool::with_default_workers(),
    };

    let org_count = crawl.repos.len();
    let fanout = {
        let pipeline = Arc::clone(&pipeline);
        worker_pool
            .run(crawl.repos, move |repo| {
                let pipeline = Arc::clone(&pipeline);
                async move { pipeline.scan_org(&repo).await }
            })
            .await
    };

    // Flush the global dependency aggregate regardless of pool outcome
    let snapshot = aggregator.snapshot();
    if let Err(e) = writer::write_global_tables(&results_path, &snapshot) {
        error!("Failed to write global dependency tables: {}", e);
    }

    if let Some(uploader) = &uploader {
        uploader.upload_results(&results_path).await;
    }

    pipeline.stats.log_summary(org_count, snapshot.len());
    fanout
}
