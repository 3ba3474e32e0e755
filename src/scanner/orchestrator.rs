//! Per-chart scan orchestrator
//!
//! Drives one chart package through download, extraction, dependency
//! listing, template rendering, image scanning, static scanning, and row
//! assembly. Never raises out of the worker pool: a download failure is
//! chart-fatal for scan and dependency rows, every other stage is
//! best-effort, and the chart always yields exactly one summary row.

use crate::config::Config;
use crate::error::Result;
use crate::report::rows::{CheckRow, DependencyRow, SummaryRow};
use crate::report::{ResultUploader, writer};
use crate::scanner::static_scan::{CheckItem, StaticScanOutcome, check_category};
use crate::scanner::timestamp::current_run_timestamp;
use crate::scanner::{
    ChartDependencyRecord, ChartFetcher, ChartPackage, CliImageScanner, DependencyAggregator,
    DependencyList, DependencyResolver, ImageExtractor, ImageScanner, PolicyScanner,
    RepoDescriptor, SubprocessPolicyScanner, WorkerPool, pool,
};
use log::{error, info, warn};
use once_cell::sync::Lazy;
use regex::Regex;
use std::path::PathBuf;
use std::sync::Arc;
use std::sync::atomic::{AtomicU64, Ordering};
use std::time::Duration;

const EMPTY_SCAN_MARKER: &str = "empty scan";
const ERROR_SCAN_MARKER: &str = "error in scan";
const NO_DATA: &str = "no data";

/// Strips a release-name prefix and default-namespace suffix off a check's
/// resource identifier, leaving the chart name.
static CHART_NAME_FROM_RESOURCE: Lazy<Regex> =
    Lazy::new(|| Regex::new(r"(.*)\.(RELEASE-NAME-)?(.*)(\.default)?").unwrap());

/// Counters shared across all orchestrator tasks of one run.
#[derive(Debug, Default)]
pub struct RunStats {
    pub charts_scanned: AtomicU64,
    pub download_failures: AtomicU64,
    pub extract_failures: AtomicU64,
}

impl RunStats {
    pub fn log_summary(&self, orgs: usize, dependency_keys: usize) {
        info!(
            "Run finished: {} org(s), {} chart(s) scanned, {} download failure(s), {} extract failure(s), {} distinct dependencies",
            orgs,
            self.charts_scanned.load(Ordering::Relaxed),
            self.download_failures.load(Ordering::Relaxed),
            self.extract_failures.load(Ordering::Relaxed),
            dependency_keys,
        );
    }
}

/// All rows produced for one chart package.
#[derive(Debug)]
pub struct ChartRows {
    pub checks: Vec<CheckRow>,
    pub summary: SummaryRow,
    pub dependencies: Vec<DependencyRow>,
}

pub struct ScanPipeline {
    fetcher: ChartFetcher,
    resolver: DependencyResolver,
    extractor: ImageExtractor,
    image_scanner: Arc<dyn ImageScanner>,
    policy: Arc<dyn PolicyScanner>,
    aggregator: Arc<DependencyAggregator>,
    uploader: Option<Arc<ResultUploader>>,
    results_path: PathBuf,
    image_pool: WorkerPool,
    pub stats: RunStats,
}

impl ScanPipeline {
    pub fn new(
        config: &Config,
        results_path: PathBuf,
        aggregator: Arc<DependencyAggregator>,
        uploader: Option<Arc<ResultUploader>>,
    ) -> Result<Self> {
        let timeout = Duration::from_secs(config.scanner.command_timeout_secs);
        let client = reqwest::Client::builder()
            .timeout(Duration::from_secs(config.scanner.http_timeout_secs))
            .build()?;

        let image_scanner = Arc::new(CliImageScanner::new(
            config.scanner.docker_bin.as_str(),
            config.scanner.image_scanner_bin.as_str(),
            timeout,
        ));
        let policy = Arc::new(SubprocessPolicyScanner::new(
            config.scanner.policy_bin.as_str(),
            timeout,
        ));

        Ok(Self::with_scanners(
            config,
            client,
            results_path,
            aggregator,
            uploader,
            image_scanner,
            policy,
        ))
    }

    /// Seam for tests and alternative engines.
    pub fn with_scanners(
        config: &Config,
        client: reqwest::Client,
        results_path: PathBuf,
        aggregator: Arc<DependencyAggregator>,
        uploader: Option<Arc<ResultUploader>>,
        image_scanner: Arc<dyn ImageScanner>,
        policy: Arc<dyn PolicyScanner>,
    ) -> Self {
        let timeout = Duration::from_secs(config.scanner.command_timeout_secs);
        let image_workers = config
            .scanner
            .image_workers
            .unwrap_or_else(pool::default_workers);
        Self {
            fetcher: ChartFetcher::new(client, config.scanner.max_archive_depth),
            resolver: DependencyResolver::new(config.scanner.helm_bin.as_str(), timeout),
            extractor: ImageExtractor::new(config.scanner.helm_bin.as_str(), timeout),
            image_scanner,
            policy,
            aggregator,
            uploader,
            results_path,
            image_pool: WorkerPool::new(image_workers),
            stats: RunStats::default(),
        }
    }

    /// Scan every chart package of one organization and write its tables.
    /// Report-write and upload failures are logged, never fatal.
    pub async fn scan_org(&self, repo: &RepoDescriptor) -> Result<()> {
        let mut checks: Vec<CheckRow> = Vec::new();
        let mut summaries: Vec<SummaryRow> = Vec::new();
        let mut dependencies: Vec<DependencyRow> = Vec::new();

        for package in &repo.repo_packages {
            if pool::shutdown_requested() {
                warn!("Shutdown requested - skipping remaining charts of {}", repo.repo_name);
                break;
            }
            let rows = self.scan_chart(repo, package).await;
            checks.extend(rows.checks);
            summaries.push(rows.summary);
            dependencies.extend(rows.dependencies);
        }

        if let Err(e) = writer::write_org_tables(
            &self.results_path,
            &repo.repo_name,
            &checks,
            &summaries,
            &dependencies,
        ) {
            error!("Failed to write tables for {}: {}", repo.repo_name, e);
        }

        // Upload per org rather than waiting for the end of the run
        if let Some(uploader) = &self.uploader {
            uploader.upload_results(&self.results_path).await;
        }
        Ok(())
    }

    /// Drive one chart package through the full pipeline.
    pub async fn scan_chart(&self, repo: &RepoDescriptor, package: &ChartPackage) -> ChartRows {
        let meta = ChartMeta::new(repo, package);
        let combined = meta.combined_name.clone();
        let chart_dir = self.results_path.join(&repo.repo_name).join(&package.name);

        // DOWNLOADING - the only chart-fatal stage
        info!("Scanning {} | downloading source", combined);
        if let Err(e) = self
            .fetcher
            .download_chart(&combined, &package.content_url, &chart_dir)
            .await
        {
            error!("{}", e);
            self.stats.download_failures.fetch_add(1, Ordering::Relaxed);
            return ChartRows {
                checks: Vec::new(),
                summary: meta.summary_row("failed", 0, 0, 0),
                dependencies: Vec::new(),
            };
        }

        // EXTRACTING - best-effort, scanning proceeds on whatever unpacked
        let fetcher = self.fetcher.clone();
        let extract_dir = chart_dir.clone();
        let extract_chart = combined.clone();
        let extracted = tokio::task::spawn_blocking(move || {
            fetcher.extract_archives(&extract_chart, &extract_dir)
        })
        .await;
        match extracted {
            Ok(Ok(())) => info!("Scanning {} | extracted source", combined),
            Ok(Err(e)) => {
                warn!("{}", e);
                self.stats.extract_failures.fetch_add(1, Ordering::Relaxed);
            }
            Err(e) => {
                warn!("Extraction task failed for {}: {}", combined, e);
                self.stats.extract_failures.fetch_add(1, Ordering::Relaxed);
            }
        }

        // DEPENDENCY_LISTING - continue-on-failure with an empty set
        info!("Scan of {} | processing chart dependencies", combined);
        let chart_path = chart_dir.join(&package.name);
        let dependencies = match self.resolver.resolve(&combined, &chart_path).await {
            Ok(deps) => deps,
            Err(e) => {
                warn!("{}", e);
                DependencyList::default()
            }
        };

        // TEMPLATE_RENDERING + IMAGE_EXTRACTION
        let images = match self.extractor.extract(&combined, &chart_path).await {
            Ok(images) => images,
            Err(e) => {
                warn!("{}", e);
                Vec::new()
            }
        };
        info!("Found {} image(s) in chart {}", images.len(), combined);

        // IMAGE_SCANNING - nested fan-out, per-image failures are skipped
        if !images.is_empty() {
            let scanner = Arc::clone(&self.image_scanner);
            let out_dir = chart_dir.clone();
            let scan_chart_name = combined.clone();
            let scanned = self
                .image_pool
                .run(images, move |image| {
                    let scanner = Arc::clone(&scanner);
                    let out_dir = out_dir.clone();
                    let chart = scan_chart_name.clone();
                    async move {
                        if let Err(e) = scanner.scan_image(&chart, &image, &out_dir).await {
                            warn!("Skipping image {}: {}", image, e);
                        }
                        Ok(())
                    }
                })
                .await;
            if let Err(e) = scanned {
                warn!("Image fan-out for {} reported: {}", combined, e);
            }
            info!("Done scanning images for {}", combined);
        }

        // STATIC_SCANNING - a typed outcome, never an escaping error
        info!("Scan of {} | running static scan", combined);
        let outcome = match self.policy.scan(&chart_dir).await {
            Ok(report) => StaticScanOutcome::Completed(report),
            Err(e) => {
                error!("Unexpected error in static scan of {}: {}", combined, e);
                StaticScanOutcome::Failed(e)
            }
        };

        // SUMMARIZING + dependency rows
        let checks = build_check_rows(&meta, &outcome);
        let summary = build_summary_row(&meta, &outcome);
        let mut dependency_rows = Vec::with_capacity(dependencies.len());
        for record in dependencies.records() {
            dependency_rows.push(meta.dependency_row(record));
            let key = DependencyAggregator::normalized_key(&record.chart_repo, &record.chart_name);
            self.aggregator.record_edge(&meta.combined_name, &key);
        }

        self.stats.charts_scanned.fetch_add(1, Ordering::Relaxed);
        ChartRows {
            checks,
            summary,
            dependencies: dependency_rows,
        }
    }
}

/// Denormalized registry metadata for one chart, computed once and stamped
/// into every row the chart produces.
#[derive(Debug, Clone)]
pub(crate) struct ChartMeta {
    run_timestamp: String,
    combined_name: String,
    repository_name: String,
    package_name: String,
    package_version: String,
    package_created_at: String,
    package_signed: String,
    security_report_created_at: String,
    is_operator: String,
    repository_id: String,
    repository_digest: String,
    repository_tracking_ts: String,
    repository_verified: String,
    repository_official: String,
    repository_scanner_disabled: String,
}

fn or_no_data<T: ToString>(value: &Option<T>) -> String {
    value
        .as_ref()
        .map(|v| v.to_string())
        .unwrap_or_else(|| NO_DATA.to_string())
}

impl ChartMeta {
    fn new(repo: &RepoDescriptor, package: &ChartPackage) -> Self {
        let raw = &repo.repo_raw;
        Self {
            run_timestamp: current_run_timestamp().to_string(),
            combined_name: format!("{}/{}", repo.repo_name, package.name),
            repository_name: repo.repo_name.clone(),
            package_name: package.name.clone(),
            package_version: package.version.clone(),
            package_created_at: package.ts.to_string(),
            package_signed: or_no_data(&package.signed),
            security_report_created_at: or_no_data(&package.security_report_created_at),
            is_operator: or_no_data(&package.is_operator),
            repository_id: raw.repository_id.clone(),
            repository_digest: or_no_data(&raw.digest),
            repository_tracking_ts: or_no_data(&raw.last_tracking_ts),
            repository_verified: raw.verified_publisher.to_string(),
            repository_official: raw.official.to_string(),
            repository_scanner_disabled: raw.scanner_disabled.to_string(),
        }
    }

    fn check_row(&self, item: &CheckItem) -> CheckRow {
        CheckRow {
            run_timestamp: self.run_timestamp.clone(),
            combined_name: self.combined_name.clone(),
            repository_name: self.repository_name.clone(),
            package_name: self.package_name.clone(),
            package_version: self.package_version.clone(),
            package_created_at: self.package_created_at.clone(),
            package_signed: self.package_signed.clone(),
            security_report_created_at: self.security_report_created_at.clone(),
            helm_chart: chart_name_from_resource(&item.resource),
            is_operator: self.is_operator.clone(),
            check_category: check_category(&item.check_id).to_string(),
            check_id: item.check_id.clone(),
            check_name: item.check_name.clone(),
            check_result: item.result.result.clone(),
            file_path: item.file_path.clone(),
            check_class: item.check_class.clone(),
            resource_id: item
                .resource
                .split('.')
                .next()
                .unwrap_or_default()
                .to_string(),
            repository_id: self.repository_id.clone(),
            repository_digest: self.repository_digest.clone(),
            repository_tracking_ts: self.repository_tracking_ts.clone(),
            repository_verified: self.repository_verified.clone(),
            repository_official: self.repository_official.clone(),
            repository_scanner_disabled: self.repository_scanner_disabled.clone(),
        }
    }

    /// Sentinel row standing in for a whole scan. The error sentinel also
    /// blanks repository provenance that cannot be trusted mid-failure.
    fn sentinel_row(&self, marker: &str, blank_provenance: bool) -> CheckRow {
        let provenance = |value: &String| {
            if blank_provenance {
                marker.to_string()
            } else {
                value.clone()
            }
        };
        CheckRow {
            run_timestamp: self.run_timestamp.clone(),
            combined_name: self.combined_name.clone(),
            repository_name: self.repository_name.clone(),
            package_name: self.package_name.clone(),
            package_version: self.package_version.clone(),
            package_created_at: self.package_created_at.clone(),
            package_signed: self.package_signed.clone(),
            security_report_created_at: self.security_report_created_at.clone(),
            helm_chart: marker.to_string(),
            is_operator: self.is_operator.clone(),
            check_category: marker.to_string(),
            check_id: marker.to_string(),
            check_name: marker.to_string(),
            check_result: marker.to_string(),
            file_path: marker.to_string(),
            check_class: marker.to_string(),
            resource_id: marker.to_string(),
            repository_id: self.repository_id.clone(),
            repository_digest: provenance(&self.repository_digest),
            repository_tracking_ts: provenance(&self.repository_tracking_ts),
            repository_verified: self.repository_verified.clone(),
            repository_official: self.repository_official.clone(),
            repository_scanner_disabled: self.repository_scanner_disabled.clone(),
        }
    }

    fn summary_row(&self, status: &str, passed: u64, failed: u64, parsing_errors: u64) -> SummaryRow {
        SummaryRow {
            run_timestamp: self.run_timestamp.clone(),
            combined_name: self.combined_name.clone(),
            repository_name: self.repository_name.clone(),
            package_name: self.package_name.clone(),
            package_version: self.package_version.clone(),
            package_created_at: self.package_created_at.clone(),
            package_signed: self.package_signed.clone(),
            security_report_created_at: self.security_report_created_at.clone(),
            helm_chart: self.package_name.clone(),
            is_operator: self.is_operator.clone(),
            scan_status: status.to_string(),
            passed,
            failed,
            parsing_errors,
        }
    }

    fn dependency_row(&self, record: &ChartDependencyRecord) -> DependencyRow {
        DependencyRow {
            run_timestamp: self.run_timestamp.clone(),
            combined_name: self.combined_name.clone(),
            repository_name: self.repository_name.clone(),
            package_name: self.package_name.clone(),
            package_version: self.package_version.clone(),
            dep_chart: record.chart_name.clone(),
            dep_version: record.chart_version.clone(),
            dep_repo: record.chart_repo.clone(),
            dep_status: record.chart_status.clone(),
        }
    }
}

/// Chart name off a check's resource identifier: third capture of the fixed
/// pattern, stripping the release-name prefix.
pub(crate) fn chart_name_from_resource(resource: &str) -> String {
    CHART_NAME_FROM_RESOURCE
        .captures(resource)
        .and_then(|caps| caps.get(3))
        .map(|m| m.as_str().to_string())
        .unwrap_or_else(|| resource.to_string())
}

/// Check rows are a pure function of the typed static-scan outcome: real
/// rows for a completed scan with findings, one "empty scan" sentinel for a
/// completed scan that evaluated nothing, one "error in scan" sentinel when
/// the engine itself failed.
pub(crate) fn build_check_rows(meta: &ChartMeta, outcome: &StaticScanOutcome) -> Vec<CheckRow> {
    match outcome {
        StaticScanOutcome::Completed(report) if report.is_empty() => {
            vec![meta.sentinel_row(EMPTY_SCAN_MARKER, false)]
        }
        StaticScanOutcome::Completed(report) => report
            .passed_checks
            .iter()
            .chain(report.failed_checks.iter())
            .map(|item| meta.check_row(item))
            .collect(),
        StaticScanOutcome::Failed(_) => vec![meta.sentinel_row(ERROR_SCAN_MARKER, true)],
    }
}

/// Exactly one summary row per chart, whatever the outcome.
pub(crate) fn build_summary_row(meta: &ChartMeta, outcome: &StaticScanOutcome) -> SummaryRow {
    match outcome {
        StaticScanOutcome::Completed(report) => meta.summary_row(
            "success",
            report.summary.passed,
            report.summary.failed,
            report.summary.parsing_errors,
        ),
        StaticScanOutcome::Failed(_) => meta.summary_row("failed", 0, 0, 0),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::error::ScanError;
    use crate::scanner::static_scan::{CheckResult, ScanSummary, StaticScanReport};

    fn descriptor() -> (RepoDescriptor, ChartPackage) {
        let package = ChartPackage {
            name: "redis".into(),
            version: "17.0.1".into(),
            content_url: "https://x/redis.tgz".into(),
            ts: 1_650_000_000,
            signed: Some(false),
            security_report_created_at: None,
            is_operator: Some(false),
        };
        let repo = RepoDescriptor {
            repo_name: "bitnami".into(),
            repo_org_name: "bitnami".into(),
            repo_raw: crate::scanner::RepoRaw {
                repository_id: "repo-1".into(),
                digest: Some("sha256:abc".into()),
                last_tracking_ts: Some(1_650_000_100),
                verified_publisher: true,
                official: false,
                scanner_disabled: false,
            },
            repo_packages: vec![package.clone()],
        };
        (repo, package)
    }

    fn check(id: &str, resource: &str, result: &str) -> CheckItem {
        CheckItem {
            check_id: id.into(),
            check_name: "a check".into(),
            result: CheckResult {
                result: result.into(),
            },
            file_path: "/templates/deployment.yaml".into(),
            check_class: "engine.checks.Check".into(),
            resource: resource.into(),
        }
    }

    #[test]
    fn release_name_prefix_is_stripped_from_resource() {
        assert_eq!(
            chart_name_from_resource("Deployment.default.RELEASE-NAME-redis"),
            "redis"
        );
        assert_eq!(chart_name_from_resource("Deployment.default.web"), "web");
    }

    #[test]
    fn completed_scan_yields_one_row_per_check() {
        let (repo, package) = descriptor();
        let meta = ChartMeta::new(&repo, &package);
        let outcome = StaticScanOutcome::Completed(StaticScanReport {
            passed_checks: vec![check("CKV_K8S_21", "Deployment.default.RELEASE-NAME-redis", "PASSED")],
            failed_checks: vec![check("CKV_K8S_8", "Pod.default.RELEASE-NAME-redis", "FAILED")],
            summary: ScanSummary {
                passed: 1,
                failed: 1,
                parsing_errors: 0,
            },
        });

        let rows = build_check_rows(&meta, &outcome);
        assert_eq!(rows.len(), 2);
        assert_eq!(rows[0].check_result, "PASSED");
        assert_eq!(rows[0].helm_chart, "redis");
        assert_eq!(rows[0].check_category, "KUBERNETES");
        assert_eq!(rows[0].resource_id, "Deployment");
        assert_eq!(rows[1].check_result, "FAILED");

        let summary = build_summary_row(&meta, &outcome);
        assert_eq!(summary.scan_status, "success");
        assert_eq!(summary.passed, 1);
        assert_eq!(summary.failed, 1);
    }

    #[test]
    fn empty_scan_yields_exactly_one_sentinel_row() {
        let (repo, package) = descriptor();
        let meta = ChartMeta::new(&repo, &package);
        let outcome = StaticScanOutcome::Completed(StaticScanReport::default());

        let rows = build_check_rows(&meta, &outcome);
        assert_eq!(rows.len(), 1);
        let row = &rows[0];
        assert_eq!(row.helm_chart, "empty scan");
        assert_eq!(row.check_id, "empty scan");
        assert_eq!(row.check_result, "empty scan");
        // provenance survives an empty scan
        assert_eq!(row.repository_digest, "sha256:abc");

        let summary = build_summary_row(&meta, &outcome);
        assert_eq!(summary.scan_status, "success");
        assert_eq!(summary.passed, 0);
    }

    #[test]
    fn failed_scan_yields_exactly_one_error_sentinel_row() {
        let (repo, package) = descriptor();
        let meta = ChartMeta::new(&repo, &package);
        let outcome = StaticScanOutcome::Failed(ScanError::StaticScan {
            chart: "bitnami/redis".into(),
            reason: "engine crashed".into(),
        });

        let rows = build_check_rows(&meta, &outcome);
        assert_eq!(rows.len(), 1);
        let row = &rows[0];
        assert_eq!(row.check_id, "error in scan");
        assert_eq!(row.repository_digest, "error in scan");
        assert_eq!(row.repository_tracking_ts, "error in scan");
        // identity fields survive
        assert_eq!(row.repository_id, "repo-1");
        assert_eq!(row.repository_verified, "true");

        let summary = build_summary_row(&meta, &outcome);
        assert_eq!(summary.scan_status, "failed");
        assert_eq!(summary.passed, 0);
        assert_eq!(summary.parsing_errors, 0);
    }

    #[test]
    fn optional_descriptor_fields_render_as_no_data() {
        let (mut repo, mut package) = descriptor();
        package.signed = None;
        package.is_operator = None;
        repo.repo_raw.digest = None;
        let meta = ChartMeta::new(&repo, &package);
        let summary = meta.summary_row("failed", 0, 0, 0);
        assert_eq!(summary.package_signed, "no data");
        assert_eq!(summary.is_operator, "no data");

        let sentinel = meta.sentinel_row(EMPTY_SCAN_MARKER, false);
        assert_eq!(sentinel.repository_digest, "no data");
    }
}
