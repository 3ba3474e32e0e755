//! # Scanner Module
//!
//! The scan-orchestration pipeline. Per discovered chart package this module
//! drives download, extraction, dependency listing, template rendering,
//! image scanning, and the static policy scan, tolerating partial failure at
//! every step without losing already-gathered results.
//!
//! Fan-out happens at two levels and never deeper: one worker pool spans the
//! discovered chart organizations, and a nested pool per chart spans that
//! chart's extracted image references.

use serde::{Deserialize, Serialize};
use std::fmt;

pub mod aggregator;
pub mod dependency;
pub mod fetch;
pub mod image_scan;
pub mod images;
pub mod orchestrator;
pub mod pool;
pub mod static_scan;
pub mod timestamp;

// Re-export the pipeline surface
pub use aggregator::{DependencyAggregator, DependencyUsage};
pub use dependency::{DependencyList, DependencyResolver};
pub use fetch::ChartFetcher;
pub use image_scan::{CliImageScanner, ImageScanner};
pub use images::ImageExtractor;
pub use orchestrator::{RunStats, ScanPipeline};
pub use pool::WorkerPool;
pub use static_scan::{PolicyScanner, StaticScanOutcome, StaticScanReport, SubprocessPolicyScanner};
pub use timestamp::current_run_timestamp;

/// One discoverable repository (organization) on the chart registry,
/// together with every chart package found in it. Produced by the crawler,
/// read-only input to the pipeline.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct RepoDescriptor {
    pub repo_name: String,
    pub repo_org_name: String,
    #[serde(default)]
    pub repo_raw: RepoRaw,
    pub repo_packages: Vec<ChartPackage>,
}

/// Raw registry metadata attached to a repository, denormalized into every
/// report row.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(default)]
pub struct RepoRaw {
    pub repository_id: String,
    pub digest: Option<String>,
    pub last_tracking_ts: Option<i64>,
    pub verified_publisher: bool,
    pub official: bool,
    pub scanner_disabled: bool,
}

/// One chart package as reported by the registry's package detail endpoint.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ChartPackage {
    pub name: String,
    #[serde(default)]
    pub version: String,
    #[serde(default)]
    pub content_url: String,
    #[serde(default)]
    pub ts: i64,
    #[serde(default)]
    pub signed: Option<bool>,
    #[serde(default)]
    pub security_report_created_at: Option<i64>,
    #[serde(default)]
    pub is_operator: Option<bool>,
}

/// A normalized `name:tag` container image reference extracted from rendered
/// templates. Tag defaults to `latest` when the template carries none.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct ImageRef {
    pub name: String,
    pub tag: String,
}

impl ImageRef {
    pub fn new(name: impl Into<String>, tag: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            tag: tag.into(),
        }
    }

    /// The `name:tag` reference handed to the image scanner
    pub fn reference(&self) -> String {
        format!("{}:{}", self.name, self.tag)
    }

    /// Filesystem-safe form of the reference, for per-image artifacts
    pub fn sanitized(&self) -> String {
        self.reference().replace(['/', ':'], "_")
    }
}

impl fmt::Display for ImageRef {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}:{}", self.name, self.tag)
    }
}

/// One declared dependency edge of a chart, parsed from the dependency
/// listing tool's tabular output.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ChartDependencyRecord {
    pub chart_name: String,
    pub chart_version: String,
    pub chart_repo: String,
    pub chart_status: String,
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn image_ref_reference_and_sanitized() {
        let img = ImageRef::new("registry.io/nginx", "1.21");
        assert_eq!(img.reference(), "registry.io/nginx:1.21");
        assert_eq!(img.sanitized(), "registry.io_nginx_1.21");
    }

    #[test]
    fn descriptor_round_trips_with_optional_fields_absent() {
        let json = r#"{
            "repoName": "bitnami",
            "repoOrgName": "bitnami",
            "repoPackages": [
                {"name": "redis", "version": "17.0.1", "content_url": "https://x/redis.tgz", "ts": 1}
            ]
        }"#;
        let repo: RepoDescriptor = serde_json::from_str(json).unwrap();
        assert_eq!(repo.repo_name, "bitnami");
        assert_eq!(repo.repo_raw.repository_id, "");
        assert!(repo.repo_packages[0].signed.is_none());

        let back = serde_json::to_string(&repo).unwrap();
        let again: RepoDescriptor = serde_json::from_str(&back).unwrap();
        assert_eq!(again.repo_packages.len(), 1);
    }
}
