//! Row schemas for every tabular sink.
//!
//! Rows are append-only: written once, never mutated. Every row carries the
//! run timestamp so all artifacts of one run correlate across sinks.

use serde::Serialize;

/// One static-check evaluation (or a sentinel standing in for a whole scan).
#[derive(Debug, Clone, Serialize, PartialEq, Eq)]
pub struct CheckRow {
    pub run_timestamp: String,
    pub combined_name: String,
    pub repository_name: String,
    pub package_name: String,
    pub package_version: String,
    pub package_created_at: String,
    pub package_signed: String,
    pub security_report_created_at: String,
    pub helm_chart: String,
    pub is_operator: String,
    pub check_category: String,
    pub check_id: String,
    pub check_name: String,
    pub check_result: String,
    pub file_path: String,
    pub check_class: String,
    pub resource_id: String,
    pub repository_id: String,
    pub repository_digest: String,
    pub repository_tracking_ts: String,
    pub repository_verified: String,
    pub repository_official: String,
    pub repository_scanner_disabled: String,
}

pub const CHECK_HEADERS: &[&str] = &[
    "runner timestamp",
    "combined name",
    "repository name",
    "package name",
    "package latest version",
    "package created at",
    "package is signed",
    "security report created timestamp",
    "helm chart",
    "resource is operator",
    "check category",
    "check id",
    "check name",
    "check result",
    "file path",
    "check class",
    "resource id",
    "repository id",
    "repository digest",
    "repository tracking ts",
    "repository verified",
    "repository official",
    "repository scanning disabled",
];

/// One row per chart package summarizing check counts and scan status.
#[derive(Debug, Clone, Serialize, PartialEq, Eq)]
pub struct SummaryRow {
    pub run_timestamp: String,
    pub combined_name: String,
    pub repository_name: String,
    pub package_name: String,
    pub package_version: String,
    pub package_created_at: String,
    pub package_signed: String,
    pub security_report_created_at: String,
    pub helm_chart: String,
    pub is_operator: String,
    pub scan_status: String,
    pub passed: u64,
    pub failed: u64,
    pub parsing_errors: u64,
}

pub const SUMMARY_HEADERS: &[&str] = &[
    "runner timestamp",
    "combined name",
    "repository name",
    "package name",
    "package latest version",
    "package created at",
    "package is signed",
    "security report created timestamp",
    "helm chart",
    "resource is operator",
    "scan status",
    "passed checks",
    "failed checks",
    "parsing errors",
];

/// One row per declared dependency edge of a chart.
#[derive(Debug, Clone, Serialize, PartialEq, Eq)]
pub struct DependencyRow {
    pub run_timestamp: String,
    pub combined_name: String,
    pub repository_name: String,
    pub package_name: String,
    pub package_version: String,
    pub dep_chart: String,
    pub dep_version: String,
    pub dep_repo: String,
    pub dep_status: String,
}

pub const DEPENDENCY_HEADERS: &[&str] = &[
    "runner timestamp",
    "combined name",
    "repository name",
    "package name",
    "package latest version",
    "dep helm chart",
    "dep helm version",
    "dep repo",
    "dep chart status",
];

/// Run-wide usage count of one dependency key.
#[derive(Debug, Clone, Serialize, PartialEq, Eq)]
pub struct GlobalUsageRow {
    pub dependency: String,
    pub usage_count: u64,
}

pub const GLOBAL_USAGE_HEADERS: &[&str] = &["dependency", "usage count"];

/// One (dependency, dependent) edge in the run-wide reverse-dependency list.
#[derive(Debug, Clone, Serialize, PartialEq, Eq)]
pub struct GlobalDependentRow {
    pub dependency: String,
    pub dependent: String,
}

pub const GLOBAL_DEPENDENT_HEADERS: &[&str] = &["dependency", "dependent"];

/// Vulnerability distribution summary for one scanned image.
#[derive(Debug, Clone, Serialize, PartialEq, Eq)]
pub struct ImageSummaryRow {
    pub combined_name: String,
    pub image_name: String,
    pub image_tag: String,
    pub total: u64,
    pub critical: u64,
    pub high: u64,
    pub medium: u64,
    pub low: u64,
}

pub const IMAGE_SUMMARY_HEADERS: &[&str] = &[
    "combined name",
    "image name",
    "image tag",
    "total",
    "critical",
    "high",
    "medium",
    "low",
];

/// One vulnerability found in one scanned image.
#[derive(Debug, Clone, Serialize, PartialEq)]
pub struct ImageVulnerabilityRow {
    pub combined_name: String,
    pub image_name: String,
    pub image_tag: String,
    pub cve_id: String,
    pub status: String,
    pub severity: String,
    pub package_name: String,
    pub package_version: String,
    pub link: String,
    pub cvss: Option<f64>,
    pub vector: String,
    pub description: String,
    pub risk_factors: String,
    pub publish_date: String,
}

pub const IMAGE_VULNERABILITY_HEADERS: &[&str] = &[
    "combined name",
    "image name",
    "image tag",
    "cve id",
    "status",
    "severity",
    "package name",
    "package version",
    "link",
    "cvss",
    "vector",
    "description",
    "risk factors",
    "publish date",
];
