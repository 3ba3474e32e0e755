//! Static policy scan boundary
//!
//! The policy engine itself is a black box: `scan(directory)` yields passed
//! checks, failed checks, and parsing-error counts. This module drives a
//! checkov-compatible engine over a subprocess and parses its JSON report.
//! The orchestrator only ever sees a typed outcome, so sentinel-row logic is
//! a pure function of the value rather than a side effect of a catch block.

use crate::common::command_utils::run_command;
use crate::error::ScanError;
use async_trait::async_trait;
use serde::Deserialize;
use std::path::{Path, PathBuf};
use std::time::Duration;

/// One evaluated check as reported by the engine.
#[derive(Debug, Clone, Deserialize, PartialEq, Eq)]
pub struct CheckItem {
    pub check_id: String,
    pub check_name: String,
    #[serde(rename = "check_result")]
    pub result: CheckResult,
    #[serde(default)]
    pub file_path: String,
    #[serde(default)]
    pub check_class: String,
    #[serde(default)]
    pub resource: String,
}

#[derive(Debug, Clone, Deserialize, PartialEq, Eq)]
pub struct CheckResult {
    pub result: String,
}

#[derive(Debug, Clone, Default, Deserialize, PartialEq, Eq)]
pub struct ScanSummary {
    #[serde(default)]
    pub passed: u64,
    #[serde(default)]
    pub failed: u64,
    #[serde(default)]
    pub parsing_errors: u64,
}

/// Full engine report for one chart directory.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct StaticScanReport {
    pub passed_checks: Vec<CheckItem>,
    pub failed_checks: Vec<CheckItem>,
    pub summary: ScanSummary,
}

impl StaticScanReport {
    /// The engine ran but evaluated nothing - distinct from "no findings".
    pub fn is_empty(&self) -> bool {
        self.passed_checks.is_empty()
            && self.failed_checks.is_empty()
            && self.summary.parsing_errors == 0
    }
}

/// Typed result of the STATIC_SCANNING stage. Row building switches on this.
#[derive(Debug)]
pub enum StaticScanOutcome {
    Completed(StaticScanReport),
    Failed(ScanError),
}

#[async_trait]
pub trait PolicyScanner: Send + Sync {
    async fn scan(&self, root: &Path) -> std::result::Result<StaticScanReport, ScanError>;
}

/// Drives a checkov-compatible engine binary with JSON output.
#[derive(Debug, Clone)]
pub struct SubprocessPolicyScanner {
    binary: String,
    timeout: Duration,
}

impl SubprocessPolicyScanner {
    pub fn new(binary: impl Into<String>, timeout: Duration) -> Self {
        Self {
            binary: binary.into(),
            timeout,
        }
    }
}

#[async_trait]
impl PolicyScanner for SubprocessPolicyScanner {
    async fn scan(&self, root: &Path) -> std::result::Result<StaticScanReport, ScanError> {
        let dir = root.display().to_string();
        let scan_err = |reason: String| ScanError::StaticScan {
            chart: dir.clone(),
            reason,
        };

        let output = run_command(
            &self.binary,
            &["--directory", &dir, "--output", "json", "--quiet"],
            None,
            self.timeout,
        )
        .await
        .map_err(|e| scan_err(e.to_string()))?;

        // The engine exits non-zero when checks fail; only an empty report
        // stream counts as an engine error.
        let stdout = String::from_utf8_lossy(&output.stdout);
        if stdout.trim().is_empty() {
            return Err(scan_err(format!(
                "engine produced no report: {}",
                String::from_utf8_lossy(&output.stderr).trim()
            )));
        }

        parse_engine_report(&stdout).map_err(|e| scan_err(e.to_string()))
    }
}

#[derive(Debug, Deserialize)]
struct RawResults {
    #[serde(default)]
    passed_checks: Vec<CheckItem>,
    #[serde(default)]
    failed_checks: Vec<CheckItem>,
    #[serde(default)]
    parsing_errors: Vec<serde_json::Value>,
}

#[derive(Debug, Deserialize)]
struct RawReport {
    results: RawResults,
    #[serde(default)]
    summary: ScanSummary,
}

/// The engine emits one report object per framework it ran, or a bare object
/// when only one applied. Multiple reports merge into one.
pub fn parse_engine_report(json: &str) -> std::result::Result<StaticScanReport, serde_json::Error> {
    let raw: Vec<RawReport> = match serde_json::from_str::<RawReport>(json) {
        Ok(single) => vec![single],
        Err(_) => serde_json::from_str(json)?,
    };

    let mut report = StaticScanReport::default();
    for part in raw {
        report.summary.passed += part.summary.passed;
        report.summary.failed += part.summary.failed;
        report.summary.parsing_errors += part.summary.parsing_errors
            + part.results.parsing_errors.len() as u64;
        report.passed_checks.extend(part.results.passed_checks);
        report.failed_checks.extend(part.results.failed_checks);
    }
    Ok(report)
}

/// Category of a check, derived from its id family. Stand-in for the
/// engine's in-process check registry, which a subprocess boundary hides.
pub fn check_category(check_id: &str) -> &'static str {
    let family = check_id.split('_').nth(1).unwrap_or("");
    match family {
        "K8S" => "KUBERNETES",
        "DOCKER" => "DOCKER",
        "SECRET" => "SECRETS",
        "AWS" | "AZURE" | "GCP" => "IAC",
        _ => "GENERAL",
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    const SINGLE: &str = r#"{
        "results": {
            "passed_checks": [
                {"check_id": "CKV_K8S_21", "check_name": "The default namespace should not be used",
                 "check_result": {"result": "PASSED"}, "file_path": "/templates/deployment.yaml",
                 "check_class": "checkov.kubernetes.checks.DefaultNamespace",
                 "resource": "Deployment.default.RELEASE-NAME-redis"}
            ],
            "failed_checks": [],
            "parsing_errors": []
        },
        "summary": {"passed": 1, "failed": 0, "parsing_errors": 0}
    }"#;

    #[test]
    fn parses_single_object_report() {
        let report = parse_engine_report(SINGLE).unwrap();
        assert_eq!(report.passed_checks.len(), 1);
        assert_eq!(report.summary.passed, 1);
        assert!(!report.is_empty());
        assert_eq!(report.passed_checks[0].result.result, "PASSED");
    }

    #[test]
    fn parses_and_merges_array_report() {
        let json = format!("[{}, {}]", SINGLE, SINGLE);
        let report = parse_engine_report(&json).unwrap();
        assert_eq!(report.passed_checks.len(), 2);
        assert_eq!(report.summary.passed, 2);
    }

    #[test]
    fn empty_report_is_empty() {
        let report =
            parse_engine_report(r#"{"results": {}, "summary": {}}"#).unwrap();
        assert!(report.is_empty());
    }

    #[test]
    fn parsing_errors_keep_report_non_empty() {
        let report = parse_engine_report(
            r#"{"results": {"parsing_errors": ["templates/bad.yaml"]}, "summary": {}}"#,
        )
        .unwrap();
        assert!(!report.is_empty());
        assert_eq!(report.summary.parsing_errors, 1);
    }

    #[test]
    fn categories_derive_from_id_family() {
        assert_eq!(check_category("CKV_K8S_21"), "KUBERNETES");
        assert_eq!(check_category("CKV_DOCKER_2"), "DOCKER");
        assert_eq!(check_category("CKV_SECRET_6"), "SECRETS");
        assert_eq!(check_category("CKV_AWS_1"), "IAC");
        assert_eq!(check_category("bogus"), "GENERAL");
    }
}
