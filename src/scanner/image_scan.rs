//! Image scanner boundary
//!
//! The vulnerability scanner itself is a black box invoked by image
//! reference; this module orchestrates what surrounds it: probing for the
//! image locally, pulling it when absent, reconstructing a Dockerfile from
//! the image history for platform reporting, invoking the scanner CLI, and
//! writing the per-image report tables.

use crate::common::command_utils::run_command;
use crate::error::ScanError;
use crate::report::rows::{
    IMAGE_SUMMARY_HEADERS, IMAGE_VULNERABILITY_HEADERS, ImageSummaryRow, ImageVulnerabilityRow,
};
use crate::report::writer::write_table;
use crate::scanner::ImageRef;
use async_trait::async_trait;
use chrono::{Duration as ChronoDuration, Utc};
use log::{debug, info, warn};
use serde::Deserialize;
use std::path::Path;
use std::time::Duration;

#[async_trait]
pub trait ImageScanner: Send + Sync {
    /// Scan one image reference on behalf of `combined_name`, leaving any
    /// per-image artifacts under `out_dir`.
    async fn scan_image(
        &self,
        combined_name: &str,
        image: &ImageRef,
        out_dir: &Path,
    ) -> std::result::Result<(), ScanError>;
}

/// Scanner driven over a twistcli-compatible CLI, with docker handling the
/// local image cache.
#[derive(Debug, Clone)]
pub struct CliImageScanner {
    docker_bin: String,
    scanner_bin: String,
    timeout: Duration,
}

impl CliImageScanner {
    pub fn new(
        docker_bin: impl Into<String>,
        scanner_bin: impl Into<String>,
        timeout: Duration,
    ) -> Self {
        Self {
            docker_bin: docker_bin.into(),
            scanner_bin: scanner_bin.into(),
            timeout,
        }
    }

    /// Make sure the image is present locally, pulling it when it is not.
    async fn ensure_present(&self, image: &ImageRef) -> std::result::Result<(), ScanError> {
        let reference = image.reference();
        let inspect = run_command(
            &self.docker_bin,
            &["image", "inspect", &reference],
            None,
            self.timeout,
        )
        .await;
        if matches!(&inspect, Ok(output) if output.status.success()) {
            return Ok(());
        }

        info!("Image {} not found locally, pulling", reference);
        let pull = run_command(&self.docker_bin, &["pull", &reference], None, self.timeout)
            .await
            .map_err(|e| ScanError::ImagePull {
                image: reference.clone(),
                reason: e.to_string(),
            })?;
        if !pull.status.success() {
            return Err(ScanError::ImagePull {
                image: reference,
                reason: String::from_utf8_lossy(&pull.stderr).trim().to_string(),
            });
        }
        Ok(())
    }

    /// Reconstruct a Dockerfile from the image history. Only needed for
    /// platform reporting, so failures degrade to a warning.
    async fn save_dockerfile(&self, image: &ImageRef, out_dir: &Path) {
        let reference = image.reference();
        let history = run_command(
            &self.docker_bin,
            &["history", "--no-trunc", "--format", "{{.CreatedBy}}", &reference],
            None,
            self.timeout,
        )
        .await;

        match history {
            Ok(output) if output.status.success() => {
                let stdout = String::from_utf8_lossy(&output.stdout);
                let steps: Vec<&str> = stdout.lines().filter(|l| !l.is_empty()).collect();
                let dockerfile = reconstruct_dockerfile(&steps, &reference);
                let path = out_dir.join(format!("Dockerfile.{}", image.sanitized()));
                if let Err(e) = std::fs::write(&path, dockerfile) {
                    warn!("Failed to write {}: {}", path.display(), e);
                }
            }
            Ok(output) => warn!(
                "docker history failed for {}: {}",
                reference,
                String::from_utf8_lossy(&output.stderr).trim()
            ),
            Err(e) => warn!("docker history failed for {}: {}", reference, e),
        }
    }
}

#[async_trait]
impl ImageScanner for CliImageScanner {
    async fn scan_image(
        &self,
        combined_name: &str,
        image: &ImageRef,
        out_dir: &Path,
    ) -> std::result::Result<(), ScanError> {
        self.ensure_present(image).await?;
        self.save_dockerfile(image, out_dir).await;

        let reference = image.reference();
        let scan_err = |reason: String| ScanError::ImageScan {
            image: reference.clone(),
            reason,
        };

        let result_file = out_dir.join(format!("{}.scan.json", image.sanitized()));
        let result_path = result_file.display().to_string();
        debug!("Running image scan for {}", reference);
        let output = run_command(
            &self.scanner_bin,
            &[
                "images",
                "scan",
                "--details",
                "--output-file",
                &result_path,
                &reference,
            ],
            None,
            self.timeout,
        )
        .await
        .map_err(|e| scan_err(e.to_string()))?;

        if !output.status.success() {
            return Err(scan_err(
                String::from_utf8_lossy(&output.stderr).trim().to_string(),
            ));
        }

        let raw = std::fs::read_to_string(&result_file).map_err(|e| scan_err(e.to_string()))?;
        let report = parse_scan_result(&raw).map_err(|e| scan_err(e.to_string()))?;
        write_image_tables(combined_name, image, &report, out_dir)
            .map_err(|e| scan_err(e.to_string()))?;
        info!("Image scan finished for {}", reference);
        Ok(())
    }
}

/// Parsed scanner output for one image.
#[derive(Debug, Clone, Deserialize)]
pub struct ImageScanReport {
    pub results: Vec<ImageScanEntry>,
}

#[derive(Debug, Clone, Deserialize)]
pub struct ImageScanEntry {
    #[serde(rename = "vulnerabilityDistribution")]
    pub distribution: VulnerabilityDistribution,
    #[serde(default)]
    pub vulnerabilities: Vec<Vulnerability>,
}

#[derive(Debug, Clone, Default, Deserialize)]
pub struct VulnerabilityDistribution {
    #[serde(default)]
    pub total: u64,
    #[serde(default)]
    pub critical: u64,
    #[serde(default)]
    pub high: u64,
    #[serde(default)]
    pub medium: u64,
    #[serde(default)]
    pub low: u64,
}

#[derive(Debug, Clone, Deserialize)]
pub struct Vulnerability {
    pub id: String,
    #[serde(default = "default_status")]
    pub status: String,
    pub severity: String,
    #[serde(rename = "packageName")]
    pub package_name: String,
    #[serde(rename = "packageVersion")]
    pub package_version: String,
    #[serde(default)]
    pub link: String,
    #[serde(default)]
    pub cvss: Option<f64>,
    #[serde(default)]
    pub vector: String,
    #[serde(default)]
    pub description: String,
    #[serde(rename = "riskFactors", default)]
    pub risk_factors: Option<serde_json::Value>,
    #[serde(rename = "publishedDays", default)]
    pub published_days: i64,
}

fn default_status() -> String {
    "open".to_string()
}

pub fn parse_scan_result(json: &str) -> std::result::Result<ImageScanReport, String> {
    let report: ImageScanReport = serde_json::from_str(json).map_err(|e| e.to_string())?;
    if report.results.is_empty() {
        return Err("scanner report carries no results".to_string());
    }
    Ok(report)
}

/// Rebuild an approximate Dockerfile from `docker history` output
/// (newest-first). `#(nop)` metadata steps keep their payload, filesystem
/// steps become RUN instructions, and the image reference marker leads the
/// file once the order is flipped back to oldest-first.
pub fn reconstruct_dockerfile(history_newest_first: &[&str], reference: &str) -> String {
    let mut commands: Vec<String> = history_newest_first
        .iter()
        .map(|step| render_step(step))
        .collect();
    commands.push(format!("IMAGE {}", reference));
    commands.reverse();
    let mut dockerfile = commands.join("\n");
    dockerfile.push('\n');
    dockerfile
}

fn render_step(step: &str) -> String {
    let rendered = match step.split_once("#(nop) ") {
        Some((_, payload)) => payload.to_string(),
        None => format!("RUN {}", step),
    };
    rendered.replace("&&", "\\\n    &&").trim().to_string()
}

fn write_image_tables(
    combined_name: &str,
    image: &ImageRef,
    report: &ImageScanReport,
    out_dir: &Path,
) -> std::result::Result<(), crate::error::ReportError> {
    // Only the first result entry carries the image-level distribution
    let entry = &report.results[0];
    let summary = ImageSummaryRow {
        combined_name: combined_name.to_string(),
        image_name: image.name.clone(),
        image_tag: image.tag.clone(),
        total: entry.distribution.total,
        critical: entry.distribution.critical,
        high: entry.distribution.high,
        medium: entry.distribution.medium,
        low: entry.distribution.low,
    };
    write_table(
        &out_dir.join(format!("{}-summary.csv", image.sanitized())),
        IMAGE_SUMMARY_HEADERS,
        &[summary],
    )?;

    if entry.distribution.total > 0 {
        let rows: Vec<ImageVulnerabilityRow> = entry
            .vulnerabilities
            .iter()
            .map(|v| vulnerability_row(combined_name, image, v))
            .collect();
        write_table(
            &out_dir.join(format!("{}-vulns.csv", image.sanitized())),
            IMAGE_VULNERABILITY_HEADERS,
            &rows,
        )?;
    }
    Ok(())
}

fn vulnerability_row(
    combined_name: &str,
    image: &ImageRef,
    vuln: &Vulnerability,
) -> ImageVulnerabilityRow {
    let publish_date = (Utc::now() - ChronoDuration::days(vuln.published_days))
        .format("%Y-%m-%dT%H:%M:%S")
        .to_string();
    ImageVulnerabilityRow {
        combined_name: combined_name.to_string(),
        image_name: image.name.clone(),
        image_tag: image.tag.clone(),
        cve_id: vuln.id.clone(),
        status: vuln.status.clone(),
        severity: vuln.severity.clone(),
        package_name: vuln.package_name.clone(),
        package_version: vuln.package_version.clone(),
        link: vuln.link.clone(),
        cvss: vuln.cvss,
        vector: vuln.vector.clone(),
        description: vuln.description.clone(),
        risk_factors: vuln
            .risk_factors
            .as_ref()
            .map(|v| v.to_string())
            .unwrap_or_default(),
        publish_date,
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn dockerfile_reconstruction_orders_and_rewrites_steps() {
        let history = vec![
            "/bin/sh -c #(nop)  CMD [\"nginx\" \"-g\" \"daemon off;\"]",
            "/bin/sh -c apt-get update && apt-get install -y nginx",
            "/bin/sh -c #(nop) ADD file:abc in /",
        ];
        let dockerfile = reconstruct_dockerfile(&history, "nginx:1.21");
        let lines: Vec<&str> = dockerfile.lines().collect();
        assert_eq!(lines[0], "IMAGE nginx:1.21");
        assert_eq!(lines[1], "ADD file:abc in /");
        assert_eq!(lines[2], "RUN /bin/sh -c apt-get update \\");
        assert_eq!(lines[3], "    && apt-get install -y nginx");
        assert_eq!(lines[4], "CMD [\"nginx\" \"-g\" \"daemon off;\"]");
    }

    #[test]
    fn scan_report_parses_with_optional_fields_absent() {
        let json = r#"{
            "results": [{
                "vulnerabilityDistribution": {"total": 1, "critical": 0, "high": 1, "medium": 0, "low": 0},
                "vulnerabilities": [{
                    "id": "CVE-2021-1234",
                    "severity": "high",
                    "packageName": "openssl",
                    "packageVersion": "1.1.1"
                }]
            }]
        }"#;
        let report = parse_scan_result(json).unwrap();
        let vuln = &report.results[0].vulnerabilities[0];
        assert_eq!(vuln.status, "open");
        assert_eq!(vuln.published_days, 0);
        assert!(vuln.cvss.is_none());
    }

    #[test]
    fn empty_results_are_rejected() {
        assert!(parse_scan_result(r#"{"results": []}"#).is_err());
    }

    #[test]
    fn vulnerability_rows_carry_image_identity() {
        let image = ImageRef::new("nginx", "1.21");
        let vuln = Vulnerability {
            id: "CVE-1".into(),
            status: "open".into(),
            severity: "low".into(),
            package_name: "zlib".into(),
            package_version: "1.2".into(),
            link: String::new(),
            cvss: Some(3.1),
            vector: String::new(),
            description: String::new(),
            risk_factors: None,
            published_days: 10,
        };
        let row = vulnerability_row("org/chart", &image, &vuln);
        assert_eq!(row.combined_name, "org/chart");
        assert_eq!(row.image_name, "nginx");
        assert_eq!(row.cvss, Some(3.1));
        assert_eq!(row.publish_date.len(), 19);
    }
}
