use serde::{Deserialize, Serialize};
use std::path::PathBuf;

/// Main configuration structure
#[derive(Debug, Clone, Serialize, Deserialize, Default)]
#[serde(default)]
pub struct Config {
    pub registry: RegistryConfig,
    pub scanner: ScannerConfig,
    pub upload: UploadConfig,
}

/// Chart registry (crawler) configuration
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct RegistryConfig {
    /// Base URL of the registry API
    pub api_url: String,
    /// API token. Usually left unset here and supplied via ARTIFACTHUB_TOKEN.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub token: Option<String>,
    /// Page size for the per-repository package search
    pub page_limit: u32,
}

/// Scan pipeline configuration
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct ScannerConfig {
    /// Root directory for per-run results
    pub results_dir: PathBuf,
    /// Worker count for the org-level fan-out. Defaults to half the CPUs.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub workers: Option<usize>,
    /// Worker count for the per-chart image fan-out
    #[serde(skip_serializing_if = "Option::is_none")]
    pub image_workers: Option<usize>,
    pub helm_bin: String,
    pub docker_bin: String,
    /// Static policy engine binary (checkov-compatible JSON output)
    pub policy_bin: String,
    /// Container image scanner binary (twistcli-compatible JSON output)
    pub image_scanner_bin: String,
    /// Per-subprocess timeout. An unbounded hang in one worker must not
    /// stall the whole pool.
    pub command_timeout_secs: u64,
    /// HTTP request timeout for downloads and registry calls
    pub http_timeout_secs: u64,
    /// Nested-archive recursion cap
    pub max_archive_depth: usize,
}

/// Result upload configuration
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct UploadConfig {
    /// Destination bucket. Usually left unset here and supplied via RESULT_BUCKET.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub bucket: Option<String>,
    /// Rename files to `<name>.uploaded` after a successful put so a
    /// restarted run does not re-upload them
    pub mark_uploaded: bool,
}

impl Default for RegistryConfig {
    fn default() -> Self {
        Self {
            api_url: "https://artifacthub.io/api/v1".to_string(),
            token: None,
            page_limit: 60,
        }
    }
}

impl Default for UploadConfig {
    fn default() -> Self {
        Self {
            bucket: None,
            mark_uploaded: true,
        }
    }
}

impl Default for ScannerConfig {
    fn default() -> Self {
        Self {
            results_dir: PathBuf::from("./results"),
            workers: None,
            image_workers: None,
            helm_bin: "helm".to_string(),
            docker_bin: "docker".to_string(),
            policy_bin: "checkov".to_string(),
            image_scanner_bin: "twistcli".to_string(),
            command_timeout_secs: 300,
            http_timeout_secs: 120,
            max_archive_depth: 8,
        }
    }
}

impl Config {
    /// Registry token with the environment override applied
    pub fn registry_token(&self) -> Option<String> {
        std::env::var("ARTIFACTHUB_TOKEN")
            .ok()
            .filter(|t| !t.is_empty())
            .or_else(|| self.registry.token.clone())
    }

    /// Upload bucket with the environment override applied
    pub fn upload_bucket(&self) -> Option<String> {
        std::env::var("RESULT_BUCKET")
            .ok()
            .filter(|b| !b.is_empty())
            .or_else(|| self.upload.bucket.clone())
    }
}
