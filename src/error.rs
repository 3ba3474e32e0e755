//! Error types for the chartscan CLI
//!
//! Failures local to one chart or one image never escape their pipeline
//! stage; these types exist so each stage's failure mode is a value the
//! orchestrator can match on rather than an exception to be swallowed.

use thiserror::Error;

/// Top-level error type for all CLI operations
#[derive(Debug, Error)]
pub enum ScannerError {
    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),

    #[error("HTTP request failed: {0}")]
    Http(#[from] reqwest::Error),

    #[error("JSON error: {0}")]
    Json(#[from] serde_json::Error),

    #[error(transparent)]
    Config(#[from] ConfigError),

    #[error(transparent)]
    Scan(#[from] ScanError),

    #[error(transparent)]
    Report(#[from] ReportError),

    /// Registry crawl failed in a way that prevents the run from starting
    #[error("registry crawl failed: {reason}")]
    Crawl { reason: String },
}

/// Configuration loading and validation errors
#[derive(Debug, Error)]
pub enum ConfigError {
    #[error("failed to parse configuration: {0}")]
    ParsingFailed(String),

    #[error("no registry token configured - set ARTIFACTHUB_TOKEN or [registry] token")]
    MissingRegistryToken,
}

/// Per-stage failures of the chart scan pipeline.
///
/// Only `Download` is chart-fatal; every other variant is recorded and the
/// remaining stages still run for that chart.
#[derive(Debug, Error)]
pub enum ScanError {
    #[error("failed to download {chart}: {reason}")]
    Download { chart: String, reason: String },

    #[error("failed to extract {chart}: {reason}")]
    Extract { chart: String, reason: String },

    #[error("archive nesting in {chart} exceeds depth {max_depth}")]
    ArchiveDepthExceeded { chart: String, max_depth: usize },

    #[error("dependency listing failed for {chart}: {reason}")]
    DependencyList { chart: String, reason: String },

    #[error("template rendering failed for {chart}: {reason}")]
    TemplateRender { chart: String, reason: String },

    #[error("failed to pull image {image}: {reason}")]
    ImagePull { image: String, reason: String },

    #[error("image scan failed for {image}: {reason}")]
    ImageScan { image: String, reason: String },

    #[error("static scan failed for {chart}: {reason}")]
    StaticScan { chart: String, reason: String },

    #[error("`{command}` timed out after {seconds}s")]
    CommandTimeout { command: String, seconds: u64 },

    #[error("{failed} worker task(s) failed; first failure: {first}")]
    WorkerPool { failed: usize, first: String },
}

/// Result sink errors. Logged by callers, never fatal to a run.
#[derive(Debug, Error)]
pub enum ReportError {
    #[error("failed to write {path}: {reason}")]
    Write { path: String, reason: String },

    #[error("failed to upload {key}: {reason}")]
    Upload { key: String, reason: String },
}

/// Result type alias for all CLI operations
pub type Result<T> = std::result::Result<T, ScannerError>;
