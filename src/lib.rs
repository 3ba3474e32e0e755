//! # Chartscan CLI
//!
//! A Rust-based command-line application that discovers Helm chart packages
//! published on a public chart registry, downloads each chart, statically
//! scans it for misconfigurations, scans the container images it references
//! for vulnerabilities, resolves inter-chart dependencies, and emits tabular
//! reports with optional upload to S3.
//!
//! ## Features
//!
//! - **Registry Crawling**: Walks the registry search API to find every
//!   published chart repository and package
//! - **Concurrent Scanning**: Bounded worker pool over organizations, with a
//!   nested pool over each chart's container images
//! - **Failure Isolation**: A failure in one chart or one image never takes
//!   down a sibling; every chart always yields a summary row
//! - **Dependency Statistics**: Run-wide dependency usage counts and
//!   reverse-dependency lists aggregated across all workers
//!
//! ## Example
//!
//! ```rust,no_run
//! use chartscan_cli::scanner::{DependencyAggregator, ScanPipeline};
//! use chartscan_cli::config::Config;
//! use std::sync::Arc;
//!
//! # async fn run() -> chartscan_cli::Result<()> {
//! let config = Config::default();
//! let aggregator = Arc::new(DependencyAggregator::new());
//! let _pipeline = ScanPipeline::new(&config, "./results/now".into(), aggregator, None)?;
//! # Ok(())
//! # }
//! ```

pub mod cli;
pub mod collect;
pub mod common;
pub mod config;
pub mod error;
pub mod handlers;
pub mod report;
pub mod scanner;

// Re-export commonly used types and functions
pub use error::{Result, ScannerError};
pub use scanner::{DependencyAggregator, ScanPipeline, WorkerPool, current_run_timestamp};
use cli::Commands;

/// The current version of the CLI tool
pub const VERSION: &str = env!("CARGO_PKG_VERSION");

pub async fn run_command(command: Commands, config: config::Config) -> Result<()> {
    match command {
        Commands::Scan {
            snapshot,
            results_dir,
            workers,
            upload,
        } => {
            handlers::handle_scan(
                config,
                handlers::scan::ScanOptions {
                    snapshot,
                    results_dir,
                    workers,
                    force_upload: upload,
                },
            )
            .await
        }
        Commands::Crawl { output } => handlers::handle_crawl(config, output).await,
    }
}
