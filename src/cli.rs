use clap::{Parser, Subcommand};
use std::path::PathBuf;

#[derive(Parser)]
#[command(name = "chartscan")]
#[command(version = env!("CARGO_PKG_VERSION"))]
#[command(about = "Scan public Helm charts for misconfigurations and vulnerable images")]
#[command(
    long_about = "Discovers Helm chart packages on a public chart registry, downloads and unpacks each chart, lists its dependencies, scans the container images it references, runs a static policy scan, and writes tabular reports with optional S3 upload."
)]
pub struct Cli {
    #[command(subcommand)]
    pub command: Commands,

    /// Path to configuration file
    #[arg(short, long, global = true, value_name = "FILE")]
    pub config: Option<PathBuf>,

    /// Enable verbose logging (-v for info, -vv for debug, -vvv for trace)
    #[arg(short, long, global = true, action = clap::ArgAction::Count)]
    pub verbose: u8,

    /// Suppress all output except errors
    #[arg(short, long, global = true)]
    pub quiet: bool,
}

#[derive(Subcommand)]
pub enum Commands {
    /// Crawl the registry (or replay a snapshot) and scan every discovered chart
    Scan {
        /// Replay a crawl snapshot instead of crawling the registry
        #[arg(long, value_name = "FILE")]
        snapshot: Option<PathBuf>,

        /// Override the results directory
        #[arg(long, value_name = "DIR")]
        results_dir: Option<PathBuf>,

        /// Override the org-level worker count
        #[arg(long, value_name = "N")]
        workers: Option<usize>,

        /// Require an upload bucket; complain when none is configured
        #[arg(long)]
        upload: bool,
    },

    /// Crawl the registry and write the snapshot JSON without scanning
    Crawl {
        /// Snapshot destination
        #[arg(short, long, value_name = "FILE", default_value = "crawl-snapshot.json")]
        output: PathBuf,
    },
}

impl Cli {
    /// Initialize logging based on verbosity level
    pub fn init_logging(&self) {
        if self.quiet {
            return;
        }

        let level = match self.verbose {
            0 => log::LevelFilter::Warn,
            1 => log::LevelFilter::Info,
            2 => log::LevelFilter::Debug,
            _ => log::LevelFilter::Trace,
        };

        env_logger::Builder::from_default_env()
            .filter_level(level)
            .init();
    }
}
