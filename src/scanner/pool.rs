//! Worker pool / fan-out scheduler
//!
//! Bounded fan-out over a fixed, pre-enumerated batch of work items. All
//! items are submitted up front; the pool waits for every unit of work to
//! finish before returning. A failure in one item never cancels the others,
//! but failures are collected and surfaced to the caller once the batch has
//! drained.
//!
//! Used at two levels: once across all discovered chart organizations, and
//! nested once per chart across that chart's extracted image references.

use crate::error::{Result, ScanError};
use log::{info, warn};
use std::future::Future;
use std::sync::Arc;
use std::sync::atomic::{AtomicBool, Ordering};
use tokio::sync::Semaphore;
use tokio::task::JoinSet;

static SHUTDOWN: AtomicBool = AtomicBool::new(false);

/// Request a graceful shutdown: items not yet started are skipped, in-flight
/// items run to completion so already-written files are never left corrupt.
pub fn request_shutdown() {
    SHUTDOWN.store(true, Ordering::SeqCst);
}

pub fn shutdown_requested() -> bool {
    SHUTDOWN.load(Ordering::SeqCst)
}

/// Install a Ctrl-C handler that flips the shutdown flag.
pub fn install_shutdown_handler() {
    tokio::spawn(async {
        if tokio::signal::ctrl_c().await.is_ok() {
            warn!("Interrupt received - finishing in-flight work, submitting nothing new");
            request_shutdown();
        }
    });
}

/// Default worker count: half of the available execution units, minimum 1.
pub fn default_workers() -> usize {
    std::cmp::max(1, num_cpus::get().div_ceil(2))
}

#[derive(Debug, Clone, Copy)]
pub struct WorkerPool {
    workers: usize,
}

impl WorkerPool {
    pub fn new(workers: usize) -> Self {
        Self {
            workers: std::cmp::max(1, workers),
        }
    }

    pub fn with_default_workers() -> Self {
        let workers = default_workers();
        info!("Creating {} workers from {} CPUs", workers, num_cpus::get());
        Self { workers }
    }

    pub fn workers(&self) -> usize {
        self.workers
    }

    /// Run `task` over every item with bounded concurrency.
    ///
    /// Every item is spawned before any result is awaited; the semaphore is
    /// the only backpressure. Per-item failures (and panics) are collected
    /// and reported after the whole batch has finished.
    pub async fn run<T, F, Fut>(&self, items: Vec<T>, task: F) -> Result<()>
    where
        T: Send + 'static,
        F: Fn(T) -> Fut + Clone + Send + 'static,
        Fut: Future<Output = Result<()>> + Send + 'static,
    {
        let semaphore = Arc::new(Semaphore::new(self.workers));
        let mut set = JoinSet::new();

        for item in items {
            let semaphore = Arc::clone(&semaphore);
            let task = task.clone();
            set.spawn(async move {
                if shutdown_requested() {
                    return Ok(());
                }
                // Semaphore is never closed, so acquire cannot fail
                let _permit = semaphore.acquire_owned().await.ok();
                task(item).await
            });
        }

        let mut failed = 0usize;
        let mut first_failure: Option<String> = None;
        while let Some(joined) = set.join_next().await {
            let failure = match joined {
                Ok(Ok(())) => None,
                Ok(Err(e)) => Some(e.to_string()),
                Err(e) => Some(format!("worker panicked: {}", e)),
            };
            if let Some(reason) = failure {
                warn!("Worker task failed: {}", reason);
                failed += 1;
                first_failure.get_or_insert(reason);
            }
        }

        match first_failure {
            None => Ok(()),
            Some(first) => Err(ScanError::WorkerPool { failed, first }.into()),
        }
    }
}
