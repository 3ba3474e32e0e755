//! S3 result upload
//!
//! Pushes every produced tabular and Dockerfile artifact to a bucket, keyed
//! by the run timestamp. Per-file failures are logged and never block the
//! remaining files. Optionally marks uploaded files on disk so a restarted
//! run does not re-upload them.

use crate::error::ReportError;
use aws_sdk_s3::primitives::ByteStream;
use log::{info, warn};
use std::path::{Path, PathBuf};
use walkdir::WalkDir;

const UPLOADED_SUFFIX: &str = "uploaded";

pub struct ResultUploader {
    client: aws_sdk_s3::Client,
    bucket: String,
    scan_time: String,
    mark_uploaded: bool,
}

impl ResultUploader {
    pub async fn new(bucket: String, scan_time: String, mark_uploaded: bool) -> Self {
        let aws_config = aws_config::load_defaults(aws_config::BehaviorVersion::latest()).await;
        Self {
            client: aws_sdk_s3::Client::new(&aws_config),
            bucket,
            scan_time,
            mark_uploaded,
        }
    }

    /// Upload every eligible file under `results_path`. Returns the number
    /// of files uploaded; failures are logged per file.
    pub async fn upload_results(&self, results_path: &Path) -> usize {
        let mut uploaded = 0usize;
        for file in collect_uploadable(results_path) {
            match self.upload_file(results_path, &file).await {
                Ok(()) => {
                    uploaded += 1;
                    if self.mark_uploaded
                        && let Err(e) = mark_file_uploaded(&file)
                    {
                        warn!("Failed to mark {} as uploaded: {}", file.display(), e);
                    }
                }
                Err(e) => warn!("{}", e),
            }
        }
        info!(
            "Uploaded {} file(s) to {} for run {}",
            uploaded, self.bucket, self.scan_time
        );
        uploaded
    }

    async fn upload_file(&self, results_path: &Path, file: &Path) -> Result<(), ReportError> {
        let key = object_key(&self.scan_time, results_path, file);
        let upload_err = |reason: String| ReportError::Upload {
            key: key.clone(),
            reason,
        };

        let body = ByteStream::from_path(file)
            .await
            .map_err(|e| upload_err(e.to_string()))?;
        self.client
            .put_object()
            .bucket(&self.bucket)
            .key(&key)
            .body(body)
            .send()
            .await
            .map_err(|e| upload_err(e.to_string()))?;
        info!("Uploaded {}", key);
        Ok(())
    }
}

/// Every CSV table and reconstructed Dockerfile under the results tree that
/// has not already been marked uploaded.
pub fn collect_uploadable(results_path: &Path) -> Vec<PathBuf> {
    WalkDir::new(results_path)
        .into_iter()
        .flatten()
        .filter(|entry| entry.file_type().is_file())
        .map(|entry| entry.into_path())
        .filter(|path| is_uploadable(path))
        .collect()
}

fn is_uploadable(path: &Path) -> bool {
    if path.extension().and_then(|e| e.to_str()) == Some(UPLOADED_SUFFIX) {
        return false;
    }
    let Some(name) = path.file_name().and_then(|n| n.to_str()) else {
        return false;
    };
    name.to_lowercase().ends_with(".csv") || name.starts_with("Dockerfile")
}

fn object_key(scan_time: &str, results_path: &Path, file: &Path) -> String {
    let relative = file.strip_prefix(results_path).unwrap_or(file);
    let relative = relative
        .components()
        .map(|c| c.as_os_str().to_string_lossy())
        .collect::<Vec<_>>()
        .join("/");
    format!("results/{}/{}", scan_time, relative)
}

fn mark_file_uploaded(file: &Path) -> std::io::Result<()> {
    let mut marked = file.as_os_str().to_owned();
    marked.push(".");
    marked.push(UPLOADED_SUFFIX);
    std::fs::rename(file, PathBuf::from(marked))
}
