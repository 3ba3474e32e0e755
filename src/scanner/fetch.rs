//! Chart fetch & unpack
//!
//! Downloads a chart archive to its per-chart directory and unpacks it,
//! recursively unpacking any archive found inside (archive-within-archive).
//! Recursion depth is capped so a crafted chart cannot exhaust the worker
//! through unbounded nesting.

use crate::error::{Result, ScanError};
use flate2::read::GzDecoder;
use log::debug;
use std::fs::File;
use std::path::{Path, PathBuf};
use tar::Archive;

#[derive(Debug, Clone)]
pub struct ChartFetcher {
    client: reqwest::Client,
    max_archive_depth: usize,
}

impl ChartFetcher {
    pub fn new(client: reqwest::Client, max_archive_depth: usize) -> Self {
        Self {
            client,
            max_archive_depth,
        }
    }

    /// Download a chart's content URL into `dest_dir` and return the archive
    /// path. Network errors, non-2xx responses, and disk errors all surface
    /// as `ScanError::Download` - chart-fatal for the caller.
    pub async fn download_chart(
        &self,
        chart: &str,
        content_url: &str,
        dest_dir: &Path,
    ) -> std::result::Result<PathBuf, ScanError> {
        let download = |reason: String| ScanError::Download {
            chart: chart.to_string(),
            reason,
        };

        tokio::fs::create_dir_all(dest_dir)
            .await
            .map_err(|e| download(e.to_string()))?;

        debug!("Downloading {} from {}", chart, content_url);
        let response = self
            .client
            .get(content_url)
            .send()
            .await
            .and_then(|r| r.error_for_status())
            .map_err(|e| download(e.to_string()))?;

        let file_name = archive_file_name(content_url);
        let archive_path = dest_dir.join(file_name);
        let body = response.bytes().await.map_err(|e| download(e.to_string()))?;
        tokio::fs::write(&archive_path, &body)
            .await
            .map_err(|e| download(e.to_string()))?;

        Ok(archive_path)
    }

    /// Unpack every `.tgz` directly under `dir`, recursing into nested
    /// archives. Successfully extracted archives are removed. Blocking;
    /// callers run it on a blocking thread.
    pub fn extract_archives(&self, chart: &str, dir: &Path) -> std::result::Result<(), ScanError> {
        let pattern = format!("{}/*.tgz", dir.display());
        let paths = glob::glob(&pattern)
            .map_err(|e| ScanError::Extract {
                chart: chart.to_string(),
                reason: e.to_string(),
            })?
            .flatten();

        for archive in paths {
            extract_archive(chart, &archive, dir, 0, self.max_archive_depth)?;
            std::fs::remove_file(&archive).map_err(|e| ScanError::Extract {
                chart: chart.to_string(),
                reason: e.to_string(),
            })?;
        }
        Ok(())
    }
}

fn archive_file_name(content_url: &str) -> String {
    content_url
        .rsplit('/')
        .next()
        .filter(|n| !n.is_empty())
        .unwrap_or("chart.tgz")
        .to_string()
}

fn is_nested_archive(path: &Path) -> bool {
    matches!(
        path.extension().and_then(|e| e.to_str()),
        Some("tgz") | Some("tar")
    )
}

/// Unpack one archive into `dest`, then recurse into any archive the unpack
/// produced. A nested archive is unpacked next to where it sits, into the
/// directory derived from its own name, and removed afterwards.
fn extract_archive(
    chart: &str,
    archive: &Path,
    dest: &Path,
    depth: usize,
    max_depth: usize,
) -> std::result::Result<(), ScanError> {
    if depth >= max_depth {
        return Err(ScanError::ArchiveDepthExceeded {
            chart: chart.to_string(),
            max_depth,
        });
    }

    let extract = |reason: String| ScanError::Extract {
        chart: chart.to_string(),
        reason,
    };

    debug!("Extracting {} into {}", archive.display(), dest.display());
    let file = File::open(archive).map_err(|e| extract(e.to_string()))?;

    let mut nested: Vec<PathBuf> = Vec::new();
    let gzipped = archive.extension().and_then(|e| e.to_str()) != Some("tar");
    if gzipped {
        let mut tar = Archive::new(GzDecoder::new(file));
        unpack_entries(&mut tar, dest, &mut nested).map_err(|e| extract(e.to_string()))?;
    } else {
        let mut tar = Archive::new(file);
        unpack_entries(&mut tar, dest, &mut nested).map_err(|e| extract(e.to_string()))?;
    }

    for inner in nested {
        let inner_path = dest.join(&inner);
        if !inner_path.exists() {
            continue;
        }
        let inner_dest = inner_path
            .parent()
            .map(Path::to_path_buf)
            .unwrap_or_else(|| dest.to_path_buf());
        extract_archive(chart, &inner_path, &inner_dest, depth + 1, max_depth)?;
        std::fs::remove_file(&inner_path).map_err(|e| extract(e.to_string()))?;
    }
    Ok(())
}

fn unpack_entries<R: std::io::Read>(
    tar: &mut Archive<R>,
    dest: &Path,
    nested: &mut Vec<PathBuf>,
) -> std::io::Result<()> {
    for entry in tar.entries()? {
        let mut entry = entry?;
        let path = entry.path()?.to_path_buf();
        if is_nested_archive(&path) {
            nested.push(path.clone());
        }
        entry.unpack_in(dest)?;
    }
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use flate2::Compression;
    use flate2::write::GzEncoder;

    fn build_tgz(entries: &[(&str, &[u8])]) -> Vec<u8> {
        let encoder = GzEncoder::new(Vec::new(), Compression::default());
        let mut builder = tar::Builder::new(encoder);
        for (name, content) in entries {
            let mut header = tar::Header::new_gnu();
            header.set_size(content.len() as u64);
            header.set_mode(0o644);
            header.set_cksum();
            builder.append_data(&mut header, name, *content).unwrap();
        }
        builder.into_inner().unwrap().finish().unwrap()
    }

    fn fetcher() -> ChartFetcher {
        ChartFetcher::new(reqwest::Client::new(), 4)
    }

    #[test]
    fn extracts_nested_archive_within_archive() {
        let dir = tempfile::tempdir().unwrap();
        let inner = build_tgz(&[("mychart/charts/common/Chart.yaml", b"name: common\n")]);
        let outer = build_tgz(&[
            ("mychart/Chart.yaml", b"name: mychart\n"),
            ("mychart/charts/common.tgz", inner.as_slice()),
        ]);
        std::fs::write(dir.path().join("mychart-1.0.0.tgz"), outer).unwrap();

        fetcher().extract_archives("org/mychart", dir.path()).unwrap();

        assert!(dir.path().join("mychart/Chart.yaml").exists());
        // nested archive was unpacked next to where it sat, and removed
        assert!(
            dir.path()
                .join("mychart/charts/mychart/charts/common/Chart.yaml")
                .exists()
        );
        assert!(!dir.path().join("mychart/charts/common.tgz").exists());
        assert!(!dir.path().join("mychart-1.0.0.tgz").exists());
    }

    #[test]
    fn nesting_past_the_cap_is_an_extract_failure() {
        let dir = tempfile::tempdir().unwrap();
        // depth 5 nesting against a cap of 4
        let mut archive = build_tgz(&[("payload.txt", b"x")]);
        for level in 0..5 {
            archive = build_tgz(&[(format!("level{}/inner.tgz", level).as_str(), archive.as_slice())]);
        }
        std::fs::write(dir.path().join("bomb.tgz"), archive).unwrap();

        let err = fetcher()
            .extract_archives("org/bomb", dir.path())
            .unwrap_err();
        assert!(matches!(err, ScanError::ArchiveDepthExceeded { max_depth: 4, .. }));
    }

    #[test]
    fn archive_file_name_falls_back() {
        assert_eq!(archive_file_name("https://x/charts/redis-1.2.3.tgz"), "redis-1.2.3.tgz");
        assert_eq!(archive_file_name("https://x/charts/"), "chart.tgz");
    }
}
