//! ArtifactHub chart crawler
//!
//! Walks the registry's repository search API to find every chart
//! repository, queries each repository for its packages, and resolves each
//! package to its latest version and direct download URL. A broken repo or
//! package is logged and skipped - one publisher can never abort a crawl.
//!
//! The finished crawl is persisted as a JSON snapshot, which `scan
//! --snapshot` replays instead of hitting the network again.

use crate::config::Config;
use crate::error::{ConfigError, Result, ScannerError};
use crate::scanner::{ChartPackage, RepoDescriptor, RepoRaw};
use log::{info, warn};
use serde::{Deserialize, Serialize};
use std::path::Path;

const API_KEY_HEADER: &str = "X-API-KEY";

/// Everything one crawl discovered.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct CrawlResult {
    pub repos: Vec<RepoDescriptor>,
    pub total_repos: usize,
    pub total_packages: usize,
}

#[derive(Debug, Deserialize)]
struct RawRepository {
    name: String,
    #[serde(default)]
    organization_name: Option<String>,
    #[serde(default)]
    user_alias: Option<String>,
    #[serde(flatten)]
    raw: RepoRaw,
}

#[derive(Debug, Deserialize)]
struct PackageSearchResponse {
    data: PackageSearchData,
}

#[derive(Debug, Deserialize)]
struct PackageSearchData {
    #[serde(default)]
    packages: Vec<PackageStub>,
}

#[derive(Debug, Deserialize)]
struct PackageStub {
    name: String,
}

pub struct ArtifactHubCrawler {
    client: reqwest::Client,
    api_url: String,
    token: String,
    page_limit: u32,
}

impl ArtifactHubCrawler {
    pub fn new(config: &Config) -> Result<Self> {
        let token = config
            .registry_token()
            .ok_or(ConfigError::MissingRegistryToken)?;
        let client = reqwest::Client::builder()
            .timeout(std::time::Duration::from_secs(
                config.scanner.http_timeout_secs,
            ))
            .build()?;
        Ok(Self {
            client,
            api_url: config.registry.api_url.trim_end_matches('/').to_string(),
            token,
            page_limit: config.registry.page_limit,
        })
    }

    /// Crawl every chart repository and its packages.
    pub async fn crawl(&self) -> Result<CrawlResult> {
        info!("Chart registry crawl started");
        let raw_repos: Vec<serde_json::Value> = self
            .client
            .get(format!("{}/repositories/helm", self.api_url))
            .header(API_KEY_HEADER, &self.token)
            .send()
            .await?
            .error_for_status()
            .map_err(|e| ScannerError::Crawl {
                reason: e.to_string(),
            })?
            .json()
            .await?;

        let total_repos = raw_repos.len();
        info!("Found {} chart repositories", total_repos);

        let mut repos: Vec<RepoDescriptor> = Vec::new();
        let mut total_packages = 0usize;
        for (index, raw_value) in raw_repos.into_iter().enumerate() {
            let repo: RawRepository = match serde_json::from_value(raw_value) {
                Ok(repo) => repo,
                Err(e) => {
                    warn!("Skipping malformed repository entry: {}", e);
                    continue;
                }
            };
            let org_name = repo
                .organization_name
                .clone()
                .or_else(|| repo.user_alias.clone())
                .unwrap_or_default();

            info!(
                "{}/{} | Processing repo {} by {}",
                index + 1,
                total_repos,
                repo.name,
                org_name
            );
            let packages = match self.crawl_repo_packages(&repo.name).await {
                Ok(packages) => packages,
                Err(e) => {
                    warn!("Skipping repo {}: {}", repo.name, e);
                    continue;
                }
            };
            total_packages += packages.len();
            repos.push(RepoDescriptor {
                repo_name: repo.name,
                repo_org_name: org_name,
                repo_raw: repo.raw,
                repo_packages: packages,
            });
        }

        Ok(CrawlResult {
            repos,
            total_repos,
            total_packages,
        })
    }

    /// Packages of one repository, each resolved through the detail
    /// endpoint for its latest version and content URL.
    async fn crawl_repo_packages(&self, repo_name: &str) -> Result<Vec<ChartPackage>> {
        let search_url = format!(
            "{}/packages/search?limit={}&facets=false&kind=0&repo={}",
            self.api_url, self.page_limit, repo_name
        );
        let search: PackageSearchResponse = self
            .client
            .get(search_url)
            .header(API_KEY_HEADER, &self.token)
            .send()
            .await?
            .error_for_status()?
            .json()
            .await?;

        let mut packages = Vec::with_capacity(search.data.packages.len());
        for stub in search.data.packages {
            let detail_url = format!(
                "{}/packages/helm/{}/{}",
                self.api_url, repo_name, stub.name
            );
            match self.fetch_package_detail(&detail_url).await {
                Ok(package) => {
                    info!(
                        "Chart {} latest version {} at {}",
                        package.name, package.version, package.content_url
                    );
                    packages.push(package);
                }
                Err(e) => warn!("Skipping package {}/{}: {}", repo_name, stub.name, e),
            }
        }
        Ok(packages)
    }

    async fn fetch_package_detail(&self, url: &str) -> Result<ChartPackage> {
        let package = self
            .client
            .get(url)
            .header(API_KEY_HEADER, &self.token)
            .send()
            .await?
            .error_for_status()?
            .json()
            .await?;
        Ok(package)
    }
}

/// Persist a crawl for later replay.
pub fn save_snapshot(path: &Path, crawl: &CrawlResult) -> Result<()> {
    let json = serde_json::to_string_pretty(crawl)?;
    std::fs::write(path, json)?;
    info!("Crawl snapshot written to {}", path.display());
    Ok(())
}

/// Replay a previously saved crawl instead of hitting the registry.
pub fn load_snapshot(path: &Path) -> Result<CrawlResult> {
    let content = std::fs::read_to_string(path)?;
    let crawl: CrawlResult = serde_json::from_str(&content)?;
    info!(
        "Loaded crawl snapshot: {} repo(s), {} package(s)",
        crawl.repos.len(),
        crawl.total_packages
    );
    Ok(crawl)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn snapshot_round_trips() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("crawl-snapshot.json");
        let crawl = CrawlResult {
            repos: vec![RepoDescriptor {
                repo_name: "bitnami".into(),
                repo_org_name: "bitnami".into(),
                repo_raw: RepoRaw::default(),
                repo_packages: vec![ChartPackage {
                    name: "redis".into(),
                    version: "17.0.1".into(),
                    content_url: "https://x/redis.tgz".into(),
                    ts: 1,
                    signed: None,
                    security_report_created_at: None,
                    is_operator: None,
                }],
            }],
            total_repos: 1,
            total_packages: 1,
        };

        save_snapshot(&path, &crawl).unwrap();
        let loaded = load_snapshot(&path).unwrap();
        assert_eq!(loaded.repos.len(), 1);
        assert_eq!(loaded.repos[0].repo_packages[0].name, "redis");
    }

    #[test]
    fn repository_entry_falls_back_to_user_alias() {
        let json = r#"{
            "name": "community-charts",
            "user_alias": "someone",
            "repository_id": "id-1",
            "verified_publisher": false,
            "official": false,
            "scanner_disabled": false
        }"#;
        let repo: RawRepository = serde_json::from_str(json).unwrap();
        assert!(repo.organization_name.is_none());
        assert_eq!(repo.user_alias.as_deref(), Some("someone"));
        assert_eq!(repo.raw.repository_id, "id-1");
    }
}
