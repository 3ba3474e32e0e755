//! Global dependency aggregator
//!
//! Process-wide accumulator of cross-chart dependency usage. One instance is
//! created per run and handed to every orchestrator task; it is the only
//! mutable state shared across workers. Write-once-per-edge, read-at-end.

use parking_lot::Mutex;
use std::collections::HashMap;

/// Usage of one dependency key across the whole run.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct DependencyUsage {
    /// Number of dependency edges observed for this key
    pub count: u64,
    /// Dependent chart identities in call order. One entry per edge, not
    /// deduplicated: the same chart may depend on the same dependency more
    /// than once across versions.
    pub dependents: Vec<String>,
}

#[derive(Debug, Default)]
pub struct DependencyAggregator {
    inner: Mutex<HashMap<String, DependencyUsage>>,
}

impl DependencyAggregator {
    pub fn new() -> Self {
        Self::default()
    }

    /// Normalized key for one dependency: `sourceRepoURL/chartName`.
    pub fn normalized_key(source_repo: &str, chart_name: &str) -> String {
        format!("{}/{}", source_repo.trim_end_matches('/'), chart_name)
    }

    /// Record one dependency edge. Count increment and dependent append
    /// happen under one lock so the two views can never disagree.
    pub fn record_edge(&self, dependent: &str, key: &str) {
        let mut map = self.inner.lock();
        let usage = map.entry(key.to_string()).or_default();
        usage.count += 1;
        usage.dependents.push(dependent.to_string());
    }

    /// Number of distinct dependency keys observed so far
    pub fn len(&self) -> usize {
        self.inner.lock().len()
    }

    pub fn is_empty(&self) -> bool {
        self.inner.lock().is_empty()
    }

    /// Snapshot for the end-of-run flush, sorted by key so the emitted
    /// tables have a stable shape across runs.
    pub fn snapshot(&self) -> Vec<(String, DependencyUsage)> {
        let map = self.inner.lock();
        let mut entries: Vec<(String, DependencyUsage)> =
            map.iter().map(|(k, v)| (k.clone(), v.clone())).collect();
        entries.sort_by(|a, b| a.0.cmp(&b.0));
        entries
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn key_normalization_strips_trailing_slash() {
        assert_eq!(
            DependencyAggregator::normalized_key("https://charts.example.com/", "common"),
            "https://charts.example.com/common"
        );
        assert_eq!(
            DependencyAggregator::normalized_key("https://x", "redis"),
            "https://x/redis"
        );
    }

    #[test]
    fn duplicate_edges_are_counted_not_deduplicated() {
        let agg = DependencyAggregator::new();
        let key = DependencyAggregator::normalized_key("https://x", "common");
        agg.record_edge("org/chart-a", &key);
        agg.record_edge("org/chart-a", &key);
        agg.record_edge("org/chart-b", &key);

        let snapshot = agg.snapshot();
        assert_eq!(snapshot.len(), 1);
        let (_, usage) = &snapshot[0];
        assert_eq!(usage.count, 3);
        assert_eq!(
            usage.dependents,
            vec!["org/chart-a", "org/chart-a", "org/chart-b"]
        );
    }

    #[test]
    fn snapshot_is_sorted_by_key() {
        let agg = DependencyAggregator::new();
        agg.record_edge("d", "https://b/chart");
        agg.record_edge("d", "https://a/chart");
        let keys: Vec<String> = agg.snapshot().into_iter().map(|(k, _)| k).collect();
        assert_eq!(keys, vec!["https://a/chart", "https://b/chart"]);
    }
}
