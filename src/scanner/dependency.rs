//! Dependency resolver
//!
//! Lists a chart's declared dependencies by driving the external dependency
//! tool and parsing its tab-separated table. The "no dependencies" warning
//! is the empty-result case, not an error; any other stderr output is
//! surfaced as a warning without discarding what stdout did yield.

use crate::common::command_utils::run_command;
use crate::error::ScanError;
use crate::scanner::ChartDependencyRecord;
use log::{debug, warn};
use std::path::Path;
use std::time::Duration;

/// Ordered mapping of dependency name to record. Insertion order is output
/// order; a duplicate name overwrites in place (last write wins).
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct DependencyList {
    records: Vec<ChartDependencyRecord>,
}

impl DependencyList {
    pub fn insert(&mut self, record: ChartDependencyRecord) {
        match self
            .records
            .iter()
            .position(|r| r.chart_name == record.chart_name)
        {
            Some(pos) => self.records[pos] = record,
            None => self.records.push(record),
        }
    }

    pub fn get(&self, name: &str) -> Option<&ChartDependencyRecord> {
        self.records.iter().find(|r| r.chart_name == name)
    }

    pub fn records(&self) -> &[ChartDependencyRecord] {
        &self.records
    }

    pub fn len(&self) -> usize {
        self.records.len()
    }

    pub fn is_empty(&self) -> bool {
        self.records.is_empty()
    }
}

#[derive(Debug, Clone)]
pub struct DependencyResolver {
    helm_bin: String,
    timeout: Duration,
}

impl DependencyResolver {
    pub fn new(helm_bin: impl Into<String>, timeout: Duration) -> Self {
        Self {
            helm_bin: helm_bin.into(),
            timeout,
        }
    }

    /// List the declared dependencies of the chart at `chart_dir`.
    pub async fn resolve(
        &self,
        chart: &str,
        chart_dir: &Path,
    ) -> std::result::Result<DependencyList, ScanError> {
        let dir = chart_dir.display().to_string();
        let output = run_command(
            &self.helm_bin,
            &["dependency", "list", &dir],
            None,
            self.timeout,
        )
        .await
        .map_err(|e| ScanError::DependencyList {
            chart: chart.to_string(),
            reason: e.to_string(),
        })?;

        let stderr = String::from_utf8_lossy(&output.stderr);
        if !stderr.trim().is_empty() {
            if is_no_dependencies_warning(&stderr) {
                debug!("No declared dependencies for {}: {}", chart, stderr.trim());
            } else {
                warn!(
                    "Error processing dependencies for {} at {}: {}",
                    chart,
                    dir,
                    stderr.trim()
                );
            }
        }

        let deps = parse_dependency_output(&String::from_utf8_lossy(&output.stdout));
        debug!("{} dependencies found for {}", deps.len(), chart);
        Ok(deps)
    }
}

/// A chart with no dependency manifest produces a warning on stderr, e.g.
/// `WARNING: no dependencies at charts/prometheus/charts`. V1 API charts
/// warn about the missing Chart.yaml dependency block instead.
fn is_no_dependencies_warning(stderr: &str) -> bool {
    stderr.contains("no dependencies") || stderr.contains("Warning: Dependencies")
}

/// Parse the dependency tool's tab-separated stdout.
///
/// One row per dependency: name, version, source repository, status. The
/// header row leads with `NAME`; a `WARNING` line means zero dependencies.
pub fn parse_dependency_output(stdout: &str) -> DependencyList {
    let mut deps = DependencyList::default();
    if stdout.contains("WARNING") {
        return deps;
    }

    for line in stdout.lines() {
        if line.is_empty() {
            continue;
        }
        let mut fields = line.split('\t');
        let (name, version, repo, status) = match (
            fields.next(),
            fields.next(),
            fields.next(),
            fields.next(),
        ) {
            (Some(n), Some(v), Some(r), Some(s)) => (n.trim(), v.trim(), r.trim(), s.trim()),
            _ => continue,
        };
        if name == "NAME" {
            continue;
        }
        deps.insert(ChartDependencyRecord {
            chart_name: name.to_string(),
            chart_version: version.to_string(),
            chart_repo: repo.to_string(),
            chart_status: status.to_string(),
        });
    }
    deps
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn parses_a_single_dependency_row() {
        let deps = parse_dependency_output(
            "NAME\tVERSION\tREPOSITORY\tSTATUS\ncommon\t0.0.5\thttps://x/\tunpacked\n",
        );
        assert_eq!(deps.len(), 1);
        let rec = deps.get("common").unwrap();
        assert_eq!(rec.chart_name, "common");
        assert_eq!(rec.chart_version, "0.0.5");
        assert_eq!(rec.chart_repo, "https://x/");
        assert_eq!(rec.chart_status, "unpacked");
    }

    #[test]
    fn warning_output_means_zero_dependencies() {
        let deps =
            parse_dependency_output("WARNING: no dependencies at charts/prometheus/charts\n");
        assert!(deps.is_empty());
    }

    #[test]
    fn empty_output_means_zero_dependencies() {
        assert!(parse_dependency_output("").is_empty());
    }

    #[test]
    fn preserves_order_and_overwrites_duplicates_in_place() {
        let deps = parse_dependency_output(
            "NAME\tVERSION\tREPOSITORY\tSTATUS\n\
             redis\t16.0.0\thttps://a/\tunpacked\n\
             common\t0.0.5\thttps://x/\tunpacked\n\
             redis\t17.0.0\thttps://b/\tok\n",
        );
        assert_eq!(deps.len(), 2);
        let names: Vec<&str> = deps.records().iter().map(|r| r.chart_name.as_str()).collect();
        assert_eq!(names, vec!["redis", "common"]);
        assert_eq!(deps.get("redis").unwrap().chart_version, "17.0.0");
    }

    #[test]
    fn short_rows_are_skipped() {
        let deps = parse_dependency_output("NAME\tVERSION\tREPOSITORY\tSTATUS\nbroken-row\n");
        assert!(deps.is_empty());
    }

    #[test]
    fn stderr_classification() {
        assert!(is_no_dependencies_warning(
            "WARNING: no dependencies at helm-charts/charts/kafka/charts\n"
        ));
        assert!(is_no_dependencies_warning(
            "Warning: Dependencies are handled in Chart.yaml since apiVersion \"v2\"\n"
        ));
        assert!(!is_no_dependencies_warning("Error: not a chart directory\n"));
    }
}
