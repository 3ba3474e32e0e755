//! CSV table writer
//!
//! One checks table, one summary table, and one dependency table per
//! organization; one global usage table and one global dependents table per
//! run. The header row is written explicitly so an empty table still has a
//! well-formed shape for downstream consumers.

use crate::error::ReportError;
use crate::report::rows::*;
use crate::scanner::DependencyUsage;
use log::info;
use serde::Serialize;
use std::path::Path;

pub fn write_table<S: Serialize>(
    path: &Path,
    headers: &[&str],
    rows: &[S],
) -> Result<(), ReportError> {
    let write_err = |reason: String| ReportError::Write {
        path: path.display().to_string(),
        reason,
    };

    let mut writer = csv::WriterBuilder::new()
        .has_headers(false)
        .from_path(path)
        .map_err(|e| write_err(e.to_string()))?;

    writer
        .write_record(headers)
        .map_err(|e| write_err(e.to_string()))?;
    for row in rows {
        writer.serialize(row).map_err(|e| write_err(e.to_string()))?;
    }
    writer.flush().map_err(|e| write_err(e.to_string()))?;
    Ok(())
}

/// Write the three per-org tables.
pub fn write_org_tables(
    results_path: &Path,
    org_file_name: &str,
    checks: &[CheckRow],
    summaries: &[SummaryRow],
    dependencies: &[DependencyRow],
) -> Result<(), ReportError> {
    write_table(
        &results_path.join(format!("checks-table-{}.csv", org_file_name)),
        CHECK_HEADERS,
        checks,
    )?;
    write_table(
        &results_path.join(format!("summary-table-{}.csv", org_file_name)),
        SUMMARY_HEADERS,
        summaries,
    )?;
    write_table(
        &results_path.join(format!("deps-table-{}.csv", org_file_name)),
        DEPENDENCY_HEADERS,
        dependencies,
    )?;
    info!(
        "Wrote {} check rows, {} summary rows, {} dependency rows for {}",
        checks.len(),
        summaries.len(),
        dependencies.len(),
        org_file_name
    );
    Ok(())
}

/// Flush the global dependency aggregate at run end.
pub fn write_global_tables(
    results_path: &Path,
    snapshot: &[(String, DependencyUsage)],
) -> Result<(), ReportError> {
    let usage_rows: Vec<GlobalUsageRow> = snapshot
        .iter()
        .map(|(key, usage)| GlobalUsageRow {
            dependency: key.clone(),
            usage_count: usage.count,
        })
        .collect();

    let dependent_rows: Vec<GlobalDependentRow> = snapshot
        .iter()
        .flat_map(|(key, usage)| {
            usage.dependents.iter().map(|dependent| GlobalDependentRow {
                dependency: key.clone(),
                dependent: dependent.clone(),
            })
        })
        .collect();

    write_table(
        &results_path.join("global-deps-table.csv"),
        GLOBAL_USAGE_HEADERS,
        &usage_rows,
    )?;
    write_table(
        &results_path.join("global-deps-list.csv"),
        GLOBAL_DEPENDENT_HEADERS,
        &dependent_rows,
    )?;
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;

    fn summary_row() -> SummaryRow {
        SummaryRow {
            run_timestamp: "2024-01-01T00:00:00".into(),
            combined_name: "org/chart".into(),
            repository_name: "org".into(),
            package_name: "chart".into(),
            package_version: "1.0.0".into(),
            package_created_at: "0".into(),
            package_signed: "no data".into(),
            security_report_created_at: "no data".into(),
            helm_chart: "chart".into(),
            is_operator: "no data".into(),
            scan_status: "success".into(),
            passed: 3,
            failed: 1,
            parsing_errors: 0,
        }
    }

    #[test]
    fn header_row_is_written_even_for_empty_tables() {
        let dir = tempfile::tempdir().unwrap();
        write_org_tables(dir.path(), "org", &[], &[], &[]).unwrap();

        let checks = std::fs::read_to_string(dir.path().join("checks-table-org.csv")).unwrap();
        assert!(checks.starts_with("runner timestamp,combined name,"));
        assert_eq!(checks.lines().count(), 1);
    }

    #[test]
    fn summary_rows_round_trip_through_the_file() {
        let dir = tempfile::tempdir().unwrap();
        write_org_tables(dir.path(), "org", &[], &[summary_row()], &[]).unwrap();

        let content =
            std::fs::read_to_string(dir.path().join("summary-table-org.csv")).unwrap();
        let mut lines = content.lines();
        assert!(lines.next().unwrap().ends_with("passed checks,failed checks,parsing errors"));
        let row = lines.next().unwrap();
        assert!(row.starts_with("2024-01-01T00:00:00,org/chart,org,chart,1.0.0"));
        assert!(row.ends_with("success,3,1,0"));
    }

    #[test]
    fn global_tables_expand_dependents_one_row_per_edge() {
        let dir = tempfile::tempdir().unwrap();
        let snapshot = vec![(
            "https://x/common".to_string(),
            DependencyUsage {
                count: 2,
                dependents: vec!["org/a".into(), "org/b".into()],
            },
        )];
        write_global_tables(dir.path(), &snapshot).unwrap();

        let usage = std::fs::read_to_string(dir.path().join("global-deps-table.csv")).unwrap();
        assert!(usage.contains("https://x/common,2"));

        let list = std::fs::read_to_string(dir.path().join("global-deps-list.csv")).unwrap();
        assert!(list.contains("https://x/common,org/a"));
        assert!(list.contains("https://x/common,org/b"));
    }
}
