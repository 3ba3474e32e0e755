//! Run timestamp
//!
//! Computed once at process start, shared read-only by every component.
//! Embedded in every report row and every output path so all artifacts of
//! one run correlate across sinks.

use chrono::Utc;
use once_cell::sync::Lazy;

static RUN_TIMESTAMP: Lazy<String> =
    Lazy::new(|| Utc::now().format("%Y-%m-%dT%H:%M:%S").to_string());

/// The timestamp for the current run. Stable for the process lifetime.
pub fn current_run_timestamp() -> &'static str {
    &RUN_TIMESTAMP
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn stable_within_a_process() {
        let first = current_run_timestamp();
        let second = current_run_timestamp();
        assert_eq!(first, second);
        // shape: 2021-05-04T12:33:51
        assert_eq!(first.len(), 19);
        assert_eq!(&first[4..5], "-");
        assert_eq!(&first[10..11], "T");
    }
}
