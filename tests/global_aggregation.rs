//! Concurrency stress for the run-wide dependency aggregator: many workers
//! recording the same dependency key must never lose an update.

use chartscan_cli::scanner::DependencyAggregator;
use std::sync::Arc;

#[tokio::test(flavor = "multi_thread", worker_threads = 8)]
async fn concurrent_edges_are_never_lost() {
    const TASKS: usize = 64;
    let aggregator = Arc::new(DependencyAggregator::new());
    let key = DependencyAggregator::normalized_key("https://charts.example.com/", "common");

    let mut handles = Vec::with_capacity(TASKS);
    for task in 0..TASKS {
        let aggregator = Arc::clone(&aggregator);
        let key = key.clone();
        handles.push(tokio::spawn(async move {
            aggregator.record_edge(&format!("org/chart-{}", task), &key);
        }));
    }
    for handle in handles {
        handle.await.unwrap();
    }

    let snapshot = aggregator.snapshot();
    assert_eq!(snapshot.len(), 1);
    let (snapshot_key, usage) = &snapshot[0];
    assert_eq!(snapshot_key, "https://charts.example.com/common");
    assert_eq!(usage.count, TASKS as u64);
    assert_eq!(usage.dependents.len(), TASKS);
}

#[tokio::test(flavor = "multi_thread", worker_threads = 8)]
async fn distinct_keys_do_not_interfere() {
    let aggregator = Arc::new(DependencyAggregator::new());

    let mut handles = Vec::new();
    for task in 0..32 {
        let aggregator = Arc::clone(&aggregator);
        handles.push(tokio::spawn(async move {
            let key =
                DependencyAggregator::normalized_key("https://x", &format!("dep-{}", task % 4));
            aggregator.record_edge("org/chart", &key);
        }));
    }
    for handle in handles {
        handle.await.unwrap();
    }

    let snapshot = aggregator.snapshot();
    assert_eq!(snapshot.len(), 4);
    let total: u64 = snapshot.iter().map(|(_, usage)| usage.count).sum();
    assert_eq!(total, 32);
    for (_, usage) in &snapshot {
        assert_eq!(usage.count, 8);
        assert_eq!(usage.dependents.len(), 8);
    }
}
