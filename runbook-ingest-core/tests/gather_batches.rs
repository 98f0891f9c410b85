use std::time::Duration;

use runbook_ingest_core::config::{FailOn, RunPolicy};
use runbook_ingest_core::contract::IngestError;
use runbook_ingest_core::fakes::{InMemoryVcs, MemoryResultStore, ScriptedIngester};
use runbook_ingest_core::gather::{
    gather_outcomes, run_in_batches, store_outcomes, GatherSettings,
};
use runbook_ingest_core::processor::DocumentProcessor;
use runbook_ingest_core::source::DocumentCandidate;
use runbook_ingest_core::trigger::{RunContext, TriggerEvent};
use runbook_ingest_core::BailReason;
use serde_json::Value;
use tokio::time::Instant;

fn context() -> RunContext {
    RunContext {
        repository: "acme/ops".to_string(),
        commit_sha: "abc123".to_string(),
        branch: "master".to_string(),
        tree_id: Some("tree-1".to_string()),
        event: TriggerEvent::SuiteRequested,
    }
}

fn paths(count: usize) -> Vec<String> {
    (0..count)
        .map(|i| format!("svc-{i:02}/runbook.md"))
        .collect()
}

fn repository(paths: &[String]) -> InMemoryVcs {
    paths
        .iter()
        .fold(InMemoryVcs::new("tree-1"), |vcs, path| {
            vcs.with_file(path, "# Runbook")
        })
}

fn candidates(paths: &[String]) -> Vec<DocumentCandidate> {
    paths
        .iter()
        .map(|path| DocumentCandidate {
            path: path.clone(),
            blob_id: InMemoryVcs::blob_id(path),
            content: None,
        })
        .collect()
}

/// Sizes of the groups of calls that started at the same instant.
fn batch_sizes(starts: &[Instant]) -> Vec<usize> {
    let mut sizes: Vec<usize> = Vec::new();
    for (index, start) in starts.iter().enumerate() {
        if index > 0 && starts[index - 1] == *start {
            if let Some(size) = sizes.last_mut() {
                *size += 1;
            }
        } else {
            sizes.push(1);
        }
    }
    sizes
}

#[tokio::test(start_paused = true)]
async fn ingestion_runs_in_capped_batches() {
    let paths = paths(23);
    let vcs = repository(&paths);
    let ingester = ScriptedIngester::new().with_latency(Duration::from_millis(100));
    let policy = RunPolicy::resolve(&Value::Null, FailOn::Any);
    let ctx = context();
    let processor = DocumentProcessor::new(&vcs, &ingester, &policy, &ctx);
    let settings = GatherSettings {
        process_concurrency: 5,
        ..GatherSettings::default()
    };

    let outcomes = gather_outcomes(&processor, &candidates(&paths), &settings, None)
        .await
        .expect("outcomes");

    assert_eq!(outcomes.len(), 23);
    assert!(ingester.max_in_flight() <= 5);
    let starts: Vec<Instant> = ingester.requests().iter().map(|(at, _)| *at).collect();
    assert_eq!(batch_sizes(&starts), vec![5, 5, 5, 5, 3]);

    let gaps: Vec<Duration> = starts
        .windows(2)
        .map(|pair| pair[1] - pair[0])
        .filter(|gap| !gap.is_zero())
        .collect();
    assert!(gaps
        .iter()
        .all(|gap| *gap >= Duration::from_millis(120)));
}

#[tokio::test(start_paused = true)]
async fn throttle_applies_between_batches_only() {
    let items: Vec<u32> = (1..=7).collect();
    let started = Instant::now();

    let doubled = run_in_batches(&items, 3, Duration::from_millis(20), |n| async move {
        Some(n * 2)
    })
    .await;

    assert_eq!(doubled, vec![2, 4, 6, 8, 10, 12, 14]);
    let elapsed = started.elapsed();
    assert!(elapsed >= Duration::from_millis(40), "two pauses expected, got {elapsed:?}");
    assert!(elapsed < Duration::from_millis(60), "no pause after the last batch, got {elapsed:?}");
}

#[tokio::test]
async fn zero_cap_behaves_like_one_and_none_results_are_dropped() {
    let items: Vec<u32> = (1..=4).collect();
    let odd = run_in_batches(&items, 0, Duration::ZERO, |n| async move {
        (n % 2 == 1).then_some(*n)
    })
    .await;
    assert_eq!(odd, vec![1, 3]);
}

#[tokio::test]
async fn dropped_runbooks_shrink_the_outcome_set() {
    let paths = paths(3);
    let vcs = repository(&paths);
    let ingester = ScriptedIngester::new().reply(
        &paths[1],
        Err(IngestError::unexpected("socket hang up")),
    );
    let policy = RunPolicy::resolve(&Value::Null, FailOn::Any);
    let ctx = context();
    let processor = DocumentProcessor::new(&vcs, &ingester, &policy, &ctx);

    let outcomes = gather_outcomes(
        &processor,
        &candidates(&paths),
        &GatherSettings::default(),
        None,
    )
    .await
    .expect("outcomes");

    let kept: Vec<&str> = outcomes.iter().map(|o| o.path.as_str()).collect();
    assert_eq!(kept, vec![paths[0].as_str(), paths[2].as_str()]);
}

#[tokio::test]
async fn nothing_ingested_bails_with_attempt_count() {
    let paths = paths(2);
    let vcs = InMemoryVcs::new("tree-1");
    let ingester = ScriptedIngester::new();
    let policy = RunPolicy::resolve(&Value::Null, FailOn::Any);
    let ctx = context();
    let processor = DocumentProcessor::new(&vcs, &ingester, &policy, &ctx);

    let halt = gather_outcomes(
        &processor,
        &candidates(&paths),
        &GatherSettings::default(),
        None,
    )
    .await
    .unwrap_err();
    assert_eq!(
        halt.bail_reason(),
        Some(&BailReason::NothingIngested { attempted: 2 })
    );
    assert_eq!(halt.to_string(), "run bailed: 0/2 runbooks ingested");
}

#[tokio::test]
async fn storing_bails_only_when_every_write_fails() {
    let paths = paths(2);
    let vcs = repository(&paths);
    let ingester = ScriptedIngester::new();
    let policy = RunPolicy::resolve(&Value::Null, FailOn::Any);
    let ctx = context();
    let processor = DocumentProcessor::new(&vcs, &ingester, &policy, &ctx);
    let settings = GatherSettings::default();
    let outcomes = gather_outcomes(&processor, &candidates(&paths), &settings, None)
        .await
        .expect("outcomes");

    let store = MemoryResultStore::new();
    let stored = store_outcomes(&store, &ctx, &outcomes, &settings)
        .await
        .expect("stored");
    assert_eq!(stored, 2);
    assert_eq!(store.len(), 2);

    let failing = MemoryResultStore::failing();
    let halt = store_outcomes(&failing, &ctx, &outcomes, &settings)
        .await
        .unwrap_err();
    assert_eq!(halt.bail_reason(), Some(&BailReason::StoreFailed));
    assert_eq!(failing.writes().len(), 2);
}
