use runbook_ingest::store::FileResultStore;
use runbook_ingest_core::contract::{AggregateSummary, Conclusion, ResultStore, StoredRecord};
use futures::future::join_all;
use tempfile::tempdir;

fn run_record(total: usize) -> StoredRecord {
    StoredRecord::Run {
        commit_sha: "abc123".to_string(),
        report_url: Some("https://github.com/acme/ops/runs/1".to_string()),
        summary: AggregateSummary {
            total,
            pass_count: total,
            failed_count: 0,
            avg_score: Some(75.0),
            conclusion: Conclusion::Success,
        },
        succeeded_document_ids: vec!["b1".to_string()],
    }
}

#[tokio::test]
async fn records_are_written_and_read_back() {
    let dir = tempdir().expect("temp dir");
    let store = FileResultStore::new(dir.path().join("results"));

    store
        .put("acme/ops", "abc123", &run_record(1))
        .await
        .expect("put");
    let record = store.get("acme/ops", "abc123").await.expect("get");
    assert_eq!(record, run_record(1));

    let path = store.record_path("acme/ops", "abc123");
    assert!(path.exists());
    let name = path.file_name().unwrap().to_string_lossy().to_string();
    assert!(!name.contains("acme"), "file name is hashed: {name}");
}

#[tokio::test]
async fn later_writes_replace_earlier_ones() {
    let dir = tempdir().expect("temp dir");
    let store = FileResultStore::new(dir.path());

    store.put("acme/ops", "abc123", &run_record(1)).await.expect("put");
    store.put("acme/ops", "abc123", &run_record(4)).await.expect("put");
    assert_eq!(store.get("acme/ops", "abc123").await.expect("get"), run_record(4));
}

#[tokio::test]
async fn keys_are_scoped_per_repository() {
    let dir = tempdir().expect("temp dir");
    let store = FileResultStore::new(dir.path());

    store.put("acme/ops", "abc123", &run_record(1)).await.expect("put");
    assert!(store.get("acme/other", "abc123").await.is_err());
    assert_ne!(
        store.record_path("acme/ops", "abc123"),
        store.record_path("acme/other", "abc123")
    );
}

#[tokio::test(flavor = "multi_thread", worker_threads = 4)]
async fn concurrent_writes_to_one_key_all_succeed() {
    let dir = tempdir().expect("temp dir");
    let store = FileResultStore::new(dir.path());

    for round in 0..50 {
        let records = [run_record(round), run_record(round + 1)];
        let results = join_all(
            records
                .iter()
                .map(|record| store.put("acme/ops", "blob-1", record)),
        )
        .await;
        assert!(results.iter().all(Result::is_ok), "round {round}: {results:?}");
    }

    let record = store.get("acme/ops", "blob-1").await.expect("get");
    assert!(record == run_record(49) || record == run_record(50));
    let leftovers: Vec<_> = std::fs::read_dir(dir.path())
        .expect("read dir")
        .filter_map(Result::ok)
        .filter(|entry| entry.file_name().to_string_lossy().ends_with(".tmp"))
        .collect();
    assert!(leftovers.is_empty(), "staging files left behind: {leftovers:?}");
}
