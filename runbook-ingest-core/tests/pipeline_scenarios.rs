use std::sync::{Arc, Mutex};

use mockall::Sequence;
use runbook_ingest_core::config::FailOn;
use runbook_ingest_core::contract::{
    CheckReport, Conclusion, EntryKind, IngestError, IngestResponse, MockResultStore,
    MockStatusReporter, MockVcsClient, ResultStore, StoredRecord, TreeEntry,
};
use runbook_ingest_core::fakes::{
    InMemoryVcs, MemoryResultStore, RecordingReporter, ScriptedIngester,
};
use runbook_ingest_core::report::ReportStatus;
use runbook_ingest_core::trigger::WebhookPayload;
use runbook_ingest_core::{
    run_ingestion_pipeline, BailReason, Collaborators, PipelineSettings,
};
use serde_json::{json, Value};

fn suite_payload() -> WebhookPayload {
    serde_json::from_value(json!({
        "check_suite": {
            "head_sha": "abc123",
            "head_branch": "master",
            "head_commit": { "tree_id": "tree-1" }
        },
        "repository": { "full_name": "acme/ops" }
    }))
    .expect("payload")
}

fn settings() -> PipelineSettings {
    PipelineSettings {
        default_fail_on: FailOn::Any,
        ..PipelineSettings::default()
    }
}

#[tokio::test]
async fn empty_runbooks_vanish_from_the_totals() {
    let vcs = InMemoryVcs::new("tree-1")
        .with_file("runbook.md", "# Root")
        .with_file("svc/api_runbook.md", "# Api")
        .with_file("svc/empty_runbook.md", "")
        .with_file("README.md", "# Readme");
    let ingester = ScriptedIngester::new();
    let store = MemoryResultStore::new();
    let reporter = RecordingReporter::new();
    let collaborators = Collaborators {
        vcs: &vcs,
        ingester: &ingester,
        store: &store,
        reporter: &reporter,
    };

    let run = run_ingestion_pipeline(&collaborators, &suite_payload(), &Value::Null, &settings())
        .await
        .expect("run completes");

    assert_eq!(run.result.total, 2);
    assert_eq!(run.result.pass_count, 2);
    assert_eq!(run.result.conclusion, Conclusion::Success);
    assert_eq!(ingester.requests().len(), 2);
    assert_eq!(run.stored, 2);
    assert_eq!(vcs.tree_lookups(), 0, "tree id came from the payload");
}

#[tokio::test]
async fn classified_failure_and_success_are_both_reported() {
    let vcs = InMemoryVcs::new("tree-1")
        .with_file("a/runbook.md", "# A")
        .with_file("b/runbook.md", "# B");
    let ingester = ScriptedIngester::new()
        .reply(
            "a/runbook.md",
            Err(IngestError::classified(
                "invalid runbook",
                json!({ "validationErrors": { "tier": "unknown" } }),
            )),
        )
        .reply(
            "b/runbook.md",
            Ok(IngestResponse {
                status: Some(200),
                message: None,
                details: Some(json!({ "weightedScore": 80 })),
            }),
        );
    let store = MemoryResultStore::new();
    let reporter = RecordingReporter::new();
    let collaborators = Collaborators {
        vcs: &vcs,
        ingester: &ingester,
        store: &store,
        reporter: &reporter,
    };

    let run = run_ingestion_pipeline(&collaborators, &suite_payload(), &Value::Null, &settings())
        .await
        .expect("run completes");

    assert_eq!(run.result.total, 2);
    assert_eq!(run.result.pass_count, 1);
    assert_eq!(run.result.failed_count, 1);
    assert_eq!(run.result.avg_score, Some(80.0));
    assert_eq!(run.result.conclusion, Conclusion::Failure);

    let published = reporter.published();
    assert_eq!(published.len(), 1);
    assert_eq!(published[0].0, "acme/ops");
    assert_eq!(published[0].1, "abc123");
    assert_eq!(published[0].2.title, run.result.title);

    let report_url = run.report.report_url().expect("published").to_string();
    match store.get("acme/ops", "abc123").await.expect("run record") {
        StoredRecord::Run {
            report_url: stored_url,
            summary,
            succeeded_document_ids,
            ..
        } => {
            assert_eq!(stored_url.as_deref(), Some(report_url.as_str()));
            assert_eq!(summary.total, 2);
            assert_eq!(
                succeeded_document_ids,
                vec![InMemoryVcs::blob_id("b/runbook.md")]
            );
        }
        other => panic!("expected run record, got {other:?}"),
    }
}

#[tokio::test]
async fn fail_on_none_keeps_the_run_green() {
    let vcs = InMemoryVcs::new("tree-1").with_file("runbook.md", "# A");
    let ingester = ScriptedIngester::new().reply(
        "runbook.md",
        Err(IngestError::classified("bad", json!({}))),
    );
    let store = MemoryResultStore::new();
    let reporter = RecordingReporter::new();
    let collaborators = Collaborators {
        vcs: &vcs,
        ingester: &ingester,
        store: &store,
        reporter: &reporter,
    };

    let run = run_ingestion_pipeline(
        &collaborators,
        &suite_payload(),
        &json!({ "failOn": "none" }),
        &settings(),
    )
    .await
    .expect("run completes");
    assert_eq!(run.result.failed_count, 1);
    assert_eq!(run.result.conclusion, Conclusion::Success);
}

#[tokio::test]
async fn tree_without_runbooks_bails_before_ingesting() {
    let vcs = InMemoryVcs::new("tree-1")
        .with_dir("runbook.md")
        .with_file("README.md", "# Readme");
    let ingester = ScriptedIngester::new();
    let store = MemoryResultStore::new();
    let reporter = RecordingReporter::new();
    let collaborators = Collaborators {
        vcs: &vcs,
        ingester: &ingester,
        store: &store,
        reporter: &reporter,
    };

    let halt = run_ingestion_pipeline(&collaborators, &suite_payload(), &Value::Null, &settings())
        .await
        .unwrap_err();
    assert_eq!(halt.bail_reason(), Some(&BailReason::NoCandidates));
    assert!(ingester.requests().is_empty());
    assert!(reporter.published().is_empty());
}

#[tokio::test]
async fn disabled_config_bails_without_touching_collaborators() {
    let vcs = InMemoryVcs::new("tree-1").unavailable();
    let ingester = ScriptedIngester::new();
    let store = MemoryResultStore::new();
    let reporter = RecordingReporter::new();
    let collaborators = Collaborators {
        vcs: &vcs,
        ingester: &ingester,
        store: &store,
        reporter: &reporter,
    };

    let halt = run_ingestion_pipeline(
        &collaborators,
        &suite_payload(),
        &json!({ "disabled": true }),
        &settings(),
    )
    .await
    .unwrap_err();
    assert_eq!(halt.bail_reason(), Some(&BailReason::Disabled));
}

#[tokio::test]
async fn failing_store_bails_after_summarising() {
    let vcs = InMemoryVcs::new("tree-1").with_file("runbook.md", "# A");
    let ingester = ScriptedIngester::new();
    let store = MemoryResultStore::failing();
    let reporter = RecordingReporter::new();
    let collaborators = Collaborators {
        vcs: &vcs,
        ingester: &ingester,
        store: &store,
        reporter: &reporter,
    };

    let halt = run_ingestion_pipeline(&collaborators, &suite_payload(), &Value::Null, &settings())
        .await
        .unwrap_err();
    assert_eq!(halt.bail_reason(), Some(&BailReason::StoreFailed));
    assert_eq!(halt.to_string(), "run bailed: failed to store results");
    assert!(reporter.published().is_empty());
}

#[tokio::test]
async fn vcs_outage_aborts_the_run() {
    let vcs = InMemoryVcs::new("tree-1").unavailable();
    let ingester = ScriptedIngester::new();
    let store = MemoryResultStore::new();
    let reporter = RecordingReporter::new();
    let collaborators = Collaborators {
        vcs: &vcs,
        ingester: &ingester,
        store: &store,
        reporter: &reporter,
    };

    let halt = run_ingestion_pipeline(&collaborators, &suite_payload(), &Value::Null, &settings())
        .await
        .unwrap_err();
    assert!(halt.is_abort());
    assert!(halt.to_string().contains("vcs unavailable"));
}

#[tokio::test]
async fn publish_happens_before_the_run_record_is_persisted() {
    let vcs = InMemoryVcs::new("tree-1").with_file("runbook.md", "# A");
    let ingester = ScriptedIngester::new();
    let mut sequence = Sequence::new();
    let calls = Arc::new(Mutex::new(Vec::new()));

    let mut store = MockResultStore::new();
    let store_calls = calls.clone();
    store
        .expect_put()
        .withf(|_, key, record| {
            key == InMemoryVcs::blob_id("runbook.md") && matches!(record, StoredRecord::Document { .. })
        })
        .times(1)
        .in_sequence(&mut sequence)
        .returning(move |_, _, _| {
            store_calls.lock().unwrap().push("document");
            Ok(())
        });

    let mut reporter = MockStatusReporter::new();
    let publish_calls = calls.clone();
    reporter
        .expect_publish()
        .withf(|repo, sha, _report: &CheckReport| repo == "acme/ops" && sha == "abc123")
        .times(1)
        .in_sequence(&mut sequence)
        .returning(move |_, _, _| {
            publish_calls.lock().unwrap().push("publish");
            Ok("https://checks.example.test/1".to_string())
        });

    let run_calls = calls.clone();
    store
        .expect_put()
        .withf(|_, key, record| key == "abc123" && matches!(record, StoredRecord::Run { .. }))
        .times(1)
        .in_sequence(&mut sequence)
        .returning(move |_, _, _| {
            run_calls.lock().unwrap().push("run");
            Ok(())
        });

    let collaborators = Collaborators {
        vcs: &vcs,
        ingester: &ingester,
        store: &store,
        reporter: &reporter,
    };
    let run = run_ingestion_pipeline(&collaborators, &suite_payload(), &Value::Null, &settings())
        .await
        .expect("run completes");

    assert_eq!(*calls.lock().unwrap(), vec!["document", "publish", "run"]);
    assert_eq!(
        run.report,
        ReportStatus::Reported {
            report_url: "https://checks.example.test/1".to_string()
        }
    );
}

#[tokio::test]
async fn publish_failure_skips_the_run_record() {
    let vcs = InMemoryVcs::new("tree-1").with_file("runbook.md", "# A");
    let ingester = ScriptedIngester::new();
    let store = MemoryResultStore::new();
    let reporter = RecordingReporter::failing();
    let collaborators = Collaborators {
        vcs: &vcs,
        ingester: &ingester,
        store: &store,
        reporter: &reporter,
    };

    let run = run_ingestion_pipeline(&collaborators, &suite_payload(), &Value::Null, &settings())
        .await
        .expect("reporting failures do not halt the run");
    assert_eq!(run.report, ReportStatus::PublishFailed);
    assert_eq!(store.writes(), vec![InMemoryVcs::blob_id("runbook.md")]);
}

#[tokio::test]
async fn rerequested_run_looks_up_the_tree_once() {
    let vcs = InMemoryVcs::new("tree-1").with_file("runbook.md", "# A");
    let ingester = ScriptedIngester::new();
    let store = MemoryResultStore::new();
    let reporter = RecordingReporter::new();
    let collaborators = Collaborators {
        vcs: &vcs,
        ingester: &ingester,
        store: &store,
        reporter: &reporter,
    };
    let payload: WebhookPayload = serde_json::from_value(json!({
        "check_run": { "head_sha": "abc123", "check_suite": { "head_branch": "master" } },
        "repository": { "full_name": "acme/ops" }
    }))
    .expect("payload");

    let run = run_ingestion_pipeline(&collaborators, &payload, &Value::Null, &settings())
        .await
        .expect("run completes");
    assert_eq!(run.result.total, 1);
    assert_eq!(vcs.tree_lookups(), 1);
}

#[tokio::test]
async fn identical_runbooks_share_one_document_record() {
    let mut vcs = MockVcsClient::new();
    vcs.expect_list_tree().times(1).returning(|_, _| {
        Ok(["a/runbook.md", "b/runbook.md"]
            .into_iter()
            .map(|path| TreeEntry {
                path: path.to_string(),
                kind: EntryKind::Blob,
                blob_id: "blob-template".to_string(),
            })
            .collect())
    });
    vcs.expect_blob_content()
        .withf(|_, blob| blob == "blob-template")
        .times(2)
        .returning(|_, _| Ok(Some("# Template".to_string())));
    let ingester = ScriptedIngester::new();
    let store = MemoryResultStore::new();
    let reporter = RecordingReporter::new();
    let collaborators = Collaborators {
        vcs: &vcs,
        ingester: &ingester,
        store: &store,
        reporter: &reporter,
    };

    let run = run_ingestion_pipeline(&collaborators, &suite_payload(), &Value::Null, &settings())
        .await
        .expect("run completes");

    assert_eq!(run.result.total, 2);
    assert_eq!(run.result.pass_count, 2);
    assert_eq!(run.stored, 1);
    assert_eq!(store.writes(), vec!["blob-template", "abc123"]);
    match store.get("acme/ops", "abc123").await.expect("run record") {
        StoredRecord::Run {
            succeeded_document_ids,
            ..
        } => assert_eq!(succeeded_document_ids, vec!["blob-template"]),
        other => panic!("expected run record, got {other:?}"),
    }
}

#[tokio::test]
async fn runbook_links_use_the_configured_web_host() {
    let vcs = InMemoryVcs::new("tree-1").with_file("runbook.md", "# A");
    let ingester = ScriptedIngester::new();
    let store = MemoryResultStore::new();
    let reporter = RecordingReporter::new();
    let collaborators = Collaborators {
        vcs: &vcs,
        ingester: &ingester,
        store: &store,
        reporter: &reporter,
    };
    let settings = PipelineSettings {
        web_base_url: Some("https://git.acme.test".to_string()),
        ..settings()
    };

    let run = run_ingestion_pipeline(&collaborators, &suite_payload(), &Value::Null, &settings)
        .await
        .expect("run completes");
    assert_eq!(
        run.outcomes[0].url,
        "https://git.acme.test/acme/ops/blob/abc123/runbook.md"
    );
}
