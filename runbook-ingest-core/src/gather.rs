//! # gather: bounded-concurrency fan-out over all runbooks
//!
//! Both the ingestion phase and the persistence phase go through
//! [`run_in_batches`]: the input is cut into consecutive batches of `cap`
//! items, each batch runs concurrently and is awaited as a whole, and the
//! gatherer sleeps for the throttle delay before starting the next batch so
//! the external APIs see a paced stream rather than one burst.

use std::collections::HashSet;
use std::future::Future;
use std::time::Duration;

use futures::future::join_all;
use tracing::{debug, error, info};

use crate::contract::{Ingester, ResultStore, StoredRecord, VcsClient};
use crate::error::{BailReason, Halt};
use crate::processor::{DocumentProcessor, IngestOutcome};
use crate::source::DocumentCandidate;
use crate::trigger::RunContext;

pub const DEFAULT_PROCESS_CONCURRENCY: usize = 10;
pub const DEFAULT_STORE_CONCURRENCY: usize = 5;
pub const DEFAULT_THROTTLE: Duration = Duration::from_millis(20);

/// Concurrency caps and pacing for both phases.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct GatherSettings {
    pub process_concurrency: usize,
    pub store_concurrency: usize,
    /// Pause between two batches.
    pub throttle: Duration,
}

impl Default for GatherSettings {
    fn default() -> Self {
        Self {
            process_concurrency: DEFAULT_PROCESS_CONCURRENCY,
            store_concurrency: DEFAULT_STORE_CONCURRENCY,
            throttle: DEFAULT_THROTTLE,
        }
    }
}

/// Run `op` over `items` in batches of `cap`, keeping input order and
/// dropping `None` results. A cap of zero behaves like one.
pub async fn run_in_batches<'a, T, R, F, Fut>(
    items: &'a [T],
    cap: usize,
    delay: Duration,
    op: F,
) -> Vec<R>
where
    F: Fn(&'a T) -> Fut,
    Fut: Future<Output = Option<R>>,
{
    let cap = cap.max(1);
    let batch_count = items.len().div_ceil(cap);
    let mut results = Vec::with_capacity(items.len());

    for (index, batch) in items.chunks(cap).enumerate() {
        let settled = join_all(batch.iter().map(&op)).await;
        let before = results.len();
        results.extend(settled.into_iter().flatten());
        debug!(
            batch = index + 1,
            batches = batch_count,
            size = batch.len(),
            kept = results.len() - before,
            "[GATHER] Batch settled"
        );
        if index + 1 < batch_count {
            tokio::time::sleep(delay).await;
        }
    }
    results
}

/// Ingest every candidate. Bails when not a single outcome survives.
pub async fn gather_outcomes<V, I>(
    processor: &DocumentProcessor<'_, V, I>,
    candidates: &[DocumentCandidate],
    settings: &GatherSettings,
    fallback_code: Option<&str>,
) -> Result<Vec<IngestOutcome>, Halt>
where
    V: VcsClient + ?Sized,
    I: Ingester + ?Sized,
{
    info!(
        candidates = candidates.len(),
        concurrency = settings.process_concurrency,
        "[GATHER] Processing runbooks"
    );
    let outcomes = run_in_batches(
        candidates,
        settings.process_concurrency,
        settings.throttle,
        |candidate| processor.process(candidate, fallback_code),
    )
    .await;

    if outcomes.is_empty() {
        return Err(Halt::bail(BailReason::NothingIngested {
            attempted: candidates.len(),
        }));
    }
    info!(
        outcomes = outcomes.len(),
        dropped = candidates.len() - outcomes.len(),
        "[GATHER] Runbooks processed"
    );
    Ok(outcomes)
}

/// Persist one record per distinct document id. Bails only when every write
/// failed. Returns the number of records stored.
///
/// Runbooks with identical content share a blob id, so only the first
/// outcome for each id is written.
pub async fn store_outcomes<S>(
    store: &S,
    context: &RunContext,
    outcomes: &[IngestOutcome],
    settings: &GatherSettings,
) -> Result<usize, Halt>
where
    S: ResultStore + ?Sized,
{
    let mut seen = HashSet::new();
    let unique: Vec<&IngestOutcome> = outcomes
        .iter()
        .filter(|outcome| seen.insert(outcome.document_id()))
        .collect();

    let stored = run_in_batches(
        &unique,
        settings.store_concurrency,
        settings.throttle,
        |outcome| store_outcome(store, context, outcome),
    )
    .await
    .len();

    if stored == 0 {
        return Err(Halt::bail(BailReason::StoreFailed));
    }
    info!(
        stored,
        failed = unique.len() - stored,
        duplicates = outcomes.len() - unique.len(),
        "[GATHER] Stored ingest results"
    );
    Ok(stored)
}

async fn store_outcome<S>(store: &S, context: &RunContext, outcome: &IngestOutcome) -> Option<()>
where
    S: ResultStore + ?Sized,
{
    let record = StoredRecord::Document {
        commit_sha: context.commit_sha.clone(),
        document_id: outcome.document_id().to_string(),
        outcome: outcome.clone(),
    };
    match store
        .put(&context.repository, outcome.document_id(), &record)
        .await
    {
        Ok(()) => {
            debug!(event = "STORE_RESULT_SUCCESS", path = %outcome.path, "[GATHER] Stored result");
            Some(())
        }
        Err(e) => {
            error!(event = "STORE_RESULT_FAILED", path = %outcome.path, error = %e, "[GATHER][ERROR] Failed to store result");
            None
        }
    }
}
