//! High-level pipeline: one trigger event in, one verdict out.
//!
//! [`run_ingestion_pipeline`] drives a single run through its stages:
//!   - resolve the repository policy from raw config
//!   - normalise the trigger payload into a [`RunContext`]
//!   - enumerate runbook candidates in the commit tree
//!   - ingest them under the configured concurrency cap
//!   - summarise outcomes into a [`RunResult`]
//!   - persist per-runbook records
//!   - publish the verdict and persist the run record
//!
//! # Error Handling
//! Expected early exits come back as [`Halt::Bail`] and are not faults; a
//! collaborator failure during enumeration comes back as [`Halt::Abort`].
//! Per-runbook failures never stop the run. Reporting failures are returned in
//! [`IngestionRun::report`] rather than raised.
//!
//! # Callable From
//! The CLI crate and the integration tests. Collaborators are passed in as
//! trait objects, so any mix of real clients, mocks and fakes works.

use serde_json::Value;
use tracing::field::Empty;
use tracing::{info, info_span, Instrument, Span};
use uuid::Uuid;

use crate::config::{FailOn, RunPolicy};
use crate::contract::{Ingester, ResultStore, StatusReporter, VcsClient};
use crate::error::Halt;
use crate::gather::{gather_outcomes, store_outcomes, GatherSettings};
use crate::processor::{DocumentProcessor, IngestOutcome};
use crate::report::{ReportStatus, Reporter};
use crate::source::DocumentSource;
use crate::summarise::{ReportLinks, RunResult, Summariser};
use crate::trigger::{normalise, RunContext, WebhookPayload, DEFAULT_WEB_URL};

/// The external systems a run talks to.
#[derive(Clone, Copy)]
pub struct Collaborators<'a> {
    pub vcs: &'a dyn VcsClient,
    pub ingester: &'a dyn Ingester,
    pub store: &'a dyn ResultStore,
    pub reporter: &'a dyn StatusReporter,
}

/// Environment-level settings, fixed for the lifetime of the process.
#[derive(Debug, Clone, Default)]
pub struct PipelineSettings {
    /// Used when the repository policy does not set `failOn`.
    pub default_fail_on: FailOn,
    pub gather: GatherSettings,
    /// Last-resort system code for runbooks that do not name one.
    pub fallback_system_code: Option<String>,
    /// Base URL of the per-runbook report pages. Links are omitted when unset.
    pub details_base_url: Option<String>,
    /// Web host for runbook links. Defaults to github.com.
    pub web_base_url: Option<String>,
    /// Overrides the repository named in the payload.
    pub repository: Option<String>,
}

/// Everything a completed run produced.
#[derive(Debug, Clone)]
pub struct IngestionRun {
    pub context: RunContext,
    pub result: RunResult,
    pub outcomes: Vec<IngestOutcome>,
    pub stored: usize,
    pub report: ReportStatus,
}

pub async fn run_ingestion_pipeline(
    collaborators: &Collaborators<'_>,
    payload: &WebhookPayload,
    raw_config: &Value,
    settings: &PipelineSettings,
) -> Result<IngestionRun, Halt> {
    let run_id = Uuid::new_v4();
    let span = info_span!(
        "ingest_run",
        %run_id,
        repository = Empty,
        commit_sha = Empty,
        branch = Empty
    );
    run_stages(collaborators, payload, raw_config, settings)
        .instrument(span)
        .await
}

async fn run_stages(
    collaborators: &Collaborators<'_>,
    payload: &WebhookPayload,
    raw_config: &Value,
    settings: &PipelineSettings,
) -> Result<IngestionRun, Halt> {
    info!("[RUN] Starting runbook ingestion run");

    let policy = RunPolicy::resolve(raw_config, settings.default_fail_on);
    let context = normalise(payload, settings.repository.as_deref(), &policy)?;
    let span = Span::current();
    span.record("repository", context.repository.as_str());
    span.record("commit_sha", context.commit_sha.as_str());
    span.record("branch", context.branch.as_str());
    info!(event = context.event.as_str(), "[RUN] Checking commit");

    let source = DocumentSource::new(collaborators.vcs);
    let candidates = source.candidates(&context, &policy).await?;

    let processor =
        DocumentProcessor::new(collaborators.vcs, collaborators.ingester, &policy, &context)
            .with_web_url(settings.web_base_url.as_deref().unwrap_or(DEFAULT_WEB_URL));
    let outcomes = gather_outcomes(
        &processor,
        &candidates,
        &settings.gather,
        settings.fallback_system_code.as_deref(),
    )
    .await?;

    let links = ReportLinks {
        base_url: settings.details_base_url.clone(),
        repository: context.repository.clone(),
        commit_sha: context.commit_sha.clone(),
    };
    let summariser = Summariser::new(&outcomes, policy.fail_on, links);
    let result = summariser.summarise().clone();
    info!(
        total = result.total,
        passed = result.pass_count,
        failed = result.failed_count,
        avg_score = ?result.avg_score,
        conclusion = result.conclusion.as_str(),
        "[RUN] Summarised run"
    );

    let stored = store_outcomes(collaborators.store, &context, &outcomes, &settings.gather).await?;

    let report = Reporter::new(collaborators.store, collaborators.reporter)
        .report(&context, &result, &outcomes)
        .await;
    info!(report = ?report, "[RUN] Finished runbook ingestion run");

    Ok(IngestionRun {
        context,
        result,
        outcomes,
        stored,
        report,
    })
}
