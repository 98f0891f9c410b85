//! # report: publish the verdict, then persist the run record
//!
//! Publishing comes first so that a crash between the two steps still leaves
//! a visible verdict on the commit. Neither failure is raised: the caller gets
//! a [`ReportStatus`] and the run is not retried.

use std::collections::HashSet;

use tracing::{error, info};

use crate::contract::{ResultStore, StatusReporter, StoredRecord};
use crate::processor::IngestOutcome;
use crate::summarise::RunResult;
use crate::trigger::RunContext;

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ReportStatus {
    /// Published and persisted.
    Reported { report_url: String },
    /// Publishing failed; nothing was persisted.
    PublishFailed,
    /// Published, but the run record could not be persisted.
    StoreFailed { report_url: String },
}

impl ReportStatus {
    pub fn report_url(&self) -> Option<&str> {
        match self {
            ReportStatus::Reported { report_url } | ReportStatus::StoreFailed { report_url } => {
                Some(report_url)
            }
            ReportStatus::PublishFailed => None,
        }
    }

    pub fn is_published(&self) -> bool {
        !matches!(self, ReportStatus::PublishFailed)
    }
}

pub struct Reporter<'a, S: ResultStore + ?Sized, R: StatusReporter + ?Sized> {
    store: &'a S,
    status: &'a R,
}

impl<'a, S: ResultStore + ?Sized, R: StatusReporter + ?Sized> Reporter<'a, S, R> {
    pub fn new(store: &'a S, status: &'a R) -> Self {
        Self { store, status }
    }

    pub async fn report(
        &self,
        context: &RunContext,
        result: &RunResult,
        outcomes: &[IngestOutcome],
    ) -> ReportStatus {
        let report_url = match self
            .status
            .publish(&context.repository, &context.commit_sha, &result.check_report())
            .await
        {
            Ok(url) => {
                info!(
                    event = "CREATE_CHECK_SUCCESS",
                    conclusion = result.conclusion.as_str(),
                    title = %result.title,
                    report_url = %url,
                    "[REPORT] Published check result"
                );
                url
            }
            Err(e) => {
                error!(
                    event = "CREATE_CHECK_FAILED",
                    conclusion = result.conclusion.as_str(),
                    error = %e,
                    "[REPORT][ERROR] Failed to publish check result"
                );
                return ReportStatus::PublishFailed;
            }
        };

        let record = StoredRecord::Run {
            commit_sha: context.commit_sha.clone(),
            report_url: Some(report_url.clone()),
            summary: result.aggregate(),
            succeeded_document_ids: succeeded_document_ids(outcomes),
        };
        match self
            .store
            .put(&context.repository, &context.commit_sha, &record)
            .await
        {
            Ok(()) => {
                info!(event = "STORE_RUN_SUCCESS", "[REPORT] Stored run record");
                ReportStatus::Reported { report_url }
            }
            Err(e) => {
                error!(event = "STORE_RUN_FAILED", error = %e, "[REPORT][ERROR] Failed to store run record");
                ReportStatus::StoreFailed { report_url }
            }
        }
    }
}

/// Ids of successful outcomes in input order, each listed once.
fn succeeded_document_ids(outcomes: &[IngestOutcome]) -> Vec<String> {
    let mut seen = HashSet::new();
    outcomes
        .iter()
        .filter(|outcome| outcome.is_success())
        .map(IngestOutcome::document_id)
        .filter(|id| seen.insert(*id))
        .map(str::to_string)
        .collect()
}
