//! # contract: collaborator interfaces consumed by the pipeline
//!
//! The pipeline never talks to GitHub, the ingestion service or the result
//! store directly. It goes through the four traits below, which the binary
//! crate implements over HTTP/the filesystem and the test suite replaces with
//! `mockall` mocks or the in-memory [`crate::fakes`].
//!
//! All collaborator failures use the boxed [`CollaboratorError`]; the one
//! exception is [`Ingester::ingest`], whose [`IngestError`] may carry a
//! diagnostic `details` payload that turns it into a classified failure.

use async_trait::async_trait;
use mockall::automock;
use serde::{Deserialize, Serialize};
use serde_json::Value;

use crate::processor::IngestOutcome;

/// Boxed error returned by every collaborator call.
pub type CollaboratorError = Box<dyn std::error::Error + Send + Sync>;

/// Kind of a git tree entry.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum EntryKind {
    Blob,
    Tree,
    Commit,
    #[serde(other)]
    Other,
}

/// One entry of a recursively listed commit tree.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct TreeEntry {
    pub path: String,
    #[serde(rename = "type")]
    pub kind: EntryKind,
    /// Blob sha, used to fetch the content later.
    #[serde(rename = "sha")]
    pub blob_id: String,
}

/// Everything the ingestion transform needs for one runbook.
#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct IngestRequest {
    pub content: String,
    pub system_code: Option<String>,
    pub write_enabled: bool,
    pub repository: String,
    pub path: String,
}

/// Successful transform response.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct IngestResponse {
    #[serde(default)]
    pub status: Option<u16>,
    #[serde(default)]
    pub message: Option<String>,
    #[serde(default)]
    pub details: Option<Value>,
}

/// Error raised by the ingestion transform.
///
/// Only errors decorated with `details` are reported as failures; the rest are
/// infrastructure problems and the runbook is dropped from the run.
#[derive(Debug, Clone, PartialEq, thiserror::Error)]
#[error("{message}")]
pub struct IngestError {
    pub message: String,
    pub details: Option<Value>,
}

impl IngestError {
    /// A parse/validation failure carrying diagnostics.
    pub fn classified(message: impl Into<String>, details: Value) -> Self {
        Self {
            message: message.into(),
            details: Some(details),
        }
    }

    /// Any failure the transform did not decorate.
    pub fn unexpected(message: impl Into<String>) -> Self {
        Self {
            message: message.into(),
            details: None,
        }
    }

    pub fn is_classified(&self) -> bool {
        self.details.is_some()
    }
}

/// Run-level verdict.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Conclusion {
    Success,
    Failure,
}

impl Conclusion {
    pub fn as_str(&self) -> &'static str {
        match self {
            Conclusion::Success => "success",
            Conclusion::Failure => "failure",
        }
    }
}

/// Payload handed to the status-reporting API.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct CheckReport {
    pub conclusion: Conclusion,
    pub title: String,
    pub summary: String,
    pub text: String,
}

/// Aggregate counts persisted with a run record.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct AggregateSummary {
    pub total: usize,
    pub pass_count: usize,
    pub failed_count: usize,
    pub avg_score: Option<f64>,
    pub conclusion: Conclusion,
}

/// Record written to the result store.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "kind", rename_all = "lowercase")]
pub enum StoredRecord {
    /// One per ingested runbook, keyed by blob id.
    #[serde(rename_all = "camelCase")]
    Document {
        commit_sha: String,
        document_id: String,
        outcome: IngestOutcome,
    },
    /// One per run, keyed by commit sha.
    #[serde(rename_all = "camelCase")]
    Run {
        commit_sha: String,
        report_url: Option<String>,
        summary: AggregateSummary,
        succeeded_document_ids: Vec<String>,
    },
}

/// Read access to the repository hosting the runbooks.
#[cfg_attr(any(test, feature = "test-export-mocks"), automock)]
#[async_trait]
pub trait VcsClient: Send + Sync {
    /// Resolve the tree id of a commit.
    async fn commit_tree_id(&self, repository: &str, sha: &str)
        -> Result<String, CollaboratorError>;

    /// List every entry of a tree, recursively.
    async fn list_tree(
        &self,
        repository: &str,
        tree_id: &str,
    ) -> Result<Vec<TreeEntry>, CollaboratorError>;

    /// Fetch a blob as text. `None` when the blob exists but has no readable content.
    async fn blob_content(
        &self,
        repository: &str,
        blob_id: &str,
    ) -> Result<Option<String>, CollaboratorError>;
}

/// The external parse → validate → score → CMDB write transform.
#[cfg_attr(any(test, feature = "test-export-mocks"), automock)]
#[async_trait]
pub trait Ingester: Send + Sync {
    async fn ingest(&self, request: IngestRequest) -> Result<IngestResponse, IngestError>;
}

/// Key-value persistence for per-document and per-run records.
#[cfg_attr(any(test, feature = "test-export-mocks"), automock)]
#[async_trait]
pub trait ResultStore: Send + Sync {
    async fn put(
        &self,
        repository: &str,
        key: &str,
        record: &StoredRecord,
    ) -> Result<(), CollaboratorError>;

    async fn get(&self, repository: &str, key: &str) -> Result<StoredRecord, CollaboratorError>;
}

/// Publishes the verdict against the commit. Returns the URL of the published report.
#[cfg_attr(any(test, feature = "test-export-mocks"), automock)]
#[async_trait]
pub trait StatusReporter: Send + Sync {
    async fn publish(
        &self,
        repository: &str,
        sha: &str,
        report: &CheckReport,
    ) -> Result<String, CollaboratorError>;
}
