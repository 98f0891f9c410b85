//! # processor: fetch, identify and ingest one runbook
//!
//! [`DocumentProcessor::process`] returns `None` whenever a runbook should
//! vanish from the run: empty or unreadable content, and ingestion errors the
//! transform did not decorate with `details`. Everything else becomes an
//! [`IngestOutcome`], success or classified failure.

use serde::{Deserialize, Serialize};
use serde_json::Value;
use tracing::{debug, error, info};

use crate::config::RunPolicy;
use crate::contract::{IngestRequest, Ingester, VcsClient};
use crate::source::DocumentCandidate;
use crate::system_code::{detect_system_code, embedded_system_code};
use crate::trigger::{RunContext, DEFAULT_WEB_URL};

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum IngestState {
    Success,
    Failure,
}

/// Classified result of ingesting one runbook.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct IngestOutcome {
    pub path: String,
    pub blob_id: String,
    pub url: String,
    pub state: IngestState,
    pub system_code: Option<String>,
    pub message: Option<String>,
    pub details: Option<Value>,
}

impl IngestOutcome {
    pub fn is_success(&self) -> bool {
        self.state == IngestState::Success
    }

    /// Key under which the outcome is stored.
    pub fn document_id(&self) -> &str {
        &self.blob_id
    }

    /// The code declared in the runbook content wins over the one resolved from the path.
    pub fn effective_system_code(&self) -> Option<&str> {
        embedded_system_code(self.details.as_ref()).or(self.system_code.as_deref())
    }

    /// `details.weightedScore` when it holds a usable number.
    pub fn weighted_score(&self) -> Option<f64> {
        self.details
            .as_ref()
            .and_then(|details| details.get("weightedScore"))
            .and_then(numeric_value)
    }
}

/// Numbers and numeric strings; booleans, null, NaN and anything else are no score.
pub fn numeric_value(value: &Value) -> Option<f64> {
    let number = match value {
        Value::Number(number) => number.as_f64()?,
        Value::String(text) => text.trim().parse::<f64>().ok()?,
        _ => return None,
    };
    number.is_finite().then_some(number)
}

pub struct DocumentProcessor<'a, V: VcsClient + ?Sized, I: Ingester + ?Sized> {
    vcs: &'a V,
    ingester: &'a I,
    policy: &'a RunPolicy,
    context: &'a RunContext,
    web_url: &'a str,
}

impl<'a, V: VcsClient + ?Sized, I: Ingester + ?Sized> DocumentProcessor<'a, V, I> {
    pub fn new(vcs: &'a V, ingester: &'a I, policy: &'a RunPolicy, context: &'a RunContext) -> Self {
        Self {
            vcs,
            ingester,
            policy,
            context,
            web_url: DEFAULT_WEB_URL,
        }
    }

    /// Link runbooks to a web host other than github.com.
    pub fn with_web_url(mut self, web_url: &'a str) -> Self {
        self.web_url = web_url;
        self
    }

    pub async fn process(
        &self,
        candidate: &DocumentCandidate,
        fallback_code: Option<&str>,
    ) -> Option<IngestOutcome> {
        let content = match candidate.content.as_deref().filter(|c| !c.is_empty()) {
            Some(content) => content.to_string(),
            None => self.fetch_content(candidate).await?,
        };

        let system_code = detect_system_code(self.policy, &candidate.path, fallback_code);
        let write_enabled = system_code.is_some()
            && self
                .policy
                .is_write_enabled(&self.context.branch, &candidate.path);

        let request = IngestRequest {
            content,
            system_code: system_code.clone(),
            write_enabled,
            repository: self.context.repository.clone(),
            path: candidate.path.clone(),
        };

        let mut outcome = IngestOutcome {
            path: candidate.path.clone(),
            blob_id: candidate.blob_id.clone(),
            url: self.context.document_url(self.web_url, &candidate.path),
            state: IngestState::Success,
            system_code,
            message: None,
            details: None,
        };

        match self.ingester.ingest(request).await {
            Ok(response) => {
                info!(
                    event = "INGEST_SUCCESS",
                    path = %candidate.path,
                    system_code = ?outcome.system_code,
                    write_enabled,
                    "[PROCESS] Ingested runbook"
                );
                outcome.message = response.message;
                outcome.details = response.details;
            }
            Err(e) => {
                error!(
                    event = "INGEST_FAILED",
                    path = %candidate.path,
                    system_code = ?outcome.system_code,
                    write_enabled,
                    error = %e,
                    classified = e.is_classified(),
                    "[PROCESS][ERROR] Ingest failed"
                );
                // only decorated errors are reported, the rest are dropped
                let details = e.details?;
                outcome.state = IngestState::Failure;
                outcome.message = Some(e.message);
                outcome.details = Some(details);
            }
        }
        Some(outcome)
    }

    async fn fetch_content(&self, candidate: &DocumentCandidate) -> Option<String> {
        match self
            .vcs
            .blob_content(&self.context.repository, &candidate.blob_id)
            .await
        {
            Ok(Some(content)) if !content.is_empty() => Some(content),
            Ok(_) => {
                info!(event = "CONTENT_EMPTY", path = %candidate.path, blob_id = %candidate.blob_id, "[PROCESS] Dropping empty runbook");
                None
            }
            Err(e) => {
                error!(
                    event = "CONTENT_RETRIEVE_FAILED",
                    path = %candidate.path,
                    blob_id = %candidate.blob_id,
                    error = %e,
                    "[PROCESS][ERROR] Could not fetch runbook content"
                );
                debug!(?candidate, "[PROCESS] Candidate dropped");
                None
            }
        }
    }
}
