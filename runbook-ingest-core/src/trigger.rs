//! # trigger: webhook payload → run context
//!
//! Two events start a run: a check suite being requested (which carries sha,
//! branch and tree id) and a check run being re-requested (which carries the
//! sha and nests the branch in its suite). [`normalise`] folds both into one
//! [`RunContext`] so nothing downstream cares which one arrived.

use serde::Deserialize;
use tracing::debug;

use crate::config::RunPolicy;
use crate::error::{BailReason, Halt};

/// Web host that runbook links point at unless configured otherwise.
pub const DEFAULT_WEB_URL: &str = "https://github.com";

/// The subset of a webhook body the pipeline reads. Unknown fields are ignored
/// and every field is optional so that malformed payloads bail instead of
/// failing to deserialise.
#[derive(Debug, Clone, Default, Deserialize)]
pub struct WebhookPayload {
    #[serde(default)]
    pub check_suite: Option<CheckSuitePayload>,
    #[serde(default)]
    pub check_run: Option<CheckRunPayload>,
    #[serde(default)]
    pub repository: Option<RepositoryPayload>,
}

#[derive(Debug, Clone, Default, Deserialize)]
pub struct CheckSuitePayload {
    #[serde(default)]
    pub head_sha: Option<String>,
    #[serde(default)]
    pub head_branch: Option<String>,
    #[serde(default)]
    pub head_commit: Option<HeadCommitPayload>,
}

#[derive(Debug, Clone, Default, Deserialize)]
pub struct HeadCommitPayload {
    #[serde(default)]
    pub tree_id: Option<String>,
}

#[derive(Debug, Clone, Default, Deserialize)]
pub struct CheckRunPayload {
    #[serde(default)]
    pub head_sha: Option<String>,
    #[serde(default)]
    pub check_suite: Option<CheckSuitePayload>,
}

#[derive(Debug, Clone, Default, Deserialize)]
pub struct RepositoryPayload {
    #[serde(default)]
    pub full_name: Option<String>,
    #[serde(default)]
    pub name: Option<String>,
    #[serde(default)]
    pub owner: Option<OwnerPayload>,
}

#[derive(Debug, Clone, Default, Deserialize)]
pub struct OwnerPayload {
    #[serde(default)]
    pub login: Option<String>,
}

impl RepositoryPayload {
    /// `owner/name`, preferring `full_name` when present.
    pub fn slug(&self) -> Option<String> {
        if let Some(full_name) = non_empty(&self.full_name) {
            return Some(full_name.to_string());
        }
        let owner = self.owner.as_ref().and_then(|o| non_empty(&o.login))?;
        let name = non_empty(&self.name)?;
        Some(format!("{owner}/{name}"))
    }
}

/// Which event started the run.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum TriggerEvent {
    SuiteRequested,
    RunRerequested,
}

impl TriggerEvent {
    pub fn as_str(&self) -> &'static str {
        match self {
            TriggerEvent::SuiteRequested => "check_suite.requested",
            TriggerEvent::RunRerequested => "check_run.rerequested",
        }
    }
}

/// Canonical description of the commit under check.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct RunContext {
    pub repository: String,
    pub commit_sha: String,
    pub branch: String,
    /// Known up front only for suite-requested events.
    pub tree_id: Option<String>,
    pub event: TriggerEvent,
}

impl RunContext {
    /// Link to a file at this commit on the web host at `web_url`.
    pub fn document_url(&self, web_url: &str, path: &str) -> String {
        format!(
            "{}/{}/blob/{}/{}",
            web_url.trim_end_matches('/'),
            self.repository,
            self.commit_sha,
            path
        )
    }
}

/// Turn a webhook payload into a [`RunContext`], enforcing run preconditions.
///
/// `repository` overrides the repository named in the payload.
pub fn normalise(
    payload: &WebhookPayload,
    repository: Option<&str>,
    policy: &RunPolicy,
) -> Result<RunContext, Halt> {
    let shape = if let Some(suite) = &payload.check_suite {
        Some((
            TriggerEvent::SuiteRequested,
            non_empty(&suite.head_sha),
            non_empty(&suite.head_branch),
            suite
                .head_commit
                .as_ref()
                .and_then(|commit| non_empty(&commit.tree_id)),
        ))
    } else {
        payload.check_run.as_ref().map(|run| {
            (
                TriggerEvent::RunRerequested,
                non_empty(&run.head_sha),
                run.check_suite
                    .as_ref()
                    .and_then(|suite| non_empty(&suite.head_branch)),
                None,
            )
        })
    };

    if policy.disabled {
        return Err(Halt::bail(BailReason::Disabled));
    }

    let Some((event, sha, branch, tree_id)) = shape else {
        return Err(Halt::bail(BailReason::MissingHeadCommit));
    };
    let (Some(sha), Some(branch)) = (sha, branch) else {
        return Err(Halt::bail(BailReason::MissingHeadCommit));
    };

    let repository = match repository.filter(|r| !r.is_empty()) {
        Some(repository) => repository.to_string(),
        None => payload
            .repository
            .as_ref()
            .and_then(RepositoryPayload::slug)
            .ok_or_else(|| Halt::bail(BailReason::MissingRepository))?,
    };

    let context = RunContext {
        repository,
        commit_sha: sha.to_string(),
        branch: branch.to_string(),
        tree_id: tree_id.map(str::to_string),
        event,
    };
    debug!(
        event = event.as_str(),
        repository = %context.repository,
        commit_sha = %context.commit_sha,
        branch = %context.branch,
        "[TRIGGER] Normalised trigger payload"
    );
    Ok(context)
}

fn non_empty(value: &Option<String>) -> Option<&str> {
    value.as_deref().filter(|text| !text.is_empty())
}
