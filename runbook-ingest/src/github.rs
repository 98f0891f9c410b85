//! # GitHub REST client
//!
//! Implements [`VcsClient`] (commit, recursive tree and raw blob reads) and
//! [`StatusReporter`] (check run creation) over the GitHub REST API.
//!
//! Construct with [`GitHubClient::new`]; the token is optional for public
//! repositories but required to publish check runs.

use std::time::Duration;

use async_trait::async_trait;
use reqwest::header::{ACCEPT, AUTHORIZATION, USER_AGENT};
use reqwest::{Client, RequestBuilder, StatusCode};
use runbook_ingest_core::contract::{
    CheckReport, CollaboratorError, StatusReporter, TreeEntry, VcsClient,
};
use serde::{Deserialize, Serialize};

const JSON_MEDIA_TYPE: &str = "application/vnd.github+json";
const RAW_MEDIA_TYPE: &str = "application/vnd.github.raw";
const CHECK_NAME: &str = "runbook.md";
const REQUEST_TIMEOUT: Duration = Duration::from_secs(30);
/// GitHub rejects check run output fields longer than this.
const MAX_OUTPUT_CHARS: usize = 65_535;

pub struct GitHubClient {
    http: Client,
    api_url: String,
    token: Option<String>,
}

#[derive(Deserialize)]
struct CommitResponse {
    tree: TreeRef,
}

#[derive(Deserialize)]
struct TreeRef {
    sha: String,
}

#[derive(Deserialize)]
struct TreeResponse {
    tree: Vec<TreeEntry>,
    #[serde(default)]
    truncated: bool,
}

#[derive(Serialize)]
struct NewCheckRun<'a> {
    name: &'a str,
    head_sha: &'a str,
    status: &'a str,
    conclusion: &'a str,
    output: CheckOutput<'a>,
}

#[derive(Serialize)]
struct CheckOutput<'a> {
    title: &'a str,
    summary: String,
    text: String,
}

#[derive(Deserialize)]
struct CheckRunResponse {
    html_url: String,
}

impl GitHubClient {
    pub fn new(api_url: &str, token: Option<String>) -> Result<Self, CollaboratorError> {
        let http = Client::builder().timeout(REQUEST_TIMEOUT).build()?;
        tracing::info!(
            api_url,
            token_set = token.is_some(),
            "Initialized GitHub client"
        );
        Ok(Self {
            http,
            api_url: api_url.trim_end_matches('/').to_string(),
            token,
        })
    }

    fn request(&self, builder: RequestBuilder, accept: &str) -> RequestBuilder {
        let builder = builder
            .header(USER_AGENT, "runbook-ingest")
            .header(ACCEPT, accept);
        match &self.token {
            Some(token) => builder.header(AUTHORIZATION, format!("Bearer {token}")),
            None => builder,
        }
    }

    fn repo_url(&self, repository: &str, path: &str) -> String {
        format!("{}/repos/{}/{}", self.api_url, repository, path)
    }
}

#[async_trait]
impl VcsClient for GitHubClient {
    async fn commit_tree_id(&self, repository: &str, sha: &str) -> Result<String, CollaboratorError> {
        let url = self.repo_url(repository, &format!("git/commits/{sha}"));
        let commit: CommitResponse = self
            .request(self.http.get(&url), JSON_MEDIA_TYPE)
            .send()
            .await?
            .error_for_status()?
            .json()
            .await?;
        Ok(commit.tree.sha)
    }

    async fn list_tree(
        &self,
        repository: &str,
        tree_id: &str,
    ) -> Result<Vec<TreeEntry>, CollaboratorError> {
        let url = self.repo_url(repository, &format!("git/trees/{tree_id}"));
        let tree: TreeResponse = self
            .request(self.http.get(&url).query(&[("recursive", "1")]), JSON_MEDIA_TYPE)
            .send()
            .await?
            .error_for_status()?
            .json()
            .await?;
        complete_tree(tree).inspect_err(|e| {
            tracing::error!(repository, tree_id, error = %e, "Refusing truncated tree listing");
        })
    }

    async fn blob_content(
        &self,
        repository: &str,
        blob_id: &str,
    ) -> Result<Option<String>, CollaboratorError> {
        let url = self.repo_url(repository, &format!("git/blobs/{blob_id}"));
        let response = self
            .request(self.http.get(&url), RAW_MEDIA_TYPE)
            .send()
            .await?;
        if response.status() == StatusCode::NOT_FOUND {
            return Ok(None);
        }
        let content = response.error_for_status()?.text().await?;
        Ok(Some(content))
    }
}

#[async_trait]
impl StatusReporter for GitHubClient {
    async fn publish(
        &self,
        repository: &str,
        sha: &str,
        report: &CheckReport,
    ) -> Result<String, CollaboratorError> {
        let body = NewCheckRun {
            name: CHECK_NAME,
            head_sha: sha,
            status: "completed",
            conclusion: report.conclusion.as_str(),
            output: CheckOutput {
                title: &report.title,
                summary: truncate_chars(&report.summary, MAX_OUTPUT_CHARS),
                text: truncate_chars(&report.text, MAX_OUTPUT_CHARS),
            },
        };
        let url = self.repo_url(repository, "check-runs");
        let created: CheckRunResponse = self
            .request(self.http.post(&url), JSON_MEDIA_TYPE)
            .json(&body)
            .send()
            .await?
            .error_for_status()?
            .json()
            .await?;
        tracing::info!(repository, sha, check_url = %created.html_url, "Created check run");
        Ok(created.html_url)
    }
}

/// A truncated listing would silently drop runbooks from the verdict.
fn complete_tree(tree: TreeResponse) -> Result<Vec<TreeEntry>, CollaboratorError> {
    if tree.truncated {
        return Err(format!(
            "tree listing truncated after {} entries; too many files to check every runbook",
            tree.tree.len()
        )
        .into());
    }
    Ok(tree.tree)
}

fn truncate_chars(text: &str, max: usize) -> String {
    match text.char_indices().nth(max) {
        Some((end, _)) => text[..end].to_string(),
        None => text.to_string(),
    }
}
