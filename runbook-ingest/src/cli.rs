//! This module implements the CLI interface for runbook-ingest: command parsing,
//! argument validation and wiring of the concrete collaborators.
//!
//! All run logic (policy, discovery, ingestion, aggregation, reporting) lives in the
//! [`runbook-ingest-core`] crate. This module only builds clients from the environment,
//! hands them to the pipeline and renders the outcome.
//!
//! ## How To Use
//! - For command-line users: `runbook-ingest --help`.
//! - For programmatic/integration use: call [`run`] with a constructed [`Cli`].
//!
//! [`runbook-ingest-core`]: ../../runbook-ingest-core/

use crate::github::GitHubClient;
use crate::ingest_api::IngestApiClient;
use crate::load_config::{load_repository_config, EnvSettings};
use crate::store::FileResultStore;
use anyhow::{anyhow, Context, Result};
use clap::{Parser, Subcommand};
use runbook_ingest_core::contract::ResultStore;
use runbook_ingest_core::trigger::WebhookPayload;
use runbook_ingest_core::{run_ingestion_pipeline, Collaborators, Halt};
use serde_json::Value;
use std::fs;
use std::path::PathBuf;

/// CLI for runbook-ingest: check every runbook in a commit and report one verdict.
#[derive(Parser)]
#[clap(
    name = "runbook-ingest",
    version,
    about = "Ingest and score every runbook in a commit, then report the verdict on the commit"
)]
pub struct Cli {
    #[clap(subcommand)]
    pub command: Commands,
}

#[derive(Subcommand)]
pub enum Commands {
    /// Run the checks for the commit named in a webhook payload
    Check {
        /// Path to the webhook payload (check_suite or check_run event JSON)
        #[clap(long)]
        payload: PathBuf,
        /// Path to the repository's runbook policy YAML
        #[clap(long)]
        config: Option<PathBuf>,
        /// Repository slug (owner/name), overriding the payload
        #[clap(long)]
        repository: Option<String>,
        /// System code for runbooks that do not name one
        #[clap(long)]
        system_code: Option<String>,
    },
    /// Print a stored run (key = commit sha) or runbook (key = blob sha) record
    Status {
        #[clap(long)]
        repository: String,
        #[clap(long)]
        key: String,
    },
}

/// Async CLI entrypoint for integration tests and main()
pub async fn run(cli: Cli) -> Result<()> {
    match cli.command {
        Commands::Check {
            payload,
            config,
            repository,
            system_code,
        } => check(payload, config, repository, system_code).await,
        Commands::Status { repository, key } => status(&repository, &key).await,
    }
}

async fn check(
    payload_path: PathBuf,
    config_path: Option<PathBuf>,
    repository: Option<String>,
    system_code: Option<String>,
) -> Result<()> {
    let raw_payload = fs::read_to_string(&payload_path)
        .with_context(|| format!("Failed to read payload file {:?}", payload_path))?;
    let payload: WebhookPayload =
        serde_json::from_str(&raw_payload).context("Payload is not valid webhook JSON")?;
    let raw_config = match config_path {
        Some(path) => load_repository_config(path)?,
        None => Value::Null,
    };

    let mut settings = EnvSettings::from_env()?;
    settings.pipeline.repository = repository;
    settings.pipeline.fallback_system_code = system_code;

    let ingest_url = settings
        .ingest_api_url
        .clone()
        .ok_or_else(|| anyhow!("INGEST_API_URL must be set"))?;
    let github = GitHubClient::new(&settings.github_api_url, settings.github_token.clone())
        .map_err(|e| anyhow!("Failed to build GitHub client: {e}"))?;
    let ingester = IngestApiClient::new(&ingest_url, settings.ingest_api_key.clone())
        .map_err(|e| anyhow!("Failed to build ingest client: {e}"))?;
    let store = FileResultStore::new(&settings.results_dir);

    let collaborators = Collaborators {
        vcs: &github,
        ingester: &ingester,
        store: &store,
        reporter: &github,
    };
    tracing::info!(command = "check", payload = ?payload_path, "Starting runbook check");

    match run_ingestion_pipeline(&collaborators, &payload, &raw_config, &settings.pipeline).await
    {
        Ok(run) => {
            println!(
                "Runbook check {} for {}@{}: {}",
                run.result.conclusion.as_str(),
                run.context.repository,
                run.context.commit_sha,
                run.result.title
            );
            match run.report.report_url() {
                Some(url) => println!("Report: {url}"),
                None => println!("Report could not be published"),
            }
            tracing::info!(command = "check", report = ?run.report, "Runbook check complete");
            Ok(())
        }
        Err(Halt::Bail(reason)) => {
            println!("Run bailed: {reason}");
            Ok(())
        }
        Err(halt) => {
            tracing::error!(command = "check", error = %halt, "Runbook check aborted");
            Err(anyhow!(halt))
        }
    }
}

async fn status(repository: &str, key: &str) -> Result<()> {
    let settings = EnvSettings::from_env()?;
    let store = FileResultStore::new(&settings.results_dir);
    let record = store
        .get(repository, key)
        .await
        .map_err(|e| anyhow!("Failed to read record: {e}"))?;
    println!("{}", serde_json::to_string_pretty(&record)?);
    Ok(())
}
