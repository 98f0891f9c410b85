//! `load_config` module: loads the repository policy file and the process environment.
//!
//! The policy file is untrusted YAML committed to the repository under check. It is
//! only parsed here; validation of individual keys happens in the core resolver, which
//! never rejects a policy. Environment settings are trusted and strict: a malformed
//! number is an error at startup rather than a silent default.
//!
//! # Errors
//! All errors use `anyhow::Error` with context and are surfaced at the CLI boundary.

use anyhow::{anyhow, Context, Result};
use runbook_ingest_core::config::FailOn;
use runbook_ingest_core::gather::{
    GatherSettings, DEFAULT_PROCESS_CONCURRENCY, DEFAULT_STORE_CONCURRENCY, DEFAULT_THROTTLE,
};
use runbook_ingest_core::PipelineSettings;
use serde_json::Value;
use std::env;
use std::fs;
use std::path::{Path, PathBuf};
use std::time::Duration;
use tracing::{error, info};

pub const DEFAULT_GITHUB_API_URL: &str = "https://api.github.com";
pub const DEFAULT_RESULTS_DIR: &str = "./results";

/// Section of a shared config file that holds the runbook policy.
const POLICY_SECTION: &str = "runbooks";

/// Loads the runbook policy from a YAML file.
///
/// The file may hold the policy at the top level or under a `runbooks:` key.
/// An empty file yields `Value::Null`, which resolves to the default policy.
pub fn load_repository_config<P: AsRef<Path>>(path: P) -> Result<Value> {
    let path_ref = path.as_ref();
    info!(config_path = ?path_ref, "Loading runbook policy from file");

    let content = fs::read_to_string(path_ref).map_err(|e| {
        error!(error = ?e, config_path = ?path_ref, "Failed to read policy file");
        anyhow!("Failed to read policy file {:?}: {}", path_ref, e)
    })?;

    parse_repository_config(&content)
        .with_context(|| format!("Failed to parse policy YAML in {:?}", path_ref))
}

/// Parses policy YAML into a JSON value, unwrapping the `runbooks:` section if present.
pub fn parse_repository_config(content: &str) -> Result<Value> {
    if content.trim().is_empty() {
        return Ok(Value::Null);
    }
    let yaml: serde_yaml::Value = serde_yaml::from_str(content)?;
    let mut json = serde_json::to_value(yaml).context("Policy must use string keys")?;
    let section = json.get_mut(POLICY_SECTION).map(Value::take);
    Ok(section.unwrap_or(json))
}

/// Process-wide settings read from the environment.
#[derive(Debug, Clone)]
pub struct EnvSettings {
    pub pipeline: PipelineSettings,
    pub github_api_url: String,
    pub github_token: Option<String>,
    pub ingest_api_url: Option<String>,
    pub ingest_api_key: Option<String>,
    pub results_dir: PathBuf,
}

impl EnvSettings {
    pub fn from_env() -> Result<Self> {
        let default_fail_on = match optional("RUNBOOK_FAIL_MODE") {
            Some(raw) => FailOn::parse(&raw.to_lowercase())
                .ok_or_else(|| anyhow!("RUNBOOK_FAIL_MODE must be one of any, all, none; got {raw:?}"))?,
            None => FailOn::default(),
        };
        let gather = GatherSettings {
            process_concurrency: number("INGEST_CONCURRENCY")?
                .unwrap_or(DEFAULT_PROCESS_CONCURRENCY as u64) as usize,
            store_concurrency: number("STORE_CONCURRENCY")?
                .unwrap_or(DEFAULT_STORE_CONCURRENCY as u64) as usize,
            throttle: number("THROTTLE_MILLISECONDS")?
                .map(Duration::from_millis)
                .unwrap_or(DEFAULT_THROTTLE),
        };

        let settings = Self {
            pipeline: PipelineSettings {
                default_fail_on,
                gather,
                fallback_system_code: None,
                details_base_url: optional("DETAILS_BASE_URL"),
                web_base_url: optional("GITHUB_WEB_URL"),
                repository: None,
            },
            github_api_url: optional("GITHUB_API_URL")
                .unwrap_or_else(|| DEFAULT_GITHUB_API_URL.to_string()),
            github_token: optional("GITHUB_AUTH_TOKEN"),
            ingest_api_url: optional("INGEST_API_URL"),
            ingest_api_key: optional("INGEST_API_KEY"),
            results_dir: optional("RESULTS_DIR")
                .map(PathBuf::from)
                .unwrap_or_else(|| PathBuf::from(DEFAULT_RESULTS_DIR)),
        };
        info!(
            fail_mode = ?settings.pipeline.default_fail_on,
            ingest_concurrency = settings.pipeline.gather.process_concurrency,
            store_concurrency = settings.pipeline.gather.store_concurrency,
            throttle_ms = settings.pipeline.gather.throttle.as_millis() as u64,
            github_token_set = settings.github_token.is_some(),
            results_dir = ?settings.results_dir,
            "Loaded settings from environment"
        );
        Ok(settings)
    }
}

fn optional(key: &str) -> Option<String> {
    env::var(key).ok().filter(|value| !value.trim().is_empty())
}

fn number(key: &str) -> Result<Option<u64>> {
    optional(key)
        .map(|raw| {
            raw.trim()
                .parse::<u64>()
                .with_context(|| format!("{key} must be a non-negative integer, got {raw:?}"))
        })
        .transpose()
}
