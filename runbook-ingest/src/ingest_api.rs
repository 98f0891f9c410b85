//! HTTP client for the ingestion transform service.
//!
//! The service answers `2xx` with an [`IngestResponse`]. Any other status is an
//! [`IngestError`]; when the error body carries a `details` object the runbook
//! is reported as a classified failure, otherwise it is dropped from the run.

use std::time::Duration;

use async_trait::async_trait;
use reqwest::Client;
use runbook_ingest_core::contract::{
    CollaboratorError, IngestError, IngestRequest, IngestResponse, Ingester,
};
use serde_json::Value;

const REQUEST_TIMEOUT: Duration = Duration::from_secs(60);
const API_KEY_HEADER: &str = "x-api-key";

pub struct IngestApiClient {
    http: Client,
    url: String,
    api_key: Option<String>,
}

impl IngestApiClient {
    pub fn new(url: &str, api_key: Option<String>) -> Result<Self, CollaboratorError> {
        let http = Client::builder().timeout(REQUEST_TIMEOUT).build()?;
        tracing::info!(url, api_key_set = api_key.is_some(), "Initialized ingest API client");
        Ok(Self {
            http,
            url: url.to_string(),
            api_key,
        })
    }
}

#[async_trait]
impl Ingester for IngestApiClient {
    async fn ingest(&self, request: IngestRequest) -> Result<IngestResponse, IngestError> {
        let mut builder = self.http.post(&self.url).json(&request);
        if let Some(key) = &self.api_key {
            builder = builder.header(API_KEY_HEADER, key);
        }
        let response = builder
            .send()
            .await
            .map_err(|e| IngestError::unexpected(format!("ingest request failed: {e}")))?;

        let status = response.status();
        let body = response
            .text()
            .await
            .map_err(|e| IngestError::unexpected(format!("ingest response unreadable: {e}")))?;

        if status.is_success() {
            let mut parsed: IngestResponse = serde_json::from_str(&body).map_err(|e| {
                IngestError::unexpected(format!("ingest response is not valid JSON: {e}"))
            })?;
            parsed.status.get_or_insert(status.as_u16());
            return Ok(parsed);
        }
        Err(classify_error_body(status.as_u16(), &body))
    }
}

/// Turn a non-2xx body into an [`IngestError`]. Only a JSON body with a
/// `details` object classifies the failure.
pub fn classify_error_body(status: u16, body: &str) -> IngestError {
    let parsed: Option<Value> = serde_json::from_str(body).ok();
    let message = parsed
        .as_ref()
        .and_then(|value| value.get("message"))
        .and_then(Value::as_str)
        .map(str::to_string)
        .unwrap_or_else(|| format!("ingest service returned {status}"));

    match parsed.and_then(|mut value| value.get_mut("details").map(Value::take)) {
        Some(details @ Value::Object(_)) => IngestError::classified(message, details),
        _ => IngestError::unexpected(message),
    }
}
