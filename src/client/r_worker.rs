//! # R Worker Client
//!
//! HTTP client for the remote compute backend. Every task posts a JSON request to
//! `{base_url}/v0/{endpoint}`.
//!
//! Response handling:
//!
//! - transport failures and non-2xx statuses are retried under the [`RetryPolicy`]
//! - `{"error": {"error_code", "user_message"}}` fails immediately as
//!   [`WorkerError::RWorker`]
//! - `{"data": ...}` yields the `data` value; any other JSON value is returned whole

use crate::config::{ConfigurationError, WorkerConfig};
use crate::error::{Result, WorkerError};
use crate::resilience::{AttemptError, RetryFailure, RetryPolicy};
use reqwest::header::CONTENT_TYPE;
use reqwest::{Client, Url};
use serde::Serialize;
use serde_json::Value;
use std::time::{Duration, Instant};
use tracing::{debug, info, info_span, Instrument};

const FALLBACK_ERROR_CODE: &str = "R_WORKER_ERROR";

#[derive(Debug, Clone)]
pub struct RWorkerClient {
    client: Client,
    base_url: String,
    retry: RetryPolicy,
}

impl RWorkerClient {
    pub fn new(config: &WorkerConfig) -> Result<Self> {
        Self::with_policy(
            &config.r_worker.url,
            config.request_timeout(),
            RetryPolicy::from(&config.retry),
        )
    }

    pub fn with_policy(base_url: &str, request_timeout: Duration, retry: RetryPolicy) -> Result<Self> {
        Url::parse(base_url).map_err(|e| {
            ConfigurationError::invalid_value("r_worker.url", base_url, e.to_string())
        })?;

        let client = Client::builder()
            .timeout(request_timeout)
            .user_agent(format!("analysis-worker/{}", env!("CARGO_PKG_VERSION")))
            .build()
            .map_err(|e| {
                ConfigurationError::invalid_value(
                    "r_worker.request_timeout_ms",
                    request_timeout.as_millis(),
                    format!("failed to build HTTP client: {e}"),
                )
            })?;

        info!(
            base_url = %base_url,
            timeout_ms = request_timeout.as_millis() as u64,
            retry_budget_ms = retry.max_elapsed.as_millis() as u64,
            "Created R worker client"
        );

        Ok(Self {
            client,
            base_url: base_url.trim_end_matches('/').to_string(),
            retry,
        })
    }

    pub fn endpoint_url(&self, endpoint: &str) -> String {
        format!("{}/v0/{}", self.base_url, endpoint.trim_start_matches('/'))
    }

    /// POST `request` to `endpoint` and decode the backend's payload
    pub async fn invoke<R>(&self, endpoint: &str, request: &R) -> Result<Value>
    where
        R: Serialize + ?Sized,
    {
        let body = serde_json::to_vec(request)?;
        let url = self.endpoint_url(endpoint);
        let span = info_span!("r_worker.invoke", endpoint = %endpoint, request_bytes = body.len());

        async {
            let started = Instant::now();
            let outcome = self.retry.run(endpoint, || self.attempt(&url, &body)).await;

            match outcome {
                Ok(payload) => {
                    info!(
                        elapsed_ms = started.elapsed().as_millis() as u64,
                        "R worker call succeeded"
                    );
                    Ok(payload)
                }
                Err(RetryFailure::Exhausted {
                    attempts,
                    last_error,
                    ..
                }) => Err(WorkerError::transport(endpoint, attempts, last_error)),
                Err(RetryFailure::Permanent(error)) => Err(error),
            }
        }
        .instrument(span)
        .await
    }

    async fn attempt(&self, url: &str, body: &[u8]) -> std::result::Result<Value, AttemptError> {
        let response = self
            .client
            .post(url)
            .header(CONTENT_TYPE, "application/json")
            .body(body.to_vec())
            .send()
            .await
            .map_err(|e| AttemptError::transient(format!("request failed: {e}")))?;

        let status = response.status();
        if !status.is_success() {
            let text = response.text().await.unwrap_or_default();
            return Err(AttemptError::transient(format!("HTTP {status}: {text}")));
        }

        let bytes = response
            .bytes()
            .await
            .map_err(|e| AttemptError::transient(format!("failed reading response body: {e}")))?;
        debug!(status = %status, response_bytes = bytes.len(), "R worker responded");

        let payload: Value = serde_json::from_slice(&bytes).map_err(|e| {
            WorkerError::Serialization(format!("R worker returned a non-JSON body: {e}"))
        })?;

        Ok(unwrap_envelope(payload)?)
    }
}

/// Split a backend payload into data or a structured application error
pub fn unwrap_envelope(payload: Value) -> Result<Value> {
    if let Some(error) = payload.get("error").filter(|error| !error.is_null()) {
        let (error_code, user_message) = match error {
            Value::Object(fields) => (
                fields
                    .get("error_code")
                    .and_then(Value::as_str)
                    .unwrap_or(FALLBACK_ERROR_CODE)
                    .to_string(),
                fields
                    .get("user_message")
                    .and_then(Value::as_str)
                    .map(str::to_string)
                    .unwrap_or_else(|| error.to_string()),
            ),
            Value::String(message) => (FALLBACK_ERROR_CODE.to_string(), message.clone()),
            other => (FALLBACK_ERROR_CODE.to_string(), other.to_string()),
        };
        return Err(WorkerError::r_worker(error_code, user_message));
    }

    match payload {
        Value::Object(mut fields) if fields.contains_key("data") => {
            Ok(fields.remove("data").unwrap_or(Value::Null))
        }
        other => Ok(other),
    }
}
