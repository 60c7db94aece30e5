//! # Task Results and Published Responses

use crate::error::WorkerError;
use serde::{Deserialize, Serialize};
use serde_json::Value;

/// Output of one task, tagged for caching
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct TaskResult {
    pub payload: Value,
    /// False when producing the result had side effects beyond computation
    pub cacheable: bool,
    /// Fingerprint of the request that produced this result
    pub fingerprint: String,
}

impl TaskResult {
    pub fn new(payload: Value, cacheable: bool, fingerprint: impl Into<String>) -> Self {
        Self {
            payload,
            cacheable,
            fingerprint: fingerprint.into(),
        }
    }
}

/// Structured failure attached to a published response
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ResponseError {
    pub error_code: String,
    pub user_message: String,
}

impl From<&WorkerError> for ResponseError {
    fn from(error: &WorkerError) -> Self {
        Self {
            error_code: error.error_code().to_string(),
            user_message: error.user_message(),
        }
    }
}

/// What the worker publishes for every consumed request
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct WorkResponse {
    pub request: Value,
    pub results: Vec<TaskResult>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub error: Option<ResponseError>,
}

impl WorkResponse {
    pub fn success(request: Value, results: Vec<TaskResult>) -> Self {
        Self {
            request,
            results,
            error: None,
        }
    }

    pub fn failure(request: Value, error: &WorkerError) -> Self {
        Self {
            request,
            results: Vec::new(),
            error: Some(ResponseError::from(error)),
        }
    }

    pub fn is_success(&self) -> bool {
        self.error.is_none()
    }
}
