//! # Inbound Work Requests
//!
//! The decoded queue message. `body` stays an untyped JSON object so each task
//! validates exactly the fields it needs; [`RequestBody`] gives typed access with
//! parameter errors that name the task and field.

use crate::error::{Result, WorkerError};
use chrono::{DateTime, NaiveDateTime, Utc};
use serde::{Deserialize, Serialize};
use serde_json::{Map, Value};
use sha2::{Digest, Sha256};
use std::fmt::Write as _;

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct WorkRequest {
    pub experiment_id: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub timeout: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub body: Option<Map<String, Value>>,
    #[serde(
        rename = "Authorization",
        default,
        skip_serializing_if = "Option::is_none"
    )]
    pub authorization: Option<String>,
}

impl WorkRequest {
    /// Build a request from a task body, mostly for tests and embedding
    pub fn new(experiment_id: impl Into<String>, body: Value) -> Result<Self> {
        let body = match body {
            Value::Object(map) => map,
            other => {
                return Err(WorkerError::parameter(format!(
                    "request body must be an object, got {other}"
                )))
            }
        };
        Ok(Self {
            experiment_id: experiment_id.into(),
            timeout: None,
            body: Some(body),
            authorization: None,
        })
    }

    pub fn with_timeout(mut self, timeout: impl Into<String>) -> Self {
        self.timeout = Some(timeout.into());
        self
    }

    pub fn with_authorization(mut self, authorization: impl Into<String>) -> Self {
        self.authorization = Some(authorization.into());
        self
    }

    /// Decode a raw queue message
    pub fn from_value(value: Value) -> Result<Self> {
        serde_json::from_value(value)
            .map_err(|e| WorkerError::parameter(format!("malformed work request: {e}")))
    }

    /// The `body.name` task identifier
    pub fn task_name(&self) -> Result<&str> {
        let body = self
            .body
            .as_ref()
            .ok_or_else(|| WorkerError::parameter("work request has no body"))?;
        body.get("name")
            .and_then(Value::as_str)
            .ok_or_else(|| WorkerError::parameter("work request body has no task name"))
    }

    /// Typed view of the body for the named task
    pub fn body_for(&self, task: &'static str) -> Result<RequestBody<'_>> {
        let fields = self.body.as_ref().ok_or_else(|| {
            WorkerError::parameter(format!("{task} cannot be constructed without a request body"))
        })?;
        Ok(RequestBody { task, fields })
    }

    /// Parsed `timeout`, if any. Accepts RFC 3339 or `YYYY-MM-DD HH:MM:SS[.f]` in UTC.
    pub fn deadline(&self) -> Result<Option<DateTime<Utc>>> {
        let Some(raw) = self.timeout.as_deref() else {
            return Ok(None);
        };

        if let Ok(parsed) = DateTime::parse_from_rfc3339(raw) {
            return Ok(Some(parsed.with_timezone(&Utc)));
        }
        NaiveDateTime::parse_from_str(raw, "%Y-%m-%d %H:%M:%S%.f")
            .map(|naive| Some(naive.and_utc()))
            .map_err(|e| WorkerError::parameter(format!("invalid timeout '{raw}': {e}")))
    }

    pub fn is_expired_at(&self, now: DateTime<Utc>) -> Result<bool> {
        Ok(self.deadline()?.is_some_and(|deadline| deadline < now))
    }

    /// Stable hex SHA-256 over the experiment and body.
    ///
    /// `timeout` and `Authorization` are excluded: redeliveries of the same analysis
    /// share a fingerprint.
    pub fn fingerprint(&self) -> String {
        let identity = serde_json::json!({
            "experimentId": self.experiment_id,
            "body": self.body,
        });
        let mut canonical = String::new();
        write_canonical(&identity, &mut canonical);

        let digest = Sha256::digest(canonical.as_bytes());
        digest.iter().fold(String::with_capacity(64), |mut hex, byte| {
            let _ = write!(hex, "{byte:02x}");
            hex
        })
    }

    pub fn to_value(&self) -> Value {
        serde_json::to_value(self).unwrap_or(Value::Null)
    }
}

/// JSON with object keys sorted at every level
fn write_canonical(value: &Value, out: &mut String) {
    match value {
        Value::Object(map) => {
            let mut keys: Vec<&String> = map.keys().collect();
            keys.sort();
            out.push('{');
            for (i, key) in keys.into_iter().enumerate() {
                if i > 0 {
                    out.push(',');
                }
                out.push_str(&Value::String(key.clone()).to_string());
                out.push(':');
                write_canonical(&map[key], out);
            }
            out.push('}');
        }
        Value::Array(items) => {
            out.push('[');
            for (i, item) in items.iter().enumerate() {
                if i > 0 {
                    out.push(',');
                }
                write_canonical(item, out);
            }
            out.push(']');
        }
        scalar => out.push_str(&scalar.to_string()),
    }
}

/// Typed accessors over a request body, scoped to one task for error messages
#[derive(Debug, Clone, Copy)]
pub struct RequestBody<'a> {
    task: &'static str,
    fields: &'a Map<String, Value>,
}

impl<'a> RequestBody<'a> {
    pub fn task(&self) -> &'static str {
        self.task
    }

    /// Field value, treating explicit `null` as absent
    pub fn get(&self, field: &str) -> Option<&'a Value> {
        self.fields.get(field).filter(|value| !value.is_null())
    }

    pub fn required(&self, field: &str) -> Result<&'a Value> {
        self.get(field)
            .ok_or_else(|| WorkerError::missing_field(self.task, field))
    }

    pub fn required_str(&self, field: &str) -> Result<&'a str> {
        self.required(field)?.as_str().ok_or_else(|| {
            WorkerError::parameter(format!("{}: '{field}' must be a string", self.task))
        })
    }

    pub fn optional_str(&self, field: &str) -> Result<Option<&'a str>> {
        self.get(field)
            .map(|value| {
                value.as_str().ok_or_else(|| {
                    WorkerError::parameter(format!("{}: '{field}' must be a string", self.task))
                })
            })
            .transpose()
    }

    /// Optional strictly positive integer
    pub fn optional_positive(&self, field: &str) -> Result<Option<usize>> {
        self.get(field)
            .map(|value| match value.as_u64() {
                Some(n) if n > 0 => usize::try_from(n).map_err(|_| {
                    WorkerError::parameter(format!("{}: '{field}' is too large", self.task))
                }),
                _ => Err(WorkerError::parameter(format!(
                    "{}: '{field}' must be a positive integer, got {value}",
                    self.task
                ))),
            })
            .transpose()
    }

    pub fn required_object(&self, field: &str) -> Result<&'a Map<String, Value>> {
        self.required(field)?.as_object().ok_or_else(|| {
            WorkerError::parameter(format!("{}: '{field}' must be an object", self.task))
        })
    }

    pub fn required_array(&self, field: &str) -> Result<&'a Vec<Value>> {
        self.required(field)?.as_array().ok_or_else(|| {
            WorkerError::parameter(format!("{}: '{field}' must be a list", self.task))
        })
    }
}
