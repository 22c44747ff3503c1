//! Task submission payloads.
//!
//! Only presence is checked: a required field is accepted when it holds any
//! truthy JSON value. Types and formats are passed through untouched for the
//! downstream worker to interpret.

use crate::errors::{REQUIRED_FIELDS, RequestError};
use chrono::{DateTime, SecondsFormat, Utc};
use serde::{Deserialize, Serialize};
use serde_json::{Map, Value};

/// A task submission as parsed from a POST body
#[derive(Clone, Debug, Deserialize, Serialize, PartialEq)]
#[serde(default)]
pub struct TaskRequest {
    pub email: Value,
    pub secret: Value,
    pub task: Value,
    /// Numeric or string round identifier
    pub round: Value,
    /// Caller-supplied replay token, passed through without interpretation
    pub nonce: Value,
    pub brief: Value,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub checks: Option<Value>,
    pub evaluation_url: Value,
    pub attachments: Value,
    /// The submitted object, every key included
    #[serde(skip)]
    pub submitted: Map<String, Value>,
}

impl Default for TaskRequest {
    fn default() -> Self {
        TaskRequest {
            email: Value::Null,
            secret: Value::Null,
            task: Value::Null,
            round: Value::Null,
            nonce: Value::Null,
            brief: Value::Null,
            checks: None,
            evaluation_url: Value::Null,
            attachments: Value::Array(Vec::new()),
            submitted: Map::new(),
        }
    }
}

impl TaskRequest {
    /// Parses a request body.
    ///
    /// An array, string, number or boolean body carries no fields and will
    /// fail authentication. Malformed JSON and a `null` body are internal faults.
    pub fn from_slice(body: &[u8]) -> Result<Self, RequestError> {
        let value: Value = serde_json::from_slice(body)
            .map_err(|e| RequestError::Internal(format!("Failed to parse request body: {e}")))?;

        match value {
            Value::Object(submitted) => {
                let mut request: TaskRequest =
                    serde_json::from_value(Value::Object(submitted.clone())).map_err(|e| {
                        RequestError::Internal(format!("Failed to parse request body: {e}"))
                    })?;
                request.submitted = submitted;
                Ok(request)
            }
            Value::Null => Err(RequestError::Internal("Request body is null".into())),
            _ => Ok(TaskRequest::default()),
        }
    }

    /// Checks the shared secret. Only a string exactly equal to `expected` passes.
    pub fn authenticate(&self, expected: &str) -> Result<(), RequestError> {
        match &self.secret {
            Value::String(secret) if secret == expected => Ok(()),
            _ => Err(RequestError::InvalidSecret),
        }
    }

    /// Names of required fields that are absent or falsy.
    pub fn missing_fields(&self) -> Vec<&'static str> {
        REQUIRED_FIELDS
            .into_iter()
            .zip([
                &self.email,
                &self.task,
                &self.round,
                &self.nonce,
                &self.brief,
                &self.evaluation_url,
            ])
            .filter(|(_, value)| !is_truthy(value))
            .map(|(name, _)| name)
            .collect()
    }

    pub fn check_required(&self) -> Result<(), RequestError> {
        let missing = self.missing_fields();
        if missing.is_empty() {
            Ok(())
        } else {
            Err(RequestError::MissingFields(missing))
        }
    }
}

/// JSON falsiness: `null`, `false`, zero and the empty string.
pub fn is_truthy(value: &Value) -> bool {
    match value {
        Value::Null => false,
        Value::Bool(b) => *b,
        Value::Number(n) => n.as_f64().is_some_and(|n| n != 0.0),
        Value::String(s) => !s.is_empty(),
        Value::Array(_) | Value::Object(_) => true,
    }
}

/// A task persisted to the queue store: the submitted object plus the time it
/// was enqueued.
#[derive(Clone, Debug, Deserialize, Serialize, PartialEq)]
pub struct QueuedTask {
    #[serde(flatten)]
    pub fields: Map<String, Value>,
    /// ISO-8601 time at which the record was enqueued
    pub timestamp: String,
}

impl QueuedTask {
    /// The server-assigned timestamp replaces any submitted `timestamp` key.
    pub fn new(request: TaskRequest, enqueued_at: DateTime<Utc>) -> Self {
        let mut fields = request.submitted;
        fields.remove("timestamp");
        fields
            .entry("attachments")
            .or_insert_with(|| Value::Array(Vec::new()));

        QueuedTask {
            fields,
            timestamp: iso_timestamp(enqueued_at),
        }
    }
}

/// Formats a time as `2024-05-01T12:30:00.000Z`.
pub fn iso_timestamp(time: DateTime<Utc>) -> String {
    time.to_rfc3339_opts(SecondsFormat::Millis, true)
}
