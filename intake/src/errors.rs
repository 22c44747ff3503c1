use crate::config::ValidationError;
use crate::queue::QueueError;
use http::StatusCode;
use serde_json::{Value, json};
use thiserror::Error;

/// Result type alias for request handling
pub type Result<T, E = RequestError> = std::result::Result<T, E>;

/// Field names a task submission must carry, in the order they are reported.
pub const REQUIRED_FIELDS: [&str; 6] = ["email", "task", "round", "nonce", "brief", "evaluation_url"];

/// Errors that terminate a request before the success response is committed
#[derive(Error, Debug)]
pub enum RequestError {
    #[error("Invalid secret code")]
    InvalidSecret,

    #[error("Missing required fields: {0:?}")]
    MissingFields(Vec<&'static str>),

    #[error("Method not allowed")]
    MethodNotAllowed,

    #[error("Not found")]
    NotFound,

    /// The detail is logged but never sent to the caller.
    #[error("Internal error: {0}")]
    Internal(String),
}

impl RequestError {
    pub fn status(&self) -> StatusCode {
        match self {
            RequestError::InvalidSecret => StatusCode::UNAUTHORIZED,
            RequestError::MissingFields(_) => StatusCode::BAD_REQUEST,
            RequestError::MethodNotAllowed => StatusCode::METHOD_NOT_ALLOWED,
            RequestError::NotFound => StatusCode::NOT_FOUND,
            RequestError::Internal(_) => StatusCode::INTERNAL_SERVER_ERROR,
        }
    }

    /// JSON body sent to the caller.
    pub fn body(&self) -> Value {
        match self {
            RequestError::InvalidSecret => json!({ "error": "Invalid secret code" }),
            RequestError::MissingFields(_) => json!({
                "error": "Missing required fields",
                "required": REQUIRED_FIELDS,
            }),
            RequestError::MethodNotAllowed => json!({ "error": "Method not allowed" }),
            RequestError::NotFound => json!({ "error": "Not found" }),
            RequestError::Internal(_) => json!({ "error": "Internal server error" }),
        }
    }

    /// Label used for the request outcome metric.
    pub fn outcome(&self) -> &'static str {
        match self {
            RequestError::InvalidSecret => "invalid_secret",
            RequestError::MissingFields(_) => "missing_fields",
            RequestError::MethodNotAllowed => "method_not_allowed",
            RequestError::NotFound => "not_found",
            RequestError::Internal(_) => "internal_error",
        }
    }
}

/// Errors raised by a sink after the caller already got its response.
/// These are logged and counted, never reported back.
#[derive(Error, Debug)]
pub enum DispatchError {
    #[error("Upstream timeout for {0}")]
    Timeout(String),

    #[error("Upstream request failed for {0}: {1}")]
    Request(String, String),

    #[error("Upstream {0} responded with {1}")]
    UpstreamStatus(String, StatusCode),

    #[error("Queue error: {0}")]
    Queue(#[from] QueueError),
}

/// Errors that stop the gateway from starting or serving
#[derive(Error, Debug)]
pub enum IntakeError {
    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),

    #[error("Invalid config: {0}")]
    Config(#[from] ValidationError),
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_internal_error_is_redacted() {
        let err = RequestError::Internal("expected value at line 1 column 1".into());
        assert_eq!(err.status(), StatusCode::INTERNAL_SERVER_ERROR);
        assert_eq!(err.body(), json!({ "error": "Internal server error" }));
    }

    #[test]
    fn test_missing_fields_lists_all_required() {
        let err = RequestError::MissingFields(vec!["brief"]);
        assert_eq!(err.status(), StatusCode::BAD_REQUEST);
        assert_eq!(
            err.body()["required"],
            json!(["email", "task", "round", "nonce", "brief", "evaluation_url"])
        );
    }
}
