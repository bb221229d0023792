//! Assistant API errors.

use serde::Deserialize;
use thiserror::Error;

#[derive(Debug, Error)]
pub enum ClaudeError {
    #[error("HTTP error: {0}")]
    Http(#[from] reqwest::Error),

    #[error("API error ({kind}): {message}")]
    Api { kind: String, message: String },

    /// HTTP 429; the value is `Retry-After` in seconds.
    #[error("rate limited, retry after {0} seconds")]
    RateLimited(u64),

    /// HTTP 529 or an `overloaded_error` event mid-stream.
    #[error("assistant API is overloaded")]
    Overloaded,

    #[error("unauthorized: {0}")]
    Unauthorized(String),

    #[error("malformed stream event: {0}")]
    Parse(String),

    #[error("stream interrupted: {0}")]
    Stream(String),

    #[error("invalid client configuration: {0}")]
    Config(&'static str),
}

impl ClaudeError {
    /// Whether asking again later may succeed.
    #[must_use]
    pub const fn is_transient(&self) -> bool {
        matches!(
            self,
            Self::RateLimited(_) | Self::Overloaded | Self::Stream(_) | Self::Http(_)
        )
    }

    /// Build from the JSON error body of a failed request.
    pub(crate) fn from_body(body: &str) -> Self {
        match serde_json::from_str::<ErrorEnvelope>(body) {
            Ok(envelope) if envelope.error.kind == "overloaded_error" => Self::Overloaded,
            Ok(envelope) => Self::Api {
                kind: envelope.error.kind,
                message: envelope.error.message,
            },
            Err(_) => Self::Api {
                kind: "unknown".to_string(),
                message: body.chars().take(200).collect(),
            },
        }
    }
}

#[derive(Debug, Deserialize)]
struct ErrorEnvelope {
    error: ErrorDetail,
}

/// The `error` object of an error body or `error` stream event.
#[derive(Debug, Clone, Deserialize)]
pub struct ErrorDetail {
    #[serde(rename = "type")]
    pub kind: String,
    pub message: String,
}

#[cfg(test)]
#[allow(clippy::unwrap_used)]
mod tests {
    use super::*;

    #[test]
    fn test_from_body() {
        let err = ClaudeError::from_body(
            r#"{"type":"error","error":{"type":"invalid_request_error","message":"max_tokens is too large"}}"#,
        );
        assert_eq!(
            err.to_string(),
            "API error (invalid_request_error): max_tokens is too large"
        );
        assert!(!err.is_transient());
    }

    #[test]
    fn test_overloaded_body() {
        let err = ClaudeError::from_body(
            r#"{"type":"error","error":{"type":"overloaded_error","message":"Overloaded"}}"#,
        );
        assert!(matches!(err, ClaudeError::Overloaded));
        assert!(err.is_transient());
    }

    #[test]
    fn test_unparseable_body_is_truncated() {
        let body = "x".repeat(500);
        match ClaudeError::from_body(&body) {
            ClaudeError::Api { kind, message } => {
                assert_eq!(kind, "unknown");
                assert_eq!(message.len(), 200);
            }
            other => panic!("unexpected {other:?}"),
        }
    }
}
