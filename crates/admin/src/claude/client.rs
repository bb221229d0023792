//! Streaming client for the Anthropic Messages API.

use std::sync::Arc;

use async_stream::stream;
use futures::Stream;
use reqwest::header::{CONTENT_TYPE, HeaderMap, HeaderValue};
use secrecy::ExposeSecret;
use tracing::instrument;

use crate::config::ClaudeConfig;

use super::error::ClaudeError;
use super::types::{ChatRequest, Message, StreamEvent};

const ANTHROPIC_API_URL: &str = "https://api.anthropic.com/v1/messages";
const ANTHROPIC_VERSION: &str = "2023-06-01";
const DEFAULT_MAX_TOKENS: u32 = 2048;

/// Claude API client.
#[derive(Clone)]
pub struct ClaudeClient {
    inner: Arc<ClaudeClientInner>,
}

struct ClaudeClientInner {
    client: reqwest::Client,
    endpoint: String,
    model: String,
}

impl std::fmt::Debug for ClaudeClient {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("ClaudeClient")
            .field("endpoint", &self.inner.endpoint)
            .field("model", &self.inner.model)
            .finish_non_exhaustive()
    }
}

impl ClaudeClient {
    /// Create a client for the public API.
    ///
    /// # Errors
    ///
    /// Returns `ClaudeError::Config` if the API key isn't a valid header value.
    pub fn new(config: &ClaudeConfig) -> Result<Self, ClaudeError> {
        Self::with_endpoint(config, ANTHROPIC_API_URL)
    }

    /// Create a client that posts to `endpoint` instead of the public API.
    ///
    /// # Errors
    ///
    /// Returns `ClaudeError::Config` if the API key isn't a valid header value.
    pub fn with_endpoint(config: &ClaudeConfig, endpoint: &str) -> Result<Self, ClaudeError> {
        let mut headers = HeaderMap::new();
        headers.insert(CONTENT_TYPE, HeaderValue::from_static("application/json"));
        headers.insert(
            "x-api-key",
            HeaderValue::from_str(config.api_key.expose_secret())
                .map_err(|_| ClaudeError::Config("API key is not a valid header value"))?,
        );
        headers.insert(
            "anthropic-version",
            HeaderValue::from_static(ANTHROPIC_VERSION),
        );

        let client = reqwest::Client::builder()
            .default_headers(headers)
            .build()?;

        Ok(Self {
            inner: Arc::new(ClaudeClientInner {
                client,
                endpoint: endpoint.to_string(),
                model: config.model.clone(),
            }),
        })
    }

    #[must_use]
    pub fn model(&self) -> &str {
        &self.inner.model
    }

    /// Send a conversation and stream the reply.
    ///
    /// # Errors
    ///
    /// Returns an error if the initial request fails; later failures are
    /// yielded by the stream.
    #[instrument(skip(self, messages, system), fields(model = %self.inner.model, messages = messages.len()))]
    pub async fn chat_stream(
        &self,
        messages: Vec<Message>,
        system: Option<String>,
    ) -> Result<impl Stream<Item = Result<StreamEvent, ClaudeError>> + Send + 'static, ClaudeError>
    {
        let request = ChatRequest {
            model: self.inner.model.clone(),
            max_tokens: DEFAULT_MAX_TOKENS,
            messages,
            system,
            stream: Some(true),
        };

        let response = self
            .inner
            .client
            .post(&self.inner.endpoint)
            .json(&request)
            .send()
            .await?;

        let status = response.status();
        if !status.is_success() {
            return Err(error_from_status(status, response).await);
        }

        Ok(stream! {
            use futures::StreamExt;

            let mut buffer = String::new();
            let mut byte_stream = std::pin::pin!(response.bytes_stream());

            while let Some(chunk) = byte_stream.next().await {
                match chunk {
                    Ok(chunk) => {
                        buffer.push_str(&String::from_utf8_lossy(&chunk));
                        while let Some(event) = extract_sse_event(&mut buffer) {
                            if let Some(parsed) = parse_sse_event(&event) {
                                yield parsed;
                            }
                        }
                    }
                    Err(e) => {
                        yield Err(ClaudeError::Stream(e.to_string()));
                        break;
                    }
                }
            }
        })
    }
}

async fn error_from_status(status: reqwest::StatusCode, response: reqwest::Response) -> ClaudeError {
    match status.as_u16() {
        429 => {
            let retry_after = response
                .headers()
                .get("Retry-After")
                .and_then(|v| v.to_str().ok())
                .and_then(|s| s.parse().ok())
                .unwrap_or(60);
            ClaudeError::RateLimited(retry_after)
        }
        401 => ClaudeError::Unauthorized("Invalid API key".to_string()),
        529 => ClaudeError::Overloaded,
        _ => match response.text().await {
            Ok(body) => ClaudeError::from_body(&body),
            Err(e) => ClaudeError::Http(e),
        },
    }
}

/// Take one complete SSE event off the front of `buffer`.
fn extract_sse_event(buffer: &mut String) -> Option<String> {
    if buffer.contains('\r') {
        *buffer = buffer.replace("\r\n", "\n");
    }
    let idx = buffer.find("\n\n")?;
    let rest = buffer.split_off(idx + 2);
    let mut event = std::mem::replace(buffer, rest);
    event.truncate(idx);
    Some(event)
}

fn parse_sse_event(event: &str) -> Option<Result<StreamEvent, ClaudeError>> {
    let data = event
        .lines()
        .find_map(|line| line.strip_prefix("data:"))
        .map(str::trim)?;

    if data.is_empty() || data == "[DONE]" {
        return None;
    }

    Some(
        serde_json::from_str::<StreamEvent>(data)
            .map_err(|e| ClaudeError::Parse(e.to_string())),
    )
}

#[cfg(test)]
#[allow(clippy::unwrap_used)]
mod tests {
    use super::*;

    #[test]
    fn test_extract_sse_event() {
        let mut buffer = "event: message_start\ndata: {}\n\nevent: ping\ndata: {}\n\n".to_string();

        assert!(extract_sse_event(&mut buffer).unwrap().contains("message_start"));
        assert!(extract_sse_event(&mut buffer).unwrap().contains("ping"));
        assert!(extract_sse_event(&mut buffer).is_none());
    }

    #[test]
    fn test_extract_sse_event_crlf() {
        let mut buffer = "event: ping\r\ndata: {\"type\":\"ping\"}\r\n\r\n".to_string();
        let event = extract_sse_event(&mut buffer).unwrap();
        assert!(matches!(
            parse_sse_event(&event).unwrap().unwrap(),
            StreamEvent::Ping
        ));
    }

    #[test]
    fn test_extract_sse_event_incomplete() {
        let mut buffer = "event: message_start\ndata: {\"partial".to_string();
        assert!(extract_sse_event(&mut buffer).is_none());
        assert_eq!(buffer, "event: message_start\ndata: {\"partial");
    }

    #[test]
    fn test_parse_sse_event_empty() {
        assert!(parse_sse_event("").is_none());
        assert!(parse_sse_event("event: ping").is_none());
    }

    #[test]
    fn test_parse_sse_event_error() {
        let event = r#"event: error
data: {"type":"error","error":{"type":"overloaded_error","message":"Overloaded"}}"#;
        let parsed = parse_sse_event(event).unwrap().unwrap();
        assert!(matches!(parsed, StreamEvent::Error { error } if error.kind == "overloaded_error"));
    }

    #[test]
    fn test_claude_client_is_send_sync() {
        fn assert_send_sync<T: Send + Sync + Clone>() {}
        assert_send_sync::<ClaudeClient>();
    }
}
