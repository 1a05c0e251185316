//! HTTP client for an OpenAI-compatible backend such as `LiteLLM`

use std::time::Duration;

use async_trait::async_trait;
use eventsource_stream::Eventsource;
use futures_util::{Stream, StreamExt, future};
use reqwest::{Client, Response};
use secrecy::{ExposeSecret, SecretString};
use switchboard_config::BackendConfig;

use super::{Backend, ChunkStream};
use crate::error::LlmError;
use crate::protocol::openai::{BackendErrorBody, ChatChunk, ChatRequest, ChatResponse};

/// Stream terminator sent as the final `data:` payload
const DONE_MARKER: &str = "[DONE]";

/// Chat-completions client
pub struct OpenAiBackend {
    client: Client,
    completions_url: String,
    api_key: Option<SecretString>,
    timeout: Duration,
}

impl OpenAiBackend {
    pub fn new(config: &BackendConfig) -> Result<Self, LlmError> {
        let client = Client::builder()
            .connect_timeout(config.timeout())
            .build()
            .map_err(|e| LlmError::Internal(anyhow::anyhow!("failed to build HTTP client: {e}")))?;

        let base = config.base_url.as_str().trim_end_matches('/');

        Ok(Self {
            client,
            completions_url: format!("{base}/chat/completions"),
            api_key: config.api_key.clone().filter(|key| !key.expose_secret().is_empty()),
            timeout: config.timeout(),
        })
    }

    pub fn completions_url(&self) -> &str {
        &self.completions_url
    }

    async fn send(&self, request: &ChatRequest) -> Result<Response, LlmError> {
        let mut builder = self.client.post(&self.completions_url).json(request);

        if let Some(key) = &self.api_key {
            builder = builder.bearer_auth(key.expose_secret());
        }

        let response = builder.send().await.map_err(|e| {
            tracing::error!(url = %self.completions_url, error = %e, "backend request failed");
            if e.is_timeout() {
                LlmError::Timeout(self.timeout.as_secs())
            } else {
                LlmError::Transport(e.to_string())
            }
        })?;

        let status = response.status();
        if status.is_success() {
            return Ok(response);
        }

        let body = response.text().await.unwrap_or_default();
        tracing::warn!(status = %status, model = %request.model, "backend returned error");

        Err(LlmError::Backend {
            status,
            message: backend_error_message(&body, status),
        })
    }
}

#[async_trait]
impl Backend for OpenAiBackend {
    async fn complete(&self, request: &ChatRequest) -> Result<ChatResponse, LlmError> {
        let response = self.send(request).await?;

        response
            .json::<ChatResponse>()
            .await
            .map_err(|e| LlmError::Transport(format!("failed to parse backend response: {e}")))
    }

    async fn complete_stream(&self, request: &ChatRequest) -> Result<ChunkStream, LlmError> {
        let response = self.send(request).await?;
        Ok(decode_frames(response.bytes_stream()))
    }
}

/// Human-readable message from a backend error body
///
/// Prefers `{"error": {"message": ...}}`, then the raw body, then the
/// status line.
fn backend_error_message(body: &str, status: http::StatusCode) -> String {
    if let Ok(parsed) = serde_json::from_str::<BackendErrorBody>(body) {
        return parsed.error.message;
    }

    let trimmed = body.trim();
    if trimmed.is_empty() {
        status.to_string()
    } else {
        trimmed.to_owned()
    }
}

/// Turn a raw SSE byte stream into decoded chunks
///
/// Every complete `data:` line is a frame, whether lines are separated by a
/// blank line or a single newline. Frames may be split across reads at any
/// byte. The stream ends at the `[DONE]` marker or when the body closes.
/// Frames that are not valid chunk JSON are logged and skipped; transport
/// failures surface as [`LlmError::Streaming`].
pub(crate) fn decode_frames<S, B, E>(bytes: S) -> ChunkStream
where
    S: Stream<Item = Result<B, E>> + Send + 'static,
    B: AsRef<[u8]> + Send + 'static,
    E: std::fmt::Display + Send + 'static,
{
    let chunks = bytes
        .map(|read| read.map(|b| line_per_event(b.as_ref())))
        .eventsource()
        .take_while(|frame| {
            let done = matches!(frame, Ok(event) if event.data.trim() == DONE_MARKER);
            future::ready(!done)
        })
        .filter_map(|frame| {
            future::ready(match frame {
                Ok(event) => parse_chunk(&event.data),
                Err(e) => Some(Err(LlmError::Streaming(e.to_string()))),
            })
        });

    Box::pin(chunks)
}

/// Terminate every line with a blank line
///
/// The event-stream parser only dispatches at a blank line, so doubling each
/// line feed makes one event per line. Surplus blank lines dispatch nothing.
fn line_per_event(read: &[u8]) -> Vec<u8> {
    let mut framed = Vec::with_capacity(read.len() + read.len() / 8);
    for &byte in read {
        framed.push(byte);
        if byte == b'\n' {
            framed.push(b'\n');
        }
    }
    framed
}

fn parse_chunk(data: &str) -> Option<Result<ChatChunk, LlmError>> {
    let data = data.trim();
    if data.is_empty() {
        return None;
    }

    match serde_json::from_str::<ChatChunk>(data) {
        Ok(chunk) => Some(Ok(chunk)),
        Err(e) => {
            tracing::warn!(error = %e, data = %data, "skipping malformed stream frame");
            None
        }
    }
}

#[cfg(test)]
mod tests {
    use std::convert::Infallible;

    use futures_util::stream;

    use super::*;

    async fn decode(pieces: Vec<&'static str>) -> Vec<Result<ChatChunk, LlmError>> {
        let bytes = stream::iter(pieces.into_iter().map(Ok::<_, Infallible>));
        decode_frames(bytes).collect().await
    }

    fn content(chunk: &ChatChunk) -> Option<&str> {
        chunk.choices.first()?.delta.content.as_deref()
    }

    #[tokio::test]
    async fn frames_split_across_reads_are_reassembled() {
        let chunks = decode(vec![
            "data: {\"choices\":[{\"index\":0,\"delta\":{\"content\":\"Hel",
            "lo\"}}]}\n",
            "\ndata: {\"choices\":[{\"index\":0,\"delta\":{\"content\":\" world\"}}]}\n\n",
            "data: [DONE]\n\n",
        ])
        .await;

        let texts: Vec<_> = chunks.iter().map(|c| content(c.as_ref().unwrap()).unwrap()).collect();
        assert_eq!(texts, vec!["Hello", " world"]);
    }

    #[tokio::test]
    async fn malformed_frames_are_skipped() {
        let chunks = decode(vec![
            "data: {\"choices\":[{\"delta\":{\"content\":\"a\"}}]}\n\n",
            "data: {broken\n\n",
            ": keep-alive comment\n\n",
            "data: {\"choices\":[{\"delta\":{\"content\":\"b\"}}]}\n\n",
        ])
        .await;

        assert_eq!(chunks.len(), 2);
        assert!(chunks.iter().all(Result::is_ok));
    }

    #[tokio::test]
    async fn nothing_after_done_is_read() {
        let chunks = decode(vec![
            "data: {\"choices\":[{\"delta\":{\"content\":\"a\"}}]}\n\ndata: [DONE]\n\n",
            "data: {\"choices\":[{\"delta\":{\"content\":\"late\"}}]}\n\n",
        ])
        .await;

        assert_eq!(chunks.len(), 1);
    }

    #[tokio::test]
    async fn body_closing_without_done_ends_the_stream() {
        let chunks = decode(vec!["data: {\"choices\":[{\"delta\":{\"content\":\"a\"}}]}\n\n"]).await;
        assert_eq!(chunks.len(), 1);
    }

    #[tokio::test]
    async fn single_newline_frames_are_decoded() {
        let chunks = decode(vec![
            "data: {\"choices\":[{\"delta\":{\"content\":\"a\"}}]}\n",
            "data: {\"choices\":[{\"delta\":{\"content\":\"b\"}}]}\ndata: [DONE]\n",
            "data: {\"choices\":[{\"delta\":{\"content\":\"late\"}}]}\n",
        ])
        .await;

        let texts: Vec<_> = chunks.iter().map(|c| content(c.as_ref().unwrap()).unwrap()).collect();
        assert_eq!(texts, vec!["a", "b"]);
    }

    #[tokio::test]
    async fn final_complete_line_is_kept_when_body_closes() {
        let chunks = decode(vec!["data: {\"choices\":[{\"delta\":{\"content\":\"a\"}}]}\n"]).await;

        assert_eq!(chunks.len(), 1);
        assert_eq!(content(chunks[0].as_ref().unwrap()), Some("a"));
    }

    #[tokio::test]
    async fn crlf_line_ends_are_split() {
        let chunks = decode(vec![
            "data: {\"choices\":[{\"delta\":{\"content\":\"a\"}}]}\r\n",
            "data: {\"choices\":[{\"delta\":{\"content\":\"b\"}}]}\r\n\r\n",
        ])
        .await;

        assert_eq!(chunks.len(), 2);
    }

    #[tokio::test]
    async fn usage_only_chunk_is_decoded() {
        let chunks = decode(vec![
            "data: {\"choices\":[],\"usage\":{\"prompt_tokens\":7,\"completion_tokens\":2,\"total_tokens\":9}}\n\n",
        ])
        .await;

        let chunk = chunks[0].as_ref().unwrap();
        assert!(chunk.choices.is_empty());
        assert_eq!(chunk.usage.as_ref().unwrap().completion_tokens, 2);
    }

    #[test]
    fn error_message_prefers_structured_body() {
        let status = http::StatusCode::UNAUTHORIZED;
        assert_eq!(
            backend_error_message(r#"{"error":{"message":"bad key","type":"auth"}}"#, status),
            "bad key"
        );
        assert_eq!(backend_error_message("plain failure", status), "plain failure");
        assert_eq!(backend_error_message("", status), "401 Unauthorized");
    }

    #[test]
    fn completions_url_is_joined_without_double_slash() {
        let config = BackendConfig {
            base_url: "http://litellm:4000/v1/".parse().unwrap(),
            ..BackendConfig::default()
        };

        let backend = OpenAiBackend::new(&config).unwrap();
        assert_eq!(backend.completions_url(), "http://litellm:4000/v1/chat/completions");
    }
}
