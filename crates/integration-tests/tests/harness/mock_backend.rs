//! Mock chat-completions backend for integration tests
//!
//! Speaks just enough of the `OpenAI` API to answer `/v1/chat/completions`
//! with a scripted reply, and records what it was sent.

use std::net::SocketAddr;
use std::sync::atomic::{AtomicU32, Ordering};
use std::sync::{Arc, Mutex};

use axum::extract::State;
use axum::http::{HeaderMap, StatusCode, header};
use axum::response::{IntoResponse, Response};
use axum::{Json, Router, routing};
use serde_json::{Value, json};
use tokio_util::sync::CancellationToken;

/// What the mock answers with
#[derive(Debug, Clone)]
pub enum Scenario {
    /// Plain text, streamed in two fragments
    Text(String),
    /// One `get_weather` call whose arguments arrive in two fragments
    ToolCall,
    /// A stream that stops after one fragment, without finish reason or `[DONE]`
    Truncated,
    /// A stream containing one frame that is not JSON
    MalformedFrame,
    /// Text frames separated by single newlines, ending in a complete line
    /// without `[DONE]`
    LineDelimited,
    /// A non-success status with an `OpenAI` error body
    Failing(StatusCode, String),
}

/// Mock backend listening on a random local port
pub struct MockBackend {
    addr: SocketAddr,
    shutdown: CancellationToken,
    state: Arc<MockState>,
}

struct MockState {
    scenario: Scenario,
    request_count: AtomicU32,
    last_request: Mutex<Option<Value>>,
    last_authorization: Mutex<Option<String>>,
}

impl MockBackend {
    /// Start the mock server, returning immediately
    pub async fn start(scenario: Scenario) -> anyhow::Result<Self> {
        let state = Arc::new(MockState {
            scenario,
            request_count: AtomicU32::new(0),
            last_request: Mutex::new(None),
            last_authorization: Mutex::new(None),
        });

        let app = Router::new()
            .route("/v1/chat/completions", routing::post(handle_chat_completions))
            .with_state(Arc::clone(&state));

        let listener = tokio::net::TcpListener::bind("127.0.0.1:0").await?;
        let addr = listener.local_addr()?;
        let shutdown = CancellationToken::new();
        let shutdown_clone = shutdown.clone();

        tokio::spawn(async move {
            axum::serve(listener, app)
                .with_graceful_shutdown(async move {
                    shutdown_clone.cancelled().await;
                })
                .await
                .ok();
        });

        Ok(Self { addr, shutdown, state })
    }

    /// Start a mock answering with `text`
    pub async fn text(text: &str) -> anyhow::Result<Self> {
        Self::start(Scenario::Text(text.to_owned())).await
    }

    /// Base URL for configuring the mock as the backend
    ///
    /// Includes `/v1` since the client appends `/chat/completions`
    pub fn base_url(&self) -> String {
        format!("http://{}/v1", self.addr)
    }

    pub fn request_count(&self) -> u32 {
        self.state.request_count.load(Ordering::Relaxed)
    }

    /// Body of the most recent request
    pub fn last_request(&self) -> Value {
        self.state
            .last_request
            .lock()
            .unwrap()
            .clone()
            .expect("mock received a request")
    }

    /// `Authorization` header of the most recent request
    pub fn last_authorization(&self) -> Option<String> {
        self.state.last_authorization.lock().unwrap().clone()
    }
}

impl Drop for MockBackend {
    fn drop(&mut self) {
        self.shutdown.cancel();
    }
}

/// A local URL nothing is listening on
pub async fn unreachable_url() -> String {
    let listener = tokio::net::TcpListener::bind("127.0.0.1:0")
        .await
        .expect("bind ephemeral port");
    let addr = listener.local_addr().expect("local address");
    drop(listener);
    format!("http://{addr}/v1")
}

// -- Handlers --

async fn handle_chat_completions(
    State(state): State<Arc<MockState>>,
    headers: HeaderMap,
    Json(request): Json<Value>,
) -> Response {
    state.request_count.fetch_add(1, Ordering::Relaxed);
    *state.last_authorization.lock().unwrap() = headers
        .get(header::AUTHORIZATION)
        .and_then(|v| v.to_str().ok())
        .map(str::to_owned);
    *state.last_request.lock().unwrap() = Some(request.clone());

    let model = request["model"].as_str().unwrap_or_default().to_owned();
    let stream = request["stream"].as_bool().unwrap_or(false);

    if let Scenario::Failing(status, message) = &state.scenario {
        return (
            *status,
            Json(json!({"error": {"message": message, "type": "mock_error"}})),
        )
            .into_response();
    }

    if stream {
        let body = stream_body(&state.scenario, &model);
        ([(header::CONTENT_TYPE, "text/event-stream")], body).into_response()
    } else {
        Json(completion(&state.scenario, &model)).into_response()
    }
}

fn completion(scenario: &Scenario, model: &str) -> Value {
    let (message, finish_reason) = match scenario {
        Scenario::ToolCall => (
            json!({
                "role": "assistant",
                "content": null,
                "tool_calls": [{
                    "id": "call_test_123",
                    "type": "function",
                    "function": {"name": "get_weather", "arguments": "{\"location\":\"San Francisco\"}"}
                }]
            }),
            "tool_calls",
        ),
        Scenario::Text(text) => (json!({"role": "assistant", "content": text}), "stop"),
        _ => (json!({"role": "assistant", "content": "Hello from mock backend"}), "stop"),
    };

    json!({
        "id": "chatcmpl-test-123",
        "object": "chat.completion",
        "created": 1_700_000_000,
        "model": model,
        "choices": [{"index": 0, "message": message, "finish_reason": finish_reason}],
        "usage": {"prompt_tokens": 10, "completion_tokens": 5, "total_tokens": 15}
    })
}

fn chunk(model: &str, delta: &Value, finish_reason: Option<&str>) -> String {
    let chunk = json!({
        "id": "chatcmpl-test-stream",
        "object": "chat.completion.chunk",
        "created": 1_700_000_000,
        "model": model,
        "choices": [{"index": 0, "delta": delta, "finish_reason": finish_reason}]
    });
    format!("data: {chunk}\n\n")
}

fn usage_chunk(model: &str) -> String {
    let chunk = json!({
        "id": "chatcmpl-test-stream",
        "object": "chat.completion.chunk",
        "created": 1_700_000_000,
        "model": model,
        "choices": [],
        "usage": {"prompt_tokens": 10, "completion_tokens": 5, "total_tokens": 15}
    });
    format!("data: {chunk}\n\n")
}

fn stream_body(scenario: &Scenario, model: &str) -> String {
    let mut body = String::new();

    match scenario {
        Scenario::Text(text) => {
            let (head, tail) = text.split_at(text.len() / 2);
            body.push_str(&chunk(model, &json!({"role": "assistant", "content": head}), None));
            body.push_str(&chunk(model, &json!({"content": tail}), None));
            body.push_str(&chunk(model, &json!({}), Some("stop")));
            body.push_str(&usage_chunk(model));
            body.push_str("data: [DONE]\n\n");
        }
        Scenario::ToolCall => {
            body.push_str(&chunk(
                model,
                &json!({"role": "assistant", "tool_calls": [{
                    "index": 0,
                    "id": "call_test_123",
                    "type": "function",
                    "function": {"name": "get_weather", "arguments": "{\"location\":"}
                }]}),
                None,
            ));
            body.push_str(&chunk(
                model,
                &json!({"tool_calls": [{"index": 0, "function": {"arguments": "\"San Francisco\"}"}}]}),
                None,
            ));
            body.push_str(&chunk(model, &json!({}), Some("tool_calls")));
            body.push_str("data: [DONE]\n\n");
        }
        Scenario::Truncated => {
            body.push_str(&chunk(model, &json!({"role": "assistant", "content": "cut o"}), None));
        }
        Scenario::MalformedFrame => {
            body.push_str(&chunk(model, &json!({"role": "assistant", "content": "before "}), None));
            body.push_str("data: {this is not json\n\n");
            body.push_str(&chunk(model, &json!({"content": "after"}), None));
            body.push_str(&chunk(model, &json!({}), Some("stop")));
            body.push_str("data: [DONE]\n\n");
        }
        Scenario::LineDelimited => {
            for frame in [
                chunk(model, &json!({"role": "assistant", "content": "one "}), None),
                chunk(model, &json!({"content": "line each"}), None),
                chunk(model, &json!({}), Some("stop")),
            ] {
                body.push_str(frame.trim_end());
                body.push('\n');
            }
        }
        Scenario::Failing(..) => {}
    }

    body
}
