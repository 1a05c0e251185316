//! Axum route handlers for the Anthropic-compatible endpoints

use std::convert::Infallible;

use axum::extract::State;
use axum::extract::rejection::JsonRejection;
use axum::response::sse::{Event, KeepAlive, Sse};
use axum::response::{IntoResponse, Response};
use axum::{Json, Router, routing};
use futures_util::{Stream, StreamExt, stream};
use http::StatusCode;
use serde::Serialize;
use switchboard_core::HttpError;

use crate::error::LlmError;
use crate::protocol::anthropic::{CountTokensRequest, ErrorResponse, MessagesRequest, StreamEvent};
use crate::routing::RoutingTarget;
use crate::state::LlmState;

const MESSAGES_PATH: &str = "/v1/messages";
const COUNT_TOKENS_PATH: &str = "/v1/messages/count_tokens";

/// Payload of the `error` event sent when an event cannot be serialized
const SERIALIZATION_FAILED: &str =
    r#"{"type":"error","error":{"type":"api_error","message":"failed to serialize stream event"}}"#;

/// Build the router for the Messages API
pub fn llm_router(state: LlmState) -> Router {
    Router::new()
        .route(MESSAGES_PATH, routing::post(messages))
        .route(COUNT_TOKENS_PATH, routing::post(count_tokens))
        .with_state(state)
}

/// Handle `POST /v1/messages`
async fn messages(State(state): State<LlmState>, body: Result<Json<MessagesRequest>, JsonRejection>) -> Response {
    let request = match body {
        Ok(Json(request)) => request,
        Err(rejection) => return rejection_response(&rejection),
    };

    let target = state.route(&request.model);

    let response = if request.is_stream() {
        match state.messages_stream(&request, &target).await {
            Ok(events) => sse_response(events).into_response(),
            Err(e) => error_response(e),
        }
    } else {
        match state.messages(&request, &target).await {
            Ok(reply) => Json(reply).into_response(),
            Err(e) => error_response(e),
        }
    };

    log_request(
        MESSAGES_PATH,
        &request.model,
        &target,
        request.messages.len(),
        request.tool_count(),
        response.status(),
    );

    response
}

/// Handle `POST /v1/messages/count_tokens`
async fn count_tokens(
    State(state): State<LlmState>,
    body: Result<Json<CountTokensRequest>, JsonRejection>,
) -> Response {
    let request = match body {
        Ok(Json(request)) => request,
        Err(rejection) => return rejection_response(&rejection),
    };

    let target = state.route(&request.model);
    let counted = state.count_tokens(&request);

    log_request(
        COUNT_TOKENS_PATH,
        &request.model,
        &target,
        request.messages.len(),
        request.tools.as_ref().map_or(0, Vec::len),
        StatusCode::OK,
    );

    Json(counted).into_response()
}

/// Frame bridge events as SSE, ending with the `[DONE]` sentinel
fn sse_response(
    events: impl Stream<Item = StreamEvent> + Send + 'static,
) -> Sse<impl Stream<Item = Result<Event, Infallible>>> {
    let frames = events
        .map(|event| Ok(sse_event(event.name(), &event)))
        .chain(stream::once(async { Ok(Event::default().data("[DONE]")) }));

    Sse::new(frames).keep_alive(KeepAlive::default())
}

/// Named SSE event with a JSON payload
///
/// A payload that cannot be serialized is replaced by an `error` event so
/// the client never receives an empty frame.
fn sse_event<T: Serialize>(name: &'static str, payload: &T) -> Event {
    Event::default().event(name).json_data(payload).unwrap_or_else(|e| {
        tracing::error!(event = name, error = %e, "failed to serialize stream event");
        Event::default().event("error").data(SERIALIZATION_FAILED)
    })
}

/// Convert an error to an Anthropic-style JSON error response
#[allow(clippy::needless_pass_by_value)]
pub fn error_response(error: LlmError) -> Response {
    let status = error.status_code();

    if error.is_server_error() {
        tracing::error!(status = %status, error = %error, "request failed");
    } else {
        tracing::debug!(status = %status, error = %error, "request rejected");
    }

    (status, Json(ErrorResponse::new(error.error_type(), error.client_message()))).into_response()
}

fn rejection_response(rejection: &JsonRejection) -> Response {
    error_response(LlmError::InvalidRequest(rejection.body_text()))
}

fn log_request(
    path: &str,
    model: &str,
    target: &RoutingTarget,
    message_count: usize,
    tool_count: usize,
    status: StatusCode,
) {
    tracing::info!(
        method = "POST",
        path,
        original_model = %model,
        backend_model = %target.backend_model_id,
        provider = %target.provider,
        message_count,
        tool_count,
        status = status.as_u16(),
        "request handled"
    );
}
