//! Liveness, readiness and service descriptor endpoints

use std::sync::Arc;
use std::time::Instant;

use axum::Json;
use axum::extract::State;
use axum::response::{IntoResponse, Response};
use http::StatusCode;
use serde::Serialize;
use switchboard_config::{Config, ProviderKind, is_set};
use switchboard_llm::protocol::anthropic::ErrorResponse;

/// Snapshot of what the health endpoints report
#[derive(Debug)]
pub struct HealthState {
    started: Instant,
    health_path: String,
    preferred_provider: ProviderKind,
    has_openai_key: bool,
    has_gemini_key: bool,
    has_backend_key: bool,
}

impl HealthState {
    pub fn new(config: &Config) -> Self {
        Self {
            started: Instant::now(),
            health_path: config.server.health.path.clone(),
            preferred_provider: config.models.preferred_provider,
            has_openai_key: is_set(config.models.openai.api_key.as_ref()),
            has_gemini_key: is_set(config.models.gemini.api_key.as_ref()),
            has_backend_key: is_set(config.backend.api_key.as_ref()),
        }
    }

    const fn has_any_key(&self) -> bool {
        self.has_openai_key || self.has_gemini_key || self.has_backend_key
    }
}

#[derive(Debug, Serialize)]
struct HealthReport {
    status: &'static str,
    uptime_seconds: u64,
    preferred_provider: ProviderKind,
    has_openai_key: bool,
    has_gemini_key: bool,
    has_backend_key: bool,
}

/// `GET /health`
pub async fn health_handler(State(state): State<Arc<HealthState>>) -> impl IntoResponse {
    Json(HealthReport {
        status: "healthy",
        uptime_seconds: state.started.elapsed().as_secs(),
        preferred_provider: state.preferred_provider,
        has_openai_key: state.has_openai_key,
        has_gemini_key: state.has_gemini_key,
        has_backend_key: state.has_backend_key,
    })
}

/// `GET /ready`
///
/// Not ready while no credential for the backend is configured.
pub async fn ready_handler(State(state): State<Arc<HealthState>>) -> Response {
    if state.has_any_key() {
        (StatusCode::OK, Json(serde_json::json!({ "status": "ready" }))).into_response()
    } else {
        (
            StatusCode::SERVICE_UNAVAILABLE,
            Json(serde_json::json!({
                "status": "not ready",
                "message": "No API keys configured",
            })),
        )
            .into_response()
    }
}

/// `GET /`
pub async fn root_handler(State(state): State<Arc<HealthState>>) -> impl IntoResponse {
    Json(serde_json::json!({
        "message": "Switchboard: Anthropic Messages API proxy for OpenAI-compatible backends",
        "version": env!("CARGO_PKG_VERSION"),
        "endpoints": {
            "messages": "/v1/messages",
            "count_tokens": "/v1/messages/count_tokens",
            "health": state.health_path,
        },
    }))
}

/// Fallback for unknown routes
pub async fn not_found_handler(uri: http::Uri) -> impl IntoResponse {
    (
        StatusCode::NOT_FOUND,
        Json(ErrorResponse::new("not_found_error", format!("no route for {}", uri.path()))),
    )
}
