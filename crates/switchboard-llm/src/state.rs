//! Shared request state and the end-to-end translation flow

use std::sync::Arc;
use std::time::Duration;

use futures_util::Stream;
use secrecy::SecretString;
use switchboard_config::{BackendConfig, ModelsConfig, ProviderKind, is_set};

use crate::backend::{Backend, OpenAiBackend};
use crate::bridge::{TranslationState, bridge_stream};
use crate::convert::{TranscodeOptions, new_message_id, translate_request, translate_response};
use crate::error::LlmError;
use crate::protocol::anthropic::{CountTokensRequest, CountTokensResponse, MessagesRequest, MessagesResponse, StreamEvent};
use crate::protocol::openai::ChatRequest;
use crate::routing::{ModelRouter, Provider, RoutingTarget};
use crate::tokens::estimate_input_tokens;

/// Shared state for the Messages API handlers
#[derive(Clone)]
pub struct LlmState {
    inner: Arc<LlmStateInner>,
}

struct LlmStateInner {
    router: ModelRouter,
    backend: Arc<dyn Backend>,
    options: TranscodeOptions,
    openai_key: Option<SecretString>,
    gemini_key: Option<SecretString>,
    timeout: Duration,
    idle_timeout: Duration,
}

impl LlmState {
    /// Build state talking to the configured HTTP backend
    pub fn from_config(backend: &BackendConfig, models: &ModelsConfig) -> Result<Self, LlmError> {
        let client = OpenAiBackend::new(backend)?;
        tracing::info!(url = %client.completions_url(), "backend configured");

        Ok(Self::new(Arc::new(client), backend, models))
    }

    /// Build state around an arbitrary backend
    pub fn new(backend: Arc<dyn Backend>, backend_config: &BackendConfig, models: &ModelsConfig) -> Self {
        let provider_key = |kind: ProviderKind| {
            models
                .provider(kind)
                .api_key
                .clone()
                .filter(|key| is_set(Some(key)))
        };

        Self {
            inner: Arc::new(LlmStateInner {
                router: ModelRouter::new(models),
                backend,
                options: TranscodeOptions {
                    qualify_model_ids: backend_config.qualify_model_ids,
                    include_stream_usage: backend_config.include_stream_usage,
                },
                openai_key: provider_key(ProviderKind::Openai),
                gemini_key: provider_key(ProviderKind::Gemini),
                timeout: backend_config.timeout(),
                idle_timeout: backend_config.idle_timeout(),
            }),
        }
    }

    /// Routing decision for a requested model id
    pub fn route(&self, model: &str) -> RoutingTarget {
        self.inner.router.route(model)
    }

    /// Complete a non-streaming request
    pub async fn messages(
        &self,
        request: &MessagesRequest,
        target: &RoutingTarget,
    ) -> Result<MessagesResponse, LlmError> {
        let chat = self.build_chat(request, target)?;

        let response = tokio::time::timeout(self.inner.timeout, self.inner.backend.complete(&chat))
            .await
            .map_err(|_| LlmError::Timeout(self.inner.timeout.as_secs()))??;

        Ok(translate_response(response, &request.model))
    }

    /// Start a streaming request
    ///
    /// Errors before the backend accepted the request are returned directly;
    /// anything later arrives as an `error` event in the stream.
    pub async fn messages_stream(
        &self,
        request: &MessagesRequest,
        target: &RoutingTarget,
    ) -> Result<impl Stream<Item = StreamEvent> + Send + 'static, LlmError> {
        let chat = self.build_chat(request, target)?;

        let chunks = tokio::time::timeout(self.inner.timeout, self.inner.backend.complete_stream(&chat))
            .await
            .map_err(|_| LlmError::Timeout(self.inner.timeout.as_secs()))??;

        let state = TranslationState::new(new_message_id(), request.model.clone());
        Ok(bridge_stream(chunks, state, self.inner.idle_timeout))
    }

    /// Estimate the prompt size of a request
    pub fn count_tokens(&self, request: &CountTokensRequest) -> CountTokensResponse {
        CountTokensResponse {
            input_tokens: estimate_input_tokens(request),
        }
    }

    fn build_chat(&self, request: &MessagesRequest, target: &RoutingTarget) -> Result<ChatRequest, LlmError> {
        let mut chat = translate_request(request, target, &self.inner.options)?;

        chat.api_key = match target.provider {
            Provider::Openai => self.inner.openai_key.clone(),
            Provider::Gemini => self.inner.gemini_key.clone(),
            Provider::PassThrough => None,
        };

        Ok(chat)
    }
}
