use std::time::Duration;

use secrecy::SecretString;
use serde::Deserialize;
use url::Url;

/// Default backend location (a local `LiteLLM` proxy)
pub const DEFAULT_BACKEND_URL: &str = "http://localhost:4000";

/// The OpenAI-compatible chat-completions backend
#[derive(Debug, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct BackendConfig {
    /// Base URL; requests go to `{base_url}/chat/completions`
    #[serde(default = "default_base_url")]
    pub base_url: Url,
    /// Bearer token sent with every backend request
    #[serde(default)]
    pub api_key: Option<SecretString>,
    /// Bound on a single-shot completion and on stream establishment
    #[serde(default = "default_timeout_seconds")]
    pub timeout_seconds: u64,
    /// Longest tolerated silence between two streamed chunks
    #[serde(default = "default_timeout_seconds")]
    pub idle_timeout_seconds: u64,
    /// Send `openai/<id>` style model ids
    #[serde(default = "default_true")]
    pub qualify_model_ids: bool,
    /// Ask for a trailing usage chunk on streamed responses
    #[serde(default = "default_true")]
    pub include_stream_usage: bool,
}

impl Default for BackendConfig {
    fn default() -> Self {
        Self {
            base_url: default_base_url(),
            api_key: None,
            timeout_seconds: default_timeout_seconds(),
            idle_timeout_seconds: default_timeout_seconds(),
            qualify_model_ids: true,
            include_stream_usage: true,
        }
    }
}

impl BackendConfig {
    pub const fn timeout(&self) -> Duration {
        Duration::from_secs(self.timeout_seconds)
    }

    pub const fn idle_timeout(&self) -> Duration {
        Duration::from_secs(self.idle_timeout_seconds)
    }
}

fn default_base_url() -> Url {
    Url::parse(DEFAULT_BACKEND_URL).expect("valid default URL")
}

const fn default_timeout_seconds() -> u64 {
    60
}

const fn default_true() -> bool {
    true
}
