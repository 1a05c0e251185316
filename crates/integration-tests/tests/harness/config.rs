//! Programmatic configuration builder for integration tests

use std::net::SocketAddr;

use secrecy::SecretString;
use switchboard_config::{Config, ProviderKind};

/// Backend-wide key the mock expects as a bearer token
pub const BACKEND_KEY: &str = "test-key";

/// Provider key forwarded in the request body
pub const OPENAI_KEY: &str = "sk-openai-test";

/// Builder for constructing test configurations
pub struct ConfigBuilder {
    config: Config,
}

impl ConfigBuilder {
    /// Configuration pointing at `backend_url` with both keys set
    pub fn new(backend_url: &str) -> Self {
        let mut config = Config::default();
        config.server.listen_address = Some(SocketAddr::from(([127, 0, 0, 1], 0)));
        config.backend.base_url = backend_url.parse().expect("valid URL");
        config.backend.api_key = Some(SecretString::from(BACKEND_KEY));
        config.backend.timeout_seconds = 5;
        config.backend.idle_timeout_seconds = 5;
        config.models.openai.api_key = Some(SecretString::from(OPENAI_KEY));

        Self { config }
    }

    pub fn with_preferred_provider(mut self, kind: ProviderKind) -> Self {
        self.config.models.preferred_provider = kind;
        self
    }

    pub fn with_gemini_key(mut self, key: &str) -> Self {
        self.config.models.gemini.api_key = Some(SecretString::from(key));
        self
    }

    pub fn with_small_model(mut self, model: &str) -> Self {
        self.config.models.openai.small_model = Some(model.to_owned());
        self
    }

    pub fn with_idle_timeout(mut self, seconds: u64) -> Self {
        self.config.backend.idle_timeout_seconds = seconds;
        self
    }

    /// Remove every credential
    pub fn without_keys(mut self) -> Self {
        self.config.backend.api_key = None;
        self.config.models.openai.api_key = None;
        self.config.models.gemini.api_key = None;
        self
    }

    /// Disable health endpoint
    pub fn without_health(mut self) -> Self {
        self.config.server.health.enabled = false;
        self
    }

    /// Build the final config
    pub fn build(self) -> Config {
        self.config
    }
}
