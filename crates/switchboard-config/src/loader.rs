use std::path::Path;

use crate::{AnyOrList, Config, ProviderKind, is_set};

impl Config {
    /// Load configuration from a TOML file
    ///
    /// Reads the file, expands `{{ env.VAR }}` placeholders, then
    /// deserializes and validates the result.
    ///
    /// # Errors
    ///
    /// Returns an error if the file cannot be read, expansion or parsing
    /// fails, or the result does not validate
    pub fn load(path: &Path) -> anyhow::Result<Self> {
        let raw = std::fs::read_to_string(path)
            .map_err(|e| anyhow::anyhow!("failed to read config file {}: {e}", path.display()))?;

        Self::parse(&raw)
    }

    /// Parse and validate configuration from TOML text
    ///
    /// # Errors
    ///
    /// Returns an error if expansion, parsing, or validation fails
    pub fn parse(raw: &str) -> anyhow::Result<Self> {
        let expanded = crate::env::expand_env(raw).map_err(|e| anyhow::anyhow!("config variable expansion failed: {e}"))?;

        let config: Self = toml::from_str(&expanded).map_err(|e| anyhow::anyhow!("failed to parse config: {e}"))?;

        config.validate()?;

        Ok(config)
    }

    /// Validate that the configuration is internally consistent
    ///
    /// # Errors
    ///
    /// Returns an error if credentials are missing or backend settings are unusable
    pub fn validate(&self) -> anyhow::Result<()> {
        self.validate_credentials()?;
        self.validate_backend()?;
        self.validate_cors()?;
        Ok(())
    }

    /// At least one key must exist, and the preferred provider needs one
    /// unless a backend-wide key covers it
    fn validate_credentials(&self) -> anyhow::Result<()> {
        if !self.has_any_api_key() {
            anyhow::bail!(
                "at least one API key must be configured (models.openai.api_key, models.gemini.api_key, or backend.api_key)"
            );
        }

        let preferred = self.models.preferred_provider;

        if !is_set(self.models.provider(preferred).api_key.as_ref()) && !is_set(self.backend.api_key.as_ref()) {
            let field = match preferred {
                ProviderKind::Openai => "models.openai.api_key",
                ProviderKind::Gemini => "models.gemini.api_key",
            };
            anyhow::bail!("{field} is required when preferred_provider is '{preferred}'");
        }

        Ok(())
    }

    fn validate_backend(&self) -> anyhow::Result<()> {
        let scheme = self.backend.base_url.scheme();
        if scheme != "http" && scheme != "https" {
            anyhow::bail!("backend.base_url must use http or https, got '{scheme}'");
        }

        if self.backend.timeout_seconds == 0 {
            anyhow::bail!("backend.timeout_seconds must be greater than 0");
        }

        if self.backend.idle_timeout_seconds == 0 {
            anyhow::bail!("backend.idle_timeout_seconds must be greater than 0");
        }

        if self.server.body_limit_bytes == 0 {
            anyhow::bail!("server.body_limit_bytes must be greater than 0");
        }

        Ok(())
    }

    /// Credentialed CORS cannot be combined with wildcards
    fn validate_cors(&self) -> anyhow::Result<()> {
        let Some(cors) = &self.server.cors else {
            return Ok(());
        };

        if cors.credentials
            && [&cors.origins, &cors.methods, &cors.headers]
                .into_iter()
                .any(|value| *value == AnyOrList::Any)
        {
            anyhow::bail!("server.cors.credentials requires explicit origins, methods and headers");
        }

        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use crate::{Config, LogFormat, ProviderKind};

    #[test]
    fn minimal_config_gets_defaults() {
        let config = Config::parse(
            r#"
            [models.openai]
            api_key = "sk-test"
            "#,
        )
        .unwrap();

        assert_eq!(config.server.listen_address().to_string(), "0.0.0.0:8083");
        assert_eq!(config.server.body_limit_bytes, 10 * 1024 * 1024);
        assert!(config.server.health.enabled);
        assert_eq!(config.backend.base_url.as_str(), "http://localhost:4000/");
        assert_eq!(config.backend.timeout_seconds, 60);
        assert!(config.backend.qualify_model_ids);
        assert_eq!(config.models.preferred_provider, ProviderKind::Openai);
        assert_eq!(config.telemetry.format, LogFormat::Text);
    }

    #[test]
    fn rejects_config_without_keys() {
        let err = Config::parse("").unwrap_err();
        assert!(err.to_string().contains("at least one API key"));
    }

    #[test]
    fn preferred_provider_requires_its_key() {
        let err = Config::parse(
            r#"
            [models]
            preferred_provider = "google"

            [models.openai]
            api_key = "sk-test"
            "#,
        )
        .unwrap_err();

        assert!(err.to_string().contains("models.gemini.api_key"));
    }

    #[test]
    fn backend_key_satisfies_preferred_provider() {
        let config = Config::parse(
            r#"
            [backend]
            api_key = "sk-litellm"

            [models]
            preferred_provider = "gemini"
            "#,
        )
        .unwrap();

        assert_eq!(config.models.preferred_provider, ProviderKind::Gemini);
    }

    #[test]
    fn rejects_zero_timeout() {
        let err = Config::parse(
            r#"
            [backend]
            api_key = "sk"
            timeout_seconds = 0
            "#,
        )
        .unwrap_err();

        assert!(err.to_string().contains("timeout_seconds"));
    }

    #[test]
    fn rejects_non_http_backend() {
        let err = Config::parse(
            r#"
            [backend]
            api_key = "sk"
            base_url = "ftp://example.com"
            "#,
        )
        .unwrap_err();

        assert!(err.to_string().contains("http or https"));
    }

    #[test]
    fn rejects_credentialed_wildcard_cors() {
        let err = Config::parse(
            r#"
            [backend]
            api_key = "sk"

            [server.cors]
            origins = "*"
            credentials = true
            "#,
        )
        .unwrap_err();

        assert!(err.to_string().contains("credentials"));
    }

    #[test]
    fn rejects_unknown_fields() {
        let err = Config::parse(
            r#"
            [backend]
            api_key = "sk"
            retries = 3
            "#,
        )
        .unwrap_err();

        assert!(err.to_string().contains("retries"));
    }

    #[test]
    fn expands_environment_before_parsing() {
        temp_env::with_var("SWITCHBOARD_LOADER_KEY", Some("sk-from-env"), || {
            let config = Config::parse(
                r#"
                [models.openai]
                api_key = "{{ env.SWITCHBOARD_LOADER_KEY }}"
                "#,
            )
            .unwrap();

            assert!(config.models.openai.api_key.is_some());
        });
    }
}
