//! Configuration for the switchboard proxy
//!
//! Loaded from a TOML file whose values may reference the environment via
//! `{{ env.VAR }}` placeholders.

#![allow(clippy::must_use_candidate)]

pub mod backend;
pub mod cors;
mod env;
pub mod health;
mod loader;
pub mod models;
pub mod server;
pub mod telemetry;

use secrecy::{ExposeSecret, SecretString};
use serde::Deserialize;

pub use backend::*;
pub use cors::*;
pub use health::*;
pub use models::*;
pub use server::*;
pub use telemetry::*;

/// Top-level switchboard configuration
#[derive(Debug, Default, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct Config {
    /// HTTP listener configuration
    #[serde(default)]
    pub server: ServerConfig,
    /// OpenAI-compatible backend the proxy forwards to
    #[serde(default)]
    pub backend: BackendConfig,
    /// Model routing tables and provider credentials
    #[serde(default)]
    pub models: ModelsConfig,
    /// Logging configuration
    #[serde(default)]
    pub telemetry: TelemetryConfig,
}

impl Config {
    /// Whether any credential is available to reach the backend
    pub fn has_any_api_key(&self) -> bool {
        [
            self.backend.api_key.as_ref(),
            self.models.openai.api_key.as_ref(),
            self.models.gemini.api_key.as_ref(),
        ]
        .into_iter()
        .any(is_set)
    }
}

/// A key counts as configured only when it is present and non-empty
///
/// `{{ env.KEY | default("") }}` placeholders yield empty strings, which
/// must not satisfy credential checks.
pub fn is_set(key: Option<&SecretString>) -> bool {
    key.is_some_and(|k| !k.expose_secret().is_empty())
}
