use secrecy::SecretString;
use serde::{Deserialize, Serialize};

/// Model families the router can target
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum ProviderKind {
    #[default]
    Openai,
    #[serde(alias = "google")]
    Gemini,
}

impl ProviderKind {
    /// The other provider
    pub const fn other(self) -> Self {
        match self {
            Self::Openai => Self::Gemini,
            Self::Gemini => Self::Openai,
        }
    }

    pub const fn as_str(self) -> &'static str {
        match self {
            Self::Openai => "openai",
            Self::Gemini => "gemini",
        }
    }

    const fn defaults(self) -> &'static CatalogDefaults {
        match self {
            Self::Openai => &OPENAI_DEFAULTS,
            Self::Gemini => &GEMINI_DEFAULTS,
        }
    }
}

impl std::fmt::Display for ProviderKind {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

struct CatalogDefaults {
    big_model: &'static str,
    small_model: &'static str,
    known: &'static [&'static str],
}

const OPENAI_DEFAULTS: CatalogDefaults = CatalogDefaults {
    big_model: "gpt-4.1",
    small_model: "gpt-4.1-mini",
    known: &[
        "o3-mini",
        "o1",
        "o1-mini",
        "o1-pro",
        "gpt-4.5-preview",
        "gpt-4o",
        "gpt-4o-audio-preview",
        "chatgpt-4o-latest",
        "gpt-4o-mini",
        "gpt-4o-mini-audio-preview",
        "gpt-4.1",
        "gpt-4.1-mini",
    ],
};

const GEMINI_DEFAULTS: CatalogDefaults = CatalogDefaults {
    big_model: "gemini-2.5-pro-preview-03-25",
    small_model: "gemini-2.0-flash",
    known: &["gemini-2.5-pro-preview-03-25", "gemini-2.0-flash"],
};

/// Routing tables for both providers
#[derive(Debug, Default, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct ModelsConfig {
    /// Provider that receives tier-mapped requests
    #[serde(default)]
    pub preferred_provider: ProviderKind,
    #[serde(default)]
    pub openai: ProviderModelsConfig,
    #[serde(default)]
    pub gemini: ProviderModelsConfig,
}

/// Per-provider overrides; unset fields fall back to built-in defaults
#[derive(Debug, Default, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct ProviderModelsConfig {
    /// Key forwarded to the backend in the request body
    #[serde(default)]
    pub api_key: Option<SecretString>,
    #[serde(default)]
    pub big_model: Option<String>,
    #[serde(default)]
    pub small_model: Option<String>,
    /// Model ids this provider is known to serve
    #[serde(default)]
    pub known: Option<Vec<String>>,
}

/// Fully resolved model table for one provider
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ModelCatalog {
    pub big_model: String,
    pub small_model: String,
    pub known: Vec<String>,
}

impl ModelsConfig {
    pub const fn provider(&self, kind: ProviderKind) -> &ProviderModelsConfig {
        match kind {
            ProviderKind::Openai => &self.openai,
            ProviderKind::Gemini => &self.gemini,
        }
    }

    /// Resolve the model table for `kind`, applying defaults
    pub fn catalog(&self, kind: ProviderKind) -> ModelCatalog {
        let overrides = self.provider(kind);
        let defaults = kind.defaults();

        ModelCatalog {
            big_model: overrides
                .big_model
                .clone()
                .unwrap_or_else(|| defaults.big_model.to_owned()),
            small_model: overrides
                .small_model
                .clone()
                .unwrap_or_else(|| defaults.small_model.to_owned()),
            known: overrides
                .known
                .clone()
                .unwrap_or_else(|| defaults.known.iter().map(|m| (*m).to_owned()).collect()),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn google_is_an_alias_for_gemini() {
        let config: ModelsConfig = toml::from_str("preferred_provider = \"google\"").unwrap();
        assert_eq!(config.preferred_provider, ProviderKind::Gemini);
    }

    #[test]
    fn catalog_defaults_follow_provider() {
        let config = ModelsConfig::default();

        let openai = config.catalog(ProviderKind::Openai);
        assert_eq!(openai.big_model, "gpt-4.1");
        assert_eq!(openai.small_model, "gpt-4.1-mini");
        assert_eq!(openai.known.len(), 12);

        let gemini = config.catalog(ProviderKind::Gemini);
        assert_eq!(gemini.big_model, "gemini-2.5-pro-preview-03-25");
        assert_eq!(gemini.small_model, "gemini-2.0-flash");
    }

    #[test]
    fn overrides_replace_defaults_individually() {
        let config: ModelsConfig = toml::from_str(
            r#"
            [openai]
            small_model = "fast-model-x"
            "#,
        )
        .unwrap();

        let catalog = config.catalog(ProviderKind::Openai);
        assert_eq!(catalog.small_model, "fast-model-x");
        assert_eq!(catalog.big_model, "gpt-4.1");
    }
}
