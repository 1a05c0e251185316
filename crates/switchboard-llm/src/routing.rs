//! Model routing
//!
//! Maps the model id a client asked for onto a backend target. Routing is a
//! pure function of the requested id and the static model tables, so the
//! same request always lands on the same backend model.

use switchboard_config::{ModelCatalog, ModelsConfig, ProviderKind};

/// Name fragment identifying the small/fast tier
const SMALL_TIER: &str = "haiku";

/// Name fragment identifying the large/capable tier
const LARGE_TIER: &str = "sonnet";

/// Prefix stripped from requested ids but never routed to
const INBOUND_PREFIX: &str = "anthropic/";

/// Backend family a request is routed to
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum Provider {
    Openai,
    Gemini,
    /// Unrecognized model, forwarded untouched
    PassThrough,
}

impl Provider {
    /// Model id prefix understood by the backend
    pub const fn prefix(self) -> Option<&'static str> {
        match self {
            Self::Openai => Some("openai/"),
            Self::Gemini => Some("gemini/"),
            Self::PassThrough => None,
        }
    }

    pub const fn as_str(self) -> &'static str {
        match self {
            Self::Openai => "openai",
            Self::Gemini => "gemini",
            Self::PassThrough => "passthrough",
        }
    }
}

impl From<ProviderKind> for Provider {
    fn from(kind: ProviderKind) -> Self {
        match kind {
            ProviderKind::Openai => Self::Openai,
            ProviderKind::Gemini => Self::Gemini,
        }
    }
}

impl std::fmt::Display for Provider {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Resolved backend target for one request
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct RoutingTarget {
    pub provider: Provider,
    /// Model id without any provider prefix (unless passed through)
    pub backend_model_id: String,
    /// Whether the requested id was rewritten
    pub was_mapped: bool,
}

impl RoutingTarget {
    /// Model id to put on the wire
    ///
    /// With `qualify` set, routed ids carry their provider prefix
    /// (`openai/gpt-4.1`). Pass-through ids are never touched.
    pub fn wire_model(&self, qualify: bool) -> String {
        match self.provider.prefix() {
            Some(prefix) if qualify && !self.backend_model_id.starts_with(prefix) => {
                format!("{prefix}{}", self.backend_model_id)
            }
            _ => self.backend_model_id.clone(),
        }
    }
}

/// Routing table built once from configuration
#[derive(Debug, Clone)]
pub struct ModelRouter {
    preferred: ProviderKind,
    openai: ModelCatalog,
    gemini: ModelCatalog,
}

impl ModelRouter {
    pub fn new(config: &ModelsConfig) -> Self {
        Self {
            preferred: config.preferred_provider,
            openai: config.catalog(ProviderKind::Openai),
            gemini: config.catalog(ProviderKind::Gemini),
        }
    }

    const fn catalog(&self, kind: ProviderKind) -> &ModelCatalog {
        match kind {
            ProviderKind::Openai => &self.openai,
            ProviderKind::Gemini => &self.gemini,
        }
    }

    /// Resolve a requested model id
    ///
    /// Tier fragments win over exact list matches, and the small tier is
    /// checked before the large one. Ids matching nothing pass through
    /// unchanged.
    pub fn route(&self, requested: &str) -> RoutingTarget {
        let (prefixed_as, bare) = split_prefix(requested);
        let lowered = bare.to_lowercase();

        let target = if lowered.contains(SMALL_TIER) {
            self.tier_target(|catalog| &catalog.small_model)
        } else if lowered.contains(LARGE_TIER) {
            self.tier_target(|catalog| &catalog.big_model)
        } else if let Some(kind) = self.listed_provider(bare) {
            RoutingTarget {
                provider: kind.into(),
                backend_model_id: bare.to_owned(),
                was_mapped: prefixed_as != Some(kind),
            }
        } else {
            RoutingTarget {
                provider: Provider::PassThrough,
                backend_model_id: requested.to_owned(),
                was_mapped: false,
            }
        };

        if target.was_mapped {
            tracing::debug!(
                original_model = %requested,
                mapped_model = %target.backend_model_id,
                provider = %target.provider,
                "model mapped"
            );
        }

        target
    }

    fn tier_target(&self, pick: impl Fn(&ModelCatalog) -> &String) -> RoutingTarget {
        RoutingTarget {
            provider: self.preferred.into(),
            backend_model_id: pick(self.catalog(self.preferred)).clone(),
            was_mapped: true,
        }
    }

    /// Provider whose known list contains `bare`, preferred provider first
    fn listed_provider(&self, bare: &str) -> Option<ProviderKind> {
        [self.preferred, self.preferred.other()]
            .into_iter()
            .find(|kind| self.catalog(*kind).known.iter().any(|m| m == bare))
    }
}

/// Strip a recognized provider prefix, reporting which routable provider it named
fn split_prefix(requested: &str) -> (Option<ProviderKind>, &str) {
    if let Some(bare) = requested.strip_prefix("openai/") {
        (Some(ProviderKind::Openai), bare)
    } else if let Some(bare) = requested.strip_prefix("gemini/") {
        (Some(ProviderKind::Gemini), bare)
    } else if let Some(bare) = requested.strip_prefix(INBOUND_PREFIX) {
        (None, bare)
    } else {
        (None, requested)
    }
}
