//! Known model definitions
//!
//! One table for every model the registry can construct.

use super::anthropic::{AnthropicModel, AnthropicService};
use super::ModelClient;
use std::sync::Arc;

/// Model provider
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum Provider {
    Anthropic,
}

impl Provider {
    /// Environment variable holding this provider's API key
    pub fn api_key_env_var(self) -> &'static str {
        match self {
            Provider::Anthropic => "ANTHROPIC_API_KEY",
        }
    }
}

/// Factory signature: `(api_key, gateway)`
pub type ModelFactory = fn(&str, Option<&str>) -> Result<Arc<dyn ModelClient>, String>;

/// Model definition with metadata
#[derive(Debug, Clone)]
pub struct ModelDef {
    /// User-facing model ID (e.g., "claude-4.5-sonnet")
    pub id: &'static str,
    pub provider: Provider,
    pub description: &'static str,
    pub factory: ModelFactory,
}

fn anthropic(
    model: AnthropicModel,
    api_key: &str,
    gateway: Option<&str>,
) -> Result<Arc<dyn ModelClient>, String> {
    if api_key.is_empty() {
        return Err(format!(
            "{} requires {} or a gateway",
            model.model_id(),
            Provider::Anthropic.api_key_env_var()
        ));
    }
    AnthropicService::new(api_key.to_string(), model, gateway)
        .map(|service| Arc::new(service) as Arc<dyn ModelClient>)
        .map_err(|e| e.to_string())
}

/// Get all available model definitions
pub fn all_models() -> &'static [ModelDef] {
    &[
        ModelDef {
            id: "claude-4.5-sonnet",
            provider: Provider::Anthropic,
            description: "Claude Sonnet 4.5 (balanced)",
            factory: |key, gw| anthropic(AnthropicModel::Sonnet45, key, gw),
        },
        ModelDef {
            id: "claude-4.5-haiku",
            provider: Provider::Anthropic,
            description: "Claude Haiku 4.5 (fast, used for routing)",
            factory: |key, gw| anthropic(AnthropicModel::Haiku45, key, gw),
        },
        ModelDef {
            id: "claude-4.5-opus",
            provider: Provider::Anthropic,
            description: "Claude Opus 4.5 (most capable)",
            factory: |key, gw| anthropic(AnthropicModel::Opus45, key, gw),
        },
    ]
}
