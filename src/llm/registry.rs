//! Model registry and the swappable active-model handle

use super::{all_models, LlmError, LlmRequest, LlmResponse, LoggingClient, ModelClient, Provider};
use async_trait::async_trait;
use std::collections::HashMap;
use std::sync::{Arc, Mutex, PoisonError};

const PREFERRED_DEFAULT: &str = "claude-4.5-sonnet";

/// Configuration for model providers
#[derive(Debug, Clone, Default)]
pub struct LlmConfig {
    pub anthropic_api_key: Option<String>,
    /// Gateway base URL; when set, provider keys are not required
    pub gateway: Option<String>,
    /// Default model ID
    pub default_model: Option<String>,
    /// Model used by the domain router (falls back to the default)
    pub router_model: Option<String>,
}

impl LlmConfig {
    pub fn from_env() -> Self {
        Self {
            anthropic_api_key: std::env::var("ANTHROPIC_API_KEY").ok(),
            gateway: std::env::var("LLM_GATEWAY").ok(),
            default_model: std::env::var("DEFAULT_MODEL").ok(),
            router_model: std::env::var("ROUTER_MODEL").ok(),
        }
    }
}

/// Registry of available models
pub struct ModelRegistry {
    services: HashMap<String, Arc<dyn ModelClient>>,
    default_model: String,
    router_model: Option<String>,
}

impl ModelRegistry {
    /// Create an empty registry (no backends configured)
    pub fn new_empty() -> Self {
        Self {
            services: HashMap::new(),
            default_model: PREFERRED_DEFAULT.to_string(),
            router_model: None,
        }
    }

    pub fn new(config: &LlmConfig) -> Self {
        let mut services: HashMap<String, Arc<dyn ModelClient>> = HashMap::new();

        for model_def in all_models() {
            let api_key = if config.gateway.is_some() {
                // The gateway handles authentication
                "implicit".to_string()
            } else {
                let key = match model_def.provider {
                    Provider::Anthropic => config.anthropic_api_key.clone(),
                };
                match key {
                    Some(k) if !k.is_empty() => k,
                    _ => continue,
                }
            };

            match (model_def.factory)(&api_key, config.gateway.as_deref()) {
                Ok(service) => {
                    services.insert(
                        model_def.id.to_string(),
                        Arc::new(LoggingClient::new(service)),
                    );
                }
                Err(e) => {
                    tracing::warn!(model = model_def.id, error = %e, "Skipping model");
                }
            }
        }

        let default_model = config
            .default_model
            .clone()
            .or_else(|| {
                if services.contains_key(PREFERRED_DEFAULT) {
                    Some(PREFERRED_DEFAULT.to_string())
                } else {
                    let mut ids: Vec<_> = services.keys().cloned().collect();
                    ids.sort();
                    ids.into_iter().next()
                }
            })
            .unwrap_or_else(|| PREFERRED_DEFAULT.to_string());

        Self {
            services,
            default_model,
            router_model: config.router_model.clone(),
        }
    }

    /// Register (or replace) a client under an ID
    pub fn insert(&mut self, model_id: impl Into<String>, client: Arc<dyn ModelClient>) {
        self.services.insert(model_id.into(), client);
    }

    /// Get a model by ID
    pub fn get(&self, model_id: &str) -> Option<Arc<dyn ModelClient>> {
        self.services.get(model_id).cloned()
    }

    /// Get the default model
    pub fn default_client(&self) -> Option<Arc<dyn ModelClient>> {
        self.get(&self.default_model)
    }

    /// Model used for routing decisions, falling back to the default
    pub fn router_client(&self) -> Option<Arc<dyn ModelClient>> {
        self.router_model
            .as_deref()
            .and_then(|id| self.get(id))
            .or_else(|| self.default_client())
    }

    pub fn default_model_id(&self) -> &str {
        &self.default_model
    }

    pub fn has_models(&self) -> bool {
        !self.services.is_empty()
    }

    pub fn available_models(&self) -> Vec<String> {
        let mut ids: Vec<_> = self.services.keys().cloned().collect();
        ids.sort();
        ids
    }
}

/// Hot-swappable model client.
///
/// Callers take an `Arc` snapshot per request, so a swap never affects a
/// request already in flight.
pub struct ActiveModel {
    current: Mutex<Option<Arc<dyn ModelClient>>>,
}

impl ActiveModel {
    pub fn new(client: Arc<dyn ModelClient>) -> Self {
        Self {
            current: Mutex::new(Some(client)),
        }
    }

    /// Handle with no client; every request fails as `Unavailable`
    pub fn empty() -> Self {
        Self {
            current: Mutex::new(None),
        }
    }

    /// Replace the active client, returning the previous one
    pub fn swap(&self, client: Arc<dyn ModelClient>) -> Option<Arc<dyn ModelClient>> {
        let mut guard = self.current.lock().unwrap_or_else(PoisonError::into_inner);
        guard.replace(client)
    }

    pub fn snapshot(&self) -> Option<Arc<dyn ModelClient>> {
        self.current
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .clone()
    }
}

#[async_trait]
impl ModelClient for ActiveModel {
    async fn complete(&self, request: &LlmRequest) -> Result<LlmResponse, LlmError> {
        let client = self
            .snapshot()
            .ok_or_else(|| LlmError::unavailable("No model client configured"))?;
        client.complete(request).await
    }

    fn model_id(&self) -> &str {
        // The id of a swapped client cannot be borrowed past the lock.
        "active"
    }
}
