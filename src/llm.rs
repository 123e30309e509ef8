//! Model client abstraction
//!
//! The orchestration core only ever talks to a [`ModelClient`]. Concrete
//! backends live behind it and are selected through the [`ModelRegistry`].

mod anthropic;
mod error;
mod models;
mod registry;
mod types;

pub use anthropic::{AnthropicModel, AnthropicService};
pub use error::{LlmError, LlmErrorKind};
pub use models::{all_models, ModelDef, Provider};
pub use registry::{ActiveModel, LlmConfig, ModelRegistry};
pub use types::*;

use async_trait::async_trait;
use std::sync::Arc;

/// Common interface for model backends.
///
/// Implementations are stateless and re-entrant: the same client may serve
/// many sessions at once.
#[async_trait]
pub trait ModelClient: Send + Sync {
    /// Make a completion request
    async fn complete(&self, request: &LlmRequest) -> Result<LlmResponse, LlmError>;

    /// Get the model ID
    fn model_id(&self) -> &str;
}

#[async_trait]
impl<T: ModelClient + ?Sized> ModelClient for Arc<T> {
    async fn complete(&self, request: &LlmRequest) -> Result<LlmResponse, LlmError> {
        (**self).complete(request).await
    }

    fn model_id(&self) -> &str {
        (**self).model_id()
    }
}

/// Logging wrapper for model clients
pub struct LoggingClient {
    inner: Arc<dyn ModelClient>,
    model_id: String,
}

impl LoggingClient {
    pub fn new(inner: Arc<dyn ModelClient>) -> Self {
        let model_id = inner.model_id().to_string();
        Self { inner, model_id }
    }
}

#[async_trait]
impl ModelClient for LoggingClient {
    async fn complete(&self, request: &LlmRequest) -> Result<LlmResponse, LlmError> {
        let start = std::time::Instant::now();
        let result = self.inner.complete(request).await;
        let duration = start.elapsed();

        match &result {
            Ok(response) => {
                tracing::info!(
                    model = %self.model_id,
                    duration_ms = %duration.as_millis(),
                    input_tokens = response.usage.input_tokens,
                    output_tokens = response.usage.output_tokens,
                    "Model request completed"
                );
            }
            Err(e) => {
                tracing::error!(
                    model = %self.model_id,
                    duration_ms = %duration.as_millis(),
                    error = %e.message,
                    retryable = e.kind.is_retryable(),
                    "Model request failed"
                );
            }
        }

        result
    }

    fn model_id(&self) -> &str {
        &self.model_id
    }
}
