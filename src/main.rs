//! Agent orchestrator command line
//!
//! Answers one question and prints the turn (answer, routing, trace) as JSON.
//!
//! ```text
//! orchestrator [--domain=<tag>] <question...>
//! ```

use agent_orchestrator::{
    ActiveModel, LlmConfig, ModelClient, ModelRegistry, Orchestrator, OrchestratorConfig,
    SharedConfig, ToolRegistry, TurnRequest,
};
use std::sync::Arc;
use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt};

#[tokio::main]
async fn main() -> Result<(), Box<dyn std::error::Error>> {
    // Initialize logging; stdout carries the result
    tracing_subscriber::registry()
        .with(
            tracing_subscriber::EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| "agent_orchestrator=info,orchestrator=info".into()),
        )
        .with(
            tracing_subscriber::fmt::layer()
                .json()
                .with_writer(std::io::stderr)
                .with_current_span(false)
                .with_span_list(false),
        )
        .init();

    let mut force_domain = None;
    let mut words = Vec::new();
    for arg in std::env::args().skip(1) {
        match arg.strip_prefix("--domain=") {
            Some(tag) => force_domain = Some(tag.to_string()),
            None => words.push(arg),
        }
    }
    let question = words.join(" ");
    if question.trim().is_empty() {
        return Err("usage: orchestrator [--domain=<tag>] <question>".into());
    }

    let config = OrchestratorConfig::from_env()?;
    config.validate()?;
    tracing::info!(?config, "Configuration loaded");

    // Initialize model registry
    let llm_config = LlmConfig::from_env();
    let registry = ModelRegistry::new(&llm_config);
    if registry.has_models() {
        tracing::info!(
            models = ?registry.available_models(),
            default = %registry.default_model_id(),
            "Model registry initialized"
        );
    } else {
        tracing::warn!("No model API keys configured. Set ANTHROPIC_API_KEY or LLM_GATEWAY.");
    }

    let engine_client = active_client(registry.default_client());
    let router_client = active_client(registry.router_client());

    let orchestrator = Orchestrator::new(
        router_client,
        engine_client,
        SharedConfig::new(config),
        ToolRegistry::standard(),
    );

    let mut request = TurnRequest::new(question);
    request.force_domain = force_domain;
    let response = orchestrator.handle_turn(request).await?;

    println!("{}", serde_json::to_string_pretty(&response)?);
    Ok(())
}

fn active_client(client: Option<Arc<dyn ModelClient>>) -> Arc<dyn ModelClient> {
    match client {
        Some(client) => Arc::new(ActiveModel::new(client)),
        None => Arc::new(ActiveModel::empty()),
    }
}
