//! Domain routing
//!
//! Picks the primary domain for a turn. A caller-forced tag bypasses the
//! model entirely; otherwise the router model classifies a short window of
//! recent history. Routing never fails: every failure degrades to
//! [`Domain::General`] with zero confidence.

use crate::config::OrchestratorConfig;
use crate::context_window::WindowPolicy;
use crate::conversation::{ConversationState, Message, Role};
use crate::domain::Domain;
use crate::llm::{LlmError, LlmRequest, LlmResponse, ModelClient, SystemContent, ToolDefinition};
use crate::parse;
use crate::transcript;
use serde_json::{json, Map, Value};
use std::collections::BTreeSet;
use std::fmt::Write as _;
use std::sync::Arc;
use thiserror::Error;

/// Name of the structured-output function offered to the router model
pub const ROUTE_TOOL_NAME: &str = "route_decision";

/// Confidence assumed when the model omits one
pub const DEFAULT_MODEL_CONFIDENCE: f64 = 0.8;

const ROUTER_MAX_OUTPUT_TOKENS: u32 = 300;

/// Outcome of routing one turn
#[derive(Debug, Clone, PartialEq)]
pub struct RouteDecision {
    pub destination: Domain,
    /// Never contains `destination`
    pub secondary_domains: BTreeSet<Domain>,
    pub reasoning: String,
    /// Always within `[0, 1]`
    pub confidence: f64,
    /// Decided by the caller's forced tag rather than the model
    pub forced: bool,
}

impl RouteDecision {
    fn fallback(reason: &RouteFailure) -> Self {
        Self {
            destination: Domain::General,
            secondary_domains: BTreeSet::new(),
            reasoning: format!("routing fell back to general: {reason}"),
            confidence: 0.0,
            forced: false,
        }
    }

    fn forced(tag: &str) -> Self {
        match Domain::from_tag(tag) {
            Some(domain) => Self {
                destination: domain,
                secondary_domains: BTreeSet::new(),
                reasoning: format!("forced: caller pinned domain '{}'", domain.tag()),
                confidence: 1.0,
                forced: true,
            },
            None => {
                tracing::warn!(tag = %tag, "Unknown forced domain tag; using general");
                Self {
                    destination: Domain::General,
                    secondary_domains: BTreeSet::new(),
                    reasoning: format!("forced: unrecognised domain tag '{tag}', using general"),
                    confidence: 0.0,
                    forced: true,
                }
            }
        }
    }

    /// Write the decision into the routing fields of `state`
    pub fn apply_to(&self, state: &mut ConversationState) {
        state.context.primary_domain = Some(self.destination);
        state.context.secondary_domains = self.secondary_domains.clone();
        state.context.router_reasoning = Some(self.reasoning.clone());
        state.current_agent = Some(self.destination.agent_name().to_string());
        state.set_confidence(self.confidence);
    }
}

/// Why the model path produced no usable decision
#[derive(Debug, Error)]
enum RouteFailure {
    #[error("no user message to classify")]
    NoQuestion,
    #[error("router model error: {0}")]
    Model(#[from] LlmError),
    #[error("router output was not a route decision")]
    Unparseable,
    #[error("unknown destination '{0}'")]
    UnknownDestination(String),
}

/// Classifies turns onto domains using a (usually cheap) model
pub struct DomainRouter {
    client: Arc<dyn ModelClient>,
    config: Arc<OrchestratorConfig>,
}

impl DomainRouter {
    pub fn new(client: Arc<dyn ModelClient>, config: Arc<OrchestratorConfig>) -> Self {
        Self { client, config }
    }

    /// Decide the destination for the latest turn in `state`
    pub async fn route(&self, state: &ConversationState) -> RouteDecision {
        if let Some(tag) = &state.context.force_domain {
            let decision = RouteDecision::forced(tag);
            tracing::info!(
                session_id = %state.session_id,
                domain = %decision.destination,
                "Routing forced by caller"
            );
            return decision;
        }

        match self.classify(state).await {
            Ok(decision) => {
                tracing::info!(
                    session_id = %state.session_id,
                    domain = %decision.destination,
                    secondary = ?decision.secondary_domains,
                    confidence = decision.confidence,
                    "Routed turn"
                );
                decision
            }
            Err(failure) => {
                tracing::warn!(
                    session_id = %state.session_id,
                    error = %failure,
                    "Routing degraded to general"
                );
                RouteDecision::fallback(&failure)
            }
        }
    }

    /// Route and record the decision on `state`
    pub async fn route_and_apply(&self, state: &mut ConversationState) -> RouteDecision {
        let decision = self.route(state).await;
        decision.apply_to(state);
        decision
    }

    async fn classify(&self, state: &ConversationState) -> Result<RouteDecision, RouteFailure> {
        if !state.messages.iter().any(|m| m.role == Role::User) {
            return Err(RouteFailure::NoQuestion);
        }

        // Conversation system messages describe the assistant, not the route
        let history: Vec<Message> = state
            .messages
            .iter()
            .filter(|m| m.role != Role::System)
            .cloned()
            .collect();
        let window = WindowPolicy::for_router(&self.config).apply(&history);
        let (_, messages) = transcript::to_request_messages(&window.messages, None);

        let request = LlmRequest {
            system: vec![SystemContent::cached(router_prompt())],
            messages,
            tools: vec![route_tool_definition()],
            max_tokens: Some(ROUTER_MAX_OUTPUT_TOKENS),
        };

        let response = self.client.complete(&request).await?;
        interpret(&response)
    }
}

/// Turn a router model response into a decision
fn interpret(response: &LlmResponse) -> Result<RouteDecision, RouteFailure> {
    let structured = response
        .tool_uses()
        .into_iter()
        .find(|(_, name, _)| *name == ROUTE_TOOL_NAME)
        .and_then(|(_, _, input)| input.as_object().cloned());

    let object = match structured {
        Some(object) => object,
        None => {
            let text = response.text();
            parse::strict_object(&text)
                .filter(|o| o.contains_key("destination"))
                .or_else(|| {
                    parse::scan_objects_with_key(&text, "destination")
                        .into_iter()
                        .next()
                })
                .ok_or(RouteFailure::Unparseable)?
        }
    };

    decision_from_object(&object)
}

fn decision_from_object(object: &Map<String, Value>) -> Result<RouteDecision, RouteFailure> {
    let raw_destination = object
        .get("destination")
        .map(parse::value_to_text)
        .unwrap_or_default();
    let destination = Domain::from_destination(&raw_destination)
        .ok_or(RouteFailure::UnknownDestination(raw_destination))?;

    let secondary_domains = match object.get("secondary_domains") {
        Some(Value::Array(items)) => items
            .iter()
            .filter_map(|item| item.as_str())
            .filter_map(Domain::from_destination)
            .filter(|d| *d != destination)
            .collect(),
        _ => BTreeSet::new(),
    };

    let reasoning = object
        .get("reasoning")
        .map(parse::value_to_text)
        .unwrap_or_default();

    let confidence = object
        .get("confidence")
        .and_then(Value::as_f64)
        .filter(|c| c.is_finite())
        .map_or(DEFAULT_MODEL_CONFIDENCE, |c| c.clamp(0.0, 1.0));

    Ok(RouteDecision {
        destination,
        secondary_domains,
        reasoning,
        confidence,
        forced: false,
    })
}

fn router_prompt() -> String {
    let mut prompt = String::from(
        "You route requests for a company assistant. Pick the single specialist best suited to the user's latest message, and list any other specialists whose data may also be needed.\n\nSpecialists:\n",
    );
    for domain in Domain::ALL {
        let _ = writeln!(prompt, "- {}: {}", domain.agent_name(), domain.summary());
    }
    prompt.push_str(
        "\nCall the route_decision function, or reply with only a JSON object:\n\
         {\"destination\": \"<specialist>\", \"secondary_domains\": [\"<specialist>\"], \"reasoning\": \"<one sentence>\", \"confidence\": <0.0 to 1.0>}",
    );
    prompt
}

fn route_tool_definition() -> ToolDefinition {
    let names: Vec<&str> = Domain::ALL.iter().map(|d| d.agent_name()).collect();
    ToolDefinition {
        name: ROUTE_TOOL_NAME.to_string(),
        description: "Record which specialist should handle the latest user message".to_string(),
        input_schema: json!({
            "type": "object",
            "required": ["destination"],
            "properties": {
                "destination": { "type": "string", "enum": names },
                "secondary_domains": {
                    "type": "array",
                    "items": { "type": "string", "enum": names }
                },
                "reasoning": { "type": "string" },
                "confidence": { "type": "number", "minimum": 0, "maximum": 1 }
            }
        }),
    }
}
