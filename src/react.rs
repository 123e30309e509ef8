//! ReAct execution engine
//!
//! Runs the Thinking/Acting/Observing loop for one turn. Each Thinking step
//! is one model call; each Acting step is one tool call. Every step is
//! appended to the conversation's reasoning trace, and the turn always ends
//! with exactly one Answer step unless it is cancelled.

pub mod decision;
mod phase;
mod prompt;

#[cfg(test)]
mod proptests;

pub use decision::{parse_decision, Action, Decision, ParseTier, ParsedDecision};
pub use phase::{transition, ReactEvent, ReactPhase, TransitionError};

use crate::config::OrchestratorConfig;
use crate::context_window::{estimate_tokens, WindowPolicy, MESSAGE_OVERHEAD_TOKENS};
use crate::conversation::{ConversationState, Message, ReasoningStep, Role};
use crate::domain::Domain;
use crate::llm::{LlmError, LlmRequest, LlmResponse, ModelClient, SystemContent};
use crate::tools::{ToolContext, ToolRegistry};
use crate::transcript;
use serde_json::Value;
use std::sync::Arc;
use std::time::Duration;
use tokio_util::sync::CancellationToken;

/// Answer given when the iteration cap is reached
pub const EXHAUSTED_ANSWER: &str = "I'm sorry, I could not finish working out an answer within the allowed number of steps. Please try asking a narrower question.";

/// Answer given when the model cannot be reached
pub const MODEL_FAILURE_ANSWER: &str = "I'm sorry, I could not reach the language model to answer this right now. Please try again shortly.";

const ENGINE_MAX_OUTPUT_TOKENS: u32 = 1024;

/// How a turn ended
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ReactOutcome {
    Answered,
    Exhausted,
    ModelUnavailable,
    Cancelled,
}

/// Drives the ReAct loop against a model client
pub struct ReactEngine {
    client: Arc<dyn ModelClient>,
    config: Arc<OrchestratorConfig>,
}

impl ReactEngine {
    pub fn new(client: Arc<dyn ModelClient>, config: Arc<OrchestratorConfig>) -> Self {
        Self { client, config }
    }

    /// Run one turn to completion, mutating `state` in place
    pub async fn run(
        &self,
        state: &mut ConversationState,
        available_tools: &[String],
        registry: &ToolRegistry,
    ) -> ReactOutcome {
        self.run_cancellable(state, available_tools, registry, &CancellationToken::new())
            .await
    }

    /// Value-in, value-out form of [`ReactEngine::run`]
    pub async fn run_react(
        &self,
        mut state: ConversationState,
        available_tools: &[String],
        registry: &ToolRegistry,
    ) -> ConversationState {
        self.run(&mut state, available_tools, registry).await;
        state
    }

    /// Run one turn, stopping early if `cancel` fires.
    ///
    /// Cancellation is observed before each Thinking step and while waiting on
    /// the model; a tool already running gets the token through its context.
    /// Nothing further is appended to `state` once cancellation is seen.
    pub async fn run_cancellable(
        &self,
        state: &mut ConversationState,
        available_tools: &[String],
        registry: &ToolRegistry,
        cancel: &CancellationToken,
    ) -> ReactOutcome {
        let max_iterations = self.config.max_iterations;
        let primary = state.context.primary_domain.unwrap_or(Domain::General);
        let secondary = state.context.secondary_domains.clone();
        let question_index = state
            .messages
            .iter()
            .rposition(|m| m.role == Role::User)
            .unwrap_or(state.messages.len());
        let question = state
            .messages
            .get(question_index)
            .map(|m| m.content.clone())
            .unwrap_or_default();
        let tools = prompt::order_listings(registry.listings(available_tools), primary, &secondary);
        let trace_start = state.trace().len();

        tracing::info!(
            session_id = %state.session_id,
            domain = %primary,
            tools = tools.len(),
            max_iterations,
            "Starting ReAct turn"
        );

        let mut phase = ReactPhase::start();
        loop {
            if cancel.is_cancelled() {
                return self.cancelled(state, &phase);
            }

            let prompt_text = prompt::build_prompt(&prompt::PromptInputs {
                primary,
                secondary: &secondary,
                tools: &tools,
                trace: state.trace().get(trace_start..).unwrap_or_default(),
                question: &question,
                max_observation_chars: self.config.max_tool_result_chars,
            });
            let request = self.build_request(state, question_index, primary, &prompt_text);

            let response = tokio::select! {
                biased;
                () = cancel.cancelled() => return self.cancelled(state, &phase),
                response = self.complete_with_retry(&request, &state.session_id) => response,
            };

            let response = match response {
                Ok(response) => response,
                Err(e) => {
                    phase = self.advance(&phase, ReactEvent::ModelFailed);
                    tracing::error!(
                        session_id = %state.session_id,
                        phase = %phase,
                        error = %e,
                        "Model unavailable; ending turn"
                    );
                    finish(state, MODEL_FAILURE_ANSWER);
                    return ReactOutcome::ModelUnavailable;
                }
            };

            let ParsedDecision { decision, tier } = decision::parse_response(&response);
            if tier == ParseTier::Fallback {
                tracing::warn!(
                    session_id = %state.session_id,
                    "Model output was not a structured decision; using it as the answer"
                );
            } else {
                tracing::debug!(session_id = %state.session_id, ?tier, "Parsed decision");
            }
            state.record(ReasoningStep::think(decision.reasoning));

            let (tool_name, args) = match decision.action {
                Action::Answer { response } => {
                    phase = self.advance(&phase, ReactEvent::AnswerProposed);
                    finish(state, response);
                    tracing::info!(
                        session_id = %state.session_id,
                        phase = %phase,
                        steps = state.trace().len() - trace_start,
                        "ReAct turn answered"
                    );
                    return ReactOutcome::Answered;
                }
                Action::Tool { name, args } => (name, args),
            };

            let iteration = match &phase {
                ReactPhase::Thinking { iteration } => *iteration,
                _ => 0,
            };
            phase = self.advance(
                &phase,
                ReactEvent::ToolProposed {
                    tool_name: tool_name.clone(),
                },
            );
            state.record(ReasoningStep::act(&tool_name, args.clone()));
            state.push_message(Message::tool_request(&tool_name, args.clone()));

            let ctx = ToolContext::new(cancel.clone(), state.session_id.clone(), primary);
            let result = registry.execute(&tool_name, Value::Object(args), ctx).await;
            if result.was_executed() {
                state.tool_call_count += 1;
            }
            tracing::debug!(
                session_id = %state.session_id,
                iteration,
                tool = %tool_name,
                status = ?result.status,
                "Observed tool result"
            );

            phase = self.advance(&phase, ReactEvent::ToolReturned);
            let observation = result.into_text();
            state.record(ReasoningStep::observe(observation.clone()));
            state.push_message(Message::tool(observation));

            phase = self.advance(&phase, ReactEvent::ObservationRecorded);
            if phase == ReactPhase::Exhausted {
                tracing::warn!(
                    session_id = %state.session_id,
                    max_iterations,
                    "Iteration cap reached without an answer"
                );
                finish(state, EXHAUSTED_ANSWER);
                return ReactOutcome::Exhausted;
            }
        }
    }

    /// Apply a transition. The engine only emits events valid for the current
    /// phase, so an error here is a bug; it is logged and the turn exhausts.
    fn advance(&self, phase: &ReactPhase, event: ReactEvent) -> ReactPhase {
        transition(phase, event, self.config.max_iterations).unwrap_or_else(|e| {
            tracing::error!(error = %e, "Invalid ReAct transition");
            ReactPhase::Exhausted
        })
    }

    fn cancelled(&self, state: &ConversationState, phase: &ReactPhase) -> ReactOutcome {
        let phase = self.advance(phase, ReactEvent::Cancel);
        tracing::info!(session_id = %state.session_id, phase = %phase, "ReAct turn cancelled");
        ReactOutcome::Cancelled
    }

    /// Request for one Thinking step. Prior-turn history is windowed into
    /// whatever budget the system text and step prompt leave over.
    fn build_request(
        &self,
        state: &ConversationState,
        question_index: usize,
        primary: Domain,
        prompt_text: &str,
    ) -> LlmRequest {
        let system_text = prompt::system_text(primary);
        let fixed_cost =
            estimate_tokens(&system_text) + estimate_tokens(prompt_text) + 2 * MESSAGE_OVERHEAD_TOKENS;
        let history_budget = self.config.max_context_tokens.saturating_sub(fixed_cost);

        let prior = state.messages.get(..question_index).unwrap_or_default();
        let window = WindowPolicy::for_engine(&self.config)
            .with_max_tokens(history_budget)
            .apply(prior);
        if window.dropped > 0 || window.truncated > 0 {
            tracing::debug!(
                session_id = %state.session_id,
                dropped = window.dropped,
                truncated = window.truncated,
                estimated_tokens = window.estimated_tokens + fixed_cost,
                "Windowed history for model call"
            );
        }

        let (history_system, messages) =
            transcript::to_request_messages(&window.messages, Some(prompt_text));
        let mut system = vec![SystemContent::cached(system_text)];
        system.extend(history_system);

        LlmRequest {
            system,
            messages,
            tools: Vec::new(),
            max_tokens: Some(ENGINE_MAX_OUTPUT_TOKENS),
        }
    }

    /// Call the model, retrying retryable errors with exponential backoff
    async fn complete_with_retry(
        &self,
        request: &LlmRequest,
        session_id: &str,
    ) -> Result<LlmResponse, LlmError> {
        let attempts = self.config.llm_retry_attempts.max(1);
        let mut attempt = 1;
        loop {
            match self.client.complete(request).await {
                Ok(response) => return Ok(response),
                Err(e) if e.kind.is_retryable() && attempt < attempts => {
                    let delay = e
                        .retry_after
                        .unwrap_or_else(|| retry_delay(self.config.llm_retry_base_delay, attempt));
                    tracing::warn!(
                        session_id = %session_id,
                        attempt,
                        delay_ms = %delay.as_millis(),
                        error = %e,
                        "Retrying model call"
                    );
                    tokio::time::sleep(delay).await;
                    attempt += 1;
                }
                Err(e) => return Err(e),
            }
        }
    }
}

/// Base delay doubled for each attempt already made
fn retry_delay(base: Duration, attempt: u32) -> Duration {
    base.saturating_mul(1u32 << attempt.saturating_sub(1).min(16))
}

/// Record the final answer and add it to the conversation
fn finish(state: &mut ConversationState, answer: impl Into<String>) {
    let answer = answer.into();
    state.record(ReasoningStep::answer(answer.clone()));
    state.push_message(Message::assistant(answer));
}
