//! Agent orchestrator
//!
//! Routes each user turn to a business-domain specialist and answers it with
//! a bounded ReAct (think, act, observe) loop over caller-supplied tools.

pub mod config;
pub mod context_window;
pub mod conversation;
pub mod domain;
pub mod llm;
pub mod orchestrator;
mod parse;
pub mod react;
pub mod router;
pub mod tools;
mod transcript;

#[cfg(test)]
mod testing;

pub use config::{ConfigError, OrchestratorConfig, SharedConfig};
pub use context_window::windowed;
pub use conversation::{ConversationState, Message, ReasoningStep, Role, StepKind};
pub use domain::Domain;
pub use llm::{ActiveModel, LlmConfig, LlmError, ModelClient, ModelRegistry};
pub use orchestrator::{Orchestrator, SessionManager, TurnError, TurnOutcome, TurnRequest, TurnResponse};
pub use react::{ReactEngine, ReactOutcome};
pub use router::{DomainRouter, RouteDecision};
pub use tools::{Tool, ToolCallResult, ToolContext, ToolError, ToolRegistry};
