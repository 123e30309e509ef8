//! Conversation state threaded through routing and the ReAct loop

use crate::domain::Domain;
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use serde_json::{Map, Value};
use std::collections::BTreeSet;
use std::fmt;

/// Message author
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Role {
    User,
    Assistant,
    System,
    Tool,
}

/// Tool call carried by an assistant message
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ToolCallMeta {
    pub tool_name: String,
    pub tool_args: Map<String, Value>,
}

/// A single message in conversation history
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Message {
    pub role: Role,
    pub content: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub tool_call: Option<ToolCallMeta>,
}

impl Message {
    pub fn new(role: Role, content: impl Into<String>) -> Self {
        Self {
            role,
            content: content.into(),
            tool_call: None,
        }
    }

    pub fn user(content: impl Into<String>) -> Self {
        Self::new(Role::User, content)
    }

    pub fn assistant(content: impl Into<String>) -> Self {
        Self::new(Role::Assistant, content)
    }

    pub fn system(content: impl Into<String>) -> Self {
        Self::new(Role::System, content)
    }

    pub fn tool(content: impl Into<String>) -> Self {
        Self::new(Role::Tool, content)
    }

    /// Assistant message recording a tool request
    pub fn tool_request(tool_name: impl Into<String>, tool_args: Map<String, Value>) -> Self {
        let tool_name = tool_name.into();
        Self {
            role: Role::Assistant,
            content: String::new(),
            tool_call: Some(ToolCallMeta {
                tool_name,
                tool_args,
            }),
        }
    }
}

/// Routing outcome stored on the conversation
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct RoutingContext {
    pub primary_domain: Option<Domain>,
    #[serde(default)]
    pub secondary_domains: BTreeSet<Domain>,
    /// Caller-supplied domain tag that bypasses the router model
    #[serde(default)]
    pub force_domain: Option<String>,
    #[serde(default)]
    pub router_reasoning: Option<String>,
}

/// One entry in the reasoning trace
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ReasoningStep {
    pub at: DateTime<Utc>,
    #[serde(flatten)]
    pub kind: StepKind,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "step", rename_all = "snake_case")]
pub enum StepKind {
    Think {
        content: String,
    },
    Act {
        tool_name: String,
        tool_args: Map<String, Value>,
    },
    Observe {
        content: String,
    },
    Answer {
        content: String,
    },
}

impl ReasoningStep {
    pub fn now(kind: StepKind) -> Self {
        Self {
            at: Utc::now(),
            kind,
        }
    }

    pub fn think(content: impl Into<String>) -> Self {
        Self::now(StepKind::Think {
            content: content.into(),
        })
    }

    pub fn act(tool_name: impl Into<String>, tool_args: Map<String, Value>) -> Self {
        Self::now(StepKind::Act {
            tool_name: tool_name.into(),
            tool_args,
        })
    }

    pub fn observe(content: impl Into<String>) -> Self {
        Self::now(StepKind::Observe {
            content: content.into(),
        })
    }

    pub fn answer(content: impl Into<String>) -> Self {
        Self::now(StepKind::Answer {
            content: content.into(),
        })
    }

    /// Text content; Act steps have none
    pub fn content(&self) -> &str {
        match &self.kind {
            StepKind::Think { content }
            | StepKind::Observe { content }
            | StepKind::Answer { content } => content,
            StepKind::Act { .. } => "",
        }
    }

    pub fn is_answer(&self) -> bool {
        matches!(self.kind, StepKind::Answer { .. })
    }
}

impl fmt::Display for ReasoningStep {
    /// Renders as the `THINK:`/`ACT:`/`OBSERVE:`/`ANSWER:` lines the model sees
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match &self.kind {
            StepKind::Think { content } => write!(f, "THINK: {content}"),
            StepKind::Act {
                tool_name,
                tool_args,
            } => write!(f, "ACT: {tool_name} {}", Value::Object(tool_args.clone())),
            StepKind::Observe { content } => write!(f, "OBSERVE: {content}"),
            StepKind::Answer { content } => write!(f, "ANSWER: {content}"),
        }
    }
}

/// Everything the core knows about one session
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ConversationState {
    pub session_id: String,
    pub messages: Vec<Message>,
    #[serde(default)]
    pub current_agent: Option<String>,
    #[serde(default)]
    pub tool_call_count: u32,
    #[serde(default)]
    confidence: f64,
    #[serde(default)]
    pub context: RoutingContext,
    /// Append-only; written through [`ConversationState::record`]
    #[serde(default)]
    reasoning_trace: Vec<ReasoningStep>,
}

impl ConversationState {
    pub fn new(session_id: impl Into<String>) -> Self {
        Self {
            session_id: session_id.into(),
            messages: Vec::new(),
            current_agent: None,
            tool_call_count: 0,
            confidence: 0.0,
            context: RoutingContext::default(),
            reasoning_trace: Vec::new(),
        }
    }

    /// New session with a random id
    pub fn generate() -> Self {
        Self::new(uuid::Uuid::new_v4().to_string())
    }

    /// Resume a session from persisted history
    pub fn from_history(session_id: impl Into<String>, messages: Vec<Message>) -> Self {
        Self {
            messages,
            ..Self::new(session_id)
        }
    }

    #[must_use]
    pub fn with_force_domain(mut self, tag: impl Into<String>) -> Self {
        self.context.force_domain = Some(tag.into());
        self
    }

    pub fn push_message(&mut self, message: Message) {
        self.messages.push(message);
    }

    pub fn push_user(&mut self, content: impl Into<String>) {
        self.push_message(Message::user(content));
    }

    /// The question currently being answered
    pub fn last_user_message(&self) -> Option<&Message> {
        self.messages.iter().rev().find(|m| m.role == Role::User)
    }

    pub fn confidence(&self) -> f64 {
        self.confidence
    }

    /// Store a confidence, clamped to `[0, 1]`; NaN becomes 0
    pub fn set_confidence(&mut self, value: f64) {
        self.confidence = if value.is_nan() {
            0.0
        } else {
            value.clamp(0.0, 1.0)
        };
    }

    pub fn trace(&self) -> &[ReasoningStep] {
        &self.reasoning_trace
    }

    pub fn record(&mut self, step: ReasoningStep) {
        self.reasoning_trace.push(step);
    }

    /// Content of the most recent assistant message without a tool call
    pub fn final_answer(&self) -> Option<&str> {
        self.messages
            .iter()
            .rev()
            .find(|m| m.role == Role::Assistant && m.tool_call.is_none())
            .map(|m| m.content.as_str())
    }
}
