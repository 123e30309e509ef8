//! Tool invocation
//!
//! Tools are stateless singletons; all per-call context arrives through
//! [`ToolContext`]. [`ToolRegistry::execute`] never fails: unknown tools,
//! tool errors and panics all come back as a [`ToolCallResult`] whose text is
//! a plain error string.

mod think;

pub use think::ThinkTool;

use crate::domain::Domain;
use async_trait::async_trait;
use futures::FutureExt;
use serde_json::{Map, Value};
use std::any::Any;
use std::collections::HashMap;
use std::fmt;
use std::panic::AssertUnwindSafe;
use std::sync::Arc;
use thiserror::Error;
use tokio_util::sync::CancellationToken;

/// Failure reported by a tool implementation
#[derive(Debug, Clone, Error, PartialEq, Eq)]
pub enum ToolError {
    #[error("invalid input: {0}")]
    InvalidInput(String),
    #[error("{0}")]
    Failed(String),
    #[error("cancelled")]
    Cancelled,
}

/// All context needed for a tool invocation
#[derive(Clone)]
pub struct ToolContext {
    /// Cancellation signal for long-running operations
    pub cancel: CancellationToken,
    /// Session the tool is executing within
    pub session_id: String,
    /// Primary domain of the current turn
    pub domain: Domain,
}

impl ToolContext {
    pub fn new(cancel: CancellationToken, session_id: impl Into<String>, domain: Domain) -> Self {
        Self {
            cancel,
            session_id: session_id.into(),
            domain,
        }
    }
}

/// Trait for tools that can be executed by the agent
#[async_trait]
pub trait Tool: Send + Sync {
    /// Tool name
    fn name(&self) -> &str;

    /// Tool description for the model
    fn description(&self) -> String;

    /// JSON schema for tool input
    fn input_schema(&self) -> Value;

    /// Domain whose agent should see this tool first
    fn domain(&self) -> Domain {
        Domain::General
    }

    /// Execute the tool; `args` is always a JSON object
    async fn run(&self, args: Map<String, Value>, ctx: ToolContext) -> Result<String, ToolError>;
}

/// How a tool call ended
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ToolStatus {
    Ok,
    Failed,
    NotFound,
}

/// Outcome of [`ToolRegistry::execute`], consumed as ordinary data
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ToolCallResult {
    pub tool_name: String,
    pub status: ToolStatus,
    pub text: String,
}

impl ToolCallResult {
    pub fn ok(tool_name: &str, text: impl Into<String>) -> Self {
        Self {
            tool_name: tool_name.to_string(),
            status: ToolStatus::Ok,
            text: text.into(),
        }
    }

    pub fn failed(tool_name: &str, error: impl fmt::Display) -> Self {
        Self {
            tool_name: tool_name.to_string(),
            status: ToolStatus::Failed,
            text: format!("Error: tool '{tool_name}' failed: {error}"),
        }
    }

    pub fn not_found(tool_name: &str) -> Self {
        Self {
            tool_name: tool_name.to_string(),
            status: ToolStatus::NotFound,
            text: format!("Error: tool '{tool_name}' not found"),
        }
    }

    pub fn is_error(&self) -> bool {
        self.status != ToolStatus::Ok
    }

    /// Whether the tool was resolved and actually ran
    pub fn was_executed(&self) -> bool {
        self.status != ToolStatus::NotFound
    }

    pub fn into_text(self) -> String {
        self.text
    }
}

impl fmt::Display for ToolCallResult {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.text)
    }
}

/// A line in the tool listing shown to the model
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ToolListing {
    pub name: String,
    pub description: String,
    pub domain: Domain,
}

/// Collection of tools supplied per request by the caller
#[derive(Default, Clone)]
pub struct ToolRegistry {
    tools: HashMap<String, Arc<dyn Tool>>,
}

impl ToolRegistry {
    pub fn new() -> Self {
        Self::default()
    }

    /// Registry with the built-in tools
    pub fn standard() -> Self {
        Self::new().with_tool(Arc::new(ThinkTool))
    }

    #[must_use]
    pub fn with_tool(mut self, tool: Arc<dyn Tool>) -> Self {
        self.register(tool);
        self
    }

    /// Register a tool, replacing any tool with the same name
    pub fn register(&mut self, tool: Arc<dyn Tool>) {
        let name = tool.name().to_string();
        if self.tools.insert(name.clone(), tool).is_some() {
            tracing::debug!(tool = %name, "Replaced tool registration");
        }
    }

    pub fn get(&self, name: &str) -> Option<&Arc<dyn Tool>> {
        self.tools.get(name)
    }

    pub fn names(&self) -> Vec<String> {
        let mut names: Vec<_> = self.tools.keys().cloned().collect();
        names.sort();
        names
    }

    pub fn is_empty(&self) -> bool {
        self.tools.is_empty()
    }

    /// Listing entries for `available` names that resolve, in input order
    pub fn listings(&self, available: &[String]) -> Vec<ToolListing> {
        available
            .iter()
            .filter_map(|name| {
                self.tools.get(name).map(|tool| ToolListing {
                    name: name.clone(),
                    description: tool.description(),
                    domain: tool.domain(),
                })
            })
            .collect()
    }

    /// Execute a tool by name
    pub async fn execute(&self, name: &str, args: Value, ctx: ToolContext) -> ToolCallResult {
        let Some(tool) = self.tools.get(name) else {
            tracing::warn!(tool = %name, session_id = %ctx.session_id, "Unknown tool requested");
            return ToolCallResult::not_found(name);
        };

        let args = normalize_args(args);
        let start = std::time::Instant::now();
        let outcome = AssertUnwindSafe(tool.run(args, ctx.clone()))
            .catch_unwind()
            .await;
        let duration_ms = start.elapsed().as_millis();

        match outcome {
            Ok(Ok(text)) => {
                tracing::info!(tool = %name, session_id = %ctx.session_id, duration_ms, "Tool completed");
                ToolCallResult::ok(name, text)
            }
            Ok(Err(e)) => {
                tracing::warn!(tool = %name, session_id = %ctx.session_id, duration_ms, error = %e, "Tool failed");
                ToolCallResult::failed(name, e)
            }
            Err(panic) => {
                let message = panic_message(panic.as_ref());
                tracing::error!(tool = %name, session_id = %ctx.session_id, duration_ms, panic = %message, "Tool panicked");
                ToolCallResult::failed(name, message)
            }
        }
    }
}

/// Tools always receive an object; anything else is wrapped as `{"input": ..}`
fn normalize_args(args: Value) -> Map<String, Value> {
    match args {
        Value::Object(map) => map,
        Value::Null => Map::new(),
        other => {
            let mut map = Map::new();
            map.insert("input".to_string(), other);
            map
        }
    }
}

fn panic_message(payload: &(dyn Any + Send)) -> String {
    if let Some(s) = payload.downcast_ref::<&str>() {
        (*s).to_string()
    } else if let Some(s) = payload.downcast_ref::<String>() {
        s.clone()
    } else {
        "panicked".to_string()
    }
}
