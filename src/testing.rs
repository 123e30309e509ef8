//! Test doubles for the model client and tools
//!
//! These mocks enable testing routing and the ReAct loop without real I/O.

use crate::domain::Domain;
use crate::llm::{LlmError, LlmRequest, LlmResponse, ModelClient};
use crate::tools::{Tool, ToolContext, ToolError};
use async_trait::async_trait;
use serde_json::{json, Map, Value};
use std::collections::VecDeque;
use std::sync::Mutex;
use std::time::Duration;

// ============================================================================
// Mock Model Client
// ============================================================================

/// Mock model client that returns queued responses
pub struct MockModelClient {
    responses: Mutex<VecDeque<Result<LlmResponse, LlmError>>>,
    /// Returned once the queue is empty
    fallback: Mutex<Option<LlmResponse>>,
    model_id: String,
    delay: Option<Duration>,
    /// Record of all requests made
    pub requests: Mutex<Vec<LlmRequest>>,
}

impl MockModelClient {
    pub fn new(model_id: impl Into<String>) -> Self {
        Self {
            responses: Mutex::new(VecDeque::new()),
            fallback: Mutex::new(None),
            model_id: model_id.into(),
            delay: None,
            requests: Mutex::new(Vec::new()),
        }
    }

    /// Client that answers every request with the same text
    pub fn repeating(text: impl Into<String>) -> Self {
        let client = Self::new("mock-model");
        *client.fallback.lock().unwrap() = Some(LlmResponse::from_text(text));
        client
    }

    /// Sleep before answering each request
    #[must_use]
    pub fn with_delay(mut self, delay: Duration) -> Self {
        self.delay = Some(delay);
        self
    }

    pub fn queue_response(&self, response: LlmResponse) {
        self.responses.lock().unwrap().push_back(Ok(response));
    }

    pub fn queue_text(&self, text: impl Into<String>) {
        self.queue_response(LlmResponse::from_text(text));
    }

    pub fn queue_error(&self, error: LlmError) {
        self.responses.lock().unwrap().push_back(Err(error));
    }

    pub fn recorded_requests(&self) -> Vec<LlmRequest> {
        self.requests.lock().unwrap().clone()
    }

    pub fn call_count(&self) -> usize {
        self.requests.lock().unwrap().len()
    }
}

#[async_trait]
impl ModelClient for MockModelClient {
    async fn complete(&self, request: &LlmRequest) -> Result<LlmResponse, LlmError> {
        self.requests.lock().unwrap().push(request.clone());
        if let Some(delay) = self.delay {
            tokio::time::sleep(delay).await;
        }
        let queued = self.responses.lock().unwrap().pop_front();
        queued.unwrap_or_else(|| {
            self.fallback
                .lock()
                .unwrap()
                .clone()
                .ok_or_else(|| LlmError::network("No mock response queued"))
        })
    }

    fn model_id(&self) -> &str {
        &self.model_id
    }
}

// ============================================================================
// Mock Tools
// ============================================================================

/// Echoes its arguments back
pub struct EchoTool {
    name: String,
    domain: Domain,
}

impl EchoTool {
    pub fn new(name: impl Into<String>, domain: Domain) -> Self {
        Self {
            name: name.into(),
            domain,
        }
    }
}

#[async_trait]
impl Tool for EchoTool {
    fn name(&self) -> &str {
        &self.name
    }

    fn description(&self) -> String {
        format!("Mock {} tool", self.name)
    }

    fn input_schema(&self) -> Value {
        json!({ "type": "object", "properties": {} })
    }

    fn domain(&self) -> Domain {
        self.domain
    }

    async fn run(&self, args: Map<String, Value>, _ctx: ToolContext) -> Result<String, ToolError> {
        Ok(format!("{}: {}", self.name, Value::Object(args)))
    }
}

/// Always fails with the same message
pub struct FailingTool {
    name: String,
    message: String,
}

impl FailingTool {
    pub fn new(name: impl Into<String>, message: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            message: message.into(),
        }
    }
}

#[async_trait]
impl Tool for FailingTool {
    fn name(&self) -> &str {
        &self.name
    }

    fn description(&self) -> String {
        "Always fails".to_string()
    }

    fn input_schema(&self) -> Value {
        json!({ "type": "object" })
    }

    async fn run(&self, _args: Map<String, Value>, _ctx: ToolContext) -> Result<String, ToolError> {
        Err(ToolError::Failed(self.message.clone()))
    }
}

/// Panics when run
pub struct PanickingTool;

#[async_trait]
impl Tool for PanickingTool {
    fn name(&self) -> &'static str {
        "explode"
    }

    fn description(&self) -> String {
        "Panics".to_string()
    }

    fn input_schema(&self) -> Value {
        json!({ "type": "object" })
    }

    async fn run(&self, _args: Map<String, Value>, _ctx: ToolContext) -> Result<String, ToolError> {
        panic!("kaboom")
    }
}
