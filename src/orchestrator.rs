//! Turn orchestration
//!
//! One inbound turn: append the user message, route it, run the ReAct loop,
//! and report what happened. Turns of one session are serialised through a
//! per-session lock; distinct sessions run concurrently.

use crate::config::SharedConfig;
use crate::conversation::{ConversationState, ReasoningStep};
use crate::domain::Domain;
use crate::llm::ModelClient;
use crate::react::{ReactEngine, ReactOutcome};
use crate::router::DomainRouter;
use crate::tools::ToolRegistry;
use serde::Serialize;
use std::collections::{BTreeSet, HashMap};
use std::sync::Arc;
use thiserror::Error;
use tokio::sync::{Mutex, RwLock};
use tokio_util::sync::CancellationToken;

#[derive(Debug, Error, PartialEq, Eq)]
pub enum TurnError {
    #[error("message is empty")]
    EmptyMessage,
}

/// One inbound turn
#[derive(Debug, Clone, Default)]
pub struct TurnRequest {
    /// Existing session to continue; a new one is created when absent
    pub session_id: Option<String>,
    pub message: String,
    /// Domain tag that bypasses the router model for this turn
    pub force_domain: Option<String>,
    /// Tools offered this turn; every registered tool when absent
    pub available_tools: Option<Vec<String>>,
}

impl TurnRequest {
    pub fn new(message: impl Into<String>) -> Self {
        Self {
            message: message.into(),
            ..Self::default()
        }
    }

    #[must_use]
    pub fn in_session(mut self, session_id: impl Into<String>) -> Self {
        self.session_id = Some(session_id.into());
        self
    }

    #[must_use]
    pub fn with_force_domain(mut self, tag: impl Into<String>) -> Self {
        self.force_domain = Some(tag.into());
        self
    }

    #[must_use]
    pub fn with_tools(mut self, tools: Vec<String>) -> Self {
        self.available_tools = Some(tools);
        self
    }
}

/// Result of one turn
#[derive(Debug, Clone, Serialize)]
pub struct TurnResponse {
    pub session_id: String,
    /// Empty when the turn was cancelled
    pub answer: String,
    pub agent: String,
    pub domain: Domain,
    pub secondary_domains: BTreeSet<Domain>,
    pub confidence: f64,
    pub outcome: TurnOutcome,
    /// Tool calls made over the whole session
    pub tool_call_count: u32,
    /// Steps recorded during this turn
    pub trace: Vec<ReasoningStep>,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum TurnOutcome {
    Answered,
    Exhausted,
    ModelUnavailable,
    Cancelled,
}

impl From<ReactOutcome> for TurnOutcome {
    fn from(outcome: ReactOutcome) -> Self {
        match outcome {
            ReactOutcome::Answered => TurnOutcome::Answered,
            ReactOutcome::Exhausted => TurnOutcome::Exhausted,
            ReactOutcome::ModelUnavailable => TurnOutcome::ModelUnavailable,
            ReactOutcome::Cancelled => TurnOutcome::Cancelled,
        }
    }
}

/// In-memory sessions, one lock each
#[derive(Default)]
pub struct SessionManager {
    sessions: RwLock<HashMap<String, Arc<Mutex<ConversationState>>>>,
}

impl SessionManager {
    pub fn new() -> Self {
        Self::default()
    }

    /// Handle for `session_id`, creating an empty session if needed
    pub async fn get_or_create(&self, session_id: &str) -> Arc<Mutex<ConversationState>> {
        {
            let sessions = self.sessions.read().await;
            if let Some(session) = sessions.get(session_id) {
                return session.clone();
            }
        }

        let mut sessions = self.sessions.write().await;
        sessions
            .entry(session_id.to_string())
            .or_insert_with(|| {
                tracing::info!(session_id = %session_id, "Created session");
                Arc::new(Mutex::new(ConversationState::new(session_id)))
            })
            .clone()
    }

    /// Register a session restored from elsewhere, replacing any with the same id
    pub async fn insert(&self, state: ConversationState) -> Arc<Mutex<ConversationState>> {
        let id = state.session_id.clone();
        let session = Arc::new(Mutex::new(state));
        self.sessions.write().await.insert(id, session.clone());
        session
    }

    pub async fn get(&self, session_id: &str) -> Option<Arc<Mutex<ConversationState>>> {
        self.sessions.read().await.get(session_id).cloned()
    }

    pub async fn remove(&self, session_id: &str) -> bool {
        self.sessions.write().await.remove(session_id).is_some()
    }

    pub async fn len(&self) -> usize {
        self.sessions.read().await.len()
    }

    pub async fn is_empty(&self) -> bool {
        self.sessions.read().await.is_empty()
    }
}

/// Routes and answers turns
pub struct Orchestrator {
    router_client: Arc<dyn ModelClient>,
    engine_client: Arc<dyn ModelClient>,
    config: SharedConfig,
    tools: ToolRegistry,
    sessions: SessionManager,
}

impl Orchestrator {
    pub fn new(
        router_client: Arc<dyn ModelClient>,
        engine_client: Arc<dyn ModelClient>,
        config: SharedConfig,
        tools: ToolRegistry,
    ) -> Self {
        Self {
            router_client,
            engine_client,
            config,
            tools,
            sessions: SessionManager::new(),
        }
    }

    pub fn sessions(&self) -> &SessionManager {
        &self.sessions
    }

    pub fn config(&self) -> &SharedConfig {
        &self.config
    }

    pub async fn handle_turn(&self, request: TurnRequest) -> Result<TurnResponse, TurnError> {
        self.handle_turn_cancellable(request, &CancellationToken::new())
            .await
    }

    pub async fn handle_turn_cancellable(
        &self,
        request: TurnRequest,
        cancel: &CancellationToken,
    ) -> Result<TurnResponse, TurnError> {
        if request.message.trim().is_empty() {
            return Err(TurnError::EmptyMessage);
        }

        let session_id = request
            .session_id
            .unwrap_or_else(|| uuid::Uuid::new_v4().to_string());
        let session = self.sessions.get_or_create(&session_id).await;
        let mut state = session.lock().await;

        // Limits are fixed for the whole turn
        let config = self.config.snapshot();
        let router = DomainRouter::new(self.router_client.clone(), config.clone());
        let engine = ReactEngine::new(self.engine_client.clone(), config);

        state.push_user(request.message);
        state.context.force_domain = request.force_domain;
        let trace_start = state.trace().len();

        let decision = router.route_and_apply(&mut state).await;

        let available = request
            .available_tools
            .unwrap_or_else(|| self.tools.names());
        let outcome = engine
            .run_cancellable(&mut state, &available, &self.tools, cancel)
            .await;

        let answer = match outcome {
            ReactOutcome::Cancelled => String::new(),
            _ => state.final_answer().unwrap_or_default().to_string(),
        };

        tracing::info!(
            session_id = %state.session_id,
            domain = %decision.destination,
            outcome = ?outcome,
            tool_calls = state.tool_call_count,
            "Turn finished"
        );

        Ok(TurnResponse {
            session_id: state.session_id.clone(),
            answer,
            agent: decision.destination.agent_name().to_string(),
            domain: decision.destination,
            secondary_domains: decision.secondary_domains,
            confidence: state.confidence(),
            outcome: outcome.into(),
            tool_call_count: state.tool_call_count,
            trace: state.trace().get(trace_start..).unwrap_or_default().to_vec(),
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::OrchestratorConfig;
    use crate::conversation::Role;
    use crate::testing::{EchoTool, MockModelClient};
    use std::time::Duration;

    fn orchestrator(router: &Arc<MockModelClient>, engine: &Arc<MockModelClient>) -> Orchestrator {
        let tools = ToolRegistry::standard()
            .with_tool(Arc::new(EchoTool::new("erp_order_status", Domain::Erp)));
        Orchestrator::new(
            router.clone(),
            engine.clone(),
            SharedConfig::new(OrchestratorConfig::default()),
            tools,
        )
    }

    #[tokio::test]
    async fn test_turn_routes_and_answers() {
        let router = Arc::new(MockModelClient::new("router"));
        router.queue_text(r#"{"destination": "erp_agent", "confidence": 0.9, "reasoning": "order"}"#);
        let engine = Arc::new(MockModelClient::new("engine"));
        engine.queue_text(
            r#"{"reasoning": "look up", "action": "tool", "tool": "erp_order_status", "args": {"order_id": "1234"}}"#,
        );
        engine.queue_text(r#"{"reasoning": "got it", "action": "answer", "response": "Order 1234 shipped."}"#);

        let response = orchestrator(&router, &engine)
            .handle_turn(TurnRequest::new("What is the status of order 1234?").in_session("s1"))
            .await
            .unwrap();

        assert_eq!(response.session_id, "s1");
        assert_eq!(response.domain, Domain::Erp);
        assert_eq!(response.agent, "erp_agent");
        assert_eq!(response.answer, "Order 1234 shipped.");
        assert_eq!(response.outcome, TurnOutcome::Answered);
        assert_eq!(response.tool_call_count, 1);
        assert_eq!(response.trace.len(), 5);
        assert!((response.confidence - 0.9).abs() < 1e-9);
    }

    #[tokio::test]
    async fn test_forced_turn_makes_no_router_call() {
        let router = Arc::new(MockModelClient::new("router"));
        let engine = Arc::new(MockModelClient::repeating(
            r#"{"reasoning": "r", "action": "answer", "response": "ok"}"#,
        ));
        let orchestrator = orchestrator(&router, &engine);

        let response = orchestrator
            .handle_turn(TurnRequest::new("hi").with_force_domain("crm"))
            .await
            .unwrap();

        assert_eq!(router.call_count(), 0);
        assert_eq!(response.domain, Domain::Crm);
        // fresh session id was generated
        assert!(orchestrator.sessions().get(&response.session_id).await.is_some());
    }

    #[tokio::test]
    async fn test_session_history_accumulates() {
        let router = Arc::new(MockModelClient::repeating(r#"{"destination": "general_agent"}"#));
        let engine = Arc::new(MockModelClient::repeating(
            r#"{"reasoning": "r", "action": "answer", "response": "ok"}"#,
        ));
        let orchestrator = orchestrator(&router, &engine);

        for question in ["first", "second"] {
            let response = orchestrator
                .handle_turn(TurnRequest::new(question).in_session("s2"))
                .await
                .unwrap();
            assert_eq!(response.trace.len(), 2);
        }

        let session = orchestrator.sessions().get("s2").await.unwrap();
        let state = session.lock().await;
        assert_eq!(state.messages.len(), 4);
        assert_eq!(state.trace().len(), 4);
    }

    #[tokio::test]
    async fn test_session_manager_lifecycle() {
        let sessions = SessionManager::new();
        assert!(sessions.is_empty().await);

        let first = sessions.get_or_create("a").await;
        let again = sessions.get_or_create("a").await;
        assert!(Arc::ptr_eq(&first, &again));

        let restored = ConversationState::from_history("b", vec![crate::Message::user("earlier")]);
        sessions.insert(restored).await;
        assert_eq!(sessions.len().await, 2);
        assert_eq!(
            sessions.get("b").await.unwrap().lock().await.messages.len(),
            1
        );

        assert!(sessions.remove("a").await);
        assert!(!sessions.remove("a").await);
        assert!(sessions.get("a").await.is_none());
    }

    #[tokio::test]
    async fn test_empty_message_rejected() {
        let router = Arc::new(MockModelClient::new("router"));
        let engine = Arc::new(MockModelClient::new("engine"));
        let result = orchestrator(&router, &engine)
            .handle_turn(TurnRequest::new("   "))
            .await;
        assert_eq!(result.unwrap_err(), TurnError::EmptyMessage);
    }

    #[tokio::test]
    async fn test_same_session_turns_serialise() {
        let router = Arc::new(MockModelClient::repeating(r#"{"destination": "general_agent"}"#));
        let engine = Arc::new(
            MockModelClient::repeating(r#"{"reasoning": "r", "action": "answer", "response": "ok"}"#)
                .with_delay(Duration::from_millis(20)),
        );
        let orchestrator = Arc::new(orchestrator(&router, &engine));

        let a = tokio::spawn({
            let orchestrator = orchestrator.clone();
            async move {
                orchestrator
                    .handle_turn(TurnRequest::new("one").in_session("shared"))
                    .await
            }
        });
        let b = tokio::spawn({
            let orchestrator = orchestrator.clone();
            async move {
                orchestrator
                    .handle_turn(TurnRequest::new("two").in_session("shared"))
                    .await
            }
        });
        a.await.unwrap().unwrap();
        b.await.unwrap().unwrap();

        let session = orchestrator.sessions().get("shared").await.unwrap();
        let state = session.lock().await;
        // each user message is directly followed by its own answer
        let roles: Vec<_> = state.messages.iter().map(|m| m.role).collect();
        assert_eq!(
            roles,
            vec![Role::User, Role::Assistant, Role::User, Role::Assistant]
        );
    }

    #[tokio::test]
    async fn test_cancelled_turn_has_empty_answer() {
        let router = Arc::new(MockModelClient::repeating(r#"{"destination": "general_agent"}"#));
        let engine = Arc::new(MockModelClient::repeating("x"));
        let cancel = CancellationToken::new();
        cancel.cancel();

        let response = orchestrator(&router, &engine)
            .handle_turn_cancellable(TurnRequest::new("q"), &cancel)
            .await
            .unwrap();

        assert_eq!(response.outcome, TurnOutcome::Cancelled);
        assert!(response.answer.is_empty());
        assert!(response.trace.is_empty());
        assert_eq!(engine.call_count(), 0);
    }

    #[tokio::test]
    async fn test_config_swap_applies_to_next_turn() {
        let router = Arc::new(MockModelClient::repeating(r#"{"destination": "erp_agent"}"#));
        let engine = Arc::new(MockModelClient::repeating(
            r#"{"reasoning": "again", "action": "tool", "tool": "erp_order_status", "args": {}}"#,
        ));
        let orchestrator = orchestrator(&router, &engine);
        orchestrator
            .config()
            .replace(OrchestratorConfig {
                max_iterations: 1,
                ..OrchestratorConfig::default()
            })
            .unwrap();

        let response = orchestrator.handle_turn(TurnRequest::new("q")).await.unwrap();

        assert_eq!(response.outcome, TurnOutcome::Exhausted);
        assert_eq!(engine.call_count(), 1);
    }
}
