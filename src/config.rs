//! Orchestrator configuration
//!
//! Read once from the environment at startup. A [`SharedConfig`] lets an
//! operator swap the whole snapshot at runtime; turns already running keep
//! the snapshot they started with.

use std::str::FromStr;
use std::sync::{Arc, Mutex, PoisonError};
use std::time::Duration;
use thiserror::Error;

pub const DEFAULT_MAX_ITERATIONS: u32 = 5;
pub const DEFAULT_MAX_CONTEXT_TOKENS: usize = 8_000;
pub const DEFAULT_MAX_MESSAGES: usize = 20;
pub const DEFAULT_MAX_TOOL_RESULT_CHARS: usize = 4_000;
pub const DEFAULT_MIN_BUDGET_TOKENS: usize = 500;
pub const DEFAULT_ROUTER_MAX_TOKENS: usize = 1_000;
pub const DEFAULT_ROUTER_MAX_MESSAGES: usize = 6;
pub const DEFAULT_LLM_RETRY_ATTEMPTS: u32 = 3;
pub const DEFAULT_LLM_RETRY_BASE_DELAY: Duration = Duration::from_secs(1);

#[derive(Debug, Error, PartialEq, Eq)]
pub enum ConfigError {
    #[error("invalid value {value:?} for {var}")]
    InvalidValue { var: &'static str, value: String },
    #[error("{0} must be greater than zero")]
    MustBePositive(&'static str),
}

/// Runtime limits for routing and the ReAct loop
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct OrchestratorConfig {
    /// Cap on Thinking cycles per turn
    pub max_iterations: u32,
    /// Token budget for every model call
    pub max_context_tokens: usize,
    /// Sliding-window message cap
    pub max_messages: usize,
    /// Tool results longer than this are excerpted before costing
    pub max_tool_result_chars: usize,
    /// Lowest budget left for history once the system prompt is paid for
    pub min_budget_tokens: usize,
    pub router_max_tokens: usize,
    pub router_max_messages: usize,
    /// Attempts per model call, counting the first
    pub llm_retry_attempts: u32,
    pub llm_retry_base_delay: Duration,
}

impl Default for OrchestratorConfig {
    fn default() -> Self {
        Self {
            max_iterations: DEFAULT_MAX_ITERATIONS,
            max_context_tokens: DEFAULT_MAX_CONTEXT_TOKENS,
            max_messages: DEFAULT_MAX_MESSAGES,
            max_tool_result_chars: DEFAULT_MAX_TOOL_RESULT_CHARS,
            min_budget_tokens: DEFAULT_MIN_BUDGET_TOKENS,
            router_max_tokens: DEFAULT_ROUTER_MAX_TOKENS,
            router_max_messages: DEFAULT_ROUTER_MAX_MESSAGES,
            llm_retry_attempts: DEFAULT_LLM_RETRY_ATTEMPTS,
            llm_retry_base_delay: DEFAULT_LLM_RETRY_BASE_DELAY,
        }
    }
}

impl OrchestratorConfig {
    pub fn from_env() -> Result<Self, ConfigError> {
        Self::from_lookup(|var| std::env::var(var).ok())
    }

    /// Build from an arbitrary variable source; unset variables keep defaults
    pub fn from_lookup<F>(lookup: F) -> Result<Self, ConfigError>
    where
        F: Fn(&str) -> Option<String>,
    {
        let defaults = Self::default();
        let config = Self {
            max_iterations: parse_var(&lookup, "ORCH_MAX_ITERATIONS", defaults.max_iterations)?,
            max_context_tokens: parse_var(
                &lookup,
                "ORCH_MAX_CONTEXT_TOKENS",
                defaults.max_context_tokens,
            )?,
            max_messages: parse_var(&lookup, "ORCH_MAX_MESSAGES", defaults.max_messages)?,
            max_tool_result_chars: parse_var(
                &lookup,
                "ORCH_MAX_TOOL_RESULT_CHARS",
                defaults.max_tool_result_chars,
            )?,
            min_budget_tokens: parse_var(
                &lookup,
                "ORCH_MIN_BUDGET_TOKENS",
                defaults.min_budget_tokens,
            )?,
            router_max_tokens: parse_var(
                &lookup,
                "ORCH_ROUTER_MAX_TOKENS",
                defaults.router_max_tokens,
            )?,
            router_max_messages: parse_var(
                &lookup,
                "ORCH_ROUTER_MAX_MESSAGES",
                defaults.router_max_messages,
            )?,
            llm_retry_attempts: parse_var(
                &lookup,
                "ORCH_LLM_RETRY_ATTEMPTS",
                defaults.llm_retry_attempts,
            )?,
            llm_retry_base_delay: Duration::from_millis(parse_var(
                &lookup,
                "ORCH_LLM_RETRY_BASE_MS",
                u64::try_from(defaults.llm_retry_base_delay.as_millis()).unwrap_or(u64::MAX),
            )?),
        };
        config.validate()?;
        Ok(config)
    }

    pub fn validate(&self) -> Result<(), ConfigError> {
        if self.max_iterations == 0 {
            return Err(ConfigError::MustBePositive("max_iterations"));
        }
        if self.max_messages == 0 {
            return Err(ConfigError::MustBePositive("max_messages"));
        }
        if self.router_max_messages == 0 {
            return Err(ConfigError::MustBePositive("router_max_messages"));
        }
        if self.max_tool_result_chars == 0 {
            return Err(ConfigError::MustBePositive("max_tool_result_chars"));
        }
        if self.llm_retry_attempts == 0 {
            return Err(ConfigError::MustBePositive("llm_retry_attempts"));
        }
        Ok(())
    }
}

fn parse_var<F, T>(lookup: &F, var: &'static str, default: T) -> Result<T, ConfigError>
where
    F: Fn(&str) -> Option<String>,
    T: FromStr,
{
    match lookup(var) {
        None => Ok(default),
        Some(raw) => raw
            .trim()
            .parse()
            .map_err(|_| ConfigError::InvalidValue { var, value: raw }),
    }
}

/// Atomically swappable configuration snapshot
#[derive(Debug)]
pub struct SharedConfig {
    current: Mutex<Arc<OrchestratorConfig>>,
}

impl SharedConfig {
    pub fn new(config: OrchestratorConfig) -> Self {
        Self {
            current: Mutex::new(Arc::new(config)),
        }
    }

    pub fn snapshot(&self) -> Arc<OrchestratorConfig> {
        Arc::clone(&self.current.lock().unwrap_or_else(PoisonError::into_inner))
    }

    /// Validate and install a new snapshot
    pub fn replace(&self, config: OrchestratorConfig) -> Result<(), ConfigError> {
        config.validate()?;
        *self.current.lock().unwrap_or_else(PoisonError::into_inner) = Arc::new(config);
        tracing::info!("Orchestrator configuration replaced");
        Ok(())
    }
}

impl Default for SharedConfig {
    fn default() -> Self {
        Self::new(OrchestratorConfig::default())
    }
}
