//! ReAct phase machine
//!
//! A pure function from (phase, event) to the next phase. The engine performs
//! all I/O and feeds the results back in as events.

use std::fmt;
use thiserror::Error;

/// Where a turn is in the Thinking/Acting/Observing cycle.
///
/// `iteration` counts Thinking cycles from zero.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ReactPhase {
    Thinking { iteration: u32 },
    Acting { iteration: u32, tool_name: String },
    Observing { iteration: u32 },
    Answered,
    /// Iteration cap reached without an answer
    Exhausted,
    /// The model could not be reached
    Failed,
    Cancelled,
}

impl ReactPhase {
    pub fn start() -> Self {
        ReactPhase::Thinking { iteration: 0 }
    }

    pub fn is_terminal(&self) -> bool {
        matches!(
            self,
            ReactPhase::Answered | ReactPhase::Exhausted | ReactPhase::Failed | ReactPhase::Cancelled
        )
    }
}

impl fmt::Display for ReactPhase {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            ReactPhase::Thinking { iteration } => write!(f, "thinking({iteration})"),
            ReactPhase::Acting { iteration, tool_name } => {
                write!(f, "acting({iteration}, {tool_name})")
            }
            ReactPhase::Observing { iteration } => write!(f, "observing({iteration})"),
            ReactPhase::Answered => f.write_str("answered"),
            ReactPhase::Exhausted => f.write_str("exhausted"),
            ReactPhase::Failed => f.write_str("failed"),
            ReactPhase::Cancelled => f.write_str("cancelled"),
        }
    }
}

/// Things that happen during a turn
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ReactEvent {
    /// Model chose a tool
    ToolProposed { tool_name: String },
    /// Model gave its final answer
    AnswerProposed,
    /// Model call failed after retries
    ModelFailed,
    /// Tool returned (successfully or not)
    ToolReturned,
    /// Observation was recorded in the trace
    ObservationRecorded,
    Cancel,
}

#[derive(Debug, Error, PartialEq, Eq)]
pub enum TransitionError {
    #[error("phase {0} is terminal")]
    Terminal(String),
    #[error("invalid transition: {event:?} in phase {phase}")]
    InvalidTransition { phase: String, event: ReactEvent },
}

/// Pure transition function
pub fn transition(
    phase: &ReactPhase,
    event: ReactEvent,
    max_iterations: u32,
) -> Result<ReactPhase, TransitionError> {
    match (phase, event) {
        (p, _) if p.is_terminal() => Err(TransitionError::Terminal(p.to_string())),

        (ReactPhase::Thinking { iteration }, ReactEvent::ToolProposed { tool_name }) => {
            Ok(ReactPhase::Acting {
                iteration: *iteration,
                tool_name,
            })
        }
        (ReactPhase::Thinking { .. }, ReactEvent::AnswerProposed) => Ok(ReactPhase::Answered),
        (ReactPhase::Thinking { .. }, ReactEvent::ModelFailed) => Ok(ReactPhase::Failed),

        (ReactPhase::Acting { iteration, .. }, ReactEvent::ToolReturned) => {
            Ok(ReactPhase::Observing {
                iteration: *iteration,
            })
        }

        (ReactPhase::Observing { iteration }, ReactEvent::ObservationRecorded) => {
            let next = iteration.saturating_add(1);
            if next >= max_iterations {
                Ok(ReactPhase::Exhausted)
            } else {
                Ok(ReactPhase::Thinking { iteration: next })
            }
        }

        (_, ReactEvent::Cancel) => Ok(ReactPhase::Cancelled),

        (phase, event) => Err(TransitionError::InvalidTransition {
            phase: phase.to_string(),
            event,
        }),
    }
}
