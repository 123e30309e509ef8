//! Decision parsing for the ReAct loop
//!
//! Model output is parsed in three tiers: the whole text as one JSON object
//! (code fences stripped), then the smallest embedded object carrying an
//! `action` key, then the raw text as a final answer. A function call
//! returned by a backend with native tool use is taken as-is.

use crate::llm::LlmResponse;
use crate::parse;
use serde_json::{Map, Value};

/// Reasoning recorded when the model's output could not be parsed
pub const FALLBACK_REASONING: &str = "model output was not a structured decision; treating it as the answer";

/// Answer text used when the model produced nothing at all
pub const EMPTY_OUTPUT_ANSWER: &str = "I'm sorry, I was unable to produce an answer.";

/// What the model wants to do next
#[derive(Debug, Clone, PartialEq)]
pub enum Action {
    Tool {
        name: String,
        args: Map<String, Value>,
    },
    Answer {
        response: String,
    },
}

/// One Thinking step's output
#[derive(Debug, Clone, PartialEq)]
pub struct Decision {
    pub reasoning: String,
    pub action: Action,
}

/// Which parsing tier produced a decision
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ParseTier {
    /// Native function call from the backend
    Structured,
    /// Whole output was one JSON object
    Strict,
    /// Object found embedded in surrounding text
    Scanned,
    /// Raw text used as the answer
    Fallback,
}

#[derive(Debug, Clone, PartialEq)]
pub struct ParsedDecision {
    pub decision: Decision,
    pub tier: ParseTier,
}

/// Parse a full model response, preferring native function calls
pub fn parse_response(response: &LlmResponse) -> ParsedDecision {
    let text = response.text();
    if let Some((_, name, input)) = response.tool_uses().into_iter().next() {
        return ParsedDecision {
            decision: Decision {
                reasoning: text.trim().to_string(),
                action: Action::Tool {
                    name: name.to_string(),
                    args: args_from_value(input.clone()),
                },
            },
            tier: ParseTier::Structured,
        };
    }
    parse_decision(&text)
}

/// Parse model text into a decision; never fails
pub fn parse_decision(text: &str) -> ParsedDecision {
    if let Some(decision) = parse::strict_object(text).and_then(|o| decision_from_object(&o)) {
        return ParsedDecision {
            decision,
            tier: ParseTier::Strict,
        };
    }

    if let Some(decision) = parse::scan_objects_with_key(text, "action")
        .iter()
        .find_map(decision_from_object)
    {
        return ParsedDecision {
            decision,
            tier: ParseTier::Scanned,
        };
    }

    let raw = text.trim();
    let response = if raw.is_empty() {
        EMPTY_OUTPUT_ANSWER.to_string()
    } else {
        raw.to_string()
    };
    ParsedDecision {
        decision: Decision {
            reasoning: FALLBACK_REASONING.to_string(),
            action: Action::Answer { response },
        },
        tier: ParseTier::Fallback,
    }
}

fn decision_from_object(object: &Map<String, Value>) -> Option<Decision> {
    let action = object.get("action")?.as_str()?.trim().to_ascii_lowercase();
    let reasoning = object
        .get("reasoning")
        .map(parse::value_to_text)
        .unwrap_or_default();

    let action = match action.as_str() {
        "tool" => {
            let name = object.get("tool")?.as_str()?.trim();
            if name.is_empty() {
                return None;
            }
            Action::Tool {
                name: name.to_string(),
                args: object
                    .get("args")
                    .cloned()
                    .map(args_from_value)
                    .unwrap_or_default(),
            }
        }
        "answer" => {
            let response = object
                .get("response")
                .map(parse::value_to_text)
                .filter(|r| !r.trim().is_empty())
                .or_else(|| (!reasoning.trim().is_empty()).then(|| reasoning.clone()))?;
            Action::Answer { response }
        }
        _ => return None,
    };

    Some(Decision { reasoning, action })
}

/// Tool args are always an object. A JSON-encoded string is decoded; any
/// other scalar is wrapped as `{"input": ..}`.
fn args_from_value(value: Value) -> Map<String, Value> {
    match value {
        Value::Object(map) => map,
        Value::Null => Map::new(),
        Value::String(s) => match serde_json::from_str::<Value>(&s) {
            Ok(Value::Object(map)) => map,
            _ => Map::from_iter([("input".to_string(), Value::String(s))]),
        },
        other => Map::from_iter([("input".to_string(), other)]),
    }
}
