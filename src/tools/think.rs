//! Think tool - lets the model write notes without side effects

use super::{Tool, ToolContext, ToolError};
use async_trait::async_trait;
use serde::Deserialize;
use serde_json::{json, Map, Value};

/// Think tool for model reasoning
pub struct ThinkTool;

#[derive(Debug, Deserialize)]
struct ThinkInput {
    thoughts: String,
}

#[async_trait]
impl Tool for ThinkTool {
    fn name(&self) -> &'static str {
        "think"
    }

    fn description(&self) -> String {
        "Write down a plan or intermediate reasoning before acting. No side effects; the notes are echoed back.".to_string()
    }

    fn input_schema(&self) -> Value {
        json!({
            "type": "object",
            "required": ["thoughts"],
            "properties": {
                "thoughts": {
                    "type": "string",
                    "description": "The thoughts, notes, or plans to record"
                }
            }
        })
    }

    async fn run(&self, args: Map<String, Value>, _ctx: ToolContext) -> Result<String, ToolError> {
        let input: ThinkInput = serde_json::from_value(Value::Object(args))
            .map_err(|e| ToolError::InvalidInput(e.to_string()))?;
        Ok(format!("recorded ({} chars)", input.thoughts.chars().count()))
    }
}
