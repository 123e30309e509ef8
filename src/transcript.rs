//! Conversion of conversation history into model request messages
//!
//! Backends expect strictly alternating user/assistant turns starting with a
//! user turn. System messages become system content and tool results are
//! folded into user turns.

use crate::conversation::{Message, Role};
use crate::llm::{ContentBlock, LlmMessage, MessageRole, SystemContent};
use serde_json::Value;

/// Split history into system content and alternating request messages.
///
/// `trailing_user` is appended as the final user turn (merged into the
/// previous user turn if the history already ends with one).
pub fn to_request_messages(
    history: &[Message],
    trailing_user: Option<&str>,
) -> (Vec<SystemContent>, Vec<LlmMessage>) {
    let mut system = Vec::new();
    let mut turns: Vec<(MessageRole, Vec<String>)> = Vec::new();

    let mut push = |role: MessageRole, text: String| match turns.last_mut() {
        Some((last_role, parts)) if *last_role == role => parts.push(text),
        _ => turns.push((role, vec![text])),
    };

    for message in history {
        match message.role {
            Role::System => system.push(SystemContent::new(message.content.clone())),
            Role::User => push(MessageRole::User, message.content.clone()),
            Role::Assistant => push(MessageRole::Assistant, render_assistant(message)),
            Role::Tool => push(
                MessageRole::User,
                format!("[tool result]\n{}", message.content),
            ),
        }
    }

    if let Some(text) = trailing_user {
        push(MessageRole::User, text.to_string());
    }

    // A window may start mid-conversation on an assistant turn
    while turns
        .first()
        .is_some_and(|(role, _)| *role == MessageRole::Assistant)
    {
        turns.remove(0);
    }

    let messages = turns
        .into_iter()
        .map(|(role, parts)| LlmMessage {
            role,
            content: vec![ContentBlock::text(parts.join("\n\n"))],
        })
        .collect();

    (system, messages)
}

fn render_assistant(message: &Message) -> String {
    match &message.tool_call {
        Some(call) => {
            let args = Value::Object(call.tool_args.clone());
            if message.content.is_empty() {
                format!("[called tool {} with {args}]", call.tool_name)
            } else {
                format!("{}\n[called tool {} with {args}]", message.content, call.tool_name)
            }
        }
        None => message.content.clone(),
    }
}
