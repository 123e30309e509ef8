//! Context window manager
//!
//! Bounds the estimated token cost of history sent to the model. System
//! messages are paid for first; the rest of the budget goes to the newest
//! messages.

#[cfg(test)]
mod proptests;

use crate::config::OrchestratorConfig;
use crate::conversation::{Message, Role};
use std::borrow::Cow;

/// Fixed per-message framing cost (role markers, separators)
pub const MESSAGE_OVERHEAD_TOKENS: usize = 4;

/// Cheap length-based token estimate: one token per four characters
pub fn estimate_tokens(text: &str) -> usize {
    text.chars().count().div_ceil(4)
}

/// Estimated cost of one message including its tool call, if any
pub fn estimate_message_tokens(message: &Message) -> usize {
    let mut tokens = MESSAGE_OVERHEAD_TOKENS + estimate_tokens(&message.content);
    if let Some(call) = &message.tool_call {
        tokens += estimate_tokens(&call.tool_name);
        tokens += estimate_tokens(&serde_json::to_string(&call.tool_args).unwrap_or_default());
    }
    tokens
}

pub fn estimate_history_tokens(messages: &[Message]) -> usize {
    messages.iter().map(estimate_message_tokens).sum()
}

/// Keep the first and last parts of `text`, replacing the middle with a
/// marker, when it is longer than `max_chars` characters
pub fn excerpt(text: &str, max_chars: usize) -> Cow<'_, str> {
    let total = text.chars().count();
    if total <= max_chars {
        return Cow::Borrowed(text);
    }

    let head_chars = max_chars / 2;
    let tail_chars = max_chars - head_chars;
    let head: String = text.chars().take(head_chars).collect();
    let tail: String = text.chars().skip(total - tail_chars).collect();
    let elided = total - head_chars - tail_chars;

    Cow::Owned(format!(
        "{head}\n\n[... {elided} characters elided ...]\n\n{tail}"
    ))
}

/// Limits applied by [`WindowPolicy::apply`]
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct WindowPolicy {
    pub max_tokens: usize,
    /// Values below one are treated as one
    pub max_messages: usize,
    pub keep_system: bool,
    /// Keep the newest non-system message even when it alone exceeds the
    /// budget
    pub force_newest: bool,
    pub max_tool_result_chars: usize,
    pub min_budget_tokens: usize,
}

/// Result of windowing plus what was done to get there
#[derive(Debug, Clone, PartialEq)]
pub struct WindowReport {
    pub messages: Vec<Message>,
    pub estimated_tokens: usize,
    /// Messages from the input that did not make it into the window
    pub dropped: usize,
    /// Tool results replaced by an excerpt
    pub truncated: usize,
    /// System messages left less than the floor for everything else
    pub budget_floored: bool,
    /// The newest message was over budget and kept regardless of size
    pub forced_single: bool,
}

impl WindowPolicy {
    pub fn new(max_tokens: usize, max_messages: usize, keep_system: bool) -> Self {
        let defaults = OrchestratorConfig::default();
        Self {
            max_tokens,
            max_messages,
            keep_system,
            force_newest: true,
            max_tool_result_chars: defaults.max_tool_result_chars,
            min_budget_tokens: defaults.min_budget_tokens,
        }
    }

    /// Policy for prior-turn history in ReAct model calls. The current
    /// question travels in the step prompt, so nothing here is forced.
    pub fn for_engine(config: &OrchestratorConfig) -> Self {
        Self {
            max_tokens: config.max_context_tokens,
            max_messages: config.max_messages,
            keep_system: true,
            force_newest: false,
            max_tool_result_chars: config.max_tool_result_chars,
            min_budget_tokens: config.min_budget_tokens,
        }
    }

    /// Smaller policy for routing, which needs little history
    pub fn for_router(config: &OrchestratorConfig) -> Self {
        Self {
            max_tokens: config.router_max_tokens,
            max_messages: config.router_max_messages,
            keep_system: true,
            force_newest: true,
            max_tool_result_chars: config.max_tool_result_chars,
            min_budget_tokens: config.min_budget_tokens,
        }
    }

    #[must_use]
    pub fn with_max_tokens(mut self, max_tokens: usize) -> Self {
        self.max_tokens = max_tokens;
        self
    }

    pub fn apply(&self, history: &[Message]) -> WindowReport {
        let (system, other): (Vec<&Message>, Vec<&Message>) = if self.keep_system {
            history.iter().partition(|m| m.role == Role::System)
        } else {
            (Vec::new(), history.iter().collect())
        };

        let system_tokens: usize = system.iter().map(|m| estimate_message_tokens(m)).sum();

        // The floor never exceeds the caller's own budget
        let floor = self.min_budget_tokens.min(self.max_tokens);
        let remaining = self.max_tokens.saturating_sub(system_tokens);
        let budget_floored = remaining < floor;
        let budget = if budget_floored {
            tracing::warn!(
                max_tokens = self.max_tokens,
                system_tokens,
                floor,
                "System messages exhaust the context budget; using floor"
            );
            floor
        } else {
            remaining
        };

        let cap = self.max_messages.max(1);
        let mut kept: Vec<(usize, Message)> = Vec::new();
        let mut used = 0usize;
        let mut truncated = 0usize;
        let mut forced_single = false;

        // The newest non-system message is placed first so neither the cap
        // nor a newer system message can push it out
        let anchor = other.iter().rposition(|m| m.role != Role::System);
        let mut walk = true;
        if let Some(index) = anchor {
            let (candidate, excerpted) = self.fit_message(other[index]);
            let cost = estimate_message_tokens(&candidate);
            if cost <= budget || self.force_newest {
                forced_single = cost > budget;
                walk = !forced_single;
                used = cost;
                truncated += usize::from(excerpted);
                kept.push((index, candidate));
            } else {
                walk = false;
            }
        }

        if walk {
            for (index, message) in other.iter().enumerate().rev() {
                if kept.len() >= cap {
                    break;
                }
                if Some(index) == anchor {
                    continue;
                }
                let (candidate, excerpted) = self.fit_message(message);
                let cost = estimate_message_tokens(&candidate);
                if used + cost > budget {
                    break;
                }
                used += cost;
                truncated += usize::from(excerpted);
                kept.push((index, candidate));
            }
        }
        kept.sort_by_key(|(index, _)| *index);

        let mut messages: Vec<Message> = system.into_iter().cloned().collect();
        messages.extend(kept.into_iter().map(|(_, message)| message));

        WindowReport {
            estimated_tokens: system_tokens + used,
            dropped: history.len() - messages.len(),
            truncated,
            budget_floored,
            forced_single,
            messages,
        }
    }

    /// The message as it would be sent, and whether it was excerpted
    fn fit_message(&self, message: &Message) -> (Message, bool) {
        if message.role != Role::Tool {
            return (message.clone(), false);
        }
        match excerpt(&message.content, self.max_tool_result_chars) {
            Cow::Borrowed(_) => (message.clone(), false),
            Cow::Owned(short) => (
                Message {
                    content: short,
                    ..message.clone()
                },
                true,
            ),
        }
    }
}

/// Sliding window over `history`.
///
/// The result preserves chronological order, always contains the newest
/// non-system message, and costs at most `max_tokens` unless the newest
/// message alone is larger.
pub fn windowed(
    history: &[Message],
    max_tokens: usize,
    max_messages: usize,
    keep_system: bool,
) -> Vec<Message> {
    WindowPolicy::new(max_tokens, max_messages, keep_system)
        .apply(history)
        .messages
}

#[cfg(test)]
mod tests {
    use super::*;

    fn numbered(count: usize) -> Vec<Message> {
        (0..count)
            .map(|i| {
                if i % 2 == 0 {
                    Message::user(format!("question {i}"))
                } else {
                    Message::assistant(format!("answer {i}"))
                }
            })
            .collect()
    }

    #[test]
    fn test_estimate_tokens_rounds_up() {
        assert_eq!(estimate_tokens(""), 0);
        assert_eq!(estimate_tokens("abc"), 1);
        assert_eq!(estimate_tokens("abcd"), 1);
        assert_eq!(estimate_tokens("abcde"), 2);
        // counts characters, not bytes
        assert_eq!(estimate_tokens("ééééé"), 2);
    }

    #[test]
    fn test_message_cap_drops_oldest() {
        let mut history = vec![Message::system("rules")];
        history.extend(numbered(12));

        let window = windowed(&history, 10_000, 8, true);
        let non_system: Vec<_> = window.iter().filter(|m| m.role != Role::System).collect();

        assert_eq!(non_system.len(), 8);
        assert_eq!(non_system[0].content, "question 4");
        assert_eq!(non_system[7].content, "answer 11");
        assert_eq!(window[0].role, Role::System);
    }

    #[test]
    fn test_budget_keeps_newest() {
        let history: Vec<Message> = (0..10).map(|i| Message::user(format!("{i}").repeat(40))).collect();
        // Each message: 40 chars -> 10 tokens + 4 overhead = 14
        let report = WindowPolicy::new(30, 100, true).apply(&history);

        assert_eq!(report.messages.len(), 2);
        assert_eq!(report.messages[1].content, "9".repeat(40));
        assert_eq!(report.estimated_tokens, 28);
        assert_eq!(report.dropped, 8);
        assert!(!report.forced_single);
    }

    #[test]
    fn test_single_oversized_message_is_forced() {
        let history = vec![Message::user("x".repeat(10_000))];
        let report = WindowPolicy::new(100, 10, true).apply(&history);

        assert_eq!(report.messages.len(), 1);
        assert!(report.forced_single);
        assert!(report.estimated_tokens > 100);
    }

    #[test]
    fn test_large_tool_result_is_excerpted() {
        let big = format!("HEAD{}TAIL", "m".repeat(20_000));
        let history = vec![Message::user("run it"), Message::tool(big)];
        let report = WindowPolicy::new(8_000, 10, true).apply(&history);

        assert_eq!(report.truncated, 1);
        let tool = &report.messages[1].content;
        assert!(tool.starts_with("HEAD"));
        assert!(tool.ends_with("TAIL"));
        assert!(tool.contains("characters elided"));
        assert_eq!(report.messages[0].content, "run it");
    }

    #[test]
    fn test_system_cost_floors_budget() {
        let history = vec![
            Message::system("s".repeat(4_000)),
            Message::user("u".repeat(400)),
        ];
        let report = WindowPolicy::new(1_000, 10, true).apply(&history);

        assert!(report.budget_floored);
        assert_eq!(report.messages.len(), 2);
    }

    #[test]
    fn test_without_keep_system_system_is_windowed() {
        let history = vec![Message::system("rules"), Message::user("hi")];
        let window = windowed(&history, 10_000, 1, false);
        assert_eq!(window, vec![Message::user("hi")]);
    }

    #[test]
    fn test_zero_message_cap_keeps_newest() {
        let history = vec![Message::system("rules"), Message::user("latest")];
        let window = windowed(&history, 10_000, 0, true);
        assert_eq!(window, history);
    }

    #[test]
    fn test_large_trailing_system_does_not_displace_newest() {
        let history = vec![
            Message::user("latest question"),
            Message::system("s".repeat(4_000)),
        ];
        let window = windowed(&history, 100, 10, false);
        assert_eq!(window, vec![Message::user("latest question")]);

        // Same under the message cap
        let history = vec![Message::user("latest question"), Message::system("s")];
        let window = windowed(&history, 10_000, 1, false);
        assert_eq!(window, vec![Message::user("latest question")]);
    }

    #[test]
    fn test_unforced_policy_stays_within_budget() {
        let history = vec![
            Message::assistant("hello"),
            Message::user("y".repeat(20_000)),
            Message::assistant("noted"),
            Message::tool("z".repeat(3_900)),
        ];
        let mut policy = WindowPolicy::new(800, 10, true);
        policy.force_newest = false;
        let report = policy.apply(&history);

        assert!(report.messages.is_empty());
        assert!(!report.forced_single);
        assert_eq!(report.estimated_tokens, 0);
        assert_eq!(report.dropped, 4);

        // Once the newest fits, older messages follow until one does not
        let report = policy.with_max_tokens(2_000).apply(&history);
        assert_eq!(report.messages.len(), 2);
        assert_eq!(report.messages[0].content, "noted");
        assert!(report.estimated_tokens <= 2_000);
    }

    #[test]
    fn test_empty_history() {
        let report = WindowPolicy::new(100, 10, true).apply(&[]);
        assert!(report.messages.is_empty());
        assert_eq!(report.estimated_tokens, 0);
    }

    #[test]
    fn test_excerpt_is_char_safe() {
        let text = "日本語".repeat(100);
        let short = excerpt(&text, 10);
        assert!(short.starts_with("日本語日本"));
        assert!(short.contains("[... 290 characters elided ...]"));
        assert!(matches!(excerpt("short", 10), Cow::Borrowed(_)));
    }
}
