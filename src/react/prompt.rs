//! Prompt assembly for one Thinking step

use crate::context_window::excerpt;
use crate::conversation::{ReasoningStep, StepKind};
use crate::domain::Domain;
use crate::tools::ToolListing;
use std::collections::BTreeSet;
use std::fmt::Write as _;

/// Output protocol appended to the domain's role statement
pub const REACT_PROTOCOL: &str = "Work one step at a time. At each step either call exactly one tool or give the final answer. \
Tool results appear in the reasoning trace as OBSERVE lines. \
Reply with a single JSON object and nothing else.";

const NO_TOOLS_LINE: &str = "- (no tools are available for this request; answer directly)";

/// System text for a turn routed to `primary`
pub fn system_text(primary: Domain) -> String {
    format!("{}\n\n{REACT_PROTOCOL}", primary.system_prompt())
}

/// Order listings primary domain first, then secondary, then the rest.
///
/// The sort is stable, so registration order is kept within each group.
pub fn order_listings(
    mut listings: Vec<ToolListing>,
    primary: Domain,
    secondary: &BTreeSet<Domain>,
) -> Vec<ToolListing> {
    let rank = |domain: Domain| {
        if domain == primary {
            0
        } else if secondary.contains(&domain) {
            1
        } else {
            2
        }
    };
    listings.sort_by_key(|listing| rank(listing.domain));
    let mut seen = BTreeSet::new();
    listings.retain(|listing| seen.insert(listing.name.clone()));
    listings
}

/// Everything rendered into the per-step user prompt
pub struct PromptInputs<'a> {
    pub primary: Domain,
    pub secondary: &'a BTreeSet<Domain>,
    pub tools: &'a [ToolListing],
    /// Steps recorded during this turn
    pub trace: &'a [ReasoningStep],
    pub question: &'a str,
    /// Observations longer than this are excerpted
    pub max_observation_chars: usize,
}

pub fn build_prompt(inputs: &PromptInputs<'_>) -> String {
    let mut prompt = String::new();

    let _ = writeln!(prompt, "Primary domain: {}", inputs.primary);
    let secondary = if inputs.secondary.is_empty() {
        "none".to_string()
    } else {
        inputs
            .secondary
            .iter()
            .map(|d| d.tag())
            .collect::<Vec<_>>()
            .join(", ")
    };
    let _ = writeln!(prompt, "Secondary domains: {secondary}");

    prompt.push_str("\nAvailable tools (most relevant first):\n");
    if inputs.tools.is_empty() {
        let _ = writeln!(prompt, "{NO_TOOLS_LINE}");
    }
    for tool in inputs.tools {
        let _ = writeln!(prompt, "- {} [{}]: {}", tool.name, tool.domain, tool.description);
    }

    prompt.push_str("\nReasoning so far:\n");
    if inputs.trace.is_empty() {
        prompt.push_str("(none yet)\n");
    }
    for step in inputs.trace {
        match &step.kind {
            StepKind::Observe { content } => {
                let _ = writeln!(
                    prompt,
                    "OBSERVE: {}",
                    excerpt(content, inputs.max_observation_chars)
                );
            }
            _ => {
                let _ = writeln!(prompt, "{step}");
            }
        }
    }

    let _ = writeln!(prompt, "\nQuestion: {}", inputs.question);
    prompt.push_str(
        "\nRespond with only one JSON object, either\n\
         {\"reasoning\": \"<why>\", \"action\": \"tool\", \"tool\": \"<tool name>\", \"args\": {<arguments>}}\n\
         or\n\
         {\"reasoning\": \"<why>\", \"action\": \"answer\", \"response\": \"<final answer for the user>\"}\n",
    );
    prompt
}
