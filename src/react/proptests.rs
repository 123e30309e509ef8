//! Property-based tests for the ReAct loop
//!
//! These tests verify key invariants hold across all possible inputs.

use super::*;
use crate::conversation::StepKind;
use crate::testing::{EchoTool, FailingTool, MockModelClient};
use proptest::prelude::*;

// ============================================================================
// Arbitrary Generators
// ============================================================================

fn arb_event() -> impl Strategy<Value = ReactEvent> {
    prop_oneof![
        "[a-z]{1,8}".prop_map(|tool_name| ReactEvent::ToolProposed { tool_name }),
        Just(ReactEvent::AnswerProposed),
        Just(ReactEvent::ModelFailed),
        Just(ReactEvent::ToolReturned),
        Just(ReactEvent::ObservationRecorded),
        Just(ReactEvent::Cancel),
    ]
}

/// One scripted model reply
fn arb_reply() -> impl Strategy<Value = String> {
    prop_oneof![
        3 => prop_oneof![Just("lookup"), Just("broken"), Just("missing")].prop_map(|tool| {
            format!(r#"{{"reasoning": "step", "action": "tool", "tool": "{tool}", "args": {{}}}}"#)
        }),
        1 => "[a-zA-Z ]{0,30}",
        1 => Just(r#"{"reasoning": "done", "action": "answer", "response": "fin"}"#.to_string()),
    ]
}

fn arb_decision_json() -> impl Strategy<Value = String> {
    prop_oneof![
        ("[a-z ]{0,20}", "[a-z_]{1,12}").prop_map(|(reasoning, tool)| {
            format!(r#"{{"reasoning": "{reasoning}", "action": "tool", "tool": "{tool}", "args": {{"k": 1}}}}"#)
        }),
        ("[a-z ]{0,20}", "[a-zA-Z][a-zA-Z .]{0,29}").prop_map(|(reasoning, response)| {
            format!(r#"{{"reasoning": "{reasoning}", "action": "answer", "response": "{response}"}}"#)
        }),
    ]
}

// ============================================================================
// Phase machine
// ============================================================================

proptest! {
    #[test]
    fn terminal_phases_are_absorbing(
        events in proptest::collection::vec(arb_event(), 1..40),
        max in 1u32..6
    ) {
        let mut phase = ReactPhase::start();
        for event in events {
            let was_terminal = phase.is_terminal();
            if let Ok(next) = transition(&phase, event, max) {
                prop_assert!(!was_terminal);
                phase = next;
            }
        }
    }

    #[test]
    fn thinking_cycles_never_exceed_cap(
        events in proptest::collection::vec(arb_event(), 1..60),
        max in 1u32..6
    ) {
        let mut phase = ReactPhase::start();
        let mut thinking_entries = 1u32;
        for event in events {
            if let Ok(next) = transition(&phase, event, max) {
                if matches!(next, ReactPhase::Thinking { .. }) {
                    thinking_entries += 1;
                }
                phase = next;
            }
        }
        prop_assert!(thinking_entries <= max);
    }
}

// ============================================================================
// Decision parsing
// ============================================================================

proptest! {
    #[test]
    fn parse_never_panics(text in "\\PC{0,200}") {
        let _ = parse_decision(&text);
    }

    #[test]
    fn fences_do_not_change_decision(json in arb_decision_json()) {
        let fenced = format!("```json\n{json}\n```");
        let plain = parse_decision(&json);
        prop_assert_eq!(plain.tier, ParseTier::Strict);
        prop_assert_eq!(plain, parse_decision(&fenced));
    }

    #[test]
    fn embedded_decision_is_found(json in arb_decision_json(), prefix in "[a-zA-Z .]{0,30}") {
        let wrapped = format!("{prefix} {json} thanks");
        let parsed = parse_decision(&wrapped);
        prop_assert_ne!(parsed.tier, ParseTier::Fallback);
        prop_assert_eq!(parsed.decision, parse_decision(&json).decision);
    }
}

// ============================================================================
// Engine
// ============================================================================

fn run_scripted(replies: Vec<String>, max_iterations: u32) -> (ConversationState, ReactOutcome) {
    // Once the script runs out every call answers
    let client = Arc::new(MockModelClient::repeating(
        r#"{"action": "answer", "response": "late"}"#,
    ));
    for reply in replies {
        client.queue_text(reply);
    }

    let config = Arc::new(OrchestratorConfig {
        max_iterations,
        ..OrchestratorConfig::default()
    });
    let registry = ToolRegistry::new()
        .with_tool(Arc::new(EchoTool::new("lookup", Domain::Erp)))
        .with_tool(Arc::new(FailingTool::new("broken", "backend down")));
    let available = registry.names();
    let engine = ReactEngine::new(client, config);

    let runtime = tokio::runtime::Builder::new_current_thread()
        .enable_time()
        .build()
        .unwrap();
    runtime.block_on(async {
        let mut state = ConversationState::new("prop");
        state.push_user("question");
        let outcome = engine.run(&mut state, &available, &registry).await;
        (state, outcome)
    })
}

proptest! {
    #![proptest_config(ProptestConfig::with_cases(64))]

    #[test]
    fn trace_is_bounded_and_ends_in_one_answer(
        replies in proptest::collection::vec(arb_reply(), 0..12),
        max in 1u32..5
    ) {
        let (state, outcome) = run_scripted(replies, max);
        let trace = state.trace();

        prop_assert!(trace.len() <= 3 * max as usize + 1);
        prop_assert_eq!(trace.iter().filter(|s| s.is_answer()).count(), 1);
        prop_assert!(trace.last().is_some_and(ReasoningStep::is_answer));
        prop_assert!(outcome == ReactOutcome::Answered || outcome == ReactOutcome::Exhausted);

        let acts = trace.iter().filter(|s| matches!(s.kind, StepKind::Act { .. })).count();
        let observes = trace.iter().filter(|s| matches!(s.kind, StepKind::Observe { .. })).count();
        prop_assert_eq!(acts, observes);
        prop_assert!(state.tool_call_count as usize <= acts);
    }
}
