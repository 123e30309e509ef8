//! Property-based tests for the context window
//!
//! These tests verify the windowing guarantees hold for arbitrary histories.

use super::*;
use proptest::prelude::*;

fn arb_role() -> impl Strategy<Value = Role> {
    prop_oneof![
        3 => Just(Role::User),
        3 => Just(Role::Assistant),
        2 => Just(Role::Tool),
        1 => Just(Role::System),
    ]
}

/// Messages tagged with their original index so order can be checked
fn arb_history() -> impl Strategy<Value = Vec<Message>> {
    proptest::collection::vec((arb_role(), 0usize..600), 0..40).prop_map(|specs| {
        specs
            .into_iter()
            .enumerate()
            .map(|(i, (role, len))| {
                Message::new(role, format!("#{i:03}#{}", "w".repeat(len)))
            })
            .collect()
    })
}

fn index_of(message: &Message) -> usize {
    message
        .content
        .get(1..4)
        .and_then(|digits| digits.parse().ok())
        .unwrap_or(usize::MAX)
}

proptest! {
    #[test]
    fn prop_preserves_chronological_order(
        history in arb_history(),
        max_tokens in 0usize..3_000,
        max_messages in 0usize..30,
        keep_system in any::<bool>(),
    ) {
        let window = windowed(&history, max_tokens, max_messages, keep_system);
        let non_system: Vec<usize> = window
            .iter()
            .filter(|m| !keep_system || m.role != Role::System)
            .map(index_of)
            .collect();
        prop_assert!(non_system.windows(2).all(|pair| pair[0] < pair[1]));
    }

    #[test]
    fn prop_keeps_newest_non_system_message(
        history in arb_history(),
        max_tokens in 0usize..3_000,
        max_messages in 0usize..30,
        keep_system in any::<bool>(),
    ) {
        let window = windowed(&history, max_tokens, max_messages, keep_system);
        if let Some(newest) = history.iter().rev().find(|m| m.role != Role::System) {
            let newest_index = index_of(newest);
            prop_assert!(window.iter().any(|m| index_of(m) == newest_index));
        }
    }

    #[test]
    fn prop_cost_within_budget_unless_forced(
        history in arb_history(),
        max_tokens in 0usize..3_000,
        max_messages in 0usize..30,
        keep_system in any::<bool>(),
    ) {
        let policy = WindowPolicy::new(max_tokens, max_messages, keep_system);
        let report = policy.apply(&history);
        prop_assert_eq!(report.estimated_tokens, estimate_history_tokens(&report.messages));

        // Kept system messages are paid for first; the rest gets what is
        // left, or the floor
        let system_tokens: usize = report
            .messages
            .iter()
            .filter(|m| keep_system && m.role == Role::System)
            .map(estimate_message_tokens)
            .sum();
        let floor = policy.min_budget_tokens.min(max_tokens);
        let budget = max_tokens.saturating_sub(system_tokens).max(floor);
        let windowed_count = report
            .messages
            .iter()
            .filter(|m| !keep_system || m.role != Role::System)
            .count();
        if report.forced_single {
            prop_assert_eq!(windowed_count, 1);
        } else {
            prop_assert!(report.estimated_tokens - system_tokens <= budget);
        }
    }

    #[test]
    fn prop_unforced_never_exceeds_budget(
        history in arb_history(),
        max_tokens in 0usize..3_000,
        max_messages in 0usize..30,
    ) {
        let mut policy = WindowPolicy::new(max_tokens, max_messages, false);
        policy.force_newest = false;
        let report = policy.apply(&history);
        prop_assert!(!report.forced_single);
        prop_assert!(report.estimated_tokens <= max_tokens);
    }

    #[test]
    fn prop_message_cap_respected(
        history in arb_history(),
        max_messages in 0usize..30,
    ) {
        let window = windowed(&history, 1_000_000, max_messages, true);
        let non_system = window.iter().filter(|m| m.role != Role::System).count();
        prop_assert!(non_system <= max_messages.max(1));
    }

    #[test]
    fn prop_excerpt_bounded(text in ".{0,400}", max_chars in 1usize..200) {
        let short = excerpt(&text, max_chars);
        let kept = text.chars().count().min(max_chars);
        // head + tail + marker
        prop_assert!(short.chars().count() <= kept + 64);
    }
}
