//! Property-based tests for the state machine
//!
//! These tests verify key invariants hold across arbitrary interleavings of
//! user input, endpoint results, cadence ticks and resets.

use super::state::*;
use super::transition::*;
use super::*;
use crate::submit::SubmitErrorKind;
use proptest::prelude::*;

// ============================================================================
// Test Helpers
// ============================================================================

fn test_context() -> ConvContext {
    ConvContext::new("test-conv", DEFAULT_SEED_GREETING)
}

/// Something that can happen to an engine. Results and ticks are resolved
/// against the current state so that both matching and stale ids occur.
#[derive(Debug, Clone)]
enum Action {
    Submit(String),
    Draft(String),
    Retry,
    Reset,
    Reply(String),
    Fail(SubmitErrorKind),
    StaleReply(String),
    Tick,
    StaleTick,
    Flush,
}

fn resolve(state: &EngineState, action: Action) -> Event {
    let request_id = state.in_flight().unwrap_or(state.next_request_id);
    let stream = state.active_stream.unwrap_or(ActiveStream {
        turn_index: state.conversation.len(),
        stream_id: state.next_stream_id,
    });
    match action {
        Action::Submit(text) => Event::SubmitUserTurn { text },
        Action::Draft(text) => Event::DraftChanged { text },
        Action::Retry => Event::RetrySubmission,
        Action::Reset => Event::Reset,
        Action::Reply(reply) => Event::SubmitSucceeded { request_id, reply },
        Action::Fail(error_kind) => Event::SubmitFailed {
            request_id,
            message: "endpoint unavailable".to_string(),
            error_kind,
        },
        // Ids start at 1, so the one below any live request never matches
        Action::StaleReply(reply) => Event::SubmitSucceeded {
            request_id: state.in_flight().map_or(0, |id| id - 1),
            reply,
        },
        Action::Tick => Event::RevealTick {
            turn_index: stream.turn_index,
            stream_id: stream.stream_id,
        },
        Action::StaleTick => Event::RevealTick {
            turn_index: stream.turn_index,
            stream_id: stream.stream_id + 1000,
        },
        Action::Flush => Event::RevealFlush {
            turn_index: stream.turn_index,
            stream_id: stream.stream_id,
        },
    }
}

/// Apply an action, keeping the old state when the transition is rejected
fn apply(state: &EngineState, action: Action) -> EngineState {
    match transition(state, &test_context(), resolve(state, action)) {
        Ok(result) => result.new_state,
        Err(_) => state.clone(),
    }
}

fn check_structure(state: &EngineState) -> Result<(), TestCaseError> {
    let turns = state.conversation.turns();
    prop_assert!(!turns.is_empty());
    prop_assert_eq!(turns[0].author(), Author::Seed);
    prop_assert_eq!(&turns[0].content, DEFAULT_SEED_GREETING);

    for (position, turn) in turns.iter().enumerate() {
        prop_assert_eq!(turn.index, position, "indices must be contiguous");
        prop_assert!(turn.shown <= turn.char_len());
        if turn.reveal == RevealState::Complete {
            prop_assert_eq!(turn.shown, turn.char_len());
        }
        // Only the trailing open slot may be pending
        if turn.reveal == RevealState::Pending {
            prop_assert_eq!(position, turns.len() - 1);
            prop_assert_eq!(turn.author(), Author::User);
        }
    }

    for (i, turn) in state.visible_turns().enumerate() {
        prop_assert_eq!(turn.index % 2, i % 2, "visible parity must alternate");
    }

    let streaming: Vec<_> = turns
        .iter()
        .filter(|t| t.reveal == RevealState::Streaming)
        .collect();
    prop_assert!(streaming.len() <= 1, "at most one turn streams");
    match state.active_stream {
        Some(active) => {
            prop_assert_eq!(streaming.len(), 1);
            prop_assert_eq!(streaming[0].index, active.turn_index);
            prop_assert!(streaming[0].author().is_system_side());
            prop_assert!(active.stream_id < state.next_stream_id);
        }
        None => prop_assert!(streaming.is_empty()),
    }

    if let Some(request_id) = state.in_flight() {
        prop_assert!(request_id < state.next_request_id);
        prop_assert!(state.conversation.open_slot().is_none());
    }
    Ok(())
}

// ============================================================================
// Arbitrary Generators
// ============================================================================

fn arb_text() -> impl Strategy<Value = String> {
    prop_oneof![
        Just(String::new()),
        "[ \t\n]{1,4}",
        "[a-zA-Z ?]{1,24}",
        "[a-zé😀 ]{1,12}",
    ]
}

fn arb_error_kind() -> impl Strategy<Value = SubmitErrorKind> {
    prop_oneof![
        Just(SubmitErrorKind::Network),
        Just(SubmitErrorKind::Timeout),
        Just(SubmitErrorKind::Server),
        Just(SubmitErrorKind::Rejected),
        Just(SubmitErrorKind::InvalidResponse),
        Just(SubmitErrorKind::Unknown),
    ]
}

fn arb_action() -> impl Strategy<Value = Action> {
    prop_oneof![
        3 => arb_text().prop_map(Action::Submit),
        1 => arb_text().prop_map(Action::Draft),
        1 => Just(Action::Retry),
        1 => Just(Action::Reset),
        3 => "[a-zA-Z .]{0,12}".prop_map(Action::Reply),
        1 => arb_error_kind().prop_map(Action::Fail),
        1 => "[a-z]{1,8}".prop_map(Action::StaleReply),
        6 => Just(Action::Tick),
        1 => Just(Action::StaleTick),
        1 => Just(Action::Flush),
    ]
}

fn arb_non_blank() -> impl Strategy<Value = String> {
    "[a-zA-Z][a-zA-Z ?]{0,20}"
}

// ============================================================================
// Property Tests
// ============================================================================

proptest! {
    #![proptest_config(ProptestConfig::with_cases(500))]

    // Invariant 1: Every reachable state is well formed
    #[test]
    fn prop_transitions_preserve_structure(
        actions in proptest::collection::vec(arb_action(), 0..40)
    ) {
        let mut state = EngineState::new(DEFAULT_SEED_GREETING);
        for action in actions {
            state = apply(&state, action);
            check_structure(&state)?;
        }
    }

    // Invariant 2: Empty input never changes what is shown or loading
    #[test]
    fn prop_blank_submit_changes_nothing(
        prefix in proptest::collection::vec(arb_action(), 0..20),
        blank in "[ \t\n]{0,6}"
    ) {
        let mut state = EngineState::new(DEFAULT_SEED_GREETING);
        for action in prefix {
            state = apply(&state, action);
        }

        match transition(&state, &test_context(), Event::SubmitUserTurn { text: blank }) {
            Ok(result) => {
                // Only a busy engine swallows input without complaint
                prop_assert_eq!(result.ignored, Some(Ignored::SubmissionInFlight));
                prop_assert_eq!(result.new_state, state);
            }
            Err(e) => prop_assert_eq!(e, TransitionError::Validation(ValidationError::EmptyInput)),
        }
    }

    // Invariant 3: A reply of N characters completes after exactly N ticks
    // and the cursor only moves forward
    #[test]
    fn prop_reveal_completes_after_len_ticks(
        question in arb_non_blank(),
        reply in "[a-zé ]{1,40}"
    ) {
        let ctx = test_context();
        let state = EngineState::new(DEFAULT_SEED_GREETING);
        let submit = Event::SubmitUserTurn { text: question };
        let submitted = transition(&state, &ctx, submit).unwrap().new_state;
        let request_id = submitted.in_flight().unwrap();
        let success = Event::SubmitSucceeded { request_id, reply: reply.clone() };
        let mut state = transition(&submitted, &ctx, success).unwrap().new_state;

        let active = state.active_stream.unwrap();
        let len = reply.chars().count();
        let mut last_shown = 0;
        for tick in 1..=len {
            let turn = state.conversation.get(active.turn_index).unwrap();
            prop_assert_eq!(turn.reveal, RevealState::Streaming);
            state = transition(&state, &ctx, Event::RevealTick {
                turn_index: active.turn_index,
                stream_id: active.stream_id,
            }).unwrap().new_state;

            let turn = state.conversation.get(active.turn_index).unwrap();
            prop_assert!(turn.shown > last_shown);
            prop_assert_eq!(turn.shown, tick);
            prop_assert!(reply.starts_with(turn.visible_text()));
            last_shown = turn.shown;
        }

        let turn = state.conversation.get(active.turn_index).unwrap();
        prop_assert_eq!(turn.reveal, RevealState::Complete);
        prop_assert_eq!(turn.visible_text(), reply.as_str());
        prop_assert!(state.active_stream.is_none());
    }

    // Invariant 4: Nothing issued before a reset can touch the state after it
    #[test]
    fn prop_reset_fences_late_callbacks(
        prefix in proptest::collection::vec(arb_action(), 0..20),
        reply in "[a-z]{1,10}"
    ) {
        let ctx = test_context();
        let mut state = EngineState::new(DEFAULT_SEED_GREETING);
        for action in prefix {
            state = apply(&state, action);
        }
        let old_request = state.in_flight().unwrap_or(state.next_request_id.saturating_sub(1));
        let old_stream = state.active_stream;

        let after = transition(&state, &ctx, Event::Reset).unwrap().new_state;
        prop_assert_eq!(after.epoch, state.epoch + 1);
        prop_assert_eq!(after.visible_count(), 1);
        prop_assert!(!after.loading());

        let late_reply = Event::SubmitSucceeded { request_id: old_request, reply };
        let late = transition(&after, &ctx, late_reply).unwrap();
        prop_assert_eq!(late.ignored, Some(Ignored::StaleResponse));
        prop_assert_eq!(&late.new_state, &after);

        if let Some(active) = old_stream {
            let tick = transition(&after, &ctx, Event::RevealTick {
                turn_index: active.turn_index,
                stream_id: active.stream_id,
            }).unwrap();
            prop_assert_eq!(tick.ignored, Some(Ignored::StaleTick));
            prop_assert_eq!(&tick.new_state, &after);
        }
    }

    // Invariant 5: While loading, submits send nothing
    #[test]
    fn prop_loading_sends_at_most_once(question in arb_non_blank(), repeats in 1usize..6) {
        let ctx = test_context();
        let state = EngineState::new(DEFAULT_SEED_GREETING);
        let submit = || Event::SubmitUserTurn { text: question.clone() };
        let first = transition(&state, &ctx, submit()).unwrap();
        let sends = |effects: &[Effect]| {
            effects.iter().filter(|e| matches!(e, Effect::SendTurn { .. })).count()
        };
        prop_assert_eq!(sends(&first.effects), 1);

        let mut state = first.new_state;
        for _ in 0..repeats {
            let result = transition(&state, &ctx, submit()).unwrap();
            prop_assert_eq!(sends(&result.effects), 0);
            prop_assert_eq!(result.ignored, Some(Ignored::SubmissionInFlight));
            state = result.new_state;
        }
        prop_assert_eq!(state.visible_count(), 2);
    }

    // Invariant 6: A failure leaves the draft and the visible turns alone
    #[test]
    fn prop_failure_preserves_draft(question in arb_non_blank(), kind in arb_error_kind()) {
        let ctx = test_context();
        let state = transition(
            &EngineState::new(DEFAULT_SEED_GREETING),
            &ctx,
            Event::DraftChanged { text: question.clone() },
        ).unwrap().new_state;
        let submit = Event::SubmitUserTurn { text: question.clone() };
        let submitted = transition(&state, &ctx, submit).unwrap().new_state;
        let request_id = submitted.in_flight().unwrap();

        let failed = transition(&submitted, &ctx, Event::SubmitFailed {
            request_id,
            message: "boom".to_string(),
            error_kind: kind,
        }).unwrap();

        prop_assert_eq!(&failed.new_state.pending_input, &question);
        prop_assert_eq!(failed.new_state.visible_count(), submitted.visible_count());
        prop_assert!(!failed.new_state.loading());
        let retryable = kind.is_retryable();
        let reported_retryable = failed.effects.iter().any(|e| matches!(
            e,
            Effect::Notify {
                notice: Notice::SubmissionFailed { retryable: r, .. }
            } if *r == retryable
        ));
        prop_assert!(reported_retryable);
    }
}
