//! Pure state transition function
//!
//! Given the same state, context and event this always produces the same
//! new state and effects, with no I/O. Late asynchronous results are
//! recognised here by id comparison and dropped without touching state.

use super::state::{ActiveStream, EngineState, Phase, RevealState, Turn};
use super::{ConvContext, Effect, Event, Notice};
use crate::submit::{HistoryEntry, SubmitRequest};
use thiserror::Error;

/// Result of a state transition
#[derive(Debug)]
pub struct TransitionResult {
    pub new_state: EngineState,
    pub effects: Vec<Effect>,
    /// Set when the event was deliberately dropped
    pub ignored: Option<Ignored>,
}

impl TransitionResult {
    pub fn new(state: EngineState) -> Self {
        Self {
            new_state: state,
            effects: vec![],
            ignored: None,
        }
    }

    /// Leave the state as it is and record why
    pub fn ignored(state: &EngineState, reason: Ignored) -> Self {
        Self {
            new_state: state.clone(),
            effects: vec![],
            ignored: Some(reason),
        }
    }

    pub fn with_effect(mut self, effect: Effect) -> Self {
        self.effects.push(effect);
        self
    }

    pub fn with_effects(mut self, effects: impl IntoIterator<Item = Effect>) -> Self {
        self.effects.extend(effects);
        self
    }
}

/// Why an event produced no change
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Ignored {
    /// A submission is already in flight
    SubmissionInFlight,
    /// Retry requested but the last exchange did not fail
    NothingToRetry,
    /// Submission result for a request that is no longer current
    StaleResponse,
    /// Cadence tick for a stream that is no longer current
    StaleTick,
    /// New text submitted while an earlier user turn still awaits its reply
    UnansweredTurnPending,
}

impl Ignored {
    pub fn as_str(self) -> &'static str {
        match self {
            Ignored::SubmissionInFlight => "submission_in_flight",
            Ignored::NothingToRetry => "nothing_to_retry",
            Ignored::StaleResponse => "stale_response",
            Ignored::StaleTick => "stale_tick",
            Ignored::UnansweredTurnPending => "unanswered_turn_pending",
        }
    }
}

/// Input rejected before any state change
#[derive(Debug, Clone, Copy, PartialEq, Eq, Error)]
pub enum ValidationError {
    #[error("Please enter a message")]
    EmptyInput,
}

/// Errors that can occur during transition
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum TransitionError {
    #[error(transparent)]
    Validation(#[from] ValidationError),
    #[error("Invalid transition: {0}")]
    InvalidTransition(String),
}

/// Pure transition function
pub fn transition(
    state: &EngineState,
    context: &ConvContext,
    event: Event,
) -> Result<TransitionResult, TransitionError> {
    match (&state.phase, event) {
        // ============================================================
        // Draft editing (allowed in every phase)
        // ============================================================
        (_, Event::DraftChanged { text }) => {
            let mut next = state.clone();
            next.pending_input = text;
            Ok(TransitionResult::new(next).with_effect(Effect::PublishView))
        }

        // ============================================================
        // Submission
        // ============================================================

        // Repeated triggers while a reply is awaited are dropped
        (Phase::Submitting { .. }, Event::SubmitUserTurn { .. }) => Ok(TransitionResult::ignored(
            state,
            Ignored::SubmissionInFlight,
        )),

        (_, Event::SubmitUserTurn { text }) if text.trim().is_empty() => {
            Err(ValidationError::EmptyInput.into())
        }

        (Phase::Ready, Event::SubmitUserTurn { text }) => {
            submit_into_open_slot(state, context, text.trim())
        }

        // The unanswered user turn is immutable: submitting its text again
        // resends it, different text is turned away
        (Phase::SubmitFailed { .. }, Event::SubmitUserTurn { text }) => {
            resend_unanswered(state, context, Some(text.trim()))
        }

        (Phase::SubmitFailed { .. }, Event::RetrySubmission) => {
            resend_unanswered(state, context, None)
        }

        (_, Event::RetrySubmission) => {
            Ok(TransitionResult::ignored(state, Ignored::NothingToRetry))
        }

        (Phase::Submitting { request_id }, Event::SubmitSucceeded { request_id: got, reply })
            if *request_id == got =>
        {
            accept_reply(state, reply)
        }

        (
            Phase::Submitting { request_id },
            Event::SubmitFailed {
                request_id: got,
                message,
                error_kind,
            },
        ) if *request_id == got => {
            let mut next = state.clone();
            next.phase = Phase::SubmitFailed {
                message: message.clone(),
            };
            Ok(TransitionResult::new(next)
                .with_effect(Effect::PublishView)
                .with_effect(Effect::submission_failed(message, error_kind.is_retryable())))
        }

        (_, Event::SubmitSucceeded { .. } | Event::SubmitFailed { .. }) => {
            Ok(TransitionResult::ignored(state, Ignored::StaleResponse))
        }

        // ============================================================
        // Reveal cadence
        // ============================================================
        (_, Event::RevealTick {
            turn_index,
            stream_id,
        }) => match current_stream(state, turn_index, stream_id) {
            Some(active) => advance_reveal(state, active),
            None => Ok(TransitionResult::ignored(state, Ignored::StaleTick)),
        },

        (_, Event::RevealFlush {
            turn_index,
            stream_id,
        }) => match current_stream(state, turn_index, stream_id) {
            Some(active) => flush_reveal(state, active),
            None => Ok(TransitionResult::ignored(state, Ignored::StaleTick)),
        },

        // ============================================================
        // Reset
        // ============================================================
        (_, Event::Reset) => {
            let mut next = EngineState::new(context.seed.clone());
            next.epoch = state.epoch + 1;
            next.next_request_id = state.next_request_id;
            next.next_stream_id = state.next_stream_id;

            let cancel = state
                .active_stream
                .map(|s| Effect::CancelReveal { stream_id: s.stream_id });
            Ok(TransitionResult::new(next)
                .with_effects(cancel)
                .with_effect(Effect::PublishView))
        }
    }
}

// ============================================================================
// Helpers
// ============================================================================

fn submit_into_open_slot(
    state: &EngineState,
    context: &ConvContext,
    text: &str,
) -> Result<TransitionResult, TransitionError> {
    let mut next = state.clone();
    let slot = next
        .conversation
        .open_slot()
        .ok_or_else(|| TransitionError::InvalidTransition("no open input slot".to_string()))?;
    if let Some(turn) = next.conversation.get_mut(slot) {
        turn.content = text.to_string();
        turn.complete();
    }

    let request_id = next.next_request_id;
    next.next_request_id += 1;
    next.phase = Phase::Submitting { request_id };

    let request = build_request(&next, context, text);
    Ok(TransitionResult::new(next)
        .with_effect(Effect::PublishView)
        .with_effect(Effect::SendTurn {
            request_id,
            request,
        }))
}

fn resend_unanswered(
    state: &EngineState,
    context: &ConvContext,
    submitted: Option<&str>,
) -> Result<TransitionResult, TransitionError> {
    let text = state
        .conversation
        .last()
        .filter(|t| !t.author().is_system_side() && t.reveal == RevealState::Complete)
        .map(|t| t.content.clone())
        .ok_or_else(|| {
            TransitionError::InvalidTransition("no unanswered user turn to resend".to_string())
        })?;

    if submitted.is_some_and(|s| s != text) {
        return Ok(TransitionResult::ignored(
            state,
            Ignored::UnansweredTurnPending,
        ));
    }

    let mut next = state.clone();
    let request_id = next.next_request_id;
    next.next_request_id += 1;
    next.phase = Phase::Submitting { request_id };

    let request = build_request(&next, context, &text);
    Ok(TransitionResult::new(next)
        .with_effect(Effect::PublishView)
        .with_effect(Effect::SendTurn {
            request_id,
            request,
        }))
}

/// Append the reply, reopen input and start revealing the reply
fn accept_reply(state: &EngineState, reply: String) -> Result<TransitionResult, TransitionError> {
    let mut next = state.clone();
    let mut effects = Vec::new();

    // Only the newest system turn streams; an older one still running is
    // shown in full and its timer torn down
    if let Some(previous) = next.active_stream.take() {
        if let Some(turn) = next.conversation.get_mut(previous.turn_index) {
            turn.complete();
        }
        effects.push(Effect::CancelReveal {
            stream_id: previous.stream_id,
        });
    }

    let turn_index = next.conversation.next_index();
    let mut reply_turn = Turn::streaming(turn_index, reply);
    let len = reply_turn.char_len();
    if len == 0 {
        reply_turn.complete();
    }
    next.conversation
        .push(reply_turn)
        .map_err(|e| TransitionError::InvalidTransition(e.to_string()))?;

    next.conversation
        .push(Turn::open_slot(next.conversation.next_index()))
        .map_err(|e| TransitionError::InvalidTransition(e.to_string()))?;

    // Text typed ahead while the reply was awaited stays in the draft
    let answered = state.conversation.last().map(|t| t.content.as_str());
    if answered == Some(next.pending_input.trim()) {
        next.pending_input.clear();
    }

    next.phase = Phase::Ready;
    effects.push(Effect::PublishView);

    if len > 0 {
        let stream_id = next.next_stream_id;
        next.next_stream_id += 1;
        next.active_stream = Some(ActiveStream {
            turn_index,
            stream_id,
        });
        effects.push(Effect::StartReveal {
            turn_index,
            stream_id,
            len,
        });
    }

    Ok(TransitionResult::new(next).with_effects(effects))
}

fn current_stream(state: &EngineState, turn_index: usize, stream_id: u64) -> Option<ActiveStream> {
    state
        .active_stream
        .filter(|s| s.turn_index == turn_index && s.stream_id == stream_id)
}

fn advance_reveal(
    state: &EngineState,
    active: ActiveStream,
) -> Result<TransitionResult, TransitionError> {
    let mut next = state.clone();
    let turn = next
        .conversation
        .get_mut(active.turn_index)
        .ok_or_else(|| TransitionError::InvalidTransition("streaming turn missing".to_string()))?;

    let len = turn.char_len();
    turn.shown = (turn.shown + 1).min(len);
    let shown = turn.shown;

    if shown < len {
        return Ok(TransitionResult::new(next)
            .with_effect(Effect::reveal_progress(active.turn_index, shown)));
    }

    turn.reveal = RevealState::Complete;
    next.active_stream = None;
    Ok(TransitionResult::new(next)
        .with_effect(Effect::CancelReveal {
            stream_id: active.stream_id,
        })
        .with_effect(Effect::reveal_done(active.turn_index, shown))
        .with_effect(Effect::notify(Notice::RevealComplete {
            turn_index: active.turn_index,
        })))
}

fn flush_reveal(
    state: &EngineState,
    active: ActiveStream,
) -> Result<TransitionResult, TransitionError> {
    let mut next = state.clone();
    let turn = next
        .conversation
        .get_mut(active.turn_index)
        .ok_or_else(|| TransitionError::InvalidTransition("streaming turn missing".to_string()))?;
    turn.complete();
    let shown = turn.shown;
    next.active_stream = None;

    Ok(TransitionResult::new(next)
        .with_effect(Effect::CancelReveal {
            stream_id: active.stream_id,
        })
        .with_effect(Effect::reveal_done(active.turn_index, shown))
        .with_effect(Effect::notify(Notice::RevealComplete {
            turn_index: active.turn_index,
        })))
}

/// Request carrying the latest user text and every finalized turn before it
fn build_request(state: &EngineState, context: &ConvContext, text: &str) -> SubmitRequest {
    let history = state
        .conversation
        .turns()
        .iter()
        .filter(|t| t.reveal != RevealState::Pending)
        .map(HistoryEntry::from_turn)
        .collect();

    SubmitRequest {
        conversation_id: context.conversation_id.clone(),
        text: text.to_string(),
        history,
    }
}
