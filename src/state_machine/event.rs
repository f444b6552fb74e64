//! Events that can occur in a conversation

use crate::submit::SubmitErrorKind;

/// Events that trigger state transitions
#[derive(Debug, Clone)]
pub enum Event {
    // User events
    SubmitUserTurn {
        text: String,
    },
    /// Explicit resubmission after a failed exchange
    RetrySubmission,
    DraftChanged {
        text: String,
    },
    /// End the current conversation and start over from the seed
    Reset,

    // Submission events
    SubmitSucceeded {
        request_id: u64,
        reply: String,
    },
    SubmitFailed {
        request_id: u64,
        message: String,
        error_kind: SubmitErrorKind,
    },

    // Reveal cadence events
    RevealTick {
        turn_index: usize,
        stream_id: u64,
    },
    /// Finish the active reveal at once (zero cadence or starved timer)
    RevealFlush {
        turn_index: usize,
        stream_id: u64,
    },
}

impl Event {
    /// Short name for logs
    pub fn name(&self) -> &'static str {
        match self {
            Event::SubmitUserTurn { .. } => "submit_user_turn",
            Event::RetrySubmission => "retry_submission",
            Event::DraftChanged { .. } => "draft_changed",
            Event::Reset => "reset",
            Event::SubmitSucceeded { .. } => "submit_succeeded",
            Event::SubmitFailed { .. } => "submit_failed",
            Event::RevealTick { .. } => "reveal_tick",
            Event::RevealFlush { .. } => "reveal_flush",
        }
    }
}
