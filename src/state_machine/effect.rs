//! Effects produced by state transitions

use crate::submit::SubmitRequest;
use serde::Serialize;

/// Effects to be executed after state transition
#[derive(Debug, Clone)]
pub enum Effect {
    /// Send a finalized user turn to the chat endpoint
    SendTurn {
        request_id: u64,
        request: SubmitRequest,
    },

    /// Start the reveal cadence for a streaming turn
    StartReveal {
        turn_index: usize,
        stream_id: u64,
        len: usize,
    },

    /// Tear down the cadence task serving a stream
    CancelReveal { stream_id: u64 },

    /// Publish a fresh snapshot of the read model
    PublishView,

    /// Publish streaming progress of one turn
    PublishReveal {
        turn_index: usize,
        shown: usize,
        complete: bool,
    },

    /// Surface a notice to the presentation layer
    Notify { notice: Notice },
}

/// User-visible notices
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum Notice {
    /// Submitted text was empty
    EnterText,
    /// The chat endpoint could not be reached or answered with an error
    SubmissionFailed { message: String, retryable: bool },
    /// A streamed turn has been fully revealed
    RevealComplete { turn_index: usize },
}

impl Effect {
    pub fn notify(notice: Notice) -> Self {
        Effect::Notify { notice }
    }

    pub fn submission_failed(message: impl Into<String>, retryable: bool) -> Self {
        Effect::notify(Notice::SubmissionFailed {
            message: message.into(),
            retryable,
        })
    }

    pub fn reveal_progress(turn_index: usize, shown: usize) -> Self {
        Effect::PublishReveal {
            turn_index,
            shown,
            complete: false,
        }
    }

    pub fn reveal_done(turn_index: usize, shown: usize) -> Self {
        Effect::PublishReveal {
            turn_index,
            shown,
            complete: true,
        }
    }
}
