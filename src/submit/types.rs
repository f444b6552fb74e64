//! Submission request and reply types

use crate::state_machine::state::Turn;
use serde::{Deserialize, Serialize};

/// Side of the exchange, as the chat endpoint names it
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Role {
    User,
    Assistant,
}

/// One finalized turn sent as context
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct HistoryEntry {
    pub role: Role,
    pub content: String,
}

impl HistoryEntry {
    pub fn from_turn(turn: &Turn) -> Self {
        let role = if turn.author().is_system_side() {
            Role::Assistant
        } else {
            Role::User
        };
        Self {
            role,
            content: turn.content.clone(),
        }
    }
}

/// A user turn handed to the chat endpoint
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SubmitRequest {
    pub conversation_id: String,
    /// Latest user text
    pub text: String,
    /// Every finalized turn up to and including the latest user text
    pub history: Vec<HistoryEntry>,
}

/// The endpoint's answer
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SubmitReply {
    pub reply_text: String,
}

impl SubmitReply {
    pub fn new(reply_text: impl Into<String>) -> Self {
        Self {
            reply_text: reply_text.into(),
        }
    }
}
