//! API request and response types

use crate::runtime::{ConversationSummary, Disposition};
use crate::state_machine::ConversationView;
use serde::{Deserialize, Serialize};

/// Request to open a conversation session
#[derive(Debug, Default, Deserialize)]
pub struct CreateConversationRequest {
    /// Logged-in user, absent for anonymous sessions
    #[serde(default)]
    pub user: Option<String>,
}

/// Request to submit the user's turn
#[derive(Debug, Deserialize)]
pub struct SubmitTurnRequest {
    pub text: String,
}

/// Request to replace the draft
#[derive(Debug, Deserialize)]
pub struct DraftRequest {
    #[serde(default)]
    pub text: String,
}

/// Response with a list of conversations
#[derive(Debug, Serialize)]
pub struct ConversationListResponse {
    pub conversations: Vec<ConversationSummary>,
}

/// Response with a single conversation
#[derive(Debug, Serialize)]
pub struct ConversationResponse {
    pub conversation_id: String,
    pub view: ConversationView,
}

/// Response after starting a new chat over an existing one
#[derive(Debug, Serialize)]
pub struct NewChatResponse {
    pub conversation_id: String,
    pub view: ConversationView,
    /// Anonymous history from the previous chat is gone for good
    pub warn_unsaved_history: bool,
}

/// Response for engine operations
#[derive(Debug, Serialize)]
pub struct ActionResponse {
    pub accepted: bool,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub ignored: Option<&'static str>,
}

impl From<Disposition> for ActionResponse {
    fn from(disposition: Disposition) -> Self {
        match disposition {
            Disposition::Accepted => Self {
                accepted: true,
                ignored: None,
            },
            Disposition::Ignored(reason) => Self {
                accepted: false,
                ignored: Some(reason.as_str()),
            },
        }
    }
}

/// Response for lifecycle actions
#[derive(Debug, Serialize)]
pub struct SuccessResponse {
    pub success: bool,
}

/// Error response
#[derive(Debug, Serialize)]
pub struct ErrorResponse {
    pub error: String,
}

impl ErrorResponse {
    pub fn new(message: impl Into<String>) -> Self {
        Self {
            error: message.into(),
        }
    }
}
