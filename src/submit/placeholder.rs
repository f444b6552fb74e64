//! Offline stand-in for the chat endpoint

use super::{SubmitError, SubmitReply, SubmitRequest, SubmitService};
use async_trait::async_trait;

/// Reply given while no retrieval model is wired up
pub const PLACEHOLDER_REPLY: &str =
    "This is a placeholder response. RAG model integration pending.";

/// Answers every turn with a fixed reply; used when no endpoint is configured
#[derive(Debug, Default)]
pub struct PlaceholderSubmitService;

#[async_trait]
impl SubmitService for PlaceholderSubmitService {
    async fn submit(&self, request: &SubmitRequest) -> Result<SubmitReply, SubmitError> {
        tracing::debug!(
            conv_id = %request.conversation_id,
            history_len = request.history.len(),
            "Answering with placeholder reply"
        );
        Ok(SubmitReply::new(PLACEHOLDER_REPLY))
    }

    fn endpoint(&self) -> &str {
        "placeholder"
    }
}
