//! HTTP chat endpoint client

use super::types::HistoryEntry;
use super::{SubmitError, SubmitReply, SubmitRequest, SubmitService};
use async_trait::async_trait;
use reqwest::Client;
use serde::{Deserialize, Serialize};
use std::time::Duration;

/// Posts each user turn as JSON and reads the bot response back
pub struct HttpSubmitService {
    client: Client,
    endpoint: String,
}

impl HttpSubmitService {
    pub fn new(endpoint: impl Into<String>, timeout: Duration) -> Result<Self, SubmitError> {
        let client = Client::builder()
            .timeout(timeout)
            .build()
            .map_err(|e| SubmitError::unknown(format!("Failed to create HTTP client: {e}")))?;

        Ok(Self {
            client,
            endpoint: endpoint.into(),
        })
    }
}

#[async_trait]
impl SubmitService for HttpSubmitService {
    async fn submit(&self, request: &SubmitRequest) -> Result<SubmitReply, SubmitError> {
        let body = ChatRequestBody {
            submitted_text: &request.text,
            conversation_id: &request.conversation_id,
            history: &request.history,
        };

        let response = self
            .client
            .post(&self.endpoint)
            .json(&body)
            .send()
            .await
            .map_err(|e| {
                if e.is_timeout() {
                    SubmitError::timeout(format!("Request timeout: {e}"))
                } else if e.is_connect() {
                    SubmitError::network(format!("Connection failed: {e}"))
                } else {
                    SubmitError::unknown(format!("Request failed: {e}"))
                }
            })?;

        let status = response.status();
        let body = response
            .text()
            .await
            .map_err(|e| SubmitError::network(format!("Failed to read response: {e}")))?;

        if !status.is_success() {
            return Err(classify_error(status, &body));
        }

        parse_reply(&body)
    }

    fn endpoint(&self) -> &str {
        &self.endpoint
    }
}

fn classify_error(status: reqwest::StatusCode, body: &str) -> SubmitError {
    // The chat backend reports failures as {"status": "error", "message": ...}
    let message = serde_json::from_str::<ChatResponseBody>(body)
        .ok()
        .and_then(|b| b.message)
        .unwrap_or_else(|| body.to_string());

    match status.as_u16() {
        408 | 504 => SubmitError::timeout(format!("Gateway timeout: {message}")),
        400..=499 => SubmitError::rejected(format!("Rejected ({status}): {message}")),
        500..=599 => SubmitError::server(format!("Server error: {message}")),
        _ => SubmitError::unknown(format!("HTTP {status}: {message}")),
    }
}

/// Accepts `{"bot_response": ...}` and the older `{"status": "success", "response": ...}`
fn parse_reply(body: &str) -> Result<SubmitReply, SubmitError> {
    let parsed: ChatResponseBody = serde_json::from_str(body).map_err(|e| {
        SubmitError::invalid_response(format!("Failed to parse response: {e} - body: {body}"))
    })?;

    if parsed.status.as_deref() == Some("error") {
        return Err(SubmitError::rejected(
            parsed
                .message
                .unwrap_or_else(|| "Failed to process request".to_string()),
        ));
    }

    parsed
        .bot_response
        .or(parsed.response)
        .map(SubmitReply::new)
        .ok_or_else(|| SubmitError::invalid_response("Response carried no bot_response"))
}

// Chat endpoint wire types

#[derive(Debug, Serialize)]
#[serde(rename_all = "camelCase")]
struct ChatRequestBody<'a> {
    submitted_text: &'a str,
    conversation_id: &'a str,
    #[serde(skip_serializing_if = "no_history")]
    history: &'a [HistoryEntry],
}

#[allow(clippy::trivially_copy_pass_by_ref)] // serde passes a reference to the field
fn no_history(history: &&[HistoryEntry]) -> bool {
    history.is_empty()
}

#[derive(Debug, Deserialize)]
struct ChatResponseBody {
    bot_response: Option<String>,
    response: Option<String>,
    status: Option<String>,
    message: Option<String>,
}
