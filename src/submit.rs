//! Submit capability
//!
//! Sends finalized user turns to the remote chat endpoint and returns the
//! reply text. The engine only ever sees the `SubmitService` trait.

mod error;
mod http;
mod placeholder;
mod types;

pub use error::{SubmitError, SubmitErrorKind};
pub use http::HttpSubmitService;
pub use placeholder::PlaceholderSubmitService;
pub use types::*;

use async_trait::async_trait;
use std::sync::Arc;
use std::time::Duration;

/// Common interface for chat endpoints
#[async_trait]
pub trait SubmitService: Send + Sync {
    /// Send one user turn and wait for the reply
    async fn submit(&self, request: &SubmitRequest) -> Result<SubmitReply, SubmitError>;

    /// Where turns are sent, for logs
    fn endpoint(&self) -> &str;
}

/// Logging wrapper for submit services
pub struct LoggingSubmitService {
    inner: Arc<dyn SubmitService>,
    endpoint: String,
}

impl LoggingSubmitService {
    pub fn new(inner: Arc<dyn SubmitService>) -> Self {
        let endpoint = inner.endpoint().to_string();
        Self { inner, endpoint }
    }
}

#[async_trait]
impl SubmitService for LoggingSubmitService {
    async fn submit(&self, request: &SubmitRequest) -> Result<SubmitReply, SubmitError> {
        let start = std::time::Instant::now();
        let result = self.inner.submit(request).await;
        let duration = start.elapsed();

        match &result {
            Ok(reply) => {
                tracing::info!(
                    endpoint = %self.endpoint,
                    conv_id = %request.conversation_id,
                    duration_ms = %duration.as_millis(),
                    reply_chars = reply.reply_text.chars().count(),
                    "Turn submitted"
                );
            }
            Err(e) => {
                tracing::error!(
                    endpoint = %self.endpoint,
                    conv_id = %request.conversation_id,
                    duration_ms = %duration.as_millis(),
                    error = %e.message,
                    retryable = e.kind.is_retryable(),
                    "Turn submission failed"
                );
            }
        }

        result
    }

    fn endpoint(&self) -> &str {
        &self.endpoint
    }
}

/// Configuration for the chat endpoint
#[derive(Debug, Clone)]
pub struct SubmitConfig {
    /// Chat endpoint URL; the placeholder service answers when unset
    pub endpoint: Option<String>,
    pub timeout: Duration,
}

impl Default for SubmitConfig {
    fn default() -> Self {
        Self {
            endpoint: None,
            timeout: Duration::from_secs(30),
        }
    }
}

impl SubmitConfig {
    pub fn from_env() -> Self {
        let defaults = Self::default();
        Self {
            endpoint: std::env::var("OTHER_SIDE_CHAT_ENDPOINT")
                .ok()
                .filter(|e| !e.trim().is_empty()),
            timeout: std::env::var("OTHER_SIDE_SUBMIT_TIMEOUT_SECS")
                .ok()
                .and_then(|s| s.parse().ok())
                .map_or(defaults.timeout, Duration::from_secs),
        }
    }

    /// Build the configured service, wrapped with logging
    pub fn build(&self) -> Result<Arc<dyn SubmitService>, SubmitError> {
        let service: Arc<dyn SubmitService> = match &self.endpoint {
            Some(endpoint) => Arc::new(HttpSubmitService::new(endpoint.clone(), self.timeout)?),
            None => Arc::new(PlaceholderSubmitService),
        };
        Ok(Arc::new(LoggingSubmitService::new(service)))
    }
}
