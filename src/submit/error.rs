//! Submission error types

use thiserror::Error;

/// Submission error with classification
#[derive(Debug, Error)]
#[error("{message}")]
pub struct SubmitError {
    pub kind: SubmitErrorKind,
    pub message: String,
}

impl SubmitError {
    pub fn new(kind: SubmitErrorKind, message: impl Into<String>) -> Self {
        Self {
            kind,
            message: message.into(),
        }
    }

    pub fn network(message: impl Into<String>) -> Self {
        Self::new(SubmitErrorKind::Network, message)
    }

    pub fn timeout(message: impl Into<String>) -> Self {
        Self::new(SubmitErrorKind::Timeout, message)
    }

    pub fn server(message: impl Into<String>) -> Self {
        Self::new(SubmitErrorKind::Server, message)
    }

    pub fn rejected(message: impl Into<String>) -> Self {
        Self::new(SubmitErrorKind::Rejected, message)
    }

    pub fn invalid_response(message: impl Into<String>) -> Self {
        Self::new(SubmitErrorKind::InvalidResponse, message)
    }

    pub fn unknown(message: impl Into<String>) -> Self {
        Self::new(SubmitErrorKind::Unknown, message)
    }
}

/// Error classification, used to tell the user whether a retry may help
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SubmitErrorKind {
    /// Connection failures
    Network,
    /// Request exceeded the configured timeout
    Timeout,
    /// Server error (5xx)
    Server,
    /// Endpoint refused the turn (4xx or an explicit error status)
    Rejected,
    /// Response body did not carry a reply
    InvalidResponse,
    Unknown,
}

impl SubmitErrorKind {
    pub fn is_retryable(self) -> bool {
        matches!(self, Self::Network | Self::Timeout | Self::Server)
    }
}
