//! Common error types for Palisade components.

use thiserror::Error;

/// Common errors across Palisade components
///
/// Expected verification failures (bad nonce, spam, replay, upstream
/// rejection) are NOT errors - they are carried as
/// [`VerificationResult`](crate::types::VerificationResult) failures.
/// `GateError` covers the truly exceptional conditions only.
#[derive(Debug, Error)]
pub enum GateError {
    /// Configuration error
    #[error("Configuration error: {0}")]
    Config(String),

    /// Single-use store (Redis) connection/operation error
    #[error("Store error: {0}")]
    Store(String),

    /// Transport error talking to the remote verification endpoint
    #[error("Transport error: {0}")]
    Transport(String),

    /// Token creation/serialization error
    #[error("Token error: {0}")]
    Token(String),

    /// Invalid input/request
    #[error("Invalid input: {0}")]
    InvalidInput(String),

    /// Internal server error
    #[error("Internal error: {0}")]
    Internal(String),
}

impl GateError {
    /// Returns the HTTP status code for this error
    pub fn status_code(&self) -> u16 {
        match self {
            Self::Config(_) => 500,
            Self::Store(_) => 503,
            Self::Transport(_) => 502,
            Self::Token(_) => 500,
            Self::InvalidInput(_) => 400,
            Self::Internal(_) => 500,
        }
    }

    /// Returns true if this error should be retried
    pub fn is_retryable(&self) -> bool {
        matches!(self, Self::Store(_) | Self::Transport(_))
    }
}
