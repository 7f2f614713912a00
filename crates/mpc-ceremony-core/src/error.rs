//! Error types for ceremony clients

use thiserror::Error;

/// Result type alias for ceremony operations
pub type Result<T> = std::result::Result<T, Error>;

/// Errors that can occur while talking to the relay or running a ceremony
#[derive(Debug, Error)]
pub enum Error {
    // ============ Input Errors ============
    /// Invalid configuration or request
    #[error("Invalid configuration: {0}")]
    InvalidConfig(String),

    /// Relay rejected the request as malformed
    #[error("Invalid request: {0}")]
    InvalidRequest(String),

    // ============ Relay Errors ============
    /// Session has no participant record on the relay
    #[error("Session not found: {0}")]
    SessionNotFound(String),

    /// Session has not been started on the relay
    #[error("Session not started: {0}")]
    StartNotFound(String),

    /// Transport failure talking to the relay (transient)
    #[error("Network error: {0}")]
    Network(String),

    /// Relay answered with an unexpected status
    #[error("Relay error ({status}): {message}")]
    Relay { status: u16, message: String },

    /// Relay could not store every copy of a message
    #[error("Relay dropped message {hash} for: {}", recipients.join(", "))]
    Dropped {
        hash: String,
        recipients: Vec<String>,
    },

    // ============ Message Errors ============
    /// Message body could not be decoded
    #[error("Invalid message: {0}")]
    InvalidMessage(String),

    /// Serialization error
    #[error("Serialization error: {0}")]
    Serialization(String),

    // ============ Ceremony Errors ============
    /// The cryptographic engine failed
    #[error("Engine error: {0}")]
    Engine(String),

    /// Timeout waiting for something
    #[error("Timeout waiting for {0}")]
    Timeout(String),

    /// The operation was cancelled
    #[error("Cancelled: {0}")]
    Cancelled(String),

    // ============ Internal Errors ============
    /// Internal error
    #[error("Internal error: {0}")]
    Internal(String),
}

impl Error {
    /// Check if retrying the same call later may succeed
    pub fn is_transient(&self) -> bool {
        match self {
            Error::Network(_) | Error::Timeout(_) => true,
            Error::Relay { status, .. } => *status >= 500,
            _ => false,
        }
    }

    /// Check if this is an expected "not there yet" answer from the relay
    pub fn is_not_found(&self) -> bool {
        matches!(self, Error::SessionNotFound(_) | Error::StartNotFound(_))
    }
}

impl From<serde_json::Error> for Error {
    fn from(e: serde_json::Error) -> Self {
        Error::Serialization(e.to_string())
    }
}

impl From<base64::DecodeError> for Error {
    fn from(e: base64::DecodeError) -> Self {
        Error::InvalidMessage(e.to_string())
    }
}
