//! Error types for the relay service

use thiserror::Error;

/// Relay service errors
#[derive(Debug, Error)]
pub enum RelayError {
    /// Malformed identifier or body
    #[error("Invalid request: {0}")]
    InvalidRequest(String),

    /// No participant record for the session
    #[error("Session not found: {0}")]
    SessionNotFound(String),

    /// No start signal for the session
    #[error("Session not started: {0}")]
    StartNotFound(String),

    /// Store is at capacity
    #[error("Store full: {0}")]
    StoreFull(String),

    /// Some copies of a multi-recipient post were not stored
    #[error("Dropped message {hash} for: {}", recipients.join(", "))]
    Dropped {
        hash: String,
        recipients: Vec<String>,
    },

    /// Serialization error
    #[error("Serialization error: {0}")]
    Serialization(String),

    /// Transport failure reaching the relay
    #[error("Network error: {0}")]
    Network(String),

    /// Relay answered with a status the client does not expect
    #[error("Unexpected status {status}: {message}")]
    Status { status: u16, message: String },

    /// Internal error
    #[error("Internal error: {0}")]
    Internal(String),
}

impl RelayError {
    /// Get HTTP status code for this error
    pub fn status_code(&self) -> u16 {
        match self {
            RelayError::InvalidRequest(_) => 400,
            RelayError::SessionNotFound(_) => 404,
            RelayError::StartNotFound(_) => 404,
            RelayError::StoreFull(_) => 507,
            RelayError::Dropped { .. } => 507,
            RelayError::Serialization(_) => 500,
            RelayError::Network(_) => 503,
            RelayError::Status { status, .. } => *status,
            RelayError::Internal(_) => 500,
        }
    }

    /// Check if this error is retryable
    pub fn is_retryable(&self) -> bool {
        match self {
            RelayError::Network(_) => true,
            RelayError::Status { status, .. } => *status >= 500,
            _ => false,
        }
    }
}

impl From<RelayError> for mpc_ceremony_core::Error {
    fn from(err: RelayError) -> Self {
        use mpc_ceremony_core::Error;

        match err {
            RelayError::InvalidRequest(msg) => Error::InvalidRequest(msg),
            RelayError::SessionNotFound(id) => Error::SessionNotFound(id),
            RelayError::StartNotFound(id) => Error::StartNotFound(id),
            RelayError::Dropped { hash, recipients } => Error::Dropped { hash, recipients },
            RelayError::Network(msg) => Error::Network(msg),
            RelayError::Serialization(msg) => Error::Serialization(msg),
            RelayError::Internal(msg) => Error::Internal(msg),
            err @ (RelayError::StoreFull(_) | RelayError::Status { .. }) => Error::Relay {
                status: err.status_code(),
                message: err.to_string(),
            },
        }
    }
}

/// Result type alias
pub type Result<T> = std::result::Result<T, RelayError>;
