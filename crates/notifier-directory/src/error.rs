//! Error types for directory access.

use thiserror::Error;

/// Errors returned by [`UserDirectory`](crate::UserDirectory) calls.
#[derive(Debug, Error)]
pub enum DirectoryError {
    /// Connection, TLS, or timeout failure
    #[error("Directory unavailable: {0}")]
    Unavailable(String),

    /// The directory answered with a non-success status
    #[error("Directory returned HTTP {status}: {body}")]
    Status { status: u16, body: String },

    /// The response body could not be decoded
    #[error("Invalid directory response: {0}")]
    InvalidResponse(String),

    /// Client could not be constructed
    #[error("Invalid directory configuration: {0}")]
    Config(String),
}

impl DirectoryError {
    /// Transport failures, throttling, and server errors are worth retrying.
    pub fn is_retryable(&self) -> bool {
        match self {
            DirectoryError::Unavailable(_) => true,
            DirectoryError::Status { status, .. } => *status == 429 || *status >= 500,
            DirectoryError::InvalidResponse(_) | DirectoryError::Config(_) => false,
        }
    }
}
