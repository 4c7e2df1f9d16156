//! Client error taxonomy. Every message is safe to show to the user as-is.

use assetlink_core::CoreError;

#[derive(Debug, thiserror::Error)]
pub enum ClientError {
    /// No token is stored; checked before any request is sent.
    #[error("Not signed in. Run `assetlink auth login` first.")]
    AuthMissing,

    /// The stored token was rejected; it has been cleared.
    #[error("Session expired or token rejected. Run `assetlink auth login` to sign in again.")]
    Unauthorized,

    #[error("Permission denied: {0}")]
    Forbidden(String),

    #[error("Request failed with status {status}: {message}")]
    Http { status: u16, message: String },

    /// Transport failure or timeout. Safe to retry.
    #[error("Network error: {0}. Check your connection and try again.")]
    Network(String),

    #[error("Unexpected response: {0}")]
    MalformedResponse(#[from] CoreError),

    #[error("Invalid input: {0}")]
    InvalidInput(String),

    #[error("Credential storage error: {0}")]
    Storage(#[from] std::io::Error),
}

impl ClientError {
    /// Whether retrying the same request might succeed.
    pub fn is_retryable(&self) -> bool {
        matches!(self, ClientError::Network(_))
            || matches!(self, ClientError::Http { status, .. } if *status >= 500)
    }
}
