//! Error types for the AssetLink core library.

/// Errors raised while decoding backend responses or validating local input.
#[derive(Debug, thiserror::Error)]
pub enum CoreError {
    /// The body matched none of the envelope shapes known for the endpoint.
    #[error("Unrecognized response from {endpoint}: {detail}")]
    UnknownShape { endpoint: &'static str, detail: String },

    /// The envelope was recognised but signalled `success: false`.
    #[error("{endpoint} request was rejected: {message}")]
    Rejected { endpoint: &'static str, message: String },

    /// The envelope was recognised but its payload did not deserialize.
    #[error("Invalid {endpoint} payload: {source}")]
    Payload {
        endpoint: &'static str,
        #[source]
        source: serde_json::Error,
    },

    #[error("Invalid option: {0}")]
    InvalidOption(String),

    #[error("Canonicalization failed: {0}")]
    Canonicalization(String),
}
