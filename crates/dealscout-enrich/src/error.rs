//! Error types for the enrichment clients.

use dealscout_core::ScoutError;
use thiserror::Error;

/// Errors that can occur while talking to the search or scoring APIs.
#[derive(Error, Debug)]
pub enum EnrichError {
    /// Missing or unusable client configuration
    #[error("enrichment not configured: {0}")]
    NotConfigured(String),

    /// API answered with a non-success status
    #[error("API error ({provider}): status {status}, {message}")]
    ApiError {
        /// Provider name
        provider: String,
        /// HTTP status code
        status: u16,
        /// Response body or reason
        message: String,
    },

    /// Still rate limited after every retry
    #[error("rate limit exceeded for {provider} after {attempts} attempts")]
    RateLimitExceeded {
        /// Provider name
        provider: String,
        /// Attempts made
        attempts: u32,
    },

    /// Response could not be interpreted
    #[error("failed to parse response from {provider}: {message}")]
    ParseError {
        /// Provider name
        provider: String,
        /// Error message
        message: String,
    },

    /// Network error
    #[error("network error: {0}")]
    Network(#[from] reqwest::Error),

    /// Serialization error
    #[error("serialization error: {0}")]
    Serialization(#[from] serde_json::Error),

    /// Internal error
    #[error("internal error: {0}")]
    Internal(String),
}

/// Result type alias for enrichment operations.
pub type Result<T> = std::result::Result<T, EnrichError>;

impl From<EnrichError> for ScoutError {
    fn from(err: EnrichError) -> Self {
        ScoutError::Enrichment(err.to_string())
    }
}
