//! Error types for risk engine

use thiserror::Error;

/// Risk engine error
#[derive(Debug, Error)]
pub enum Error {
    /// Provider answered with an error status
    #[error("Provider {provider} returned status {status}: {body}")]
    ProviderStatus {
        /// Provider name
        provider: String,
        /// HTTP status code
        status: u16,
        /// Response body
        body: String,
    },

    /// Provider could not be reached
    #[error("HTTP error: {0}")]
    Http(#[from] reqwest::Error),

    /// Provider answered with an unusable body
    #[error("Invalid provider response: {0}")]
    InvalidResponse(String),

    /// Invalid configuration
    #[error("Invalid configuration: {0}")]
    InvalidConfig(String),
}

/// Result type
pub type Result<T> = std::result::Result<T, Error>;
