//! Error types for the search subsystem.
//!
//! Providers never return these to the pipeline; they are folded into a
//! [`crate::OutcomeStatus`] at the provider boundary.

use thiserror::Error;

/// Errors that can occur inside a search provider.
#[derive(Error, Debug)]
pub enum SearchError {
    /// Unexpected HTTP status
    #[error("{provider} returned status {status}")]
    Status {
        /// Provider label
        provider: String,
        /// HTTP status code
        status: u16,
    },

    /// Response body could not be parsed
    #[error("failed to parse response from {provider}: {message}")]
    Parse {
        /// Provider label
        provider: String,
        /// Error message
        message: String,
    },

    /// Invalid provider setup (bad selector, bad proxy URL)
    #[error("invalid provider configuration: {0}")]
    Config(String),

    /// Network error
    #[error("network error: {0}")]
    Network(#[from] reqwest::Error),
}

/// Result type for search operations.
pub type Result<T> = std::result::Result<T, SearchError>;
