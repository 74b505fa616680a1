//! Error types for the fetch layer.
//!
//! The pipeline only sees `Option<FetchedPage>`; these errors explain the
//! `None` in logs and tests.

use thiserror::Error;

/// Reasons a fetch produced no page.
#[derive(Error, Debug)]
pub enum FetchError {
    /// URL could not be parsed or is not http(s)
    #[error("invalid URL: {0}")]
    InvalidUrl(String),

    /// Path excluded by the host's robots rules
    #[error("disallowed by robots.txt")]
    Disallowed,

    /// Definitive block reported by the preflight request
    #[error("blocked with status {0}")]
    Blocked(u16),

    /// Non-success status on the final attempt
    #[error("unexpected status {0}")]
    Status(u16),

    /// Content type not accepted
    #[error("unsupported content type: {0}")]
    ContentType(String),

    /// Body exceeded the configured limit
    #[error("response too large: more than {0} bytes")]
    TooLarge(usize),

    /// PDF text extraction failed
    #[error("failed to extract PDF text: {0}")]
    Pdf(String),

    /// Client setup failed
    #[error("invalid fetch configuration: {0}")]
    Config(String),

    /// Throttle was shut down
    #[error("fetcher is shutting down")]
    Closed,

    /// Transport error
    #[error("HTTP error: {0}")]
    Http(#[from] reqwest::Error),
}

impl FetchError {
    /// Whether the error was a timeout.
    #[must_use]
    pub fn is_timeout(&self) -> bool {
        matches!(self, Self::Http(e) if e.is_timeout())
    }
}

/// Result type for fetch operations.
pub type Result<T> = std::result::Result<T, FetchError>;
