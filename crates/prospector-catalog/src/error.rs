//! Error types for the catalog subsystem.

use thiserror::Error;

/// Errors that can occur while loading or querying the catalog.
#[derive(Error, Debug)]
pub enum CatalogError {
    /// Portal definition not found
    #[error("portal definition not found: {portal_id}")]
    NotFound {
        /// The portal ID that was not found
        portal_id: String,
    },

    /// Failed to parse a catalog TOML file
    #[error("failed to parse catalog TOML in {path}: {source}")]
    ParseError {
        /// Path (or embedded name) of the file
        path: String,
        /// TOML parse error
        #[source]
        source: toml::de::Error,
    },

    /// A catalog entry failed validation
    #[error("invalid catalog entry {entry}: {reason}")]
    ValidationError {
        /// Query text or portal ID
        entry: String,
        /// Reason for validation failure
        reason: String,
    },

    /// Catalog directory is not a directory
    #[error("catalog directory not found at {path}")]
    DirectoryNotFound {
        /// Expected directory path
        path: String,
    },

    /// I/O error while reading catalog files
    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),
}

/// Result type for catalog operations.
pub type Result<T> = std::result::Result<T, CatalogError>;
