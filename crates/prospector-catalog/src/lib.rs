//! Prospector Catalog - query, portal and domain catalog.
//!
//! The catalog is read-only configuration for the discovery pipeline: query
//! templates ("dorks"), direct-crawl portal definitions, and host lists
//! (blacklist, allowlist, hosts that hide phone numbers).
//!
//! # Architecture
//!
//! - **Definition Types** ([`definition`]): Query, portal and domain-list structures
//! - **Loader** ([`loader`]): TOML loading with built-in defaults
//! - **Registry** ([`registry`]): In-memory cache with query support
//! - **Errors** ([`error`]): Catalog-specific error types
//!
//! # Example
//!
//! ```rust
//! use prospector_catalog::{CatalogLoader, CatalogRegistry};
//! use prospector_core::RunMode;
//!
//! # fn main() -> Result<(), Box<dyn std::error::Error>> {
//! let registry = CatalogRegistry::load_from(&CatalogLoader::builtin())?;
//! let queries = registry.queries_for(RunMode::JobSeekers);
//! assert!(!queries.is_empty());
//! assert!(registry.is_blacklisted("de.linkedin.com"));
//! # Ok(())
//! # }
//! ```

#![warn(missing_docs)]
#![warn(clippy::all)]
#![warn(clippy::pedantic)]
#![allow(clippy::module_name_repetitions)]
#![allow(clippy::missing_errors_doc)]
#![allow(clippy::missing_panics_doc)]

pub mod definition;
pub mod error;
pub mod loader;
pub mod registry;

// Re-export commonly used types
pub use definition::{host_matches, DomainLists, PortalDefinition, PortalMetadata, QueryTemplate};
pub use error::{CatalogError, Result};
pub use loader::{Catalog, CatalogLoader};
pub use registry::CatalogRegistry;
