//! Prospector Core - Foundation crate for the lead discovery pipeline.
//!
//! This crate provides shared types, error handling and configuration
//! management that all other Prospector crates depend on.
//!
//! # Modules
//!
//! - [`error`] - Central error types using thiserror
//! - [`config`] - TOML-based configuration with XDG paths and env overrides
//! - [`types`] - Shared newtypes and enums (`RunId`, `PortalId`, `RunMode`, `Lead`)
//!
//! # Example
//!
//! ```rust
//! use prospector_core::{AppConfig, RunMode, ScoringPolicy};
//!
//! let config = AppConfig::default();
//! assert_eq!(config.scoring.min_score, 40);
//! assert_eq!(RunMode::PassiveCandidates.policy(), ScoringPolicy::PassiveCandidate);
//! ```

#![warn(missing_docs)]
#![warn(clippy::all)]
#![warn(clippy::pedantic)]
#![allow(clippy::module_name_repetitions)]
#![allow(clippy::missing_errors_doc)]
#![allow(clippy::missing_panics_doc)]

pub mod config;
pub mod error;
pub mod types;

// Re-export commonly used types
pub use config::{
    AppConfig, ApiCredential, CatalogConfig, ExtractConfig, FetchConfig, LogFormat,
    LoggingConfig, RunConfig, ScoringConfig, SearchConfig, SelectorConfig, StorageBackend,
    StorageConfig,
};
pub use error::{ConfigError, ConfigResult, CoreError, Result};
pub use types::{
    normalize_email, normalize_phone_key, normalize_query, query_hash, DataQuality, Lead, LeadClassification, Party,
    PortalId, RunId, RunMode, ScoringPolicy, SearchStatus,
};
