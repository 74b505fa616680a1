//! Prospector Scanner - the discovery cycle and its feedback loop.
//!
//! This crate ties the pipeline together. A cycle selects queries, searches,
//! canonicalizes and ranks the candidate URLs, fetches the unseen ones with
//! bounded concurrency, extracts and scores contacts, and persists the
//! accepted leads. Query, source and pattern outcomes are written back to
//! the store and steer the next cycle.
//!
//! # Features
//!
//! - **URL ranking**: canonical URLs with tracking and pagination
//!   parameters stripped, ranked by path hints and source yield
//! - **Query selection**: a bounded core pool of proven queries mixed with
//!   staleness-weighted exploration, reproducible with a seeded RNG
//! - **At-most-once processing**: URLs are marked seen in one batch per
//!   query and never fetched twice within the retention window
//! - **Cooperative cancellation**: runs stop only between cycles
//!
//! # Example
//!
//! ```rust,no_run
//! use prospector_catalog::CatalogRegistry;
//! use prospector_core::{FetchConfig, RunMode};
//! use prospector_db::MemoryStore;
//! use prospector_fetch::ResilientFetcher;
//! use prospector_scanner::DiscoveryOrchestrator;
//! use prospector_search::{ProviderSet, QueryCache};
//! use std::sync::Arc;
//! use tokio_util::sync::CancellationToken;
//!
//! # async fn example() -> Result<(), Box<dyn std::error::Error>> {
//! let store = Arc::new(MemoryStore::new());
//! let fetcher = Arc::new(ResilientFetcher::new(&FetchConfig::default())?);
//! let providers = ProviderSet::new(QueryCache::with_ttl_hours(24));
//!
//! let mut orchestrator =
//!     DiscoveryOrchestrator::new(store, CatalogRegistry::new(), providers, fetcher);
//! let summary = orchestrator
//!     .run(RunMode::JobSeekers, 1, CancellationToken::new())
//!     .await?;
//! println!("{} leads created", summary.counters.leads_created);
//! # Ok(())
//! # }
//! ```

#![warn(missing_docs)]
#![warn(clippy::all)]
#![warn(clippy::pedantic)]
#![allow(clippy::module_name_repetitions)]
#![allow(clippy::missing_errors_doc)]
#![allow(clippy::missing_panics_doc)]

pub mod error;
pub mod feedback;
pub mod orchestrator;
pub mod reveal;
pub mod selector;
pub mod url_rank;

// Re-export commonly used types
pub use error::{Result, ScanError};
pub use feedback::{FeedbackRecorder, QueryOutcome, MAX_SOURCE_BONUS};
pub use orchestrator::{CycleSummary, DiscoveryOrchestrator, RunSummary};
pub use reveal::{PhoneRevealer, RateLimitedRevealer};
pub use selector::{CorePool, QuerySelector, MAX_CORE_SIZE, MIN_CORE_SIZE};
pub use url_rank::{domain_of, normalize_url, path_score, rank_urls, RankedUrl};
