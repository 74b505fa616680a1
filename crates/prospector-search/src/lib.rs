//! Prospector Search - turns queries into candidate URLs.
//!
//! Every backend implements [`SearchProvider`]. Providers fail soft: a
//! call always yields a [`SearchOutcome`] whose status separates
//! "not configured" from "errored" and "exhausted".
//!
//! # Providers
//!
//! - [`GoogleSearchProvider`] - indexed-search API with credential rotation
//! - [`BraveSearchProvider`] - secondary API, used when the primary is unavailable
//! - [`DuckDuckGoProvider`] - keyless web search with proxy and direct modes
//! - [`PortalCrawler`] - listing-page crawler for one portal definition
//!
//! [`ProviderSet`] chains them and caches results per query.

#![warn(missing_docs)]
#![warn(clippy::all)]
#![warn(clippy::pedantic)]
#![allow(clippy::module_name_repetitions)]
#![allow(clippy::missing_errors_doc)]
#![allow(clippy::missing_panics_doc)]

pub mod cache;
pub mod error;
pub mod provider;
pub mod providers;
pub mod set;

pub use cache::QueryCache;
pub use error::{Result, SearchError};
pub use provider::{
    Candidate, Freshness, OutcomeStatus, ProviderKind, RotationState, SearchOutcome,
    SearchProvider, SearchRequest,
};
pub use providers::{BraveSearchProvider, DuckDuckGoProvider, GoogleSearchProvider, PortalCrawler};
pub use set::{ProviderReport, ProviderSet, SetOutcome};
