//! Core search provider trait and request/outcome types.

use async_trait::async_trait;
use prospector_core::RunMode;
use serde::{Deserialize, Serialize};
use std::fmt;

/// Trait for search backends.
///
/// A provider turns one query into candidate URLs. Implementations never
/// fail: transport errors, bad statuses and parse errors are reported through
/// [`OutcomeStatus`] alongside whatever candidates were collected.
#[async_trait]
pub trait SearchProvider: Send + Sync {
    /// Which kind of backend this is.
    fn kind(&self) -> ProviderKind;

    /// Label used in logs and cache keys (e.g. `google`, `portal:stellen`).
    fn label(&self) -> &str;

    /// Whether the provider has what it needs to run (credentials, flags).
    fn is_configured(&self) -> bool;

    /// Whether the provider should run for a mode.
    fn serves(&self, _mode: RunMode) -> bool {
        true
    }

    /// Whether results depend on the query text.
    fn uses_query(&self) -> bool {
        true
    }

    /// Run one query.
    async fn search(&self, request: &SearchRequest, rotation: &mut RotationState) -> SearchOutcome;
}

/// The kinds of search backend.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ProviderKind {
    /// Paid indexed-search API with credential rotation
    IndexedApi,
    /// Secondary API-based engine, used when the primary is unavailable
    SecondaryApi,
    /// Keyless web-search engine
    WebSearch,
    /// Direct listing crawler for one portal
    Portal,
}

impl fmt::Display for ProviderKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(match self {
            Self::IndexedApi => "indexed_api",
            Self::SecondaryApi => "secondary_api",
            Self::WebSearch => "web_search",
            Self::Portal => "portal",
        })
    }
}

/// Recency restriction passed to providers that support one.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Freshness {
    /// Past day
    Day,
    /// Past week
    Week,
    /// Past month
    Month,
    /// Past year
    Year,
}

impl Freshness {
    /// Parse a config value (`day`, `week`, `month`, `year`).
    #[must_use]
    pub fn parse(s: &str) -> Option<Self> {
        match s.trim().to_lowercase().as_str() {
            "day" | "d" => Some(Self::Day),
            "week" | "w" => Some(Self::Week),
            "month" | "m" => Some(Self::Month),
            "year" | "y" => Some(Self::Year),
            _ => None,
        }
    }

    /// Single-letter code shared by most engines (`d`, `w`, `m`, `y`).
    #[must_use]
    pub fn letter(self) -> char {
        match self {
            Self::Day => 'd',
            Self::Week => 'w',
            Self::Month => 'm',
            Self::Year => 'y',
        }
    }
}

/// One query sent to a provider.
#[derive(Debug, Clone, PartialEq)]
pub struct SearchRequest {
    /// Query text
    pub query: String,
    /// Stop after this many candidates
    pub max_results: usize,
    /// Stop after this many result pages
    pub max_pages: u32,
    /// Optional recency restriction
    pub freshness: Option<Freshness>,
}

impl SearchRequest {
    /// Create a request with default limits (30 results, 3 pages, no freshness).
    #[must_use]
    pub fn new(query: impl Into<String>) -> Self {
        Self {
            query: query.into(),
            max_results: 30,
            max_pages: 3,
            freshness: None,
        }
    }

    /// Set the page cap.
    #[must_use]
    pub fn with_max_pages(mut self, max_pages: u32) -> Self {
        self.max_pages = max_pages;
        self
    }

    /// Set the result cap.
    #[must_use]
    pub fn with_max_results(mut self, max_results: usize) -> Self {
        self.max_results = max_results;
        self
    }

    /// Set the freshness hint.
    #[must_use]
    pub fn with_freshness(mut self, freshness: Option<Freshness>) -> Self {
        self.freshness = freshness;
        self
    }
}

/// A URL returned by a provider.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Candidate {
    /// Result URL
    pub url: String,
    /// Result snippet, if the provider returns one
    pub snippet: Option<String>,
    /// Which kind of provider found it
    pub source: ProviderKind,
}

impl Candidate {
    /// Create a candidate.
    #[must_use]
    pub fn new(url: impl Into<String>, snippet: Option<String>, source: ProviderKind) -> Self {
        Self {
            url: url.into(),
            snippet: snippet.filter(|s| !s.trim().is_empty()),
            source,
        }
    }
}

/// How a provider call ended.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum OutcomeStatus {
    /// Finished normally (possibly with zero results)
    Completed,
    /// Every credential hit its quota
    Exhausted,
    /// Missing credentials or disabled
    NotConfigured,
    /// A transport, status or parse error stopped the call
    Errored(String),
}

/// Candidates plus the status of the call that produced them.
#[derive(Debug, Clone, PartialEq)]
pub struct SearchOutcome {
    /// Candidates in provider order, deduplicated
    pub candidates: Vec<Candidate>,
    /// How the call ended
    pub status: OutcomeStatus,
}

impl SearchOutcome {
    /// Successful outcome.
    #[must_use]
    pub fn completed(candidates: Vec<Candidate>) -> Self {
        Self {
            candidates,
            status: OutcomeStatus::Completed,
        }
    }

    /// Outcome for an unconfigured provider.
    #[must_use]
    pub fn not_configured() -> Self {
        Self {
            candidates: Vec::new(),
            status: OutcomeStatus::NotConfigured,
        }
    }

    /// Outcome after an error, keeping partial results.
    #[must_use]
    pub fn errored(candidates: Vec<Candidate>, reason: impl fmt::Display) -> Self {
        Self {
            candidates,
            status: OutcomeStatus::Errored(reason.to_string()),
        }
    }

    /// Outcome after all credentials were exhausted, keeping partial results.
    #[must_use]
    pub fn exhausted(candidates: Vec<Candidate>) -> Self {
        Self {
            candidates,
            status: OutcomeStatus::Exhausted,
        }
    }

    /// True when the provider can't be used again until its quota resets.
    #[must_use]
    pub fn is_exhausted(&self) -> bool {
        self.status == OutcomeStatus::Exhausted
    }
}

/// Credential rotation state for one provider.
///
/// Owned by the caller and passed by reference into every call, so two
/// provider instances never share hidden indices.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct RotationState {
    current: usize,
    exhausted: Vec<bool>,
}

impl RotationState {
    /// Create a fresh state.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Index of the credential to use next, or `None` if all `n` are exhausted.
    #[must_use]
    pub fn current(&mut self, n: usize) -> Option<usize> {
        if n == 0 {
            return None;
        }
        self.exhausted.resize(n, false);
        (0..n)
            .map(|offset| (self.current + offset) % n)
            .find(|&i| !self.exhausted[i])
            .inspect(|&i| self.current = i)
    }

    /// Mark the current credential as exhausted and advance.
    pub fn mark_exhausted(&mut self, n: usize) {
        if n == 0 {
            return;
        }
        self.exhausted.resize(n, false);
        let i = self.current % n;
        self.exhausted[i] = true;
        self.current = (i + 1) % n;
    }

    /// Whether every one of `n` credentials is exhausted.
    #[must_use]
    pub fn all_exhausted(&self, n: usize) -> bool {
        n == 0 || (self.exhausted.len() >= n && self.exhausted[..n].iter().all(|&e| e))
    }

    /// Forget exhaustion marks (e.g. after the quota period resets).
    pub fn reset(&mut self) {
        self.exhausted.clear();
        self.current = 0;
    }
}

/// Keep only the first occurrence of every URL.
pub(crate) fn push_unique(
    out: &mut Vec<Candidate>,
    seen: &mut std::collections::HashSet<String>,
    candidate: Candidate,
) -> bool {
    if seen.insert(candidate.url.clone()) {
        out.push(candidate);
        true
    } else {
        false
    }
}
