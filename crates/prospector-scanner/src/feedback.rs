//! Performance feedback between cycles.
//!
//! Outcomes are written to the store as they happen and read back at the
//! start of the next cycle. Recording is best effort: a failed write is
//! logged and the cycle continues.

use prospector_db::{DorkStats, LeadStore};
use prospector_extract::ExtractionPattern;
use std::collections::HashMap;
use std::sync::Arc;

/// Largest ranking bonus a source domain can earn.
pub const MAX_SOURCE_BONUS: i32 = 20;

/// Bonus points per lead-per-page of historical yield.
const BONUS_PER_YIELD: f64 = 10.0;

/// Outcome of one query within a cycle.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct QueryOutcome {
    /// Contacts extracted from the query's pages
    pub leads_found: u64,
    /// Contacts that carried a phone number
    pub leads_with_phone: u64,
    /// Contacts that passed the score threshold
    pub accepted: u64,
}

impl QueryOutcome {
    /// Add another outcome to this one.
    pub fn absorb(&mut self, other: &Self) {
        self.leads_found += other.leads_found;
        self.leads_with_phone += other.leads_with_phone;
        self.accepted += other.accepted;
    }
}

/// Writes and reads per-query, per-domain and per-pattern counters.
#[derive(Clone)]
pub struct FeedbackRecorder {
    store: Arc<dyn LeadStore>,
}

impl FeedbackRecorder {
    /// Create a recorder backed by `store`.
    #[must_use]
    pub fn new(store: Arc<dyn LeadStore>) -> Self {
        Self { store }
    }

    /// Count one use of `query`.
    pub async fn record_query(&self, query: &str, outcome: &QueryOutcome) {
        if let Err(e) = self
            .store
            .record_dork_usage(
                query,
                outcome.leads_found,
                outcome.leads_with_phone,
                outcome.accepted,
            )
            .await
        {
            tracing::warn!(query, error = %e, "Failed to record query performance");
        }
    }

    /// Count one fetched page from `domain`.
    pub async fn record_page(&self, domain: &str, leads_found: u64, leads_with_phone: u64) {
        if let Err(e) = self
            .store
            .record_source_hit(domain, leads_found, leads_with_phone)
            .await
        {
            tracing::warn!(domain, error = %e, "Failed to record source performance");
        }
    }

    /// Count one candidate produced by `pattern`.
    pub async fn record_pattern(&self, pattern: ExtractionPattern, accepted: bool) {
        if let Err(e) = self
            .store
            .record_pattern_success(pattern.as_str(), accepted)
            .await
        {
            tracing::warn!(%pattern, error = %e, "Failed to record pattern outcome");
        }
    }

    /// Query history for the selector. Empty when the store is unavailable.
    pub async fn load_history(&self, limit: usize) -> Vec<DorkStats> {
        match self.store.get_top_dorks(limit).await {
            Ok(stats) => stats,
            Err(e) => {
                tracing::warn!(error = %e, "Failed to load query history, starting cold");
                Vec::new()
            }
        }
    }

    /// Ranking bonus per domain from historical yield, capped at
    /// [`MAX_SOURCE_BONUS`]. Domains with no yield are omitted.
    pub async fn source_bonuses(&self, limit: usize) -> HashMap<String, i32> {
        let sources = match self.store.get_best_sources(limit).await {
            Ok(sources) => sources,
            Err(e) => {
                tracing::warn!(error = %e, "Failed to load source performance");
                return HashMap::new();
            }
        };
        sources
            .into_iter()
            .filter_map(|s| {
                // Bounded by MAX_SOURCE_BONUS before the cast.
                #[allow(clippy::cast_possible_truncation)]
                let bonus = (s.yield_rate() * BONUS_PER_YIELD)
                    .round()
                    .min(f64::from(MAX_SOURCE_BONUS)) as i32;
                (bonus > 0).then(|| (s.domain.trim_start_matches("www.").to_string(), bonus))
            })
            .collect()
    }
}
