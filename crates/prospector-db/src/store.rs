//! The persistence contract used by the discovery pipeline.

use async_trait::async_trait;
use prospector_core::{Lead, RunId, RunMode};

use crate::error::Result;
use crate::model::{
    DorkStats, PatternStats, RunCounters, RunRecord, SourceStats, StoredLead, UpsertOutcome,
};

/// Durable storage for leads, dedup records and performance counters.
///
/// Every backend must behave identically: inserts of dedup records are
/// insert-if-absent, so concurrent duplicates resolve to a no-op, and a lead
/// is unique per normalized email and per normalized phone.
#[async_trait]
pub trait LeadStore: Send + Sync {
    /// Short backend name for logs.
    fn backend_name(&self) -> &'static str;

    /// Insert a lead, or merge it into the lead sharing its email or phone.
    async fn upsert_lead(&self, lead: &Lead) -> Result<UpsertOutcome>;

    /// Find a lead by normalized email.
    async fn find_lead_by_email(&self, email: &str) -> Result<Option<StoredLead>>;

    /// Find a lead by normalized phone.
    async fn find_lead_by_phone(&self, phone: &str) -> Result<Option<StoredLead>>;

    /// Total number of leads.
    async fn count_leads(&self) -> Result<u64>;

    /// Whether a normalized URL was seen within the retention window.
    async fn is_url_seen(&self, url: &str) -> Result<bool>;

    /// Mark URLs as seen in one transaction. Returns the number of rows written.
    async fn mark_urls_seen_batch(&self, urls: &[String], run_id: &RunId) -> Result<u64>;

    /// Whether a query was executed within the freshness window.
    async fn is_query_done(&self, query: &str) -> Result<bool>;

    /// Mark queries as executed in one transaction. Returns the number of rows written.
    async fn mark_queries_done_batch(&self, queries: &[String], run_id: &RunId) -> Result<u64>;

    /// Count one use of a query and its outcome.
    async fn record_dork_usage(
        &self,
        query: &str,
        leads_found: u64,
        leads_with_phone: u64,
        accepted: u64,
    ) -> Result<()>;

    /// Count one fetched page from a domain and its outcome.
    async fn record_source_hit(
        &self,
        domain: &str,
        leads_found: u64,
        leads_with_phone: u64,
    ) -> Result<()>;

    /// Count one candidate produced by an extraction pattern.
    async fn record_pattern_success(&self, pattern: &str, success: bool) -> Result<()>;

    /// Queries with the best `accepted / max(1, uses)` ratio.
    async fn get_top_dorks(&self, limit: usize) -> Result<Vec<DorkStats>>;

    /// Domains with the best yield per fetched page.
    async fn get_best_sources(&self, limit: usize) -> Result<Vec<SourceStats>>;

    /// All pattern counters, most successful first.
    async fn get_pattern_stats(&self) -> Result<Vec<PatternStats>>;

    /// Delete all performance counters. Returns the number of rows removed.
    async fn purge_performance(&self) -> Result<u64>;

    /// Open a run.
    async fn start_run(&self, mode: RunMode) -> Result<RunId>;

    /// Close a run with its final counters. A closed run cannot be closed again.
    async fn finish_run(&self, run_id: &RunId, counters: &RunCounters) -> Result<()>;

    /// Fetch a run.
    async fn get_run(&self, run_id: &RunId) -> Result<Option<RunRecord>>;
}
