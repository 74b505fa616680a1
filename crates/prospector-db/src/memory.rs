//! Volatile in-process backend for tests and dry runs.

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use prospector_core::{
    normalize_email, normalize_phone_key, normalize_query, query_hash, Lead, RunId, RunMode,
};
use std::collections::HashMap;
use tokio::sync::RwLock;

use crate::error::{Result, StoreError};
use crate::model::{
    lead_keys, merge_lead, DorkStats, PatternStats, Retention, RunCounters, RunRecord,
    SourceStats, StoredLead, UpsertOutcome,
};
use crate::store::LeadStore;

#[derive(Debug, Default)]
struct State {
    next_id: i64,
    leads: HashMap<i64, StoredLead>,
    by_email: HashMap<String, i64>,
    by_phone: HashMap<String, i64>,
    urls_seen: HashMap<String, (RunId, DateTime<Utc>)>,
    queries_done: HashMap<String, (RunId, DateTime<Utc>)>,
    dorks: HashMap<String, DorkStats>,
    sources: HashMap<String, SourceStats>,
    patterns: HashMap<String, PatternStats>,
    runs: HashMap<String, RunRecord>,
}

impl State {
    fn write_lead(&mut self, id: i64, lead: Lead) {
        if let Some(previous) = self.leads.get(&id) {
            if let Some(email) = &previous.lead.email {
                self.by_email.remove(email);
            }
            if let Some(phone) = &previous.lead.phone {
                self.by_phone.remove(phone);
            }
        }
        if let Some(email) = &lead.email {
            self.by_email.insert(email.clone(), id);
        }
        if let Some(phone) = &lead.phone {
            self.by_phone.insert(phone.clone(), id);
        }
        self.leads.insert(
            id,
            StoredLead {
                id,
                lead,
                updated_at: Utc::now(),
            },
        );
    }
}

/// In-memory store with the same semantics as the SQL backends.
#[derive(Debug, Default)]
pub struct MemoryStore {
    state: RwLock<State>,
    retention: Retention,
}

impl MemoryStore {
    /// Create an empty store with default retention windows.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Create an empty store with the given retention windows.
    #[must_use]
    pub fn with_retention(retention: Retention) -> Self {
        Self {
            state: RwLock::default(),
            retention,
        }
    }

    /// All URLs currently recorded as seen, sorted.
    pub async fn seen_urls(&self) -> Vec<String> {
        let state = self.state.read().await;
        let mut urls: Vec<String> = state.urls_seen.keys().cloned().collect();
        urls.sort();
        urls
    }

    /// All stored leads ordered by ID.
    pub async fn leads(&self) -> Vec<StoredLead> {
        let state = self.state.read().await;
        let mut leads: Vec<StoredLead> = state.leads.values().cloned().collect();
        leads.sort_by_key(|l| l.id);
        leads
    }
}

#[async_trait]
impl LeadStore for MemoryStore {
    fn backend_name(&self) -> &'static str {
        "memory"
    }

    async fn upsert_lead(&self, lead: &Lead) -> Result<UpsertOutcome> {
        let (email, phone) = lead_keys(lead)?;
        let mut incoming = lead.clone();
        incoming.email.clone_from(&email);
        incoming.phone.clone_from(&phone);

        let mut state = self.state.write().await;
        let by_email = email.as_ref().and_then(|e| state.by_email.get(e).copied());
        let by_phone = phone.as_ref().and_then(|p| state.by_phone.get(p).copied());

        let target = by_email.or(by_phone);
        match target {
            Some(id) => {
                let existing = state
                    .leads
                    .get(&id)
                    .map(|l| l.lead.clone())
                    .ok_or_else(|| StoreError::NotFound(format!("lead {id} index is stale")))?;
                let mut merged = merge_lead(&existing, &incoming);
                if by_phone.is_some_and(|other| other != id) {
                    merged.phone.clone_from(&existing.phone);
                }
                state.write_lead(id, merged);
                Ok(UpsertOutcome { id, created: false })
            }
            None => {
                state.next_id += 1;
                let id = state.next_id;
                state.write_lead(id, incoming);
                Ok(UpsertOutcome { id, created: true })
            }
        }
    }

    async fn find_lead_by_email(&self, email: &str) -> Result<Option<StoredLead>> {
        let state = self.state.read().await;
        Ok(state
            .by_email
            .get(&normalize_email(email))
            .and_then(|id| state.leads.get(id))
            .cloned())
    }

    async fn find_lead_by_phone(&self, phone: &str) -> Result<Option<StoredLead>> {
        let state = self.state.read().await;
        Ok(state
            .by_phone
            .get(&normalize_phone_key(phone))
            .and_then(|id| state.leads.get(id))
            .cloned())
    }

    async fn count_leads(&self) -> Result<u64> {
        Ok(self.state.read().await.leads.len() as u64)
    }

    async fn is_url_seen(&self, url: &str) -> Result<bool> {
        let cutoff = self.retention.url_cutoff(Utc::now());
        let state = self.state.read().await;
        Ok(state
            .urls_seen
            .get(url)
            .is_some_and(|(_, seen_at)| *seen_at >= cutoff))
    }

    async fn mark_urls_seen_batch(&self, urls: &[String], run_id: &RunId) -> Result<u64> {
        let now = Utc::now();
        let cutoff = self.retention.url_cutoff(now);
        let mut state = self.state.write().await;
        let mut written = 0;
        for url in urls {
            let live = state
                .urls_seen
                .get(url)
                .is_some_and(|(_, seen_at)| *seen_at >= cutoff);
            if !live {
                state.urls_seen.insert(url.clone(), (run_id.clone(), now));
                written += 1;
            }
        }
        Ok(written)
    }

    async fn is_query_done(&self, query: &str) -> Result<bool> {
        let cutoff = self.retention.query_cutoff(Utc::now());
        let state = self.state.read().await;
        Ok(state
            .queries_done
            .get(&query_hash(query))
            .is_some_and(|(_, at)| *at >= cutoff))
    }

    async fn mark_queries_done_batch(&self, queries: &[String], run_id: &RunId) -> Result<u64> {
        let now = Utc::now();
        let mut state = self.state.write().await;
        for query in queries {
            state
                .queries_done
                .insert(query_hash(query), (run_id.clone(), now));
        }
        Ok(queries.len() as u64)
    }

    async fn record_dork_usage(
        &self,
        query: &str,
        leads_found: u64,
        leads_with_phone: u64,
        accepted: u64,
    ) -> Result<()> {
        let hash = query_hash(query);
        let mut state = self.state.write().await;
        let entry = state.dorks.entry(hash.clone()).or_insert_with(|| DorkStats {
            query_hash: hash,
            query: normalize_query(query),
            uses: 0,
            leads_found: 0,
            leads_with_phone: 0,
            accepted: 0,
            last_used_at: Utc::now(),
        });
        entry.uses += 1;
        entry.leads_found += leads_found;
        entry.leads_with_phone += leads_with_phone;
        entry.accepted += accepted;
        entry.last_used_at = Utc::now();
        Ok(())
    }

    async fn record_source_hit(
        &self,
        domain: &str,
        leads_found: u64,
        leads_with_phone: u64,
    ) -> Result<()> {
        let domain = domain.to_lowercase();
        let mut state = self.state.write().await;
        let entry = state
            .sources
            .entry(domain.clone())
            .or_insert_with(|| SourceStats {
                domain,
                hits: 0,
                leads_found: 0,
                leads_with_phone: 0,
                last_hit_at: Utc::now(),
            });
        entry.hits += 1;
        entry.leads_found += leads_found;
        entry.leads_with_phone += leads_with_phone;
        entry.last_hit_at = Utc::now();
        Ok(())
    }

    async fn record_pattern_success(&self, pattern: &str, success: bool) -> Result<()> {
        let mut state = self.state.write().await;
        let entry = state
            .patterns
            .entry(pattern.to_string())
            .or_insert_with(|| PatternStats {
                pattern: pattern.to_string(),
                attempts: 0,
                successes: 0,
            });
        entry.attempts += 1;
        entry.successes += u64::from(success);
        Ok(())
    }

    async fn get_top_dorks(&self, limit: usize) -> Result<Vec<DorkStats>> {
        let state = self.state.read().await;
        let mut dorks: Vec<DorkStats> = state.dorks.values().cloned().collect();
        dorks.sort_by(|a, b| {
            b.success_rate()
                .total_cmp(&a.success_rate())
                .then(b.uses.cmp(&a.uses))
                .then(a.query_hash.cmp(&b.query_hash))
        });
        dorks.truncate(limit);
        Ok(dorks)
    }

    async fn get_best_sources(&self, limit: usize) -> Result<Vec<SourceStats>> {
        let state = self.state.read().await;
        let mut sources: Vec<SourceStats> = state.sources.values().cloned().collect();
        sources.sort_by(|a, b| {
            b.yield_rate()
                .total_cmp(&a.yield_rate())
                .then(b.hits.cmp(&a.hits))
                .then(a.domain.cmp(&b.domain))
        });
        sources.truncate(limit);
        Ok(sources)
    }

    async fn get_pattern_stats(&self) -> Result<Vec<PatternStats>> {
        let state = self.state.read().await;
        let mut patterns: Vec<PatternStats> = state.patterns.values().cloned().collect();
        patterns.sort_by(|a, b| b.successes.cmp(&a.successes).then(a.pattern.cmp(&b.pattern)));
        Ok(patterns)
    }

    async fn purge_performance(&self) -> Result<u64> {
        let mut state = self.state.write().await;
        let removed = state.dorks.len() + state.sources.len() + state.patterns.len();
        state.dorks.clear();
        state.sources.clear();
        state.patterns.clear();
        Ok(removed as u64)
    }

    async fn start_run(&self, mode: RunMode) -> Result<RunId> {
        let id = RunId::generate();
        let mut state = self.state.write().await;
        state.runs.insert(
            id.as_str().to_string(),
            RunRecord {
                id: id.clone(),
                mode,
                started_at: Utc::now(),
                finished_at: None,
                counters: RunCounters::default(),
            },
        );
        Ok(id)
    }

    async fn finish_run(&self, run_id: &RunId, counters: &RunCounters) -> Result<()> {
        let mut state = self.state.write().await;
        let run = state
            .runs
            .get_mut(run_id.as_str())
            .ok_or_else(|| StoreError::NotFound(format!("run '{run_id}' not found")))?;
        if run.finished_at.is_some() {
            return Err(StoreError::RunClosed(run_id.to_string()));
        }
        run.finished_at = Some(Utc::now());
        run.counters = *counters;
        Ok(())
    }

    async fn get_run(&self, run_id: &RunId) -> Result<Option<RunRecord>> {
        Ok(self.state.read().await.runs.get(run_id.as_str()).cloned())
    }
}
