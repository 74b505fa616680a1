//! Discovery orchestrator for running search-fetch-extract-score cycles.
//!
//! This module provides the `DiscoveryOrchestrator` which drives one or more
//! discovery cycles: it selects queries, collects candidate URLs from the
//! search providers, drops URLs that were already processed, fetches and
//! extracts the survivors with bounded concurrency, scores every contact and
//! persists the accepted ones. Outcomes are fed back to the store so the
//! next cycle can re-weight its queries and sources.

use crate::error::Result;
use crate::feedback::{FeedbackRecorder, QueryOutcome};
use crate::reveal::PhoneRevealer;
use crate::selector::QuerySelector;
use crate::url_rank::{domain_of, normalize_url, rank_urls, RankedUrl};
use futures::stream::{FuturesUnordered, StreamExt};
use prospector_catalog::{CatalogRegistry, QueryTemplate};
use prospector_core::{AppConfig, DataQuality, Lead, RunId, RunMode, ScoringConfig};
use prospector_db::{LeadStore, RunCounters};
use prospector_extract::{is_personal_email, is_plausible_name, ContactExtractor, ExtractedContact};
use prospector_fetch::PageFetcher;
use prospector_scoring::{ScoreCard, Scorer};
use prospector_search::ProviderSet;
use std::collections::{HashMap, HashSet};
use std::sync::Arc;
use std::time::Duration;
use tokio_util::sync::CancellationToken;

/// Default number of pages processed at once.
const DEFAULT_MAX_CONCURRENT_PAGES: usize = 8;

/// Default number of ranked URLs fetched per query.
const DEFAULT_MAX_URLS_PER_QUERY: usize = 20;

/// Number of historical queries loaded for the selector.
const HISTORY_LIMIT: usize = 200;

/// Number of source domains consulted for ranking bonuses.
const SOURCE_LIMIT: usize = 100;

/// Ranking bonus for allowlisted domains.
const ALLOWLIST_BONUS: i32 = 10;

/// Outcome of one discovery cycle.
#[derive(Debug, Clone)]
pub struct CycleSummary {
    /// Run record the cycle was logged under
    pub run_id: RunId,
    /// Mode the cycle ran in
    pub mode: RunMode,
    /// Queries that were issued
    pub queries: Vec<String>,
    /// Outcome counters
    pub counters: RunCounters,
}

/// Outcome of a multi-cycle run.
#[derive(Debug, Clone, Default)]
pub struct RunSummary {
    /// Cycles that ran to completion
    pub cycles_completed: u32,
    /// Counters summed over all cycles
    pub counters: RunCounters,
    /// Whether the run stopped at a cancellation checkpoint
    pub cancelled: bool,
    /// Run records, one per completed cycle
    pub run_ids: Vec<RunId>,
}

impl RunSummary {
    fn absorb(&mut self, cycle: &CycleSummary) {
        self.cycles_completed += 1;
        self.counters.absorb(&cycle.counters);
        self.run_ids.push(cycle.run_id.clone());
    }
}

/// A contact with the score it received.
#[derive(Debug, Clone)]
struct ScoredContact {
    contact: ExtractedContact,
    card: ScoreCard,
}

/// What processing one URL produced.
#[derive(Debug)]
struct PageResult {
    ranked: RankedUrl,
    fetched: bool,
    contacts: Vec<ScoredContact>,
}

/// Borrowed view of everything a page task needs.
struct PageWorker<'a> {
    fetcher: &'a dyn PageFetcher,
    extractor: &'a ContactExtractor,
    scorer: &'a Scorer,
    catalog: &'a CatalogRegistry,
    revealer: Option<&'a dyn PhoneRevealer>,
}

impl PageWorker<'_> {
    /// Fetch, extract and score one URL. Never fails; a failed fetch yields
    /// an empty, unfetched result.
    async fn process(&self, ranked: RankedUrl) -> PageResult {
        let Some(page) = self.fetcher.fetch(&ranked.url).await else {
            return PageResult {
                ranked,
                fetched: false,
                contacts: Vec::new(),
            };
        };

        let mut document = self.extractor.extract_document(&page.body, &page.final_url);

        let has_phone = document.contacts.iter().any(|c| c.phone.is_some());
        if !has_phone && self.catalog.hides_phone(&ranked.domain) {
            if let Some(revealer) = self.revealer {
                if let Some(revealed) = revealer.reveal(&ranked.url).await {
                    let extra = self.extractor.extract_document(&revealed, &page.final_url);
                    if extra.contacts.iter().any(|c| c.phone.is_some()) {
                        tracing::debug!(url = %ranked.url, "Phone revealed");
                        document = extra;
                    }
                }
            }
        }

        let contacts = document
            .contacts
            .into_iter()
            .map(|contact| {
                let card = self
                    .scorer
                    .score(&document.text, &page.final_url, Some(&contact));
                ScoredContact { contact, card }
            })
            .collect();

        PageResult {
            ranked,
            fetched: true,
            contacts,
        }
    }
}

/// Build the lead record for an accepted contact.
fn build_lead(scored: &ScoredContact, source_url: &str, template: &QueryTemplate) -> Lead {
    let ScoredContact { contact, card } = scored;
    let mut lead = Lead::new(source_url);
    lead.name.clone_from(&contact.name);
    lead.email.clone_from(&contact.email);
    lead.phone = contact
        .phone
        .clone()
        .filter(|_| contact.phone_valid)
        .or_else(|| contact.whatsapp.clone());
    lead.company.clone_from(&contact.company);
    lead.role.clone_from(&contact.role);
    lead.region.clone_from(&template.region);
    lead.industries.clone_from(&card.industries);
    lead.tags.clone_from(&template.tags);
    lead.tags.push(contact.pattern.as_str().to_string());
    lead.score = card.score;
    lead.classification = card.classification;
    lead.quality = DataQuality {
        email_personal: contact.email.as_deref().is_some_and(is_personal_email),
        phone_valid: contact.phone_valid,
        name_plausible: contact.name.as_deref().is_some_and(is_plausible_name),
        whatsapp: contact.whatsapp.is_some(),
    };
    lead
}

/// Drives discovery cycles across providers, fetcher, extractor and store.
pub struct DiscoveryOrchestrator {
    /// Persistence and dedup store
    store: Arc<dyn LeadStore>,
    /// Queries, portals and domain lists
    catalog: CatalogRegistry,
    /// Search providers with their rotation state
    providers: ProviderSet,
    /// Page fetcher
    fetcher: Arc<dyn PageFetcher>,
    /// Contact extractor
    extractor: ContactExtractor,
    /// Query selector
    selector: QuerySelector,
    /// Performance feedback
    feedback: FeedbackRecorder,
    /// Score threshold and per-domain cap
    scoring: ScoringConfig,
    /// Optional phone reveal fallback
    revealer: Option<Arc<dyn PhoneRevealer>>,
    /// Maximum pages processed at once
    max_concurrent_pages: usize,
    /// Maximum ranked URLs fetched per query
    max_urls_per_query: usize,
    /// Queries issued per cycle
    queries_per_cycle: usize,
    /// Pause between cycles
    pause: Duration,
}

impl DiscoveryOrchestrator {
    /// Create an orchestrator with default limits.
    #[must_use]
    pub fn new(
        store: Arc<dyn LeadStore>,
        catalog: CatalogRegistry,
        providers: ProviderSet,
        fetcher: Arc<dyn PageFetcher>,
    ) -> Self {
        let selector_config = prospector_core::SelectorConfig::default();
        Self {
            feedback: FeedbackRecorder::new(Arc::clone(&store)),
            store,
            catalog,
            providers,
            fetcher,
            extractor: ContactExtractor::default(),
            selector: QuerySelector::new(&selector_config),
            scoring: ScoringConfig::default(),
            revealer: None,
            max_concurrent_pages: DEFAULT_MAX_CONCURRENT_PAGES,
            max_urls_per_query: DEFAULT_MAX_URLS_PER_QUERY,
            queries_per_cycle: selector_config.queries_per_cycle,
            pause: Duration::ZERO,
        }
    }

    /// Create an orchestrator with every limit taken from `config`.
    #[must_use]
    pub fn from_config(
        config: &AppConfig,
        store: Arc<dyn LeadStore>,
        catalog: CatalogRegistry,
        providers: ProviderSet,
        fetcher: Arc<dyn PageFetcher>,
    ) -> Self {
        Self::new(store, catalog, providers, fetcher)
            .with_extractor(ContactExtractor::new(&config.extract))
            .with_selector(QuerySelector::new(&config.selector))
            .with_scoring(config.scoring.clone())
            .with_queries_per_cycle(config.selector.queries_per_cycle)
            .with_max_concurrent_pages(config.fetch.max_concurrent)
            .with_pause(Duration::from_secs(config.run.pause_between_cycles_secs))
    }

    /// Set the contact extractor.
    #[must_use]
    pub fn with_extractor(mut self, extractor: ContactExtractor) -> Self {
        self.extractor = extractor;
        self
    }

    /// Set the query selector (e.g. one with a seeded RNG).
    #[must_use]
    pub fn with_selector(mut self, selector: QuerySelector) -> Self {
        self.selector = selector;
        self
    }

    /// Set the score threshold and per-domain cap.
    #[must_use]
    pub fn with_scoring(mut self, scoring: ScoringConfig) -> Self {
        self.scoring = scoring;
        self
    }

    /// Enable the phone reveal fallback.
    #[must_use]
    pub fn with_revealer(mut self, revealer: Arc<dyn PhoneRevealer>) -> Self {
        self.revealer = Some(revealer);
        self
    }

    /// Set the maximum number of pages processed at once.
    #[must_use]
    pub fn with_max_concurrent_pages(mut self, max: usize) -> Self {
        self.max_concurrent_pages = max.max(1);
        self
    }

    /// Set the maximum number of ranked URLs fetched per query.
    #[must_use]
    pub fn with_max_urls_per_query(mut self, max: usize) -> Self {
        self.max_urls_per_query = max;
        self
    }

    /// Set the number of queries issued per cycle.
    #[must_use]
    pub fn with_queries_per_cycle(mut self, count: usize) -> Self {
        self.queries_per_cycle = count;
        self
    }

    /// Set the pause between cycles.
    #[must_use]
    pub fn with_pause(mut self, pause: Duration) -> Self {
        self.pause = pause;
        self
    }

    /// The query selector.
    #[must_use]
    pub fn selector(&self) -> &QuerySelector {
        &self.selector
    }

    /// Run up to `cycles` cycles, stopping early when `cancel` fires.
    ///
    /// Cancellation is checked only between cycles; a cycle in progress
    /// always finishes and closes its run record.
    pub async fn run(
        &mut self,
        mode: RunMode,
        cycles: u32,
        cancel: CancellationToken,
    ) -> Result<RunSummary> {
        self.providers.reset_rotation();
        let mut summary = RunSummary::default();

        for cycle in 0..cycles {
            if cancel.is_cancelled() {
                summary.cancelled = true;
                break;
            }

            let outcome = self.run_cycle(mode).await?;
            summary.absorb(&outcome);

            if cycle + 1 < cycles {
                tokio::select! {
                    () = cancel.cancelled() => {
                        summary.cancelled = true;
                        break;
                    }
                    () = tokio::time::sleep(self.pause) => {}
                }
            }
        }

        if summary.cancelled {
            tracing::info!(
                cycles_completed = summary.cycles_completed,
                "Run cancelled at cycle checkpoint"
            );
        }
        Ok(summary)
    }

    /// Run one discovery cycle in `mode`.
    ///
    /// Only failures to open or close the run record are returned as
    /// errors. Provider, fetch and store failures inside the cycle are
    /// counted in [`RunCounters::errors`] and logged.
    pub async fn run_cycle(&mut self, mode: RunMode) -> Result<CycleSummary> {
        let run_id = self.store.start_run(mode).await?;
        tracing::info!(run_id = %run_id, mode = mode.as_str(), "Starting discovery cycle");

        let history = self.feedback.load_history(HISTORY_LIMIT).await;
        self.selector.refresh(&history);
        let source_bonus = self.feedback.source_bonuses(SOURCE_LIMIT).await;

        if self.providers.usable_count() == 0 {
            tracing::warn!(
                mode = mode.as_str(),
                "No usable search providers, cycle will find nothing"
            );
        }

        let mut counters = RunCounters::default();
        let available = self.pending_queries(mode, &mut counters).await;
        let selected = self.selector.select(self.queries_per_cycle, &available);
        let scorer = Scorer::new(mode.policy(), &self.scoring);

        let mut seen_this_cycle: HashSet<String> = HashSet::new();
        let mut leads_per_domain: HashMap<String, u32> = HashMap::new();
        let mut issued = Vec::with_capacity(selected.len());

        for template in &selected {
            let outcome = self
                .run_query(
                    mode,
                    template,
                    &run_id,
                    &scorer,
                    &source_bonus,
                    &mut seen_this_cycle,
                    &mut leads_per_domain,
                    &mut counters,
                )
                .await;
            self.feedback.record_query(&template.text, &outcome).await;
            issued.push(template.text.clone());
        }

        if !issued.is_empty() {
            if let Err(e) = self.store.mark_queries_done_batch(&issued, &run_id).await {
                tracing::warn!(error = %e, "Failed to mark queries done");
                counters.errors += 1;
            }
        }

        self.store.finish_run(&run_id, &counters).await?;
        tracing::info!(
            run_id = %run_id,
            queries = counters.queries,
            candidates = counters.candidates,
            pages_fetched = counters.pages_fetched,
            leads_found = counters.leads_found,
            leads_accepted = counters.leads_accepted,
            leads_created = counters.leads_created,
            leads_updated = counters.leads_updated,
            errors = counters.errors,
            "Discovery cycle finished"
        );

        Ok(CycleSummary {
            run_id,
            mode,
            queries: issued,
            counters,
        })
    }

    /// Catalog queries for `mode` that are outside their freshness window.
    async fn pending_queries(
        &self,
        mode: RunMode,
        counters: &mut RunCounters,
    ) -> Vec<QueryTemplate> {
        let mut pending = Vec::new();
        for template in self.catalog.queries_for(mode) {
            match self.store.is_query_done(&template.text).await {
                Ok(true) => {
                    tracing::debug!(query = %template.text, "Query still fresh, skipping");
                }
                Ok(false) => pending.push(template),
                Err(e) => {
                    tracing::warn!(query = %template.text, error = %e, "Query lookup failed");
                    counters.errors += 1;
                    pending.push(template);
                }
            }
        }
        pending
    }

    /// Canonical, unseen, non-blacklisted URLs from a search, best first.
    async fn candidate_urls(
        &self,
        urls: Vec<String>,
        source_bonus: &HashMap<String, i32>,
        seen_this_cycle: &mut HashSet<String>,
        counters: &mut RunCounters,
    ) -> Vec<RankedUrl> {
        let mut fresh = Vec::new();
        for raw in urls {
            let Some(url) = normalize_url(&raw) else {
                continue;
            };
            let Some(domain) = domain_of(&url) else {
                continue;
            };
            if self.catalog.is_blacklisted(&domain) {
                tracing::debug!(url = %url, "Blacklisted domain, skipping");
                continue;
            }
            if !seen_this_cycle.insert(url.clone()) {
                continue;
            }
            match self.store.is_url_seen(&url).await {
                Ok(false) => fresh.push(url),
                Ok(true) => tracing::debug!(url = %url, "Already processed, skipping"),
                Err(e) => {
                    // Unknown state: skip rather than risk a second visit.
                    tracing::warn!(url = %url, error = %e, "Seen lookup failed, skipping");
                    counters.errors += 1;
                }
            }
        }

        let allowlisted: HashSet<String> = fresh
            .iter()
            .filter_map(|url| domain_of(url))
            .filter(|domain| self.catalog.is_allowlisted(domain))
            .collect();
        let mut bonus = source_bonus.clone();
        for domain in allowlisted {
            *bonus.entry(domain).or_insert(0) += ALLOWLIST_BONUS;
        }

        let mut ranked = rank_urls(&fresh, &bonus);
        ranked.truncate(self.max_urls_per_query);
        ranked
    }

    /// Issue one query and process its pages.
    #[allow(clippy::too_many_arguments)]
    async fn run_query(
        &mut self,
        mode: RunMode,
        template: &QueryTemplate,
        run_id: &RunId,
        scorer: &Scorer,
        source_bonus: &HashMap<String, i32>,
        seen_this_cycle: &mut HashSet<String>,
        leads_per_domain: &mut HashMap<String, u32>,
        counters: &mut RunCounters,
    ) -> QueryOutcome {
        counters.queries += 1;
        let search = self.providers.search(&template.text, mode).await;
        counters.candidates += search.candidates.len() as u64;
        counters.errors += search.error_count() as u64;

        let urls = search.candidates.into_iter().map(|c| c.url).collect();
        let ranked = self
            .candidate_urls(urls, source_bonus, seen_this_cycle, counters)
            .await;
        tracing::info!(
            query = %template.text,
            urls = ranked.len(),
            "Processing ranked URLs"
        );

        let worker = PageWorker {
            fetcher: self.fetcher.as_ref(),
            extractor: &self.extractor,
            scorer,
            catalog: &self.catalog,
            revealer: self.revealer.as_deref(),
        };

        let mut futures = FuturesUnordered::new();
        let mut results = Vec::with_capacity(ranked.len());
        for ranked_url in ranked {
            // Wait for a slot before starting the next page
            while futures.len() >= self.max_concurrent_pages {
                if let Some(result) = futures.next().await {
                    results.push(result);
                }
            }
            futures.push(worker.process(ranked_url));
        }
        while let Some(result) = futures.next().await {
            results.push(result);
        }

        // Handle pages in ranked order regardless of completion order.
        results.sort_by_key(|r: &PageResult| (std::cmp::Reverse(r.ranked.score), r.ranked.order));

        let mut outcome = QueryOutcome::default();
        let mut attempted = Vec::with_capacity(results.len());
        for result in results {
            attempted.push(result.ranked.url.clone());
            let page_outcome = self
                .handle_page(&result, template, leads_per_domain, counters)
                .await;
            outcome.absorb(&page_outcome);
        }

        if !attempted.is_empty() {
            if let Err(e) = self.store.mark_urls_seen_batch(&attempted, run_id).await {
                tracing::warn!(query = %template.text, error = %e, "Failed to mark URLs seen");
                counters.errors += 1;
            }
        }

        tracing::info!(
            query = %template.text,
            leads_found = outcome.leads_found,
            accepted = outcome.accepted,
            "Query finished"
        );
        outcome
    }

    /// Persist the accepted contacts of one page and record feedback.
    async fn handle_page(
        &self,
        result: &PageResult,
        template: &QueryTemplate,
        leads_per_domain: &mut HashMap<String, u32>,
        counters: &mut RunCounters,
    ) -> QueryOutcome {
        let ranked = &result.ranked;
        if !result.fetched {
            counters.errors += 1;
            return QueryOutcome::default();
        }
        counters.pages_fetched += 1;

        let mut outcome = QueryOutcome::default();
        for scored in &result.contacts {
            outcome.leads_found += 1;
            let has_phone = scored.contact.phone.is_some() || scored.contact.whatsapp.is_some();
            if has_phone {
                outcome.leads_with_phone += 1;
            }

            let persisted = scored.card.accepted
                && self
                    .persist(scored, ranked, template, leads_per_domain, counters)
                    .await;
            if persisted {
                outcome.accepted += 1;
            }
            self.feedback
                .record_pattern(scored.contact.pattern, persisted)
                .await;
        }

        counters.leads_found += outcome.leads_found;
        counters.leads_accepted += outcome.accepted;
        self.feedback
            .record_page(&ranked.domain, outcome.leads_found, outcome.leads_with_phone)
            .await;
        outcome
    }

    /// Upsert one accepted contact. Returns whether a lead was written.
    async fn persist(
        &self,
        scored: &ScoredContact,
        ranked: &RankedUrl,
        template: &QueryTemplate,
        leads_per_domain: &mut HashMap<String, u32>,
        counters: &mut RunCounters,
    ) -> bool {
        let cap = self.scoring.max_leads_per_domain;
        let taken = leads_per_domain.entry(ranked.domain.clone()).or_insert(0);
        if cap > 0 && *taken >= cap {
            tracing::debug!(domain = %ranked.domain, cap, "Per-domain lead cap reached");
            return false;
        }

        let lead = build_lead(scored, &ranked.url, template);
        if !lead.has_contact_key() {
            tracing::debug!(url = %ranked.url, "Contact has no usable email or phone");
            return false;
        }

        match self.store.upsert_lead(&lead).await {
            Ok(upsert) => {
                *taken += 1;
                if upsert.created {
                    counters.leads_created += 1;
                } else {
                    counters.leads_updated += 1;
                }
                tracing::info!(
                    lead_id = upsert.id,
                    created = upsert.created,
                    url = %ranked.url,
                    score = lead.score,
                    "Lead stored"
                );
                true
            }
            Err(e) => {
                tracing::warn!(url = %ranked.url, error = %e, "Failed to store lead, dropping");
                counters.errors += 1;
                false
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use prospector_core::{Party, SearchStatus};
    use prospector_extract::ExtractionPattern;

    fn contact() -> ExtractedContact {
        ExtractedContact {
            name: Some("Thomas Weber".into()),
            email: Some("t.weber@weber-vertrieb.de".into()),
            phone: Some("0211".into()),
            phone_valid: false,
            whatsapp: Some("+491701234567".into()),
            role: Some("Vertriebsleiter".into()),
            company: None,
            pattern: ExtractionPattern::ContextMarker,
            from_contact_page: true,
            context: String::new(),
        }
    }

    fn card() -> ScoreCard {
        ScoreCard {
            score: 55,
            labels: vec!["phone".into()],
            classification: prospector_core::LeadClassification {
                party: Party::Candidate,
                status: SearchStatus::Unknown,
            },
            industries: vec!["insurance".into()],
            signals: Vec::new(),
            accepted: true,
        }
    }

    #[test]
    fn test_build_lead_prefers_valid_phone_then_whatsapp() {
        let template = QueryTemplate {
            text: "vertrieb düsseldorf".into(),
            modes: Vec::new(),
            tags: vec!["nrw".into()],
            region: Some("Düsseldorf".into()),
            priority: 5,
        };
        let scored = ScoredContact {
            contact: contact(),
            card: card(),
        };
        let lead = build_lead(&scored, "https://weber-vertrieb.de/kontakt", &template);

        assert_eq!(lead.phone.as_deref(), Some("+491701234567"));
        assert_eq!(lead.region.as_deref(), Some("Düsseldorf"));
        assert_eq!(lead.tags, vec!["nrw", "context_marker"]);
        assert_eq!(lead.industries, vec!["insurance"]);
        assert_eq!(lead.score, 55);
        assert!(lead.quality.email_personal);
        assert!(lead.quality.name_plausible);
        assert!(lead.quality.whatsapp);
        assert!(!lead.quality.phone_valid);

        let mut valid = scored.clone();
        valid.contact.phone = Some("+49211123456".into());
        valid.contact.phone_valid = true;
        let lead = build_lead(&valid, "https://weber-vertrieb.de/kontakt", &template);
        assert_eq!(lead.phone.as_deref(), Some("+49211123456"));
    }
}
