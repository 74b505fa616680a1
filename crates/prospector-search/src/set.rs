//! Provider registry and aggregation.
//!
//! [`ProviderSet`] holds one slot per [`ProviderKind`] plus one slot per
//! portal crawler. Each slot owns the provider's [`RotationState`], so
//! credential rotation survives across queries without hidden globals.
//!
//! Chain per query:
//! 1. the indexed-search API, when configured and not exhausted;
//! 2. the secondary API, only when the primary is unconfigured or exhausted;
//! 3. keyless web search, only when the API chain produced no candidates;
//! 4. every portal crawler serving the mode.

use crate::cache::QueryCache;
use crate::error::Result;
use crate::provider::{
    push_unique, Candidate, Freshness, OutcomeStatus, ProviderKind, RotationState, SearchOutcome,
    SearchProvider, SearchRequest,
};
use crate::providers::{
    common::build_html_client, BraveSearchProvider, DuckDuckGoProvider, GoogleSearchProvider,
    PortalCrawler,
};
use prospector_catalog::PortalDefinition;
use prospector_core::{RunMode, SearchConfig};
use std::collections::HashSet;
use tracing::{debug, info, warn};

struct Slot {
    provider: Box<dyn SearchProvider>,
    rotation: RotationState,
    exhausted: bool,
}

impl Slot {
    fn new(provider: Box<dyn SearchProvider>) -> Self {
        Self {
            provider,
            rotation: RotationState::new(),
            exhausted: false,
        }
    }

    fn available(&self) -> bool {
        self.provider.is_configured() && !self.exhausted
    }
}

/// Status reported by one provider for one query.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ProviderReport {
    /// Provider label
    pub provider: String,
    /// Provider kind
    pub kind: ProviderKind,
    /// How the call ended
    pub status: OutcomeStatus,
    /// Candidates returned (before cross-provider dedup)
    pub returned: usize,
    /// Whether the result came from the query cache
    pub cached: bool,
}

/// Aggregated result of one query across the provider chain.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct SetOutcome {
    /// Candidates in provider order, deduplicated by URL
    pub candidates: Vec<Candidate>,
    /// One report per provider consulted
    pub reports: Vec<ProviderReport>,
}

impl SetOutcome {
    /// Number of providers that ended in an error.
    #[must_use]
    pub fn error_count(&self) -> usize {
        self.reports
            .iter()
            .filter(|r| matches!(r.status, OutcomeStatus::Errored(_)))
            .count()
    }
}

/// All search providers of a run.
pub struct ProviderSet {
    primary: Option<Slot>,
    secondary: Option<Slot>,
    web: Option<Slot>,
    portals: Vec<Slot>,
    cache: QueryCache,
    max_pages: u32,
    max_results: usize,
    freshness: Option<Freshness>,
}

impl ProviderSet {
    /// Create an empty set.
    #[must_use]
    pub fn new(cache: QueryCache) -> Self {
        Self {
            primary: None,
            secondary: None,
            web: None,
            portals: Vec::new(),
            cache,
            max_pages: 3,
            max_results: 30,
            freshness: None,
        }
    }

    /// Build every provider the configuration enables.
    ///
    /// A portal whose selector doesn't parse is skipped with a warning.
    pub fn from_config(config: &SearchConfig, portals: Vec<PortalDefinition>) -> Result<Self> {
        let mut set = Self::new(QueryCache::with_ttl_hours(config.query_cache_ttl_hours));
        set.max_pages = config.max_pages_per_provider.max(1);
        set.max_results =
            (config.max_pages_per_provider.max(1) * config.results_per_page.max(1)) as usize;
        set.freshness = match config.freshness.as_deref() {
            None => None,
            Some(raw) => {
                let parsed = Freshness::parse(raw);
                if parsed.is_none() {
                    warn!(value = raw, "ignoring unknown freshness hint");
                }
                parsed
            }
        };

        set.add_provider(Box::new(
            GoogleSearchProvider::new(config.google_credentials.clone(), config.timeout_secs)?
                .with_page_size(config.results_per_page),
        ));
        set.add_provider(Box::new(
            BraveSearchProvider::new(config.brave_api_keys.clone(), config.timeout_secs)?
                .with_page_size(config.results_per_page),
        ));
        set.add_provider(Box::new(DuckDuckGoProvider::new(
            config.duckduckgo_enabled,
            config.timeout_secs,
            config.proxy_url.as_deref(),
            config.direct_connection,
        )?));

        if config.portals_enabled {
            let client = build_html_client(config.timeout_secs, None, config.direct_connection)?;
            for definition in portals {
                let id = definition.id().clone();
                match PortalCrawler::new(definition, client.clone()) {
                    Ok(crawler) => set.add_provider(Box::new(crawler)),
                    Err(e) => warn!(portal = %id, error = %e, "skipping portal"),
                }
            }
        }

        Ok(set)
    }

    /// Register a provider in the slot for its kind.
    ///
    /// A second API or web-search provider replaces the first; portals
    /// accumulate.
    pub fn add_provider(&mut self, provider: Box<dyn SearchProvider>) {
        let slot = Slot::new(provider);
        match slot.provider.kind() {
            ProviderKind::IndexedApi => self.primary = Some(slot),
            ProviderKind::SecondaryApi => self.secondary = Some(slot),
            ProviderKind::WebSearch => self.web = Some(slot),
            ProviderKind::Portal => self.portals.push(slot),
        }
    }

    /// Override the per-query page and result caps.
    #[must_use]
    pub fn with_limits(mut self, max_pages: u32, max_results: usize) -> Self {
        self.max_pages = max_pages.max(1);
        self.max_results = max_results.max(1);
        self
    }

    /// Number of configured providers, portals included.
    #[must_use]
    pub fn usable_count(&self) -> usize {
        self.slots().filter(|s| s.provider.is_configured()).count()
    }

    /// Labels of configured providers.
    #[must_use]
    pub fn usable_labels(&self) -> Vec<String> {
        self.slots()
            .filter(|s| s.provider.is_configured())
            .map(|s| s.provider.label().to_string())
            .collect()
    }

    /// Forget exhaustion marks, e.g. when a new quota period starts.
    pub fn reset_rotation(&mut self) {
        for slot in self.slots_mut() {
            slot.rotation.reset();
            slot.exhausted = false;
        }
    }

    fn slots(&self) -> impl Iterator<Item = &Slot> {
        self.primary
            .iter()
            .chain(self.secondary.iter())
            .chain(self.web.iter())
            .chain(self.portals.iter())
    }

    fn slots_mut(&mut self) -> impl Iterator<Item = &mut Slot> {
        self.primary
            .iter_mut()
            .chain(self.secondary.iter_mut())
            .chain(self.web.iter_mut())
            .chain(self.portals.iter_mut())
    }

    /// Run one query through the provider chain.
    pub async fn search(&mut self, query: &str, mode: RunMode) -> SetOutcome {
        let purged = self.cache.purge_expired();
        if purged > 0 {
            debug!(purged, "expired query cache entries dropped");
        }
        let request = SearchRequest::new(query)
            .with_max_pages(self.max_pages)
            .with_max_results(self.max_results)
            .with_freshness(self.freshness);

        let mut out = SetOutcome::default();
        let mut seen = HashSet::new();

        let mut api_found = 0;
        if let Some(slot) = self.primary.as_mut().filter(|s| s.available()) {
            api_found += run_slot(slot, &mut self.cache, &request, &mut out, &mut seen).await;
        }

        let primary_usable = self.primary.as_ref().is_some_and(Slot::available);
        if !primary_usable {
            if let Some(slot) = self.secondary.as_mut().filter(|s| s.available()) {
                api_found += run_slot(slot, &mut self.cache, &request, &mut out, &mut seen).await;
            }
        }

        if api_found == 0 {
            if let Some(slot) = self.web.as_mut().filter(|s| s.available()) {
                run_slot(slot, &mut self.cache, &request, &mut out, &mut seen).await;
            }
        }

        for slot in self
            .portals
            .iter_mut()
            .filter(|s| s.available() && s.provider.serves(mode))
        {
            run_slot(slot, &mut self.cache, &request, &mut out, &mut seen).await;
        }

        if out.reports.is_empty() {
            info!(query, "no usable search provider for query");
        }
        debug!(
            query,
            candidates = out.candidates.len(),
            providers = out.reports.len(),
            "query searched"
        );
        out
    }
}

/// Run one provider, consulting the cache first. Returns how many new
/// candidates it contributed.
async fn run_slot(
    slot: &mut Slot,
    cache: &mut QueryCache,
    request: &SearchRequest,
    out: &mut SetOutcome,
    seen: &mut HashSet<String>,
) -> usize {
    let label = slot.provider.label().to_string();
    let kind = slot.provider.kind();
    let cache_query = if slot.provider.uses_query() { request.query.as_str() } else { "" };

    let (outcome, cached) = match cache.get(&label, cache_query) {
        Some(candidates) => (SearchOutcome::completed(candidates), true),
        None => (slot.provider.search(request, &mut slot.rotation).await, false),
    };

    if outcome.is_exhausted() {
        slot.exhausted = true;
    }
    if !cached && outcome.status == OutcomeStatus::Completed {
        cache.insert(&label, cache_query, outcome.candidates.clone());
    }

    let returned = outcome.candidates.len();
    let mut added = 0;
    for candidate in outcome.candidates {
        if push_unique(&mut out.candidates, seen, candidate) {
            added += 1;
        }
    }
    out.reports.push(ProviderReport {
        provider: label,
        kind,
        status: outcome.status,
        returned,
        cached,
    });
    added
}
