//! End-to-end discovery cycles against stub providers and pages.

use async_trait::async_trait;
use chrono::Utc;
use prospector_catalog::{Catalog, CatalogRegistry, DomainLists, QueryTemplate};
use prospector_core::{RunMode, ScoringConfig, SelectorConfig};
use prospector_db::{LeadStore, MemoryStore};
use prospector_fetch::{ContentKind, FetchedPage, PageFetcher};
use prospector_scanner::{DiscoveryOrchestrator, PhoneRevealer, QuerySelector};
use prospector_search::{
    Candidate, ProviderKind, ProviderSet, QueryCache, RotationState, SearchOutcome,
    SearchProvider, SearchRequest,
};
use rand::rngs::StdRng;
use rand::SeedableRng;
use std::collections::HashMap;
use std::sync::{Arc, Mutex};
use tokio_util::sync::CancellationToken;

const E2E_URL: &str = "https://www.weber-vertrieb.de/kontakt";
const E2E_TEXT: &str = "Vertriebsleiter Thomas Weber, Tel: 0211 / 12 34 56";

struct StubSearch {
    urls: Vec<String>,
}

#[async_trait]
impl SearchProvider for StubSearch {
    fn kind(&self) -> ProviderKind {
        ProviderKind::WebSearch
    }

    fn label(&self) -> &str {
        "stub"
    }

    fn is_configured(&self) -> bool {
        true
    }

    async fn search(
        &self,
        _request: &SearchRequest,
        _rotation: &mut RotationState,
    ) -> SearchOutcome {
        SearchOutcome::completed(
            self.urls
                .iter()
                .map(|u| Candidate::new(u.clone(), None, ProviderKind::WebSearch))
                .collect(),
        )
    }
}

#[derive(Default)]
struct StubFetcher {
    pages: HashMap<String, String>,
    fetched: Mutex<Vec<String>>,
}

impl StubFetcher {
    fn with_pages(pages: &[(&str, &str)]) -> Self {
        Self {
            pages: pages
                .iter()
                .map(|(u, b)| ((*u).to_string(), (*b).to_string()))
                .collect(),
            fetched: Mutex::default(),
        }
    }

    fn fetched(&self) -> Vec<String> {
        self.fetched.lock().expect("lock").clone()
    }
}

#[async_trait]
impl PageFetcher for StubFetcher {
    async fn fetch(&self, url: &str) -> Option<FetchedPage> {
        self.fetched.lock().expect("lock").push(url.to_string());
        let body = self.pages.get(url)?;
        Some(FetchedPage {
            url: url.to_string(),
            final_url: url.to_string(),
            status: 200,
            kind: ContentKind::Text,
            body: body.clone(),
            fetched_at: Utc::now(),
        })
    }
}

fn query(text: &str) -> QueryTemplate {
    QueryTemplate {
        text: text.to_string(),
        modes: Vec::new(),
        tags: vec!["vertrieb".into()],
        region: Some("Düsseldorf".into()),
        priority: 5,
    }
}

fn catalog(queries: &[&str], domains: DomainLists) -> CatalogRegistry {
    CatalogRegistry::from_catalog(Catalog {
        queries: queries.iter().map(|q| query(q)).collect(),
        portals: Vec::new(),
        domains,
    })
}

fn providers(urls: &[&str]) -> ProviderSet {
    let mut set = ProviderSet::new(QueryCache::with_ttl_hours(0));
    set.add_provider(Box::new(StubSearch {
        urls: urls.iter().map(|u| (*u).to_string()).collect(),
    }));
    set
}

fn orchestrator(
    store: Arc<MemoryStore>,
    catalog: CatalogRegistry,
    providers: ProviderSet,
    fetcher: Arc<StubFetcher>,
) -> DiscoveryOrchestrator {
    let selector = QuerySelector::with_rng(&SelectorConfig::default(), StdRng::seed_from_u64(11));
    DiscoveryOrchestrator::new(store, catalog, providers, fetcher).with_selector(selector)
}

#[tokio::test]
async fn test_contact_page_yields_exactly_one_lead() {
    let store = Arc::new(MemoryStore::new());
    let fetcher = Arc::new(StubFetcher::with_pages(&[(E2E_URL, E2E_TEXT)]));
    let mut orchestrator = orchestrator(
        store.clone(),
        catalog(&["vertriebsleiter düsseldorf kontakt"], DomainLists::default()),
        providers(&[&format!("{E2E_URL}?utm_source=newsletter#team")]),
        fetcher.clone(),
    );

    let cycle = orchestrator
        .run_cycle(RunMode::JobSeekers)
        .await
        .expect("cycle");

    let leads = store.leads().await;
    assert_eq!(leads.len(), 1);
    let lead = &leads[0].lead;
    assert_eq!(lead.phone.as_deref(), Some("+49211123456"));
    assert!(lead.phone.as_deref().is_some_and(|p| p.starts_with("+49211")));
    assert_eq!(lead.name.as_deref(), Some("Thomas Weber"));
    assert!(lead.score >= ScoringConfig::default().min_score);
    assert_eq!(lead.source_url, E2E_URL);
    assert_eq!(lead.region.as_deref(), Some("Düsseldorf"));
    assert!(lead.quality.phone_valid);

    assert_eq!(fetcher.fetched(), vec![E2E_URL.to_string()]);
    assert_eq!(cycle.counters.queries, 1);
    assert_eq!(cycle.counters.pages_fetched, 1);
    assert_eq!(cycle.counters.leads_created, 1);
    assert_eq!(cycle.counters.errors, 0);

    assert!(store.is_url_seen(E2E_URL).await.expect("seen"));
    assert!(store
        .is_query_done("vertriebsleiter düsseldorf kontakt")
        .await
        .expect("done"));
    let run = store
        .get_run(&cycle.run_id)
        .await
        .expect("get run")
        .expect("run exists");
    assert!(run.finished_at.is_some());
    assert_eq!(run.counters, cycle.counters);

    let dorks = store.get_top_dorks(10).await.expect("dorks");
    assert_eq!(dorks.len(), 1);
    assert_eq!(dorks[0].accepted, 1);
    let sources = store.get_best_sources(10).await.expect("sources");
    assert_eq!(sources[0].domain, "weber-vertrieb.de");
}

#[tokio::test]
async fn test_seen_url_is_never_fetched_again() {
    let store = Arc::new(MemoryStore::new());
    let fetcher = Arc::new(StubFetcher::with_pages(&[(E2E_URL, E2E_TEXT)]));

    let mut first = orchestrator(
        store.clone(),
        catalog(&["erste suche"], DomainLists::default()),
        providers(&[E2E_URL]),
        fetcher.clone(),
    );
    first.run_cycle(RunMode::JobSeekers).await.expect("first cycle");

    // A different query surfacing the same page in a later run.
    let mut second = orchestrator(
        store.clone(),
        catalog(&["zweite suche"], DomainLists::default()),
        providers(&[E2E_URL, "https://www.weber-vertrieb.de/kontakt#anfahrt"]),
        fetcher.clone(),
    );
    let cycle = second
        .run_cycle(RunMode::JobSeekers)
        .await
        .expect("second cycle");

    assert_eq!(fetcher.fetched().len(), 1);
    assert_eq!(cycle.counters.pages_fetched, 0);
    assert_eq!(store.count_leads().await.expect("count"), 1);
}

#[tokio::test]
async fn test_zero_providers_complete_with_zero_leads() {
    let store = Arc::new(MemoryStore::new());
    let fetcher = Arc::new(StubFetcher::default());
    let mut orchestrator = orchestrator(
        store.clone(),
        catalog(&["vertrieb köln"], DomainLists::default()),
        ProviderSet::new(QueryCache::with_ttl_hours(0)),
        fetcher.clone(),
    );

    let summary = orchestrator
        .run(RunMode::Companies, 1, CancellationToken::new())
        .await
        .expect("run");

    assert_eq!(summary.cycles_completed, 1);
    assert!(!summary.cancelled);
    assert_eq!(summary.counters.candidates, 0);
    assert_eq!(summary.counters.leads_created, 0);
    assert!(fetcher.fetched().is_empty());
    assert_eq!(store.count_leads().await.expect("count"), 0);
}

#[tokio::test]
async fn test_cancelled_run_starts_no_cycle() {
    let store = Arc::new(MemoryStore::new());
    let fetcher = Arc::new(StubFetcher::with_pages(&[(E2E_URL, E2E_TEXT)]));
    let mut orchestrator = orchestrator(
        store.clone(),
        catalog(&["vertrieb"], DomainLists::default()),
        providers(&[E2E_URL]),
        fetcher.clone(),
    );

    let cancel = CancellationToken::new();
    cancel.cancel();
    let summary = orchestrator
        .run(RunMode::JobSeekers, 3, cancel)
        .await
        .expect("run");

    assert!(summary.cancelled);
    assert_eq!(summary.cycles_completed, 0);
    assert!(summary.run_ids.is_empty());
    assert!(fetcher.fetched().is_empty());
}

#[tokio::test(start_paused = true)]
async fn test_fresh_queries_are_not_reissued_next_cycle() {
    let store = Arc::new(MemoryStore::new());
    let fetcher = Arc::new(StubFetcher::with_pages(&[(E2E_URL, E2E_TEXT)]));
    let mut orchestrator = orchestrator(
        store.clone(),
        catalog(&["vertrieb düsseldorf"], DomainLists::default()),
        providers(&[E2E_URL]),
        fetcher.clone(),
    )
    .with_pause(std::time::Duration::from_secs(30));

    let summary = orchestrator
        .run(RunMode::JobSeekers, 2, CancellationToken::new())
        .await
        .expect("run");

    assert_eq!(summary.cycles_completed, 2);
    assert_eq!(summary.run_ids.len(), 2);
    assert_eq!(summary.counters.queries, 1);
    assert_eq!(summary.counters.leads_created, 1);
}

#[tokio::test]
async fn test_blacklisted_domains_are_not_fetched() {
    let store = Arc::new(MemoryStore::new());
    let fetcher = Arc::new(StubFetcher::with_pages(&[(E2E_URL, E2E_TEXT)]));
    let domains = DomainLists {
        blacklist: vec!["weber-vertrieb.de".into()],
        ..DomainLists::default()
    };
    let mut orchestrator = orchestrator(
        store.clone(),
        catalog(&["vertrieb"], domains),
        providers(&[E2E_URL]),
        fetcher.clone(),
    );

    orchestrator
        .run_cycle(RunMode::JobSeekers)
        .await
        .expect("cycle");
    assert!(fetcher.fetched().is_empty());
    assert_eq!(store.count_leads().await.expect("count"), 0);
}

#[tokio::test]
async fn test_leads_per_domain_are_capped() {
    let pages = [
        (
            "https://vertrieb-nrw.de/kontakt",
            "Vertriebsleiter Thomas Weber, Tel: 0211 / 12 34 56",
        ),
        (
            "https://vertrieb-nrw.de/standort/kontakt",
            "Vertriebsleiter Stefan Krause, Tel: 0211 / 65 43 21",
        ),
        (
            "https://vertrieb-nrw.de/bonn/kontakt",
            "Vertriebsleiter Jonas Becker, Tel: 0228 / 98 76 54",
        ),
    ];
    let store = Arc::new(MemoryStore::new());
    let fetcher = Arc::new(StubFetcher::with_pages(&pages));
    let urls: Vec<&str> = pages.iter().map(|(u, _)| *u).collect();
    let mut orchestrator = orchestrator(
        store.clone(),
        catalog(&["vertriebsleiter nrw"], DomainLists::default()),
        providers(&urls),
        fetcher.clone(),
    )
    .with_scoring(ScoringConfig {
        max_leads_per_domain: 2,
        ..ScoringConfig::default()
    });

    let cycle = orchestrator
        .run_cycle(RunMode::JobSeekers)
        .await
        .expect("cycle");

    assert_eq!(fetcher.fetched().len(), 3);
    assert_eq!(cycle.counters.leads_found, 3);
    assert_eq!(cycle.counters.leads_created, 2);
    assert_eq!(store.count_leads().await.expect("count"), 2);
    assert_eq!(store.seen_urls().await.len(), 3);
}

struct RevealingStub;

#[async_trait]
impl PhoneRevealer for RevealingStub {
    async fn reveal(&self, _url: &str) -> Option<String> {
        Some("Vertriebsleiter Thomas Weber, Tel: 0211 / 12 34 56".into())
    }
}

#[tokio::test]
async fn test_reveal_fallback_only_for_reveal_hosts() {
    let hidden_url = "https://kleinanzeigen.example/anzeige/vertrieb";
    let hidden_text = "Vertriebsleiter Thomas Weber sucht neue Herausforderung. Nummer anzeigen";
    let domains = DomainLists {
        reveal_hosts: vec!["kleinanzeigen.example".into()],
        ..DomainLists::default()
    };

    let store = Arc::new(MemoryStore::new());
    let fetcher = Arc::new(StubFetcher::with_pages(&[(hidden_url, hidden_text)]));
    let mut orchestrator = orchestrator(
        store.clone(),
        catalog(&["vertrieb anzeige"], domains),
        providers(&[hidden_url]),
        fetcher.clone(),
    )
    .with_revealer(Arc::new(RevealingStub));

    orchestrator
        .run_cycle(RunMode::JobSeekers)
        .await
        .expect("cycle");

    let leads = store.leads().await;
    assert_eq!(leads.len(), 1);
    assert_eq!(leads[0].lead.phone.as_deref(), Some("+49211123456"));
}
