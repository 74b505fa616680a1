//! Behaviour every `LeadStore` backend must share.

use prospector_core::{Lead, Party, RunId, RunMode};
use prospector_db::{
    LeadStore, MemoryStore, PostgresStore, Retention, RunCounters, SqliteStore, StoreError,
};
use std::sync::Arc;

fn lead(url: &str) -> Lead {
    Lead::new(url)
}

async fn backends() -> Vec<Arc<dyn LeadStore>> {
    let sqlite = SqliteStore::in_memory().await.expect("open sqlite store");
    vec![Arc::new(sqlite), Arc::new(MemoryStore::new())]
}

async fn idempotent_by_email(store: &dyn LeadStore) {
    let mut first = lead("https://a.example/kontakt");
    first.email = Some("Thomas.Weber@Firma.de".into());
    first.name = Some("Thomas Weber".into());
    first.score = 45;

    let mut second = lead("https://b.example/team");
    second.email = Some("thomas.weber@firma.de ".into());
    second.phone = Some("+49211123456".into());
    second.score = 60;
    second.classification.party = Party::Candidate;

    let a = store.upsert_lead(&first).await.expect("first upsert");
    let b = store.upsert_lead(&second).await.expect("second upsert");

    assert!(a.created, "{}", store.backend_name());
    assert!(!b.created, "{}", store.backend_name());
    assert_eq!(a.id, b.id);
    assert_eq!(store.count_leads().await.expect("count"), 1);

    let stored = store
        .find_lead_by_email("THOMAS.WEBER@firma.de")
        .await
        .expect("find")
        .expect("lead exists");
    assert_eq!(stored.lead.name.as_deref(), Some("Thomas Weber"));
    assert_eq!(stored.lead.phone.as_deref(), Some("+49211123456"));
    assert_eq!(stored.lead.score, 60);
    assert_eq!(stored.lead.classification.party, Party::Candidate);

    let by_phone = store
        .find_lead_by_phone("+49211123456")
        .await
        .expect("find by phone")
        .expect("lead exists");
    assert_eq!(by_phone.id, a.id);
}

async fn idempotent_by_phone(store: &dyn LeadStore) {
    let mut first = lead("https://c.example/impressum");
    first.phone = Some("+4930555666".into());
    let mut second = lead("https://c.example/kontakt");
    second.phone = Some("+4930555666".into());
    second.company = Some("Vertrieb GmbH".into());

    let a = store.upsert_lead(&first).await.expect("first upsert");
    let b = store.upsert_lead(&second).await.expect("second upsert");
    assert_eq!(a.id, b.id);
    assert!(!b.created);

    let stored = store
        .find_lead_by_phone("+4930555666")
        .await
        .expect("find")
        .expect("lead exists");
    assert_eq!(stored.lead.company.as_deref(), Some("Vertrieb GmbH"));
}

async fn phone_spellings_share_one_lead(store: &dyn LeadStore) {
    let mut spaced = lead("https://f.example/kontakt");
    spaced.phone = Some("+49 89 765 4321".into());
    let mut compact = lead("https://f.example/team");
    compact.phone = Some("+49897654321".into());
    compact.name = Some("Petra Schulz".into());

    let a = store.upsert_lead(&spaced).await.expect("first upsert");
    let b = store.upsert_lead(&compact).await.expect("second upsert");
    assert_eq!(a.id, b.id, "{}", store.backend_name());
    assert!(!b.created);

    let stored = store
        .find_lead_by_phone("0049 89 7654321")
        .await
        .expect("find")
        .expect("lead exists");
    assert_eq!(stored.id, a.id);
    assert_eq!(stored.lead.phone.as_deref(), Some("+49897654321"));
    assert_eq!(stored.lead.name.as_deref(), Some("Petra Schulz"));
}

async fn phone_of_other_lead_is_not_stolen(store: &dyn LeadStore) {
    let mut by_mail = lead("https://d.example/a");
    by_mail.email = Some("anna@d.example".into());
    let mut by_phone = lead("https://d.example/b");
    by_phone.phone = Some("+4940111222".into());
    let mail_id = store.upsert_lead(&by_mail).await.expect("upsert").id;
    let phone_id = store.upsert_lead(&by_phone).await.expect("upsert").id;

    let mut both = lead("https://d.example/c");
    both.email = Some("anna@d.example".into());
    both.phone = Some("+4940111222".into());
    let outcome = store.upsert_lead(&both).await.expect("upsert both");

    assert_eq!(outcome.id, mail_id);
    let mail_lead = store
        .find_lead_by_email("anna@d.example")
        .await
        .expect("find")
        .expect("exists");
    assert!(mail_lead.lead.phone.is_none());
    let phone_lead = store
        .find_lead_by_phone("+4940111222")
        .await
        .expect("find")
        .expect("exists");
    assert_eq!(phone_lead.id, phone_id);
}

async fn lead_without_keys_is_rejected(store: &dyn LeadStore) {
    let result = store.upsert_lead(&lead("https://e.example/")).await;
    assert!(matches!(result, Err(StoreError::Invalid(_))));
}

async fn urls_seen(store: &dyn LeadStore) {
    let run = store.start_run(RunMode::JobSeekers).await.expect("start run");
    let urls = vec![
        "https://a.example/kontakt".to_string(),
        "https://a.example/team".to_string(),
    ];
    assert!(!store.is_url_seen(&urls[0]).await.expect("seen"));

    let written = store.mark_urls_seen_batch(&urls, &run).await.expect("mark");
    assert_eq!(written, 2);
    for url in &urls {
        assert!(store.is_url_seen(url).await.expect("seen"));
    }

    // Re-marking live entries is a no-op, not an error.
    let again = store.mark_urls_seen_batch(&urls, &run).await.expect("mark again");
    assert_eq!(again, 0);
    assert!(!store.is_url_seen("https://a.example/other").await.expect("seen"));
}

async fn queries_done(store: &dyn LeadStore) {
    let run = store.start_run(RunMode::Companies).await.expect("start run");
    assert!(!store.is_query_done("Vertrieb Köln").await.expect("done"));
    store
        .mark_queries_done_batch(&["Vertrieb  Köln".to_string()], &run)
        .await
        .expect("mark");
    assert!(store.is_query_done("vertrieb köln").await.expect("done"));
    assert!(!store.is_query_done("vertrieb bonn").await.expect("done"));
}

async fn performance_counters(store: &dyn LeadStore) {
    for _ in 0..4 {
        store
            .record_dork_usage("weak query", 1, 0, 0)
            .await
            .expect("record");
    }
    for _ in 0..4 {
        store
            .record_dork_usage("strong query", 3, 2, 2)
            .await
            .expect("record");
    }
    let top = store.get_top_dorks(10).await.expect("top dorks");
    assert_eq!(top.len(), 2);
    assert_eq!(top[0].query, "strong query");
    assert_eq!(top[0].uses, 4);
    assert_eq!(top[0].accepted, 8);
    assert_eq!(top[1].leads_found, 4);
    assert_eq!(store.get_top_dorks(1).await.expect("top").len(), 1);

    store.record_source_hit("Firma.de", 2, 1).await.expect("hit");
    store.record_source_hit("firma.de", 0, 0).await.expect("hit");
    store.record_source_hit("leer.de", 0, 0).await.expect("hit");
    let sources = store.get_best_sources(5).await.expect("sources");
    assert_eq!(sources[0].domain, "firma.de");
    assert_eq!(sources[0].hits, 2);
    assert_eq!(sources[0].leads_with_phone, 1);

    store
        .record_pattern_success("title_prefix", true)
        .await
        .expect("pattern");
    store
        .record_pattern_success("title_prefix", false)
        .await
        .expect("pattern");
    store
        .record_pattern_success("capitalization", false)
        .await
        .expect("pattern");
    let patterns = store.get_pattern_stats().await.expect("patterns");
    assert_eq!(patterns[0].pattern, "title_prefix");
    assert_eq!(patterns[0].attempts, 2);
    assert_eq!(patterns[0].successes, 1);

    let removed = store.purge_performance().await.expect("purge");
    assert_eq!(removed, 6);
    assert!(store.get_top_dorks(10).await.expect("top").is_empty());
}

async fn run_lifecycle(store: &dyn LeadStore) {
    let run = store
        .start_run(RunMode::PassiveCandidates)
        .await
        .expect("start");
    let open = store.get_run(&run).await.expect("get").expect("exists");
    assert_eq!(open.mode, RunMode::PassiveCandidates);
    assert!(open.finished_at.is_none());

    let counters = RunCounters {
        queries: 3,
        leads_created: 2,
        ..RunCounters::default()
    };
    store.finish_run(&run, &counters).await.expect("finish");
    let closed = store.get_run(&run).await.expect("get").expect("exists");
    assert!(closed.finished_at.is_some());
    assert_eq!(closed.counters, counters);

    let again = store.finish_run(&run, &RunCounters::default()).await;
    assert!(matches!(again, Err(StoreError::RunClosed(_))));

    let missing = store
        .finish_run(&RunId::generate(), &RunCounters::default())
        .await;
    assert!(matches!(missing, Err(StoreError::NotFound(_))));
}

#[tokio::test]
async fn test_backends_share_semantics() {
    for store in backends().await {
        idempotent_by_email(store.as_ref()).await;
        idempotent_by_phone(store.as_ref()).await;
        phone_spellings_share_one_lead(store.as_ref()).await;
        phone_of_other_lead_is_not_stolen(store.as_ref()).await;
        lead_without_keys_is_rejected(store.as_ref()).await;
        urls_seen(store.as_ref()).await;
        queries_done(store.as_ref()).await;
        performance_counters(store.as_ref()).await;
        run_lifecycle(store.as_ref()).await;
    }
}

#[tokio::test]
async fn test_batch_and_individual_marking_are_equivalent() {
    let urls: Vec<String> = (0..100)
        .map(|i| format!("https://host{}.example/page/{i}", i % 7))
        .collect();

    for (batch_store, single_store) in [
        (
            Arc::new(SqliteStore::in_memory().await.expect("sqlite")) as Arc<dyn LeadStore>,
            Arc::new(SqliteStore::in_memory().await.expect("sqlite")) as Arc<dyn LeadStore>,
        ),
        (
            Arc::new(MemoryStore::new()) as Arc<dyn LeadStore>,
            Arc::new(MemoryStore::new()) as Arc<dyn LeadStore>,
        ),
    ] {
        let run = RunId::generate();
        batch_store
            .mark_urls_seen_batch(&urls, &run)
            .await
            .expect("batch mark");
        for url in &urls {
            single_store
                .mark_urls_seen_batch(std::slice::from_ref(url), &run)
                .await
                .expect("single mark");
        }

        for url in &urls {
            assert!(batch_store.is_url_seen(url).await.expect("seen"));
            assert!(single_store.is_url_seen(url).await.expect("seen"));
        }
    }

    let batch = MemoryStore::new();
    let single = MemoryStore::new();
    let run = RunId::generate();
    batch.mark_urls_seen_batch(&urls, &run).await.expect("mark");
    for url in &urls {
        single
            .mark_urls_seen_batch(std::slice::from_ref(url), &run)
            .await
            .expect("mark");
    }
    assert_eq!(batch.seen_urls().await, single.seen_urls().await);
}

#[tokio::test]
async fn test_concurrent_duplicate_upserts_create_one_lead() {
    for store in backends().await {
        let tasks: Vec<_> = (0..8)
            .map(|i| {
                let store = Arc::clone(&store);
                tokio::spawn(async move {
                    let mut l = lead(&format!("https://race.example/{i}"));
                    l.email = Some("race@firma.de".into());
                    store.upsert_lead(&l).await
                })
            })
            .collect();

        let mut created = 0;
        for task in tasks {
            let outcome = task.await.expect("join").expect("upsert");
            if outcome.created {
                created += 1;
            }
        }
        assert_eq!(created, 1, "{}", store.backend_name());
        assert_eq!(store.count_leads().await.expect("count"), 1);
    }
}

#[tokio::test]
async fn test_zero_retention_expires_immediately() {
    let store = MemoryStore::with_retention(Retention {
        query_freshness_days: 0,
        url_retention_days: 0,
    });
    let run = RunId::generate();
    store
        .mark_queries_done_batch(&["q".to_string()], &run)
        .await
        .expect("mark");
    tokio::time::sleep(std::time::Duration::from_millis(5)).await;
    assert!(!store.is_query_done("q").await.expect("done"));
}

#[tokio::test]
#[ignore = "requires PROSPECTOR_TEST_DATABASE_URL"]
async fn test_postgres_backend() {
    let Ok(url) = std::env::var("PROSPECTOR_TEST_DATABASE_URL") else {
        return;
    };
    let store = PostgresStore::connect(&url, 4, Retention::default())
        .await
        .expect("connect");
    store.migrate().await.expect("migrate");
    sqlx::query(
        "TRUNCATE leads, urls_seen, queries_done, runs, dork_performance, source_performance, pattern_success",
    )
    .execute(store.pool())
    .await
    .expect("truncate");

    idempotent_by_email(&store).await;
    idempotent_by_phone(&store).await;
    phone_spellings_share_one_lead(&store).await;
    phone_of_other_lead_is_not_stolen(&store).await;
    urls_seen(&store).await;
    queries_done(&store).await;
    performance_counters(&store).await;
    run_lifecycle(&store).await;
}
