//! Full wiring with every network provider disabled.

use prospector_core::{AppConfig, StorageBackend};
use tokio_util::sync::CancellationToken;

fn offline_config() -> AppConfig {
    let mut config = AppConfig::default();
    config.storage.backend = StorageBackend::Memory;
    config.search.duckduckgo_enabled = false;
    config.search.portals_enabled = false;
    config.run.cycles = 2;
    config.run.pause_between_cycles_secs = 0;
    config
}

#[tokio::test]
async fn test_run_without_providers_finishes_with_zero_leads() {
    let summary = prospector_app::run(&offline_config(), CancellationToken::new())
        .await
        .expect("run");

    assert_eq!(summary.cycles_completed, 2);
    assert!(!summary.cancelled);
    assert_eq!(summary.counters.candidates, 0);
    assert_eq!(summary.counters.leads_created, 0);
}

#[tokio::test]
async fn test_sqlite_backend_in_temp_dir() {
    let dir = tempfile::tempdir().expect("tempdir");
    let mut config = offline_config();
    config.storage.backend = StorageBackend::Sqlite;
    config.storage.sqlite_path = Some(dir.path().join("leads.db"));
    config.run.cycles = 1;

    let summary = prospector_app::run(&config, CancellationToken::new())
        .await
        .expect("run");
    assert_eq!(summary.run_ids.len(), 1);
    assert!(dir.path().join("leads.db").exists());
}

#[tokio::test]
async fn test_cancelled_before_start() {
    let cancel = CancellationToken::new();
    cancel.cancel();
    let summary = prospector_app::run(&offline_config(), cancel)
        .await
        .expect("run");
    assert!(summary.cancelled);
    assert_eq!(summary.cycles_completed, 0);
}
