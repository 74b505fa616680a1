//! Prospector Application Shell
//!
//! Thin entry layer: loads configuration, installs logging, wires the
//! store, catalog, providers and fetcher into a discovery orchestrator and
//! runs it until the configured cycle count or a cancellation.
//! Pipeline logic lives in the `crates/` directory.

#![warn(missing_docs)]
#![warn(clippy::all)]
#![warn(clippy::pedantic)]
#![allow(clippy::module_name_repetitions)]
#![allow(clippy::missing_errors_doc)]
#![allow(clippy::missing_panics_doc)]

use anyhow::Context;
use prospector_catalog::{CatalogLoader, CatalogRegistry};
use prospector_core::{AppConfig, LogFormat, LoggingConfig};
use prospector_db::open_store;
use prospector_fetch::ResilientFetcher;
use prospector_scanner::{DiscoveryOrchestrator, RunSummary};
use prospector_search::ProviderSet;
use std::sync::Arc;
use tokio_util::sync::CancellationToken;
use tracing::{info, warn};
use tracing_subscriber::fmt::MakeWriter;
use tracing_subscriber::EnvFilter;

fn env_filter(level: &str) -> EnvFilter {
    EnvFilter::try_from_default_env()
        .unwrap_or_else(|_| EnvFilter::new(format!("{level},prospector=debug")))
}

/// Plain-text subscriber used until the configured one is installed.
fn bootstrap_subscriber<W>(writer: W) -> impl tracing::Subscriber + Send + Sync + 'static
where
    W: for<'w> MakeWriter<'w> + Send + Sync + 'static,
{
    tracing_subscriber::fmt()
        .with_env_filter(env_filter("info"))
        .with_target(true)
        .with_writer(writer)
        .finish()
}

/// Load configuration with environment overrides.
///
/// Logging config lives in the file being loaded, so loading runs under a
/// scoped stderr subscriber to keep its warnings visible.
pub fn load_config() -> anyhow::Result<AppConfig> {
    tracing::subscriber::with_default(
        bootstrap_subscriber(std::io::stderr),
        AppConfig::load_with_env,
    )
    .context("failed to load configuration")
}

/// Initialize the tracing subscriber.
///
/// `RUST_LOG` wins over the configured level. Calling this twice is a
/// no-op, which keeps tests that share a process quiet.
pub fn init_tracing(config: &LoggingConfig) {
    use tracing_subscriber::{fmt, prelude::*};

    let filter = env_filter(&config.level);

    let result = match config.format {
        LogFormat::Json => tracing_subscriber::registry()
            .with(fmt::layer().json().with_target(true))
            .with(filter)
            .try_init(),
        LogFormat::Text => tracing_subscriber::registry()
            .with(fmt::layer().with_target(true))
            .with(filter)
            .try_init(),
    };
    if result.is_err() {
        tracing::debug!("Tracing subscriber already installed");
    }
}

/// Run the pipeline described by `config` until it finishes or `cancel`
/// fires at a cycle checkpoint.
pub async fn run(config: &AppConfig, cancel: CancellationToken) -> anyhow::Result<RunSummary> {
    let mode = config.run.mode;
    info!(
        version = env!("CARGO_PKG_VERSION"),
        mode = mode.as_str(),
        cycles = config.run.cycles,
        "Starting Prospector"
    );

    let store = open_store(&config.storage)
        .await
        .context("failed to open lead store")?;

    let catalog = CatalogRegistry::load_from(&CatalogLoader::from_config(&config.catalog))
        .context("failed to load catalog")?;
    info!(
        queries = catalog.query_count(),
        portals = catalog.portals_for(mode).len(),
        "Catalog loaded"
    );

    let providers = ProviderSet::from_config(&config.search, catalog.portals_for(mode))
        .context("failed to build search providers")?;
    if providers.usable_count() == 0 {
        warn!("No usable search providers configured; runs will complete with zero leads");
    } else {
        info!(providers = ?providers.usable_labels(), "Search providers ready");
    }

    let fetcher =
        Arc::new(ResilientFetcher::new(&config.fetch).context("failed to build page fetcher")?);

    let mut orchestrator =
        DiscoveryOrchestrator::from_config(config, store, catalog, providers, fetcher);
    let summary = orchestrator
        .run(mode, config.run.cycles, cancel)
        .await
        .context("discovery run failed")?;

    log_summary(&summary);
    Ok(summary)
}

/// Log the end-of-run counters.
pub fn log_summary(summary: &RunSummary) {
    let c = &summary.counters;
    info!(
        cycles_completed = summary.cycles_completed,
        cancelled = summary.cancelled,
        queries = c.queries,
        candidates = c.candidates,
        pages_fetched = c.pages_fetched,
        leads_found = c.leads_found,
        leads_accepted = c.leads_accepted,
        leads_created = c.leads_created,
        leads_updated = c.leads_updated,
        errors = c.errors,
        "Run summary"
    );
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::io;
    use std::sync::{Mutex, PoisonError};

    #[derive(Clone, Default)]
    struct Captured(Arc<Mutex<Vec<u8>>>);

    impl io::Write for Captured {
        fn write(&mut self, buf: &[u8]) -> io::Result<usize> {
            self.0
                .lock()
                .unwrap_or_else(PoisonError::into_inner)
                .extend_from_slice(buf);
            Ok(buf.len())
        }

        fn flush(&mut self) -> io::Result<()> {
            Ok(())
        }
    }

    #[test]
    fn test_config_warnings_are_logged_before_tracing_init() {
        let captured = Captured::default();
        let writer = captured.clone();
        let config = tracing::subscriber::with_default(
            bootstrap_subscriber(move || writer.clone()),
            || {
                let mut config = AppConfig::default();
                config.apply_env_overrides(|key| {
                    (key == "PROSPECTOR_MIN_SCORE").then(|| "hoch".to_string())
                });
                config
            },
        );

        assert_eq!(config.scoring.min_score, AppConfig::default().scoring.min_score);
        let logged = captured.0.lock().map(|b| String::from_utf8_lossy(&b).into_owned());
        let logged = logged.unwrap_or_default();
        assert!(logged.contains("PROSPECTOR_MIN_SCORE"), "{logged}");
        assert!(logged.contains("hoch"), "{logged}");
    }

    #[test]
    fn test_init_tracing_twice_is_harmless() {
        init_tracing(&LoggingConfig::default());
        init_tracing(&LoggingConfig::default());
    }
}
