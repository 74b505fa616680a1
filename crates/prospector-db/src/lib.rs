//! Prospector Database Layer
//!
//! Persistence and dedup store for the discovery pipeline. One async
//! contract, [`LeadStore`], with three interchangeable backends selected by
//! configuration:
//!
//! - [`SqliteStore`]: embedded single-file database
//! - [`PostgresStore`]: networked relational database
//! - [`MemoryStore`]: volatile, for tests and dry runs
//!
//! # Example
//!
//! ```ignore
//! use prospector_db::{open_store, LeadStore};
//!
//! let store = open_store(&config.storage).await?;
//! let run = store.start_run(RunMode::JobSeekers).await?;
//! store.mark_urls_seen_batch(&urls, &run).await?;
//! ```
//!
//! # Guarantees
//!
//! - At most one lead per normalized email and per normalized phone
//! - URLs are seen at most once per retention window
//! - Dedup inserts are insert-if-absent; duplicate races are no-ops
//! - Batches run in a single transaction

#![warn(missing_docs)]
#![warn(clippy::all)]
#![warn(clippy::pedantic)]
#![allow(clippy::module_name_repetitions)]
#![allow(clippy::missing_errors_doc)]
#![allow(clippy::missing_panics_doc)]

pub mod error;
pub mod memory;
pub mod migrations;
pub mod model;
pub mod postgres;
pub mod sqlite;
pub mod store;

// Re-export commonly used types
pub use error::{Result, StoreError};
pub use memory::MemoryStore;
pub use model::{
    merge_lead, DorkStats, PatternStats, Retention, RunCounters, RunRecord, SourceStats,
    StoredLead, UpsertOutcome,
};
pub use postgres::PostgresStore;
pub use sqlite::SqliteStore;
pub use store::LeadStore;

use prospector_core::{AppConfig, StorageBackend, StorageConfig};
use std::path::PathBuf;
use std::sync::Arc;

/// Open the configured backend and apply its migrations.
pub async fn open_store(config: &StorageConfig) -> Result<Arc<dyn LeadStore>> {
    let retention = Retention::from_config(config);

    let store: Arc<dyn LeadStore> = match config.backend {
        StorageBackend::Sqlite => {
            let path = match &config.sqlite_path {
                Some(path) => path.clone(),
                None => default_sqlite_path()?,
            };
            let store = SqliteStore::connect(&path, config.max_connections, retention).await?;
            store.migrate().await?;
            Arc::new(store)
        }
        StorageBackend::Postgres => {
            let url = config.database_url.as_deref().ok_or_else(|| {
                StoreError::Open("postgres backend selected without database_url".to_string())
            })?;
            let store = PostgresStore::connect(url, config.max_connections, retention).await?;
            store.migrate().await?;
            Arc::new(store)
        }
        StorageBackend::Memory => Arc::new(MemoryStore::with_retention(retention)),
    };

    tracing::info!(backend = store.backend_name(), "store ready");
    Ok(store)
}

fn default_sqlite_path() -> Result<PathBuf> {
    let dir = AppConfig::data_dir().map_err(|e| StoreError::Open(e.to_string()))?;
    Ok(dir.join("prospector.db"))
}
