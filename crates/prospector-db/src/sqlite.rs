//! Embedded single-file backend.
//!
//! Timestamps are stored as RFC 3339 text in UTC with second precision, so
//! window checks are plain string comparisons.

use async_trait::async_trait;
use chrono::{DateTime, SecondsFormat, Utc};
use prospector_core::{normalize_query, query_hash, Lead, RunId, RunMode};
use sqlx::sqlite::{SqliteConnectOptions, SqliteJournalMode, SqlitePoolOptions};
use sqlx::{Sqlite, SqlitePool, Transaction};
use std::path::Path;
use std::str::FromStr;
use std::time::Duration;
use tracing::debug;

use crate::error::{Result, StoreError};
use crate::migrations;
use crate::model::{
    encode_list, lead_keys, merge_lead, to_i64, DorkRow, DorkStats, LeadRow, PatternRow,
    PatternStats, Retention, RunCounters, RunRecord, RunRow, SourceRow, SourceStats, StoredLead,
    UpsertOutcome,
};
use crate::store::LeadStore;

const LEAD_COLUMNS: &str = "id, name, email, phone, company, role, region, industries, tags, \
     score, party, search_status, email_personal, phone_valid, name_plausible, whatsapp, \
     source_url, discovered_at, updated_at";

fn ts(dt: DateTime<Utc>) -> String {
    dt.to_rfc3339_opts(SecondsFormat::Secs, true)
}

fn limit(n: usize) -> i64 {
    i64::try_from(n).unwrap_or(i64::MAX)
}

/// `SQLite` store.
#[derive(Debug, Clone)]
pub struct SqliteStore {
    pool: SqlitePool,
    retention: Retention,
}

impl SqliteStore {
    /// Open (creating if missing) a database file, or `:memory:`.
    ///
    /// In-memory databases use a single long-lived connection since every
    /// `SQLite` connection to `:memory:` is a separate database.
    pub async fn connect(
        path: impl AsRef<Path>,
        max_connections: u32,
        retention: Retention,
    ) -> Result<Self> {
        let path = path.as_ref();
        let path_str = path
            .to_str()
            .ok_or_else(|| StoreError::Open("invalid database path: not valid UTF-8".into()))?;

        let pool = if path_str == ":memory:" {
            let options = SqliteConnectOptions::from_str("sqlite::memory:")
                .map_err(|e| StoreError::Open(format!("invalid connection string: {e}")))?;
            SqlitePoolOptions::new()
                .max_connections(1)
                .min_connections(1)
                .idle_timeout(None)
                .max_lifetime(None)
                .connect_with(options)
                .await
                .map_err(|e| StoreError::Open(format!("failed to open in-memory database: {e}")))?
        } else {
            if let Some(parent) = path.parent().filter(|p| !p.as_os_str().is_empty()) {
                std::fs::create_dir_all(parent)?;
            }
            let options = SqliteConnectOptions::new()
                .filename(path)
                .create_if_missing(true)
                .journal_mode(SqliteJournalMode::Wal)
                .busy_timeout(Duration::from_secs(5));
            SqlitePoolOptions::new()
                .max_connections(max_connections.max(1))
                .connect_with(options)
                .await
                .map_err(|e| StoreError::Open(format!("failed to open {path_str}: {e}")))?
        };

        tracing::info!("Sqlite store opened at {}", path_str);
        Ok(Self { pool, retention })
    }

    /// In-memory store with migrations applied.
    pub async fn in_memory() -> Result<Self> {
        let store = Self::connect(":memory:", 1, Retention::default()).await?;
        store.migrate().await?;
        Ok(store)
    }

    /// Apply pending migrations.
    pub async fn migrate(&self) -> Result<()> {
        migrations::run_sqlite_migrations(&self.pool).await
    }

    /// Underlying pool.
    #[must_use]
    pub fn pool(&self) -> &SqlitePool {
        &self.pool
    }

    /// Replace the retention windows.
    #[must_use]
    pub fn with_retention(mut self, retention: Retention) -> Self {
        self.retention = retention;
        self
    }

    /// Close the pool gracefully.
    pub async fn close(self) {
        self.pool.close().await;
    }

    async fn lead_by(
        tx: &mut Transaction<'_, Sqlite>,
        column: &str,
        value: &str,
    ) -> Result<Option<StoredLead>> {
        let sql = format!("SELECT {LEAD_COLUMNS} FROM leads WHERE {column} = ?");
        let row = sqlx::query_as::<_, LeadRow>(&sql)
            .bind(value)
            .fetch_optional(&mut **tx)
            .await?;
        row.map(StoredLead::try_from).transpose()
    }

    async fn insert_lead(tx: &mut Transaction<'_, Sqlite>, lead: &Lead) -> Result<i64> {
        let now = ts(Utc::now());
        let result = sqlx::query(
            "INSERT INTO leads (name, email, phone, company, role, region, industries, tags,
                score, party, search_status, email_personal, phone_valid, name_plausible,
                whatsapp, source_url, discovered_at, updated_at)
             VALUES (?, ?, ?, ?, ?, ?, ?, ?, ?, ?, ?, ?, ?, ?, ?, ?, ?, ?)",
        )
        .bind(&lead.name)
        .bind(&lead.email)
        .bind(&lead.phone)
        .bind(&lead.company)
        .bind(&lead.role)
        .bind(&lead.region)
        .bind(encode_list(&lead.industries))
        .bind(encode_list(&lead.tags))
        .bind(i64::from(lead.score))
        .bind(lead.classification.party.as_str())
        .bind(lead.classification.status.as_str())
        .bind(lead.quality.email_personal)
        .bind(lead.quality.phone_valid)
        .bind(lead.quality.name_plausible)
        .bind(lead.quality.whatsapp)
        .bind(&lead.source_url)
        .bind(ts(lead.discovered_at))
        .bind(now)
        .execute(&mut **tx)
        .await?;
        Ok(result.last_insert_rowid())
    }

    async fn update_lead(tx: &mut Transaction<'_, Sqlite>, id: i64, lead: &Lead) -> Result<()> {
        sqlx::query(
            "UPDATE leads SET name = ?, email = ?, phone = ?, company = ?, role = ?, region = ?,
                industries = ?, tags = ?, score = ?, party = ?, search_status = ?,
                email_personal = ?, phone_valid = ?, name_plausible = ?, whatsapp = ?,
                source_url = ?, discovered_at = ?, updated_at = ?
             WHERE id = ?",
        )
        .bind(&lead.name)
        .bind(&lead.email)
        .bind(&lead.phone)
        .bind(&lead.company)
        .bind(&lead.role)
        .bind(&lead.region)
        .bind(encode_list(&lead.industries))
        .bind(encode_list(&lead.tags))
        .bind(i64::from(lead.score))
        .bind(lead.classification.party.as_str())
        .bind(lead.classification.status.as_str())
        .bind(lead.quality.email_personal)
        .bind(lead.quality.phone_valid)
        .bind(lead.quality.name_plausible)
        .bind(lead.quality.whatsapp)
        .bind(&lead.source_url)
        .bind(ts(lead.discovered_at))
        .bind(ts(Utc::now()))
        .bind(id)
        .execute(&mut **tx)
        .await?;
        Ok(())
    }

    async fn try_upsert(&self, incoming: &Lead) -> Result<UpsertOutcome> {
        let mut tx = self.pool.begin().await?;

        let by_email = match incoming.email.as_deref() {
            Some(email) => Self::lead_by(&mut tx, "email", email).await?,
            None => None,
        };
        let by_phone = match incoming.phone.as_deref() {
            Some(phone) => Self::lead_by(&mut tx, "phone", phone).await?,
            None => None,
        };

        let outcome = match (by_email, by_phone) {
            (Some(existing), other) => {
                let mut merged = merge_lead(&existing.lead, incoming);
                if other.is_some_and(|o| o.id != existing.id) {
                    // The phone belongs to a different lead; leave it there.
                    merged.phone.clone_from(&existing.lead.phone);
                }
                Self::update_lead(&mut tx, existing.id, &merged).await?;
                UpsertOutcome {
                    id: existing.id,
                    created: false,
                }
            }
            (None, Some(existing)) => {
                let merged = merge_lead(&existing.lead, incoming);
                Self::update_lead(&mut tx, existing.id, &merged).await?;
                UpsertOutcome {
                    id: existing.id,
                    created: false,
                }
            }
            (None, None) => UpsertOutcome {
                id: Self::insert_lead(&mut tx, incoming).await?,
                created: true,
            },
        };

        tx.commit().await?;
        Ok(outcome)
    }

    async fn find_lead(&self, column: &str, value: &str) -> Result<Option<StoredLead>> {
        let sql = format!("SELECT {LEAD_COLUMNS} FROM leads WHERE {column} = ?");
        let row = sqlx::query_as::<_, LeadRow>(&sql)
            .bind(value)
            .fetch_optional(&self.pool)
            .await?;
        row.map(StoredLead::try_from).transpose()
    }
}

#[async_trait]
impl LeadStore for SqliteStore {
    fn backend_name(&self) -> &'static str {
        "sqlite"
    }

    async fn upsert_lead(&self, lead: &Lead) -> Result<UpsertOutcome> {
        let (email, phone) = lead_keys(lead)?;
        let mut incoming = lead.clone();
        incoming.email = email;
        incoming.phone = phone;

        match self.try_upsert(&incoming).await {
            Err(e) if e.is_unique_violation() => {
                debug!(source_url = %lead.source_url, "lead insert raced, retrying as update");
                self.try_upsert(&incoming).await
            }
            other => other,
        }
    }

    async fn find_lead_by_email(&self, email: &str) -> Result<Option<StoredLead>> {
        self.find_lead("email", &prospector_core::normalize_email(email))
            .await
    }

    async fn find_lead_by_phone(&self, phone: &str) -> Result<Option<StoredLead>> {
        self.find_lead("phone", &prospector_core::normalize_phone_key(phone))
            .await
    }

    async fn count_leads(&self) -> Result<u64> {
        let count = sqlx::query_scalar::<_, i64>("SELECT COUNT(*) FROM leads")
            .fetch_one(&self.pool)
            .await?;
        Ok(crate::model::to_u64(count))
    }

    async fn is_url_seen(&self, url: &str) -> Result<bool> {
        let cutoff = ts(self.retention.url_cutoff(Utc::now()));
        let seen = sqlx::query_scalar::<_, i64>(
            "SELECT COUNT(*) FROM urls_seen WHERE url = ? AND first_seen_at >= ?",
        )
        .bind(url)
        .bind(cutoff)
        .fetch_one(&self.pool)
        .await?;
        Ok(seen > 0)
    }

    async fn mark_urls_seen_batch(&self, urls: &[String], run_id: &RunId) -> Result<u64> {
        if urls.is_empty() {
            return Ok(0);
        }
        let now = Utc::now();
        let now_str = ts(now);
        let cutoff = ts(self.retention.url_cutoff(now));

        let mut tx = self.pool.begin().await?;
        let mut written = 0;
        for url in urls {
            // Expired entries are refreshed; live ones are left alone.
            let result = sqlx::query(
                "INSERT INTO urls_seen (url, run_id, first_seen_at) VALUES (?, ?, ?)
                 ON CONFLICT(url) DO UPDATE SET run_id = excluded.run_id,
                     first_seen_at = excluded.first_seen_at
                 WHERE urls_seen.first_seen_at < ?",
            )
            .bind(url)
            .bind(run_id.as_str())
            .bind(&now_str)
            .bind(&cutoff)
            .execute(&mut *tx)
            .await?;
            written += result.rows_affected();
        }
        tx.commit().await?;

        debug!(count = urls.len(), written, "marked urls seen");
        Ok(written)
    }

    async fn is_query_done(&self, query: &str) -> Result<bool> {
        let cutoff = ts(self.retention.query_cutoff(Utc::now()));
        let done = sqlx::query_scalar::<_, i64>(
            "SELECT COUNT(*) FROM queries_done WHERE query_hash = ? AND executed_at >= ?",
        )
        .bind(query_hash(query))
        .bind(cutoff)
        .fetch_one(&self.pool)
        .await?;
        Ok(done > 0)
    }

    async fn mark_queries_done_batch(&self, queries: &[String], run_id: &RunId) -> Result<u64> {
        if queries.is_empty() {
            return Ok(0);
        }
        let now = ts(Utc::now());

        let mut tx = self.pool.begin().await?;
        let mut written = 0;
        for query in queries {
            let result = sqlx::query(
                "INSERT INTO queries_done (query_hash, query, run_id, executed_at) VALUES (?, ?, ?, ?)
                 ON CONFLICT(query_hash) DO UPDATE SET run_id = excluded.run_id,
                     executed_at = excluded.executed_at",
            )
            .bind(query_hash(query))
            .bind(normalize_query(query))
            .bind(run_id.as_str())
            .bind(&now)
            .execute(&mut *tx)
            .await?;
            written += result.rows_affected();
        }
        tx.commit().await?;
        Ok(written)
    }

    async fn record_dork_usage(
        &self,
        query: &str,
        leads_found: u64,
        leads_with_phone: u64,
        accepted: u64,
    ) -> Result<()> {
        sqlx::query(
            "INSERT INTO dork_performance
                 (query_hash, query, uses, leads_found, leads_with_phone, accepted, last_used_at)
             VALUES (?, ?, 1, ?, ?, ?, ?)
             ON CONFLICT(query_hash) DO UPDATE SET
                 uses = dork_performance.uses + 1,
                 leads_found = dork_performance.leads_found + excluded.leads_found,
                 leads_with_phone = dork_performance.leads_with_phone + excluded.leads_with_phone,
                 accepted = dork_performance.accepted + excluded.accepted,
                 last_used_at = excluded.last_used_at",
        )
        .bind(query_hash(query))
        .bind(normalize_query(query))
        .bind(to_i64(leads_found))
        .bind(to_i64(leads_with_phone))
        .bind(to_i64(accepted))
        .bind(ts(Utc::now()))
        .execute(&self.pool)
        .await?;
        Ok(())
    }

    async fn record_source_hit(
        &self,
        domain: &str,
        leads_found: u64,
        leads_with_phone: u64,
    ) -> Result<()> {
        sqlx::query(
            "INSERT INTO source_performance (domain, hits, leads_found, leads_with_phone, last_hit_at)
             VALUES (?, 1, ?, ?, ?)
             ON CONFLICT(domain) DO UPDATE SET
                 hits = source_performance.hits + 1,
                 leads_found = source_performance.leads_found + excluded.leads_found,
                 leads_with_phone = source_performance.leads_with_phone + excluded.leads_with_phone,
                 last_hit_at = excluded.last_hit_at",
        )
        .bind(domain.to_lowercase())
        .bind(to_i64(leads_found))
        .bind(to_i64(leads_with_phone))
        .bind(ts(Utc::now()))
        .execute(&self.pool)
        .await?;
        Ok(())
    }

    async fn record_pattern_success(&self, pattern: &str, success: bool) -> Result<()> {
        let success_at = success.then(|| ts(Utc::now()));
        sqlx::query(
            "INSERT INTO pattern_success (pattern, attempts, successes, last_success_at)
             VALUES (?, 1, ?, ?)
             ON CONFLICT(pattern) DO UPDATE SET
                 attempts = pattern_success.attempts + 1,
                 successes = pattern_success.successes + excluded.successes,
                 last_success_at = COALESCE(excluded.last_success_at, pattern_success.last_success_at)",
        )
        .bind(pattern)
        .bind(i64::from(success))
        .bind(success_at)
        .execute(&self.pool)
        .await?;
        Ok(())
    }

    async fn get_top_dorks(&self, n: usize) -> Result<Vec<DorkStats>> {
        let rows = sqlx::query_as::<_, DorkRow>(
            "SELECT query_hash, query, uses, leads_found, leads_with_phone, accepted, last_used_at
             FROM dork_performance
             ORDER BY CAST(accepted AS REAL) / MAX(1, uses) DESC, uses DESC, query_hash
             LIMIT ?",
        )
        .bind(limit(n))
        .fetch_all(&self.pool)
        .await?;
        Ok(rows.into_iter().map(DorkStats::from).collect())
    }

    async fn get_best_sources(&self, n: usize) -> Result<Vec<SourceStats>> {
        let rows = sqlx::query_as::<_, SourceRow>(
            "SELECT domain, hits, leads_found, leads_with_phone, last_hit_at
             FROM source_performance
             ORDER BY CAST(leads_found + leads_with_phone AS REAL) / MAX(1, hits) DESC,
                      hits DESC, domain
             LIMIT ?",
        )
        .bind(limit(n))
        .fetch_all(&self.pool)
        .await?;
        Ok(rows.into_iter().map(SourceStats::from).collect())
    }

    async fn get_pattern_stats(&self) -> Result<Vec<PatternStats>> {
        let rows = sqlx::query_as::<_, PatternRow>(
            "SELECT pattern, attempts, successes FROM pattern_success
             ORDER BY successes DESC, pattern",
        )
        .fetch_all(&self.pool)
        .await?;
        Ok(rows.into_iter().map(PatternStats::from).collect())
    }

    async fn purge_performance(&self) -> Result<u64> {
        let mut tx = self.pool.begin().await?;
        let mut removed = 0;
        for table in ["dork_performance", "source_performance", "pattern_success"] {
            removed += sqlx::query(&format!("DELETE FROM {table}"))
                .execute(&mut *tx)
                .await?
                .rows_affected();
        }
        tx.commit().await?;
        tracing::info!(removed, "purged performance counters");
        Ok(removed)
    }

    async fn start_run(&self, mode: RunMode) -> Result<RunId> {
        let id = RunId::generate();
        sqlx::query("INSERT INTO runs (id, mode, started_at) VALUES (?, ?, ?)")
            .bind(id.as_str())
            .bind(mode.as_str())
            .bind(ts(Utc::now()))
            .execute(&self.pool)
            .await?;
        Ok(id)
    }

    async fn finish_run(&self, run_id: &RunId, counters: &RunCounters) -> Result<()> {
        let result = sqlx::query(
            "UPDATE runs SET finished_at = ?, queries = ?, candidates = ?, pages_fetched = ?,
                 leads_found = ?, leads_accepted = ?, leads_created = ?, leads_updated = ?,
                 errors = ?
             WHERE id = ? AND finished_at IS NULL",
        )
        .bind(ts(Utc::now()))
        .bind(to_i64(counters.queries))
        .bind(to_i64(counters.candidates))
        .bind(to_i64(counters.pages_fetched))
        .bind(to_i64(counters.leads_found))
        .bind(to_i64(counters.leads_accepted))
        .bind(to_i64(counters.leads_created))
        .bind(to_i64(counters.leads_updated))
        .bind(to_i64(counters.errors))
        .bind(run_id.as_str())
        .execute(&self.pool)
        .await?;

        if result.rows_affected() == 0 {
            return match self.get_run(run_id).await? {
                Some(_) => Err(StoreError::RunClosed(run_id.to_string())),
                None => Err(StoreError::NotFound(format!("run '{run_id}' not found"))),
            };
        }
        Ok(())
    }

    async fn get_run(&self, run_id: &RunId) -> Result<Option<RunRecord>> {
        let row = sqlx::query_as::<_, RunRow>(
            "SELECT id, mode, started_at, finished_at, queries, candidates, pages_fetched,
                    leads_found, leads_accepted, leads_created, leads_updated, errors
             FROM runs WHERE id = ?",
        )
        .bind(run_id.as_str())
        .fetch_optional(&self.pool)
        .await?;
        row.map(RunRecord::try_from).transpose()
    }
}
