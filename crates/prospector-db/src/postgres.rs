//! Networked relational backend.

use async_trait::async_trait;
use chrono::Utc;
use prospector_core::{normalize_query, query_hash, Lead, RunId, RunMode};
use sqlx::postgres::PgPoolOptions;
use sqlx::{PgPool, Postgres, Transaction};
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

fn limit(n: usize) -> i64 {
    i64::try_from(n).unwrap_or(i64::MAX)
}

/// Postgres store.
#[derive(Debug, Clone)]
pub struct PostgresStore {
    pool: PgPool,
    retention: Retention,
}

impl PostgresStore {
    /// Connect to a Postgres database.
    pub async fn connect(url: &str, max_connections: u32, retention: Retention) -> Result<Self> {
        let pool = PgPoolOptions::new()
            .max_connections(max_connections.max(1))
            .acquire_timeout(Duration::from_secs(10))
            .connect(url)
            .await
            .map_err(|e| StoreError::Open(format!("failed to connect to postgres: {e}")))?;

        tracing::info!("Postgres store connected");
        Ok(Self { pool, retention })
    }

    /// Apply pending migrations.
    pub async fn migrate(&self) -> Result<()> {
        migrations::run_postgres_migrations(&self.pool).await
    }

    /// Underlying pool.
    #[must_use]
    pub fn pool(&self) -> &PgPool {
        &self.pool
    }

    /// Close the pool gracefully.
    pub async fn close(self) {
        self.pool.close().await;
    }

    async fn lead_by(
        tx: &mut Transaction<'_, Postgres>,
        column: &str,
        value: &str,
    ) -> Result<Option<StoredLead>> {
        // Row lock so two writers merging into the same lead serialize.
        let sql = format!("SELECT {LEAD_COLUMNS} FROM leads WHERE {column} = $1 FOR UPDATE");
        let row = sqlx::query_as::<_, LeadRow>(&sql)
            .bind(value)
            .fetch_optional(&mut **tx)
            .await?;
        row.map(StoredLead::try_from).transpose()
    }

    async fn insert_lead(tx: &mut Transaction<'_, Postgres>, lead: &Lead) -> Result<i64> {
        let id = sqlx::query_scalar::<_, i64>(
            "INSERT INTO leads (name, email, phone, company, role, region, industries, tags,
                score, party, search_status, email_personal, phone_valid, name_plausible,
                whatsapp, source_url, discovered_at, updated_at)
             VALUES ($1, $2, $3, $4, $5, $6, $7, $8, $9, $10, $11, $12, $13, $14, $15, $16, $17, $18)
             RETURNING id",
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
        .bind(lead.discovered_at)
        .bind(Utc::now())
        .fetch_one(&mut **tx)
        .await?;
        Ok(id)
    }

    async fn update_lead(tx: &mut Transaction<'_, Postgres>, id: i64, lead: &Lead) -> Result<()> {
        sqlx::query(
            "UPDATE leads SET name = $1, email = $2, phone = $3, company = $4, role = $5,
                region = $6, industries = $7, tags = $8, score = $9, party = $10,
                search_status = $11, email_personal = $12, phone_valid = $13,
                name_plausible = $14, whatsapp = $15, source_url = $16, discovered_at = $17,
                updated_at = $18
             WHERE id = $19",
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
        .bind(lead.discovered_at)
        .bind(Utc::now())
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
        let sql = format!("SELECT {LEAD_COLUMNS} FROM leads WHERE {column} = $1");
        let row = sqlx::query_as::<_, LeadRow>(&sql)
            .bind(value)
            .fetch_optional(&self.pool)
            .await?;
        row.map(StoredLead::try_from).transpose()
    }
}

#[async_trait]
impl LeadStore for PostgresStore {
    fn backend_name(&self) -> &'static str {
        "postgres"
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
        let seen = sqlx::query_scalar::<_, bool>(
            "SELECT EXISTS(SELECT 1 FROM urls_seen WHERE url = $1 AND first_seen_at >= $2)",
        )
        .bind(url)
        .bind(self.retention.url_cutoff(Utc::now()))
        .fetch_one(&self.pool)
        .await?;
        Ok(seen)
    }

    async fn mark_urls_seen_batch(&self, urls: &[String], run_id: &RunId) -> Result<u64> {
        if urls.is_empty() {
            return Ok(0);
        }
        let now = Utc::now();
        let cutoff = self.retention.url_cutoff(now);

        // One statement for the whole batch.
        let result = sqlx::query(
            "INSERT INTO urls_seen (url, run_id, first_seen_at)
             SELECT DISTINCT u, $2, $3 FROM UNNEST($1::text[]) AS u
             ON CONFLICT (url) DO UPDATE SET run_id = EXCLUDED.run_id,
                 first_seen_at = EXCLUDED.first_seen_at
             WHERE urls_seen.first_seen_at < $4",
        )
        .bind(urls)
        .bind(run_id.as_str())
        .bind(now)
        .bind(cutoff)
        .execute(&self.pool)
        .await?;

        debug!(count = urls.len(), written = result.rows_affected(), "marked urls seen");
        Ok(result.rows_affected())
    }

    async fn is_query_done(&self, query: &str) -> Result<bool> {
        let done = sqlx::query_scalar::<_, bool>(
            "SELECT EXISTS(SELECT 1 FROM queries_done WHERE query_hash = $1 AND executed_at >= $2)",
        )
        .bind(query_hash(query))
        .bind(self.retention.query_cutoff(Utc::now()))
        .fetch_one(&self.pool)
        .await?;
        Ok(done)
    }

    async fn mark_queries_done_batch(&self, queries: &[String], run_id: &RunId) -> Result<u64> {
        if queries.is_empty() {
            return Ok(0);
        }
        let now = Utc::now();

        let mut tx = self.pool.begin().await?;
        let mut written = 0;
        for query in queries {
            let result = sqlx::query(
                "INSERT INTO queries_done (query_hash, query, run_id, executed_at)
                 VALUES ($1, $2, $3, $4)
                 ON CONFLICT (query_hash) DO UPDATE SET run_id = EXCLUDED.run_id,
                     executed_at = EXCLUDED.executed_at",
            )
            .bind(query_hash(query))
            .bind(normalize_query(query))
            .bind(run_id.as_str())
            .bind(now)
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
             VALUES ($1, $2, 1, $3, $4, $5, $6)
             ON CONFLICT (query_hash) DO UPDATE SET
                 uses = dork_performance.uses + 1,
                 leads_found = dork_performance.leads_found + EXCLUDED.leads_found,
                 leads_with_phone = dork_performance.leads_with_phone + EXCLUDED.leads_with_phone,
                 accepted = dork_performance.accepted + EXCLUDED.accepted,
                 last_used_at = EXCLUDED.last_used_at",
        )
        .bind(query_hash(query))
        .bind(normalize_query(query))
        .bind(to_i64(leads_found))
        .bind(to_i64(leads_with_phone))
        .bind(to_i64(accepted))
        .bind(Utc::now())
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
             VALUES ($1, 1, $2, $3, $4)
             ON CONFLICT (domain) DO UPDATE SET
                 hits = source_performance.hits + 1,
                 leads_found = source_performance.leads_found + EXCLUDED.leads_found,
                 leads_with_phone = source_performance.leads_with_phone + EXCLUDED.leads_with_phone,
                 last_hit_at = EXCLUDED.last_hit_at",
        )
        .bind(domain.to_lowercase())
        .bind(to_i64(leads_found))
        .bind(to_i64(leads_with_phone))
        .bind(Utc::now())
        .execute(&self.pool)
        .await?;
        Ok(())
    }

    async fn record_pattern_success(&self, pattern: &str, success: bool) -> Result<()> {
        let success_at = success.then(Utc::now);
        sqlx::query(
            "INSERT INTO pattern_success (pattern, attempts, successes, last_success_at)
             VALUES ($1, 1, $2, $3)
             ON CONFLICT (pattern) DO UPDATE SET
                 attempts = pattern_success.attempts + 1,
                 successes = pattern_success.successes + EXCLUDED.successes,
                 last_success_at = COALESCE(EXCLUDED.last_success_at, pattern_success.last_success_at)",
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
             ORDER BY accepted::float8 / GREATEST(1, uses) DESC, uses DESC, query_hash
             LIMIT $1",
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
             ORDER BY (leads_found + leads_with_phone)::float8 / GREATEST(1, hits) DESC,
                      hits DESC, domain
             LIMIT $1",
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
        sqlx::query("INSERT INTO runs (id, mode, started_at) VALUES ($1, $2, $3)")
            .bind(id.as_str())
            .bind(mode.as_str())
            .bind(Utc::now())
            .execute(&self.pool)
            .await?;
        Ok(id)
    }

    async fn finish_run(&self, run_id: &RunId, counters: &RunCounters) -> Result<()> {
        let result = sqlx::query(
            "UPDATE runs SET finished_at = $1, queries = $2, candidates = $3, pages_fetched = $4,
                 leads_found = $5, leads_accepted = $6, leads_created = $7, leads_updated = $8,
                 errors = $9
             WHERE id = $10 AND finished_at IS NULL",
        )
        .bind(Utc::now())
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
             FROM runs WHERE id = $1",
        )
        .bind(run_id.as_str())
        .fetch_optional(&self.pool)
        .await?;
        row.map(RunRecord::try_from).transpose()
    }
}
