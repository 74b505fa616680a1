//! Records exchanged with the store.

use chrono::{DateTime, Duration, Utc};
use prospector_core::{
    DataQuality, Lead, LeadClassification, Party, RunId, RunMode, SearchStatus, StorageConfig,
};
use serde::{Deserialize, Serialize};

use crate::error::{Result, StoreError};

/// Result of an upsert.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct UpsertOutcome {
    /// Row ID of the lead
    pub id: i64,
    /// True when a new row was inserted, false when an existing one was updated
    pub created: bool,
}

/// A lead as stored, with its row ID.
#[derive(Debug, Clone, PartialEq)]
pub struct StoredLead {
    /// Row ID
    pub id: i64,
    /// The lead
    pub lead: Lead,
    /// Last update time
    pub updated_at: DateTime<Utc>,
}

/// Aggregate counters for one query ("dork").
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct DorkStats {
    /// SHA-256 of the normalized query
    pub query_hash: String,
    /// Normalized query text
    pub query: String,
    /// Times the query was issued
    pub uses: u64,
    /// Leads extracted from its results
    pub leads_found: u64,
    /// Leads with a phone number
    pub leads_with_phone: u64,
    /// Leads that passed the acceptance threshold
    pub accepted: u64,
    /// Last time the query was issued
    pub last_used_at: DateTime<Utc>,
}

impl DorkStats {
    /// `accepted / max(1, uses)`.
    #[must_use]
    #[allow(clippy::cast_precision_loss)]
    pub fn success_rate(&self) -> f64 {
        self.accepted as f64 / self.uses.max(1) as f64
    }
}

/// Aggregate counters for one source domain.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct SourceStats {
    /// Registrable host
    pub domain: String,
    /// Pages fetched from the domain
    pub hits: u64,
    /// Leads extracted
    pub leads_found: u64,
    /// Leads with a phone number
    pub leads_with_phone: u64,
    /// Last fetch time
    pub last_hit_at: DateTime<Utc>,
}

impl SourceStats {
    /// Leads (phone leads count double) per fetched page.
    #[must_use]
    #[allow(clippy::cast_precision_loss)]
    pub fn yield_rate(&self) -> f64 {
        (self.leads_found + self.leads_with_phone) as f64 / self.hits.max(1) as f64
    }
}

/// Aggregate counters for one extraction pattern.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct PatternStats {
    /// Pattern label
    pub pattern: String,
    /// Times the pattern produced a candidate
    pub attempts: u64,
    /// Times that candidate became an accepted lead
    pub successes: u64,
}

/// Outcome counters of one run.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct RunCounters {
    /// Queries issued
    pub queries: u64,
    /// Candidate URLs returned by providers
    pub candidates: u64,
    /// Pages fetched successfully
    pub pages_fetched: u64,
    /// Contacts extracted
    pub leads_found: u64,
    /// Contacts that passed the score threshold
    pub leads_accepted: u64,
    /// New lead rows
    pub leads_created: u64,
    /// Existing lead rows updated
    pub leads_updated: u64,
    /// Soft failures (fetch, store)
    pub errors: u64,
}

impl RunCounters {
    /// Add another set of counters to this one.
    pub fn absorb(&mut self, other: &Self) {
        self.queries += other.queries;
        self.candidates += other.candidates;
        self.pages_fetched += other.pages_fetched;
        self.leads_found += other.leads_found;
        self.leads_accepted += other.leads_accepted;
        self.leads_created += other.leads_created;
        self.leads_updated += other.leads_updated;
        self.errors += other.errors;
    }
}

/// One discovery-cycle execution.
#[derive(Debug, Clone, PartialEq)]
pub struct RunRecord {
    /// Run ID
    pub id: RunId,
    /// Mode the run was executed in
    pub mode: RunMode,
    /// Start time
    pub started_at: DateTime<Utc>,
    /// End time, set once when the run is closed
    pub finished_at: Option<DateTime<Utc>>,
    /// Outcome counters
    pub counters: RunCounters,
}

/// Freshness and retention windows.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Retention {
    /// Days before an executed query may be re-issued
    pub query_freshness_days: u32,
    /// Days a seen URL stays blocked
    pub url_retention_days: u32,
}

impl Default for Retention {
    fn default() -> Self {
        Self {
            query_freshness_days: 14,
            url_retention_days: 90,
        }
    }
}

impl Retention {
    /// Build from storage configuration.
    #[must_use]
    pub fn from_config(config: &StorageConfig) -> Self {
        Self {
            query_freshness_days: config.query_freshness_days,
            url_retention_days: config.url_retention_days,
        }
    }

    /// Oldest `executed_at` that still counts as done.
    #[must_use]
    pub fn query_cutoff(&self, now: DateTime<Utc>) -> DateTime<Utc> {
        now - Duration::days(i64::from(self.query_freshness_days))
    }

    /// Oldest `first_seen_at` that still counts as seen.
    #[must_use]
    pub fn url_cutoff(&self, now: DateTime<Utc>) -> DateTime<Utc> {
        now - Duration::days(i64::from(self.url_retention_days))
    }
}

/// Merge a newly discovered lead into a stored one.
///
/// Missing fields are filled, the higher score wins, tags and industries are
/// unioned, quality flags are OR-ed. Existing data is never blanked.
#[must_use]
pub fn merge_lead(existing: &Lead, incoming: &Lead) -> Lead {
    fn fill(current: &Option<String>, new: &Option<String>) -> Option<String> {
        match current {
            Some(v) if !v.is_empty() => Some(v.clone()),
            _ => new.clone().filter(|v| !v.is_empty()),
        }
    }

    fn union(current: &[String], new: &[String]) -> Vec<String> {
        let mut out = current.to_vec();
        for item in new {
            if !out.contains(item) {
                out.push(item.clone());
            }
        }
        out
    }

    let better = incoming.score > existing.score;
    let classification = LeadClassification {
        party: match (existing.classification.party, incoming.classification.party) {
            (Party::Unknown, p) => p,
            (p, Party::Unknown) => p,
            (old, new) => {
                if better {
                    new
                } else {
                    old
                }
            }
        },
        status: match (existing.classification.status, incoming.classification.status) {
            (SearchStatus::Unknown, s) => s,
            (s, SearchStatus::Unknown) => s,
            (old, new) => {
                if better {
                    new
                } else {
                    old
                }
            }
        },
    };

    Lead {
        name: fill(&existing.name, &incoming.name),
        email: fill(&existing.email, &incoming.email),
        phone: fill(&existing.phone, &incoming.phone),
        company: fill(&existing.company, &incoming.company),
        role: fill(&existing.role, &incoming.role),
        region: fill(&existing.region, &incoming.region),
        industries: union(&existing.industries, &incoming.industries),
        tags: union(&existing.tags, &incoming.tags),
        score: existing.score.max(incoming.score),
        classification,
        source_url: if better {
            incoming.source_url.clone()
        } else {
            existing.source_url.clone()
        },
        discovered_at: existing.discovered_at.min(incoming.discovered_at),
        quality: DataQuality {
            email_personal: existing.quality.email_personal || incoming.quality.email_personal,
            phone_valid: existing.quality.phone_valid || incoming.quality.phone_valid,
            name_plausible: existing.quality.name_plausible || incoming.quality.name_plausible,
            whatsapp: existing.quality.whatsapp || incoming.quality.whatsapp,
        },
    }
}

/// Dedup keys of a lead, normalized.
pub(crate) fn lead_keys(lead: &Lead) -> Result<(Option<String>, Option<String>)> {
    let email = lead.email_key();
    let phone = lead.phone_key();
    if email.is_none() && phone.is_none() {
        return Err(StoreError::Invalid(format!(
            "lead from {} has neither email nor phone",
            lead.source_url
        )));
    }
    Ok((email, phone))
}

/// Row shape shared by both SQL backends.
#[derive(Debug, sqlx::FromRow)]
pub(crate) struct LeadRow {
    pub id: i64,
    pub name: Option<String>,
    pub email: Option<String>,
    pub phone: Option<String>,
    pub company: Option<String>,
    pub role: Option<String>,
    pub region: Option<String>,
    pub industries: String,
    pub tags: String,
    pub score: i64,
    pub party: String,
    pub search_status: String,
    pub email_personal: bool,
    pub phone_valid: bool,
    pub name_plausible: bool,
    pub whatsapp: bool,
    pub source_url: String,
    pub discovered_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

impl TryFrom<LeadRow> for StoredLead {
    type Error = StoreError;

    fn try_from(row: LeadRow) -> Result<Self> {
        let decode_list = |raw: &str, column: &str| -> Result<Vec<String>> {
            serde_json::from_str(raw)
                .map_err(|e| StoreError::Decode(format!("invalid {column} JSON '{raw}': {e}")))
        };

        Ok(Self {
            id: row.id,
            lead: Lead {
                name: row.name,
                email: row.email,
                phone: row.phone,
                company: row.company,
                role: row.role,
                region: row.region,
                industries: decode_list(&row.industries, "industries")?,
                tags: decode_list(&row.tags, "tags")?,
                score: u8::try_from(row.score.clamp(0, 100)).unwrap_or(0),
                classification: LeadClassification {
                    party: Party::parse(&row.party),
                    status: SearchStatus::parse(&row.search_status),
                },
                source_url: row.source_url,
                discovered_at: row.discovered_at,
                quality: DataQuality {
                    email_personal: row.email_personal,
                    phone_valid: row.phone_valid,
                    name_plausible: row.name_plausible,
                    whatsapp: row.whatsapp,
                },
            },
            updated_at: row.updated_at,
        })
    }
}

#[derive(Debug, sqlx::FromRow)]
pub(crate) struct DorkRow {
    pub query_hash: String,
    pub query: String,
    pub uses: i64,
    pub leads_found: i64,
    pub leads_with_phone: i64,
    pub accepted: i64,
    pub last_used_at: DateTime<Utc>,
}

impl From<DorkRow> for DorkStats {
    fn from(row: DorkRow) -> Self {
        Self {
            query_hash: row.query_hash,
            query: row.query,
            uses: to_u64(row.uses),
            leads_found: to_u64(row.leads_found),
            leads_with_phone: to_u64(row.leads_with_phone),
            accepted: to_u64(row.accepted),
            last_used_at: row.last_used_at,
        }
    }
}

#[derive(Debug, sqlx::FromRow)]
pub(crate) struct SourceRow {
    pub domain: String,
    pub hits: i64,
    pub leads_found: i64,
    pub leads_with_phone: i64,
    pub last_hit_at: DateTime<Utc>,
}

impl From<SourceRow> for SourceStats {
    fn from(row: SourceRow) -> Self {
        Self {
            domain: row.domain,
            hits: to_u64(row.hits),
            leads_found: to_u64(row.leads_found),
            leads_with_phone: to_u64(row.leads_with_phone),
            last_hit_at: row.last_hit_at,
        }
    }
}

#[derive(Debug, sqlx::FromRow)]
pub(crate) struct PatternRow {
    pub pattern: String,
    pub attempts: i64,
    pub successes: i64,
}

impl From<PatternRow> for PatternStats {
    fn from(row: PatternRow) -> Self {
        Self {
            pattern: row.pattern,
            attempts: to_u64(row.attempts),
            successes: to_u64(row.successes),
        }
    }
}

#[derive(Debug, sqlx::FromRow)]
pub(crate) struct RunRow {
    pub id: String,
    pub mode: String,
    pub started_at: DateTime<Utc>,
    pub finished_at: Option<DateTime<Utc>>,
    pub queries: i64,
    pub candidates: i64,
    pub pages_fetched: i64,
    pub leads_found: i64,
    pub leads_accepted: i64,
    pub leads_created: i64,
    pub leads_updated: i64,
    pub errors: i64,
}

impl TryFrom<RunRow> for RunRecord {
    type Error = StoreError;

    fn try_from(row: RunRow) -> Result<Self> {
        let mode = RunMode::parse(&row.mode)
            .ok_or_else(|| StoreError::Decode(format!("invalid run mode '{}'", row.mode)))?;
        Ok(Self {
            id: RunId::from_stored(row.id),
            mode,
            started_at: row.started_at,
            finished_at: row.finished_at,
            counters: RunCounters {
                queries: to_u64(row.queries),
                candidates: to_u64(row.candidates),
                pages_fetched: to_u64(row.pages_fetched),
                leads_found: to_u64(row.leads_found),
                leads_accepted: to_u64(row.leads_accepted),
                leads_created: to_u64(row.leads_created),
                leads_updated: to_u64(row.leads_updated),
                errors: to_u64(row.errors),
            },
        })
    }
}

pub(crate) fn to_u64(v: i64) -> u64 {
    u64::try_from(v).unwrap_or(0)
}

pub(crate) fn to_i64(v: u64) -> i64 {
    i64::try_from(v).unwrap_or(i64::MAX)
}

pub(crate) fn encode_list(items: &[String]) -> String {
    serde_json::to_string(items).unwrap_or_else(|_| "[]".to_string())
}

#[cfg(test)]
mod tests {
    use super::*;

    fn lead(score: u8) -> Lead {
        let mut lead = Lead::new("https://a.example/kontakt");
        lead.score = score;
        lead
    }

    #[test]
    fn test_merge_fills_missing_and_keeps_existing() {
        let mut existing = lead(50);
        existing.name = Some("Thomas Weber".into());
        existing.phone = Some("+49211123456".into());
        existing.tags = vec!["vertrieb".into()];

        let mut incoming = lead(30);
        incoming.name = Some("T. Weber".into());
        incoming.email = Some("thomas.weber@firma.de".into());
        incoming.tags = vec!["vertrieb".into(), "nrw".into()];
        incoming.quality.whatsapp = true;

        let merged = merge_lead(&existing, &incoming);
        assert_eq!(merged.name.as_deref(), Some("Thomas Weber"));
        assert_eq!(merged.email.as_deref(), Some("thomas.weber@firma.de"));
        assert_eq!(merged.score, 50);
        assert_eq!(merged.tags, vec!["vertrieb", "nrw"]);
        assert!(merged.quality.whatsapp);
        assert_eq!(merged.source_url, existing.source_url);
    }

    #[test]
    fn test_merge_higher_score_wins() {
        let existing = lead(20);
        let mut incoming = lead(70);
        incoming.source_url = "https://b.example/team".into();
        incoming.classification.party = Party::Company;

        let merged = merge_lead(&existing, &incoming);
        assert_eq!(merged.score, 70);
        assert_eq!(merged.source_url, "https://b.example/team");
        assert_eq!(merged.classification.party, Party::Company);
    }

    #[test]
    fn test_lead_keys_require_contact() {
        assert!(lead_keys(&lead(10)).is_err());
        let mut l = lead(10);
        l.email = Some("Max@Firma.DE".into());
        let (email, phone) = lead_keys(&l).expect("keys");
        assert_eq!(email.as_deref(), Some("max@firma.de"));
        assert!(phone.is_none());
    }

    #[test]
    fn test_success_rate_guards_zero_uses() {
        let stats = DorkStats {
            query_hash: "h".into(),
            query: "q".into(),
            uses: 0,
            leads_found: 0,
            leads_with_phone: 0,
            accepted: 0,
            last_used_at: Utc::now(),
        };
        assert!((stats.success_rate() - 0.0).abs() < f64::EPSILON);
    }

    #[test]
    fn test_run_counters_absorb() {
        let mut a = RunCounters {
            queries: 1,
            errors: 2,
            ..RunCounters::default()
        };
        a.absorb(&RunCounters {
            queries: 3,
            leads_created: 1,
            ..RunCounters::default()
        });
        assert_eq!(a.queries, 4);
        assert_eq!(a.errors, 2);
        assert_eq!(a.leads_created, 1);
    }
}
