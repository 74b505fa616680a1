//! Shared types used across the Prospector pipeline.
//!
//! This module defines common newtypes and enums that provide type safety
//! and clear domain modeling for runs, portals and leads.

use crate::error::CoreError;
use chrono::{DateTime, Utc};
use regex::Regex;
use serde::{Deserialize, Serialize};
use sha2::{Digest, Sha256};
use std::fmt;
use std::sync::OnceLock;

/// Newtype for discovery run identifiers.
///
/// Run IDs are UUID v4 strings generated when a cycle starts.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct RunId(String);

impl RunId {
    /// Create a new random `RunId`.
    #[must_use]
    pub fn generate() -> Self {
        Self(uuid::Uuid::new_v4().to_string())
    }

    /// Wrap an ID read back from storage.
    #[must_use]
    pub fn from_stored(id: impl Into<String>) -> Self {
        Self(id.into())
    }

    /// Get the inner string value.
    #[must_use]
    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl fmt::Display for RunId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.0)
    }
}

/// Newtype for portal identifiers with validation.
///
/// Portal IDs must be lowercase alphanumeric with hyphens, 3-50 characters.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(try_from = "String", into = "String")]
pub struct PortalId(String);

impl PortalId {
    /// Create a new `PortalId` from a string.
    ///
    /// # Errors
    /// Returns error if the ID doesn't match the required format.
    pub fn new(id: impl Into<String>) -> Result<Self, CoreError> {
        let id = id.into();
        Self::validate(&id)?;
        Ok(Self(id))
    }

    /// Get the inner string value.
    #[must_use]
    pub fn as_str(&self) -> &str {
        &self.0
    }

    fn validate(id: &str) -> Result<(), CoreError> {
        static PORTAL_REGEX: OnceLock<Regex> = OnceLock::new();
        let regex = PORTAL_REGEX
            .get_or_init(|| Regex::new(r"^[a-z0-9][a-z0-9-]{1,48}[a-z0-9]$").expect("valid regex"));

        if id.len() < 3 || id.len() > 50 {
            return Err(CoreError::Validation(format!(
                "invalid portal ID: must be 3-50 characters, got {} characters",
                id.len()
            )));
        }

        if regex.is_match(id) {
            Ok(())
        } else {
            Err(CoreError::Validation(format!(
                "invalid portal ID: must be lowercase alphanumeric with hyphens, got '{id}'"
            )))
        }
    }
}

impl TryFrom<String> for PortalId {
    type Error = CoreError;

    fn try_from(value: String) -> Result<Self, Self::Error> {
        Self::new(value)
    }
}

impl From<PortalId> for String {
    fn from(id: PortalId) -> Self {
        id.0
    }
}

impl fmt::Display for PortalId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.0)
    }
}

/// What a discovery run is looking for.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize, Default)]
#[serde(rename_all = "kebab-case")]
pub enum RunMode {
    /// Sales people who are actively looking for a new position
    #[default]
    JobSeekers,
    /// Companies that are recruiting sales staff
    Companies,
    /// Employed sales people who are not actively searching
    PassiveCandidates,
}

impl RunMode {
    /// Scoring policy that applies to leads discovered in this mode.
    #[must_use]
    pub fn policy(self) -> ScoringPolicy {
        match self {
            Self::JobSeekers | Self::Companies => ScoringPolicy::Recruiting,
            Self::PassiveCandidates => ScoringPolicy::PassiveCandidate,
        }
    }

    /// Stable string form used in storage and logs.
    #[must_use]
    pub fn as_str(self) -> &'static str {
        match self {
            Self::JobSeekers => "job-seekers",
            Self::Companies => "companies",
            Self::PassiveCandidates => "passive-candidates",
        }
    }

    /// Parse the stable string form.
    #[must_use]
    pub fn parse(s: &str) -> Option<Self> {
        match s {
            "job-seekers" => Some(Self::JobSeekers),
            "companies" => Some(Self::Companies),
            "passive-candidates" => Some(Self::PassiveCandidates),
            _ => None,
        }
    }
}

impl fmt::Display for RunMode {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Acceptance-score policy.
///
/// The two policies disagree on the polarity of some signals: explicit
/// job-seeking phrases are a bonus when recruiting and a penalty when
/// targeting passive candidates.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "kebab-case")]
pub enum ScoringPolicy {
    /// Recruiting companies or active job seekers
    Recruiting,
    /// Passively employed individuals
    PassiveCandidate,
}

/// Whether a lead is a person or an organisation.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize, Default)]
#[serde(rename_all = "snake_case")]
pub enum Party {
    /// Individual candidate
    Candidate,
    /// Company or recruiter
    Company,
    /// Not enough signal to decide
    #[default]
    Unknown,
}

impl Party {
    /// Stable string form used in storage.
    #[must_use]
    pub fn as_str(self) -> &'static str {
        match self {
            Self::Candidate => "candidate",
            Self::Company => "company",
            Self::Unknown => "unknown",
        }
    }

    /// Parse the stable string form, falling back to `Unknown`.
    #[must_use]
    pub fn parse(s: &str) -> Self {
        match s {
            "candidate" => Self::Candidate,
            "company" => Self::Company,
            _ => Self::Unknown,
        }
    }
}

/// Job-search status of an individual.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize, Default)]
#[serde(rename_all = "snake_case")]
pub enum SearchStatus {
    /// Actively searching
    JobSeeker,
    /// Currently employed, not searching
    Employed,
    /// Unknown
    #[default]
    Unknown,
}

impl SearchStatus {
    /// Stable string form used in storage.
    #[must_use]
    pub fn as_str(self) -> &'static str {
        match self {
            Self::JobSeeker => "job_seeker",
            Self::Employed => "employed",
            Self::Unknown => "unknown",
        }
    }

    /// Parse the stable string form, falling back to `Unknown`.
    #[must_use]
    pub fn parse(s: &str) -> Self {
        match s {
            "job_seeker" => Self::JobSeeker,
            "employed" => Self::Employed,
            _ => Self::Unknown,
        }
    }
}

/// Categorical labels attached to a lead.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize, Default)]
pub struct LeadClassification {
    /// Candidate vs. company
    pub party: Party,
    /// Job seeker vs. employed
    pub status: SearchStatus,
}

/// Confidence flags describing the quality of a lead's data.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize, Default)]
#[allow(clippy::struct_excessive_bools)]
pub struct DataQuality {
    /// Email looks personal (not info@, jobs@, ...)
    pub email_personal: bool,
    /// Phone normalized within plausible digit bounds
    pub phone_valid: bool,
    /// Name passed the plausibility check
    pub name_plausible: bool,
    /// A WhatsApp contact was found
    pub whatsapp: bool,
}

/// A discovered contact record.
///
/// Leads are unique per normalized email and per normalized phone. They are
/// only ever created or updated through the store's upsert path.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Lead {
    /// Person name
    pub name: Option<String>,
    /// Normalized (lower-case) email
    pub email: Option<String>,
    /// Phone in international format (`+49...`)
    pub phone: Option<String>,
    /// Company name
    pub company: Option<String>,
    /// Role or job title
    pub role: Option<String>,
    /// Region
    pub region: Option<String>,
    /// Industry tags
    pub industries: Vec<String>,
    /// Free-text tags
    pub tags: Vec<String>,
    /// Quality score (0-100)
    pub score: u8,
    /// Classification labels
    pub classification: LeadClassification,
    /// Page the lead was found on
    pub source_url: String,
    /// When the lead was first discovered
    pub discovered_at: DateTime<Utc>,
    /// Data-quality flags
    pub quality: DataQuality,
}

impl Lead {
    /// Create a lead for a source URL with every optional field empty.
    #[must_use]
    pub fn new(source_url: impl Into<String>) -> Self {
        Self {
            name: None,
            email: None,
            phone: None,
            company: None,
            role: None,
            region: None,
            industries: Vec::new(),
            tags: Vec::new(),
            score: 0,
            classification: LeadClassification::default(),
            source_url: source_url.into(),
            discovered_at: Utc::now(),
            quality: DataQuality::default(),
        }
    }

    /// A lead needs at least one dedup key to be stored.
    #[must_use]
    pub fn has_contact_key(&self) -> bool {
        self.email.as_deref().is_some_and(|e| !e.is_empty())
            || self.phone.as_deref().is_some_and(|p| !p.is_empty())
    }

    /// Normalized email dedup key, if any.
    #[must_use]
    pub fn email_key(&self) -> Option<String> {
        self.email
            .as_deref()
            .map(normalize_email)
            .filter(|e| !e.is_empty())
    }

    /// Normalized phone dedup key, if any.
    #[must_use]
    pub fn phone_key(&self) -> Option<String> {
        self.phone
            .as_deref()
            .map(normalize_phone_key)
            .filter(|p| !p.is_empty())
    }
}

/// Normalize an email for dedup: trimmed and lower-cased.
#[must_use]
pub fn normalize_email(email: &str) -> String {
    email
        .trim()
        .trim_start_matches("mailto:")
        .trim_end_matches('.')
        .to_lowercase()
}

/// Normalize a phone for dedup.
///
/// Separators and a bracketed trunk `(0)` are dropped and a `00` prefix
/// becomes `+`, so `+49 211 123456`, `+49 (0)211 123456` and `0049211123456`
/// share the key `+49211123456`.
/// National numbers without a country prefix keep their bare digits.
#[must_use]
pub fn normalize_phone_key(phone: &str) -> String {
    let unbracketed = phone.replace("(0)", "");
    let trimmed = unbracketed.trim();
    let digits: String = trimmed.chars().filter(char::is_ascii_digit).collect();
    if digits.is_empty() {
        return String::new();
    }
    if trimmed.starts_with('+') {
        format!("+{digits}")
    } else if let Some(rest) = digits.strip_prefix("00") {
        format!("+{rest}")
    } else {
        digits
    }
}

/// Normalize a query: whitespace collapsed and lower-cased.
#[must_use]
pub fn normalize_query(query: &str) -> String {
    query
        .split_whitespace()
        .collect::<Vec<_>>()
        .join(" ")
        .to_lowercase()
}

/// Stable hash of a normalized query, used as the performance-counter key.
#[must_use]
pub fn query_hash(query: &str) -> String {
    let mut hasher = Sha256::new();
    hasher.update(normalize_query(query).as_bytes());
    hex::encode(hasher.finalize())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_phone_key_ignores_formatting() {
        for raw in ["+49 211 123456", "+49 (0)211 12 34 56", " 0049211123456 ", "+49211123456"] {
            assert_eq!(normalize_phone_key(raw), "+49211123456", "{raw}");
        }
        assert_eq!(normalize_phone_key("0211 123456"), "0211123456");
        assert_eq!(normalize_phone_key("n/a"), "");

        let mut lead = Lead::new("https://example.de");
        lead.phone = Some("+49 (211) 123456".into());
        assert_eq!(lead.phone_key().as_deref(), Some("+49211123456"));
    }

    #[test]
    fn test_run_id_generate() {
        let id1 = RunId::generate();
        let id2 = RunId::generate();
        assert_ne!(id1, id2);
    }

    #[test]
    fn test_portal_id_valid() {
        for id in ["stepstone", "kleinanzeigen-jobs", "abc"] {
            assert!(PortalId::new(id).is_ok(), "Failed for: {id}");
        }
    }

    #[test]
    fn test_portal_id_invalid() {
        let too_long = "a".repeat(51);
        for id in ["AB", "Indeed", "job_board", "-jobs", "jobs-", too_long.as_str()] {
            assert!(PortalId::new(id).is_err(), "Should fail for: {id}");
        }
    }

    #[test]
    fn test_portal_id_deserialize_validates() {
        let ok: Result<PortalId, _> = serde_json::from_str("\"stepstone\"");
        assert!(ok.is_ok());
        let bad: Result<PortalId, _> = serde_json::from_str("\"Bad Id\"");
        assert!(bad.is_err());
    }

    #[test]
    fn test_run_mode_policy() {
        assert_eq!(RunMode::JobSeekers.policy(), ScoringPolicy::Recruiting);
        assert_eq!(RunMode::Companies.policy(), ScoringPolicy::Recruiting);
        assert_eq!(
            RunMode::PassiveCandidates.policy(),
            ScoringPolicy::PassiveCandidate
        );
    }

    #[test]
    fn test_run_mode_round_trip_strings() {
        for mode in [
            RunMode::JobSeekers,
            RunMode::Companies,
            RunMode::PassiveCandidates,
        ] {
            assert_eq!(RunMode::parse(mode.as_str()), Some(mode));
        }
        assert_eq!(RunMode::parse("everything"), None);
    }

    #[test]
    fn test_normalize_email() {
        assert_eq!(normalize_email("  Max.Muster@Example.DE "), "max.muster@example.de");
        assert_eq!(normalize_email("mailto:info@firma.de"), "info@firma.de");
    }

    #[test]
    fn test_query_hash_ignores_case_and_spacing() {
        assert_eq!(
            query_hash("Vertrieb   Außendienst  Köln"),
            query_hash("vertrieb außendienst köln")
        );
        assert_ne!(query_hash("vertrieb köln"), query_hash("vertrieb bonn"));
        assert_eq!(query_hash("x").len(), 64);
    }

    #[test]
    fn test_lead_contact_key() {
        let mut lead = Lead::new("https://example.com/kontakt");
        assert!(!lead.has_contact_key());
        lead.phone = Some("+49211123456".to_string());
        assert!(lead.has_contact_key());
        lead.email = Some(" Anna@Firma.de".to_string());
        assert_eq!(lead.email_key().as_deref(), Some("anna@firma.de"));
    }
}
