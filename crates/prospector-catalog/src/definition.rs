//! Catalog entry types.
//!
//! This module defines the data structures for query templates, portal
//! definitions and domain lists loaded from TOML files.

use crate::error::{CatalogError, Result};
use prospector_core::{PortalId, RunMode};
use serde::{Deserialize, Serialize};

/// A search query template ("dork").
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct QueryTemplate {
    /// Query text as sent to the search providers
    pub text: String,

    /// Modes this query applies to; empty means every mode
    #[serde(default)]
    pub modes: Vec<RunMode>,

    /// Free-text tags copied onto leads found through this query
    #[serde(default)]
    pub tags: Vec<String>,

    /// Region hint copied onto leads
    #[serde(default)]
    pub region: Option<String>,

    /// Cold-start ordering; higher runs first
    #[serde(default = "default_priority")]
    pub priority: u8,
}

fn default_priority() -> u8 {
    1
}

impl QueryTemplate {
    /// Whether this query should be used in the given mode.
    #[must_use]
    pub fn applies_to(&self, mode: RunMode) -> bool {
        self.modes.is_empty() || self.modes.contains(&mode)
    }

    /// Validate the query.
    pub fn validate(&self) -> Result<()> {
        if self.text.trim().is_empty() {
            return Err(CatalogError::ValidationError {
                entry: "<query>".to_string(),
                reason: "query text cannot be empty".to_string(),
            });
        }
        Ok(())
    }
}

/// Shape of `queries.toml`.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct QueryFile {
    /// All queries in the file
    #[serde(default)]
    pub query: Vec<QueryTemplate>,
}

/// Complete portal definition loaded from `portals/<id>.toml`.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct PortalDefinition {
    /// Portal metadata and crawl settings
    pub portal: PortalMetadata,
}

/// Portal metadata and crawl settings.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct PortalMetadata {
    /// Unique portal identifier
    pub id: PortalId,

    /// Human-readable name
    pub name: String,

    /// Listing URL with a `{page}` placeholder and an optional `{query}` placeholder
    pub listing_url: String,

    /// CSS selector matching anchors to detail pages
    pub detail_selector: String,

    /// Only keep detail links whose URL contains this fragment
    #[serde(default)]
    pub detail_url_contains: Option<String>,

    /// Number of listing pages crawled per query
    #[serde(default = "default_max_pages")]
    pub max_pages: u32,

    /// Number of the first listing page
    #[serde(default = "default_first_page")]
    pub first_page: u32,

    /// Feature flag
    #[serde(default = "default_enabled")]
    pub enabled: bool,

    /// Modes this portal serves; empty means every mode
    #[serde(default)]
    pub modes: Vec<RunMode>,
}

fn default_max_pages() -> u32 {
    3
}

fn default_first_page() -> u32 {
    1
}

fn default_enabled() -> bool {
    true
}

impl PortalDefinition {
    /// Get the portal ID.
    #[must_use]
    pub fn id(&self) -> &PortalId {
        &self.portal.id
    }

    /// Get the portal name.
    #[must_use]
    pub fn name(&self) -> &str {
        &self.portal.name
    }

    /// Whether this portal is enabled for the given mode.
    #[must_use]
    pub fn serves(&self, mode: RunMode) -> bool {
        self.portal.enabled && (self.portal.modes.is_empty() || self.portal.modes.contains(&mode))
    }

    /// Build the listing URL for one page.
    ///
    /// The query is percent-encoded before substitution.
    #[must_use]
    pub fn listing_page_url(&self, query: &str, page: u32) -> String {
        let encoded: String = query
            .split_whitespace()
            .map(encode_component)
            .collect::<Vec<_>>()
            .join("+");
        self.portal
            .listing_url
            .replace("{page}", &page.to_string())
            .replace("{query}", &encoded)
    }

    /// Validate the portal definition.
    pub fn validate(&self) -> Result<()> {
        let invalid = |reason: &str| CatalogError::ValidationError {
            entry: self.portal.id.to_string(),
            reason: reason.to_string(),
        };

        if self.portal.name.is_empty() {
            return Err(invalid("portal name cannot be empty"));
        }
        if !self.portal.listing_url.starts_with("http") {
            return Err(invalid("listing_url must be an http(s) URL"));
        }
        if !self.portal.listing_url.contains("{page}") {
            return Err(invalid("listing_url must contain a {page} placeholder"));
        }
        if self.portal.detail_selector.trim().is_empty() {
            return Err(invalid("detail_selector cannot be empty"));
        }
        if self.portal.max_pages == 0 {
            return Err(invalid("max_pages must be at least 1"));
        }
        Ok(())
    }
}

fn encode_component(word: &str) -> String {
    let mut out = String::with_capacity(word.len());
    for byte in word.bytes() {
        match byte {
            b'A'..=b'Z' | b'a'..=b'z' | b'0'..=b'9' | b'-' | b'_' | b'.' | b'~' => {
                out.push(char::from(byte));
            }
            _ => out.push_str(&format!("%{byte:02X}")),
        }
    }
    out
}

/// Shape of `domains.toml`.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct DomainLists {
    /// Hosts never fetched (suffix match)
    #[serde(default)]
    pub blacklist: Vec<String>,

    /// Hosts always fetched even when they rank low
    #[serde(default)]
    pub allowlist: Vec<String>,

    /// Hosts known to hide phone numbers behind a reveal action
    #[serde(default)]
    pub reveal_hosts: Vec<String>,
}

impl DomainLists {
    /// Lower-case and strip leading dots and `www.` so suffix matching is uniform.
    #[must_use]
    pub fn normalized(self) -> Self {
        fn clean(list: Vec<String>) -> Vec<String> {
            let mut out: Vec<String> = list
                .into_iter()
                .map(|h| {
                    let h = h.trim().trim_start_matches('.').to_lowercase();
                    h.strip_prefix("www.").map(str::to_string).unwrap_or(h)
                })
                .filter(|h| !h.is_empty())
                .collect();
            out.sort();
            out.dedup();
            out
        }
        Self {
            blacklist: clean(self.blacklist),
            allowlist: clean(self.allowlist),
            reveal_hosts: clean(self.reveal_hosts),
        }
    }
}

/// True when `host` equals `domain` or is a subdomain of it.
#[must_use]
pub fn host_matches(host: &str, domain: &str) -> bool {
    let host = host.trim_end_matches('.');
    host == domain
        || host
            .strip_suffix(domain)
            .is_some_and(|prefix| prefix.ends_with('.'))
}

#[cfg(test)]
mod tests {
    use super::*;

    fn portal(listing_url: &str, max_pages: u32) -> PortalDefinition {
        PortalDefinition {
            portal: PortalMetadata {
                id: PortalId::new("test-portal").expect("valid portal ID"),
                name: "Test Portal".to_string(),
                listing_url: listing_url.to_string(),
                detail_selector: "a.result".to_string(),
                detail_url_contains: None,
                max_pages,
                first_page: 1,
                enabled: true,
                modes: vec![RunMode::JobSeekers],
            },
        }
    }

    #[test]
    fn test_listing_page_url_substitutes_placeholders() {
        let p = portal("https://jobs.example/s?q={query}&page={page}", 3);
        assert_eq!(
            p.listing_page_url("Vertrieb Köln", 2),
            "https://jobs.example/s?q=Vertrieb+K%C3%B6ln&page=2"
        );
    }

    #[test]
    fn test_portal_validation() {
        assert!(portal("https://jobs.example/s?page={page}", 3).validate().is_ok());
        assert!(portal("https://jobs.example/s", 3).validate().is_err());
        assert!(portal("https://jobs.example/s?page={page}", 0).validate().is_err());
        assert!(portal("ftp://jobs.example/{page}", 3).validate().is_err());
    }

    #[test]
    fn test_portal_serves_mode() {
        let mut p = portal("https://jobs.example/{page}", 1);
        assert!(p.serves(RunMode::JobSeekers));
        assert!(!p.serves(RunMode::Companies));
        p.portal.enabled = false;
        assert!(!p.serves(RunMode::JobSeekers));
    }

    #[test]
    fn test_query_applies_to() {
        let q = QueryTemplate {
            text: "vertrieb".to_string(),
            modes: vec![],
            tags: vec![],
            region: None,
            priority: 1,
        };
        assert!(q.applies_to(RunMode::Companies));
        assert!(q.validate().is_ok());

        let empty = QueryTemplate {
            text: "   ".to_string(),
            ..q
        };
        assert!(empty.validate().is_err());
    }

    #[test]
    fn test_host_matches_suffix() {
        assert!(host_matches("facebook.com", "facebook.com"));
        assert!(host_matches("de-de.facebook.com", "facebook.com"));
        assert!(!host_matches("notfacebook.com", "facebook.com"));
    }

    #[test]
    fn test_domain_lists_normalized() {
        let lists = DomainLists {
            blacklist: vec!["WWW.Xing.com".into(), ".linkedin.com".into(), "xing.com".into()],
            allowlist: vec![],
            reveal_hosts: vec![" ".into()],
        }
        .normalized();
        assert_eq!(lists.blacklist, vec!["linkedin.com", "xing.com"]);
        assert!(lists.reveal_hosts.is_empty());
    }
}
