//! Short-lived query-result cache.

use crate::provider::Candidate;
use prospector_core::normalize_query;
use std::collections::HashMap;
use std::time::{Duration, Instant};

#[derive(Debug, Clone)]
struct Entry {
    candidates: Vec<Candidate>,
    expires_at: Instant,
}

/// Cache of successful provider results keyed by provider label and
/// normalized query text.
#[derive(Debug, Clone)]
pub struct QueryCache {
    ttl: Duration,
    entries: HashMap<(String, String), Entry>,
}

impl QueryCache {
    /// Create a cache whose entries live for `ttl`.
    #[must_use]
    pub fn new(ttl: Duration) -> Self {
        Self {
            ttl,
            entries: HashMap::new(),
        }
    }

    /// Create a cache with a TTL in hours. Zero disables caching.
    #[must_use]
    pub fn with_ttl_hours(hours: u64) -> Self {
        Self::new(Duration::from_secs(hours * 3600))
    }

    fn key(provider: &str, query: &str) -> (String, String) {
        (provider.to_string(), normalize_query(query))
    }

    /// Cached candidates, if present and unexpired.
    #[must_use]
    pub fn get(&self, provider: &str, query: &str) -> Option<Vec<Candidate>> {
        self.entries
            .get(&Self::key(provider, query))
            .filter(|e| e.expires_at > Instant::now())
            .map(|e| e.candidates.clone())
    }

    /// Store candidates for a provider/query pair.
    pub fn insert(&mut self, provider: &str, query: &str, candidates: Vec<Candidate>) {
        if self.ttl.is_zero() {
            return;
        }
        self.entries.insert(
            Self::key(provider, query),
            Entry {
                candidates,
                expires_at: Instant::now() + self.ttl,
            },
        );
    }

    /// Drop expired entries and return how many were removed.
    pub fn purge_expired(&mut self) -> usize {
        let now = Instant::now();
        let before = self.entries.len();
        self.entries.retain(|_, e| e.expires_at > now);
        before - self.entries.len()
    }

    /// Number of entries, expired ones included.
    #[must_use]
    pub fn len(&self) -> usize {
        self.entries.len()
    }

    /// Whether the cache holds no entries.
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::provider::ProviderKind;

    fn candidate() -> Candidate {
        Candidate::new("https://a.example/kontakt", None, ProviderKind::WebSearch)
    }

    #[test]
    fn test_cache_normalizes_query() {
        let mut cache = QueryCache::with_ttl_hours(24);
        cache.insert("google", "Vertrieb  Köln", vec![candidate()]);
        assert_eq!(cache.get("google", "vertrieb köln").map(|c| c.len()), Some(1));
        assert!(cache.get("brave", "vertrieb köln").is_none());
    }

    #[test]
    fn test_zero_ttl_disables_cache() {
        let mut cache = QueryCache::with_ttl_hours(0);
        cache.insert("google", "q", vec![candidate()]);
        assert!(cache.is_empty());
    }

    #[test]
    fn test_expired_entries_are_ignored() {
        let mut cache = QueryCache::new(Duration::from_millis(1));
        cache.insert("google", "q", vec![candidate()]);
        std::thread::sleep(Duration::from_millis(5));
        assert!(cache.get("google", "q").is_none());
        assert_eq!(cache.purge_expired(), 1);
    }
}
