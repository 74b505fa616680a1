//! In-memory catalog registry with query support.

use crate::{
    definition::{host_matches, DomainLists, PortalDefinition, QueryTemplate},
    error::{CatalogError, Result},
    loader::{Catalog, CatalogLoader},
};
use prospector_core::{PortalId, RunMode};
use std::collections::HashMap;
use std::sync::{Arc, PoisonError, RwLock};
use tracing::info;

#[derive(Debug, Default)]
struct Inner {
    queries: Vec<QueryTemplate>,
    portals: HashMap<PortalId, PortalDefinition>,
    domains: DomainLists,
}

/// In-memory cache of the catalog.
///
/// Read-only to the discovery pipeline; `reload` swaps the whole catalog.
#[derive(Clone, Default)]
pub struct CatalogRegistry {
    inner: Arc<RwLock<Inner>>,
}

impl CatalogRegistry {
    /// Create an empty registry.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Create a registry populated from an already loaded catalog.
    #[must_use]
    pub fn from_catalog(catalog: Catalog) -> Self {
        let registry = Self::new();
        registry.replace(catalog);
        registry
    }

    /// Create a registry and load the catalog from the given loader.
    pub fn load_from(loader: &CatalogLoader) -> Result<Self> {
        let registry = Self::new();
        registry.reload(loader)?;
        Ok(registry)
    }

    /// Reload the catalog, replacing the current contents.
    pub fn reload(&self, loader: &CatalogLoader) -> Result<()> {
        let catalog = loader.load()?;
        self.replace(catalog);
        Ok(())
    }

    fn replace(&self, catalog: Catalog) {
        let mut inner = self.inner.write().unwrap_or_else(PoisonError::into_inner);
        inner.queries = catalog.queries;
        inner.portals = catalog
            .portals
            .into_iter()
            .map(|p| (p.id().clone(), p))
            .collect();
        inner.domains = catalog.domains;
        info!(
            queries = inner.queries.len(),
            portals = inner.portals.len(),
            "catalog registry updated"
        );
    }

    /// Queries applicable to a mode, highest priority first.
    #[must_use]
    pub fn queries_for(&self, mode: RunMode) -> Vec<QueryTemplate> {
        let inner = self.inner.read().unwrap_or_else(PoisonError::into_inner);
        let mut queries: Vec<QueryTemplate> = inner
            .queries
            .iter()
            .filter(|q| q.applies_to(mode))
            .cloned()
            .collect();
        queries.sort_by(|a, b| b.priority.cmp(&a.priority));
        queries
    }

    /// Look up a query template by its text.
    #[must_use]
    pub fn query(&self, text: &str) -> Option<QueryTemplate> {
        let inner = self.inner.read().unwrap_or_else(PoisonError::into_inner);
        let key = prospector_core::normalize_query(text);
        inner
            .queries
            .iter()
            .find(|q| prospector_core::normalize_query(&q.text) == key)
            .cloned()
    }

    /// Get a portal by ID.
    pub fn portal(&self, id: &PortalId) -> Result<PortalDefinition> {
        let inner = self.inner.read().unwrap_or_else(PoisonError::into_inner);
        inner
            .portals
            .get(id)
            .cloned()
            .ok_or_else(|| CatalogError::NotFound {
                portal_id: id.to_string(),
            })
    }

    /// Enabled portals serving a mode, ordered by ID.
    #[must_use]
    pub fn portals_for(&self, mode: RunMode) -> Vec<PortalDefinition> {
        let inner = self.inner.read().unwrap_or_else(PoisonError::into_inner);
        let mut portals: Vec<PortalDefinition> = inner
            .portals
            .values()
            .filter(|p| p.serves(mode))
            .cloned()
            .collect();
        portals.sort_by(|a, b| a.id().as_str().cmp(b.id().as_str()));
        portals
    }

    /// Whether a host is blacklisted (exact or subdomain match).
    #[must_use]
    pub fn is_blacklisted(&self, host: &str) -> bool {
        let inner = self.inner.read().unwrap_or_else(PoisonError::into_inner);
        let host = host.to_lowercase();
        inner.domains.blacklist.iter().any(|d| host_matches(&host, d))
    }

    /// Whether a host is allowlisted (exact or subdomain match).
    #[must_use]
    pub fn is_allowlisted(&self, host: &str) -> bool {
        let inner = self.inner.read().unwrap_or_else(PoisonError::into_inner);
        let host = host.to_lowercase();
        inner.domains.allowlist.iter().any(|d| host_matches(&host, d))
    }

    /// Whether a host hides phone numbers behind a reveal action.
    #[must_use]
    pub fn hides_phone(&self, host: &str) -> bool {
        let inner = self.inner.read().unwrap_or_else(PoisonError::into_inner);
        let host = host.to_lowercase();
        inner
            .domains
            .reveal_hosts
            .iter()
            .any(|d| host_matches(&host, d))
    }

    /// Total number of queries.
    #[must_use]
    pub fn query_count(&self) -> usize {
        self.inner
            .read()
            .unwrap_or_else(PoisonError::into_inner)
            .queries
            .len()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn registry() -> CatalogRegistry {
        CatalogRegistry::load_from(&CatalogLoader::builtin()).expect("load builtin catalog")
    }

    #[test]
    fn test_queries_sorted_by_priority() {
        let queries = registry().queries_for(RunMode::JobSeekers);
        assert!(!queries.is_empty());
        assert!(queries.windows(2).all(|w| w[0].priority >= w[1].priority));
        assert!(queries.iter().all(|q| q.applies_to(RunMode::JobSeekers)));
    }

    #[test]
    fn test_blacklist_suffix_match() {
        let registry = registry();
        assert!(registry.is_blacklisted("de.linkedin.com"));
        assert!(registry.is_blacklisted("WWW.XING.COM"));
        assert!(!registry.is_blacklisted("vertrieb-partner.de"));
    }

    #[test]
    fn test_reveal_and_allow_lists() {
        let registry = registry();
        assert!(registry.hides_phone("www.kleinanzeigen.de"));
        assert!(registry.is_allowlisted("kleinanzeigen.de"));
        assert!(!registry.hides_phone("firma.de"));
    }

    #[test]
    fn test_portals_for_mode_skips_disabled() {
        let registry = registry();
        let portals = registry.portals_for(RunMode::JobSeekers);
        assert!(portals.iter().all(|p| p.portal.enabled));
        assert!(registry.portals_for(RunMode::Companies).is_empty());

        let id = PortalId::new("markt-stellengesuche").expect("valid portal ID");
        assert!(registry.portal(&id).is_ok());
        let missing = PortalId::new("missing-portal").expect("valid portal ID");
        assert!(matches!(
            registry.portal(&missing),
            Err(CatalogError::NotFound { .. })
        ));
    }

    #[test]
    fn test_query_lookup_normalizes() {
        let registry = CatalogRegistry::from_catalog(Catalog {
            queries: vec![QueryTemplate {
                text: "Vertrieb  Köln".to_string(),
                modes: vec![],
                tags: vec!["koeln".to_string()],
                region: Some("Köln".to_string()),
                priority: 1,
            }],
            ..Catalog::default()
        });
        let found = registry.query("vertrieb köln").expect("query found");
        assert_eq!(found.region.as_deref(), Some("Köln"));
        assert_eq!(registry.query_count(), 1);
    }
}
