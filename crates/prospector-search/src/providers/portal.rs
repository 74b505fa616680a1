//! Direct listing crawler for classifieds and job portals.

use crate::error::{Result, SearchError};
use crate::provider::{
    push_unique, Candidate, ProviderKind, RotationState, SearchOutcome, SearchProvider,
    SearchRequest,
};
use async_trait::async_trait;
use prospector_catalog::PortalDefinition;
use prospector_core::RunMode;
use reqwest::Client;
use scraper::{Html, Selector};
use std::collections::HashSet;
use tracing::{debug, warn};
use url::Url;

/// Crawls the listing pages of one portal and returns detail-page URLs.
pub struct PortalCrawler {
    definition: PortalDefinition,
    label: String,
    selector: Selector,
    client: Client,
}

impl PortalCrawler {
    /// Create a crawler for a portal definition.
    ///
    /// Fails if the definition's detail selector isn't valid CSS.
    pub fn new(definition: PortalDefinition, client: Client) -> Result<Self> {
        let selector = Selector::parse(&definition.portal.detail_selector).map_err(|e| {
            SearchError::Config(format!(
                "portal '{}' has an invalid detail selector: {e}",
                definition.id()
            ))
        })?;
        Ok(Self {
            label: format!("portal:{}", definition.id()),
            definition,
            selector,
            client,
        })
    }

    /// The wrapped portal definition.
    #[must_use]
    pub fn definition(&self) -> &PortalDefinition {
        &self.definition
    }

    fn uses_query_placeholder(&self) -> bool {
        self.definition.portal.listing_url.contains("{query}")
    }

    async fn fetch_listing(&self, url: &str) -> Result<String> {
        let response = self.client.get(url).send().await?;
        let status = response.status();
        if !status.is_success() {
            return Err(SearchError::Status {
                provider: self.label.clone(),
                status: status.as_u16(),
            });
        }
        Ok(response.text().await?)
    }

    /// Detail links on one listing page, absolutised against the page URL.
    pub(crate) fn extract_links(&self, html: &str, page_url: &str) -> Vec<String> {
        let Ok(base) = Url::parse(page_url) else {
            return Vec::new();
        };
        let fragment = self.definition.portal.detail_url_contains.as_deref();
        let document = Html::parse_document(html);

        document
            .select(&self.selector)
            .filter_map(|el| el.value().attr("href"))
            .filter_map(|href| base.join(href.trim()).ok())
            .filter(|u| matches!(u.scheme(), "http" | "https"))
            .map(|mut u| {
                u.set_fragment(None);
                u.to_string()
            })
            .filter(|u| fragment.map_or(true, |f| u.contains(f)))
            .collect()
    }
}

#[async_trait]
impl SearchProvider for PortalCrawler {
    fn kind(&self) -> ProviderKind {
        ProviderKind::Portal
    }

    fn label(&self) -> &str {
        &self.label
    }

    fn is_configured(&self) -> bool {
        self.definition.portal.enabled
    }

    fn serves(&self, mode: RunMode) -> bool {
        self.definition.serves(mode)
    }

    fn uses_query(&self) -> bool {
        self.uses_query_placeholder()
    }

    async fn search(
        &self,
        request: &SearchRequest,
        _rotation: &mut RotationState,
    ) -> SearchOutcome {
        if !self.is_configured() {
            return SearchOutcome::not_configured();
        }

        let meta = &self.definition.portal;
        let pages = meta.max_pages.min(request.max_pages.max(1));
        let mut candidates = Vec::new();
        let mut seen = HashSet::new();

        for page in meta.first_page..meta.first_page + pages {
            let page_url = self.definition.listing_page_url(&request.query, page);
            let html = match self.fetch_listing(&page_url).await {
                Ok(html) => html,
                Err(e) if page == meta.first_page => {
                    warn!(portal = %self.label, url = %page_url, error = %e, "portal listing failed");
                    return SearchOutcome::errored(candidates, e);
                }
                Err(e) => {
                    debug!(portal = %self.label, page, error = %e, "stopping portal pagination");
                    break;
                }
            };

            let mut added = 0;
            for link in self.extract_links(&html, &page_url) {
                if candidates.len() >= request.max_results {
                    break;
                }
                let candidate = Candidate::new(link, None, ProviderKind::Portal);
                if push_unique(&mut candidates, &mut seen, candidate) {
                    added += 1;
                }
            }
            if added == 0 || candidates.len() >= request.max_results {
                break;
            }
        }

        debug!(portal = %self.label, count = candidates.len(), "portal crawl finished");
        SearchOutcome::completed(candidates)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use prospector_catalog::PortalMetadata;
    use prospector_core::PortalId;

    fn definition(selector: &str, contains: Option<&str>) -> PortalDefinition {
        PortalDefinition {
            portal: PortalMetadata {
                id: PortalId::new("test-portal").expect("valid id"),
                name: "Test".into(),
                listing_url: "https://portal.example/s?page={page}".into(),
                detail_selector: selector.into(),
                detail_url_contains: contains.map(str::to_string),
                max_pages: 2,
                first_page: 1,
                enabled: true,
                modes: vec![RunMode::JobSeekers],
            },
        }
    }

    #[test]
    fn test_invalid_selector_is_rejected() {
        let result = PortalCrawler::new(definition("a[[", None), Client::new());
        assert!(matches!(result, Err(SearchError::Config(_))));
    }

    #[test]
    fn test_extract_links_absolutises_and_filters() {
        let crawler =
            PortalCrawler::new(definition("a.ad", Some("/anzeige/")), Client::new()).expect("crawler");
        let html = r##"
            <a class="ad" href="/anzeige/123#top">A</a>
            <a class="ad" href="https://portal.example/anzeige/456">B</a>
            <a class="ad" href="/hilfe">C</a>
            <a class="other" href="/anzeige/789">D</a>"##;
        let links = crawler.extract_links(html, "https://portal.example/s?page=1");
        assert_eq!(
            links,
            vec![
                "https://portal.example/anzeige/123".to_string(),
                "https://portal.example/anzeige/456".to_string(),
            ]
        );
    }

    #[test]
    fn test_serves_follows_definition() {
        let crawler = PortalCrawler::new(definition("a", None), Client::new()).expect("crawler");
        assert!(crawler.serves(RunMode::JobSeekers));
        assert!(!crawler.serves(RunMode::Companies));
        assert!(!crawler.uses_query());
        assert_eq!(crawler.label(), "portal:test-portal");
    }
}
