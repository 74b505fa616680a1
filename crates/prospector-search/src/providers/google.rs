//! Indexed-search provider (Google Programmable Search JSON API).

use super::common::{
    build_api_client, is_quota_response, jittered_sleep, DEFAULT_ROTATION_BACKOFF_MS,
};
use crate::error::{Result, SearchError};
use crate::provider::{
    push_unique, Candidate, Freshness, ProviderKind, RotationState, SearchOutcome,
    SearchProvider, SearchRequest,
};
use async_trait::async_trait;
use prospector_core::ApiCredential;
use reqwest::Client;
use serde::Deserialize;
use std::collections::HashSet;
use std::ops::Range;
use tracing::{debug, info, warn};

const DEFAULT_BASE_URL: &str = "https://www.googleapis.com/customsearch/v1";

/// The API returns at most 10 items per request.
const MAX_PAGE_SIZE: u32 = 10;

/// Indexed-search provider with rotation over `(api_key, engine_id)` pairs.
pub struct GoogleSearchProvider {
    credentials: Vec<ApiCredential>,
    client: Client,
    base_url: String,
    page_size: u32,
    backoff_ms: Range<u64>,
}

enum PageResult {
    Items(Vec<Candidate>),
    Quota,
}

impl GoogleSearchProvider {
    /// Create a provider for the given credential pairs.
    pub fn new(credentials: Vec<ApiCredential>, timeout_secs: u64) -> Result<Self> {
        Ok(Self {
            credentials: credentials
                .into_iter()
                .filter(|c| !c.api_key.is_empty() && !c.engine_id.is_empty())
                .collect(),
            client: build_api_client(timeout_secs)?,
            base_url: DEFAULT_BASE_URL.to_string(),
            page_size: MAX_PAGE_SIZE,
            backoff_ms: DEFAULT_ROTATION_BACKOFF_MS,
        })
    }

    /// Point the provider at another endpoint.
    #[must_use]
    pub fn with_base_url(mut self, base_url: impl Into<String>) -> Self {
        self.base_url = base_url.into();
        self
    }

    /// Results requested per page (1..=10).
    #[must_use]
    pub fn with_page_size(mut self, page_size: u32) -> Self {
        self.page_size = page_size.clamp(1, MAX_PAGE_SIZE);
        self
    }

    /// Delay range applied before rotating to the next credential.
    #[must_use]
    pub fn with_backoff(mut self, backoff_ms: Range<u64>) -> Self {
        self.backoff_ms = backoff_ms;
        self
    }

    fn date_restrict(freshness: Freshness) -> String {
        format!("{}1", freshness.letter())
    }

    async fn fetch_page(
        &self,
        credential: &ApiCredential,
        request: &SearchRequest,
        page: u32,
    ) -> Result<PageResult> {
        let start = 1 + page * self.page_size;
        let mut params = vec![
            ("key", credential.api_key.clone()),
            ("cx", credential.engine_id.clone()),
            ("q", request.query.clone()),
            ("start", start.to_string()),
            ("num", self.page_size.to_string()),
        ];
        if let Some(freshness) = request.freshness {
            params.push(("dateRestrict", Self::date_restrict(freshness)));
        }

        let response = self.client.get(&self.base_url).query(&params).send().await?;
        let status = response.status().as_u16();
        if !response.status().is_success() {
            let body = response.text().await.unwrap_or_default();
            if is_quota_response(status, &body) {
                return Ok(PageResult::Quota);
            }
            return Err(SearchError::Status {
                provider: self.label().to_string(),
                status,
            });
        }

        let parsed: GoogleResponse = response.json().await.map_err(|e| SearchError::Parse {
            provider: self.label().to_string(),
            message: e.to_string(),
        })?;

        Ok(PageResult::Items(
            parsed
                .items
                .into_iter()
                .filter(|item| item.link.starts_with("http"))
                .map(|item| Candidate::new(item.link, item.snippet, ProviderKind::IndexedApi))
                .collect(),
        ))
    }
}

#[async_trait]
impl SearchProvider for GoogleSearchProvider {
    fn kind(&self) -> ProviderKind {
        ProviderKind::IndexedApi
    }

    fn label(&self) -> &str {
        "google"
    }

    fn is_configured(&self) -> bool {
        !self.credentials.is_empty()
    }

    async fn search(&self, request: &SearchRequest, rotation: &mut RotationState) -> SearchOutcome {
        let n = self.credentials.len();
        if n == 0 {
            return SearchOutcome::not_configured();
        }

        let mut candidates = Vec::new();
        let mut seen = HashSet::new();
        let mut page = 0;

        while page < request.max_pages && candidates.len() < request.max_results {
            let Some(index) = rotation.current(n) else {
                info!(query = %request.query, "all search credentials exhausted");
                return SearchOutcome::exhausted(candidates);
            };

            match self.fetch_page(&self.credentials[index], request, page).await {
                Ok(PageResult::Items(items)) => {
                    if items.is_empty() {
                        break;
                    }
                    for item in items {
                        if candidates.len() >= request.max_results {
                            break;
                        }
                        push_unique(&mut candidates, &mut seen, item);
                    }
                    page += 1;
                }
                Ok(PageResult::Quota) => {
                    warn!(credential = index, "search credential hit its quota, rotating");
                    rotation.mark_exhausted(n);
                    jittered_sleep(&self.backoff_ms).await;
                }
                Err(e) => {
                    warn!(query = %request.query, error = %e, "indexed search failed");
                    return SearchOutcome::errored(candidates, e);
                }
            }
        }

        debug!(query = %request.query, count = candidates.len(), "indexed search finished");
        SearchOutcome::completed(candidates)
    }
}

#[derive(Debug, Deserialize)]
struct GoogleResponse {
    #[serde(default)]
    items: Vec<GoogleItem>,
}

#[derive(Debug, Deserialize)]
struct GoogleItem {
    link: String,
    #[serde(default)]
    snippet: Option<String>,
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::provider::OutcomeStatus;

    fn credential(key: &str) -> ApiCredential {
        ApiCredential {
            api_key: key.to_string(),
            engine_id: "cx".to_string(),
        }
    }

    #[test]
    fn test_incomplete_credentials_are_dropped() {
        let provider = GoogleSearchProvider::new(
            vec![
                credential(""),
                ApiCredential {
                    api_key: "k".into(),
                    engine_id: String::new(),
                },
            ],
            5,
        )
        .expect("client");
        assert!(!provider.is_configured());
    }

    #[test]
    fn test_date_restrict_mapping() {
        assert_eq!(GoogleSearchProvider::date_restrict(Freshness::Week), "w1");
        assert_eq!(GoogleSearchProvider::date_restrict(Freshness::Month), "m1");
    }

    #[tokio::test]
    async fn test_unconfigured_search_is_flagged() {
        let provider = GoogleSearchProvider::new(vec![], 5).expect("client");
        let outcome = provider
            .search(&SearchRequest::new("vertrieb"), &mut RotationState::new())
            .await;
        assert_eq!(outcome.status, OutcomeStatus::NotConfigured);
        assert!(outcome.candidates.is_empty());
    }
}
