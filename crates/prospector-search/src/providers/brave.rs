//! Secondary API provider (Brave Search API).

use super::common::{
    build_api_client, is_quota_response, jittered_sleep, DEFAULT_ROTATION_BACKOFF_MS,
};
use crate::error::{Result, SearchError};
use crate::provider::{
    push_unique, Candidate, Freshness, ProviderKind, RotationState, SearchOutcome, SearchProvider,
    SearchRequest,
};
use async_trait::async_trait;
use reqwest::Client;
use serde::Deserialize;
use std::collections::HashSet;
use std::ops::Range;
use tracing::{debug, info, warn};

const DEFAULT_BASE_URL: &str = "https://api.search.brave.com/res/v1/web/search";

/// Secondary search API with key rotation.
pub struct BraveSearchProvider {
    api_keys: Vec<String>,
    client: Client,
    base_url: String,
    page_size: u32,
    backoff_ms: Range<u64>,
}

enum PageResult {
    Items(Vec<Candidate>),
    Quota,
}

impl BraveSearchProvider {
    /// Create a provider for the given subscription tokens.
    pub fn new(api_keys: Vec<String>, timeout_secs: u64) -> Result<Self> {
        Ok(Self {
            api_keys: api_keys.into_iter().filter(|k| !k.trim().is_empty()).collect(),
            client: build_api_client(timeout_secs)?,
            base_url: DEFAULT_BASE_URL.to_string(),
            page_size: 20,
            backoff_ms: DEFAULT_ROTATION_BACKOFF_MS,
        })
    }

    /// Point the provider at another endpoint.
    #[must_use]
    pub fn with_base_url(mut self, base_url: impl Into<String>) -> Self {
        self.base_url = base_url.into();
        self
    }

    /// Results requested per page (1..=20).
    #[must_use]
    pub fn with_page_size(mut self, page_size: u32) -> Self {
        self.page_size = page_size.clamp(1, 20);
        self
    }

    /// Delay range applied before rotating to the next key.
    #[must_use]
    pub fn with_backoff(mut self, backoff_ms: Range<u64>) -> Self {
        self.backoff_ms = backoff_ms;
        self
    }

    fn freshness_param(freshness: Freshness) -> String {
        format!("p{}", freshness.letter())
    }

    async fn fetch_page(
        &self,
        key: &str,
        request: &SearchRequest,
        page: u32,
    ) -> Result<PageResult> {
        let mut params = vec![
            ("q", request.query.clone()),
            ("count", self.page_size.to_string()),
            ("offset", page.to_string()),
        ];
        if let Some(freshness) = request.freshness {
            params.push(("freshness", Self::freshness_param(freshness)));
        }

        let response = self
            .client
            .get(&self.base_url)
            .header("Accept", "application/json")
            .header("X-Subscription-Token", key)
            .query(&params)
            .send()
            .await?;

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

        let parsed: BraveResponse = response.json().await.map_err(|e| SearchError::Parse {
            provider: self.label().to_string(),
            message: e.to_string(),
        })?;

        Ok(PageResult::Items(
            parsed
                .web
                .map(|w| w.results)
                .unwrap_or_default()
                .into_iter()
                .filter(|r| r.url.starts_with("http"))
                .map(|r| Candidate::new(r.url, r.description, ProviderKind::SecondaryApi))
                .collect(),
        ))
    }
}

#[async_trait]
impl SearchProvider for BraveSearchProvider {
    fn kind(&self) -> ProviderKind {
        ProviderKind::SecondaryApi
    }

    fn label(&self) -> &str {
        "brave"
    }

    fn is_configured(&self) -> bool {
        !self.api_keys.is_empty()
    }

    async fn search(&self, request: &SearchRequest, rotation: &mut RotationState) -> SearchOutcome {
        let n = self.api_keys.len();
        if n == 0 {
            return SearchOutcome::not_configured();
        }

        let mut candidates = Vec::new();
        let mut seen = HashSet::new();
        let mut page = 0;

        while page < request.max_pages && candidates.len() < request.max_results {
            let Some(index) = rotation.current(n) else {
                info!(query = %request.query, "all secondary search keys exhausted");
                return SearchOutcome::exhausted(candidates);
            };

            match self.fetch_page(&self.api_keys[index], request, page).await {
                Ok(PageResult::Items(items)) => {
                    if items.is_empty() {
                        break;
                    }
                    let before = candidates.len();
                    for item in items {
                        if candidates.len() >= request.max_results {
                            break;
                        }
                        push_unique(&mut candidates, &mut seen, item);
                    }
                    if candidates.len() == before {
                        break;
                    }
                    page += 1;
                }
                Ok(PageResult::Quota) => {
                    warn!(key = index, "secondary search key hit its quota, rotating");
                    rotation.mark_exhausted(n);
                    jittered_sleep(&self.backoff_ms).await;
                }
                Err(e) => {
                    warn!(query = %request.query, error = %e, "secondary search failed");
                    return SearchOutcome::errored(candidates, e);
                }
            }
        }

        debug!(query = %request.query, count = candidates.len(), "secondary search finished");
        SearchOutcome::completed(candidates)
    }
}

#[derive(Debug, Deserialize)]
struct BraveResponse {
    #[serde(default)]
    web: Option<BraveWeb>,
}

#[derive(Debug, Deserialize)]
struct BraveWeb {
    #[serde(default)]
    results: Vec<BraveResult>,
}

#[derive(Debug, Deserialize)]
struct BraveResult {
    url: String,
    #[serde(default)]
    description: Option<String>,
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_freshness_mapping() {
        assert_eq!(BraveSearchProvider::freshness_param(Freshness::Day), "pd");
        assert_eq!(BraveSearchProvider::freshness_param(Freshness::Year), "py");
    }

    #[test]
    fn test_blank_keys_are_ignored() {
        let provider =
            BraveSearchProvider::new(vec![" ".into(), String::new()], 5).expect("client");
        assert!(!provider.is_configured());
    }

    #[test]
    fn test_response_without_web_section() {
        let parsed: BraveResponse = serde_json::from_str(r#"{"type":"search"}"#).expect("parse");
        assert!(parsed.web.is_none());
    }
}
