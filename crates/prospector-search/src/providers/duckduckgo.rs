//! Keyless web-search provider (DuckDuckGo HTML endpoint).

use super::common::build_html_client;
use crate::error::{Result, SearchError};
use crate::provider::{
    push_unique, Candidate, ProviderKind, RotationState, SearchOutcome, SearchProvider,
    SearchRequest,
};
use async_trait::async_trait;
use reqwest::Client;
use scraper::{Html, Selector};
use std::collections::HashSet;
use std::sync::OnceLock;
use std::time::Duration;
use tracing::{debug, warn};
use url::Url;

const DEFAULT_BASE_URL: &str = "https://html.duckduckgo.com/html/";

/// Keyless web search over the HTML results page.
///
/// Only the first results page is read. Transient connect and timeout errors
/// get one retry; every other failure ends the call.
pub struct DuckDuckGoProvider {
    enabled: bool,
    client: Client,
    base_url: String,
    retry_delay: Duration,
}

impl DuckDuckGoProvider {
    /// Create the provider.
    ///
    /// `proxy` routes every request through the given proxy URL. `direct`
    /// ignores proxy settings inherited from the environment.
    pub fn new(
        enabled: bool,
        timeout_secs: u64,
        proxy: Option<&str>,
        direct: bool,
    ) -> Result<Self> {
        Ok(Self {
            enabled,
            client: build_html_client(timeout_secs, proxy, direct)?,
            base_url: DEFAULT_BASE_URL.to_string(),
            retry_delay: Duration::from_millis(1500),
        })
    }

    /// Point the provider at another endpoint.
    #[must_use]
    pub fn with_base_url(mut self, base_url: impl Into<String>) -> Self {
        self.base_url = base_url.into();
        self
    }

    /// Delay before the single retry.
    #[must_use]
    pub fn with_retry_delay(mut self, delay: Duration) -> Self {
        self.retry_delay = delay;
        self
    }

    async fn fetch_results(&self, request: &SearchRequest) -> Result<String> {
        let mut params = vec![("q", request.query.clone())];
        if let Some(freshness) = request.freshness {
            params.push(("df", freshness.letter().to_string()));
        }

        let mut attempt = 0;
        loop {
            attempt += 1;
            match self.client.get(&self.base_url).query(&params).send().await {
                Ok(response) => {
                    let status = response.status();
                    if !status.is_success() {
                        return Err(SearchError::Status {
                            provider: self.label().to_string(),
                            status: status.as_u16(),
                        });
                    }
                    return Ok(response.text().await?);
                }
                Err(e) if attempt == 1 && (e.is_connect() || e.is_timeout()) => {
                    debug!(error = %e, "web search connect failed, retrying once");
                    tokio::time::sleep(self.retry_delay).await;
                }
                Err(e) => return Err(e.into()),
            }
        }
    }
}

fn result_selectors() -> &'static (Selector, Selector, Selector) {
    static SELECTORS: OnceLock<(Selector, Selector, Selector)> = OnceLock::new();
    SELECTORS.get_or_init(|| {
        (
            Selector::parse(".result").expect("valid selector"),
            Selector::parse("a.result__a").expect("valid selector"),
            Selector::parse(".result__snippet").expect("valid selector"),
        )
    })
}

/// Resolve the `/l/?uddg=` redirect wrapper to the target URL.
#[must_use]
pub fn decode_redirect(href: &str) -> Option<String> {
    let absolute = if href.starts_with("//") {
        format!("https:{href}")
    } else if href.starts_with('/') {
        format!("https://duckduckgo.com{href}")
    } else {
        href.to_string()
    };
    let parsed = Url::parse(&absolute).ok()?;

    let target = parsed
        .query_pairs()
        .find(|(k, _)| k == "uddg")
        .map(|(_, v)| v.into_owned())
        .unwrap_or(absolute);

    let target_url = Url::parse(&target).ok()?;
    let host = target_url.host_str()?;
    if !matches!(target_url.scheme(), "http" | "https") || host.ends_with("duckduckgo.com") {
        return None;
    }
    Some(target)
}

/// Pull result links and snippets out of a results page.
pub(crate) fn parse_results(html: &str) -> Vec<Candidate> {
    let (result_sel, link_sel, snippet_sel) = result_selectors();
    let document = Html::parse_document(html);

    document
        .select(result_sel)
        .filter_map(|block| {
            let link = block.select(link_sel).next()?;
            let url = decode_redirect(link.value().attr("href")?)?;
            let snippet = block
                .select(snippet_sel)
                .next()
                .map(|s| s.text().collect::<Vec<_>>().join(" "))
                .map(|s| s.split_whitespace().collect::<Vec<_>>().join(" "));
            Some(Candidate::new(url, snippet, ProviderKind::WebSearch))
        })
        .collect()
}

#[async_trait]
impl SearchProvider for DuckDuckGoProvider {
    fn kind(&self) -> ProviderKind {
        ProviderKind::WebSearch
    }

    fn label(&self) -> &str {
        "duckduckgo"
    }

    fn is_configured(&self) -> bool {
        self.enabled
    }

    async fn search(
        &self,
        request: &SearchRequest,
        _rotation: &mut RotationState,
    ) -> SearchOutcome {
        if !self.enabled {
            return SearchOutcome::not_configured();
        }

        let html = match self.fetch_results(request).await {
            Ok(html) => html,
            Err(e) => {
                warn!(query = %request.query, error = %e, "web search failed");
                return SearchOutcome::errored(Vec::new(), e);
            }
        };

        let mut candidates = Vec::new();
        let mut seen = HashSet::new();
        for candidate in parse_results(&html) {
            if candidates.len() >= request.max_results {
                break;
            }
            push_unique(&mut candidates, &mut seen, candidate);
        }

        debug!(query = %request.query, count = candidates.len(), "web search finished");
        SearchOutcome::completed(candidates)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    const PAGE: &str = r#"
        <div class="results">
          <div class="result">
            <a class="result__a" href="//duckduckgo.com/l/?uddg=https%3A%2F%2Fwww.firma.de%2Fkontakt&amp;rut=abc">Kontakt</a>
            <a class="result__snippet">Vertriebsleiter   Thomas Weber</a>
          </div>
          <div class="result">
            <a class="result__a" href="https://www.other.de/team">Team</a>
          </div>
          <div class="result">
            <a class="result__a" href="https://duckduckgo.com/y.js?ad=1">Ad</a>
          </div>
        </div>"#;

    #[test]
    fn test_parse_results_decodes_redirects() {
        let results = parse_results(PAGE);
        assert_eq!(results.len(), 2);
        assert_eq!(results[0].url, "https://www.firma.de/kontakt");
        assert_eq!(results[0].snippet.as_deref(), Some("Vertriebsleiter Thomas Weber"));
        assert_eq!(results[1].url, "https://www.other.de/team");
        assert!(results[1].snippet.is_none());
    }

    #[test]
    fn test_decode_redirect_rejects_non_http() {
        assert!(decode_redirect("javascript:void(0)").is_none());
        assert!(decode_redirect("/l/?uddg=mailto%3Aa%40b.de").is_none());
    }

    #[test]
    fn test_parse_results_tolerates_garbage() {
        assert!(parse_results("<<<not html").is_empty());
    }

    #[tokio::test]
    async fn test_disabled_provider_is_not_configured() {
        let provider = DuckDuckGoProvider::new(false, 5, None, false).expect("client");
        let outcome = provider
            .search(&SearchRequest::new("q"), &mut RotationState::new())
            .await;
        assert_eq!(outcome.status, crate::OutcomeStatus::NotConfigured);
    }
}
