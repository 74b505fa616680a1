//! The resilient fetcher.

use crate::cache::UrlCache;
use crate::error::{FetchError, Result};
use crate::page::{ContentKind, FetchedPage};
use crate::robots::RobotsCache;
use crate::throttle::HostThrottle;
use async_trait::async_trait;
use chrono::Utc;
use prospector_core::FetchConfig;
use rand::Rng;
use reqwest::header::{HeaderMap, CONTENT_LENGTH, CONTENT_TYPE, RETRY_AFTER};
use reqwest::{Client, Method, Response};
use serde::Serialize;
use std::ops::Range;
use std::sync::atomic::{AtomicU64, Ordering};
use std::time::Duration;
use tracing::{debug, warn};
use url::Url;

/// Upper bound on a server-provided `Retry-After` we are willing to honour.
const MAX_RETRY_AFTER_SECS: u64 = 30;

/// Entries kept in the URL-fetch cache.
const URL_CACHE_CAPACITY: usize = 4096;

/// Fetches one URL.
///
/// Returns `None` for every failure; fetch errors never stop a run.
#[async_trait]
pub trait PageFetcher: Send + Sync {
    /// Fetch a page.
    async fn fetch(&self, url: &str) -> Option<FetchedPage>;
}

/// Counters describing fetcher activity since creation.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize)]
pub struct FetchStats {
    /// Requests sent (HEAD and GET, retries included)
    pub requests: u64,
    /// Pages returned
    pub successes: u64,
    /// Fetches that produced no page
    pub failures: u64,
    /// Retries after transient failures
    pub retries: u64,
    /// Requests that fell back to an older protocol or unverified TLS
    pub downgrades: u64,
    /// URLs skipped because of robots rules
    pub robots_blocked: u64,
    /// Pages served from the URL cache
    pub cache_hits: u64,
}

#[derive(Debug, Default)]
struct Counters {
    requests: AtomicU64,
    successes: AtomicU64,
    failures: AtomicU64,
    retries: AtomicU64,
    downgrades: AtomicU64,
    robots_blocked: AtomicU64,
    cache_hits: AtomicU64,
}

fn bump(counter: &AtomicU64) {
    counter.fetch_add(1, Ordering::Relaxed);
}

/// Clients tried in order: verified TLS with HTTP/2 negotiation, verified
/// TLS restricted to HTTP/1.1, and unverified TLS when explicitly allowed.
#[derive(Debug)]
struct ClientChain {
    modern: Client,
    legacy: Client,
    insecure: Option<Client>,
}

impl ClientChain {
    fn build(config: &FetchConfig) -> Result<Self> {
        let base = || {
            Client::builder()
                .timeout(Duration::from_secs(config.timeout_secs.max(1)))
                .connect_timeout(Duration::from_secs(config.connect_timeout_secs.max(1)))
                .user_agent(&config.user_agent)
                .redirect(reqwest::redirect::Policy::limited(5))
                .gzip(true)
        };
        let build = |builder: reqwest::ClientBuilder| {
            builder
                .build()
                .map_err(|e| FetchError::Config(format!("failed to create HTTP client: {e}")))
        };

        Ok(Self {
            modern: build(base())?,
            legacy: build(base().http1_only())?,
            insecure: if config.allow_insecure_tls {
                Some(build(base().http1_only().danger_accept_invalid_certs(true))?)
            } else {
                None
            },
        })
    }
}

/// Whether a transport error warrants trying the next client in the chain.
fn should_downgrade(error: &reqwest::Error) -> bool {
    !error.is_timeout() && !error.is_redirect() && !error.is_body() && !error.is_decode()
}

fn is_transient(status: u16) -> bool {
    matches!(status, 429 | 503 | 504)
}

fn header_str(headers: &HeaderMap, name: reqwest::header::HeaderName) -> Option<&str> {
    headers.get(name).and_then(|v| v.to_str().ok())
}

fn declared_length(headers: &HeaderMap) -> Option<usize> {
    header_str(headers, CONTENT_LENGTH).and_then(|v| v.trim().parse().ok())
}

/// Decode a body as UTF-8, falling back to Latin-1 for legacy pages.
fn decode_body(bytes: Vec<u8>) -> String {
    String::from_utf8(bytes)
        .unwrap_or_else(|e| e.into_bytes().iter().map(|&b| char::from(b)).collect())
}

/// Async fetcher with bounded concurrency, per-host pacing, retries and
/// protocol fallback.
#[derive(Debug)]
pub struct ResilientFetcher {
    config: FetchConfig,
    clients: ClientChain,
    throttle: HostThrottle,
    robots: RobotsCache,
    cache: UrlCache,
    counters: Counters,
    retry_backoff_ms: Range<u64>,
}

impl ResilientFetcher {
    /// Create a fetcher from configuration.
    pub fn new(config: &FetchConfig) -> Result<Self> {
        let clients = ClientChain::build(config)?;
        if config.allow_insecure_tls {
            warn!("unverified TLS fallback is enabled for fetches");
        }
        Ok(Self {
            throttle: HostThrottle::new(
                config.max_concurrent,
                config.per_host_max,
                Duration::from_millis(config.host_min_delay_ms),
                config.jitter_ms,
                Duration::from_secs(config.host_penalty_secs),
            ),
            robots: RobotsCache::new(
                config.user_agent.clone(),
                Duration::from_secs(config.connect_timeout_secs.max(1) + 2),
            ),
            cache: UrlCache::new(
                Duration::from_secs(config.url_cache_ttl_hours * 3600),
                URL_CACHE_CAPACITY,
            ),
            counters: Counters::default(),
            retry_backoff_ms: 800..2000,
            clients,
            config: config.clone(),
        })
    }

    /// Delay range (per attempt) between retries.
    #[must_use]
    pub fn with_retry_backoff(mut self, backoff_ms: Range<u64>) -> Self {
        self.retry_backoff_ms = backoff_ms;
        self
    }

    /// Snapshot of the activity counters.
    #[must_use]
    pub fn stats(&self) -> FetchStats {
        let c = &self.counters;
        FetchStats {
            requests: c.requests.load(Ordering::Relaxed),
            successes: c.successes.load(Ordering::Relaxed),
            failures: c.failures.load(Ordering::Relaxed),
            retries: c.retries.load(Ordering::Relaxed),
            downgrades: c.downgrades.load(Ordering::Relaxed),
            robots_blocked: c.robots_blocked.load(Ordering::Relaxed),
            cache_hits: c.cache_hits.load(Ordering::Relaxed),
        }
    }

    /// Whether a host is in the reduced-throughput state.
    #[must_use]
    pub fn is_penalized(&self, host: &str) -> bool {
        self.throttle.is_penalized(&host.to_lowercase())
    }

    /// Fetch a page, reporting why it failed.
    pub async fn fetch_page(&self, raw_url: &str) -> Result<FetchedPage> {
        let url = Url::parse(raw_url)
            .map_err(|e| FetchError::InvalidUrl(format!("{raw_url}: {e}")))?;
        if !matches!(url.scheme(), "http" | "https") {
            return Err(FetchError::InvalidUrl(raw_url.to_string()));
        }
        let host = url
            .host_str()
            .ok_or_else(|| FetchError::InvalidUrl(raw_url.to_string()))?
            .to_lowercase();

        if let Some(page) = self.cache.get(url.as_str()) {
            bump(&self.counters.cache_hits);
            return Ok(page);
        }

        if self.config.respect_robots_txt
            && !self.robots.is_allowed(&self.clients.modern, &url).await
        {
            bump(&self.counters.robots_blocked);
            return Err(FetchError::Disallowed);
        }

        let _permit = self.throttle.acquire(&host).await?;
        if self.config.head_preflight {
            self.preflight(&url, &host).await?;
        }
        let page = self.get_with_retries(&url, &host).await?;
        self.cache.insert(url.as_str(), page.clone());
        Ok(page)
    }

    /// Send a request through the client chain.
    async fn send(
        &self,
        method: Method,
        url: &Url,
    ) -> std::result::Result<Response, reqwest::Error> {
        bump(&self.counters.requests);
        let first = match self.clients.modern.request(method.clone(), url.clone()).send().await {
            Ok(response) => return Ok(response),
            Err(e) if !should_downgrade(&e) => return Err(e),
            Err(e) => e,
        };

        debug!(url = %url, error = %first, "retrying over HTTP/1.1");
        bump(&self.counters.downgrades);
        let second = match self.clients.legacy.request(method.clone(), url.clone()).send().await {
            Ok(response) => return Ok(response),
            Err(e) if !should_downgrade(&e) => return Err(e),
            Err(e) => e,
        };

        match &self.clients.insecure {
            Some(insecure) => {
                warn!(url = %url, error = %second, "falling back to unverified TLS");
                bump(&self.counters.downgrades);
                insecure.request(method, url.clone()).send().await
            }
            None => Err(second),
        }
    }

    async fn preflight(&self, url: &Url, host: &str) -> Result<()> {
        self.throttle.pace(host).await;
        let response = match self.send(Method::HEAD, url).await {
            Ok(response) => response,
            Err(e) => {
                debug!(url = %url, error = %e, "preflight failed, continuing with GET");
                return Ok(());
            }
        };

        let status = response.status().as_u16();
        match status {
            405 | 429 => {
                self.throttle.penalize(host);
                debug!(url = %url, status, "preflight throttled, continuing with GET");
                Ok(())
            }
            401 | 403 | 404 | 410 | 451 => Err(FetchError::Blocked(status)),
            _ if response.status().is_success() => {
                let headers = response.headers();
                ContentKind::classify(header_str(headers, CONTENT_TYPE), self.config.enable_pdf)?;
                let limit = self.config.max_response_bytes;
                if declared_length(headers).is_some_and(|len| len > limit) {
                    return Err(FetchError::TooLarge(limit));
                }
                Ok(())
            }
            _ => Ok(()),
        }
    }

    async fn get_with_retries(&self, url: &Url, host: &str) -> Result<FetchedPage> {
        let mut attempt = 0;
        loop {
            self.throttle.pace(host).await;
            match self.send(Method::GET, url).await {
                Ok(response) => {
                    let status = response.status().as_u16();
                    if status == 429 || status == 405 {
                        self.throttle.penalize(host);
                    }
                    if is_transient(status) && attempt < self.config.max_retries {
                        attempt += 1;
                        bump(&self.counters.retries);
                        let hinted = header_str(response.headers(), RETRY_AFTER)
                            .and_then(|v| v.trim().parse::<u64>().ok())
                            .filter(|&secs| secs <= MAX_RETRY_AFTER_SECS)
                            .map(Duration::from_secs);
                        debug!(url = %url, status, attempt, "transient status, retrying");
                        self.backoff(attempt, hinted).await;
                        continue;
                    }
                    if !response.status().is_success() {
                        return Err(FetchError::Status(status));
                    }
                    return self.read_body(url, response).await;
                }
                Err(e) if e.is_timeout() && attempt < self.config.max_retries => {
                    attempt += 1;
                    bump(&self.counters.retries);
                    debug!(url = %url, attempt, "timeout, retrying");
                    self.backoff(attempt, None).await;
                }
                Err(e) => return Err(e.into()),
            }
        }
    }

    async fn backoff(&self, attempt: u32, hinted: Option<Duration>) {
        let delay = hinted.unwrap_or_else(|| {
            let base = if self.retry_backoff_ms.is_empty() {
                self.retry_backoff_ms.start
            } else {
                rand::thread_rng().gen_range(self.retry_backoff_ms.clone())
            };
            Duration::from_millis(base * u64::from(attempt))
        });
        if !delay.is_zero() {
            tokio::time::sleep(delay).await;
        }
    }

    async fn read_body(&self, requested: &Url, mut response: Response) -> Result<FetchedPage> {
        let status = response.status().as_u16();
        let final_url = response.url().to_string();
        let max = self.config.max_response_bytes;
        let kind = ContentKind::classify(
            header_str(response.headers(), CONTENT_TYPE),
            self.config.enable_pdf,
        )?;
        if declared_length(response.headers()).is_some_and(|len| len > max) {
            return Err(FetchError::TooLarge(max));
        }

        let mut bytes = Vec::new();
        while let Some(chunk) = response.chunk().await? {
            if bytes.len() + chunk.len() > max {
                return Err(FetchError::TooLarge(max));
            }
            bytes.extend_from_slice(&chunk);
        }

        let body = match kind {
            ContentKind::Pdf => extract_pdf_text(bytes).await?,
            ContentKind::Html | ContentKind::Text => decode_body(bytes),
        };

        Ok(FetchedPage {
            url: requested.to_string(),
            final_url,
            status,
            kind,
            body,
            fetched_at: Utc::now(),
        })
    }
}

async fn extract_pdf_text(bytes: Vec<u8>) -> Result<String> {
    tokio::task::spawn_blocking(move || pdf_extract::extract_text_from_mem(&bytes))
        .await
        .map_err(|e| FetchError::Pdf(e.to_string()))?
        .map_err(|e| FetchError::Pdf(e.to_string()))
}

#[async_trait]
impl PageFetcher for ResilientFetcher {
    async fn fetch(&self, url: &str) -> Option<FetchedPage> {
        match self.fetch_page(url).await {
            Ok(page) => {
                bump(&self.counters.successes);
                debug!(url, status = page.status, bytes = page.body.len(), "fetched");
                Some(page)
            }
            Err(e) => {
                bump(&self.counters.failures);
                debug!(url, error = %e, "fetch failed");
                None
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use wiremock::matchers::{method, path};
    use wiremock::{Mock, MockServer, ResponseTemplate};

    /// A client whose every request fails to connect.
    fn refusing_client() -> Client {
        Client::builder()
            .proxy(reqwest::Proxy::all("http://127.0.0.1:9").expect("proxy url"))
            .build()
            .expect("client")
    }

    fn chain_config(allow_insecure_tls: bool) -> FetchConfig {
        FetchConfig {
            host_min_delay_ms: 0,
            jitter_ms: 0,
            head_preflight: false,
            respect_robots_txt: false,
            max_retries: 0,
            allow_insecure_tls,
            ..FetchConfig::default()
        }
    }

    async fn kontakt_server() -> MockServer {
        let server = MockServer::start().await;
        Mock::given(method("GET"))
            .and(path("/kontakt"))
            .respond_with(
                ResponseTemplate::new(200)
                    .set_body_raw(b"Tel: 0211 123456".to_vec(), "text/plain"),
            )
            .mount(&server)
            .await;
        server
    }

    #[tokio::test]
    async fn test_connect_failure_falls_back_to_http1_client() {
        let server = kontakt_server().await;
        let mut fetcher = ResilientFetcher::new(&chain_config(false)).expect("fetcher");
        fetcher.clients.modern = refusing_client();

        let page = fetcher
            .fetch_page(&format!("{}/kontakt", server.uri()))
            .await
            .expect("page via HTTP/1.1 client");
        assert!(page.body.contains("0211"));
        assert_eq!(fetcher.stats().downgrades, 1);
        assert_eq!(server.received_requests().await.map(|r| r.len()), Some(1));
    }

    #[tokio::test]
    async fn test_unverified_tls_is_never_tried_unless_enabled() {
        let server = kontakt_server().await;
        let mut fetcher = ResilientFetcher::new(&chain_config(false)).expect("fetcher");
        assert!(fetcher.clients.insecure.is_none());
        fetcher.clients.modern = refusing_client();
        fetcher.clients.legacy = refusing_client();

        let result = fetcher.fetch_page(&format!("{}/kontakt", server.uri())).await;
        assert!(matches!(result, Err(FetchError::Http(_))), "{result:?}");
        assert_eq!(fetcher.stats().downgrades, 1);
        assert_eq!(server.received_requests().await.map(|r| r.len()), Some(0));
    }

    #[tokio::test]
    async fn test_unverified_tls_is_last_resort_when_enabled() {
        let server = kontakt_server().await;
        let mut fetcher = ResilientFetcher::new(&chain_config(true)).expect("fetcher");
        assert!(fetcher.clients.insecure.is_some());
        fetcher.clients.modern = refusing_client();
        fetcher.clients.legacy = refusing_client();

        let page = fetcher
            .fetch_page(&format!("{}/kontakt", server.uri()))
            .await
            .expect("page via unverified client");
        assert!(page.body.contains("0211"));
        assert_eq!(fetcher.stats().downgrades, 2);
    }

    #[test]
    fn test_transient_statuses() {
        assert!(is_transient(429));
        assert!(is_transient(503));
        assert!(is_transient(504));
        assert!(!is_transient(500));
        assert!(!is_transient(404));
    }

    #[test]
    fn test_decode_body_latin1_fallback() {
        assert_eq!(decode_body("Köln".as_bytes().to_vec()), "Köln");
        assert_eq!(decode_body(vec![b'K', 0xF6, b'l', b'n']), "Köln");
    }

    #[tokio::test]
    async fn test_invalid_urls_are_rejected() {
        let fetcher = ResilientFetcher::new(&FetchConfig::default()).expect("fetcher");
        assert!(matches!(
            fetcher.fetch_page("not a url").await,
            Err(FetchError::InvalidUrl(_))
        ));
        assert!(matches!(
            fetcher.fetch_page("ftp://files.example/a").await,
            Err(FetchError::InvalidUrl(_))
        ));
        assert!(fetcher.fetch("mailto:a@b.de").await.is_none());
        assert_eq!(fetcher.stats().failures, 1);
    }
}
