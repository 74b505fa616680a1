//! Helpers shared by the HTTP-based providers.

use crate::error::{Result, SearchError};
use rand::Rng;
use reqwest::Client;
use std::ops::Range;
use std::time::Duration;

/// Browser-like user agent for HTML endpoints.
pub const BROWSER_USER_AGENT: &str =
    "Mozilla/5.0 (X11; Linux x86_64) AppleWebKit/537.36 (KHTML, like Gecko) Chrome/124.0 Safari/537.36";

/// Delay range used before switching to the next credential.
pub const DEFAULT_ROTATION_BACKOFF_MS: Range<u64> = 800..2500;

/// Build an HTTP client for API providers.
pub fn build_api_client(timeout_secs: u64) -> Result<Client> {
    Client::builder()
        .timeout(Duration::from_secs(timeout_secs.max(1)))
        .gzip(true)
        .build()
        .map_err(|e| SearchError::Config(format!("failed to create HTTP client: {e}")))
}

/// Build an HTTP client for HTML endpoints.
///
/// With a proxy URL every request goes through that proxy. With `direct`
/// set, proxy settings inherited from the environment are ignored.
pub fn build_html_client(timeout_secs: u64, proxy: Option<&str>, direct: bool) -> Result<Client> {
    let mut builder = Client::builder()
        .timeout(Duration::from_secs(timeout_secs.max(1)))
        .user_agent(BROWSER_USER_AGENT)
        .gzip(true);

    if let Some(proxy_url) = proxy {
        let proxy = reqwest::Proxy::all(proxy_url)
            .map_err(|e| SearchError::Config(format!("invalid proxy URL '{proxy_url}': {e}")))?;
        builder = builder.proxy(proxy);
    } else if direct {
        builder = builder.no_proxy();
    }

    builder
        .build()
        .map_err(|e| SearchError::Config(format!("failed to create HTTP client: {e}")))
}

/// Sleep for a random duration within `range` (milliseconds).
pub async fn jittered_sleep(range: &Range<u64>) {
    if range.is_empty() {
        return;
    }
    let ms = rand::thread_rng().gen_range(range.clone());
    if ms > 0 {
        tokio::time::sleep(Duration::from_millis(ms)).await;
    }
}

/// Whether a status/body pair means "quota exceeded, try the next key".
#[must_use]
pub fn is_quota_response(status: u16, body: &str) -> bool {
    match status {
        429 | 402 => true,
        403 => {
            let body = body.to_lowercase();
            body.contains("quota") || body.contains("ratelimit") || body.contains("limit exceeded")
        }
        _ => false,
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_quota_detection() {
        assert!(is_quota_response(429, ""));
        assert!(is_quota_response(
            403,
            r#"{"error":{"errors":[{"reason":"dailyLimitExceeded"}],"message":"Quota exceeded"}}"#
        ));
        assert!(!is_quota_response(403, r#"{"error":{"message":"API key not valid"}}"#));
        assert!(!is_quota_response(500, "quota"));
    }

    #[test]
    fn test_html_client_rejects_bad_proxy() {
        assert!(build_html_client(5, Some("not a url"), false).is_err());
        assert!(build_html_client(5, Some("socks5h://127.0.0.1:9050"), false).is_ok());
        assert!(build_html_client(5, None, true).is_ok());
    }

    #[tokio::test]
    async fn test_jittered_sleep_empty_range_returns() {
        jittered_sleep(&(0..0)).await;
    }
}
