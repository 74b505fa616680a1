//! Optional fallback for hosts that hide phone numbers.
//!
//! Some portals only show a number after an interactive "show number"
//! action. A [`PhoneRevealer`] performs that action out of process (for
//! example with browser automation) and hands back the revealed content.
//! The pipeline calls it only for configured reveal hosts when the normal
//! extractor found no phone number, and always through its own rate limit.

use async_trait::async_trait;
use std::sync::Arc;
use std::time::Duration;
use tokio::sync::Mutex;
use tokio::time::Instant;

/// Black-box reveal capability.
#[async_trait]
pub trait PhoneRevealer: Send + Sync {
    /// Content of `url` after the reveal action, or `None` if nothing was
    /// revealed. Must not fail loudly.
    async fn reveal(&self, url: &str) -> Option<String>;
}

/// Spaces calls to an inner revealer by a fixed minimum interval.
pub struct RateLimitedRevealer {
    inner: Arc<dyn PhoneRevealer>,
    min_interval: Duration,
    last_call: Mutex<Option<Instant>>,
}

impl RateLimitedRevealer {
    /// Wrap `inner` so that calls start at least `min_interval` apart.
    #[must_use]
    pub fn new(inner: Arc<dyn PhoneRevealer>, min_interval: Duration) -> Self {
        Self {
            inner,
            min_interval,
            last_call: Mutex::new(None),
        }
    }
}

#[async_trait]
impl PhoneRevealer for RateLimitedRevealer {
    async fn reveal(&self, url: &str) -> Option<String> {
        {
            let mut last = self.last_call.lock().await;
            if let Some(previous) = *last {
                let ready = previous + self.min_interval;
                let now = Instant::now();
                if ready > now {
                    tracing::debug!(url, wait = ?(ready - now), "Waiting for reveal slot");
                    tokio::time::sleep_until(ready).await;
                }
            }
            *last = Some(Instant::now());
        }
        self.inner.reveal(url).await
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::atomic::{AtomicUsize, Ordering};

    struct Counting(AtomicUsize);

    #[async_trait]
    impl PhoneRevealer for Counting {
        async fn reveal(&self, _url: &str) -> Option<String> {
            self.0.fetch_add(1, Ordering::SeqCst);
            Some("Tel. 0211 123456".into())
        }
    }

    #[tokio::test(start_paused = true)]
    async fn test_calls_are_spaced() {
        let inner = Arc::new(Counting(AtomicUsize::new(0)));
        let limited = RateLimitedRevealer::new(inner.clone(), Duration::from_secs(10));

        let start = Instant::now();
        assert!(limited.reveal("https://portal.example/a").await.is_some());
        assert!(limited.reveal("https://portal.example/b").await.is_some());
        assert!(limited.reveal("https://portal.example/c").await.is_some());

        assert_eq!(inner.0.load(Ordering::SeqCst), 3);
        assert!(start.elapsed() >= Duration::from_secs(20));
    }
}
