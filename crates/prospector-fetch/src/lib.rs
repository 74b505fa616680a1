//! Prospector Fetch - resilient asynchronous page fetching.
//!
//! [`ResilientFetcher`] bounds in-flight requests globally and per host,
//! spaces requests to the same host with jitter, retries transient statuses
//! and timeouts, falls back from HTTP/2 to HTTP/1.1 (and to unverified TLS
//! only when configured), honours robots.txt and caches successful fetches.

#![warn(missing_docs)]
#![warn(clippy::all)]
#![warn(clippy::pedantic)]
#![allow(clippy::module_name_repetitions)]
#![allow(clippy::missing_errors_doc)]
#![allow(clippy::missing_panics_doc)]

pub mod cache;
pub mod error;
pub mod fetcher;
pub mod page;
pub mod robots;
pub mod throttle;

pub use cache::UrlCache;
pub use error::{FetchError, Result};
pub use fetcher::{FetchStats, PageFetcher, ResilientFetcher};
pub use page::{ContentKind, FetchedPage};
pub use robots::{RobotsCache, RobotsRules};
pub use throttle::{HostThrottle, ThrottlePermit};
