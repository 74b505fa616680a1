//! Robots exclusion handling with a per-host cache.

use reqwest::Client;
use std::collections::HashMap;
use std::sync::{Arc, Mutex, PoisonError};
use std::time::{Duration, Instant};
use tracing::debug;
use url::Url;

/// How long parsed rules stay valid.
const RULES_TTL: Duration = Duration::from_secs(24 * 60 * 60);

/// How long the allow-all fallback stays valid after a failed fetch.
const FALLBACK_TTL: Duration = Duration::from_secs(60 * 60);

/// How often stale hosts are swept from the cache.
const SWEEP_INTERVAL: Duration = Duration::from_secs(10 * 60);

/// Allow and disallow rules for one host.
#[derive(Debug, Clone)]
pub struct RobotsRules {
    allow: Vec<String>,
    disallow: Vec<String>,
    fetched_at: Instant,
    ttl: Duration,
}

impl RobotsRules {
    /// Parse a robots.txt body for the given user agent.
    ///
    /// Groups naming the agent win over the `*` group.
    #[must_use]
    pub fn parse(content: &str, user_agent: &str) -> Self {
        let agent = user_agent.to_lowercase();
        let mut wildcard = (Vec::new(), Vec::new());
        let mut specific = (Vec::new(), Vec::new());
        let mut found_specific = false;

        // Consecutive user-agent lines share one group.
        let mut group_agents: Vec<String> = Vec::new();
        let mut in_rules = false;

        for line in content.lines() {
            let line = line.split('#').next().unwrap_or_default().trim();
            let Some((field, value)) = line.split_once(':') else {
                continue;
            };
            let field = field.trim().to_lowercase();
            let value = value.trim();

            match field.as_str() {
                "user-agent" => {
                    if in_rules {
                        group_agents.clear();
                        in_rules = false;
                    }
                    group_agents.push(value.to_lowercase());
                }
                "allow" | "disallow" => {
                    in_rules = true;
                    if value.is_empty() {
                        continue;
                    }
                    let is_specific = group_agents
                        .iter()
                        .any(|a| a != "*" && !a.is_empty() && agent.contains(a.as_str()));
                    let target = if is_specific {
                        found_specific = true;
                        &mut specific
                    } else if group_agents.iter().any(|a| a == "*") {
                        &mut wildcard
                    } else {
                        continue;
                    };
                    if field == "allow" {
                        target.0.push(value.to_string());
                    } else {
                        target.1.push(value.to_string());
                    }
                }
                _ => in_rules = true,
            }
        }

        let (allow, disallow) = if found_specific { specific } else { wildcard };
        Self {
            allow,
            disallow,
            fetched_at: Instant::now(),
            ttl: RULES_TTL,
        }
    }

    /// Rules that allow everything, used when robots.txt can't be fetched.
    #[must_use]
    pub fn allow_all(ttl: Duration) -> Self {
        Self {
            allow: Vec::new(),
            disallow: Vec::new(),
            fetched_at: Instant::now(),
            ttl,
        }
    }

    /// Whether a path (with query) may be fetched. Longest match wins; ties allow.
    #[must_use]
    pub fn is_allowed(&self, path: &str) -> bool {
        let longest = |patterns: &[String]| {
            patterns
                .iter()
                .filter(|p| pattern_matches(path, p))
                .map(String::len)
                .max()
                .unwrap_or(0)
        };
        longest(&self.allow) >= longest(&self.disallow)
    }

    /// Whether the entry is still fresh.
    #[must_use]
    pub fn is_fresh(&self) -> bool {
        self.fetched_at.elapsed() < self.ttl
    }
}

/// Match a robots pattern supporting `*` wildcards and a trailing `$`.
fn pattern_matches(path: &str, pattern: &str) -> bool {
    let (pattern, anchored) = match pattern.strip_suffix('$') {
        Some(p) => (p, true),
        None => (pattern, false),
    };
    let segments: Vec<&str> = pattern.split('*').collect();
    let head = segments[0];
    if !path.starts_with(head) {
        return false;
    }
    if segments.len() == 1 {
        return !anchored || path.len() == head.len();
    }

    let mut pos = head.len();
    let last = segments.len() - 1;
    for segment in &segments[1..last] {
        match path[pos..].find(segment) {
            Some(found) => pos += found + segment.len(),
            None => return false,
        }
    }

    let tail = segments[last];
    if anchored {
        path.len() >= pos + tail.len() && path.ends_with(tail)
    } else {
        path[pos..].contains(tail)
    }
}

type HostSlot = Arc<tokio::sync::Mutex<Option<RobotsRules>>>;

#[derive(Debug)]
struct Slots {
    by_origin: HashMap<String, HostSlot>,
    swept_at: Instant,
}

impl Slots {
    /// Drop origins whose rules went stale and that no fetch is using.
    fn sweep(&mut self) -> usize {
        let before = self.by_origin.len();
        self.by_origin.retain(|_, slot| {
            Arc::strong_count(slot) > 1
                || slot
                    .try_lock()
                    .map_or(true, |rules| rules.as_ref().is_some_and(RobotsRules::is_fresh))
        });
        self.swept_at = Instant::now();
        before - self.by_origin.len()
    }
}

/// Per-host robots cache.
///
/// Each host gets its own async lock so concurrent fetches to one host
/// trigger a single robots.txt request.
#[derive(Debug)]
pub struct RobotsCache {
    user_agent: String,
    timeout: Duration,
    hosts: Mutex<Slots>,
}

impl RobotsCache {
    /// Create an empty cache.
    #[must_use]
    pub fn new(user_agent: impl Into<String>, timeout: Duration) -> Self {
        Self {
            user_agent: user_agent.into(),
            timeout,
            hosts: Mutex::new(Slots {
                by_origin: HashMap::new(),
                swept_at: Instant::now(),
            }),
        }
    }

    fn slot(&self, origin: &str) -> HostSlot {
        let mut hosts = self.hosts.lock().unwrap_or_else(PoisonError::into_inner);
        if hosts.swept_at.elapsed() >= SWEEP_INTERVAL {
            hosts.sweep();
        }
        Arc::clone(hosts.by_origin.entry(origin.to_string()).or_default())
    }

    /// Drop hosts whose rules are stale. Returns how many were dropped.
    pub fn evict_stale(&self) -> usize {
        self.hosts
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .sweep()
    }

    /// Number of hosts in the cache.
    #[must_use]
    pub fn len(&self) -> usize {
        self.hosts
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .by_origin
            .len()
    }

    /// Whether the cache holds no hosts.
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    /// Whether `url` may be fetched, fetching robots.txt on first use.
    pub async fn is_allowed(&self, client: &Client, url: &Url) -> bool {
        let origin = url.origin().ascii_serialization();
        let slot = self.slot(&origin);
        let mut entry = slot.lock().await;

        if !entry.as_ref().is_some_and(RobotsRules::is_fresh) {
            *entry = Some(self.fetch_rules(client, &origin).await);
        }

        let mut path = url.path().to_string();
        if let Some(query) = url.query() {
            path.push('?');
            path.push_str(query);
        }
        entry.as_ref().map_or(true, |rules| rules.is_allowed(&path))
    }

    async fn fetch_rules(&self, client: &Client, origin: &str) -> RobotsRules {
        let robots_url = format!("{origin}/robots.txt");
        let response = client.get(&robots_url).timeout(self.timeout).send().await;
        match response {
            Ok(resp) if resp.status().is_success() => match resp.text().await {
                Ok(body) => RobotsRules::parse(&body, &self.user_agent),
                Err(e) => {
                    debug!(url = %robots_url, error = %e, "unreadable robots.txt, allowing all");
                    RobotsRules::allow_all(FALLBACK_TTL)
                }
            },
            // A missing robots.txt means everything is allowed.
            Ok(resp) if resp.status().is_client_error() => RobotsRules::allow_all(RULES_TTL),
            Ok(resp) => {
                debug!(
                    url = %robots_url,
                    status = resp.status().as_u16(),
                    "robots.txt unavailable, allowing all"
                );
                RobotsRules::allow_all(FALLBACK_TTL)
            }
            Err(e) => {
                debug!(url = %robots_url, error = %e, "robots.txt fetch failed, allowing all");
                RobotsRules::allow_all(FALLBACK_TTL)
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    const ROBOTS: &str = "
User-agent: *
Disallow: /private/
Disallow: /*.pdf$
Allow: /private/kontakt

User-agent: prospector
Disallow: /intern
";

    #[test]
    fn test_wildcard_group() {
        let rules = RobotsRules::parse(ROBOTS, "Mozilla/5.0 Chrome");
        assert!(rules.is_allowed("/kontakt"));
        assert!(!rules.is_allowed("/private/daten"));
        assert!(rules.is_allowed("/private/kontakt"));
        assert!(!rules.is_allowed("/files/preise.pdf"));
        assert!(rules.is_allowed("/files/preise.pdf?x=1"));
        assert!(rules.is_allowed("/intern"));
    }

    #[test]
    fn test_specific_group_wins() {
        let rules = RobotsRules::parse(ROBOTS, "Prospector/0.1");
        assert!(!rules.is_allowed("/intern/team"));
        assert!(rules.is_allowed("/private/daten"));
    }

    #[test]
    fn test_shared_group_and_comments() {
        let body = "User-agent: a\nUser-agent: *\nDisallow: /x # comment\n";
        let rules = RobotsRules::parse(body, "bot");
        assert!(!rules.is_allowed("/x/y"));
    }

    #[test]
    fn test_empty_disallow_allows_all() {
        let rules = RobotsRules::parse("User-agent: *\nDisallow:\n", "ua");
        assert!(rules.is_allowed("/"));
    }

    #[tokio::test]
    async fn test_stale_hosts_are_evicted() {
        let cache = RobotsCache::new("prospector", Duration::from_secs(5));
        let fresh = cache.slot("https://fresh.example");
        *fresh.lock().await = Some(RobotsRules::allow_all(RULES_TTL));
        let expired = cache.slot("https://expired.example");
        *expired.lock().await = Some(RobotsRules::allow_all(Duration::ZERO));
        let in_use = cache.slot("https://busy.example");
        drop(fresh);
        drop(expired);
        assert_eq!(cache.len(), 3);

        assert_eq!(cache.evict_stale(), 1);
        assert_eq!(cache.len(), 2);

        drop(in_use);
        assert_eq!(cache.evict_stale(), 1);
        assert_eq!(cache.len(), 1);
    }

    #[test]
    fn test_allow_all_expiry() {
        let rules = RobotsRules::allow_all(Duration::ZERO);
        assert!(!rules.is_fresh());
        assert!(rules.is_allowed("/anything"));
    }
}
