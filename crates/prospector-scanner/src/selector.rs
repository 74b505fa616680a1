//! Adaptive query selection.
//!
//! Each cycle mixes a small pool of proven queries with exploratory picks.
//! The proven ("core") pool holds the queries with the best historical
//! accepted-lead rate; exploration favours queries that were never tried or
//! have not run for a while. Randomness comes from an injected RNG so
//! selection is reproducible in tests.

use chrono::{DateTime, Utc};
use prospector_catalog::QueryTemplate;
use prospector_core::{normalize_query, SelectorConfig};
use prospector_db::DorkStats;
use rand::distributions::{Distribution, WeightedIndex};
use rand::rngs::StdRng;
use rand::{Rng, SeedableRng};
use std::collections::HashMap;

/// Smallest allowed core pool.
pub const MIN_CORE_SIZE: usize = 4;

/// Largest allowed core pool.
pub const MAX_CORE_SIZE: usize = 6;

const UNTRIED_WEIGHT: f64 = 3.0;
const TRIED_BASE_WEIGHT: f64 = 0.5;
const STALENESS_CAP_DAYS: f64 = 30.0;
const STALENESS_DIVISOR: f64 = 10.0;

/// Bounded set of the best-performing queries.
#[derive(Debug, Clone, PartialEq)]
pub struct CorePool {
    capacity: usize,
    entries: Vec<(String, f64)>,
}

impl CorePool {
    /// Create an empty pool; capacity is clamped to 4..=6.
    #[must_use]
    pub fn new(capacity: usize) -> Self {
        Self {
            capacity: capacity.clamp(MIN_CORE_SIZE, MAX_CORE_SIZE),
            entries: Vec::new(),
        }
    }

    /// Offer a query with its current score.
    ///
    /// An incumbent has its score updated. A newcomer joins while there is
    /// room, or replaces the weakest incumbent when it scores strictly
    /// higher. Queries that never produced an accepted lead are not taken.
    /// Returns whether the query is in the pool afterwards.
    pub fn offer(&mut self, query: &str, score: f64) -> bool {
        let key = normalize_query(query);
        if let Some(entry) = self.entries.iter_mut().find(|(q, _)| *q == key) {
            entry.1 = score;
            if score <= 0.0 {
                self.entries.retain(|(q, _)| *q != key);
                return false;
            }
            return true;
        }
        if score <= 0.0 {
            return false;
        }
        if self.entries.len() < self.capacity {
            self.entries.push((key, score));
            return true;
        }
        let Some((weakest, min)) = self.weakest() else {
            return false;
        };
        if score > min {
            tracing::debug!(
                query = %key,
                score,
                bumped = %self.entries[weakest].0,
                "Core pool updated"
            );
            self.entries[weakest] = (key, score);
            true
        } else {
            false
        }
    }

    fn weakest(&self) -> Option<(usize, f64)> {
        self.entries
            .iter()
            .enumerate()
            .map(|(i, (_, s))| (i, *s))
            .min_by(|a, b| a.1.total_cmp(&b.1))
    }

    /// Lowest score in the pool.
    #[must_use]
    pub fn min_score(&self) -> Option<f64> {
        self.weakest().map(|(_, s)| s)
    }

    /// Whether a query (compared after normalization) is in the pool.
    #[must_use]
    pub fn contains(&self, query: &str) -> bool {
        let key = normalize_query(query);
        self.entries.iter().any(|(q, _)| *q == key)
    }

    /// Score of a pooled query.
    #[must_use]
    pub fn score_of(&self, query: &str) -> Option<f64> {
        let key = normalize_query(query);
        self.entries.iter().find(|(q, _)| *q == key).map(|(_, s)| *s)
    }

    /// Normalized queries in the pool, best first.
    #[must_use]
    pub fn queries(&self) -> Vec<String> {
        let mut entries = self.entries.clone();
        entries.sort_by(|a, b| b.1.total_cmp(&a.1).then_with(|| a.0.cmp(&b.0)));
        entries.into_iter().map(|(q, _)| q).collect()
    }

    /// Maximum number of queries.
    #[must_use]
    pub fn capacity(&self) -> usize {
        self.capacity
    }

    /// Number of pooled queries.
    #[must_use]
    pub fn len(&self) -> usize {
        self.entries.len()
    }

    /// Whether the pool is empty.
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }
}

#[derive(Debug, Clone)]
struct History {
    score: f64,
    last_used_at: DateTime<Utc>,
}

/// Chooses which catalog queries to run in a cycle.
#[derive(Debug)]
pub struct QuerySelector {
    core: CorePool,
    core_fraction: f64,
    history: HashMap<String, History>,
    rng: StdRng,
}

impl QuerySelector {
    /// Create a selector seeded from the OS.
    #[must_use]
    pub fn new(config: &SelectorConfig) -> Self {
        Self::with_rng(config, StdRng::from_entropy())
    }

    /// Create a selector with a caller-supplied RNG.
    #[must_use]
    pub fn with_rng(config: &SelectorConfig, rng: StdRng) -> Self {
        Self {
            core: CorePool::new(config.core_size),
            core_fraction: config.core_fraction.clamp(0.0, 1.0),
            history: HashMap::new(),
            rng,
        }
    }

    /// The current core pool.
    #[must_use]
    pub fn core(&self) -> &CorePool {
        &self.core
    }

    /// Recompute scores from persisted query performance.
    ///
    /// `score = accepted / max(1, uses)`. Queries are offered to the core
    /// pool best first, so ties favour the incumbents.
    pub fn refresh(&mut self, stats: &[DorkStats]) {
        self.history.clear();
        let mut scored: Vec<(&DorkStats, f64)> =
            stats.iter().map(|s| (s, s.success_rate())).collect();
        scored.sort_by(|a, b| b.1.total_cmp(&a.1).then_with(|| a.0.query.cmp(&b.0.query)));

        for (stat, score) in scored {
            self.history.insert(
                normalize_query(&stat.query),
                History {
                    score,
                    last_used_at: stat.last_used_at,
                },
            );
            self.core.offer(&stat.query, score);
        }
        tracing::debug!(
            history = self.history.len(),
            core = self.core.len(),
            min_core_score = ?self.core.min_score(),
            "Selector refreshed"
        );
    }

    /// Pick up to `count` distinct queries from `available`.
    ///
    /// `available` is expected in catalog priority order. Without any
    /// history the first `count` entries are returned unchanged.
    pub fn select(&mut self, count: usize, available: &[QueryTemplate]) -> Vec<QueryTemplate> {
        self.select_at(count, available, Utc::now())
    }

    fn select_at(
        &mut self,
        count: usize,
        available: &[QueryTemplate],
        now: DateTime<Utc>,
    ) -> Vec<QueryTemplate> {
        if count == 0 || available.is_empty() {
            return Vec::new();
        }
        if self.history.is_empty() {
            tracing::debug!(count, "Cold start, using catalog defaults");
            return available.iter().take(count).cloned().collect();
        }

        let mut proven: Vec<(&QueryTemplate, f64)> = Vec::new();
        let mut exploration: Vec<(&QueryTemplate, f64)> = Vec::new();
        for template in available {
            match self.core.score_of(&template.text) {
                Some(score) => proven.push((template, score)),
                None => exploration.push((template, self.exploration_weight(template, now))),
            }
        }

        let mut picked = Vec::with_capacity(count.min(available.len()));
        while picked.len() < count && !(proven.is_empty() && exploration.is_empty()) {
            let from_core = self.rng.gen::<f64>() < self.core_fraction;
            let pool = match (from_core, proven.is_empty(), exploration.is_empty()) {
                (true, false, _) | (false, false, true) => &mut proven,
                _ => &mut exploration,
            };
            let index = draw(&mut self.rng, pool);
            let (template, _) = pool.remove(index);
            picked.push(template.clone());
        }
        picked
    }

    fn exploration_weight(&self, template: &QueryTemplate, now: DateTime<Utc>) -> f64 {
        match self.history.get(&normalize_query(&template.text)) {
            None => UNTRIED_WEIGHT,
            Some(h) => {
                #[allow(clippy::cast_precision_loss)]
                let days = (now - h.last_used_at).num_hours().max(0) as f64 / 24.0;
                TRIED_BASE_WEIGHT + h.score + days.min(STALENESS_CAP_DAYS) / STALENESS_DIVISOR
            }
        }
    }
}

/// Weighted index into a non-empty pool; uniform if the weights are unusable.
fn draw(rng: &mut StdRng, pool: &[(&QueryTemplate, f64)]) -> usize {
    match WeightedIndex::new(pool.iter().map(|(_, w)| *w)) {
        Ok(dist) => dist.sample(rng),
        Err(_) => rng.gen_range(0..pool.len()),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::Duration;

    fn template(text: &str, priority: u8) -> QueryTemplate {
        QueryTemplate {
            text: text.to_string(),
            modes: Vec::new(),
            tags: Vec::new(),
            region: None,
            priority,
        }
    }

    fn stats(query: &str, uses: u64, accepted: u64) -> DorkStats {
        DorkStats {
            query_hash: prospector_core::query_hash(query),
            query: normalize_query(query),
            uses,
            leads_found: accepted,
            leads_with_phone: 0,
            accepted,
            last_used_at: Utc::now(),
        }
    }

    fn config(core_size: usize, core_fraction: f64) -> SelectorConfig {
        SelectorConfig {
            core_size,
            core_fraction,
            queries_per_cycle: 10,
        }
    }

    #[test]
    fn test_core_pool_capacity_is_clamped() {
        assert_eq!(CorePool::new(1).capacity(), MIN_CORE_SIZE);
        assert_eq!(CorePool::new(50).capacity(), MAX_CORE_SIZE);
        assert_eq!(CorePool::new(5).capacity(), 5);
    }

    #[test]
    fn test_core_pool_bumps_weakest() {
        let mut pool = CorePool::new(4);
        for (q, s) in [("a", 0.4), ("b", 0.3), ("c", 0.2), ("d", 0.1)] {
            assert!(pool.offer(q, s));
        }
        assert!(!pool.offer("e", 0.1), "ties do not bump");
        assert!(pool.offer("e", 0.25));
        assert!(!pool.contains("d"));
        assert_eq!(pool.min_score(), Some(0.2));
        assert_eq!(pool.queries(), vec!["a", "b", "e", "c"]);
    }

    #[test]
    fn test_core_pool_rejects_zero_and_evicts_decayed() {
        let mut pool = CorePool::new(4);
        assert!(!pool.offer("never accepted", 0.0));
        assert!(pool.offer("Vertrieb  Köln", 0.5));
        assert!(pool.contains("vertrieb köln"));
        assert!(!pool.offer("vertrieb köln", 0.0));
        assert!(pool.is_empty());
    }

    #[test]
    fn test_cold_start_uses_catalog_order() {
        let mut selector = QuerySelector::with_rng(&config(5, 0.8), StdRng::seed_from_u64(1));
        let available = vec![template("a", 9), template("b", 5), template("c", 1)];
        let picked: Vec<String> = selector
            .select(2, &available)
            .into_iter()
            .map(|t| t.text)
            .collect();
        assert_eq!(picked, vec!["a", "b"]);
    }

    #[test]
    fn test_select_is_distinct_and_bounded() {
        let mut selector = QuerySelector::with_rng(&config(4, 0.8), StdRng::seed_from_u64(7));
        selector.refresh(&[stats("a", 10, 5), stats("b", 10, 1)]);
        let available: Vec<_> = ["a", "b", "c", "d"].iter().map(|q| template(q, 1)).collect();

        let picked = selector.select(10, &available);
        assert_eq!(picked.len(), 4);
        let mut texts: Vec<_> = picked.iter().map(|t| t.text.clone()).collect();
        texts.sort();
        texts.dedup();
        assert_eq!(texts.len(), 4);
        assert!(selector.select(0, &available).is_empty());
    }

    #[test]
    fn test_full_core_fraction_draws_only_core() {
        let mut selector = QuerySelector::with_rng(&config(4, 1.0), StdRng::seed_from_u64(3));
        selector.refresh(&[stats("a", 10, 5), stats("b", 10, 4)]);
        let available: Vec<_> = ["x", "a", "y", "b"].iter().map(|q| template(q, 1)).collect();
        for _ in 0..20 {
            let picked = selector.select(2, &available);
            assert!(picked.iter().all(|t| t.text == "a" || t.text == "b"));
        }
    }

    #[test]
    fn test_untried_and_stale_queries_weigh_more() {
        let mut selector = QuerySelector::with_rng(&config(4, 0.8), StdRng::seed_from_u64(0));
        let now = Utc::now();
        let mut stale = stats("stale", 5, 0);
        stale.last_used_at = now - Duration::days(20);
        let fresh = stats("fresh", 5, 0);
        selector.refresh(&[stale, fresh]);

        let untried = selector.exploration_weight(&template("untried", 1), now);
        let stale_w = selector.exploration_weight(&template("stale", 1), now);
        let fresh_w = selector.exploration_weight(&template("fresh", 1), now);
        assert!(untried > stale_w);
        assert!(stale_w > fresh_w);
    }

    #[test]
    fn test_same_seed_same_selection() {
        let available: Vec<_> = ["a", "b", "c", "d", "e", "f"]
            .iter()
            .map(|q| template(q, 1))
            .collect();
        let history = [stats("a", 10, 6), stats("c", 10, 2), stats("e", 10, 1)];
        let run = |seed| {
            let rng = StdRng::seed_from_u64(seed);
            let mut selector = QuerySelector::with_rng(&config(4, 0.8), rng);
            selector.refresh(&history);
            selector
                .select(3, &available)
                .into_iter()
                .map(|t| t.text)
                .collect::<Vec<_>>()
        };
        assert_eq!(run(42), run(42));
    }
}
