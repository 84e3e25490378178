//! Reputation ledger: a bounded EMA prior per `(routeId, islandId)` (spec
//! §4.3). Grounded on this codebase's `monitor::ewma::ewma` free function —
//! the same one-line blend-then-clamp idiom, keyed and given hit/miss
//! semantics instead of a raw rate sample.

use std::collections::HashMap;

use crate::core::config::LedgerConfig;

/// Per-`(route, island)` reputation state (spec §3 `ReputationEntry`).
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct ReputationEntry {
    pub prior: f64,
    pub hits: u64,
    pub misses: u64,
    pub last_ts: f64,
}

impl ReputationEntry {
    fn seeded(default_prior: f64) -> Self {
        Self { prior: default_prior, hits: 0, misses: 0, last_ts: 0.0 }
    }
}

/// Purely multiplicative prior store; never drives a decision by itself.
#[derive(Debug, Clone)]
pub struct ReputationLedger {
    config: LedgerConfig,
    entries: HashMap<(String, String), ReputationEntry>,
}

impl ReputationLedger {
    #[must_use]
    pub fn new(config: LedgerConfig) -> Self {
        Self { config, entries: HashMap::new() }
    }

    pub fn set_config(&mut self, config: LedgerConfig) {
        self.config = config;
    }

    fn default_prior(&self) -> f64 {
        1.0f64.clamp(self.config.min_prior, self.config.max_prior)
    }

    /// Current prior for `(route, island)`, defaulting to `1.0` (clamped into
    /// range) for a key that has never been observed.
    #[must_use]
    pub fn prior(&self, route: &str, island: &str) -> f64 {
        self.entries.get(&(route.to_string(), island.to_string())).map_or_else(
            || self.default_prior(),
            |entry| entry.prior,
        )
    }

    #[must_use]
    pub fn entry(&self, route: &str, island: &str) -> Option<&ReputationEntry> {
        self.entries.get(&(route.to_string(), island.to_string()))
    }

    pub fn record_hit(&mut self, route: &str, island: &str, ts: f64) {
        self.update(route, island, ts, true);
    }

    pub fn record_miss(&mut self, route: &str, island: &str, ts: f64) {
        self.update(route, island, ts, false);
    }

    fn update(&mut self, route: &str, island: &str, ts: f64, hit: bool) {
        let alpha = self.config.ema_alpha;
        let (min_prior, max_prior) = (self.config.min_prior, self.config.max_prior);
        let default_prior = self.default_prior();
        let key = (route.to_string(), island.to_string());
        let entry = self.entries.entry(key).or_insert_with(|| ReputationEntry::seeded(default_prior));
        let target = if hit { max_prior } else { min_prior };
        entry.prior = ((1.0 - alpha) * entry.prior + alpha * target).clamp(min_prior, max_prior);
        if hit {
            entry.hits += 1;
        } else {
            entry.misses += 1;
        }
        entry.last_ts = ts;
    }
}
