//! Exact-match per-stage cache.
//!
//! Keyed by the stage sub-key (`<context-md5>_<part>`); the value is the
//! full accumulated text of that stage. Entries expire strictly by wall
//! clock; there is no refresh-on-read.

use std::time::Duration;

use moka::sync::Cache;

use super::metrics::{CacheMetrics, MetricsSnapshot};

/// In-memory exact-match stage cache with TTL eviction.
pub struct StageCache {
    entries: Cache<String, String>,
    metrics: CacheMetrics,
}

impl StageCache {
    const DEFAULT_CAPACITY: u64 = 10_000;

    pub fn new(ttl: Duration) -> Self {
        Self::with_capacity(ttl, Self::DEFAULT_CAPACITY)
    }

    pub fn with_capacity(ttl: Duration, capacity: u64) -> Self {
        Self {
            entries: Cache::builder()
                .max_capacity(capacity)
                .time_to_live(ttl)
                .build(),
            metrics: CacheMetrics::default(),
        }
    }

    /// Returns the cached stage text, if present and unexpired.
    pub fn get(&self, key: &str) -> Option<String> {
        match self.entries.get(key) {
            Some(text) => {
                self.metrics.record_hit();
                Some(text)
            }
            None => {
                self.metrics.record_miss();
                None
            }
        }
    }

    /// Inserts or replaces an entry. Entries are immutable; a set replaces.
    pub fn set(&self, key: impl Into<String>, text: impl Into<String>) {
        self.entries.insert(key.into(), text.into());
        self.metrics.record_set();
    }

    pub fn contains(&self, key: &str) -> bool {
        self.entries.contains_key(key)
    }

    pub fn len(&self) -> u64 {
        self.entries.entry_count()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    /// Evicts expired entries; invoked by the background sweeper.
    pub fn sweep(&self) {
        self.entries.run_pending_tasks();
    }

    pub fn metrics(&self) -> MetricsSnapshot {
        self.metrics.snapshot(self.len())
    }
}

impl std::fmt::Debug for StageCache {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("StageCache")
            .field("entries", &self.entries.entry_count())
            .finish()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn get_miss_then_set_then_hit() {
        let cache = StageCache::new(Duration::from_secs(60));

        assert!(cache.get("k_restaurants").is_none());
        cache.set("k_restaurants", "{\"restaurants\":[]}");
        assert_eq!(cache.get("k_restaurants").as_deref(), Some("{\"restaurants\":[]}"));

        let metrics = cache.metrics();
        assert_eq!(metrics.hits, 1);
        assert_eq!(metrics.misses, 1);
        assert_eq!(metrics.sets, 1);
    }

    #[test]
    fn set_replaces_existing_entry() {
        let cache = StageCache::new(Duration::from_secs(60));
        cache.set("k", "old");
        cache.set("k", "new");
        assert_eq!(cache.get("k").as_deref(), Some("new"));
    }

    #[test]
    fn entries_expire_by_wall_clock() {
        let cache = StageCache::new(Duration::from_millis(30));
        cache.set("k", "v");
        assert!(cache.get("k").is_some());

        std::thread::sleep(Duration::from_millis(60));
        cache.sweep();
        assert!(cache.get("k").is_none());
    }
}
