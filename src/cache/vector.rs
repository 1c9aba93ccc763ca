//! Semantic (embedding-similarity) cache.
//!
//! A lookup scans stored entries scoped to the same city and search
//! params and returns the result set of the entry with the highest cosine
//! similarity at or above the configured threshold. Search-params equality
//! is canonical-JSON string equality, the same canonical form the context
//! key hashes.

use std::time::{Duration, Instant};

use parking_lot::RwLock;
use serde_json::Value;
use tracing::debug;
use uuid::Uuid;

use super::metrics::{CacheMetrics, MetricsSnapshot};
use crate::domain::Poi;
use crate::hashing::canonical_json;
use crate::semantic::cosine_similarity;

/// One cached semantic result set.
#[derive(Debug, Clone)]
pub struct VectorCacheEntry {
    pub query_text: String,
    pub embedding: Vec<f32>,
    pub results: Vec<Poi>,
    pub city_id: Uuid,
    pub search_params: Value,
}

struct StoredEntry {
    query_text: String,
    embedding: Vec<f32>,
    results: Vec<Poi>,
    city_id: Uuid,
    params_canonical: String,
    inserted_at: Instant,
}

/// In-memory vector cache with cosine-threshold lookup and wall-clock TTL.
pub struct VectorCache {
    entries: RwLock<Vec<StoredEntry>>,
    ttl: Duration,
    threshold: f32,
    metrics: CacheMetrics,
}

impl VectorCache {
    pub fn new(ttl: Duration, threshold: f32) -> Self {
        Self {
            entries: RwLock::new(Vec::new()),
            ttl,
            threshold,
            metrics: CacheMetrics::default(),
        }
    }

    /// Best-scoring unexpired entry with matching scope, if any reaches the
    /// threshold.
    pub fn lookup(
        &self,
        query_embedding: &[f32],
        city_id: Uuid,
        search_params: &Value,
    ) -> Option<Vec<Poi>> {
        let params_canonical = canonical_json(search_params);
        let now = Instant::now();

        let entries = self.entries.read();
        let best = entries
            .iter()
            .filter(|e| {
                now.duration_since(e.inserted_at) < self.ttl
                    && e.city_id == city_id
                    && e.params_canonical == params_canonical
            })
            .map(|e| (cosine_similarity(query_embedding, &e.embedding), e))
            .filter(|(score, _)| *score >= self.threshold)
            .max_by(|(a, _), (b, _)| a.partial_cmp(b).unwrap_or(std::cmp::Ordering::Equal));

        match best {
            Some((score, entry)) => {
                debug!(score, query = %entry.query_text, "vector cache hit");
                self.metrics.record_hit();
                Some(entry.results.clone())
            }
            None => {
                self.metrics.record_miss();
                None
            }
        }
    }

    pub fn insert(&self, entry: VectorCacheEntry) {
        let stored = StoredEntry {
            query_text: entry.query_text,
            embedding: entry.embedding,
            results: entry.results,
            city_id: entry.city_id,
            params_canonical: canonical_json(&entry.search_params),
            inserted_at: Instant::now(),
        };

        self.entries.write().push(stored);
        self.metrics.record_set();
    }

    pub fn len(&self) -> usize {
        self.entries.read().len()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    /// Drops expired entries; invoked by the background sweeper.
    pub fn sweep(&self) {
        let now = Instant::now();
        self.entries
            .write()
            .retain(|e| now.duration_since(e.inserted_at) < self.ttl);
    }

    pub fn metrics(&self) -> MetricsSnapshot {
        self.metrics.snapshot(self.len() as u64)
    }
}

impl std::fmt::Debug for VectorCache {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("VectorCache")
            .field("entries", &self.len())
            .field("threshold", &self.threshold)
            .finish()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn poi(name: &str) -> Poi {
        Poi {
            name: name.to_string(),
            ..Default::default()
        }
    }

    fn entry(city_id: Uuid, embedding: Vec<f32>, params: Value) -> VectorCacheEntry {
        VectorCacheEntry {
            query_text: "q".into(),
            embedding,
            results: vec![poi("cached")],
            city_id,
            search_params: params,
        }
    }

    #[test]
    fn hit_requires_threshold_and_scope() {
        let cache = VectorCache::new(Duration::from_secs(60), 0.95);
        let city = Uuid::new_v4();
        let params = serde_json::json!({"limit": 10});

        cache.insert(entry(city, vec![1.0, 0.0], params.clone()));

        // Identical embedding, same scope.
        assert!(cache.lookup(&[1.0, 0.0], city, &params).is_some());
        // Below threshold.
        assert!(cache.lookup(&[0.0, 1.0], city, &params).is_none());
        // Wrong city.
        assert!(cache.lookup(&[1.0, 0.0], Uuid::new_v4(), &params).is_none());
        // Different params.
        assert!(
            cache
                .lookup(&[1.0, 0.0], city, &serde_json::json!({"limit": 20}))
                .is_none()
        );
    }

    #[test]
    fn params_equality_ignores_key_order() {
        let cache = VectorCache::new(Duration::from_secs(60), 0.9);
        let city = Uuid::new_v4();

        cache.insert(entry(
            city,
            vec![1.0, 0.0],
            serde_json::json!({"a": 1, "b": 2}),
        ));

        let reordered: Value = serde_json::from_str(r#"{"b": 2, "a": 1}"#).unwrap();
        assert!(cache.lookup(&[1.0, 0.0], city, &reordered).is_some());
    }

    #[test]
    fn best_scoring_entry_wins() {
        let cache = VectorCache::new(Duration::from_secs(60), 0.5);
        let city = Uuid::new_v4();
        let params = serde_json::json!({});

        let mut close = entry(city, vec![0.9, 0.1], params.clone());
        close.results = vec![poi("close")];
        let mut exact = entry(city, vec![1.0, 0.0], params.clone());
        exact.results = vec![poi("exact")];

        cache.insert(close);
        cache.insert(exact);

        let results = cache.lookup(&[1.0, 0.0], city, &params).unwrap();
        assert_eq!(results[0].name, "exact");
    }

    #[test]
    fn sweep_drops_expired_entries() {
        let cache = VectorCache::new(Duration::from_millis(20), 0.5);
        let city = Uuid::new_v4();
        cache.insert(entry(city, vec![1.0], serde_json::json!({})));

        std::thread::sleep(Duration::from_millis(40));
        cache.sweep();
        assert!(cache.is_empty());
    }

    #[test]
    fn expired_entries_do_not_hit_before_sweep() {
        let cache = VectorCache::new(Duration::from_millis(20), 0.5);
        let city = Uuid::new_v4();
        let params = serde_json::json!({});
        cache.insert(entry(city, vec![1.0], params.clone()));

        std::thread::sleep(Duration::from_millis(40));
        assert!(cache.lookup(&[1.0], city, &params).is_none());
    }
}
