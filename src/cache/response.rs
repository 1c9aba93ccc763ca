//! Complete-response cache.
//!
//! Keyed by the bare context key; stores the full assembled
//! [`AiCityResponse`] after a successful run so navigation requests
//! (`/itinerary?sessionId=...&cacheKey=...`) render without re-calling the
//! model.

use std::sync::Arc;
use std::time::Duration;

use moka::sync::Cache;

use super::metrics::{CacheMetrics, MetricsSnapshot};
use crate::domain::AiCityResponse;

pub struct ResponseCache {
    entries: Cache<String, Arc<AiCityResponse>>,
    metrics: CacheMetrics,
}

impl ResponseCache {
    const DEFAULT_CAPACITY: u64 = 2_000;

    pub fn new(ttl: Duration) -> Self {
        Self {
            entries: Cache::builder()
                .max_capacity(Self::DEFAULT_CAPACITY)
                .time_to_live(ttl)
                .build(),
            metrics: CacheMetrics::default(),
        }
    }

    pub fn get(&self, context_key: &str) -> Option<Arc<AiCityResponse>> {
        match self.entries.get(context_key) {
            Some(response) => {
                self.metrics.record_hit();
                Some(response)
            }
            None => {
                self.metrics.record_miss();
                None
            }
        }
    }

    pub fn set(&self, context_key: impl Into<String>, response: AiCityResponse) {
        self.entries.insert(context_key.into(), Arc::new(response));
        self.metrics.record_set();
    }

    pub fn len(&self) -> u64 {
        self.entries.entry_count()
    }

    pub fn sweep(&self) {
        self.entries.run_pending_tasks();
    }

    pub fn metrics(&self) -> MetricsSnapshot {
        self.metrics.snapshot(self.len())
    }
}

impl std::fmt::Debug for ResponseCache {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("ResponseCache")
            .field("entries", &self.entries.entry_count())
            .finish()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use uuid::Uuid;

    #[test]
    fn round_trips_a_response_by_context_key() {
        let cache = ResponseCache::new(Duration::from_secs(60));
        let session_id = Uuid::new_v4();

        assert!(cache.get("ctx").is_none());
        cache.set(
            "ctx",
            AiCityResponse {
                session_id,
                ..Default::default()
            },
        );

        let cached = cache.get("ctx").unwrap();
        assert_eq!(cached.session_id, session_id);
        assert_eq!(cache.metrics().hits, 1);
    }
}
