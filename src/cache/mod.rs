//! Multi-layer cache tier.
//!
//! Three cooperating caches share one key builder ([`crate::hashing`]):
//! the exact per-stage cache, the complete-response cache, and the
//! semantic vector cache. Entries expire strictly by wall clock; a
//! background sweeper runs at half the shortest TTL.

pub mod metrics;
pub mod response;
pub mod stage;
pub mod vector;

pub use metrics::{CacheMetrics, MetricsSnapshot};
pub use response::ResponseCache;
pub use stage::StageCache;
pub use vector::{VectorCache, VectorCacheEntry};

use std::sync::Arc;
use std::time::Duration;

use tokio::task::JoinHandle;
use tracing::debug;

use crate::config::Config;

/// Process-wide cache tier handed to the engine.
#[derive(Debug, Clone)]
pub struct Caches {
    pub stage: Arc<StageCache>,
    pub response: Arc<ResponseCache>,
    pub vector: Arc<VectorCache>,
}

impl Caches {
    pub fn from_config(config: &Config) -> Self {
        Self {
            stage: Arc::new(StageCache::new(Duration::from_secs(
                config.stage_cache_ttl_secs,
            ))),
            response: Arc::new(ResponseCache::new(Duration::from_secs(
                config.response_cache_ttl_secs,
            ))),
            vector: Arc::new(VectorCache::new(
                Duration::from_secs(config.vector_cache_ttl_secs),
                config.semantic_threshold,
            )),
        }
    }

    /// Starts the lazy eviction sweep at `interval`; runs until aborted.
    pub fn start_sweeper(&self, interval: Duration) -> JoinHandle<()> {
        let caches = self.clone();
        tokio::spawn(async move {
            let mut ticker = tokio::time::interval(interval);
            ticker.set_missed_tick_behavior(tokio::time::MissedTickBehavior::Delay);
            loop {
                ticker.tick().await;
                caches.stage.sweep();
                caches.response.sweep();
                caches.vector.sweep();
                debug!(
                    stage = caches.stage.len(),
                    response = caches.response.len(),
                    vector = caches.vector.len(),
                    "cache sweep complete"
                );
            }
        })
    }

    /// Sweep interval: half the shortest configured TTL, at least 1 s.
    pub fn sweep_interval(config: &Config) -> Duration {
        let shortest = config
            .stage_cache_ttl_secs
            .min(config.response_cache_ttl_secs)
            .min(config.vector_cache_ttl_secs);
        Duration::from_secs((shortest / 2).max(1))
    }
}
