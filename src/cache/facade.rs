//! The question cache: one entry point over both tiers and the generator.
//!
//! Lookup order for a key:
//! 1. memory tier (replenish in the background when running low)
//! 2. persistent tier (the store is saved immediately after the pop)
//! 3. synchronous generation under the cache deadline
//!
//! No error crosses this boundary. A failed lookup is `None`.

use std::sync::Arc;
use std::time::Instant;

use tracing::{debug, info, warn};

use crate::cache::item::{Item, Key};
use crate::cache::memory::MemoryTier;
use crate::cache::persistent::PersistentTier;
use crate::cache::prefetcher::PrefetchScheduler;
use crate::config::{CacheConfig, PrefetchConfig};
use crate::generation::client::{generate_within, GenerationClient};
use crate::metrics::{
    MetricsSink, CACHE_DISK_HIT, CACHE_GENERATE_FAILURE, CACHE_MEMORY_HIT, CACHE_MISS,
    GENERATION_SECONDS,
};

/// Where a lookup was satisfied.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum TierHit {
    Memory,
    Disk,
    Generated,
}

impl TierHit {
    pub fn as_str(&self) -> &'static str {
        match self {
            TierHit::Memory => "memory",
            TierHit::Disk => "disk",
            TierHit::Generated => "generated",
        }
    }
}

pub struct QuestionCache {
    memory: Arc<MemoryTier>,
    persistent: Arc<PersistentTier>,
    scheduler: PrefetchScheduler,
    client: Arc<dyn GenerationClient>,
    metrics: Option<Arc<dyn MetricsSink>>,
    config: CacheConfig,
}

impl QuestionCache {
    /// Open the persistent store and wire up the tiers. Workers are not
    /// running until [`start`](Self::start) is called.
    pub fn new(
        cache: &CacheConfig,
        prefetch: &PrefetchConfig,
        client: Arc<dyn GenerationClient>,
        metrics: Option<Arc<dyn MetricsSink>>,
    ) -> Self {
        let memory = Arc::new(MemoryTier::new(cache.memory_capacity));
        let persistent = Arc::new(PersistentTier::open(
            &cache.store_path,
            cache.disk_capacity,
            cache.zstd_level,
        ));
        let scheduler = PrefetchScheduler::new(
            cache,
            prefetch,
            memory.clone(),
            persistent.clone(),
            client.clone(),
            metrics.clone(),
        );

        info!(
            store = %persistent.path().display(),
            memory_capacity = cache.memory_capacity,
            disk_capacity = cache.disk_capacity,
            "Question cache ready"
        );

        Self {
            memory,
            persistent,
            scheduler,
            client,
            metrics,
            config: cache.clone(),
        }
    }

    /// Start background replenishment, including the warm-up keys.
    pub fn start(&self) {
        self.scheduler.start();
    }

    /// Get one question for `key`, or `None` if every tier came up empty.
    pub async fn get(&self, key: &Key) -> Option<Item> {
        self.get_with_source(key).await.map(|(item, _)| item)
    }

    /// Like [`get`](Self::get), also reporting which tier answered.
    pub async fn get_with_source(&self, key: &Key) -> Option<(Item, TierHit)> {
        if let Some((item, remaining)) = self.memory.pop_with_remaining(key) {
            self.record(CACHE_MEMORY_HIT, 1.0, key);
            debug!(key = %key, remaining, "Memory hit");
            if remaining < self.config.low_water_mark {
                self.scheduler.replenish(key);
            }
            return Some((item, TierHit::Memory));
        }

        if let Some(item) = self.persistent.pop_oldest(key) {
            self.record(CACHE_DISK_HIT, 1.0, key);
            debug!(key = %key, left = self.persistent.len(key), "Disk hit");
            self.persistent.save_logged().await;
            return Some((item, TierHit::Disk));
        }

        self.record(CACHE_MISS, 1.0, key);
        debug!(key = %key, "Both tiers empty, generating synchronously");

        let started = Instant::now();
        let result =
            generate_within(self.client.as_ref(), key, self.config.generation_timeout()).await;
        self.record(GENERATION_SECONDS, started.elapsed().as_secs_f64(), key);

        match result {
            Ok(item) => {
                self.scheduler.replenish(key);
                Some((item, TierHit::Generated))
            }
            Err(e) => {
                self.record(CACHE_GENERATE_FAILURE, 1.0, key);
                warn!(key = %key, kind = e.kind(), error = %e, "Synchronous generation failed");
                None
            }
        }
    }

    /// Stop the workers and save the store.
    pub async fn shutdown(&self) {
        self.scheduler.shutdown().await;
    }

    pub fn memory(&self) -> &MemoryTier {
        &self.memory
    }

    pub fn persistent(&self) -> &PersistentTier {
        &self.persistent
    }

    pub fn scheduler(&self) -> &PrefetchScheduler {
        &self.scheduler
    }

    fn record(&self, name: &str, value: f64, key: &Key) {
        if let Some(sink) = &self.metrics {
            sink.record_metric(name, value, key.category().as_str());
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::cache::item::Category;
    use crate::generation::client::GenerationError;
    use async_trait::async_trait;
    use tempfile::TempDir;

    struct Unavailable;

    #[async_trait]
    impl GenerationClient for Unavailable {
        async fn generate(&self, _key: &Key) -> Result<Item, GenerationError> {
            Err(GenerationError::Unavailable("no key".into()))
        }
    }

    fn item(prompt: &str) -> Item {
        Item::new(prompt, vec!["x".into(), "y".into()], "y", "", Category::P, 3).unwrap()
    }

    fn cache(tmp: &TempDir) -> QuestionCache {
        let cfg = CacheConfig {
            store_path: tmp.path().join("store.json"),
            ..Default::default()
        };
        let prefetch = PrefetchConfig {
            warm_keys: vec![],
            ..Default::default()
        };
        QuestionCache::new(&cfg, &prefetch, Arc::new(Unavailable), None)
    }

    #[tokio::test]
    async fn test_memory_before_disk() {
        let tmp = TempDir::new().unwrap();
        let cache = cache(&tmp);
        let key = Key::new(Category::P, 3);
        cache.persistent().append(&key, item("disk"));
        cache.memory().push(&key, item("mem"));

        let (first, hit) = cache.get_with_source(&key).await.unwrap();
        assert_eq!(first.prompt(), "mem");
        assert_eq!(hit, TierHit::Memory);

        let (second, hit) = cache.get_with_source(&key).await.unwrap();
        assert_eq!(second.prompt(), "disk");
        assert_eq!(hit, TierHit::Disk);
    }

    #[tokio::test]
    async fn test_miss_with_failing_generator_is_none() {
        let tmp = TempDir::new().unwrap();
        let cache = cache(&tmp);
        assert!(cache.get(&Key::new(Category::NpHard, 2)).await.is_none());
    }
}
