//! Generator stubs shared by the integration tests.

#![allow(dead_code)]

use std::path::Path;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::Arc;
use std::time::Duration;

use async_trait::async_trait;

use complexity_quiz::cache::facade::QuestionCache;
use complexity_quiz::cache::item::{Category, Item, Key};
use complexity_quiz::config::{CacheConfig, PrefetchConfig};
use complexity_quiz::generation::client::{GenerationClient, GenerationError};
use complexity_quiz::metrics::MetricsSink;

pub fn item(prompt: &str, category: Category, difficulty: u8) -> Item {
    Item::new(
        prompt,
        vec!["A".to_string(), "B".to_string(), "C".to_string()],
        "2",
        "B is right.",
        category,
        difficulty,
    )
    .unwrap()
}

/// Always returns the same item.
pub struct FixedClient(pub Item);

#[async_trait]
impl GenerationClient for FixedClient {
    async fn generate(&self, _key: &Key) -> Result<Item, GenerationError> {
        Ok(self.0.clone())
    }
}

/// Numbers each item it produces; fails every `fail_every`-th call when set
/// and sleeps `delay` before each answer.
#[derive(Default)]
pub struct CountingClient {
    pub calls: AtomicUsize,
    pub fail_every: usize,
    pub delay: Duration,
}

impl CountingClient {
    pub fn failing_every(n: usize) -> Self {
        Self {
            fail_every: n,
            ..Default::default()
        }
    }

    pub fn slow(delay: Duration) -> Self {
        Self {
            delay,
            ..Default::default()
        }
    }

    pub fn calls(&self) -> usize {
        self.calls.load(Ordering::SeqCst)
    }
}

#[async_trait]
impl GenerationClient for CountingClient {
    async fn generate(&self, key: &Key) -> Result<Item, GenerationError> {
        if !self.delay.is_zero() {
            tokio::time::sleep(self.delay).await;
        }
        let n = self.calls.fetch_add(1, Ordering::SeqCst) + 1;
        if self.fail_every > 0 && n % self.fail_every == 0 {
            return Err(GenerationError::Api {
                status: 529,
                body: "overloaded".to_string(),
            });
        }
        Ok(item(&format!("generated #{n}"), key.category(), key.difficulty()))
    }
}

/// Never succeeds.
pub struct FailingClient;

#[async_trait]
impl GenerationClient for FailingClient {
    async fn generate(&self, _key: &Key) -> Result<Item, GenerationError> {
        Err(GenerationError::MalformedResponse("no JSON object".to_string()))
    }
}

/// Sleeps before answering.
pub struct SlowClient(pub Duration);

#[async_trait]
impl GenerationClient for SlowClient {
    async fn generate(&self, key: &Key) -> Result<Item, GenerationError> {
        tokio::time::sleep(self.0).await;
        Ok(item("slow", key.category(), key.difficulty()))
    }
}

pub fn cache_config(dir: &Path, file: &str) -> CacheConfig {
    CacheConfig {
        store_path: dir.join(file),
        ..Default::default()
    }
}

pub fn no_warmup() -> PrefetchConfig {
    PrefetchConfig {
        warm_keys: vec![],
        ..Default::default()
    }
}

pub fn build_cache(
    cache: &CacheConfig,
    client: Arc<dyn GenerationClient>,
    metrics: Option<Arc<dyn MetricsSink>>,
) -> QuestionCache {
    QuestionCache::new(cache, &no_warmup(), client, metrics)
}
