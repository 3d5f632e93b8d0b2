//! End-to-end tests through the cache facade.

mod common;

use std::collections::HashSet;
use std::sync::Arc;
use std::time::Duration;

use complexity_quiz::cache::facade::{QuestionCache, TierHit};
use complexity_quiz::cache::item::{Category, Key};
use complexity_quiz::metrics::{
    MetricsSink, PrometheusSink, CACHE_DISK_HIT, CACHE_GENERATE_FAILURE, CACHE_MEMORY_HIT,
    CACHE_MISS, GENERATION_SECONDS,
};
use tempfile::TempDir;

use common::{build_cache, cache_config, item, CountingClient, FailingClient, FixedClient, SlowClient};

#[tokio::test(flavor = "multi_thread", worker_threads = 4)]
async fn test_concurrent_gets_never_duplicate() {
    let tmp = TempDir::new().unwrap();
    let cache = Arc::new(build_cache(
        &cache_config(tmp.path(), "s.json"),
        Arc::new(FailingClient),
        None,
    ));
    let key = Key::new(Category::Np, 3);

    let seeded: HashSet<String> = (0..10).map(|i| format!("seed {i}")).collect();
    for prompt in &seeded {
        cache.memory().push(&key, item(prompt, Category::Np, 3));
    }

    let handles: Vec<_> = (0..10)
        .map(|_| {
            let cache = cache.clone();
            let key = key.clone();
            tokio::spawn(async move { cache.get(&key).await })
        })
        .collect();

    let mut returned = HashSet::new();
    for result in futures::future::join_all(handles).await {
        let item = result.unwrap().expect("every call finds an item");
        assert!(returned.insert(item.prompt().to_string()), "duplicate item served");
    }
    assert_eq!(returned, seeded);
    assert!(cache.memory().is_empty(&key));
}

#[tokio::test]
async fn test_empty_tiers_fall_back_to_generation_and_schedule_replenishment() {
    let tmp = TempDir::new().unwrap();
    let fixed = item("What is the complexity of binary search?", Category::P, 3);
    let cache = build_cache(
        &cache_config(tmp.path(), "s.json"),
        Arc::new(FixedClient(fixed.clone())),
        None,
    );
    let key: Key = "P_3".parse().unwrap();

    let (got, hit) = cache.get_with_source(&key).await.unwrap();
    assert_eq!(got, fixed);
    assert_eq!(hit, TierHit::Generated);

    assert!(cache.scheduler().is_pending(&key));
    assert_eq!(
        cache
            .scheduler()
            .stats()
            .scheduled
            .load(std::sync::atomic::Ordering::Relaxed),
        1
    );
}

#[tokio::test]
async fn test_disk_hit_is_saved_immediately() {
    let tmp = TempDir::new().unwrap();
    let config = cache_config(tmp.path(), "s.json.gz");
    let key = Key::new(Category::NpHard, 2);

    {
        let cache = build_cache(&config, Arc::new(FailingClient), None);
        cache.persistent().append(&key, item("first", Category::NpHard, 2));
        cache.persistent().append(&key, item("second", Category::NpHard, 2));
        cache.persistent().save().await.unwrap();
    }

    let cache = build_cache(&config, Arc::new(FailingClient), None);
    let (got, hit) = cache.get_with_source(&key).await.unwrap();
    assert_eq!(got.prompt(), "first");
    assert_eq!(hit, TierHit::Disk);

    // The pop is already durable: a fresh process sees only "second".
    let reopened = build_cache(&config, Arc::new(FailingClient), None);
    let left = reopened.persistent().snapshot();
    assert_eq!(left[&key].len(), 1);
    assert_eq!(left[&key][0].prompt(), "second");
}

#[tokio::test]
async fn test_memory_hit_below_low_water_requests_replenishment() {
    let tmp = TempDir::new().unwrap();
    let cache = build_cache(
        &cache_config(tmp.path(), "s.json"),
        Arc::new(CountingClient::default()),
        None,
    );
    let key = Key::new(Category::NpComplete, 5);
    for i in 0..4 {
        cache.memory().push(&key, item(&format!("m{i}"), Category::NpComplete, 5));
    }

    // 4 -> 3 remaining: still at the mark.
    cache.get(&key).await.unwrap();
    assert!(!cache.scheduler().is_pending(&key));

    // 3 -> 2 remaining: below it.
    cache.get(&key).await.unwrap();
    assert!(cache.scheduler().is_pending(&key));
}

#[tokio::test]
async fn test_generation_failure_is_not_found() {
    let tmp = TempDir::new().unwrap();
    let cache = build_cache(&cache_config(tmp.path(), "s.json"), Arc::new(FailingClient), None);
    let key = Key::conceptual();

    assert!(cache.get(&key).await.is_none());
    assert!(!cache.scheduler().is_pending(&key));
}

#[tokio::test]
async fn test_generation_timeout_is_not_found() {
    let tmp = TempDir::new().unwrap();
    let mut config = cache_config(tmp.path(), "s.json");
    config.generation_timeout_secs = 0;
    let cache = build_cache(&config, Arc::new(SlowClient(Duration::from_secs(5))), None);

    let started = std::time::Instant::now();
    assert!(cache.get(&Key::new(Category::P, 1)).await.is_none());
    assert!(started.elapsed() < Duration::from_secs(5));
}

#[tokio::test]
async fn test_metrics_follow_the_lookup_path() {
    let tmp = TempDir::new().unwrap();
    let sink = Arc::new(PrometheusSink::new().unwrap());
    let metrics: Arc<dyn MetricsSink> = sink.clone();
    let cache = build_cache(
        &cache_config(tmp.path(), "s.json"),
        Arc::new(FailingClient),
        Some(metrics),
    );
    let key = Key::new(Category::P, 4);
    cache.memory().push(&key, item("mem", Category::P, 4));
    cache.persistent().append(&key, item("disk", Category::P, 4));

    cache.get(&key).await.unwrap();
    cache.get(&key).await.unwrap();
    assert!(cache.get(&key).await.is_none());

    assert_eq!(sink.counter(CACHE_MEMORY_HIT, "P"), 1.0);
    assert_eq!(sink.counter(CACHE_DISK_HIT, "P"), 1.0);
    assert_eq!(sink.counter(CACHE_MISS, "P"), 1.0);
    assert_eq!(sink.counter(CACHE_GENERATE_FAILURE, "P"), 1.0);
    assert_eq!(sink.observations(GENERATION_SECONDS, "P"), 1);
}

#[tokio::test]
async fn test_start_get_shutdown_lifecycle() {
    let tmp = TempDir::new().unwrap();
    let config = cache_config(tmp.path(), "s.json.zst");
    let key = Key::new(Category::Np, 2);
    let client = Arc::new(CountingClient::default());

    let cache = QuestionCache::new(
        &config,
        &complexity_quiz::config::PrefetchConfig {
            warm_keys: vec![key.clone()],
            ..Default::default()
        },
        client.clone(),
        None,
    );
    cache.start();
    tokio::time::timeout(Duration::from_secs(5), cache.scheduler().wait_idle())
        .await
        .expect("warm-up finished");

    let (got, hit) = cache.get_with_source(&key).await.unwrap();
    assert_eq!(hit, TierHit::Memory);
    assert_eq!(got.prompt(), "generated #1");
    cache.shutdown().await;

    // Everything generated during warm-up is on disk for the next run.
    let reopened = build_cache(&config, client, None);
    assert_eq!(reopened.persistent().len(&key), 10);
}

#[tokio::test(flavor = "multi_thread", worker_threads = 4)]
async fn test_gets_interleaved_with_running_batch_stay_ordered() {
    let tmp = TempDir::new().unwrap();
    let mut config = cache_config(tmp.path(), "s.json");
    config.memory_capacity = 20;
    let key = Key::new(Category::NpComplete, 2);
    let cache = QuestionCache::new(
        &config,
        &complexity_quiz::config::PrefetchConfig {
            warm_keys: vec![key.clone()],
            ..Default::default()
        },
        Arc::new(CountingClient::slow(Duration::from_millis(10))),
        None,
    );
    cache.start();

    let mut served = Vec::new();
    let collect = async {
        while served.len() < 10 {
            assert!(cache.memory().len(&key) <= config.memory_capacity);
            if cache.memory().is_empty(&key) {
                tokio::time::sleep(Duration::from_millis(2)).await;
                continue;
            }
            let (item, hit) = cache.get_with_source(&key).await.unwrap();
            assert_eq!(hit, TierHit::Memory);
            served.push(item.prompt().to_string());
        }
    };
    tokio::time::timeout(Duration::from_secs(10), collect)
        .await
        .expect("batch produced ten items");

    let expected: Vec<String> = (1..=10).map(|n| format!("generated #{n}")).collect();
    assert_eq!(served, expected);

    cache.shutdown().await;
    assert!(cache.memory().len(&key) <= config.memory_capacity);
}

#[tokio::test]
async fn test_memory_hit_leaves_the_disk_copy_in_place() {
    let tmp = TempDir::new().unwrap();
    let cache = build_cache(
        &cache_config(tmp.path(), "s.json"),
        Arc::new(FailingClient),
        None,
    );
    let key = Key::new(Category::P, 2);
    let it = item("shared", Category::P, 2);
    cache.memory().push(&key, it.clone());
    cache.persistent().append(&key, it.clone());

    assert_eq!(cache.get_with_source(&key).await.unwrap(), (it.clone(), TierHit::Memory));
    assert_eq!(cache.get_with_source(&key).await.unwrap(), (it, TierHit::Disk));
}
