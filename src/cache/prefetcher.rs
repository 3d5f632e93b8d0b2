//! Background replenishment: keeps each key's memory queue topped up ahead
//! of demand so the interactive path rarely waits on the generator.
//!
//! A fixed pool of workers consumes replenishment requests from a bounded
//! queue. One global lock serializes all replenishment work, across every
//! key, while the foreground pop path only ever touches the tiers' own
//! locks. At most one request per key is queued or running at any time;
//! further requests for that key are dropped until it completes.

use std::collections::HashSet;
use std::sync::atomic::{AtomicBool, AtomicU64, Ordering};
use std::sync::{Arc, Mutex};
use std::time::{Duration, Instant};

use tokio::sync::{mpsc, Notify};
use tokio::task::JoinHandle;
use tracing::{debug, info, warn};

use crate::cache::item::Key;
use crate::cache::lock::mutex_lock;
use crate::cache::memory::MemoryTier;
use crate::cache::persistent::PersistentTier;
use crate::config::{CacheConfig, PrefetchConfig};
use crate::generation::client::{generate_within, GenerationClient};
use crate::metrics::{MetricsSink, GENERATION_SECONDS, PREFETCH_FAILED, PREFETCH_GENERATED};

/// Scheduler counters.
#[derive(Debug, Default)]
pub struct PrefetchStats {
    /// Requests accepted into the queue.
    pub scheduled: AtomicU64,
    /// Requests dropped because the key was already queued or running.
    pub deduplicated: AtomicU64,
    /// Requests dropped because the queue was full or closed.
    pub dropped: AtomicU64,
    /// Replenishment batches run.
    pub batches: AtomicU64,
    /// Items produced by batches.
    pub generated: AtomicU64,
    /// Failed generation attempts inside batches.
    pub failed: AtomicU64,
}

/// Result of one replenishment batch.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct ReplenishOutcome {
    /// Items the batch set out to produce.
    pub requested: usize,
    /// Items actually produced.
    pub generated: usize,
    /// Attempts that failed and were skipped.
    pub failed: usize,
}

/// State shared between the scheduler handle and its workers.
struct Shared {
    memory: Arc<MemoryTier>,
    persistent: Arc<PersistentTier>,
    client: Arc<dyn GenerationClient>,
    metrics: Option<Arc<dyn MetricsSink>>,

    target: usize,
    flush_every: usize,
    deadline: Duration,

    /// Serializes replenishment across all keys.
    replenish_lock: tokio::sync::Mutex<()>,

    /// Keys queued or being replenished.
    pending: Mutex<HashSet<Key>>,

    /// Signalled whenever `pending` becomes empty.
    idle: Notify,

    /// Cleared by shutdown; only gates new requests.
    accepting: AtomicBool,
    stats: PrefetchStats,
}

impl Shared {
    fn record(&self, name: &str, value: f64, key: &Key) {
        if let Some(sink) = &self.metrics {
            sink.record_metric(name, value, key.category().as_str());
        }
    }

    /// Generate items for `key` until its memory queue reaches the target.
    async fn replenish(&self, key: &Key) -> ReplenishOutcome {
        let _guard = self.replenish_lock.lock().await;

        let current = self.memory.len(key);
        if current >= self.target {
            debug!(key = %key, current, target = self.target, "Already at target, skipping");
            return ReplenishOutcome::default();
        }

        let mut outcome = ReplenishOutcome {
            requested: self.target - current,
            ..Default::default()
        };
        self.stats.batches.fetch_add(1, Ordering::Relaxed);
        let started = Instant::now();
        let mut unflushed = 0;

        for attempt in 0..outcome.requested {
            let call_started = Instant::now();
            let result = generate_within(self.client.as_ref(), key, self.deadline).await;
            self.record(GENERATION_SECONDS, call_started.elapsed().as_secs_f64(), key);

            match result {
                Ok(item) => {
                    self.memory.push(key, item.clone());
                    self.persistent.append(key, item);
                    outcome.generated += 1;
                    unflushed += 1;
                    self.stats.generated.fetch_add(1, Ordering::Relaxed);
                    self.record(PREFETCH_GENERATED, 1.0, key);

                    if unflushed >= self.flush_every {
                        self.persistent.save_logged().await;
                        unflushed = 0;
                    }
                }
                Err(e) => {
                    outcome.failed += 1;
                    self.stats.failed.fetch_add(1, Ordering::Relaxed);
                    self.record(PREFETCH_FAILED, 1.0, key);
                    warn!(key = %key, attempt, kind = e.kind(), error = %e, "Prefetch attempt failed");
                }
            }
        }

        if unflushed > 0 {
            self.persistent.save_logged().await;
        }

        info!(
            key = %key,
            requested = outcome.requested,
            generated = outcome.generated,
            failed = outcome.failed,
            elapsed_ms = started.elapsed().as_millis() as u64,
            "Replenishment batch complete"
        );
        outcome
    }

    fn finish(&self, key: &Key) {
        let mut pending = mutex_lock(&self.pending, "prefetch");
        pending.remove(key);
        if pending.is_empty() {
            self.idle.notify_waiters();
        }
    }
}

/// Fixed-size worker pool that replenishes keys in the background.
pub struct PrefetchScheduler {
    shared: Arc<Shared>,
    sender: Mutex<Option<mpsc::Sender<Key>>>,
    receiver: Mutex<Option<mpsc::Receiver<Key>>>,
    workers: Mutex<Vec<JoinHandle<()>>>,
    worker_count: usize,
    warm_keys: Vec<Key>,
}

impl PrefetchScheduler {
    pub fn new(
        cache: &CacheConfig,
        prefetch: &PrefetchConfig,
        memory: Arc<MemoryTier>,
        persistent: Arc<PersistentTier>,
        client: Arc<dyn GenerationClient>,
        metrics: Option<Arc<dyn MetricsSink>>,
    ) -> Self {
        let (tx, rx) = mpsc::channel(prefetch.queue_depth.max(1));

        let shared = Arc::new(Shared {
            memory,
            persistent,
            client,
            metrics,
            target: cache.replenish_target(),
            flush_every: cache.flush_every.max(1),
            deadline: cache.generation_timeout(),
            replenish_lock: tokio::sync::Mutex::new(()),
            pending: Mutex::new(HashSet::new()),
            idle: Notify::new(),
            accepting: AtomicBool::new(true),
            stats: PrefetchStats::default(),
        });

        Self {
            shared,
            sender: Mutex::new(Some(tx)),
            receiver: Mutex::new(Some(rx)),
            workers: Mutex::new(Vec::new()),
            worker_count: prefetch.workers.max(1),
            warm_keys: prefetch.warm_keys.clone(),
        }
    }

    /// Launch the workers and enqueue the warm-up keys.
    ///
    /// Must be called from within a Tokio runtime. Calling it twice is a
    /// no-op.
    pub fn start(&self) {
        let Some(rx) = mutex_lock(&self.receiver, "prefetch").take() else {
            warn!("Prefetch scheduler already started");
            return;
        };
        let rx = Arc::new(tokio::sync::Mutex::new(rx));

        let mut workers = mutex_lock(&self.workers, "prefetch");
        for worker_id in 0..self.worker_count {
            let shared = self.shared.clone();
            let rx = rx.clone();
            workers.push(tokio::spawn(run_worker(worker_id, shared, rx)));
        }
        drop(workers);

        info!(
            workers = self.worker_count,
            warm_keys = self.warm_keys.len(),
            target = self.shared.target,
            "Prefetch scheduler started"
        );

        for key in &self.warm_keys {
            self.replenish(key);
        }
    }

    /// Request background replenishment of `key`. Never blocks.
    ///
    /// Returns `false` if the request was dropped: the key is already
    /// queued or running, the queue is full, or the scheduler is shut down.
    pub fn replenish(&self, key: &Key) -> bool {
        if !self.shared.accepting.load(Ordering::Acquire) {
            self.shared.stats.dropped.fetch_add(1, Ordering::Relaxed);
            return false;
        }

        {
            let mut pending = mutex_lock(&self.shared.pending, "prefetch");
            if !pending.insert(key.clone()) {
                self.shared.stats.deduplicated.fetch_add(1, Ordering::Relaxed);
                debug!(key = %key, "Replenishment already pending");
                return false;
            }
        }

        let sent = match mutex_lock(&self.sender, "prefetch").as_ref() {
            Some(tx) => tx.try_send(key.clone()).is_ok(),
            None => false,
        };

        if sent {
            self.shared.stats.scheduled.fetch_add(1, Ordering::Relaxed);
            debug!(key = %key, "Scheduled replenishment");
        } else {
            self.shared.stats.dropped.fetch_add(1, Ordering::Relaxed);
            self.shared.finish(key);
            warn!(key = %key, "Replenishment queue unavailable, request dropped");
        }
        sent
    }

    /// Run a replenishment batch for `key` on the calling task.
    pub async fn replenish_now(&self, key: &Key) -> ReplenishOutcome {
        self.shared.replenish(key).await
    }

    /// Whether a replenishment for `key` is queued or running.
    pub fn is_pending(&self, key: &Key) -> bool {
        mutex_lock(&self.shared.pending, "prefetch").contains(key)
    }

    /// Number of keys queued or running.
    pub fn pending_count(&self) -> usize {
        mutex_lock(&self.shared.pending, "prefetch").len()
    }

    /// Wait until no replenishment is queued or running.
    ///
    /// Only returns once workers have drained the queue, so the scheduler
    /// must have been started.
    pub async fn wait_idle(&self) {
        loop {
            let notified = self.shared.idle.notified();
            tokio::pin!(notified);
            notified.as_mut().enable();
            if self.pending_count() == 0 {
                return;
            }
            notified.await;
        }
    }

    /// Memory occupancy a batch aims for.
    pub fn target(&self) -> usize {
        self.shared.target
    }

    pub fn is_running(&self) -> bool {
        self.shared.accepting.load(Ordering::Acquire)
            && !mutex_lock(&self.workers, "prefetch").is_empty()
    }

    pub fn stats(&self) -> &PrefetchStats {
        &self.shared.stats
    }

    /// Stop accepting requests, let the workers drain the queue, then save
    /// the persistent tier.
    ///
    /// Nothing is cancelled: requests queued before the call still run and
    /// every batch completes. Each generation call is bounded by the cache
    /// deadline, which bounds how long this takes.
    pub async fn shutdown(&self) {
        self.shared.accepting.store(false, Ordering::Release);
        mutex_lock(&self.sender, "prefetch").take();

        let workers = std::mem::take(&mut *mutex_lock(&self.workers, "prefetch"));
        let count = workers.len();
        for result in futures::future::join_all(workers).await {
            if let Err(e) = result {
                warn!(error = %e, "Prefetch worker ended abnormally");
            }
        }

        {
            let mut pending = mutex_lock(&self.shared.pending, "prefetch");
            pending.clear();
        }
        self.shared.idle.notify_waiters();

        self.shared.persistent.save_logged().await;
        info!(workers = count, "Prefetch scheduler stopped");
    }
}

async fn run_worker(
    worker_id: usize,
    shared: Arc<Shared>,
    rx: Arc<tokio::sync::Mutex<mpsc::Receiver<Key>>>,
) {
    debug!(worker_id, "Prefetch worker started");
    loop {
        let next = {
            let mut rx = rx.lock().await;
            rx.recv().await
        };
        let Some(key) = next else {
            break;
        };

        shared.replenish(&key).await;
        shared.finish(&key);
    }
    debug!(worker_id, "Prefetch worker exiting");
}
