//! Metrics reporting for the question cache.
//!
//! The cache reports through the [`MetricsSink`] trait and never depends on
//! a sink being present. [`PrometheusSink`] is the bundled implementation.

use prometheus::{CounterVec, Encoder, HistogramOpts, HistogramVec, Opts, Registry, TextEncoder};

/// Served from the memory tier.
pub const CACHE_MEMORY_HIT: &str = "cache_memory_hit";
/// Served from the persistent tier.
pub const CACHE_DISK_HIT: &str = "cache_disk_hit";
/// Both tiers empty; fell through to synchronous generation.
pub const CACHE_MISS: &str = "cache_miss";
/// Synchronous generation failed; the caller got nothing.
pub const CACHE_GENERATE_FAILURE: &str = "cache_generate_failure";
/// Latency of one generation call, successful or not.
pub const GENERATION_SECONDS: &str = "generation_seconds";
/// Items produced by background replenishment.
pub const PREFETCH_GENERATED: &str = "prefetch_generated";
/// Failed attempts inside a replenishment batch.
pub const PREFETCH_FAILED: &str = "prefetch_failed";

/// Receives cache metrics. Calls must be cheap and must never block.
pub trait MetricsSink: Send + Sync {
    fn record_metric(&self, name: &str, value: f64, category: &str);
}

/// Prometheus-backed sink.
///
/// Names ending in `_seconds` feed a histogram; everything else increments
/// a counter by `value`.
pub struct PrometheusSink {
    registry: Registry,
    events: CounterVec,
    durations: HistogramVec,
}

impl PrometheusSink {
    pub fn new() -> prometheus::Result<Self> {
        let registry = Registry::new();

        let events = CounterVec::new(
            Opts::new("quiz_cache_events_total", "Question cache events"),
            &["name", "category"],
        )?;
        let durations = HistogramVec::new(
            HistogramOpts::new("quiz_cache_duration_seconds", "Question cache timings")
                .buckets(vec![0.05, 0.1, 0.25, 0.5, 1.0, 2.5, 5.0, 10.0, 30.0]),
            &["name", "category"],
        )?;

        registry.register(Box::new(events.clone()))?;
        registry.register(Box::new(durations.clone()))?;

        Ok(Self {
            registry,
            events,
            durations,
        })
    }

    /// Current value of an event counter.
    pub fn counter(&self, name: &str, category: &str) -> f64 {
        self.events.with_label_values(&[name, category]).get()
    }

    /// Number of observations recorded for a timing.
    pub fn observations(&self, name: &str, category: &str) -> u64 {
        self.durations
            .with_label_values(&[name, category])
            .get_sample_count()
    }

    /// Prometheus text exposition of everything recorded so far.
    pub fn render(&self) -> String {
        let mut buf = Vec::new();
        let encoder = TextEncoder::new();
        if encoder.encode(&self.registry.gather(), &mut buf).is_err() {
            return String::new();
        }
        String::from_utf8(buf).unwrap_or_default()
    }
}

impl MetricsSink for PrometheusSink {
    fn record_metric(&self, name: &str, value: f64, category: &str) {
        if name.ends_with("_seconds") {
            self.durations
                .with_label_values(&[name, category])
                .observe(value);
        } else if value >= 0.0 {
            self.events
                .with_label_values(&[name, category])
                .inc_by(value);
        }
    }
}
