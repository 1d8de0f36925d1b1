//! Internal metrics collection.
//!
//! Collected in-memory with atomics; a background task periodically logs a
//! snapshot.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::sync::atomic::{AtomicU64, Ordering};

/// A counter metric.
#[derive(Debug, Default)]
pub struct Counter(AtomicU64);

impl Counter {
    pub fn new() -> Self {
        Self(AtomicU64::new(0))
    }

    pub fn inc(&self) {
        self.0.fetch_add(1, Ordering::Relaxed);
    }

    pub fn inc_by(&self, n: u64) {
        self.0.fetch_add(n, Ordering::Relaxed);
    }

    pub fn get(&self) -> u64 {
        self.0.load(Ordering::Relaxed)
    }
}

/// A gauge metric (can go up or down).
#[derive(Debug, Default)]
pub struct Gauge(AtomicU64);

impl Gauge {
    pub fn new() -> Self {
        Self(AtomicU64::new(0))
    }

    pub fn set(&self, val: u64) {
        self.0.store(val, Ordering::Relaxed);
    }

    pub fn get(&self) -> u64 {
        self.0.load(Ordering::Relaxed)
    }
}

/// Histogram for latency tracking.
#[derive(Debug)]
pub struct Histogram {
    /// Buckets: 1ms, 5ms, 10ms, 25ms, 50ms, 100ms, 250ms, 500ms, 1s, 5s, 10s
    buckets: [AtomicU64; 11],
    sum: AtomicU64,
    count: AtomicU64,
}

impl Default for Histogram {
    fn default() -> Self {
        Self::new()
    }
}

impl Histogram {
    const BUCKET_BOUNDS: [u64; 11] = [1, 5, 10, 25, 50, 100, 250, 500, 1000, 5000, 10000];

    pub fn new() -> Self {
        Self {
            buckets: Default::default(),
            sum: AtomicU64::new(0),
            count: AtomicU64::new(0),
        }
    }

    /// Records a value in milliseconds.
    pub fn observe(&self, ms: u64) {
        self.sum.fetch_add(ms, Ordering::Relaxed);
        self.count.fetch_add(1, Ordering::Relaxed);

        for (i, &bound) in Self::BUCKET_BOUNDS.iter().enumerate() {
            if ms <= bound {
                self.buckets[i].fetch_add(1, Ordering::Relaxed);
                return;
            }
        }
        // Value exceeds all buckets, add to last
        self.buckets[10].fetch_add(1, Ordering::Relaxed);
    }

    pub fn count(&self) -> u64 {
        self.count.load(Ordering::Relaxed)
    }

    pub fn sum(&self) -> u64 {
        self.sum.load(Ordering::Relaxed)
    }

    pub fn mean(&self) -> f64 {
        let count = self.count();
        if count == 0 {
            0.0
        } else {
            self.sum() as f64 / count as f64
        }
    }
}

/// Collected metrics for the analytics pipeline.
#[derive(Debug, Default)]
pub struct Metrics {
    // Tracking metrics
    pub pageviews_tracked: Counter,
    pub engagement_events_tracked: Counter,
    pub tracking_failures: Counter,
    pub fallback_traffic_writes: Counter,

    // Identity metrics
    pub visitors_created: Counter,
    pub sessions_created: Counter,
    pub sessions_expired: Counter,
    pub identities_recreated: Counter,

    // Aggregation metrics
    pub posts_enqueued: Counter,
    pub aggregations_completed: Counter,
    pub aggregations_failed: Counter,

    // Latency histograms
    pub track_latency_ms: Histogram,
    pub aggregation_latency_ms: Histogram,

    // Gauges
    pub dirty_posts: Gauge,
}

impl Metrics {
    pub fn new() -> Self {
        Self::default()
    }
}

/// A snapshot of metrics at a point in time.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct MetricsSnapshot {
    pub timestamp: DateTime<Utc>,
    pub pageviews_tracked: u64,
    pub engagement_events_tracked: u64,
    pub tracking_failures: u64,
    pub fallback_traffic_writes: u64,
    pub visitors_created: u64,
    pub sessions_created: u64,
    pub sessions_expired: u64,
    pub identities_recreated: u64,
    pub posts_enqueued: u64,
    pub aggregations_completed: u64,
    pub aggregations_failed: u64,
    pub track_latency_mean_ms: f64,
    pub aggregation_latency_mean_ms: f64,
    pub dirty_posts: u64,
}

impl Metrics {
    /// Takes a snapshot of current metrics.
    pub fn snapshot(&self) -> MetricsSnapshot {
        MetricsSnapshot {
            timestamp: Utc::now(),
            pageviews_tracked: self.pageviews_tracked.get(),
            engagement_events_tracked: self.engagement_events_tracked.get(),
            tracking_failures: self.tracking_failures.get(),
            fallback_traffic_writes: self.fallback_traffic_writes.get(),
            visitors_created: self.visitors_created.get(),
            sessions_created: self.sessions_created.get(),
            sessions_expired: self.sessions_expired.get(),
            identities_recreated: self.identities_recreated.get(),
            posts_enqueued: self.posts_enqueued.get(),
            aggregations_completed: self.aggregations_completed.get(),
            aggregations_failed: self.aggregations_failed.get(),
            track_latency_mean_ms: self.track_latency_ms.mean(),
            aggregation_latency_mean_ms: self.aggregation_latency_ms.mean(),
            dirty_posts: self.dirty_posts.get(),
        }
    }
}

/// Global metrics registry.
pub static METRICS: std::sync::LazyLock<Metrics> = std::sync::LazyLock::new(Metrics::new);

/// Get the global metrics instance.
pub fn metrics() -> &'static Metrics {
    &METRICS
}
