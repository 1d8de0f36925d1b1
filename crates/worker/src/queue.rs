//! Deduplicating, time-batched aggregation queue.
//!
//! Recomputing a post's aggregates on every tracking call would run the
//! full rollup several times per page view. Instead `enqueue` only marks
//! the post dirty; a timer drains the dirty set in batches, so a burst of
//! events against one post costs one recomputation per flush interval.
//!
//! The dirty set is in-process state with no cross-instance coordination.
//! Horizontally-scaled deployments may recompute a post redundantly, which
//! is harmless: aggregation is a full idempotent overwrite.

use std::collections::{HashSet, VecDeque};
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use std::time::Duration;

use parking_lot::Mutex;
use tokio::task::JoinSet;
use tokio::time::interval;
use tracing::{debug, error, info};
use uuid::Uuid;

use telemetry::metrics;

use crate::aggregator::PostAggregator;

/// Aggregation queue configuration.
#[derive(Debug, Clone)]
pub struct QueueConfig {
    /// How often the dirty set is drained
    pub flush_interval: Duration,
    /// Maximum posts processed per flush
    pub batch_size: usize,
    /// Concurrent recomputations per flush, bounds pool usage
    pub concurrency: usize,
}

impl Default for QueueConfig {
    fn default() -> Self {
        Self {
            flush_interval: Duration::from_secs(30),
            batch_size: 50,
            concurrency: 5,
        }
    }
}

/// Insertion-ordered dedup set of dirty post ids.
#[derive(Default)]
struct DirtySet {
    order: VecDeque<Uuid>,
    members: HashSet<Uuid>,
}

impl DirtySet {
    /// Marks a post dirty. A post already pending (or mid-flush) collapses
    /// into the existing unit of work.
    fn mark(&mut self, post_id: Uuid) -> bool {
        if self.members.insert(post_id) {
            self.order.push_back(post_id);
            true
        } else {
            false
        }
    }

    /// Takes up to `n` ids for processing. Membership is kept until the
    /// recomputation finishes so duplicate enqueues keep collapsing.
    fn take(&mut self, n: usize) -> Vec<Uuid> {
        let n = n.min(self.order.len());
        self.order.drain(..n).collect()
    }

    fn complete(&mut self, post_id: Uuid) {
        self.members.remove(&post_id);
    }

    fn len(&self) -> usize {
        self.members.len()
    }
}

/// In-process scheduler that defers per-post aggregation.
///
/// Constructed explicitly and started with [`AggregationQueue::start`];
/// tests call [`AggregationQueue::flush_once`] to drive flushes without a
/// timer.
pub struct AggregationQueue {
    dirty: Mutex<DirtySet>,
    flushing: AtomicBool,
    config: QueueConfig,
}

impl AggregationQueue {
    pub fn new(config: QueueConfig) -> Self {
        Self {
            dirty: Mutex::new(DirtySet::default()),
            flushing: AtomicBool::new(false),
            config,
        }
    }

    pub fn config(&self) -> &QueueConfig {
        &self.config
    }

    /// Marks a post for recomputation. Never blocks and never fails;
    /// callers treat aggregation as fire-and-forget.
    pub fn enqueue(&self, post_id: Uuid) {
        let mut dirty = self.dirty.lock();
        if dirty.mark(post_id) {
            metrics().posts_enqueued.inc();
            debug!(post_id = %post_id, pending = dirty.len(), "Post marked dirty");
        }
        metrics().dirty_posts.set(dirty.len() as u64);
    }

    /// Number of posts currently pending.
    pub fn len(&self) -> usize {
        self.dirty.lock().len()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    /// Starts the flush timer. Returns the task handle; aborting it stops
    /// the timer without losing the dirty set.
    pub fn start(
        self: Arc<Self>,
        aggregator: Arc<dyn PostAggregator>,
    ) -> tokio::task::JoinHandle<()> {
        info!(
            flush_interval_secs = self.config.flush_interval.as_secs(),
            batch_size = self.config.batch_size,
            concurrency = self.config.concurrency,
            "Aggregation queue started"
        );

        tokio::spawn(async move {
            let mut ticker = interval(self.config.flush_interval);
            // The first tick fires immediately; skip it so a fresh queue
            // waits a full interval before its first flush.
            ticker.tick().await;

            loop {
                ticker.tick().await;
                self.flush_once(&aggregator).await;
            }
        })
    }

    /// Drains and processes one batch. Returns the number of posts
    /// processed; 0 when the set was empty or a flush was already running.
    pub async fn flush_once(&self, aggregator: &Arc<dyn PostAggregator>) -> usize {
        // A slow flush must not stack another on top of itself.
        if self.flushing.swap(true, Ordering::AcqRel) {
            debug!("Flush already in progress, skipping");
            return 0;
        }

        let batch = self.dirty.lock().take(self.config.batch_size);
        let processed = if batch.is_empty() {
            0
        } else {
            self.process_batch(aggregator, batch).await
        };

        metrics().dirty_posts.set(self.len() as u64);
        self.flushing.store(false, Ordering::Release);
        processed
    }

    /// Recomputes a batch with bounded concurrency. Failures are logged and
    /// isolated per post; a failed post waits for its next natural enqueue.
    async fn process_batch(
        &self,
        aggregator: &Arc<dyn PostAggregator>,
        batch: Vec<Uuid>,
    ) -> usize {
        let count = batch.len();
        debug!(count = count, "Flushing dirty posts");

        for chunk in batch.chunks(self.config.concurrency.max(1)) {
            let mut tasks: JoinSet<(Uuid, analytics_core::Result<()>)> = JoinSet::new();

            for &post_id in chunk {
                let aggregator = Arc::clone(aggregator);
                tasks.spawn(async move { (post_id, aggregator.recompute(post_id).await) });
            }

            while let Some(joined) = tasks.join_next().await {
                let Ok((post_id, result)) = joined else {
                    error!("Aggregation task panicked");
                    continue;
                };

                if let Err(e) = result {
                    error!(post_id = %post_id, "Aggregation failed: {}", e);
                    metrics().aggregations_failed.inc();
                }
                self.dirty.lock().complete(post_id);
            }
        }

        count
    }

    /// Flushes every pending post synchronously. Called on graceful
    /// shutdown after the timer task has been stopped.
    pub async fn drain_all(&self, aggregator: &Arc<dyn PostAggregator>) {
        let mut drained = 0;
        while !self.is_empty() {
            let processed = self.flush_once(aggregator).await;
            if processed == 0 {
                // Another flush holds the flag; yield and retry.
                tokio::task::yield_now().await;
                continue;
            }
            drained += processed;
        }
        if drained > 0 {
            info!(count = drained, "Drained aggregation queue on shutdown");
        }
    }
}
