//! Per-post aggregate recomputation.

use std::sync::Arc;
use std::time::Instant;

use async_trait::async_trait;
use chrono::Utc;
use tracing::debug;
use uuid::Uuid;

use analytics_core::{EngagementWeights, PostAnalytics, Result};
use store::AnalyticsStore;
use telemetry::metrics;

/// Recomputes one post's aggregate row.
///
/// The queue talks to this trait so tests can drive batches with a
/// recording implementation.
#[async_trait]
pub trait PostAggregator: Send + Sync {
    async fn recompute(&self, post_id: Uuid) -> Result<()>;
}

/// Production aggregator: raw rows in, one `post_analytics` upsert out.
pub struct Aggregator {
    store: Arc<dyn AnalyticsStore>,
    weights: EngagementWeights,
}

impl Aggregator {
    pub fn new(store: Arc<dyn AnalyticsStore>, weights: EngagementWeights) -> Self {
        Self { store, weights }
    }
}

#[async_trait]
impl PostAggregator for Aggregator {
    /// Reads every engagement row and raw event for the post and overwrites
    /// the aggregate wholesale. Nothing is incremental, which is what makes
    /// reprocessing after failures or duplicate enqueues safe.
    async fn recompute(&self, post_id: Uuid) -> Result<()> {
        let start = Instant::now();

        let sessions = self.store.post_sessions(post_id).await?;
        let events = self.store.engagement_events(post_id).await?;

        let stats =
            PostAnalytics::compute(post_id, &sessions, &events, &self.weights, Utc::now());
        self.store.upsert_post_analytics(&stats).await?;

        let latency_ms = start.elapsed().as_millis() as u64;
        metrics().aggregations_completed.inc();
        metrics().aggregation_latency_ms.observe(latency_ms);

        debug!(
            post_id = %post_id,
            views = stats.total_views,
            engagement_score = stats.engagement_score,
            latency_ms = latency_ms,
            "Recomputed post analytics"
        );

        Ok(())
    }
}
