//! Application state shared across handlers.

use std::sync::Arc;
use std::time::Duration;

use moka::future::Cache;
use tracing::debug;
use uuid::Uuid;

use analytics_core::Result;
use store::AnalyticsStore;
use worker::AggregationQueue;

/// Cache TTL for post-existence lookups.
const POST_CACHE_TTL: Duration = Duration::from_secs(60);

/// Maximum cached post ids.
const POST_CACHE_MAX_CAPACITY: u64 = 10_000;

/// Cookie attributes that vary by environment.
#[derive(Debug, Clone)]
pub struct CookieOptions {
    /// Set the Secure attribute (on in production, off for local HTTP).
    pub secure: bool,
}

impl Default for CookieOptions {
    fn default() -> Self {
        Self { secure: true }
    }
}

/// Shared application state.
#[derive(Clone)]
pub struct AppState {
    /// Analytics store (Postgres in production, in-memory in tests)
    pub store: Arc<dyn AnalyticsStore>,
    /// Dirty-post queue feeding the aggregator
    pub queue: Arc<AggregationQueue>,
    /// Cookie attributes
    pub cookies: CookieOptions,
    /// Post-existence cache; keeps the hot tracking path off the posts table
    post_cache: Cache<Uuid, bool>,
}

impl AppState {
    pub fn new(
        store: Arc<dyn AnalyticsStore>,
        queue: Arc<AggregationQueue>,
        cookies: CookieOptions,
    ) -> Self {
        Self {
            store,
            queue,
            cookies,
            post_cache: Cache::builder()
                .max_capacity(POST_CACHE_MAX_CAPACITY)
                .time_to_live(POST_CACHE_TTL)
                .build(),
        }
    }

    /// Whether the post exists, via the cache.
    pub async fn post_exists(&self, id: Uuid) -> Result<bool> {
        if let Some(cached) = self.post_cache.get(&id).await {
            debug!(post_id = %id, "Post cache hit");
            return Ok(cached);
        }

        let exists = self.store.post_exists(id).await?;
        self.post_cache.insert(id, exists).await;
        Ok(exists)
    }
}
