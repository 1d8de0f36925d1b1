//! Common test setup functions.

use std::sync::Arc;

use axum::Router;
use axum_test::{TestResponse, TestServer};
use axum_extra::extract::cookie::Cookie;
use uuid::Uuid;

use analytics_core::limits::{SESSION_COOKIE, VISITOR_COOKIE};
use analytics_core::EngagementWeights;
use api::{router, AppState, CookieOptions};
use store::AnalyticsStore;
use worker::{AggregationQueue, Aggregator, PostAggregator, QueueConfig};

use crate::mocks::MemoryStore;

/// Test context wiring the real router to the in-memory store.
///
/// All production code paths run except Postgres itself: the router, the
/// identity resolver, the engagement fold, the queue, and the aggregator
/// are the same objects `main` constructs.
pub struct TestContext {
    pub store: Arc<MemoryStore>,
    pub queue: Arc<AggregationQueue>,
    pub router: Router,
}

impl TestContext {
    /// Create a new test context with all components initialized.
    pub fn new() -> Self {
        Self::with_queue_config(QueueConfig::default())
    }

    pub fn with_queue_config(config: QueueConfig) -> Self {
        let store = MemoryStore::new();
        let as_dyn: Arc<dyn AnalyticsStore> = store.clone();
        let queue = Arc::new(AggregationQueue::new(config));

        let state = AppState::new(
            as_dyn,
            queue.clone(),
            // Tests speak plain HTTP.
            CookieOptions { secure: false },
        );

        Self {
            store,
            queue,
            router: router(state),
        }
    }

    pub fn server(&self) -> TestServer {
        TestServer::new(self.router.clone()).expect("Failed to create test server")
    }

    /// Seeds a post and returns its id.
    pub fn seed_post(&self) -> Uuid {
        let id = Uuid::new_v4();
        self.store.seed_post(id);
        id
    }

    /// The production aggregator over this context's store.
    pub fn aggregator(&self) -> Arc<dyn PostAggregator> {
        let as_dyn: Arc<dyn AnalyticsStore> = self.store.clone();
        Arc::new(Aggregator::new(as_dyn, EngagementWeights::default()))
    }
}

impl Default for TestContext {
    fn default() -> Self {
        Self::new()
    }
}

/// Pulls the identity cookies a tracking response set.
pub fn identity_cookies(response: &TestResponse) -> (Cookie<'static>, Cookie<'static>) {
    (
        response.cookie(VISITOR_COOKIE),
        response.cookie(SESSION_COOKIE),
    )
}
