//! Relational storage layer for the analytics pipeline.
//!
//! [`AnalyticsStore`] is the seam between the pipeline and persistence:
//! handlers and the aggregator speak typed repository methods, the
//! production implementation ([`PgStore`]) speaks Postgres, and tests plug
//! in an in-memory implementation.

pub mod config;
pub mod health;
pub mod pg;
pub mod schema;

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use uuid::Uuid;

use analytics_core::{
    EngagementDelta, EngagementEvent, PostAnalytics, PostSession, Result, Session,
    TrafficSource, Visitor,
};

pub use config::StoreConfig;
pub use pg::PgStore;

/// One row of the site-wide traffic log.
///
/// Written for every tracked page view, and also the minimal best-effort
/// fallback when full engagement tracking fails: identity links are optional
/// so the row can be written with nothing but source/referrer/path.
#[derive(Debug, Clone, PartialEq)]
pub struct NewTrafficEvent {
    pub visitor_id: Option<Uuid>,
    pub session_id: Option<Uuid>,
    pub source: TrafficSource,
    pub referrer: Option<String>,
    pub path: String,
    pub occurred_at: DateTime<Utc>,
}

/// Typed repository methods over the analytics tables.
///
/// Writes that must not diverge (engagement snapshot + raw log) are single
/// methods so implementations can make them atomic.
#[async_trait]
pub trait AnalyticsStore: Send + Sync {
    // --- Visitors ---

    async fn get_visitor(&self, id: Uuid) -> Result<Option<Visitor>>;

    async fn insert_visitor(&self, visitor: &Visitor) -> Result<()>;

    /// Refreshes `last_seen_at` and attaches the authenticated user
    /// first-write-wins.
    async fn touch_visitor(
        &self,
        id: Uuid,
        now: DateTime<Utc>,
        user_id: Option<&str>,
    ) -> Result<()>;

    // --- Sessions ---

    async fn get_session(&self, id: Uuid) -> Result<Option<Session>>;

    async fn insert_session(&self, session: &Session) -> Result<()>;

    /// Refreshes `last_seen_at` and attaches the authenticated user
    /// first-write-wins.
    async fn touch_session(
        &self,
        id: Uuid,
        now: DateTime<Utc>,
        user_id: Option<&str>,
    ) -> Result<()>;

    /// Marks a stale session ended. `ended_at` is its last observed
    /// activity, not the time we noticed.
    async fn end_session(&self, id: Uuid, ended_at: DateTime<Utc>) -> Result<()>;

    /// Appends a navigation-log row and bumps the session page count.
    async fn record_navigation(
        &self,
        session_id: Uuid,
        path: &str,
        referrer: Option<&str>,
        now: DateTime<Utc>,
    ) -> Result<()>;

    // --- Users (owned externally; acquisition back-fill only) ---

    /// COALESCE back-fill of the user's acquisition columns from first-touch
    /// visitor attribution. Values already present are never overwritten.
    async fn backfill_user_acquisition(
        &self,
        user_id: &str,
        source: TrafficSource,
        referrer: Option<&str>,
        landing_path: Option<&str>,
    ) -> Result<()>;

    // --- Posts (owned externally; existence check only) ---

    async fn post_exists(&self, id: Uuid) -> Result<bool>;

    // --- Engagement ---

    /// Applies one tracked engagement event atomically: optional view-row
    /// upsert, the monotonic delta update, and the raw-log append either all
    /// land or none do.
    async fn record_engagement(
        &self,
        view: Option<&PostSession>,
        delta: &EngagementDelta,
        event: &EngagementEvent,
    ) -> Result<()>;

    async fn get_post_session(
        &self,
        session_id: Uuid,
        post_id: Uuid,
    ) -> Result<Option<PostSession>>;

    // --- Traffic log ---

    async fn insert_traffic_event(&self, event: &NewTrafficEvent) -> Result<()>;

    // --- Aggregation ---

    async fn post_sessions(&self, post_id: Uuid) -> Result<Vec<PostSession>>;

    async fn engagement_events(&self, post_id: Uuid) -> Result<Vec<EngagementEvent>>;

    /// Overwrites the whole aggregate row for the post.
    async fn upsert_post_analytics(&self, stats: &PostAnalytics) -> Result<()>;

    async fn get_post_analytics(&self, post_id: Uuid) -> Result<Option<PostAnalytics>>;

    // --- Health ---

    async fn ping(&self) -> Result<()>;
}
