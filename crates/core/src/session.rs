//! Visitor and session identity types.

use chrono::{DateTime, Duration, Utc};
use serde::{Deserialize, Serialize};
use uuid::Uuid;

use crate::traffic::TrafficSource;

/// Session inactivity window (30 minutes).
pub const SESSION_TIMEOUT_MINUTES: i64 = 30;

/// Long-lived anonymous identity tied to a browser via a persistent cookie.
///
/// First-touch attribution fields are immutable once set: the store only
/// fills them via COALESCE-style set-if-null updates.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Visitor {
    pub id: Uuid,
    /// Linked authenticated user, attached first-write-wins.
    pub user_id: Option<String>,
    pub first_source: Option<TrafficSource>,
    pub first_referrer: Option<String>,
    pub first_landing_path: Option<String>,
    pub first_seen_at: DateTime<Utc>,
    pub last_seen_at: DateTime<Utc>,
}

impl Visitor {
    /// Creates a visitor with first-touch attribution from the current
    /// request. `id` comes from an existing cookie when one is being
    /// re-materialized, otherwise it is freshly generated by the caller.
    pub fn new(
        id: Uuid,
        source: TrafficSource,
        referrer: Option<String>,
        landing_path: Option<String>,
        now: DateTime<Utc>,
    ) -> Self {
        Self {
            id,
            user_id: None,
            first_source: Some(source),
            first_referrer: referrer,
            first_landing_path: landing_path,
            first_seen_at: now,
            last_seen_at: now,
        }
    }
}

/// Bounded-lifetime browsing session belonging to one visitor.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Session {
    pub id: Uuid,
    pub visitor_id: Uuid,
    pub user_id: Option<String>,
    /// Immutable for the session's lifetime.
    pub traffic_source: TrafficSource,
    pub landing_path: Option<String>,
    pub user_agent: Option<String>,
    pub ip: Option<String>,
    pub started_at: DateTime<Utc>,
    pub last_seen_at: DateTime<Utc>,
    pub ended_at: Option<DateTime<Utc>>,
    pub page_count: i32,
}

impl Session {
    pub fn new(
        id: Uuid,
        visitor_id: Uuid,
        traffic_source: TrafficSource,
        landing_path: Option<String>,
        user_agent: Option<String>,
        ip: Option<String>,
        now: DateTime<Utc>,
    ) -> Self {
        Self {
            id,
            visitor_id,
            user_id: None,
            traffic_source,
            landing_path,
            user_agent,
            ip,
            started_at: now,
            last_seen_at: now,
            ended_at: None,
            page_count: 0,
        }
    }

    /// Whether the session is still active at `now`.
    ///
    /// Active means not explicitly ended and seen within the inactivity
    /// window. Once the window elapses the session is implicitly over and
    /// gets lazily marked ended on its next observation.
    pub fn is_active(&self, now: DateTime<Utc>) -> bool {
        self.ended_at.is_none()
            && now - self.last_seen_at <= Duration::minutes(SESSION_TIMEOUT_MINUTES)
    }
}
