//! Per-(session, post) engagement state and the monotonic event fold.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use url::Url;
use uuid::Uuid;

use crate::events::{EngagementEventType, EventData};
use crate::limits::{ENGAGED_SCROLL_DEPTH, ENGAGED_TIME_SECS, READ_TO_END_DEPTH};
use crate::traffic::TrafficSource;

/// The engagement record for one (session, post) pair.
///
/// At most one exists per pair. All progress fields only move forward:
/// watermarks take the max of old and new, boolean flags OR-accumulate.
/// Out-of-order milestone delivery is therefore harmless.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct PostSession {
    pub session_id: Uuid,
    pub post_id: Uuid,
    pub visitor_id: Uuid,
    pub entered_at: DateTime<Utc>,
    pub exited_at: Option<DateTime<Utc>>,
    /// Seconds on page, monotonically increasing watermark.
    pub time_on_page: i64,
    /// Deepest scroll percentage seen, 0-100.
    pub max_scroll_depth: i32,
    pub read_to_end: bool,
    pub was_engaged: bool,
    pub clicked_cta: bool,
    pub shared_content: bool,
    pub submitted_form: bool,
    pub subscribed_newsletter: bool,
    pub traffic_source: TrafficSource,
    pub referrer: Option<String>,
    pub is_landing_page: bool,
    pub is_exit_page: bool,
}

impl PostSession {
    /// Creates the record for the first `view` event of a pair.
    #[allow(clippy::too_many_arguments)]
    pub fn new(
        session_id: Uuid,
        post_id: Uuid,
        visitor_id: Uuid,
        traffic_source: TrafficSource,
        referrer: Option<String>,
        is_landing_page: bool,
        now: DateTime<Utc>,
    ) -> Self {
        Self {
            session_id,
            post_id,
            visitor_id,
            entered_at: now,
            exited_at: None,
            time_on_page: 0,
            max_scroll_depth: 0,
            read_to_end: false,
            was_engaged: false,
            clicked_cta: false,
            shared_content: false,
            submitted_form: false,
            subscribed_newsletter: false,
            traffic_source,
            referrer,
            is_landing_page,
            is_exit_page: false,
        }
    }
}

/// Whether a post view is the landing page of its visit: the referrer does
/// not point back at our own host.
pub fn is_landing_page(referrer: Option<&str>, own_host: Option<&str>) -> bool {
    let (Some(referrer), Some(own_host)) = (referrer, own_host) else {
        return true;
    };
    match Url::parse(referrer) {
        Ok(url) => url.host_str() != Some(own_host),
        // Not a URL at all: treat as an external entry.
        Err(_) => true,
    }
}

/// The conditional update one engagement event applies to a [`PostSession`].
///
/// This is the single pure mapping from `(event type, payload)` to the
/// field changes the store applies with GREATEST / boolean-OR semantics. The
/// Postgres implementation mirrors this in SQL; the in-memory store applies
/// it directly via [`EngagementDelta::apply_to`].
#[derive(Debug, Clone, Default, PartialEq)]
pub struct EngagementDelta {
    /// New floor for the time-on-page watermark.
    pub time_on_page: Option<i64>,
    /// New floor for the scroll-depth watermark.
    pub scroll_depth: Option<i32>,
    pub read_to_end: bool,
    pub was_engaged: bool,
    pub clicked_cta: bool,
    pub shared_content: bool,
    pub submitted_form: bool,
    pub subscribed_newsletter: bool,
    pub is_exit_page: bool,
}

impl EngagementDelta {
    /// Derives the update for one event. Events that only feed the raw log
    /// (comment, like, bookmark, copy_link, clicks) produce an empty delta.
    pub fn from_event(event_type: EngagementEventType, data: &EventData) -> Self {
        let mut delta = Self::default();

        match event_type {
            EngagementEventType::ScrollMilestone => {
                if let Some(depth) = data.scroll_depth() {
                    delta.scroll_depth = Some(depth);
                    delta.read_to_end = depth >= READ_TO_END_DEPTH;
                    delta.was_engaged = depth >= ENGAGED_SCROLL_DEPTH;
                }
            }
            EngagementEventType::TimeMilestone => {
                if let Some(seconds) = data.seconds {
                    delta.time_on_page = Some(seconds);
                    delta.was_engaged = seconds >= ENGAGED_TIME_SECS;
                }
            }
            EngagementEventType::Exit => {
                delta.time_on_page = data.time_on_page;
                delta.is_exit_page = true;
            }
            EngagementEventType::CtaClick => {
                delta.clicked_cta = true;
                delta.was_engaged = true;
            }
            EngagementEventType::Share => {
                delta.shared_content = true;
                delta.was_engaged = true;
            }
            EngagementEventType::FormSubmit => {
                delta.submitted_form = true;
                delta.was_engaged = true;
            }
            EngagementEventType::NewsletterSignup => {
                delta.subscribed_newsletter = true;
                delta.was_engaged = true;
            }
            EngagementEventType::View
            | EngagementEventType::Comment
            | EngagementEventType::Like
            | EngagementEventType::Bookmark
            | EngagementEventType::CopyLink
            | EngagementEventType::OutboundClick
            | EngagementEventType::InternalClick => {}
        }

        delta
    }

    /// True when applying this delta cannot change any row.
    pub fn is_empty(&self) -> bool {
        *self == Self::default()
    }

    /// Applies the delta to an in-memory record with the same semantics the
    /// Postgres store expresses as `GREATEST(...)` and `field OR $n`.
    pub fn apply_to(&self, record: &mut PostSession, now: DateTime<Utc>) {
        if let Some(time) = self.time_on_page {
            record.time_on_page = record.time_on_page.max(time);
        }
        if let Some(depth) = self.scroll_depth {
            record.max_scroll_depth = record.max_scroll_depth.max(depth);
        }
        record.read_to_end |= self.read_to_end;
        record.was_engaged |= self.was_engaged;
        record.clicked_cta |= self.clicked_cta;
        record.shared_content |= self.shared_content;
        record.submitted_form |= self.submitted_form;
        record.subscribed_newsletter |= self.subscribed_newsletter;
        if self.is_exit_page {
            record.is_exit_page = true;
            record.exited_at = Some(now);
        }
    }
}
