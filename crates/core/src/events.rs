//! Engagement event taxonomy and wire types.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use uuid::Uuid;
use validator::Validate;

use crate::error::Error;
use crate::limits::MAX_EVENT_DATA_BYTES;

/// Fixed enumeration of tracked engagement actions.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum EngagementEventType {
    View,
    ScrollMilestone,
    TimeMilestone,
    Exit,
    CtaClick,
    Share,
    Comment,
    Like,
    Bookmark,
    CopyLink,
    NewsletterSignup,
    FormSubmit,
    OutboundClick,
    InternalClick,
}

impl EngagementEventType {
    /// Returns the event type as its stored string form.
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::View => "view",
            Self::ScrollMilestone => "scroll_milestone",
            Self::TimeMilestone => "time_milestone",
            Self::Exit => "exit",
            Self::CtaClick => "cta_click",
            Self::Share => "share",
            Self::Comment => "comment",
            Self::Like => "like",
            Self::Bookmark => "bookmark",
            Self::CopyLink => "copy_link",
            Self::NewsletterSignup => "newsletter_signup",
            Self::FormSubmit => "form_submit",
            Self::OutboundClick => "outbound_click",
            Self::InternalClick => "internal_click",
        }
    }
}

impl std::fmt::Display for EngagementEventType {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

impl std::str::FromStr for EngagementEventType {
    type Err = Error;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "view" => Ok(Self::View),
            "scroll_milestone" => Ok(Self::ScrollMilestone),
            "time_milestone" => Ok(Self::TimeMilestone),
            "exit" => Ok(Self::Exit),
            "cta_click" => Ok(Self::CtaClick),
            "share" => Ok(Self::Share),
            "comment" => Ok(Self::Comment),
            "like" => Ok(Self::Like),
            "bookmark" => Ok(Self::Bookmark),
            "copy_link" => Ok(Self::CopyLink),
            "newsletter_signup" => Ok(Self::NewsletterSignup),
            "form_submit" => Ok(Self::FormSubmit),
            "outbound_click" => Ok(Self::OutboundClick),
            "internal_click" => Ok(Self::InternalClick),
            other => Err(Error::invalid_event_type(other)),
        }
    }
}

/// Open engagement event payload.
///
/// Known fields are typed; everything else rides along in the raw JSON and
/// is preserved verbatim in the event log.
#[derive(Debug, Clone, Default, Serialize, Deserialize, Validate)]
pub struct EventData {
    /// Scroll depth percentage (scroll_milestone).
    #[validate(range(min = 0.0, max = 100.0))]
    pub depth: Option<f64>,
    /// Seconds on page so far (time_milestone).
    #[validate(range(min = 0))]
    pub seconds: Option<i64>,
    /// Final time on page (exit).
    #[validate(range(min = 0))]
    pub time_on_page: Option<i64>,
    /// Share platform (share).
    #[validate(length(max = 64))]
    pub platform: Option<String>,
    /// Clicked target (outbound_click / internal_click / cta_click).
    #[validate(length(max = 2048))]
    pub url: Option<String>,
    /// Explicit source hint for traffic classification.
    #[validate(length(max = 256))]
    pub source: Option<String>,
    /// Remaining payload fields.
    #[serde(flatten)]
    pub extra: serde_json::Map<String, serde_json::Value>,
}

impl EventData {
    /// Parses the open payload, enforcing the size limit and field bounds.
    /// An absent payload is an empty one.
    pub fn parse(value: &serde_json::Value) -> crate::Result<Self> {
        if value.is_null() {
            return Ok(Self::default());
        }

        let size = serde_json::to_vec(value).map(|v| v.len()).unwrap_or(0);
        if size > MAX_EVENT_DATA_BYTES {
            return Err(Error::validation(format!(
                "event_data {}KB exceeds {}KB limit",
                size / 1024,
                MAX_EVENT_DATA_BYTES / 1024
            )));
        }

        let data: EventData = serde_json::from_value(value.clone())?;
        data.validate()
            .map_err(|e| Error::validation(e.to_string()))?;
        Ok(data)
    }

    /// Scroll depth clamped to 0-100, as stored.
    pub fn scroll_depth(&self) -> Option<i32> {
        self.depth.map(|d| d.clamp(0.0, 100.0).round() as i32)
    }
}

/// Wire request for `POST /track/blog/{post_id}/engagement`.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct TrackEngagementRequest {
    pub event_type: Option<String>,
    #[serde(default)]
    pub event_data: serde_json::Value,
}

impl TrackEngagementRequest {
    /// Resolves the event type, failing with TRACK_001 when absent/unknown.
    pub fn event_type(&self) -> crate::Result<EngagementEventType> {
        match self.event_type.as_deref() {
            None | Some("") => Err(Error::invalid_event_type("(missing)")),
            Some(ty) => ty.parse(),
        }
    }
}

/// Wire request for `POST /track` (site-wide page views).
#[derive(Debug, Clone, Serialize, Deserialize, Validate)]
pub struct TrackPageviewRequest {
    #[validate(length(min = 1, max = 2000))]
    pub path: String,
    #[validate(length(max = 2048))]
    pub referrer: Option<String>,
    #[validate(length(max = 256))]
    pub source: Option<String>,
}

/// One row of the immutable raw engagement event log.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct EngagementEvent {
    pub post_id: Uuid,
    pub session_id: Uuid,
    pub visitor_id: Option<Uuid>,
    pub event_type: EngagementEventType,
    pub event_data: serde_json::Value,
    pub occurred_at: DateTime<Utc>,
}

impl EngagementEvent {
    pub fn new(
        post_id: Uuid,
        session_id: Uuid,
        visitor_id: Option<Uuid>,
        event_type: EngagementEventType,
        event_data: serde_json::Value,
        occurred_at: DateTime<Utc>,
    ) -> Self {
        Self {
            post_id,
            session_id,
            visitor_id,
            event_type,
            event_data,
            occurred_at,
        }
    }

    /// Share platform from the payload, lowercased; absent or blank maps to
    /// "other" so breakdown keys stay bounded.
    pub fn share_platform(&self) -> String {
        self.event_data
            .get("platform")
            .and_then(|v| v.as_str())
            .map(|s| s.trim().to_lowercase())
            .filter(|s| !s.is_empty())
            .unwrap_or_else(|| "other".to_string())
    }
}
