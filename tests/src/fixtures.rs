//! Test fixtures and payload builders.

use uuid::Uuid;

/// Engagement request body for an event type with payload fields.
pub fn engagement_payload(event_type: &str, event_data: serde_json::Value) -> serde_json::Value {
    serde_json::json!({
        "event_type": event_type,
        "event_data": event_data,
    })
}

/// A bare `view` event.
pub fn view_payload() -> serde_json::Value {
    engagement_payload("view", serde_json::json!({}))
}

/// A `scroll_milestone` event at the given depth.
pub fn scroll_payload(depth: f64) -> serde_json::Value {
    engagement_payload("scroll_milestone", serde_json::json!({ "depth": depth }))
}

/// A `time_milestone` event at the given seconds.
pub fn time_payload(seconds: i64) -> serde_json::Value {
    engagement_payload("time_milestone", serde_json::json!({ "seconds": seconds }))
}

/// An `exit` event with final time on page.
pub fn exit_payload(time_on_page: i64) -> serde_json::Value {
    engagement_payload("exit", serde_json::json!({ "time_on_page": time_on_page }))
}

/// A `share` event for a platform.
pub fn share_payload(platform: &str) -> serde_json::Value {
    engagement_payload("share", serde_json::json!({ "platform": platform }))
}

/// Page-view request body for `POST /track`.
pub fn pageview_payload(path: &str) -> serde_json::Value {
    serde_json::json!({ "path": path })
}

/// Page-view request body with referrer and source hint.
pub fn pageview_payload_with(
    path: &str,
    referrer: Option<&str>,
    source: Option<&str>,
) -> serde_json::Value {
    let mut body = serde_json::json!({ "path": path });
    if let Some(referrer) = referrer {
        body["referrer"] = referrer.into();
    }
    if let Some(source) = source {
        body["source"] = source.into();
    }
    body
}

/// The engagement endpoint path for a post.
pub fn engagement_url(post_id: Uuid) -> String {
    format!("/track/blog/{}/engagement", post_id)
}
