//! Blog engagement tracking endpoint (the Event Recorder).

use std::time::Instant;

use axum::{
    extract::{Path, State},
    Json,
};
use axum_extra::extract::cookie::CookieJar;
use chrono::Utc;
use tracing::{debug, error, warn};
use uuid::Uuid;

use analytics_core::engagement::is_landing_page;
use analytics_core::{
    EngagementDelta, EngagementEvent, EngagementEventType, Error, EventData, PostSession,
    TrackEngagementRequest, TrafficSource,
};
use store::NewTrafficEvent;
use telemetry::metrics;

use crate::extractors::{AuthUser, ClientIp, RequestMeta};
use crate::identity::{self, IdentityContext};
use crate::response::{ApiError, TrackResponse};
use crate::state::AppState;

/// POST /track/blog/:post_id/engagement
///
/// Fire-and-forget telemetry: validates the event, applies the engagement
/// snapshot update and the raw-log append in one transaction, then marks
/// the post dirty for deferred aggregation. The response carries nothing
/// but an acknowledgement plus refreshed identity cookies.
pub async fn track_engagement_handler(
    State(state): State<AppState>,
    Path(post_id): Path<Uuid>,
    meta: RequestMeta,
    AuthUser(user_id): AuthUser,
    ClientIp(client_ip): ClientIp,
    jar: CookieJar,
    Json(request): Json<TrackEngagementRequest>,
) -> Result<(CookieJar, Json<TrackResponse>), ApiError> {
    let start = Instant::now();

    let event_type = request.event_type()?;
    let data = EventData::parse(&request.event_data)?;

    if !state.post_exists(post_id).await? {
        return Err(Error::unknown_post(post_id).into());
    }

    // Without any identity cookie there is nothing to attribute the event
    // to. The client retries shortly; its page-view call sets the cookies.
    if !identity::has_tracking_cookies(&jar) {
        debug!(post_id = %post_id, "Engagement event without tracking cookies");
        return Err(Error::missing_cookies().into());
    }

    let referrer = meta.referrer.as_deref();
    let ctx = IdentityContext {
        path: None,
        referrer,
        source_hint: data.source.as_deref(),
        user_agent: meta.user_agent.as_deref(),
        ip: client_ip.as_deref(),
        user_id: user_id.as_deref(),
    };

    let resolved = match identity::resolve(&state.store, &state.cookies, jar, ctx).await {
        Ok(resolved) => resolved,
        Err(e) => {
            // Identity persistence must not silently lose the traffic hit.
            warn!(post_id = %post_id, "Identity resolution failed: {}", e);
            metrics().tracking_failures.inc();
            fallback_traffic_write(&state, post_id, &data, referrer).await;
            return Err(e.into());
        }
    };

    let now = Utc::now();
    let event = EngagementEvent::new(
        post_id,
        resolved.session.id,
        Some(resolved.visitor.id),
        event_type,
        request.event_data.clone(),
        now,
    );
    let delta = EngagementDelta::from_event(event_type, &data);

    // The engagement record is created by the first view of the pair; its
    // traffic source is classified once, from this request.
    let view = (event_type == EngagementEventType::View).then(|| {
        PostSession::new(
            resolved.session.id,
            post_id,
            resolved.visitor.id,
            TrafficSource::classify(data.source.as_deref(), referrer),
            referrer.map(String::from),
            is_landing_page(referrer, meta.host.as_deref()),
            now,
        )
    });

    if let Err(e) = state
        .store
        .record_engagement(view.as_ref(), &delta, &event)
        .await
    {
        error!(post_id = %post_id, event_type = %event_type, "Engagement write failed: {}", e);
        metrics().tracking_failures.inc();
        fallback_traffic_write(&state, post_id, &data, referrer).await;
        return Err(e.into());
    }

    // Deferred: the aggregator recomputes this post on the next flush.
    state.queue.enqueue(post_id);

    metrics().engagement_events_tracked.inc();
    metrics()
        .track_latency_ms
        .observe(start.elapsed().as_millis() as u64);

    debug!(
        post_id = %post_id,
        session_id = %resolved.session.id,
        event_type = %event_type,
        "Engagement event tracked"
    );

    Ok((resolved.jar, Json(TrackResponse::tracked())))
}

/// Best-effort minimal traffic-log entry, written when full tracking fails
/// so aggregate site traffic is not silently lost. Its own failure is
/// logged and swallowed; tracking never breaks the page.
async fn fallback_traffic_write(
    state: &AppState,
    post_id: Uuid,
    data: &EventData,
    referrer: Option<&str>,
) {
    let event = NewTrafficEvent {
        visitor_id: None,
        session_id: None,
        source: TrafficSource::classify(data.source.as_deref(), referrer),
        referrer: referrer.map(String::from),
        path: format!("/blog/{}", post_id),
        occurred_at: Utc::now(),
    };

    match state.store.insert_traffic_event(&event).await {
        Ok(()) => metrics().fallback_traffic_writes.inc(),
        Err(e) => warn!("Fallback traffic write failed: {}", e),
    }
}
