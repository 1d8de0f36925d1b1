//! Site-wide page-view tracking endpoint.
//!
//! The simpler sibling of the engagement recorder: same identity
//! resolution and traffic classification, but its only writes are the
//! navigation log and a traffic-event row.

use std::time::Instant;

use axum::{extract::State, Json};
use axum_extra::extract::cookie::CookieJar;
use chrono::Utc;
use tracing::{debug, error, warn};
use validator::Validate;

use analytics_core::{TrackPageviewRequest, TrafficSource};
use store::NewTrafficEvent;
use telemetry::metrics;

use crate::extractors::{AuthUser, ClientIp, RequestMeta};
use crate::identity::{self, IdentityContext, ResolvedIdentity};
use crate::response::{ApiError, TrackResponse};
use crate::state::AppState;

/// POST /track
pub async fn track_pageview_handler(
    State(state): State<AppState>,
    meta: RequestMeta,
    AuthUser(user_id): AuthUser,
    ClientIp(client_ip): ClientIp,
    jar: CookieJar,
    Json(request): Json<TrackPageviewRequest>,
) -> Result<(CookieJar, Json<TrackResponse>), ApiError> {
    let start = Instant::now();

    request
        .validate()
        .map_err(|e| ApiError::bad_request(e.to_string()))?;

    let referrer = request.referrer.as_deref().or(meta.referrer.as_deref());
    let source = TrafficSource::classify(request.source.as_deref(), referrer);

    let ctx = IdentityContext {
        path: Some(&request.path),
        referrer,
        source_hint: request.source.as_deref(),
        user_agent: meta.user_agent.as_deref(),
        ip: client_ip.as_deref(),
        user_id: user_id.as_deref(),
    };

    let resolved = match identity::resolve(&state.store, &state.cookies, jar, ctx).await {
        Ok(resolved) => resolved,
        Err(e) => {
            warn!(path = %request.path, "Identity resolution failed: {}", e);
            metrics().tracking_failures.inc();
            fallback_traffic_write(&state, &request, source, referrer).await;
            return Err(e.into());
        }
    };

    if let Err(e) = record_pageview(&state, &resolved, &request, source, referrer).await {
        error!(path = %request.path, "Pageview write failed: {}", e);
        metrics().tracking_failures.inc();
        fallback_traffic_write(&state, &request, source, referrer).await;
        return Err(e.into());
    }

    metrics().pageviews_tracked.inc();
    metrics()
        .track_latency_ms
        .observe(start.elapsed().as_millis() as u64);

    debug!(
        path = %request.path,
        session_id = %resolved.session.id,
        source = %source,
        "Pageview tracked"
    );

    Ok((resolved.jar, Json(TrackResponse::tracked())))
}

async fn record_pageview(
    state: &AppState,
    resolved: &ResolvedIdentity,
    request: &TrackPageviewRequest,
    source: TrafficSource,
    referrer: Option<&str>,
) -> analytics_core::Result<()> {
    let now = Utc::now();

    state
        .store
        .record_navigation(resolved.session.id, &request.path, referrer, now)
        .await?;

    state
        .store
        .insert_traffic_event(&NewTrafficEvent {
            visitor_id: Some(resolved.visitor.id),
            session_id: Some(resolved.session.id),
            source,
            referrer: referrer.map(String::from),
            path: request.path.clone(),
            occurred_at: now,
        })
        .await
}

/// Minimal anonymous entry when full tracking fails; best-effort only.
async fn fallback_traffic_write(
    state: &AppState,
    request: &TrackPageviewRequest,
    source: TrafficSource,
    referrer: Option<&str>,
) {
    let event = NewTrafficEvent {
        visitor_id: None,
        session_id: None,
        source,
        referrer: referrer.map(String::from),
        path: request.path.clone(),
        occurred_at: Utc::now(),
    };

    match state.store.insert_traffic_event(&event).await {
        Ok(()) => metrics().fallback_traffic_writes.inc(),
        Err(e) => warn!("Fallback traffic write failed: {}", e),
    }
}
