//! Visitor and session identity resolution.
//!
//! Derives a long-lived visitor identity and a sliding-window session
//! identity from cookies, creating store rows on demand and handing back a
//! jar with refreshed cookies. Lookups that reference rows missing from the
//! store (a data reset, for instance) self-heal by recreating the row under
//! the same id so cookie continuity is preserved.

use std::sync::Arc;

use axum_extra::extract::cookie::{Cookie, CookieJar, SameSite};
use chrono::{DateTime, Utc};
use tracing::debug;
use uuid::Uuid;

use analytics_core::limits::{
    SESSION_COOKIE, SESSION_COOKIE_MINUTES, SOURCE_COOKIE, SOURCE_COOKIE_DAYS, VISITOR_COOKIE,
    VISITOR_COOKIE_DAYS,
};
use analytics_core::{Result, Session, TrafficSource, Visitor};
use store::AnalyticsStore;
use telemetry::metrics;

use crate::state::CookieOptions;

/// Per-request inputs to identity resolution.
#[derive(Debug, Clone, Default)]
pub struct IdentityContext<'a> {
    /// Current page path; becomes the landing path for new identities.
    pub path: Option<&'a str>,
    pub referrer: Option<&'a str>,
    /// Explicit source hint (query parameter or client-supplied field).
    pub source_hint: Option<&'a str>,
    pub user_agent: Option<&'a str>,
    pub ip: Option<&'a str>,
    /// Authenticated user, when the auth layer resolved one.
    pub user_id: Option<&'a str>,
}

/// Resolution result: both identities plus the refreshed cookie jar.
pub struct ResolvedIdentity {
    pub visitor: Visitor,
    pub session: Session,
    pub jar: CookieJar,
}

/// Whether the request carries any identity cookie at all.
///
/// The engagement endpoint fails fast without one; the client retries once
/// the page-view call has set cookies.
pub fn has_tracking_cookies(jar: &CookieJar) -> bool {
    jar.get(VISITOR_COOKIE).is_some() || jar.get(SESSION_COOKIE).is_some()
}

/// Resolves (creating as needed) the visitor and active session for a
/// request, refreshing their cookies.
pub async fn resolve(
    store: &Arc<dyn AnalyticsStore>,
    options: &CookieOptions,
    jar: CookieJar,
    ctx: IdentityContext<'_>,
) -> Result<ResolvedIdentity> {
    let now = Utc::now();

    // First-touch source survives at the cookie layer even across data
    // resets: an existing source cookie beats reclassification.
    let cookie_source = jar
        .get(SOURCE_COOKIE)
        .and_then(|c| c.value().parse::<TrafficSource>().ok());
    let request_source =
        cookie_source.unwrap_or_else(|| TrafficSource::classify(ctx.source_hint, ctx.referrer));

    let (visitor, first_identify) =
        resolve_visitor(store, &jar, &ctx, request_source, now).await?;
    let session = resolve_session(store, &jar, &ctx, &visitor, request_source, now).await?;

    // First-touch-on-identify: capture the acquisition channel on the user
    // profile the first time this browser identity maps to a user, even if
    // they registered several anonymous visits in.
    if first_identify {
        if let Some(user_id) = ctx.user_id {
            store
                .backfill_user_acquisition(
                    user_id,
                    visitor.first_source.unwrap_or(request_source),
                    visitor.first_referrer.as_deref(),
                    visitor.first_landing_path.as_deref(),
                )
                .await?;
        }
    }

    let mut jar = jar
        .add(identity_cookie(
            VISITOR_COOKIE,
            visitor.id.to_string(),
            time::Duration::days(VISITOR_COOKIE_DAYS),
            options,
        ))
        .add(identity_cookie(
            SESSION_COOKIE,
            session.id.to_string(),
            time::Duration::minutes(SESSION_COOKIE_MINUTES),
            options,
        ));

    // Write-once: never overwrite an existing source cookie.
    if jar.get(SOURCE_COOKIE).is_none() {
        jar = jar.add(identity_cookie(
            SOURCE_COOKIE,
            visitor.first_source.unwrap_or(request_source).to_string(),
            time::Duration::days(SOURCE_COOKIE_DAYS),
            options,
        ));
    }

    Ok(ResolvedIdentity {
        visitor,
        session,
        jar,
    })
}

/// Returns the visitor and whether this request linked it to a user for the
/// first time (the user linkage is first-write-wins).
async fn resolve_visitor(
    store: &Arc<dyn AnalyticsStore>,
    jar: &CookieJar,
    ctx: &IdentityContext<'_>,
    request_source: TrafficSource,
    now: DateTime<Utc>,
) -> Result<(Visitor, bool)> {
    let cookie_id = jar
        .get(VISITOR_COOKIE)
        .and_then(|c| Uuid::parse_str(c.value()).ok());

    if let Some(id) = cookie_id {
        if let Some(mut visitor) = store.get_visitor(id).await? {
            let first_identify = visitor.user_id.is_none() && ctx.user_id.is_some();
            store.touch_visitor(id, now, ctx.user_id).await?;
            visitor.last_seen_at = now;
            if visitor.user_id.is_none() {
                visitor.user_id = ctx.user_id.map(String::from);
            }
            return Ok((visitor, first_identify));
        }

        // The cookie outlived its row; recreate under the same id so the
        // browser keeps its identity.
        debug!(visitor_id = %id, "Recreating visitor for orphaned cookie");
        metrics().identities_recreated.inc();
        let visitor = create_visitor(store, id, ctx, request_source, now).await?;
        return Ok((visitor, ctx.user_id.is_some()));
    }

    let visitor = create_visitor(store, Uuid::new_v4(), ctx, request_source, now).await?;
    metrics().visitors_created.inc();
    Ok((visitor, ctx.user_id.is_some()))
}

async fn create_visitor(
    store: &Arc<dyn AnalyticsStore>,
    id: Uuid,
    ctx: &IdentityContext<'_>,
    request_source: TrafficSource,
    now: DateTime<Utc>,
) -> Result<Visitor> {
    let mut visitor = Visitor::new(
        id,
        request_source,
        ctx.referrer.map(String::from),
        ctx.path.map(String::from),
        now,
    );
    visitor.user_id = ctx.user_id.map(String::from);
    store.insert_visitor(&visitor).await?;
    Ok(visitor)
}

async fn resolve_session(
    store: &Arc<dyn AnalyticsStore>,
    jar: &CookieJar,
    ctx: &IdentityContext<'_>,
    visitor: &Visitor,
    request_source: TrafficSource,
    now: DateTime<Utc>,
) -> Result<Session> {
    let cookie_id = jar
        .get(SESSION_COOKIE)
        .and_then(|c| Uuid::parse_str(c.value()).ok());

    if let Some(id) = cookie_id {
        match store.get_session(id).await? {
            Some(mut session) if session.is_active(now) => {
                store.touch_session(id, now, ctx.user_id).await?;
                session.last_seen_at = now;
                if session.user_id.is_none() {
                    session.user_id = ctx.user_id.map(String::from);
                }
                return Ok(session);
            }
            Some(session) => {
                // Inactivity window elapsed: lazily end the stale session
                // before replacing it.
                if session.ended_at.is_none() {
                    store.end_session(id, session.last_seen_at).await?;
                }
                metrics().sessions_expired.inc();
            }
            None => {
                // Active cookie, missing row: same-id recreation.
                debug!(session_id = %id, "Recreating session for orphaned cookie");
                metrics().identities_recreated.inc();
                return create_session(store, id, ctx, visitor, request_source, now).await;
            }
        }
    }

    let session = create_session(store, Uuid::new_v4(), ctx, visitor, request_source, now).await?;
    metrics().sessions_created.inc();
    Ok(session)
}

async fn create_session(
    store: &Arc<dyn AnalyticsStore>,
    id: Uuid,
    ctx: &IdentityContext<'_>,
    visitor: &Visitor,
    request_source: TrafficSource,
    now: DateTime<Utc>,
) -> Result<Session> {
    // New sessions inherit first-touch attribution from the visitor,
    // falling back to classifying the current request.
    let mut session = Session::new(
        id,
        visitor.id,
        visitor.first_source.unwrap_or(request_source),
        ctx.path
            .map(String::from)
            .or_else(|| visitor.first_landing_path.clone()),
        ctx.user_agent.map(String::from),
        ctx.ip.map(String::from),
        now,
    );
    session.user_id = ctx.user_id.map(String::from);
    store.insert_session(&session).await?;
    Ok(session)
}

fn identity_cookie(
    name: &'static str,
    value: String,
    max_age: time::Duration,
    options: &CookieOptions,
) -> Cookie<'static> {
    Cookie::build((name, value))
        .path("/")
        .http_only(true)
        .same_site(SameSite::Lax)
        .secure(options.secure)
        .max_age(max_age)
        .build()
}
