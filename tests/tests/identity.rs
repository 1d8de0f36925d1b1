//! Identity resolution tests: cookie continuity, session rotation,
//! first-touch attribution, and user linkage.

use axum_extra::extract::cookie::Cookie;
use chrono::{Duration, Utc};
use integration_tests::{fixtures, setup, setup::TestContext};
use uuid::Uuid;

use analytics_core::limits::{SESSION_COOKIE, SOURCE_COOKIE, VISITOR_COOKIE};

#[tokio::test]
async fn first_pageview_issues_identity_cookies() {
    let ctx = TestContext::new();
    let server = ctx.server();

    let response = server
        .post("/track")
        .json(&fixtures::pageview_payload("/blog/welcome"))
        .await;
    response.assert_status_ok();

    let visitor_cookie = response.cookie(VISITOR_COOKIE);
    let session_cookie = response.cookie(SESSION_COOKIE);
    let source_cookie = response.cookie(SOURCE_COOKIE);

    let visitor_id: Uuid = visitor_cookie.value().parse().unwrap();
    let session_id: Uuid = session_cookie.value().parse().unwrap();
    // No hint, no referrer: direct.
    assert_eq!(source_cookie.value(), "direct");

    let visitor = ctx.store.visitor(visitor_id).unwrap();
    assert_eq!(visitor.first_landing_path.as_deref(), Some("/blog/welcome"));

    let session = ctx.store.session(session_id).unwrap();
    assert_eq!(session.visitor_id, visitor_id);
    assert_eq!(session.page_count, 1);
    assert!(session.ended_at.is_none());
}

#[tokio::test]
async fn referrer_sets_first_touch_source() {
    let ctx = TestContext::new();
    let server = ctx.server();

    let response = server
        .post("/track")
        .json(&fixtures::pageview_payload_with(
            "/blog/welcome",
            Some("https://www.instagram.com/explore"),
            None,
        ))
        .await;
    response.assert_status_ok();

    assert_eq!(response.cookie(SOURCE_COOKIE).value(), "instagram");

    let visitor_id: Uuid = response.cookie(VISITOR_COOKIE).value().parse().unwrap();
    let visitor = ctx.store.visitor(visitor_id).unwrap();
    assert_eq!(visitor.first_source.unwrap().as_str(), "instagram");
}

#[tokio::test]
async fn source_hint_beats_referrer() {
    let ctx = TestContext::new();
    let server = ctx.server();

    let response = server
        .post("/track")
        .json(&fixtures::pageview_payload_with(
            "/blog/welcome",
            Some("https://www.google.com/search"),
            Some("fb_campaign"),
        ))
        .await;
    response.assert_status_ok();

    assert_eq!(response.cookie(SOURCE_COOKIE).value(), "facebook");
}

#[tokio::test]
async fn orphaned_visitor_cookie_is_recreated_under_same_id() {
    let ctx = TestContext::new();
    let server = ctx.server();

    // A cookie from before a data reset: no matching row in the store.
    let orphaned_id = Uuid::new_v4();
    let response = server
        .post("/track")
        .add_cookie(Cookie::new(VISITOR_COOKIE, orphaned_id.to_string()))
        .json(&fixtures::pageview_payload("/blog/return-visit"))
        .await;
    response.assert_status_ok();

    // Continuity preserved: same token, fresh row.
    assert_eq!(response.cookie(VISITOR_COOKIE).value(), orphaned_id.to_string());
    assert!(ctx.store.visitor(orphaned_id).is_some());
    assert_eq!(ctx.store.visitor_count(), 1);
}

#[tokio::test]
async fn active_session_is_reused_and_slides() {
    let ctx = TestContext::new();
    let server = ctx.server();

    let first = server
        .post("/track")
        .json(&fixtures::pageview_payload("/blog/one"))
        .await;
    first.assert_status_ok();
    let (visitor_cookie, session_cookie) = setup::identity_cookies(&first);

    let second = server
        .post("/track")
        .add_cookie(visitor_cookie)
        .add_cookie(session_cookie.clone())
        .json(&fixtures::pageview_payload("/blog/two"))
        .await;
    second.assert_status_ok();

    // Same session, refreshed cookie, bumped page count.
    assert_eq!(second.cookie(SESSION_COOKIE).value(), session_cookie.value());
    assert_eq!(ctx.store.session_count(), 1);

    let session_id: Uuid = session_cookie.value().parse().unwrap();
    assert_eq!(ctx.store.session(session_id).unwrap().page_count, 2);
}

#[tokio::test]
async fn stale_session_is_ended_and_replaced() {
    let ctx = TestContext::new();
    let server = ctx.server();

    let first = server
        .post("/track")
        .json(&fixtures::pageview_payload("/blog/one"))
        .await;
    first.assert_status_ok();
    let (visitor_cookie, session_cookie) = setup::identity_cookies(&first);
    let old_session_id: Uuid = session_cookie.value().parse().unwrap();

    // Idle past the 30-minute window.
    let idle_since = Utc::now() - Duration::minutes(31);
    ctx.store.age_session(old_session_id, idle_since);

    let second = server
        .post("/track")
        .add_cookie(visitor_cookie.clone())
        .add_cookie(session_cookie)
        .json(&fixtures::pageview_payload("/blog/two"))
        .await;
    second.assert_status_ok();

    let new_session_id: Uuid = second.cookie(SESSION_COOKIE).value().parse().unwrap();
    assert_ne!(new_session_id, old_session_id);

    // Lazily ended at its last observed activity.
    let old_session = ctx.store.session(old_session_id).unwrap();
    assert_eq!(old_session.ended_at, Some(idle_since));

    // Same visitor owns both sessions.
    let visitor_id: Uuid = visitor_cookie.value().parse().unwrap();
    assert_eq!(ctx.store.session(new_session_id).unwrap().visitor_id, visitor_id);
    assert_eq!(ctx.store.visitor_count(), 1);
    assert_eq!(ctx.store.session_count(), 2);
}

#[tokio::test]
async fn source_cookie_is_never_overwritten() {
    let ctx = TestContext::new();
    let server = ctx.server();

    let first = server
        .post("/track")
        .json(&fixtures::pageview_payload_with(
            "/blog/one",
            Some("https://www.instagram.com/p/abc"),
            None,
        ))
        .await;
    first.assert_status_ok();
    let source_cookie = first.cookie(SOURCE_COOKIE);
    assert_eq!(source_cookie.value(), "instagram");
    let (visitor_cookie, session_cookie) = setup::identity_cookies(&first);

    // A later visit from Google must not rewrite the first-touch source.
    let second = server
        .post("/track")
        .add_cookie(visitor_cookie)
        .add_cookie(session_cookie)
        .add_cookie(source_cookie)
        .json(&fixtures::pageview_payload_with(
            "/blog/two",
            Some("https://www.google.com/search"),
            None,
        ))
        .await;
    second.assert_status_ok();
    assert!(second.maybe_cookie(SOURCE_COOKIE).is_none());
}

#[tokio::test]
async fn user_linkage_is_first_write_wins() {
    let ctx = TestContext::new();
    let server = ctx.server();
    ctx.store.seed_user("user-1");

    // Anonymous first visit from Instagram.
    let first = server
        .post("/track")
        .json(&fixtures::pageview_payload_with(
            "/blog/landing",
            Some("https://www.instagram.com/explore"),
            None,
        ))
        .await;
    first.assert_status_ok();
    let (visitor_cookie, session_cookie) = setup::identity_cookies(&first);
    let visitor_id: Uuid = visitor_cookie.value().parse().unwrap();

    // The reader signs up and returns authenticated.
    let second = server
        .post("/track")
        .add_cookie(visitor_cookie.clone())
        .add_cookie(session_cookie.clone())
        .add_header("X-User-Id", "user-1")
        .json(&fixtures::pageview_payload("/blog/landing"))
        .await;
    second.assert_status_ok();

    let visitor = ctx.store.visitor(visitor_id).unwrap();
    assert_eq!(visitor.user_id.as_deref(), Some("user-1"));

    // First-touch-on-identify: acquisition back-filled from the visitor.
    let user = ctx.store.user("user-1").unwrap();
    assert_eq!(user.source.as_deref(), Some("instagram"));
    assert_eq!(user.landing_path.as_deref(), Some("/blog/landing"));

    // A different account on the same browser does not steal the linkage.
    let third = server
        .post("/track")
        .add_cookie(visitor_cookie)
        .add_cookie(session_cookie)
        .add_header("X-User-Id", "user-2")
        .json(&fixtures::pageview_payload("/blog/landing"))
        .await;
    third.assert_status_ok();

    let visitor = ctx.store.visitor(visitor_id).unwrap();
    assert_eq!(visitor.user_id.as_deref(), Some("user-1"));
}
