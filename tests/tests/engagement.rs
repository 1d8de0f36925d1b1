//! End-to-end tests for the engagement tracking endpoint.
//!
//! Full flow through the real router: POST /track issues identity cookies,
//! POST /track/blog/:id/engagement applies the monotonic snapshot update,
//! appends the raw log, and marks the post dirty.

use axum_extra::extract::cookie::Cookie;
use axum_test::TestServer;
use integration_tests::{fixtures, setup, setup::TestContext};
use uuid::Uuid;

/// Tracks one page view and returns the issued identity cookies.
async fn tracked_cookies(server: &TestServer) -> (Cookie<'static>, Cookie<'static>) {
    let response = server
        .post("/track")
        .json(&fixtures::pageview_payload("/blog/first-post"))
        .await;
    response.assert_status_ok();
    setup::identity_cookies(&response)
}

#[tokio::test]
async fn engagement_without_cookies_is_retryable_400() {
    let ctx = TestContext::new();
    let server = ctx.server();
    let post_id = ctx.seed_post();

    let response = server
        .post(&fixtures::engagement_url(post_id))
        .json(&fixtures::view_payload())
        .await;

    response.assert_status_bad_request();
    let body: serde_json::Value = response.json();
    assert_eq!(body["code"], "TRACK_002");
    // The client retries with backoff: cookies may not have propagated yet.
    assert_eq!(body["retryable"], true);
}

#[tokio::test]
async fn unknown_post_is_404() {
    let ctx = TestContext::new();
    let server = ctx.server();

    let response = server
        .post(&fixtures::engagement_url(Uuid::new_v4()))
        .json(&fixtures::view_payload())
        .await;

    response.assert_status_not_found();
    let body: serde_json::Value = response.json();
    assert_eq!(body["code"], "TRACK_003");
}

#[tokio::test]
async fn missing_or_unknown_event_type_is_400() {
    let ctx = TestContext::new();
    let server = ctx.server();
    let post_id = ctx.seed_post();

    let response = server
        .post(&fixtures::engagement_url(post_id))
        .json(&serde_json::json!({ "event_data": {} }))
        .await;
    response.assert_status_bad_request();
    let body: serde_json::Value = response.json();
    assert_eq!(body["code"], "TRACK_001");

    let response = server
        .post(&fixtures::engagement_url(post_id))
        .json(&fixtures::engagement_payload("hover", serde_json::json!({})))
        .await;
    response.assert_status_bad_request();
}

#[tokio::test]
async fn view_creates_engagement_record() {
    let ctx = TestContext::new();
    let server = ctx.server();
    let post_id = ctx.seed_post();
    let (visitor_cookie, session_cookie) = tracked_cookies(&server).await;

    let response = server
        .post(&fixtures::engagement_url(post_id))
        .add_cookie(visitor_cookie)
        .add_cookie(session_cookie.clone())
        .add_header("Referer", "https://www.instagram.com/explore")
        .json(&fixtures::view_payload())
        .await;

    response.assert_status_ok();
    let body: serde_json::Value = response.json();
    assert_eq!(body["success"], true);
    assert_eq!(body["data"]["tracked"], true);

    let session_id: Uuid = session_cookie.value().parse().unwrap();
    let record = ctx
        .store
        .post_session(session_id, post_id)
        .expect("engagement record should exist");

    assert_eq!(record.traffic_source.as_str(), "instagram");
    // External referrer means the reader landed on this post.
    assert!(record.is_landing_page);
    assert!(!record.was_engaged);
    assert_eq!(record.max_scroll_depth, 0);
}

#[tokio::test]
async fn duplicate_views_keep_a_single_record() {
    let ctx = TestContext::new();
    let server = ctx.server();
    let post_id = ctx.seed_post();
    let (visitor_cookie, session_cookie) = tracked_cookies(&server).await;

    for _ in 0..3 {
        let response = server
            .post(&fixtures::engagement_url(post_id))
            .add_cookie(visitor_cookie.clone())
            .add_cookie(session_cookie.clone())
            .json(&fixtures::view_payload())
            .await;
        response.assert_status_ok();
    }

    assert_eq!(ctx.store.post_session_count(post_id), 1);
}

#[tokio::test]
async fn progress_fields_are_monotonic() {
    let ctx = TestContext::new();
    let server = ctx.server();
    let post_id = ctx.seed_post();
    let (visitor_cookie, session_cookie) = tracked_cookies(&server).await;

    // view → scroll(30) → scroll(20, out of order) → exit(45)
    for payload in [
        fixtures::view_payload(),
        fixtures::scroll_payload(30.0),
        fixtures::scroll_payload(20.0),
        fixtures::exit_payload(45),
    ] {
        let response = server
            .post(&fixtures::engagement_url(post_id))
            .add_cookie(visitor_cookie.clone())
            .add_cookie(session_cookie.clone())
            .json(&payload)
            .await;
        response.assert_status_ok();
    }

    let session_id: Uuid = session_cookie.value().parse().unwrap();
    let record = ctx.store.post_session(session_id, post_id).unwrap();

    assert_eq!(record.max_scroll_depth, 30);
    assert!(record.was_engaged);
    assert_eq!(record.time_on_page, 45);
    assert!(record.is_exit_page);
    assert!(record.exited_at.is_some());
    assert!(!record.read_to_end);
}

#[tokio::test]
async fn read_to_end_sticks_once_set() {
    let ctx = TestContext::new();
    let server = ctx.server();
    let post_id = ctx.seed_post();
    let (visitor_cookie, session_cookie) = tracked_cookies(&server).await;

    for payload in [
        fixtures::view_payload(),
        fixtures::scroll_payload(100.0),
        fixtures::scroll_payload(40.0),
    ] {
        server
            .post(&fixtures::engagement_url(post_id))
            .add_cookie(visitor_cookie.clone())
            .add_cookie(session_cookie.clone())
            .json(&payload)
            .await
            .assert_status_ok();
    }

    let session_id: Uuid = session_cookie.value().parse().unwrap();
    let record = ctx.store.post_session(session_id, post_id).unwrap();
    assert!(record.read_to_end);
    assert_eq!(record.max_scroll_depth, 100);
}

#[tokio::test]
async fn every_event_lands_in_the_raw_log() {
    let ctx = TestContext::new();
    let server = ctx.server();
    let post_id = ctx.seed_post();
    let (visitor_cookie, session_cookie) = tracked_cookies(&server).await;

    for payload in [
        fixtures::view_payload(),
        fixtures::scroll_payload(50.0),
        fixtures::share_payload("twitter"),
        fixtures::engagement_payload("like", serde_json::json!({})),
    ] {
        server
            .post(&fixtures::engagement_url(post_id))
            .add_cookie(visitor_cookie.clone())
            .add_cookie(session_cookie.clone())
            .json(&payload)
            .await
            .assert_status_ok();
    }

    let events = ctx.store.raw_events();
    assert_eq!(events.len(), 4);
    let types: Vec<&str> = events.iter().map(|e| e.event_type.as_str()).collect();
    assert_eq!(types, vec!["view", "scroll_milestone", "share", "like"]);
    assert!(events.iter().all(|e| e.post_id == post_id));
}

#[tokio::test]
async fn events_mark_the_post_dirty_once() {
    let ctx = TestContext::new();
    let server = ctx.server();
    let post_id = ctx.seed_post();
    let (visitor_cookie, session_cookie) = tracked_cookies(&server).await;

    for payload in [
        fixtures::view_payload(),
        fixtures::scroll_payload(25.0),
        fixtures::time_payload(30),
    ] {
        server
            .post(&fixtures::engagement_url(post_id))
            .add_cookie(visitor_cookie.clone())
            .add_cookie(session_cookie.clone())
            .json(&payload)
            .await
            .assert_status_ok();
    }

    // Three events, one unit of aggregation work.
    assert_eq!(ctx.queue.len(), 1);

    let other_post = ctx.seed_post();
    server
        .post(&fixtures::engagement_url(other_post))
        .add_cookie(visitor_cookie)
        .add_cookie(session_cookie)
        .json(&fixtures::view_payload())
        .await
        .assert_status_ok();

    assert_eq!(ctx.queue.len(), 2);
}

#[tokio::test]
async fn engagement_write_failure_falls_back_to_traffic_log() {
    let ctx = TestContext::new();
    let server = ctx.server();
    let post_id = ctx.seed_post();
    let (visitor_cookie, session_cookie) = tracked_cookies(&server).await;

    ctx.store.set_fail_engagement_writes(true);

    let response = server
        .post(&fixtures::engagement_url(post_id))
        .add_cookie(visitor_cookie)
        .add_cookie(session_cookie)
        .add_header("Referer", "https://t.co/abc")
        .json(&fixtures::view_payload())
        .await;

    response.assert_status(axum::http::StatusCode::INTERNAL_SERVER_ERROR);
    let body: serde_json::Value = response.json();
    assert_eq!(body["code"], "DB_001");

    // Aggregate site traffic survives as a minimal anonymous row.
    let traffic = ctx.store.traffic_rows();
    let fallback = traffic.last().expect("fallback row should exist");
    assert!(fallback.visitor_id.is_none());
    assert!(fallback.session_id.is_none());
    assert_eq!(fallback.source.as_str(), "twitter");
    assert_eq!(fallback.path, format!("/blog/{}", post_id));

    // Nothing was half-written.
    assert_eq!(ctx.store.raw_events().len(), 0);
    assert_eq!(ctx.store.post_session_count(post_id), 0);
}
