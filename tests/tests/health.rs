//! Health endpoint tests.

use integration_tests::setup::TestContext;

#[tokio::test]
async fn health_reports_store_connectivity() {
    let ctx = TestContext::new();
    let server = ctx.server();

    let response = server.get("/health").await;
    response.assert_status_ok();

    let body: serde_json::Value = response.json();
    assert_eq!(body["status"], "healthy");
    assert_eq!(body["store_connected"], true);
    assert_eq!(body["dirty_posts"], 0);
}

#[tokio::test]
async fn liveness_is_always_ok() {
    let ctx = TestContext::new();
    let server = ctx.server();

    server.get("/health/live").await.assert_status_ok();
}

#[tokio::test]
async fn readiness_follows_store_health() {
    let ctx = TestContext::new();
    let server = ctx.server();

    // The full health check pings the store and marks it healthy.
    server.get("/health").await.assert_status_ok();
    server.get("/health/ready").await.assert_status_ok();
}
