//! Tests for health check endpoints.

use axum::http::StatusCode;
use axum_test::TestServer;
use integration_tests::setup::TestContext;

#[tokio::test]
async fn test_liveness_is_always_ok() {
    let ctx = TestContext::new();
    let server = TestServer::new(ctx.router.clone()).expect("Failed to create test server");

    server.get("/health/live").await.assert_status_ok();
}

#[tokio::test]
async fn test_readiness_follows_cache_and_transport() {
    let ctx = TestContext::new();
    let server = TestServer::new(ctx.router.clone()).expect("Failed to create test server");

    server
        .get("/health/ready")
        .await
        .assert_status(StatusCode::SERVICE_UNAVAILABLE);

    ctx.health.cache.set_healthy();
    ctx.health.redpanda.set_healthy();
    server.get("/health/ready").await.assert_status_ok();

    // Losing the store degrades but does not stop admission
    ctx.health.clickhouse.set_unhealthy("connection refused");
    server.get("/health/ready").await.assert_status_ok();
}

#[tokio::test]
async fn test_health_report_lists_components() {
    let ctx = TestContext::new();
    let server = TestServer::new(ctx.router.clone()).expect("Failed to create test server");
    ctx.mark_dependencies_healthy();
    ctx.health.clickhouse.set_unhealthy("connection refused");

    let response = server.get("/health").await;
    response.assert_status_ok();

    let body: serde_json::Value = response.json();
    assert_eq!(body["status"], "degraded");
    let components = body["components"].as_array().unwrap();
    assert_eq!(components.len(), 3);
    let clickhouse = components
        .iter()
        .find(|c| c["name"] == "clickhouse")
        .unwrap();
    assert_eq!(clickhouse["healthy"], false);
    assert_eq!(clickhouse["message"], "connection refused");
}

#[tokio::test]
async fn test_events_health_reports_pipeline_counters() {
    let ctx = TestContext::new();
    let server = TestServer::new(ctx.router.clone()).expect("Failed to create test server");

    ctx.metrics.batches_flushed.inc_by(10);
    ctx.metrics.events_persisted.inc_by(480);
    ctx.metrics.buffer_size.set(12);

    let body: serde_json::Value = server.get("/api/health/events").await.json();
    assert!(body["lastProcessingTimeMs"].is_null());

    ctx.metrics.last_processing_ms.set(37);
    ctx.metrics.last_flush.touch();

    let response = server.get("/api/health/events").await;
    response.assert_status_ok();

    let body: serde_json::Value = response.json();
    assert_eq!(body["status"], "HEALTHY");
    assert_eq!(body["totalEventsProcessed"], 480);
    assert_eq!(body["totalBatchesProcessed"], 10);
    assert_eq!(body["totalFailedBatches"], 0);
    assert_eq!(body["currentBufferSize"], 12);
    assert_eq!(body["lastProcessingTimeMs"], 37);
}

#[tokio::test]
async fn test_events_health_unhealthy_above_failure_threshold() {
    let ctx = TestContext::new();
    let server = TestServer::new(ctx.router.clone()).expect("Failed to create test server");

    ctx.metrics.batches_flushed.inc_by(10);
    ctx.metrics.batches_failed.inc_by(5);

    let response = server.get("/api/health/events").await;
    response.assert_status(StatusCode::SERVICE_UNAVAILABLE);

    let body: serde_json::Value = response.json();
    assert_eq!(body["status"], "UNHEALTHY");
    assert_eq!(body["failureRate"], 0.5);
}
