//! Admission through the HTTP surface: auth, validation, quota, and transport failures.

use axum::http::{HeaderName, HeaderValue, StatusCode};
use axum_test::TestServer;
use cache::{CounterCache, CreditKeys};
use engine_core::ParsedApiKey;
use integration_tests::{fixtures, setup::TestContext};
use uuid::Uuid;

fn x_auth(key: &ParsedApiKey) -> (HeaderName, HeaderValue) {
    (
        HeaderName::from_static("x-auth"),
        HeaderValue::from_str(&key.to_string()).unwrap(),
    )
}

fn server(ctx: &TestContext) -> TestServer {
    TestServer::new(ctx.router.clone()).expect("Failed to create test server")
}

/// Usage and unreported delta for `app_id` as stored in the cache.
async fn counters(ctx: &TestContext, app_id: Uuid) -> Vec<Option<i64>> {
    let keys = CreditKeys::for_app(app_id);
    ctx.cache.get_ints(&[keys.usage, keys.delta]).await.unwrap()
}

#[tokio::test]
async fn test_accepted_event_is_published_and_charged() {
    let ctx = TestContext::new();
    let server = server(&ctx);
    let (app_id, key) = ctx.register_app(10);
    let (name, value) = x_auth(&key);

    let response = server
        .post("/event")
        .add_header(name, value)
        .add_header(
            HeaderName::from_static("user-agent"),
            HeaderValue::from_static(fixtures::CHROME_MAC),
        )
        .add_header(
            HeaderName::from_static("x-forwarded-for"),
            HeaderValue::from_static("203.0.113.9, 10.0.0.1"),
        )
        .json(&fixtures::event(app_id, "pageview"))
        .await;

    response.assert_status(StatusCode::ACCEPTED);
    let body: serde_json::Value = response.json();
    assert_eq!(body["accepted"], true);

    let published = ctx.publisher.published();
    assert_eq!(published.len(), 1);
    let envelope = &published[0];
    assert_eq!(body["eventId"], envelope.id.to_string());
    assert_eq!(envelope.app_id(), app_id);
    assert_eq!(envelope.user_event.metadata["path"], "/pricing");

    let context = envelope.context.as_ref().expect("context should be captured");
    assert_eq!(context.ip.as_deref(), Some("203.0.113.9"));
    assert_eq!(context.browser.as_deref(), Some("Chrome"));
    assert_eq!(context.device.as_deref(), Some("desktop"));

    assert_eq!(ctx.ledger.get_usage(app_id).await.unwrap(), 1);
    assert_eq!(ctx.metrics.events_accepted.get(), 1);
}

#[tokio::test]
async fn test_bearer_authorization_is_accepted() {
    let ctx = TestContext::new();
    let server = server(&ctx);
    let (app_id, key) = ctx.register_app(10);

    let response = server
        .post("/event")
        .add_header(
            HeaderName::from_static("authorization"),
            HeaderValue::from_str(&format!("Bearer {key}")).unwrap(),
        )
        .json(&fixtures::event(app_id, "signup"))
        .await;

    response.assert_status(StatusCode::ACCEPTED);
}

#[tokio::test]
async fn test_missing_key_is_rejected_before_body_validation() {
    let ctx = TestContext::new();
    let server = server(&ctx);

    let response = server.post("/event").text("not json at all").await;

    response.assert_status(StatusCode::UNAUTHORIZED);
    let body: serde_json::Value = response.json();
    assert_eq!(body["code"], "AUTH_001");
    assert_eq!(body["kind"], "auth");
}

#[tokio::test]
async fn test_malformed_key_returns_auth_002() {
    let ctx = TestContext::new();
    let server = server(&ctx);
    let (app_id, _) = ctx.register_app(10);

    let response = server
        .post("/event")
        .add_header(
            HeaderName::from_static("x-auth"),
            HeaderValue::from_static("not-a-uuid"),
        )
        .json(&fixtures::event(app_id, "pageview"))
        .await;

    response.assert_status(StatusCode::UNAUTHORIZED);
    let body: serde_json::Value = response.json();
    assert_eq!(body["code"], "AUTH_002");
}

#[tokio::test]
async fn test_key_for_another_application_returns_auth_003() {
    let ctx = TestContext::new();
    let server = server(&ctx);
    let (_, key) = ctx.register_app(10);
    let (other_app, _) = ctx.register_app(10);
    let (name, value) = x_auth(&key);

    let response = server
        .post("/event")
        .add_header(name, value)
        .json(&fixtures::event(other_app, "pageview"))
        .await;

    response.assert_status(StatusCode::UNAUTHORIZED);
    let body: serde_json::Value = response.json();
    assert_eq!(body["code"], "AUTH_003");
    assert!(ctx.publisher.published().is_empty());
    assert_eq!(ctx.metrics.rejected_auth.get(), 1);
}

#[tokio::test]
async fn test_unbound_key_returns_auth_003() {
    let ctx = TestContext::new();
    let server = server(&ctx);
    let (name, value) = x_auth(&fixtures::api_key());

    let response = server
        .post("/event")
        .add_header(name, value)
        .json(&fixtures::event(Uuid::new_v4(), "pageview"))
        .await;

    response.assert_status(StatusCode::UNAUTHORIZED);
    let body: serde_json::Value = response.json();
    assert_eq!(body["code"], "AUTH_003");
}

#[tokio::test]
async fn test_binding_is_cached_after_first_lookup() {
    let ctx = TestContext::new();
    let server = server(&ctx);
    let (app_id, key) = ctx.register_app(10);

    for _ in 0..3 {
        let (name, value) = x_auth(&key);
        server
            .post("/event")
            .add_header(name, value)
            .json(&fixtures::event(app_id, "pageview"))
            .await
            .assert_status(StatusCode::ACCEPTED);
    }

    assert_eq!(ctx.tenant.resolve_calls(), 1);
}

#[tokio::test]
async fn test_missing_field_returns_validation_error() {
    let ctx = TestContext::new();
    let server = server(&ctx);
    let (app_id, key) = ctx.register_app(10);
    let (name, value) = x_auth(&key);

    let response = server
        .post("/event")
        .add_header(name, value)
        .json(&fixtures::event_without_source(app_id))
        .await;

    response.assert_status(StatusCode::BAD_REQUEST);
    let body: serde_json::Value = response.json();
    assert_eq!(body["code"], "VALID_001");
    assert_eq!(body["kind"], "validation");
    assert!(ctx.publisher.published().is_empty());
    assert_eq!(ctx.metrics.rejected_validation.get(), 1);
}

#[tokio::test]
async fn test_missing_app_id_is_rejected_without_charge() {
    let ctx = TestContext::new();
    let server = server(&ctx);
    let (app_id, key) = ctx.register_app(10);
    let (name, value) = x_auth(&key);

    let response = server
        .post("/event")
        .add_header(name, value)
        .json(&fixtures::event_without_app_id())
        .await;

    response.assert_status(StatusCode::BAD_REQUEST);
    let body: serde_json::Value = response.json();
    assert_eq!(body["code"], "VALID_001");
    assert_eq!(body["kind"], "validation");
    assert!(ctx.publisher.published().is_empty());
    assert_eq!(counters(&ctx, app_id).await, vec![None, None]);
    assert_eq!(ctx.tenant.credits(app_id).credits_used, 0);
    assert_eq!(ctx.tenant.resolve_calls(), 0);
}

#[tokio::test]
async fn test_undecodable_body_returns_validation_error() {
    let ctx = TestContext::new();
    let server = server(&ctx);
    let (_, key) = ctx.register_app(10);
    let (name, value) = x_auth(&key);

    let response = server.post("/event").add_header(name, value).text("{").await;

    response.assert_status(StatusCode::BAD_REQUEST);
    let body: serde_json::Value = response.json();
    assert_eq!(body["code"], "VALID_001");
}

#[tokio::test]
async fn test_oversized_body_returns_validation_error() {
    let ctx = TestContext::new();
    let server = server(&ctx);
    let (app_id, key) = ctx.register_app(10);
    let (name, value) = x_auth(&key);

    let mut event = fixtures::event(app_id, "pageview");
    event["metadata"]["blob"] = serde_json::Value::String("x".repeat(80 * 1024));

    let response = server.post("/event").add_header(name, value).json(&event).await;

    response.assert_status(StatusCode::BAD_REQUEST);
    assert!(ctx.publisher.published().is_empty());
}

#[tokio::test]
async fn test_quota_exhaustion_returns_429() {
    let ctx = TestContext::new();
    let server = server(&ctx);
    let (app_id, key) = ctx.register_app(2);

    let mut statuses = Vec::new();
    for _ in 0..3 {
        let (name, value) = x_auth(&key);
        let response = server
            .post("/event")
            .add_header(name, value)
            .json(&fixtures::event(app_id, "pageview"))
            .await;
        statuses.push(response.status_code());
        if response.status_code() == StatusCode::TOO_MANY_REQUESTS {
            let body: serde_json::Value = response.json();
            assert_eq!(body["code"], "QUOTA_001");
            assert_eq!(body["kind"], "quota");
        }
    }

    assert_eq!(
        statuses,
        vec![
            StatusCode::ACCEPTED,
            StatusCode::ACCEPTED,
            StatusCode::TOO_MANY_REQUESTS
        ]
    );
    assert_eq!(ctx.publisher.published().len(), 2);
    assert_eq!(ctx.ledger.get_usage(app_id).await.unwrap(), 2);
    assert_eq!(ctx.metrics.rejected_quota.get(), 1);
}

#[tokio::test]
async fn test_publish_failure_returns_503_without_charging() {
    let ctx = TestContext::new();
    let server = server(&ctx);
    let (app_id, key) = ctx.register_app(10);
    ctx.publisher.set_fail_events(true);

    let (name, value) = x_auth(&key);
    let response = server
        .post("/event")
        .add_header(name, value)
        .json(&fixtures::event(app_id, "pageview"))
        .await;

    response.assert_status(StatusCode::SERVICE_UNAVAILABLE);
    assert_eq!(response.header("retry-after"), "1");
    let body: serde_json::Value = response.json();
    assert_eq!(body["code"], "TRANSPORT_001");
    assert_eq!(body["kind"], "unavailable");
    assert_eq!(ctx.ledger.get_usage(app_id).await.unwrap(), 0);

    // Retrying the same request after recovery succeeds and charges once.
    ctx.publisher.set_fail_events(false);
    let (name, value) = x_auth(&key);
    server
        .post("/event")
        .add_header(name, value)
        .json(&fixtures::event(app_id, "pageview"))
        .await
        .assert_status(StatusCode::ACCEPTED);
    assert_eq!(ctx.ledger.get_usage(app_id).await.unwrap(), 1);
}

#[tokio::test]
async fn test_identity_outage_fails_closed() {
    let ctx = TestContext::new();
    let server = server(&ctx);
    let (app_id, key) = ctx.register_app(10);
    ctx.tenant.set_identity_down(true);

    let (name, value) = x_auth(&key);
    let response = server
        .post("/event")
        .add_header(name, value)
        .json(&fixtures::event(app_id, "pageview"))
        .await;

    response.assert_status(StatusCode::SERVICE_UNAVAILABLE);
    let body: serde_json::Value = response.json();
    assert_eq!(body["code"], "IDENTITY_001");
    assert!(ctx.publisher.published().is_empty());
}

#[tokio::test]
async fn test_ledger_outage_on_cache_miss_fails_closed() {
    let ctx = TestContext::new();
    let server = server(&ctx);
    let (app_id, key) = ctx.register_app(10);
    ctx.tenant.set_ledger_down(true);

    let (name, value) = x_auth(&key);
    let response = server
        .post("/event")
        .add_header(name, value)
        .json(&fixtures::event(app_id, "pageview"))
        .await;

    response.assert_status(StatusCode::SERVICE_UNAVAILABLE);
    let body: serde_json::Value = response.json();
    assert_eq!(body["code"], "LEDGER_001");
    assert!(ctx.publisher.published().is_empty());
    assert_eq!(ctx.metrics.rejected_unavailable.get(), 1);
}

#[tokio::test]
async fn test_cache_outage_fails_closed() {
    let ctx = TestContext::new();
    let server = server(&ctx);
    let (app_id, key) = ctx.register_app(10);
    ctx.set_cache_down(true);

    let (name, value) = x_auth(&key);
    let response = server
        .post("/event")
        .add_header(name, value)
        .json(&fixtures::event(app_id, "pageview"))
        .await;

    response.assert_status(StatusCode::SERVICE_UNAVAILABLE);
    assert_eq!(response.header("retry-after"), "1");
    let body: serde_json::Value = response.json();
    assert_eq!(body["code"], "CACHE_001");
    assert_eq!(body["kind"], "unavailable");
    assert!(ctx.publisher.published().is_empty());
    assert!(ctx.cache.is_empty());
    assert_eq!(ctx.metrics.rejected_unavailable.get(), 1);
}

#[tokio::test]
async fn test_cache_outage_after_warm_up_denies_without_charging() {
    let ctx = TestContext::new();
    let server = server(&ctx);
    let (app_id, key) = ctx.register_app(10);

    let (name, value) = x_auth(&key);
    server
        .post("/event")
        .add_header(name, value)
        .json(&fixtures::event(app_id, "pageview"))
        .await
        .assert_status(StatusCode::ACCEPTED);
    assert_eq!(counters(&ctx, app_id).await, vec![Some(1), Some(1)]);

    // The binding is still held in process; the quota read is what fails.
    ctx.set_cache_down(true);
    let (name, value) = x_auth(&key);
    let response = server
        .post("/event")
        .add_header(name, value)
        .json(&fixtures::event(app_id, "pageview"))
        .await;

    response.assert_status(StatusCode::SERVICE_UNAVAILABLE);
    let body: serde_json::Value = response.json();
    assert_eq!(body["code"], "CACHE_001");
    assert_eq!(ctx.publisher.published().len(), 1);
    assert_eq!(counters(&ctx, app_id).await, vec![Some(1), Some(1)]);

    ctx.set_cache_down(false);
    let (name, value) = x_auth(&key);
    server
        .post("/event")
        .add_header(name, value)
        .json(&fixtures::event(app_id, "pageview"))
        .await
        .assert_status(StatusCode::ACCEPTED);
    assert_eq!(counters(&ctx, app_id).await, vec![Some(2), Some(2)]);
}
