/// HTTP tests for the CoursePay API
///
/// Drive the full router (routing, extraction, error mapping, CORS, tracing
/// layers) with `tower::ServiceExt::oneshot` over in-memory collaborators.

mod common;

use axum::body::Body;
use axum::http::{Request, StatusCode};
use common::{checkout_body, post_json, TestContext, WEBHOOK_SECRET};
use coursepay_shared::models::OrderStatus;
use coursepay_shared::signature::SignatureVerifier;
use coursepay_shared::store::Datastore;
use serde_json::json;
use uuid::Uuid;

/// Request carrying an `x-signature` for `signed_id` at `ts`
fn signed_webhook(signed_id: &str, body_id: &str, ts: i64) -> Request<Body> {
    let ts = ts.to_string();
    let v1 = SignatureVerifier::new(WEBHOOK_SECRET)
        .sign(Some(signed_id), Some("req-1"), &ts)
        .unwrap();
    Request::builder()
        .method("POST")
        .uri(format!("/api/webhooks/mercadopago?data.id={signed_id}&type=payment"))
        .header("content-type", "application/json")
        .header("x-request-id", "req-1")
        .header("x-signature", format!("ts={ts},v1={v1}"))
        .body(Body::from(webhook(body_id).to_string()))
        .unwrap()
}

fn now() -> i64 {
    chrono::Utc::now().timestamp()
}

async fn checkout(ctx: &TestContext) -> Uuid {
    let (status, body) = ctx.send(post_json("/api/orders", &checkout_body())).await;
    assert_eq!(status, StatusCode::OK, "checkout failed: {body}");
    body["orderId"].as_str().unwrap().parse().unwrap()
}

fn webhook(payment_id: &str) -> serde_json::Value {
    json!({ "type": "payment", "action": "payment.updated", "data": { "id": payment_id } })
}

#[tokio::test]
async fn test_health() {
    let ctx = TestContext::new().await;

    let request = Request::builder().uri("/api/health").body(Body::empty()).unwrap();
    let (status, body) = ctx.send(request).await;

    assert_eq!(status, StatusCode::OK);
    assert_eq!(body["status"], "healthy");
    assert_eq!(body["database"], "connected");
}

#[tokio::test]
async fn test_checkout_returns_intent_urls() {
    let ctx = TestContext::new().await;

    let (status, body) = ctx.send(post_json("/api/orders", &checkout_body())).await;

    assert_eq!(status, StatusCode::OK);
    let order_id: Uuid = body["orderId"].as_str().unwrap().parse().unwrap();
    assert_eq!(body["preferenceId"], format!("pref-{order_id}"));
    assert!(body["initPoint"].as_str().is_some());
    assert!(body["sandboxInitPoint"].as_str().is_some());

    let order = ctx.store.find_order(order_id).await.unwrap().unwrap();
    assert_eq!(order.status, OrderStatus::Pending);
    assert_eq!(order.amount, 19990);
}

#[tokio::test]
async fn test_checkout_unknown_course_is_404() {
    let ctx = TestContext::new().await;
    let mut body = checkout_body();
    body["courseId"] = json!("nope");

    let (status, body) = ctx.send(post_json("/api/orders", &body)).await;

    assert_eq!(status, StatusCode::NOT_FOUND);
    assert_eq!(body["error"], "not_found");
    assert!(ctx.store.orders().await.is_empty());
}

#[tokio::test]
async fn test_checkout_validation_is_422() {
    let ctx = TestContext::new().await;
    let mut body = checkout_body();
    body["userEmail"] = json!("nope");

    let (status, body) = ctx.send(post_json("/api/orders", &body)).await;

    assert_eq!(status, StatusCode::UNPROCESSABLE_ENTITY);
    assert_eq!(body["error"], "validation_error");
    assert_eq!(body["details"][0]["field"], "user_email");
}

#[tokio::test]
async fn test_checkout_gateway_failure_is_opaque_500() {
    let ctx = TestContext::new().await;
    ctx.gateway.fail_intents(true);

    let (status, body) = ctx.send(post_json("/api/orders", &checkout_body())).await;

    assert_eq!(status, StatusCode::INTERNAL_SERVER_ERROR);
    assert_eq!(body["error"], "internal_error");
    assert_eq!(body["message"], "An internal error occurred");
    assert!(!body.to_string().contains("mock intent failure"));
}

#[tokio::test]
async fn test_checkout_email_failure_still_succeeds() {
    let ctx = TestContext::new().await;
    ctx.notifier.fail(true);

    let (status, _) = ctx.send(post_json("/api/orders", &checkout_body())).await;

    assert_eq!(status, StatusCode::OK);
}

#[tokio::test]
async fn test_webhook_approves_and_enrolls() {
    let ctx = TestContext::new().await;
    let order_id = checkout(&ctx).await;
    ctx.gateway
        .set_payment("pay-1", "approved", Some(&order_id.to_string()))
        .await;

    let (status, body) = ctx
        .send(post_json("/api/webhooks/mercadopago", &webhook("pay-1")))
        .await;

    assert_eq!(status, StatusCode::OK);
    assert_eq!(body["message"], "Payment approved");
    assert_eq!(ctx.store.enrollments().await.len(), 1);

    let (status, body) = ctx
        .send(post_json("/api/webhooks/mercadopago", &webhook("pay-1")))
        .await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(body["message"], "Already processed");
    assert_eq!(ctx.store.enrollments().await.len(), 1);
}

#[tokio::test]
async fn test_webhook_irrelevant_event_is_acknowledged() {
    let ctx = TestContext::new().await;

    let (status, body) = ctx
        .send(post_json(
            "/api/webhooks/mercadopago",
            &json!({ "type": "plan", "data": { "id": "1" } }),
        ))
        .await;

    assert_eq!(status, StatusCode::OK);
    assert_eq!(body["message"], "Event ignored");
}

#[tokio::test]
async fn test_webhook_unknown_order_is_acknowledged() {
    let ctx = TestContext::new().await;
    ctx.gateway
        .set_payment("pay-1", "approved", Some(&Uuid::new_v4().to_string()))
        .await;

    let (status, body) = ctx
        .send(post_json("/api/webhooks/mercadopago", &webhook("pay-1")))
        .await;

    assert_eq!(status, StatusCode::OK);
    assert!(body["message"].is_string());
    assert!(ctx.store.enrollments().await.is_empty());
}

#[tokio::test]
async fn test_webhook_gateway_failure_requests_redelivery() {
    let ctx = TestContext::new().await;
    let order_id = checkout(&ctx).await;
    ctx.gateway
        .set_payment("pay-1", "approved", Some(&order_id.to_string()))
        .await;
    ctx.gateway.fail_lookups(true);

    let (status, body) = ctx
        .send(post_json("/api/webhooks/mercadopago", &webhook("pay-1")))
        .await;

    assert_eq!(status, StatusCode::SERVICE_UNAVAILABLE);
    assert!(!body.to_string().contains("mock lookup failure"));
}

#[tokio::test]
async fn test_webhook_store_failure_requests_redelivery() {
    let ctx = TestContext::new().await;
    let order_id = checkout(&ctx).await;
    ctx.gateway
        .set_payment("pay-1", "approved", Some(&order_id.to_string()))
        .await;
    ctx.store.fail_writes(true);

    let (status, _) = ctx
        .send(post_json("/api/webhooks/mercadopago", &webhook("pay-1")))
        .await;

    assert_eq!(status, StatusCode::INTERNAL_SERVER_ERROR);
}

#[tokio::test]
async fn test_webhook_malformed_body_is_400() {
    let ctx = TestContext::new().await;

    let request = Request::builder()
        .method("POST")
        .uri("/api/webhooks/mercadopago")
        .header("content-type", "application/json")
        .body(Body::from("{oops"))
        .unwrap();
    let (status, body) = ctx.send(request).await;

    assert_eq!(status, StatusCode::BAD_REQUEST);
    assert_eq!(body["error"], "bad_request");
    assert_eq!(body["message"], "Invalid webhook payload");
    assert!(!body.to_string().contains("column"));
}

#[tokio::test]
async fn test_webhook_payment_without_id_is_400() {
    let ctx = TestContext::new().await;

    let (status, _) = ctx
        .send(post_json("/api/webhooks/mercadopago", &json!({ "type": "payment" })))
        .await;

    assert_eq!(status, StatusCode::BAD_REQUEST);
}

#[tokio::test]
async fn test_signed_webhook_is_accepted() {
    let ctx = TestContext::with_signature().await;
    let order_id = checkout(&ctx).await;
    ctx.gateway
        .set_payment("123", "approved", Some(&order_id.to_string()))
        .await;

    let (status, body) = ctx.send(signed_webhook("123", "123", now())).await;

    assert_eq!(status, StatusCode::OK, "{body}");
    assert_eq!(ctx.store.enrollments().await.len(), 1);
}

#[tokio::test]
async fn test_signed_webhook_with_other_body_id_is_rejected() {
    let ctx = TestContext::with_signature().await;
    let order_id = checkout(&ctx).await;
    ctx.gateway
        .set_payment("999", "approved", Some(&order_id.to_string()))
        .await;

    let (status, body) = ctx.send(signed_webhook("123", "999", now())).await;

    assert_eq!(status, StatusCode::UNAUTHORIZED);
    assert_eq!(body["error"], "unauthorized");
    assert_eq!(ctx.gateway.lookup_count(), 0);
    let order = ctx.store.find_order(order_id).await.unwrap().unwrap();
    assert_eq!(order.status, OrderStatus::Pending);
    assert!(ctx.store.enrollments().await.is_empty());
}

#[tokio::test]
async fn test_replayed_signature_outside_tolerance_is_rejected() {
    let ctx = TestContext::with_signature().await;
    let order_id = checkout(&ctx).await;
    ctx.gateway
        .set_payment("123", "approved", Some(&order_id.to_string()))
        .await;

    let (status, _) = ctx.send(signed_webhook("123", "123", now() - 3600)).await;

    assert_eq!(status, StatusCode::UNAUTHORIZED);
    assert_eq!(ctx.gateway.lookup_count(), 0);
    assert!(ctx.store.enrollments().await.is_empty());
}

#[tokio::test]
async fn test_unsigned_malformed_body_is_401_when_secret_set() {
    let ctx = TestContext::with_signature().await;

    let request = Request::builder()
        .method("POST")
        .uri("/api/webhooks/mercadopago")
        .header("content-type", "application/json")
        .body(Body::from("{not json"))
        .unwrap();
    let (status, body) = ctx.send(request).await;

    assert_eq!(status, StatusCode::UNAUTHORIZED);
    assert_eq!(body["message"], "Invalid webhook signature");
    assert!(!body.to_string().contains("line 1"));
}

#[tokio::test]
async fn test_path_like_payment_id_is_400_without_lookup() {
    let ctx = TestContext::new().await;

    let (status, body) = ctx
        .send(post_json("/api/webhooks/mercadopago", &webhook("1/../../users/me")))
        .await;

    assert_eq!(status, StatusCode::BAD_REQUEST);
    assert_eq!(body["message"], "Invalid webhook payload");
    assert_eq!(ctx.gateway.lookup_count(), 0);
}

#[tokio::test]
async fn test_unsigned_webhook_is_rejected_when_secret_set() {
    let ctx = TestContext::with_signature().await;
    let order_id = checkout(&ctx).await;
    ctx.gateway
        .set_payment("123", "approved", Some(&order_id.to_string()))
        .await;

    let (status, body) = ctx
        .send(post_json("/api/webhooks/mercadopago", &webhook("123")))
        .await;

    assert_eq!(status, StatusCode::UNAUTHORIZED);
    assert_eq!(body["error"], "unauthorized");
    assert_eq!(ctx.gateway.lookup_count(), 0);
    assert!(ctx.store.enrollments().await.is_empty());
}

#[tokio::test]
async fn test_unknown_route_is_404() {
    let ctx = TestContext::new().await;

    let request = Request::builder().uri("/api/nope").body(Body::empty()).unwrap();
    let (status, _) = ctx.send(request).await;

    assert_eq!(status, StatusCode::NOT_FOUND);
}
