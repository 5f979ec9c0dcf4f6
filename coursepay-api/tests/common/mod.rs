/// Common test utilities for HTTP tests
///
/// Builds the full router over in-memory collaborators:
/// - `InMemoryStore` seeded with course `c1`
/// - `MockGateway` for intents and canonical payment records
/// - `RecordingNotifier` for emails

use axum::body::Body;
use axum::http::{Request, StatusCode};
use axum::Router;
use coursepay_api::app::{build_router, AppState};
use coursepay_api::config::Config;
use coursepay_shared::gateway::MockGateway;
use coursepay_shared::models::Course;
use coursepay_shared::notify::RecordingNotifier;
use coursepay_shared::store::InMemoryStore;
use serde_json::Value;
use std::collections::HashMap;
use std::sync::Arc;
use tower::ServiceExt;

pub const WEBHOOK_SECRET: &str = "test-webhook-secret";

/// Test context containing the router and handles on its collaborators
#[allow(dead_code)]
pub struct TestContext {
    pub app: Router,
    pub store: InMemoryStore,
    pub gateway: MockGateway,
    pub notifier: RecordingNotifier,
}

impl TestContext {
    /// Context without webhook signature verification
    pub async fn new() -> Self {
        Self::build(None).await
    }

    /// Context that requires signed webhooks
    #[allow(dead_code)]
    pub async fn with_signature() -> Self {
        Self::build(Some(WEBHOOK_SECRET)).await
    }

    async fn build(webhook_secret: Option<&str>) -> Self {
        let mut vars = HashMap::from([
            ("DATABASE_URL", "postgresql://unused/coursepay".to_string()),
            ("MERCADOPAGO_ACCESS_TOKEN", "TEST-token".to_string()),
            ("MERCADOPAGO_TIMEOUT_MS", "1000".to_string()),
            ("APP_URL", "https://shop.example".to_string()),
            ("API_URL", "https://api.example".to_string()),
        ]);
        if let Some(secret) = webhook_secret {
            vars.insert("MERCADOPAGO_WEBHOOK_SECRET", secret.to_string());
        }
        let config = Config::from_lookup(|key| vars.get(key).cloned()).expect("test config");

        let store = InMemoryStore::new();
        store
            .put_course(Course::new("c1", "Rust para Backend", "Ferris", 25000))
            .await;
        let gateway = MockGateway::new();
        let notifier = RecordingNotifier::new();

        let state = AppState::new(
            config,
            Arc::new(store.clone()),
            Arc::new(gateway.clone()),
            Arc::new(notifier.clone()),
        );

        TestContext {
            app: build_router(state),
            store,
            gateway,
            notifier,
        }
    }

    /// Sends a request and returns status plus parsed JSON body
    pub async fn send(&self, request: Request<Body>) -> (StatusCode, Value) {
        let response = self.app.clone().oneshot(request).await.unwrap();
        let status = response.status();
        let body = axum::body::to_bytes(response.into_body(), usize::MAX)
            .await
            .unwrap();
        let json = if body.is_empty() {
            Value::Null
        } else {
            serde_json::from_slice(&body).unwrap_or(Value::String(String::from_utf8_lossy(&body).into()))
        };
        (status, json)
    }
}

/// JSON POST request
#[allow(dead_code)]
pub fn post_json(uri: &str, body: &Value) -> Request<Body> {
    Request::builder()
        .method("POST")
        .uri(uri)
        .header("content-type", "application/json")
        .body(Body::from(body.to_string()))
        .unwrap()
}

/// Checkout body for course `c1`
#[allow(dead_code)]
pub fn checkout_body() -> Value {
    serde_json::json!({
        "courseId": "c1",
        "userId": "u1",
        "amount": 19990,
        "paymentMethod": "pix",
        "userEmail": "a@b.com",
        "userName": "A"
    })
}
