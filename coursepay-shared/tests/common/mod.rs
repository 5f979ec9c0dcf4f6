/// Shared fixtures for pipeline tests
///
/// Wires the services to an in-memory store, the mock gateway and a
/// recording notifier, with one course (`c1`, catalog price R$ 250,00).

use coursepay_shared::checkout::{CheckoutConfig, CheckoutRequest, CheckoutService};
use coursepay_shared::gateway::MockGateway;
use coursepay_shared::models::{Course, PaymentMethod};
use coursepay_shared::notify::RecordingNotifier;
use coursepay_shared::reconcile::{ReconcilerConfig, WebhookReconciler};
use coursepay_shared::store::InMemoryStore;
use std::sync::Arc;
use std::time::Duration;

pub const APP_URL: &str = "https://shop.example";
pub const API_URL: &str = "https://api.example";

#[allow(dead_code)]
pub struct Harness {
    pub store: InMemoryStore,
    pub gateway: MockGateway,
    pub notifier: RecordingNotifier,
    pub checkout: CheckoutService,
    pub reconciler: WebhookReconciler,
}

impl Harness {
    pub async fn new() -> Self {
        Self::with_timeout(Duration::from_secs(5)).await
    }

    pub async fn with_timeout(gateway_timeout: Duration) -> Self {
        let store = InMemoryStore::new();
        let gateway = MockGateway::new();
        let notifier = RecordingNotifier::new();

        store
            .put_course(Course::new("c1", "Rust para Backend", "Ferris", 25000))
            .await;

        let checkout = CheckoutService::new(
            Arc::new(store.clone()),
            Arc::new(gateway.clone()),
            Arc::new(notifier.clone()),
            CheckoutConfig {
                app_url: APP_URL.to_string(),
                api_url: API_URL.to_string(),
            },
        );

        let reconciler = WebhookReconciler::new(
            Arc::new(store.clone()),
            Arc::new(gateway.clone()),
            Arc::new(notifier.clone()),
            ReconcilerConfig {
                gateway_timeout,
                app_url: APP_URL.to_string(),
            },
        );

        Harness {
            store,
            gateway,
            notifier,
            checkout,
            reconciler,
        }
    }
}

#[allow(dead_code)]
pub fn checkout_request(method: PaymentMethod) -> CheckoutRequest {
    CheckoutRequest {
        course_id: "c1".to_string(),
        user_id: "u1".to_string(),
        amount: 19990,
        payment_method: method,
        user_email: "a@b.com".to_string(),
        user_name: "A".to_string(),
    }
}

#[allow(dead_code)]
pub fn payment_webhook(payment_id: &str) -> Vec<u8> {
    format!(r#"{{"type":"payment","action":"payment.updated","data":{{"id":"{payment_id}"}}}}"#).into_bytes()
}
