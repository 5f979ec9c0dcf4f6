/// Mock gateway for testing and local demos
///
/// Holds scripted payment records in memory and records every intent request.
/// Failure switches let tests exercise the transient-error paths:
///
/// - `fail_intents`: intent creation returns an API error
/// - `omit_intent_id`: intent creation "succeeds" without an id
/// - `fail_lookups`: payment fetches return an API error
/// - `lookup_delay`: payment fetches sleep before answering
///
/// # Example
///
/// ```
/// use coursepay_shared::gateway::{MockGateway, PaymentGateway};
///
/// # async fn example() {
/// let gateway = MockGateway::new();
/// gateway.set_payment("42", "approved", Some("order-id")).await;
///
/// let record = gateway.get_payment("42").await.unwrap();
/// assert_eq!(record.status, "approved");
/// # }
/// ```

use super::{
    GatewayError, GatewayResult, PaymentGateway, PaymentIntent, PaymentIntentRequest, PaymentRecord,
};
use async_trait::async_trait;
use std::collections::HashMap;
use std::sync::atomic::{AtomicBool, AtomicUsize, Ordering};
use std::sync::Arc;
use std::time::Duration;
use tokio::sync::RwLock;

#[derive(Default)]
struct Switches {
    fail_intents: AtomicBool,
    omit_intent_id: AtomicBool,
    fail_lookups: AtomicBool,
}

/// Scripted in-memory gateway, cheap to clone
#[derive(Default, Clone)]
pub struct MockGateway {
    payments: Arc<RwLock<HashMap<String, PaymentRecord>>>,
    intents: Arc<RwLock<Vec<PaymentIntentRequest>>>,
    lookup_delay: Arc<RwLock<Option<Duration>>>,
    lookups: Arc<AtomicUsize>,
    switches: Arc<Switches>,
}

impl MockGateway {
    /// Creates an empty gateway
    pub fn new() -> Self {
        Self::default()
    }

    /// Sets (or replaces) the canonical record for a payment id
    pub async fn set_payment(&self, id: &str, status: &str, external_reference: Option<&str>) {
        self.payments.write().await.insert(
            id.to_string(),
            PaymentRecord {
                id: id.to_string(),
                status: status.to_string(),
                external_reference: external_reference.map(str::to_string),
            },
        );
    }

    /// Intent requests received so far
    pub async fn intents(&self) -> Vec<PaymentIntentRequest> {
        self.intents.read().await.clone()
    }

    /// Number of payment lookups served (including failed ones)
    pub fn lookup_count(&self) -> usize {
        self.lookups.load(Ordering::SeqCst)
    }

    /// Makes intent creation fail
    pub fn fail_intents(&self, fail: bool) {
        self.switches.fail_intents.store(fail, Ordering::SeqCst);
    }

    /// Makes intent creation return no id
    pub fn omit_intent_id(&self, omit: bool) {
        self.switches.omit_intent_id.store(omit, Ordering::SeqCst);
    }

    /// Makes payment lookups fail
    pub fn fail_lookups(&self, fail: bool) {
        self.switches.fail_lookups.store(fail, Ordering::SeqCst);
    }

    /// Delays every payment lookup
    pub async fn set_lookup_delay(&self, delay: Option<Duration>) {
        *self.lookup_delay.write().await = delay;
    }
}

#[async_trait]
impl PaymentGateway for MockGateway {
    async fn create_payment_intent(&self, request: &PaymentIntentRequest) -> GatewayResult<PaymentIntent> {
        self.intents.write().await.push(request.clone());

        if self.switches.fail_intents.load(Ordering::SeqCst) {
            return Err(GatewayError::Api {
                status: 500,
                message: "mock intent failure".to_string(),
            });
        }

        let id = if self.switches.omit_intent_id.load(Ordering::SeqCst) {
            None
        } else {
            Some(format!("pref-{}", request.order_id))
        };

        Ok(PaymentIntent {
            init_point: id
                .as_ref()
                .map(|id| format!("https://mock.gateway/checkout?pref_id={id}")),
            sandbox_init_point: id
                .as_ref()
                .map(|id| format!("https://sandbox.mock.gateway/checkout?pref_id={id}")),
            id,
        })
    }

    async fn get_payment(&self, payment_id: &str) -> GatewayResult<PaymentRecord> {
        self.lookups.fetch_add(1, Ordering::SeqCst);

        let delay = *self.lookup_delay.read().await;
        if let Some(delay) = delay {
            tokio::time::sleep(delay).await;
        }

        if self.switches.fail_lookups.load(Ordering::SeqCst) {
            return Err(GatewayError::Api {
                status: 503,
                message: "mock lookup failure".to_string(),
            });
        }

        self.payments
            .read()
            .await
            .get(payment_id)
            .cloned()
            .ok_or_else(|| GatewayError::PaymentNotFound(payment_id.to_string()))
    }
}
