/// Webhook reconciliation
///
/// The gateway delivers payment notifications at least once, in no
/// particular order, possibly from concurrent connections. A notification is
/// only a "check this payment now" trigger: its body is never read for
/// status. For each delivery the reconciler
///
/// 1. ignores anything that is not a `payment` event
/// 2. fetches the canonical payment record by id (bounded by a timeout)
/// 3. reads `external_reference` (our order id) and the gateway status
/// 4. loads the order
/// 5. maps the gateway status onto [`OrderStatus`]
/// 6. applies the status with a compare-and-set on `status = pending`
/// 7. on the write that moves the order into `approved`, provisions the
///    enrollment and sends the "payment approved" email
///
/// # State Machine
///
/// ```text
/// pending ──approved──────────────► approved
/// pending ──rejected/cancelled────► rejected
/// pending ──pending/in_process/...► pending (reference refreshed)
/// terminal ──same status──────────► no-op (duplicate)
/// terminal ──other status─────────► ignored, logged at warn
/// ```
///
/// # Acknowledgement
///
/// [`ReconcileError::is_retryable`] separates conditions worth a gateway
/// redelivery (gateway lookup or datastore failure) from those that will
/// never resolve differently and must be acknowledged.

use crate::gateway::{is_payment_id, GatewayError, PaymentGateway, PaymentRecord};
use crate::models::{Order, OrderStatus};
use crate::notify::{self, templates, Notifier};
use crate::provision::{EnrollmentProvisioner, ProvisionOutcome};
use crate::store::{Datastore, StoreError};
use serde::Deserialize;
use serde_json::Value as JsonValue;
use std::sync::Arc;
use std::time::Duration;
use thiserror::Error;
use uuid::Uuid;

/// Notification type that carries a payment id
pub const PAYMENT_EVENT: &str = "payment";

/// Reconciliation errors
#[derive(Debug, Error)]
pub enum ReconcileError {
    /// Body is not a notification envelope
    #[error("Invalid webhook payload: {0}")]
    InvalidPayload(String),

    /// Canonical payment has no external reference
    #[error("Payment {payment_id} has no external reference")]
    MissingCorrelation {
        /// Gateway payment id
        payment_id: String,
    },

    /// External reference does not name a known order
    #[error("Order not found for reference {reference}")]
    OrderNotFound {
        /// The external reference as received
        reference: String,
    },

    /// Gateway lookup failed or timed out
    #[error(transparent)]
    Gateway(#[from] GatewayError),

    /// Datastore read or write failed
    #[error(transparent)]
    Store(#[from] StoreError),
}

impl ReconcileError {
    /// Whether the gateway should redeliver
    pub fn is_retryable(&self) -> bool {
        match self {
            ReconcileError::Gateway(GatewayError::InvalidPaymentId(_)) => false,
            ReconcileError::Gateway(_) | ReconcileError::Store(_) => true,
            _ => false,
        }
    }
}

#[derive(Debug, Clone, Default, Deserialize)]
struct EventData {
    #[serde(default)]
    id: JsonValue,
}

/// Inbound notification envelope `{type, action, data: {id}}`
#[derive(Debug, Clone, Deserialize)]
pub struct WebhookEvent {
    /// Event class (`payment`, `merchant_order`, ...)
    #[serde(rename = "type", default)]
    pub event_type: Option<String>,

    /// Event action (`payment.created`, `payment.updated`, ...)
    #[serde(default)]
    pub action: Option<String>,

    #[serde(default)]
    data: Option<EventData>,
}

/// What a notification asks the reconciler to do
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum WebhookSignal {
    /// Re-fetch this gateway payment
    CheckPayment {
        /// Gateway payment id
        payment_id: String,
    },

    /// Not a payment event
    Irrelevant {
        /// Event class, if any
        event_type: Option<String>,
    },
}

impl WebhookEvent {
    /// Parses a raw request body
    pub fn parse(body: &[u8]) -> Result<Self, ReconcileError> {
        serde_json::from_slice(body).map_err(|e| ReconcileError::InvalidPayload(e.to_string()))
    }

    /// `data.id`, accepting both numeric and string ids
    pub fn data_id(&self) -> Option<String> {
        match self.data.as_ref().map(|d| &d.id) {
            Some(JsonValue::String(s)) if !s.trim().is_empty() => Some(s.trim().to_string()),
            Some(JsonValue::Number(n)) => Some(n.to_string()),
            _ => None,
        }
    }

    /// Classifies the notification
    ///
    /// # Errors
    ///
    /// A payment event whose `data.id` is missing or is not a plain gateway
    /// id is [`ReconcileError::InvalidPayload`]. The id ends up in an
    /// authenticated gateway request, so nothing path-like gets through.
    pub fn signal(&self) -> Result<WebhookSignal, ReconcileError> {
        if self.event_type.as_deref() != Some(PAYMENT_EVENT) {
            return Ok(WebhookSignal::Irrelevant {
                event_type: self.event_type.clone(),
            });
        }

        let payment_id = self
            .data_id()
            .ok_or_else(|| ReconcileError::InvalidPayload("payment event without data.id".to_string()))?;

        if !is_payment_id(&payment_id) {
            return Err(ReconcileError::InvalidPayload(format!(
                "data.id is not a payment id: {payment_id:?}"
            )));
        }

        Ok(WebhookSignal::CheckPayment { payment_id })
    }
}

/// Maps the gateway status vocabulary onto order status
///
/// Unknown statuses map to `pending`, never to a terminal status.
pub fn map_gateway_status(status: &str) -> OrderStatus {
    match status {
        "approved" => OrderStatus::Approved,
        "rejected" | "cancelled" => OrderStatus::Rejected,
        "pending" | "in_process" | "in_mediation" => OrderStatus::Pending,
        _ => OrderStatus::Pending,
    }
}

/// Result of a handled notification; every variant is acknowledged
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ReconcileOutcome {
    /// Not a payment event
    Ignored,

    /// Order already holds this terminal status
    Duplicate {
        /// Order id
        order_id: Uuid,
        /// Stored status
        status: OrderStatus,
    },

    /// Order holds a different terminal status; nothing written
    Conflict {
        /// Order id
        order_id: Uuid,
        /// Stored status
        stored: OrderStatus,
        /// Status derived from the canonical record
        observed: OrderStatus,
    },

    /// Pending order written to `pending` or `rejected`
    Updated {
        /// Order id
        order_id: Uuid,
        /// New status
        status: OrderStatus,
    },

    /// Pending order moved to `approved` by this delivery
    Approved {
        /// Order id
        order_id: Uuid,
        /// Whether the enrollment exists after provisioning
        enrolled: bool,
    },
}

impl ReconcileOutcome {
    /// Short acknowledgement text
    pub fn message(&self) -> &'static str {
        match self {
            ReconcileOutcome::Ignored => "Event ignored",
            ReconcileOutcome::Duplicate { .. } => "Already processed",
            ReconcileOutcome::Conflict { .. } => "Order already finalized",
            ReconcileOutcome::Updated { .. } => "Order updated",
            ReconcileOutcome::Approved { .. } => "Payment approved",
        }
    }
}

/// Reconciler settings
#[derive(Debug, Clone)]
pub struct ReconcilerConfig {
    /// Bound on the canonical payment fetch
    pub gateway_timeout: Duration,

    /// Storefront base URL for email links
    pub app_url: String,
}

impl Default for ReconcilerConfig {
    fn default() -> Self {
        Self {
            gateway_timeout: Duration::from_secs(5),
            app_url: String::new(),
        }
    }
}

/// Applies gateway notifications to orders
#[derive(Clone)]
pub struct WebhookReconciler {
    store: Arc<dyn Datastore>,
    gateway: Arc<dyn PaymentGateway>,
    notifier: Arc<dyn Notifier>,
    provisioner: EnrollmentProvisioner,
    config: ReconcilerConfig,
}

impl WebhookReconciler {
    /// Wires the reconciler to its collaborators
    pub fn new(
        store: Arc<dyn Datastore>,
        gateway: Arc<dyn PaymentGateway>,
        notifier: Arc<dyn Notifier>,
        config: ReconcilerConfig,
    ) -> Self {
        let provisioner = EnrollmentProvisioner::new(store.clone());
        Self {
            store,
            gateway,
            notifier,
            provisioner,
            config,
        }
    }

    /// Parses and reconciles a raw notification body
    pub async fn handle(&self, body: &[u8]) -> Result<ReconcileOutcome, ReconcileError> {
        let event = WebhookEvent::parse(body)?;
        self.reconcile(&event).await
    }

    /// Reconciles one parsed notification
    pub async fn reconcile(&self, event: &WebhookEvent) -> Result<ReconcileOutcome, ReconcileError> {
        let payment_id = match event.signal()? {
            WebhookSignal::CheckPayment { payment_id } => payment_id,
            WebhookSignal::Irrelevant { event_type } => {
                tracing::debug!(event_type = ?event_type, action = ?event.action, "Ignoring webhook event");
                return Ok(ReconcileOutcome::Ignored);
            }
        };

        let payment = self.fetch_payment(&payment_id).await?;

        let reference = payment
            .external_reference
            .clone()
            .ok_or_else(|| ReconcileError::MissingCorrelation {
                payment_id: payment.id.clone(),
            })?;

        let order = self.find_order(&reference).await?;
        let observed = map_gateway_status(&payment.status);

        tracing::debug!(
            order_id = %order.id,
            payment_id = %payment.id,
            gateway_status = %payment.status,
            stored = %order.status,
            observed = %observed,
            "Reconciling payment"
        );

        if order.status.is_terminal() {
            return Ok(settled(&order, observed));
        }

        let Some(updated) = self
            .store
            .transition_order(order.id, observed, &payment.id)
            .await?
        else {
            // Another delivery finalized the order between our read and write
            let current = self
                .store
                .find_order(order.id)
                .await?
                .ok_or_else(|| ReconcileError::OrderNotFound { reference })?;
            return Ok(settled(&current, observed));
        };

        tracing::info!(
            order_id = %updated.id,
            payment_id = %payment.id,
            status = %updated.status,
            "Order status updated"
        );

        if updated.status != OrderStatus::Approved {
            return Ok(ReconcileOutcome::Updated {
                order_id: updated.id,
                status: updated.status,
            });
        }

        let enrolled = self.provision(&updated).await;
        self.notify_approved(&updated).await;

        Ok(ReconcileOutcome::Approved {
            order_id: updated.id,
            enrolled,
        })
    }

    async fn fetch_payment(&self, payment_id: &str) -> Result<PaymentRecord, ReconcileError> {
        let record = tokio::time::timeout(self.config.gateway_timeout, self.gateway.get_payment(payment_id))
            .await
            .map_err(|_| GatewayError::Timeout)
            .and_then(|result| result)
            .map_err(|e| {
                tracing::warn!(payment_id = %payment_id, error = %e, "Canonical payment fetch failed");
                e
            })?;
        Ok(record)
    }

    async fn find_order(&self, reference: &str) -> Result<Order, ReconcileError> {
        let not_found = || ReconcileError::OrderNotFound {
            reference: reference.to_string(),
        };

        // A reference that is not a UUID cannot name one of our orders
        let order_id = Uuid::parse_str(reference).map_err(|_| not_found())?;
        self.store.find_order(order_id).await?.ok_or_else(not_found)
    }

    async fn provision(&self, order: &Order) -> bool {
        match self.provisioner.provision(order).await {
            Ok(ProvisionOutcome::Created(_)) | Ok(ProvisionOutcome::AlreadyExists) => true,
            Err(e) => {
                tracing::error!(
                    order_id = %order.id,
                    user_id = %order.user_id,
                    course_id = %order.course_id,
                    error = %e,
                    "Enrollment provisioning failed for approved order, needs repair"
                );
                false
            }
        }
    }

    async fn notify_approved(&self, order: &Order) {
        let user = self.store.find_user(&order.user_id).await;
        let course = self.store.find_course(&order.course_id).await;

        match (user, course) {
            (Ok(Some(user)), Ok(Some(course))) => {
                notify::dispatch(
                    self.notifier.as_ref(),
                    templates::payment_approved(&user, &course, order, &self.config.app_url),
                )
                .await;
            }
            _ => {
                tracing::warn!(order_id = %order.id, "Cannot load buyer or course, skipping approval email");
            }
        }
    }
}

fn settled(order: &Order, observed: OrderStatus) -> ReconcileOutcome {
    if order.status == observed {
        tracing::debug!(order_id = %order.id, status = %order.status, "Duplicate delivery");
        ReconcileOutcome::Duplicate {
            order_id: order.id,
            status: order.status,
        }
    } else {
        tracing::warn!(
            order_id = %order.id,
            stored = %order.status,
            observed = %observed,
            "Canonical status disagrees with finalized order, keeping stored status"
        );
        ReconcileOutcome::Conflict {
            order_id: order.id,
            stored: order.status,
            observed,
        }
    }
}
