/// Checkout: order creation and payment intent
///
/// [`CheckoutService::create_order`] turns a purchase request into a pending
/// order with an open payment intent:
///
/// 1. validate the request
/// 2. load the course (`CourseNotFound` if absent, nothing is written)
/// 3. load the buyer, creating it on first purchase
/// 4. insert the order as `pending` with the amount from the request
/// 5. open the payment intent with the order id as correlation reference
/// 6. store the intent id on the order
/// 7. send the "order created" email (best effort)
///
/// If step 5 fails, or the gateway answers without an intent id, the order
/// stays `pending` with no gateway reference. Nothing retries it: the buyer
/// checks out again, which opens a new order. The gateway call carries the
/// order id as idempotency key, so a retry for the *same* order cannot open
/// a second intent.

use crate::gateway::{BackUrls, GatewayError, LineItem, Payer, PaymentGateway, PaymentIntentRequest};
use crate::models::{Course, CreateOrder, CreateUser, Order, PaymentMethod, User};
use crate::notify::{self, templates, Notifier};
use crate::store::{Datastore, StoreError};
use serde::{Deserialize, Serialize};
use std::sync::Arc;
use thiserror::Error;
use uuid::Uuid;
use validator::{Validate, ValidationErrors};

/// Checkout errors
#[derive(Debug, Error)]
pub enum CheckoutError {
    /// Malformed request
    #[error("Invalid checkout request: {0}")]
    Validation(#[from] ValidationErrors),

    /// Unknown course id
    #[error("Course not found: {0}")]
    CourseNotFound(String),

    /// Intent creation failed or returned no id
    #[error(transparent)]
    Gateway(#[from] GatewayError),

    /// Datastore failure
    #[error(transparent)]
    Persistence(#[from] StoreError),
}

/// Purchase request as sent by the storefront
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize, Validate)]
#[serde(rename_all = "camelCase")]
pub struct CheckoutRequest {
    /// Course being bought
    #[validate(length(min = 1, max = 255, message = "courseId is required"))]
    pub course_id: String,

    /// Buyer identity
    #[validate(length(min = 1, max = 255, message = "userId is required"))]
    pub user_id: String,

    /// Amount in cents
    #[validate(range(min = 1, message = "amount must be positive"))]
    pub amount: i64,

    /// pix, credit_card or boleto
    pub payment_method: PaymentMethod,

    /// Buyer email, used when the buyer is new
    #[validate(email(message = "Invalid email format"))]
    pub user_email: String,

    /// Buyer name, used when the buyer is new
    #[validate(length(min = 1, max = 255, message = "userName is required"))]
    pub user_name: String,
}

/// Checkout result returned to the storefront
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct CheckoutResponse {
    /// New order id
    pub order_id: Uuid,

    /// Gateway intent id
    pub preference_id: String,

    /// Live hosted checkout URL
    pub init_point: Option<String>,

    /// Sandbox hosted checkout URL
    pub sandbox_init_point: Option<String>,
}

/// Public URLs the intent points back to
#[derive(Debug, Clone)]
pub struct CheckoutConfig {
    /// Storefront base URL (back URLs, email links)
    pub app_url: String,

    /// Public API base URL (webhook notification URL)
    pub api_url: String,
}

impl CheckoutConfig {
    fn back_urls(&self, order_id: Uuid) -> BackUrls {
        let base = self.app_url.trim_end_matches('/');
        let url = |outcome: &str| format!("{base}/checkout/{outcome}?order_id={order_id}");
        BackUrls {
            success: url("success"),
            failure: url("failure"),
            pending: url("pending"),
        }
    }

    /// Where the gateway delivers webhooks
    pub fn notification_url(&self) -> String {
        format!("{}/api/webhooks/mercadopago", self.api_url.trim_end_matches('/'))
    }
}

/// Creates orders and their payment intents
#[derive(Clone)]
pub struct CheckoutService {
    store: Arc<dyn Datastore>,
    gateway: Arc<dyn PaymentGateway>,
    notifier: Arc<dyn Notifier>,
    config: CheckoutConfig,
}

impl CheckoutService {
    /// Wires the service to its collaborators
    pub fn new(
        store: Arc<dyn Datastore>,
        gateway: Arc<dyn PaymentGateway>,
        notifier: Arc<dyn Notifier>,
        config: CheckoutConfig,
    ) -> Self {
        Self {
            store,
            gateway,
            notifier,
            config,
        }
    }

    /// Creates a pending order and opens its payment intent
    ///
    /// # Errors
    ///
    /// - [`CheckoutError::Validation`]: malformed request, nothing written
    /// - [`CheckoutError::CourseNotFound`]: nothing written
    /// - [`CheckoutError::Gateway`]: the order exists, pending, without reference
    /// - [`CheckoutError::Persistence`]: datastore failure
    pub async fn create_order(&self, request: CheckoutRequest) -> Result<CheckoutResponse, CheckoutError> {
        request.validate()?;

        let course = self
            .store
            .find_course(&request.course_id)
            .await?
            .ok_or_else(|| CheckoutError::CourseNotFound(request.course_id.clone()))?;

        let user = self.ensure_user(&request).await?;

        let order = self
            .store
            .insert_order(Order::new(CreateOrder {
                user_id: user.id.clone(),
                course_id: course.id.clone(),
                amount: request.amount,
                payment_method: request.payment_method,
            }))
            .await?;

        tracing::info!(
            order_id = %order.id,
            user_id = %order.user_id,
            course_id = %order.course_id,
            amount = order.amount,
            payment_method = %order.payment_method,
            "Order created"
        );

        let intent = self
            .gateway
            .create_payment_intent(&self.intent_request(&order, &course, &user))
            .await
            .map_err(|e| {
                tracing::warn!(order_id = %order.id, error = %e, "Payment intent creation failed");
                e
            })?;

        let preference_id = intent.id.ok_or_else(|| {
            tracing::warn!(order_id = %order.id, "Payment intent returned without id");
            GatewayError::MissingIntentId
        })?;

        self.store
            .attach_gateway_reference(order.id, &preference_id)
            .await?;

        notify::dispatch(
            self.notifier.as_ref(),
            templates::order_created(&user, &course, &order, &self.config.app_url),
        )
        .await;

        Ok(CheckoutResponse {
            order_id: order.id,
            preference_id,
            init_point: intent.init_point,
            sandbox_init_point: intent.sandbox_init_point,
        })
    }

    /// Loads the buyer, creating it on first purchase
    ///
    /// A concurrent creation of the same id surfaces as a unique violation;
    /// the other request's row is then read back.
    async fn ensure_user(&self, request: &CheckoutRequest) -> Result<User, CheckoutError> {
        if let Some(user) = self.store.find_user(&request.user_id).await? {
            return Ok(user);
        }

        let new_user = User::new(CreateUser {
            id: request.user_id.clone(),
            email: request.user_email.clone(),
            name: request.user_name.clone(),
        });

        match self.store.insert_user(new_user).await {
            Ok(user) => {
                tracing::info!(user_id = %user.id, "Buyer created on first purchase");
                Ok(user)
            }
            Err(StoreError::UniqueViolation(_)) => self
                .store
                .find_user(&request.user_id)
                .await?
                .ok_or_else(|| {
                    CheckoutError::Persistence(StoreError::Database(format!(
                        "user {} conflicted on insert but cannot be read",
                        request.user_id
                    )))
                }),
            Err(e) => Err(e.into()),
        }
    }

    fn intent_request(&self, order: &Order, course: &Course, user: &User) -> PaymentIntentRequest {
        PaymentIntentRequest {
            order_id: order.id,
            item: LineItem {
                id: course.id.clone(),
                title: course.title.clone(),
                description: format!("Curso: {} - Instrutor: {}", course.title, course.instructor),
                unit_amount: order.amount,
                quantity: 1,
            },
            payer: Payer {
                name: user.name.clone(),
                email: user.email.clone(),
            },
            max_installments: order.payment_method.max_installments(),
            back_urls: self.config.back_urls(order.id),
            notification_url: self.config.notification_url(),
        }
    }
}
