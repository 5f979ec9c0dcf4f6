/// Payment gateway port
///
/// The gateway is the system of record for payment state. This module defines
/// the two calls the pipeline makes against it:
///
/// - open a payment intent for an order (checkout)
/// - fetch the canonical payment record by gateway id (reconciliation)
///
/// Webhook bodies are never read for status; [`PaymentGateway::get_payment`]
/// is the only trusted source.
///
/// # Implementations
///
/// - [`mercadopago::MercadoPagoGateway`]: REST client over `reqwest`
/// - [`mock::MockGateway`]: scripted in-memory gateway for tests

pub mod mercadopago;
pub mod mock;

use async_trait::async_trait;
use serde::{Deserialize, Serialize};
use thiserror::Error;
use uuid::Uuid;

pub use mercadopago::{MercadoPagoConfig, MercadoPagoGateway};
pub use mock::MockGateway;

/// Gateway errors
#[derive(Debug, Error)]
pub enum GatewayError {
    /// The call did not complete within the configured bound
    #[error("Gateway request timed out")]
    Timeout,

    /// Network or TLS failure
    #[error("Gateway transport error: {0}")]
    Transport(String),

    /// Gateway answered with a non-success status
    #[error("Gateway returned HTTP {status}: {message}")]
    Api {
        /// HTTP status code
        status: u16,
        /// Response body excerpt
        message: String,
    },

    /// Gateway has no payment with this id
    #[error("Payment not found at gateway: {0}")]
    PaymentNotFound(String),

    /// Response body did not match the expected shape
    #[error("Failed to decode gateway response: {0}")]
    Decode(String),

    /// Intent was created without an identifier
    #[error("Payment intent has no identifier")]
    MissingIntentId,

    /// Refused to look up something that is not a plain payment id
    #[error("Invalid payment id: {0:?}")]
    InvalidPaymentId(String),
}

impl From<reqwest::Error> for GatewayError {
    fn from(err: reqwest::Error) -> Self {
        if err.is_timeout() {
            GatewayError::Timeout
        } else if err.is_decode() {
            GatewayError::Decode(err.to_string())
        } else {
            GatewayError::Transport(err.to_string())
        }
    }
}

/// Gateway result type alias
pub type GatewayResult<T> = Result<T, GatewayError>;

/// Longest payment id accepted for a lookup
pub const MAX_PAYMENT_ID_LEN: usize = 64;

/// Whether `id` has the shape of a gateway payment id
///
/// Mercado Pago ids are numeric; ASCII alphanumerics plus `-` and `_` are
/// accepted so sandbox and mock ids still pass. Anything that could change
/// the lookup path (`/`, `.`, `?`, `%`, whitespace) is rejected.
pub fn is_payment_id(id: &str) -> bool {
    !id.is_empty()
        && id.len() <= MAX_PAYMENT_ID_LEN
        && id.bytes().all(|b| b.is_ascii_alphanumeric() || b == b'-' || b == b'_')
}

/// Product line on the hosted checkout
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct LineItem {
    /// Course id
    pub id: String,

    /// Course title
    pub title: String,

    /// Free-text description
    pub description: String,

    /// Unit price in cents
    pub unit_amount: i64,

    /// Always 1 for a course purchase
    pub quantity: u32,
}

/// Payer shown on the hosted checkout
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Payer {
    /// Buyer name
    pub name: String,

    /// Buyer email
    pub email: String,
}

/// Where the buyer is sent after the hosted checkout
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct BackUrls {
    /// Approved payment
    pub success: String,

    /// Failed payment
    pub failure: String,

    /// Payment still settling
    pub pending: String,
}

/// Everything needed to open a payment intent for one order
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct PaymentIntentRequest {
    /// Merchant correlation value; later returned as `external_reference`
    pub order_id: Uuid,

    /// The purchased course
    pub item: LineItem,

    /// The buyer
    pub payer: Payer,

    /// 12 for credit card, 1 otherwise
    pub max_installments: u8,

    /// Redirect targets
    pub back_urls: BackUrls,

    /// Where the gateway delivers payment notifications
    pub notification_url: String,
}

/// Payment intent as returned by the gateway
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct PaymentIntent {
    /// Gateway intent id; absent means creation did not really succeed
    pub id: Option<String>,

    /// Live hosted checkout URL
    pub init_point: Option<String>,

    /// Sandbox hosted checkout URL
    pub sandbox_init_point: Option<String>,
}

/// Canonical payment state fetched by id
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct PaymentRecord {
    /// Gateway payment id
    pub id: String,

    /// Gateway status vocabulary (`approved`, `rejected`, `in_process`, ...)
    pub status: String,

    /// Correlation value set at intent creation (our order id)
    pub external_reference: Option<String>,
}

/// Payment gateway operations
#[async_trait]
pub trait PaymentGateway: Send + Sync {
    /// Opens a hosted-checkout payment intent
    ///
    /// Implementations should make this idempotent per `order_id`.
    async fn create_payment_intent(&self, request: &PaymentIntentRequest) -> GatewayResult<PaymentIntent>;

    /// Fetches the current, authoritative payment record
    async fn get_payment(&self, payment_id: &str) -> GatewayResult<PaymentRecord>;
}
