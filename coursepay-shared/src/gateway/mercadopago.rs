/// Mercado Pago REST adapter
///
/// Implements [`PaymentGateway`] against the Mercado Pago API:
///
/// - `POST /checkout/preferences` opens a hosted-checkout preference. The
///   order id goes out as both `external_reference` and the
///   `X-Idempotency-Key` header, so a retried checkout for the same order
///   reuses the preference instead of opening a second one.
/// - `GET /v1/payments/{id}` returns the canonical payment record. Only
///   plain ids are looked up, and the id is pushed as a single encoded path
///   segment.
///
/// Every request is bounded by `timeout`.
///
/// # Example
///
/// ```no_run
/// use coursepay_shared::gateway::{MercadoPagoConfig, MercadoPagoGateway, PaymentGateway};
///
/// # async fn example() -> Result<(), Box<dyn std::error::Error>> {
/// let gateway = MercadoPagoGateway::new(MercadoPagoConfig {
///     access_token: "APP_USR-...".to_string(),
///     ..Default::default()
/// })?;
///
/// let payment = gateway.get_payment("1234567890").await?;
/// println!("{} -> {:?}", payment.status, payment.external_reference);
/// # Ok(())
/// # }
/// ```

use super::{
    is_payment_id, GatewayError, GatewayResult, PaymentGateway, PaymentIntent, PaymentIntentRequest,
    PaymentRecord,
};
use async_trait::async_trait;
use chrono::{DateTime, Duration as ChronoDuration, SecondsFormat, Utc};
use reqwest::{Client, StatusCode, Url};
use serde::{Deserialize, Serialize};
use serde_json::Value as JsonValue;
use std::time::Duration;

/// Default API base URL
pub const DEFAULT_API_BASE: &str = "https://api.mercadopago.com";

/// Mercado Pago client configuration
#[derive(Debug, Clone)]
pub struct MercadoPagoConfig {
    /// Private access token (bearer)
    pub access_token: String,

    /// API base URL, overridable for sandboxes and tests
    pub api_base: String,

    /// Upper bound for every request
    pub timeout: Duration,

    /// Text shown on the buyer's card statement
    pub statement_descriptor: String,

    /// How long a preference stays payable
    pub intent_expiry: Duration,

    /// ISO currency of line items
    pub currency_id: String,
}

impl Default for MercadoPagoConfig {
    fn default() -> Self {
        Self {
            access_token: String::new(),
            api_base: DEFAULT_API_BASE.to_string(),
            timeout: Duration::from_millis(5000),
            statement_descriptor: "GLOBAL TRAINER".to_string(),
            intent_expiry: Duration::from_secs(30 * 60),
            currency_id: "BRL".to_string(),
        }
    }
}

#[derive(Debug, Serialize)]
struct PreferenceItem<'a> {
    id: &'a str,
    title: &'a str,
    description: &'a str,
    quantity: u32,
    unit_price: f64,
    currency_id: &'a str,
}

#[derive(Debug, Serialize)]
struct PreferencePayer<'a> {
    name: &'a str,
    email: &'a str,
}

#[derive(Debug, Serialize)]
struct PreferencePaymentMethods {
    excluded_payment_methods: Vec<JsonValue>,
    excluded_payment_types: Vec<JsonValue>,
    installments: u8,
}

#[derive(Debug, Serialize)]
struct PreferenceBackUrls<'a> {
    success: &'a str,
    failure: &'a str,
    pending: &'a str,
}

#[derive(Debug, Serialize)]
struct PreferenceBody<'a> {
    items: Vec<PreferenceItem<'a>>,
    payer: PreferencePayer<'a>,
    payment_methods: PreferencePaymentMethods,
    back_urls: PreferenceBackUrls<'a>,
    auto_return: &'static str,
    external_reference: String,
    notification_url: &'a str,
    statement_descriptor: &'a str,
    expires: bool,
    expiration_date_from: String,
    expiration_date_to: String,
}

#[derive(Debug, Deserialize)]
struct PreferenceResponse {
    id: Option<String>,
    init_point: Option<String>,
    sandbox_init_point: Option<String>,
}

#[derive(Debug, Deserialize)]
struct PaymentResponse {
    #[serde(default)]
    id: JsonValue,
    status: Option<String>,
    external_reference: Option<String>,
}

/// Mercado Pago gateway client
#[derive(Clone)]
pub struct MercadoPagoGateway {
    client: Client,
    config: MercadoPagoConfig,
}

impl MercadoPagoGateway {
    /// Builds a client with the configured timeout
    pub fn new(config: MercadoPagoConfig) -> GatewayResult<Self> {
        let client = Client::builder()
            .timeout(config.timeout)
            .build()
            .map_err(|e| GatewayError::Transport(e.to_string()))?;

        Ok(MercadoPagoGateway { client, config })
    }

    fn url(&self, path: &str) -> String {
        format!("{}{}", self.config.api_base.trim_end_matches('/'), path)
    }

    fn payment_url(&self, payment_id: &str) -> GatewayResult<Url> {
        let mut url = Url::parse(&self.url("/v1/payments"))
            .map_err(|e| GatewayError::Transport(format!("invalid API base: {e}")))?;
        url.path_segments_mut()
            .map_err(|_| GatewayError::Transport("API base cannot hold a path".to_string()))?
            .push(payment_id);
        Ok(url)
    }

    fn preference_body<'a>(
        &'a self,
        request: &'a PaymentIntentRequest,
        now: DateTime<Utc>,
    ) -> PreferenceBody<'a> {
        let expiry = ChronoDuration::from_std(self.config.intent_expiry)
            .unwrap_or_else(|_| ChronoDuration::minutes(30));

        PreferenceBody {
            items: vec![PreferenceItem {
                id: &request.item.id,
                title: &request.item.title,
                description: &request.item.description,
                quantity: request.item.quantity,
                unit_price: request.item.unit_amount as f64 / 100.0,
                currency_id: &self.config.currency_id,
            }],
            payer: PreferencePayer {
                name: &request.payer.name,
                email: &request.payer.email,
            },
            payment_methods: PreferencePaymentMethods {
                excluded_payment_methods: Vec::new(),
                excluded_payment_types: Vec::new(),
                installments: request.max_installments,
            },
            back_urls: PreferenceBackUrls {
                success: &request.back_urls.success,
                failure: &request.back_urls.failure,
                pending: &request.back_urls.pending,
            },
            auto_return: "approved",
            external_reference: request.order_id.to_string(),
            notification_url: &request.notification_url,
            statement_descriptor: &self.config.statement_descriptor,
            expires: true,
            expiration_date_from: now.to_rfc3339_opts(SecondsFormat::Millis, true),
            expiration_date_to: (now + expiry).to_rfc3339_opts(SecondsFormat::Millis, true),
        }
    }

    async fn error_for(response: reqwest::Response) -> GatewayError {
        let status = response.status().as_u16();
        let body = response.text().await.unwrap_or_default();
        let message = body.chars().take(512).collect();
        GatewayError::Api { status, message }
    }
}

fn payment_record(body: PaymentResponse, requested_id: &str) -> GatewayResult<PaymentRecord> {
    let id = match body.id {
        JsonValue::String(s) => s,
        JsonValue::Number(n) => n.to_string(),
        JsonValue::Null => requested_id.to_string(),
        other => return Err(GatewayError::Decode(format!("unexpected payment id: {other}"))),
    };

    let status = body
        .status
        .ok_or_else(|| GatewayError::Decode("payment has no status".to_string()))?;

    Ok(PaymentRecord {
        id,
        status,
        external_reference: body.external_reference.filter(|r| !r.trim().is_empty()),
    })
}

#[async_trait]
impl PaymentGateway for MercadoPagoGateway {
    async fn create_payment_intent(&self, request: &PaymentIntentRequest) -> GatewayResult<PaymentIntent> {
        let body = self.preference_body(request, Utc::now());

        tracing::debug!(order_id = %request.order_id, "Creating Mercado Pago preference");

        let response = self
            .client
            .post(self.url("/checkout/preferences"))
            .bearer_auth(&self.config.access_token)
            .header("X-Idempotency-Key", request.order_id.to_string())
            .json(&body)
            .send()
            .await?;

        if !response.status().is_success() {
            return Err(Self::error_for(response).await);
        }

        let preference: PreferenceResponse = response.json().await?;

        Ok(PaymentIntent {
            id: preference.id.filter(|id| !id.is_empty()),
            init_point: preference.init_point,
            sandbox_init_point: preference.sandbox_init_point,
        })
    }

    async fn get_payment(&self, payment_id: &str) -> GatewayResult<PaymentRecord> {
        if !is_payment_id(payment_id) {
            return Err(GatewayError::InvalidPaymentId(payment_id.to_string()));
        }

        let response = self
            .client
            .get(self.payment_url(payment_id)?)
            .bearer_auth(&self.config.access_token)
            .send()
            .await?;

        if response.status() == StatusCode::NOT_FOUND {
            return Err(GatewayError::PaymentNotFound(payment_id.to_string()));
        }
        if !response.status().is_success() {
            return Err(Self::error_for(response).await);
        }

        let body: PaymentResponse = response.json().await?;
        payment_record(body, payment_id)
    }
}
