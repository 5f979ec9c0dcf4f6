/// Mercado Pago webhook endpoint
///
/// Receives payment notifications. The body is taken raw so the signature
/// can be checked before the envelope is parsed; the envelope is only a
/// trigger, the reconciler re-fetches the payment from the gateway.
///
/// With a secret configured, a delivery is processed only when
///
/// - `x-signature` verifies for the query `data.id` (the body id when the
///   query has none) and `x-request-id`
/// - its `ts` is within the configured tolerance
/// - the body names the same payment as the signed id
///
/// # Endpoint
///
/// `POST /api/webhooks/mercadopago`
///
/// # Example Request
///
/// ```json
/// {
///   "type": "payment",
///   "action": "payment.updated",
///   "data": { "id": "1234567890" }
/// }
/// ```
///
/// # Responses
///
/// - 200 `{message}`: handled, ignored, duplicate, or unresolvable (no
///   correlation, unknown order). The gateway must not redeliver.
/// - 400: body is not a notification envelope
/// - 401: signature check failed (only when a secret is configured)
/// - 500 / 503: datastore or gateway failure, the gateway should redeliver

use crate::app::AppState;
use crate::error::{ApiError, ApiResult};
use axum::{
    extract::{Query, State},
    http::HeaderMap,
    Json,
};
use bytes::Bytes;
use coursepay_shared::reconcile::{ReconcileError, WebhookEvent};
use coursepay_shared::signature::{SignatureError, SignatureVerifier};
use serde::{Deserialize, Serialize};
use std::collections::HashMap;

/// Acknowledgement body
#[derive(Debug, Serialize, Deserialize)]
pub struct WebhookAck {
    /// Outcome summary
    pub message: String,
}

fn header<'a>(headers: &'a HeaderMap, name: &str) -> Option<&'a str> {
    headers.get(name).and_then(|v| v.to_str().ok())
}

/// Checks the delivery against the signature headers
fn authenticate(
    verifier: &SignatureVerifier,
    query: &HashMap<String, String>,
    headers: &HeaderMap,
    body: &[u8],
) -> Result<(), SignatureError> {
    let query_id = query.get("data.id").map(String::as_str);
    // Only feeds the manifest when the query carries no id
    let body_id = WebhookEvent::parse(body).ok().and_then(|event| event.data_id());

    let signed_id = query_id.or(body_id.as_deref());
    verifier.verify(
        header(headers, "x-signature"),
        header(headers, "x-request-id"),
        signed_id,
    )?;

    match (query_id, body_id.as_deref()) {
        (Some(signed), Some(delivered)) if !signed.eq_ignore_ascii_case(delivered) => {
            Err(SignatureError::IdMismatch)
        }
        _ => Ok(()),
    }
}

/// Webhook handler
pub async fn mercadopago_webhook(
    State(state): State<AppState>,
    Query(query): Query<HashMap<String, String>>,
    headers: HeaderMap,
    body: Bytes,
) -> ApiResult<Json<WebhookAck>> {
    if let Some(verifier) = &state.verifier {
        authenticate(verifier, &query, &headers, &body).map_err(|e| {
            tracing::warn!(error = %e, "Rejecting webhook with invalid signature");
            ApiError::Unauthorized("Invalid webhook signature".to_string())
        })?;
    }

    let event = WebhookEvent::parse(&body)?;

    match state.reconciler.reconcile(&event).await {
        Ok(outcome) => Ok(Json(WebhookAck {
            message: outcome.message().to_string(),
        })),
        Err(e @ (ReconcileError::MissingCorrelation { .. } | ReconcileError::OrderNotFound { .. })) => {
            tracing::warn!(error = %e, "Acknowledging webhook that cannot be matched to an order");
            Ok(Json(WebhookAck {
                message: "Order not found".to_string(),
            }))
        }
        Err(e) => {
            if e.is_retryable() {
                tracing::warn!(error = %e, "Webhook processing failed, asking for redelivery");
            }
            Err(e.into())
        }
    }
}
