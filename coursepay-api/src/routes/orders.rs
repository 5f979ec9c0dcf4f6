/// Checkout endpoint
///
/// Creates a pending order for a course and opens its hosted-checkout
/// payment intent.
///
/// # Endpoint
///
/// `POST /api/orders`
///
/// # Example Request
///
/// ```json
/// {
///   "courseId": "c1",
///   "userId": "u1",
///   "amount": 19990,
///   "paymentMethod": "pix",
///   "userEmail": "a@b.com",
///   "userName": "A"
/// }
/// ```
///
/// # Example Response
///
/// ```json
/// {
///   "orderId": "550e8400-e29b-41d4-a716-446655440000",
///   "preferenceId": "123456789-0a1b2c3d",
///   "initPoint": "https://www.mercadopago.com.br/checkout/v1/redirect?pref_id=...",
///   "sandboxInitPoint": "https://sandbox.mercadopago.com.br/checkout/v1/redirect?pref_id=..."
/// }
/// ```
///
/// # Errors
///
/// - 400 Bad Request: body is not valid JSON for this shape
/// - 404 Not Found: unknown course
/// - 422 Unprocessable Entity: validation errors
/// - 500 Internal Server Error: gateway or database failure

use crate::app::AppState;
use crate::error::ApiResult;
use axum::{extract::State, Json};
use coursepay_shared::checkout::{CheckoutRequest, CheckoutResponse};

/// Checkout handler
pub async fn create_order(
    State(state): State<AppState>,
    Json(request): Json<CheckoutRequest>,
) -> ApiResult<Json<CheckoutResponse>> {
    let response = state.checkout.create_order(request).await?;
    Ok(Json(response))
}
