/// API route handlers
///
/// - `health`: Health check endpoint
/// - `orders`: Checkout
/// - `webhooks`: Gateway payment notifications

pub mod health;
pub mod orders;
pub mod webhooks;
