/// Application state and router builder
///
/// This module defines the shared application state and provides
/// a function to build the Axum router with all routes and middleware.
///
/// # Example
///
/// ```no_run
/// use coursepay_api::{app::{build_router, AppState}, config::Config};
/// use coursepay_shared::gateway::MockGateway;
/// use coursepay_shared::notify::LogNotifier;
/// use coursepay_shared::store::InMemoryStore;
/// use std::sync::Arc;
///
/// # async fn example() -> anyhow::Result<()> {
/// let config = Config::from_env()?;
/// let state = AppState::new(
///     config,
///     Arc::new(InMemoryStore::new()),
///     Arc::new(MockGateway::new()),
///     Arc::new(LogNotifier),
/// );
/// let app = build_router(state);
/// # Ok(())
/// # }
/// ```

use crate::config::Config;
use axum::{
    http::{header, HeaderValue, Method},
    routing::{get, post},
    Router,
};
use coursepay_shared::checkout::{CheckoutConfig, CheckoutService};
use coursepay_shared::gateway::PaymentGateway;
use coursepay_shared::notify::Notifier;
use coursepay_shared::reconcile::{ReconcilerConfig, WebhookReconciler};
use coursepay_shared::signature::SignatureVerifier;
use coursepay_shared::store::Datastore;
use std::sync::Arc;
use tower_http::{
    cors::CorsLayer,
    trace::{DefaultMakeSpan, DefaultOnResponse, TraceLayer},
};
use tracing::Level;

/// Shared application state
///
/// This is cloned for each request handler via Axum's `State` extractor.
/// Every field is reference-counted, so cloning is cheap.
#[derive(Clone)]
pub struct AppState {
    /// Datastore (health checks)
    pub store: Arc<dyn Datastore>,

    /// Order creation
    pub checkout: Arc<CheckoutService>,

    /// Webhook reconciliation
    pub reconciler: Arc<WebhookReconciler>,

    /// Webhook signature verifier, when a secret is configured
    pub verifier: Option<SignatureVerifier>,

    /// Application configuration
    pub config: Arc<Config>,
}

impl AppState {
    /// Wires the services from configuration and collaborators
    pub fn new(
        config: Config,
        store: Arc<dyn Datastore>,
        gateway: Arc<dyn PaymentGateway>,
        notifier: Arc<dyn Notifier>,
    ) -> Self {
        let checkout = CheckoutService::new(
            store.clone(),
            gateway.clone(),
            notifier.clone(),
            CheckoutConfig {
                app_url: config.urls.app_url.clone(),
                api_url: config.urls.api_url.clone(),
            },
        );

        let reconciler = WebhookReconciler::new(
            store.clone(),
            gateway,
            notifier,
            ReconcilerConfig {
                gateway_timeout: config.mercadopago.timeout,
                app_url: config.urls.app_url.clone(),
            },
        );

        let verifier = config
            .mercadopago
            .webhook_secret
            .as_deref()
            .map(|secret| SignatureVerifier::new(secret).with_tolerance(config.mercadopago.webhook_tolerance));

        Self {
            store,
            checkout: Arc::new(checkout),
            reconciler: Arc::new(reconciler),
            verifier,
            config: Arc::new(config),
        }
    }
}

/// Builds the complete Axum router with all routes and middleware
///
/// # Architecture
///
/// ```text
/// /api
/// ├── GET  /health                  # Health check
/// ├── POST /orders                  # Checkout (buyer-facing)
/// └── POST /webhooks/mercadopago    # Payment notifications (gateway-facing)
/// ```
///
/// # Middleware Stack
///
/// Applied in order (bottom to top):
/// 1. Logging (tower-http TraceLayer)
/// 2. CORS (tower-http CorsLayer)
pub fn build_router(state: AppState) -> Router {
    use crate::routes;

    let api_routes = Router::new()
        .route("/health", get(routes::health::health_check))
        .route("/orders", post(routes::orders::create_order))
        .route("/webhooks/mercadopago", post(routes::webhooks::mercadopago_webhook));

    Router::new()
        .nest("/api", api_routes)
        .layer(
            TraceLayer::new_for_http()
                .make_span_with(DefaultMakeSpan::new().level(Level::INFO))
                .on_response(DefaultOnResponse::new().level(Level::INFO)),
        )
        .layer(cors_layer(&state.config.api.cors_origins))
        .with_state(state)
}

/// CORS policy: permissive for `*`, otherwise the listed origins
fn cors_layer(origins: &[String]) -> CorsLayer {
    if origins.iter().any(|origin| origin == "*") {
        // Development mode: permissive CORS
        return CorsLayer::permissive();
    }

    let origins: Vec<HeaderValue> = origins
        .iter()
        .filter_map(|origin| origin.parse().ok())
        .collect();

    CorsLayer::new()
        .allow_origin(origins)
        .allow_methods([Method::GET, Method::POST, Method::OPTIONS])
        .allow_headers([header::CONTENT_TYPE])
        .max_age(std::time::Duration::from_secs(3600))
}
