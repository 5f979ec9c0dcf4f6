//! # CoursePay API Server
//!
//! Serves checkout and Mercado Pago webhook ingress for the course store.
//!
//! ## Usage
//!
//! ```bash
//! cargo run -p coursepay-api
//! ```

use coursepay_api::{
    app::{build_router, AppState},
    config::Config,
};
use coursepay_shared::db::{
    migrations::run_migrations,
    pool::{close_pool, create_pool, DatabaseConfig},
};
use coursepay_shared::gateway::{MercadoPagoConfig, MercadoPagoGateway};
use coursepay_shared::notify::{LogNotifier, Notifier, ResendConfig, ResendNotifier};
use coursepay_shared::store::PgStore;
use std::sync::Arc;
use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt};

fn init_tracing() {
    let filter = tracing_subscriber::EnvFilter::try_from_default_env()
        .unwrap_or_else(|_| "coursepay_api=debug,coursepay_shared=debug,tower_http=debug".into());

    let registry = tracing_subscriber::registry().with(filter);
    if std::env::var("LOG_FORMAT").as_deref() == Ok("json") {
        registry.with(tracing_subscriber::fmt::layer().json()).init();
    } else {
        registry.with(tracing_subscriber::fmt::layer()).init();
    }
}

async fn shutdown_signal() {
    if let Err(e) = tokio::signal::ctrl_c().await {
        tracing::error!("Failed to listen for shutdown signal: {}", e);
    }
    tracing::info!("Shutdown signal received, draining connections...");
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    // Load .env before the filter reads RUST_LOG
    dotenvy::dotenv().ok();
    init_tracing();

    tracing::info!(
        "CoursePay API Server v{} starting...",
        env!("CARGO_PKG_VERSION")
    );

    let config = Config::from_env()?;

    let pool = create_pool(DatabaseConfig {
        url: config.database.url.clone(),
        max_connections: config.database.max_connections,
        ..Default::default()
    })
    .await?;
    run_migrations(&pool).await?;

    let gateway = MercadoPagoGateway::new(MercadoPagoConfig {
        access_token: config.mercadopago.access_token.clone(),
        api_base: config.mercadopago.api_base.clone(),
        timeout: config.mercadopago.timeout,
        statement_descriptor: config.mercadopago.statement_descriptor.clone(),
        intent_expiry: config.mercadopago.intent_expiry,
        ..Default::default()
    })?;

    let notifier: Arc<dyn Notifier> = match &config.email.resend_api_key {
        Some(api_key) => Arc::new(ResendNotifier::new(ResendConfig {
            api_key: api_key.clone(),
            from: config.email.from.clone(),
            ..Default::default()
        })?),
        None => {
            tracing::warn!("RESEND_API_KEY not set, emails will only be logged");
            Arc::new(LogNotifier)
        }
    };

    if config.mercadopago.webhook_secret.is_none() {
        tracing::warn!("MERCADOPAGO_WEBHOOK_SECRET not set, webhook signatures will not be verified");
    }

    let bind_address = config.bind_address();
    let state = AppState::new(
        config,
        Arc::new(PgStore::new(pool.clone())),
        Arc::new(gateway),
        notifier,
    );
    let app = build_router(state);

    let listener = tokio::net::TcpListener::bind(&bind_address).await?;
    tracing::info!("Server listening on http://{}", bind_address);

    axum::serve(listener, app)
        .with_graceful_shutdown(shutdown_signal())
        .await?;

    close_pool(pool).await;
    tracing::info!("Server stopped");

    Ok(())
}
