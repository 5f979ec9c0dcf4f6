//! # CoursePay Worker
//!
//! Runs the enrollment repair sweeper against the shared PostgreSQL
//! database until ctrl-c.
//!
//! ## Usage
//!
//! ```bash
//! cargo run -p coursepay-worker
//! ```

use coursepay_shared::db::{
    migrations::run_migrations,
    pool::{close_pool, create_pool, DatabaseConfig},
};
use coursepay_shared::store::PgStore;
use coursepay_worker::config::WorkerConfig;
use coursepay_worker::sweeper::{EnrollmentSweeper, SweeperConfig};
use std::sync::Arc;
use tokio_util::sync::CancellationToken;
use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt};

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    let config = WorkerConfig::from_env()?;

    tracing_subscriber::registry()
        .with(
            tracing_subscriber::EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| "coursepay_worker=debug,coursepay_shared=info".into()),
        )
        .with(tracing_subscriber::fmt::layer())
        .init();

    tracing::info!(
        "CoursePay Worker v{} starting...",
        env!("CARGO_PKG_VERSION")
    );

    let pool = create_pool(DatabaseConfig {
        url: config.database_url.clone(),
        max_connections: config.max_connections,
        ..Default::default()
    })
    .await?;
    run_migrations(&pool).await?;

    let sweeper = EnrollmentSweeper::new(
        Arc::new(PgStore::new(pool.clone())),
        SweeperConfig {
            interval: config.sweep_interval,
            batch_size: config.batch_size,
        },
    );

    let shutdown = CancellationToken::new();
    let signal_token = shutdown.clone();
    tokio::spawn(async move {
        if let Err(e) = tokio::signal::ctrl_c().await {
            tracing::error!("Failed to listen for shutdown signal: {}", e);
        }
        tracing::info!("Shutdown signal received, finishing current sweep...");
        signal_token.cancel();
    });

    sweeper.run(shutdown).await;

    close_pool(pool).await;
    tracing::info!("Worker stopped");

    Ok(())
}
