use sqlx::migrate::Migrator;
use std::net::SocketAddr;
use std::path::Path;
use tokio::net::TcpListener;
use tracing_subscriber::{EnvFilter, layer::SubscriberExt, util::SubscriberInitExt};

use checkout_core::config::Config;
use checkout_core::gateway::GatewayClient;
use checkout_core::services::{ProductService, TransactionService, run_reconciler};
use checkout_core::{AppState, create_app, db};

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    let config = Config::from_env()?;

    // Setup logging
    tracing_subscriber::registry()
        .with(EnvFilter::try_from_default_env().unwrap_or_else(|_| "info".into()))
        .with(tracing_subscriber::fmt::layer())
        .init();

    // Database pool
    let pool = db::create_pool(&config).await?;

    // Run migrations
    let migrator = Migrator::new(Path::new("./migrations")).await?;
    migrator.run(&pool).await?;
    tracing::info!("Database migrations completed");

    // Payment gateway client
    let gateway = GatewayClient::new(
        config.gateway_api_url.clone(),
        config.gateway_private_key.clone(),
    );
    tracing::info!("Payment gateway client initialized with URL: {}", config.gateway_api_url);

    let products = ProductService::new(pool.clone());
    let transactions = TransactionService::new(
        pool.clone(),
        gateway,
        products.clone(),
        config.gateway_integrity_key.clone(),
        config.currency.clone(),
    );

    // Background sweep for transactions stuck in PENDING
    tokio::spawn(run_reconciler(
        transactions.clone(),
        config.reconciler_interval_secs,
    ));

    let app = create_app(AppState {
        db: pool,
        products,
        transactions,
    });

    let addr = SocketAddr::from(([0, 0, 0, 0], config.server_port));
    tracing::info!("listening on {}", addr);

    let listener = TcpListener::bind(addr).await?;
    axum::serve(listener, app).await?;

    Ok(())
}
