//! Paygate Server
//!
//! Ingests callbacks from the blockchain-processing engine and delivers
//! signed webhooks to merchant endpoints.

mod api;
mod config;
mod server;
mod shutdown;
mod state;

use clap::Parser;
use config::{ConfigLoader, get_database_url};
use paygate_core::events::Listener;
use paygate_core::framework::postgres::PgStorage;
use paygate_core::processors::{
    CallbackProcessor, InvoiceProcessor, ReceiptLogger, WebhookDispatcher, WebhookQueue,
    WebhookSender,
};
use paygate_core::utils::InFlightLocks;
use server::{build_router, run_server};
use shutdown::shutdown_channel;
use sqlx::postgres::PgPoolOptions;
use state::AppState;
use std::net::SocketAddr;
use std::path::PathBuf;
use std::sync::Arc;
use tracing_subscriber::{EnvFilter, layer::SubscriberExt, util::SubscriberInitExt};

/// Paygate - crypto payment callback and webhook backend
#[derive(Parser, Debug)]
#[command(name = "paygate-server")]
#[command(version, about, long_about = None)]
struct Args {
    /// Path to the configuration file
    #[arg(short, long, env = "PAYGATE_CONFIG", default_value = "./paygate-config.toml")]
    config: PathBuf,

    /// Override the listen address (e.g., 0.0.0.0:3000)
    #[arg(short, long)]
    listen: Option<SocketAddr>,

    /// Run database migrations on startup
    #[arg(long, default_value = "false")]
    migrate: bool,
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    init_tracing();

    let args = Args::parse();

    tracing::info!("Starting paygate-server v{}", env!("CARGO_PKG_VERSION"));

    let config = ConfigLoader::new(&args.config, args.listen)
        .load()
        .map_err(|e| {
            tracing::error!("Failed to load configuration: {}", e);
            e
        })?;
    tracing::info!("Configuration loaded from {:?}", args.config);

    let database_url = get_database_url().map_err(|e| {
        tracing::error!("DATABASE_URL environment variable not set");
        e
    })?;

    tracing::info!("Connecting to database...");
    let db_pool = PgPoolOptions::new()
        .max_connections(10)
        .connect(&database_url)
        .await
        .map_err(|e| {
            tracing::error!("Failed to connect to database: {}", e);
            e
        })?;
    tracing::info!("Database connection established");

    if args.migrate {
        tracing::info!("Running database migrations...");
        sqlx::migrate!("../migrations")
            .run(&db_pool)
            .await
            .map_err(|e| {
                tracing::error!("Failed to run migrations: {}", e);
                e
            })?;
        tracing::info!("Migrations completed successfully");
    }

    let storage = Arc::new(PgStorage::new(db_pool.clone()));

    let listener = Arc::new(Listener::new());
    Arc::new(WebhookDispatcher::new()).register(&listener).await;
    Arc::new(ReceiptLogger).register(&listener).await;

    let sender = Arc::new(WebhookSender::new(storage.clone(), &config.webhooks)?);
    let queue = WebhookQueue::new(
        sender.clone(),
        Arc::new(InFlightLocks::new()),
        &config.webhooks,
    );
    let (shutdown_tx, shutdown_rx) = shutdown_channel();
    let queue_handle = tokio::spawn(queue.run(shutdown_rx));

    let state = AppState {
        storage: storage.clone(),
        callbacks: Arc::new(CallbackProcessor::new(
            storage.clone(),
            listener.clone(),
            Arc::new(config.rates),
        )),
        invoices: Arc::new(InvoiceProcessor::new(storage, listener)),
        sender,
        admin_token: Arc::new(config.admin_token),
    };

    let router = build_router(state);

    tracing::info!("Starting HTTP server on {}", config.listen);
    let result = run_server(router, config.listen).await;

    // Stop polling; deliveries already spawned finish on their own.
    if shutdown_tx.send(true).is_err() {
        tracing::debug!("Webhook queue already stopped");
    }
    if let Err(e) = queue_handle.await {
        tracing::error!("Webhook queue task failed: {}", e);
    }

    tracing::info!("Closing database connections...");
    db_pool.close().await;
    tracing::info!("Server shutdown complete");

    result.map_err(Into::into)
}

/// Initialize the tracing subscriber with environment-based filtering.
fn init_tracing() {
    let filter = EnvFilter::try_from_default_env()
        .unwrap_or_else(|_| EnvFilter::new("info,sqlx=warn,tower_http=debug"));

    tracing_subscriber::registry()
        .with(filter)
        .with(tracing_subscriber::fmt::layer())
        .init();
}
