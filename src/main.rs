use std::sync::Arc;

use clap::Parser;
use tower_http::trace::TraceLayer;
use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt};

use till::config::Config;
use till::db::{create_pool, init_db, queries, AppState};
use till::handlers;
use till::models::CreateAccount;
use till::notify::BalanceEvents;
use till::payments::{ProcessorConfig, StripeClient};

#[derive(Parser, Debug)]
#[command(name = "till")]
#[command(about = "Credit-pack checkout, fulfillment and spend server")]
struct Cli {
    /// Seed the database with a dev account (dev mode only)
    #[arg(long)]
    seed: bool,
}

/// Seeds the database with a dev account for testing.
/// Only runs in dev mode and when the database is empty.
fn seed_dev_data(state: &AppState) {
    let conn = state.db.get().expect("Failed to get db connection for seeding");

    let count: i64 = conn
        .query_row("SELECT COUNT(*) FROM accounts", [], |row| row.get(0))
        .expect("Failed to count accounts");
    if count > 0 {
        tracing::info!("Database already has data, skipping seed");
        return;
    }

    let (account, api_key) = queries::create_account(
        &conn,
        &CreateAccount {
            email: "dev@till.local".to_string(),
        },
    )
    .expect("Failed to create dev account");

    tracing::info!("============================================");
    tracing::info!("DEV ACCOUNT SEEDED");
    tracing::info!("Account: {} ({})", account.id, account.email);
    tracing::info!("============================================");

    // Copy-paste friendly output (no log formatting)
    println!();
    println!("--- COPY FROM HERE ---");
    println!("  account_id: {}", account.id);
    println!("  api_key: {}", api_key);
    println!("--- END COPY ---");
    println!();
}

#[tokio::main]
async fn main() {
    let cli = Cli::parse();

    // Initialize tracing
    tracing_subscriber::registry()
        .with(
            tracing_subscriber::EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| "till=debug,tower_http=debug".into()),
        )
        .with(tracing_subscriber::fmt::layer())
        .init();

    // Load configuration
    let config = Config::from_env();

    if config.dev_mode {
        tracing::info!("Running in DEVELOPMENT mode");
    }
    if config.processor_secret_key.is_empty() {
        tracing::warn!("TILL_PROCESSOR_SECRET_KEY is not set; checkout will fail");
    }

    // Create database connection pool and initialize schema
    let db_pool = create_pool(&config.database_path).expect("Failed to create database pool");
    {
        let conn = db_pool.get().expect("Failed to get connection");
        init_db(&conn).expect("Failed to initialize database");
    }

    let processor = StripeClient::new(&ProcessorConfig {
        secret_key: config.processor_secret_key.clone(),
        webhook_secret: config.processor_webhook_secret.clone(),
        pack_price_id: config.pack_price_id.clone(),
    });

    let state = AppState {
        db: db_pool,
        processor: Arc::new(processor),
        base_url: config.base_url.clone(),
        success_page_url: config.success_page_url.clone(),
        cancel_page_url: config.cancel_page_url.clone(),
        credits_per_pack: config.credits_per_pack,
        balance_events: BalanceEvents::default(),
    };

    // Seed dev data if --seed flag is passed (only in dev mode)
    if cli.seed {
        if !config.dev_mode {
            tracing::warn!("--seed flag ignored: not in dev mode (set TILL_ENV=dev)");
        } else {
            seed_dev_data(&state);
        }
    }

    // Build the application router
    let app = handlers::router(config.rate_limit)
        .layer(TraceLayer::new_for_http())
        .with_state(state);

    // Start the server
    let addr = config.addr();
    let listener = tokio::net::TcpListener::bind(&addr)
        .await
        .expect("Failed to bind to address");

    tracing::info!("Till server listening on {}", addr);

    // Use into_make_service_with_connect_info to enable IP-based rate limiting
    axum::serve(
        listener,
        app.into_make_service_with_connect_info::<std::net::SocketAddr>(),
    )
    .with_graceful_shutdown(shutdown_signal())
    .await
    .expect("Failed to start server");
}

async fn shutdown_signal() {
    tokio::signal::ctrl_c()
        .await
        .expect("Failed to install Ctrl+C handler");
    tracing::info!("Shutdown signal received, stopping server...");
}
