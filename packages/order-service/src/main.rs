use std::net::SocketAddr;
use std::sync::Arc;

use order_service::api;
use order_service::clients::{BalanceClient, InventoryClient};
use order_service::commit::OrderCommitter;
use order_service::config::Config;
use order_service::db;
use tradeline_coordination::{LockManager, MemoryStore};

fn main() -> eyre::Result<()> {
    // Install color-eyre for better error reporting
    color_eyre::install()?;

    // Run the async main
    tokio::runtime::Builder::new_multi_thread()
        .enable_all()
        .build()?
        .block_on(async_main())
}

async fn async_main() -> eyre::Result<()> {
    init_logging();

    tracing::info!("Starting Tradeline Order Service");

    let config = Config::load()?;
    tracing::info!(
        bind = %config.bind,
        user = %config.services.user_url,
        inventory = %config.services.inventory_url,
        "Configuration loaded"
    );

    // Connect to database
    let db = db::create_pool(&config.database.url).await?;
    tracing::info!("Database connected");

    // Run migrations
    db::run_migrations(&db).await?;
    tracing::info!("Database migrations complete");

    let locks = LockManager::new(Arc::new(MemoryStore::new()));
    let balance = BalanceClient::new(&config.services.user_url, &config.internal.token)?;
    let inventory = InventoryClient::new(&config.services.inventory_url)?;
    let committer = Arc::new(OrderCommitter::new(
        db.clone(),
        locks,
        balance,
        inventory,
        &config.commit,
    ));

    let state = api::AppState { db, committer };
    let app = api::build_router(state);

    // Create shutdown channel
    let (shutdown_tx, mut shutdown_rx) = tokio::sync::mpsc::channel::<()>(1);

    // Setup signal handlers
    tokio::spawn(async move {
        wait_for_shutdown_signal().await;
        let _ = shutdown_tx.send(()).await;
    });

    let addr: SocketAddr = config.bind.parse()?;
    tracing::info!("Order service listening on {}", addr);

    let listener = tokio::net::TcpListener::bind(addr).await?;
    axum::serve(listener, app)
        .with_graceful_shutdown(async move {
            let _ = shutdown_rx.recv().await;
        })
        .await?;

    tracing::info!("Tradeline Order Service stopped");
    Ok(())
}

/// Initialize tracing/logging with structured output
fn init_logging() {
    use tracing_subscriber::{fmt, prelude::*, EnvFilter};

    let filter = EnvFilter::try_from_default_env()
        .unwrap_or_else(|_| EnvFilter::new("info,tradeline_order_service=debug"));

    tracing_subscriber::registry()
        .with(fmt::layer().with_target(true))
        .with(filter)
        .init();
}

/// Wait for shutdown signals (SIGINT/SIGTERM)
async fn wait_for_shutdown_signal() {
    use tokio::signal;

    let ctrl_c = async {
        signal::ctrl_c()
            .await
            .expect("Failed to install Ctrl+C handler");
    };

    #[cfg(unix)]
    let terminate = async {
        signal::unix::signal(signal::unix::SignalKind::terminate())
            .expect("Failed to install signal handler")
            .recv()
            .await;
    };

    #[cfg(not(unix))]
    let terminate = std::future::pending::<()>();

    tokio::select! {
        _ = ctrl_c => {
            tracing::info!("Received Ctrl+C, initiating shutdown");
        }
        _ = terminate => {
            tracing::info!("Received SIGTERM, initiating shutdown");
        }
    }
}
