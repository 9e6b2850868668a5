use std::net::SocketAddr;
use std::sync::Arc;

use tradeline_coordination::{LockManager, MemoryStore};
use user_service::api;
use user_service::config::Config;
use user_service::db;
use user_service::ledger::Ledger;

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

    tracing::info!("Starting Tradeline User Service");

    let config = Arc::new(Config::load()?);
    tracing::info!(bind = %config.bind, "Configuration loaded");

    // Connect to database
    let db = db::create_pool(&config.database.url).await?;
    tracing::info!("Database connected");

    // Run migrations
    db::run_migrations(&db).await?;
    tracing::info!("Database migrations complete");

    let locks = LockManager::new(Arc::new(MemoryStore::new()));
    let ledger = Arc::new(Ledger::new(db.clone(), locks, &config.ledger));

    let state = api::AppState {
        db,
        ledger,
        config: config.clone(),
    };
    let app = api::build_router(state);

    // Create shutdown channel
    let (shutdown_tx, mut shutdown_rx) = tokio::sync::mpsc::channel::<()>(1);

    // Setup signal handlers
    tokio::spawn(async move {
        wait_for_shutdown_signal().await;
        let _ = shutdown_tx.send(()).await;
    });

    let addr: SocketAddr = config.bind.parse()?;
    tracing::info!("User service listening on {}", addr);

    let listener = tokio::net::TcpListener::bind(addr).await?;
    axum::serve(listener, app)
        .with_graceful_shutdown(async move {
            let _ = shutdown_rx.recv().await;
        })
        .await?;

    tracing::info!("Tradeline User Service stopped");
    Ok(())
}

/// Initialize tracing/logging with structured output
fn init_logging() {
    use tracing_subscriber::{fmt, prelude::*, EnvFilter};

    let filter = EnvFilter::try_from_default_env()
        .unwrap_or_else(|_| EnvFilter::new("info,tradeline_user_service=debug"));

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
