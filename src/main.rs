use anyhow::{Context, Result};
use blockheat::api::{create_app, QueryAppState, WsAppState};
use blockheat::config::{self, DEFAULT_CONFIG_PATH};
use blockheat::state::{MutationGateway, StateBroadcaster};
use blockheat::store::{BlockStore, SqliteBlockStore};
use blockheat::subscription::SubscriberRegistry;
use blockheat::thermal::TickCoordinator;
use std::path::PathBuf;
use std::sync::Arc;
use tracing::info;

#[tokio::main]
async fn main() -> Result<()> {
    // Initialize tracing subscriber
    tracing_subscriber::fmt()
        .with_env_filter(
            tracing_subscriber::EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| "blockheat=info".into()),
        )
        .init();

    info!("Blockheat starting...");

    let config_path = std::env::var("BLOCKHEAT_CONFIG")
        .map(PathBuf::from)
        .unwrap_or_else(|_| PathBuf::from(DEFAULT_CONFIG_PATH));
    let config = config::load_or_default(&config_path)?;

    info!(
        config = %config_path.display(),
        store = %config.store.path,
        listen = %config.server.listen_addr(),
        tick_interval_ms = config.tick.interval_ms,
        tick_policy = ?config.tick.policy,
        "Configuration loaded"
    );

    // Store failure is fatal: never serve without it
    let store: Arc<dyn BlockStore> = Arc::new(
        SqliteBlockStore::new(&config.store.path)
            .context("Failed to initialize block store")?,
    );
    store
        .read_snapshot()
        .await
        .context("Block store is not readable")?;
    info!("Block store initialized");

    let gateway = MutationGateway::new(Arc::clone(&store));
    let subscribers = Arc::new(SubscriberRegistry::new());

    let broadcaster = Arc::new(StateBroadcaster::new(
        Arc::clone(&store),
        config.broadcast.channel_capacity,
    ));
    let broadcaster_handle = broadcaster.spawn();

    let coordinator = Arc::new(TickCoordinator::new(Arc::clone(&store), config.tick.clone()));
    let tick_handle = tokio::spawn(coordinator.run_tick_loop());

    let ws_state = Arc::new(WsAppState {
        broadcaster: Arc::clone(&broadcaster),
        gateway,
        subscribers: Arc::clone(&subscribers),
    });
    let query_state = Arc::new(QueryAppState {
        store: Arc::clone(&store),
        subscribers,
    });
    let app = create_app(ws_state, query_state);

    let listen_addr = config.server.listen_addr();
    let listener = tokio::net::TcpListener::bind(&listen_addr)
        .await
        .with_context(|| format!("Failed to bind {}", listen_addr))?;
    info!(addr = %listen_addr, "Listening");

    let server_handle = tokio::spawn(async move {
        if let Err(e) = axum::serve(listener, app).await {
            tracing::error!(error = %e, "HTTP server error");
        }
    });

    // Wait for shutdown signal
    tokio::signal::ctrl_c()
        .await
        .context("Failed to listen for ctrl_c signal")?;
    info!("Shutdown signal received");

    server_handle.abort();
    tick_handle.abort();
    broadcaster_handle.abort();
    info!("Blockheat stopped");

    Ok(())
}
