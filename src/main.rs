use std::sync::Arc;

use tokio::net::TcpListener;

use event_relay::auth;
use event_relay::config::{generate_config_template, Config};
use event_relay::db;
use event_relay::relay::dispatcher::Dispatcher;
use event_relay::relay::registry::RoomRegistry;
use event_relay::routes;
use event_relay::state::AppState;
use event_relay::store::{MessageStore, SqliteStore};

#[tokio::main]
async fn main() -> Result<(), Box<dyn std::error::Error>> {
    // Load config with layered precedence: defaults < TOML < env < CLI
    let config = Config::load()?;

    // Handle --generate-config: print template and exit
    if config.generate_config {
        print!("{}", generate_config_template());
        return Ok(());
    }

    // Initialize tracing/logging
    if config.json_logs {
        tracing_subscriber::fmt()
            .json()
            .with_env_filter(
                tracing_subscriber::EnvFilter::try_from_default_env()
                    .unwrap_or_else(|_| "event_relay=info".parse().unwrap()),
            )
            .init();
    } else {
        tracing_subscriber::fmt()
            .pretty()
            .with_env_filter(
                tracing_subscriber::EnvFilter::try_from_default_env()
                    .unwrap_or_else(|_| "event_relay=info".parse().unwrap()),
            )
            .init();
    }

    tracing::info!("event relay v{} starting", env!("CARGO_PKG_VERSION"));

    // Initialize SQLite database
    let db = db::init_db(&config.data_dir)?;

    // Load or generate JWT signing key (256-bit random, stored in data_dir)
    let jwt_secret = auth::load_or_generate_jwt_secret(&config.data_dir)?;

    let ws_config = config.ws.clone().unwrap_or_default();

    // Persistence collaborator behind the MessageStore trait
    let store: Arc<dyn MessageStore> = Arc::new(SqliteStore::new(db, config.cdn_base_url.clone()));

    // Room registry and the single fan-out dispatcher task
    let registry = Arc::new(RoomRegistry::new());
    let (inbound_tx, dispatcher) =
        Dispatcher::new(registry.clone(), ws_config.inbound_queue_capacity);
    tokio::spawn(dispatcher.run());

    let state = AppState {
        store,
        registry: registry.clone(),
        inbound_tx,
        jwt_secret,
        relay: ws_config.settings(),
    };

    let app = routes::build_router(state);

    // Bind and serve
    let addr = format!("{}:{}", config.bind_address, config.port);
    let listener = TcpListener::bind(&addr).await?;
    tracing::info!("Listening on {}", addr);

    axum::serve(listener, app)
        .with_graceful_shutdown(shutdown_signal(registry))
        .await?;

    Ok(())
}

/// Wait for ctrl-c, then close every registered connection so the write
/// tasks send Close frames and the read tasks unblock deterministically.
async fn shutdown_signal(registry: Arc<RoomRegistry>) {
    let _ = tokio::signal::ctrl_c().await;
    tracing::info!("shutdown signal received, closing connections");
    registry.close_all();
}
