mod auth;
mod chat;
mod config;
mod rooms;
mod routes;
mod state;
mod ws;

use std::sync::Arc;
use std::time::Duration;
use tokio::net::TcpListener;

use chat::presence::PresenceTracker;
use chat::storage::StorageClient;
use config::{generate_config_template, Config};
use rooms::RoomIndex;
use ws::registry::ConnectionRegistry;

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
                    .unwrap_or_else(|_| "pulse_server=info".parse().unwrap()),
            )
            .init();
    } else {
        tracing_subscriber::fmt()
            .pretty()
            .with_env_filter(
                tracing_subscriber::EnvFilter::try_from_default_env()
                    .unwrap_or_else(|_| "pulse_server=info".parse().unwrap()),
            )
            .init();
    }

    tracing::info!("Pulse server v{} starting", env!("CARGO_PKG_VERSION"));

    if config.auth_secret == "change-me" {
        tracing::warn!("Using the default auth secret; set PULSE_AUTH_SECRET in production");
    }

    let storage = StorageClient::new(
        &config.storage_url,
        Duration::from_secs(config.storage_timeout_secs),
        config.storage_attempts,
        Duration::from_millis(config.storage_backoff_ms),
    );

    // Build application state
    let app_state = state::AppState {
        connections: Arc::new(ConnectionRegistry::new()),
        rooms: Arc::new(RoomIndex::new()),
        presence: Arc::new(PresenceTracker::new()),
        storage,
        auth_secret: config.auth_secret.clone().into_bytes(),
        strict_auth: config.strict_auth,
        auto_join_on_message: config.auto_join_on_message,
    };

    // Build router
    let app = routes::build_router(app_state);

    // Bind and serve
    let addr = format!("{}:{}", config.bind_address, config.port);
    let listener = TcpListener::bind(&addr).await?;
    tracing::info!("Listening on {}", addr);

    axum::serve(listener, app).await?;

    Ok(())
}
