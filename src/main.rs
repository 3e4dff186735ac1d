//! # Chat Hub
//!
//! Real-time chat backend.
//!
//! This is the application entry point that initializes:
//! - Tracing/logging subsystem
//! - Configuration loading
//! - Store (PostgreSQL or in-memory), event bus, hub and message cleaner
//! - HTTP/WebSocket server

use anyhow::Result;
use tracing::info;

use chat_hub::config::Settings;
use chat_hub::startup::Application;

#[tokio::main]
async fn main() -> Result<()> {
    chat_hub::telemetry::init_tracing();

    info!("Starting Chat Hub...");

    let settings = Settings::load()?;
    info!(
        host = %settings.server.host,
        port = %settings.server.port,
        environment = %settings.environment,
        database = settings.uses_database(),
        "Configuration loaded"
    );

    let application = Application::build(settings).await?;

    info!("Server ready to accept connections");
    application.run_until_stopped().await?;

    info!("Server stopped");
    Ok(())
}
