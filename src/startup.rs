//! Application Startup
//!
//! Wires the store, event bus, services and hub together and runs the HTTP
//! server with graceful shutdown.

use std::net::SocketAddr;
use std::sync::Arc;

use anyhow::{Context, Result};
use axum::Router;
use tokio::net::TcpListener;
use tokio::task::JoinHandle;
use tokio_util::sync::CancellationToken;
use tower::ServiceBuilder;
use tower_http::trace::TraceLayer;

use crate::application::event_bus::EventBus;
use crate::application::services::{CommandService, MessageCleaner, QueryService, RelationQuery};
use crate::config::Settings;
use crate::domain::Store;
use crate::infrastructure::database::{self, PgStore};
use crate::infrastructure::memory::MemoryStore;
use crate::presentation::http::create_router;
use crate::presentation::http::handlers::health;
use crate::presentation::middleware::create_cors_layer;
use crate::presentation::websocket::{Hub, HubHandle};

/// Application state shared across handlers
#[derive(Clone)]
pub struct AppState {
    pub hub: HubHandle,
    pub commands: Arc<CommandService>,
    pub queries: Arc<QueryService>,
    pub store: Arc<dyn Store>,
    pub settings: Arc<Settings>,
}

/// Background tasks started alongside the state.
pub struct Background {
    cancel: CancellationToken,
    bus: Arc<EventBus>,
    hub_task: JoinHandle<()>,
    cleaner: MessageCleaner,
}

impl Background {
    /// Token whose cancellation stops every background task.
    pub fn cancel_token(&self) -> CancellationToken {
        self.cancel.clone()
    }

    pub fn bus(&self) -> &Arc<EventBus> {
        &self.bus
    }

    /// Stop the hub and the cleaner, then close the bus.
    pub async fn shutdown(self) {
        self.cancel.cancel();
        if let Err(e) = self.hub_task.await {
            tracing::error!(error = %e, "Hub task failed");
        }
        self.cleaner.stop().await;
        self.bus.shutdown();
        tracing::info!("Background tasks stopped");
    }
}

/// Build the shared state over `store` and start the hub and message cleaner.
///
/// Must be called from within a Tokio runtime.
pub fn build_state(settings: Settings, store: Arc<dyn Store>) -> Result<(AppState, Background)> {
    let cancel = CancellationToken::new();
    let bus = Arc::new(EventBus::new(settings.hub.event_bus_capacity));

    let commands = Arc::new(CommandService::new(store.clone(), bus.clone()));
    let queries = Arc::new(QueryService::new(store.clone()));
    let relations: Arc<dyn RelationQuery> = queries.clone();

    let (hub, handle) = Hub::new(
        commands.clone(),
        relations,
        bus.clone(),
        settings.hub.channel_capacity,
    )
    .context("Failed to create hub")?;
    let hub_task = tokio::spawn(hub.listen(cancel.child_token()));

    let cleaner = commands
        .start_message_cleaner(cancel.clone())
        .context("Failed to start message cleaner")?;

    let state = AppState {
        hub: handle,
        commands,
        queries,
        store,
        settings: Arc::new(settings),
    };
    let background = Background {
        cancel,
        bus,
        hub_task,
        cleaner,
    };
    Ok((state, background))
}

/// Router with tracing and CORS layers applied
pub fn build_router(state: AppState) -> Router {
    let cors = create_cors_layer(&state.settings.cors);
    create_router(state).layer(
        ServiceBuilder::new()
            .layer(TraceLayer::new_for_http())
            .layer(cors),
    )
}

/// Application instance
pub struct Application {
    listener: TcpListener,
    router: Router,
    background: Background,
}

impl Application {
    /// Build the application from settings
    pub async fn build(settings: Settings) -> Result<Self> {
        health::init_server_start();

        let store: Arc<dyn Store> = match settings.database.url.as_deref() {
            Some(url) if settings.uses_database() => {
                let pool = database::create_pool(&settings.database, url)
                    .await
                    .context("Failed to create database pool")?;
                database::run_migrations(&pool)
                    .await
                    .context("Failed to run migrations")?;
                tracing::info!("Database connection pool created");
                Arc::new(PgStore::new(pool))
            }
            _ => {
                tracing::warn!("No database configured, using in-memory store");
                Arc::new(MemoryStore::new())
            }
        };

        let addr: SocketAddr = settings
            .server_addr()
            .parse()
            .context("Invalid server address")?;

        let (state, background) = build_state(settings, store)?;
        let router = build_router(state);

        let listener = TcpListener::bind(addr).await?;
        tracing::info!("Listening on {}", addr);

        Ok(Self {
            listener,
            router,
            background,
        })
    }

    /// Run the server until Ctrl-C, then stop the background tasks
    pub async fn run_until_stopped(self) -> Result<()> {
        let cancel = self.background.cancel_token();
        axum::serve(self.listener, self.router)
            .with_graceful_shutdown(shutdown_signal(cancel))
            .await?;

        self.background.shutdown().await;
        Ok(())
    }

    /// Get the bound address
    pub fn local_addr(&self) -> std::io::Result<SocketAddr> {
        self.listener.local_addr()
    }
}

/// Resolves on Ctrl-C or cancellation. Cancels `cancel` so that open
/// WebSocket connections are closed by the hub.
async fn shutdown_signal(cancel: CancellationToken) {
    tokio::select! {
        result = tokio::signal::ctrl_c() => {
            if let Err(e) = result {
                tracing::error!(error = %e, "Failed to listen for Ctrl-C");
            }
            tracing::info!("Shutdown signal received");
        }
        _ = cancel.cancelled() => {}
    }
    cancel.cancel();
}
