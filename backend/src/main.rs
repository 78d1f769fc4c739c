//! LiveCode Backend
//!
//! Authentication service for the LiveCode API.
//!
//! ## Architecture
//!
//! The backend follows a layered architecture:
//! - Routes: HTTP request handling, validation and rate limiting
//! - Services: credential flows (login, registration, refresh)
//! - Auth: password hashing and token issuance/verification
//! - Repositories: user storage behind the `UserStore` trait

use anyhow::Result;
use livecode_backend::{
    config::{self, StoreKind},
    db,
    repositories::{InMemoryUserStore, PgUserStore, UserStore},
    routes,
    state::AppState,
    telemetry,
};
use std::net::SocketAddr;
use std::sync::Arc;
use std::time::Duration;
use tokio::signal;
use tracing::{debug, error, info, warn};
use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt};

/// How often idle rate limiter buckets are swept
const LIMITER_PRUNE_INTERVAL: Duration = Duration::from_secs(60);

#[tokio::main]
async fn main() -> Result<()> {
    // Load environment variables from .env file
    dotenvy::dotenv().ok();

    // Initialize tracing
    init_tracing();

    // Load configuration
    let config = config::AppConfig::load()?;

    info!(
        version = env!("CARGO_PKG_VERSION"),
        env = if config::AppConfig::is_production() { "production" } else { "development" },
        store = ?config.store,
        "Starting LiveCode backend"
    );

    // Refuse to start on a bad configuration, before anything binds
    if let Err(e) = config.validate() {
        error!("Configuration error: {:#}", e);
        return Err(e);
    }
    if config::AppConfig::is_production()
        && (config.database.url.contains("localhost") || config.database.url.contains("127.0.0.1"))
    {
        warn!("Database URL contains localhost - ensure this is intentional for production");
    }

    let store = connect_store(&config).await?;

    let mut state = AppState::new(store, config.clone())?;
    if config.metrics.enabled {
        state = state.with_metrics(telemetry::install_recorder()?);
    }

    spawn_limiter_pruning(state.clone());

    // Build application
    let app = routes::create_router(state);

    // Start server
    let addr = format!("{}:{}", config.server.host, config.server.port);
    info!(address = %addr, "Server listening");

    let listener = tokio::net::TcpListener::bind(&addr).await?;

    // Peer addresses feed the rate limiter keys
    axum::serve(
        listener,
        app.into_make_service_with_connect_info::<SocketAddr>(),
    )
    .with_graceful_shutdown(shutdown_signal())
    .await?;

    info!("Server shutdown complete");
    Ok(())
}

/// Build the configured user store
async fn connect_store(config: &config::AppConfig) -> Result<Arc<dyn UserStore>> {
    match config.store {
        StoreKind::Postgres => {
            info!("Connecting to database...");
            let pool =
                db::create_pool(&config.database.url, config.database.max_connections).await?;

            // Skip in production; migrations run as a separate job there
            if !config::AppConfig::is_production() {
                db::run_migrations(&pool).await?;
            }

            Ok(Arc::new(PgUserStore::new(pool)))
        }
        StoreKind::Memory => {
            warn!("Using in-memory user store; accounts are lost on restart");
            Ok(Arc::new(InMemoryUserStore::new()))
        }
    }
}

/// Periodically drop buckets that have refilled to capacity
fn spawn_limiter_pruning(state: AppState) {
    tokio::spawn(async move {
        let mut interval = tokio::time::interval(LIMITER_PRUNE_INTERVAL);
        loop {
            interval.tick().await;
            let pruned = state.limiters.prune_idle();
            if pruned > 0 {
                debug!(pruned, "Pruned idle rate limiter buckets");
            }
        }
    });
}

/// Initialize tracing/logging
fn init_tracing() {
    let env_filter = tracing_subscriber::EnvFilter::try_from_default_env().unwrap_or_else(|_| {
        if config::AppConfig::is_production() {
            "livecode_backend=info,tower_http=info".into()
        } else {
            "livecode_backend=debug,tower_http=debug,sqlx=warn".into()
        }
    });

    let subscriber = tracing_subscriber::registry().with(env_filter);

    if config::AppConfig::is_production() {
        // JSON logging for production (better for log aggregation)
        subscriber
            .with(tracing_subscriber::fmt::layer().json())
            .init();
    } else {
        // Pretty logging for development
        subscriber
            .with(tracing_subscriber::fmt::layer().pretty())
            .init();
    }
}

/// Graceful shutdown signal handler
async fn shutdown_signal() {
    let ctrl_c = async {
        if let Err(e) = signal::ctrl_c().await {
            error!("Failed to install Ctrl+C handler: {}", e);
            std::future::pending::<()>().await;
        }
    };

    #[cfg(unix)]
    let terminate = async {
        match signal::unix::signal(signal::unix::SignalKind::terminate()) {
            Ok(mut sigterm) => {
                sigterm.recv().await;
            }
            Err(e) => {
                error!("Failed to install SIGTERM handler: {}", e);
                std::future::pending::<()>().await;
            }
        }
    };

    #[cfg(not(unix))]
    let terminate = std::future::pending::<()>();

    tokio::select! {
        _ = ctrl_c => {
            info!("Received Ctrl+C, starting graceful shutdown");
        }
        _ = terminate => {
            info!("Received SIGTERM, starting graceful shutdown");
        }
    }
}
