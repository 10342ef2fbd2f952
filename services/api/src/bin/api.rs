//! services/api/src/bin/api.rs

use api_lib::{
    adapters::{db::DbAdapter, hosted_remote_factory, RemoteFactory},
    config::Config,
    error::ApiError,
    web::{app_router, sessions::SessionRegistry, state::AppState},
};
use sqlx::postgres::PgPoolOptions;
use std::sync::Arc;
use tracing::{info, warn};
use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt};
use vidshare_core::ProfileStore;

/// Prepares the hosted-service adapters, or returns `None` when the service is not configured.
async fn build_remote_factory(config: &Config) -> Result<Option<RemoteFactory>, ApiError> {
    let Some(remote) = config.remote.as_ref() else {
        warn!("SUPABASE_URL / SUPABASE_ANON_KEY not set; running with authentication disabled");
        return Ok(None);
    };

    let mut http = reqwest::Client::builder();
    if let Some(timeout) = config.http_timeout {
        http = http.timeout(timeout);
    }

    let profile_db: Option<Arc<dyn ProfileStore>> = match config.profile_database_url.as_ref() {
        Some(database_url) => {
            info!("Connecting to the profiles database...");
            let db_pool = PgPoolOptions::new()
                .max_connections(5)
                .connect(database_url)
                .await?;
            let db_adapter = DbAdapter::new(db_pool);
            info!("Running database migrations...");
            db_adapter.run_migrations().await?;
            info!("Database migrations complete.");
            Some(Arc::new(db_adapter) as Arc<dyn ProfileStore>)
        }
        None => None,
    };

    info!("Hosted service configured at {}", remote.url);
    Ok(Some(hosted_remote_factory(
        http.build()?,
        remote.url.clone(),
        remote.anon_key.clone(),
        profile_db,
    )))
}

async fn shutdown_signal() {
    if let Err(e) = tokio::signal::ctrl_c().await {
        warn!("Failed to listen for the shutdown signal: {}", e);
        std::future::pending::<()>().await;
    }
    info!("Shutdown signal received");
}

#[tokio::main]
async fn main() -> Result<(), ApiError> {
    // --- 1. Load Configuration & Set Up Logging ---
    let config = Arc::new(Config::from_env()?);
    tracing_subscriber::registry()
        .with(tracing_subscriber::EnvFilter::new(config.log_level.to_string()))
        .with(tracing_subscriber::fmt::layer())
        .init();
    info!("Configuration loaded. Starting server...");

    // --- 2. Prepare the Per-Browser Session Registry ---
    let factory = build_remote_factory(&config).await?;
    let sessions = Arc::new(SessionRegistry::new(factory));

    // --- 3. Build the Shared AppState & Router ---
    let app_state = Arc::new(AppState {
        sessions: sessions.clone(),
        config: config.clone(),
    });
    let app = app_router(app_state);

    // --- 4. Start the Server ---
    info!("Starting server on {}", config.bind_address);
    info!(
        "Swagger UI available at http://{}/swagger-ui",
        config.bind_address
    );
    let listener = tokio::net::TcpListener::bind(&config.bind_address).await?;
    axum::serve(listener, app)
        .with_graceful_shutdown(shutdown_signal())
        .await?;

    sessions.stop_all().await;
    Ok(())
}
