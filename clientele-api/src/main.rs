//! Clientele API Server Entry Point
//!
//! Reads configuration from the environment, opens the configured store and
//! serves the Axum router until interrupted.

use std::net::SocketAddr;
use std::sync::Arc;

use clientele_api::{
    create_router, init_tracing, ApiConfig, ApiError, ApiResult, AppState, AuthConfig, DbConfig,
    PgStore, StoreBackend, TelemetryConfig,
};
use clientele_core::SystemClock;
use clientele_engine::{Engine, LogNotifier};
use clientele_storage::InMemoryStore;

#[tokio::main]
async fn main() -> ApiResult<()> {
    let telemetry_config = TelemetryConfig::from_env();
    init_tracing(&telemetry_config)?;

    let api_config = ApiConfig::from_env();
    let auth_config = AuthConfig::from_env();
    if auth_config.jwt_secret.is_insecure_default() {
        tracing::warn!("Running with the insecure default JWT secret");
    }

    let clock = Arc::new(SystemClock);
    let notifier = Arc::new(LogNotifier);
    let addr = resolve_bind_addr(&api_config)?;

    let state = match StoreBackend::from_env() {
        StoreBackend::Postgres => {
            let db_config = DbConfig::from_env();
            let pool = db_config.create_pool()?;
            let store = PgStore::new(pool.clone());
            store.bootstrap().await?;
            let engine = Engine::new(Arc::new(store), clock, notifier);
            AppState::new(engine, auth_config, api_config).with_pool(pool)
        }
        StoreBackend::Memory => {
            tracing::warn!("Using the in-memory store; data is lost on exit");
            let engine = Engine::new(Arc::new(InMemoryStore::new()), clock, notifier);
            AppState::new(engine, auth_config, api_config)
        }
    };

    let app = create_router(state);

    tracing::info!(
        %addr,
        service = %telemetry_config.service_name,
        environment = %telemetry_config.environment,
        "Starting Clientele API server"
    );

    let listener = tokio::net::TcpListener::bind(addr)
        .await
        .map_err(|e| ApiError::internal_error(format!("Failed to bind {}: {}", addr, e)))?;

    let server = axum::serve(listener, app);
    tokio::select! {
        result = server => {
            result.map_err(|e| ApiError::internal_error(format!("Server error: {}", e)))?;
        }
        _ = tokio::signal::ctrl_c() => {
            tracing::info!("Shutdown signal received");
        }
    }

    Ok(())
}

/// `PORT` overrides the configured port, for platforms that inject it.
fn resolve_bind_addr(config: &ApiConfig) -> ApiResult<SocketAddr> {
    let port = match std::env::var("PORT") {
        Ok(raw) => raw
            .trim()
            .parse::<u16>()
            .map_err(|_| ApiError::invalid_input(format!("Invalid port value: {}", raw)))?,
        Err(_) => config.port,
    };

    let addr = format!("{}:{}", config.host, port);
    addr.parse::<SocketAddr>()
        .map_err(|e| ApiError::invalid_input(format!("Invalid bind address {}: {}", addr, e)))
}
