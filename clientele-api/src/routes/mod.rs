//! REST API Routes Module
//!
//! Handlers are grouped by entity. Clients and leads share one router that
//! is mounted twice with the party kind supplied as a request extension.
//! Every `/api` route sits behind `auth_middleware`; `/health` does not.

pub mod contacts;
pub mod health;
pub mod parties;
pub mod projects;

use std::time::Duration;

use axum::{
    http::{header, HeaderValue, Method},
    middleware::from_fn_with_state,
    Extension, Router,
};
use clientele_core::PartyKind;
use tower_http::cors::{Any, CorsLayer};
use tower_http::trace::TraceLayer;

use crate::config::ApiConfig;
use crate::middleware::auth_middleware;
use crate::state::AppState;

pub use contacts::create_router as contacts_router;
pub use health::create_router as health_router;
pub use parties::create_router as parties_router;
pub use projects::create_router as projects_router;

// ============================================================================
// CORS
// ============================================================================

fn build_cors_layer(config: &ApiConfig) -> CorsLayer {
    let cors = CorsLayer::new()
        .allow_methods([
            Method::GET,
            Method::POST,
            Method::PUT,
            Method::DELETE,
            Method::OPTIONS,
        ])
        .allow_headers([header::AUTHORIZATION, header::CONTENT_TYPE, header::ACCEPT])
        .max_age(Duration::from_secs(config.cors_max_age_secs));

    if config.cors_origins.is_empty() {
        tracing::info!("CORS: Development mode - allowing all origins");
        cors.allow_origin(Any)
    } else {
        tracing::info!(origins = ?config.cors_origins, "CORS: allowing configured origins");
        let origins: Vec<HeaderValue> = config
            .cors_origins
            .iter()
            .filter_map(|o| o.parse().ok())
            .collect();
        cors.allow_origin(origins)
    }
}

// ============================================================================
// ROUTER
// ============================================================================

/// Assemble the full application router.
pub fn create_router(state: AppState) -> Router {
    let api_routes = Router::new()
        .nest(
            "/clients",
            parties::create_router().layer(Extension(PartyKind::Client)),
        )
        .nest(
            "/leads",
            parties::create_router().layer(Extension(PartyKind::Lead)),
        )
        .nest("/projects", projects::create_router())
        .nest("/contacts", contacts::create_router())
        .layer(from_fn_with_state(state.clone(), auth_middleware));

    let cors = build_cors_layer(&state.api);

    Router::new()
        .nest("/api", api_routes)
        .nest("/health", health::create_router())
        .with_state(state)
        .layer(TraceLayer::new_for_http())
        .layer(cors)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_cors_layer_builds_for_both_modes() {
        let open = ApiConfig::default();
        let _ = build_cors_layer(&open);

        let locked = ApiConfig {
            cors_origins: vec!["https://crm.example".to_string(), "not a header\n".to_string()],
            ..ApiConfig::default()
        };
        let _ = build_cors_layer(&locked);
    }
}
