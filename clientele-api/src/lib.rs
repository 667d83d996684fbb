//! Clientele API - REST layer for the CRM engine
//!
//! Exposes clients, leads, projects and contacts over Axum. Every request
//! under `/api` carries a bearer token that resolves to a tenant principal;
//! handlers pass that principal to [`clientele_engine::Engine`], which owns
//! visibility, validation and transactions. PostgreSQL persistence lives in
//! [`db`], behind the storage crate's `Store` trait.

pub mod auth;
pub mod config;
pub mod db;
pub mod error;
pub mod extractors;
pub mod middleware;
pub mod params;
pub mod routes;
pub mod state;
pub mod telemetry;

// Re-export commonly used types
pub use auth::{
    bearer_token, resolve_principal, validate_jwt_token, AuthConfig, Claims, JwtSecret,
};
pub use config::{ApiConfig, DbConfig, StoreBackend};
pub use db::{PgStore, PgUnitOfWork, BOOTSTRAP_DDL};
pub use error::{ApiError, ApiResult, ErrorCode};
pub use extractors::{JsonBody, PathId};
pub use middleware::{auth_middleware, Principal};
pub use params::{ListQuery, ParentQuery};
pub use routes::create_router;
pub use state::AppState;
pub use telemetry::{init_tracing, LogFormat, TelemetryConfig};
