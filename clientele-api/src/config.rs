//! Runtime configuration for the API server
//!
//! Every setting reads from a `CLIENTELE_*` environment variable and falls
//! back to a development default when the variable is absent or does not
//! parse.

use crate::error::{ApiError, ApiResult};
use deadpool_postgres::{Config, ManagerConfig, Pool, RecyclingMethod, Runtime};
use std::time::Duration;
use tokio_postgres::NoTls;

fn env_parse<T: std::str::FromStr>(key: &str) -> Option<T> {
    std::env::var(key).ok().and_then(|s| s.trim().parse().ok())
}

// ============================================================================
// API CONFIG
// ============================================================================

/// HTTP server settings.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ApiConfig {
    pub host: String,
    pub port: u16,
    /// Allowed CORS origins. Empty allows any origin (development).
    pub cors_origins: Vec<String>,
    pub cors_max_age_secs: u64,
    /// `per_page` used when a list request omits it or sends garbage.
    pub default_per_page: u32,
}

impl Default for ApiConfig {
    fn default() -> Self {
        Self {
            host: "0.0.0.0".to_string(),
            port: 5000,
            cors_origins: Vec::new(),
            cors_max_age_secs: 3600,
            default_per_page: clientele_core::DEFAULT_PER_PAGE,
        }
    }
}

impl ApiConfig {
    /// # Environment Variables
    /// - `CLIENTELE_API_HOST` (default `0.0.0.0`)
    /// - `CLIENTELE_API_PORT` (default 5000)
    /// - `CLIENTELE_CORS_ORIGINS`: comma-separated list
    /// - `CLIENTELE_CORS_MAX_AGE_SECS` (default 3600)
    /// - `CLIENTELE_DEFAULT_PER_PAGE` (default 20, must be positive)
    pub fn from_env() -> Self {
        let defaults = Self::default();
        let cors_origins = std::env::var("CLIENTELE_CORS_ORIGINS")
            .map(|raw| {
                raw.split(',')
                    .map(str::trim)
                    .filter(|origin| !origin.is_empty())
                    .map(str::to_string)
                    .collect()
            })
            .unwrap_or_default();

        Self {
            host: std::env::var("CLIENTELE_API_HOST").unwrap_or(defaults.host),
            port: env_parse("CLIENTELE_API_PORT").unwrap_or(defaults.port),
            cors_origins,
            cors_max_age_secs: env_parse("CLIENTELE_CORS_MAX_AGE_SECS")
                .unwrap_or(defaults.cors_max_age_secs),
            default_per_page: env_parse::<u32>("CLIENTELE_DEFAULT_PER_PAGE")
                .filter(|n| *n >= 1)
                .unwrap_or(defaults.default_per_page),
        }
    }

    pub fn is_origin_allowed(&self, origin: &str) -> bool {
        self.cors_origins.is_empty() || self.cors_origins.iter().any(|o| o == origin)
    }
}

// ============================================================================
// STORE SELECTION
// ============================================================================

/// Persistence backend chosen at startup.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum StoreBackend {
    #[default]
    Postgres,
    /// Process-local store for demos. Data is lost on exit.
    Memory,
}

impl std::str::FromStr for StoreBackend {
    type Err = std::convert::Infallible;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        Ok(match s.trim().to_lowercase().as_str() {
            "memory" | "in-memory" => StoreBackend::Memory,
            _ => StoreBackend::Postgres,
        })
    }
}

impl StoreBackend {
    /// `CLIENTELE_STORE=memory|postgres`.
    pub fn from_env() -> Self {
        env_parse("CLIENTELE_STORE").unwrap_or_default()
    }
}

// ============================================================================
// DATABASE CONFIG
// ============================================================================

#[derive(Debug, Clone)]
pub struct DbConfig {
    pub host: String,
    pub port: u16,
    pub dbname: String,
    pub user: String,
    pub password: String,
    pub max_size: usize,
    /// Wait limit for acquiring a pooled connection.
    pub timeout: Duration,
}

impl Default for DbConfig {
    fn default() -> Self {
        Self {
            host: "localhost".to_string(),
            port: 5432,
            dbname: "clientele".to_string(),
            user: "postgres".to_string(),
            password: String::new(),
            max_size: 16,
            timeout: Duration::from_secs(30),
        }
    }
}

impl DbConfig {
    pub fn from_env() -> Self {
        let defaults = Self::default();
        Self {
            host: std::env::var("CLIENTELE_DB_HOST").unwrap_or(defaults.host),
            port: env_parse("CLIENTELE_DB_PORT").unwrap_or(defaults.port),
            dbname: std::env::var("CLIENTELE_DB_NAME").unwrap_or(defaults.dbname),
            user: std::env::var("CLIENTELE_DB_USER").unwrap_or(defaults.user),
            password: std::env::var("CLIENTELE_DB_PASSWORD").unwrap_or_default(),
            max_size: env_parse("CLIENTELE_DB_POOL_SIZE").unwrap_or(defaults.max_size),
            timeout: env_parse("CLIENTELE_DB_TIMEOUT")
                .map(Duration::from_secs)
                .unwrap_or(defaults.timeout),
        }
    }

    /// Create a connection pool from this configuration.
    pub fn create_pool(&self) -> ApiResult<Pool> {
        let mut cfg = Config::new();
        cfg.host = Some(self.host.clone());
        cfg.port = Some(self.port);
        cfg.dbname = Some(self.dbname.clone());
        cfg.user = Some(self.user.clone());
        cfg.password = Some(self.password.clone());
        cfg.manager = Some(ManagerConfig {
            recycling_method: RecyclingMethod::Fast,
        });

        let mut pool_cfg = deadpool_postgres::PoolConfig::new(self.max_size);
        pool_cfg.timeouts.wait = Some(self.timeout);
        cfg.pool = Some(pool_cfg);

        cfg.create_pool(Some(Runtime::Tokio1), NoTls)
            .map_err(|e| ApiError::database_error(format!("Failed to create pool: {}", e)))
    }
}
