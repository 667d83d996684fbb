//! Shared application state for Axum routers.

use crate::auth::AuthConfig;
use crate::config::ApiConfig;
use clientele_engine::Engine;
use deadpool_postgres::Pool;
use std::sync::Arc;

/// Application-wide state shared across all routes.
#[derive(Clone)]
pub struct AppState {
    pub engine: Engine,
    pub auth: Arc<AuthConfig>,
    pub api: Arc<ApiConfig>,
    /// Present when the PostgreSQL store is in use; readiness pings it.
    pub pool: Option<Pool>,
    pub start_time: std::time::Instant,
}

impl AppState {
    pub fn new(engine: Engine, auth: AuthConfig, api: ApiConfig) -> Self {
        Self {
            engine,
            auth: Arc::new(auth),
            api: Arc::new(api),
            pool: None,
            start_time: std::time::Instant::now(),
        }
    }

    pub fn with_pool(mut self, pool: Pool) -> Self {
        self.pool = Some(pool);
        self
    }
}

macro_rules! impl_from_ref {
    ($type:ty, $field:ident) => {
        impl axum::extract::FromRef<AppState> for $type {
            fn from_ref(state: &AppState) -> Self {
                state.$field.clone()
            }
        }
    };
}

impl_from_ref!(Engine, engine);
impl_from_ref!(Arc<AuthConfig>, auth);
impl_from_ref!(Arc<ApiConfig>, api);
