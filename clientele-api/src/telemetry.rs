//! Tracing subscriber initialisation
//!
//! Structured logs go to stdout, JSON by default. `RUST_LOG` overrides the
//! default filter when set.

use crate::error::{ApiError, ApiResult};
use tracing_subscriber::{fmt, layer::SubscriberExt, util::SubscriberInitExt, EnvFilter};

/// Filter used when `RUST_LOG` is unset or unparseable.
pub const DEFAULT_FILTER: &str = "clientele_api=debug,clientele_engine=info,tower_http=info,info";

#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum LogFormat {
    #[default]
    Json,
    /// Multi-line human readable output for local development.
    Pretty,
}

impl std::str::FromStr for LogFormat {
    type Err = std::convert::Infallible;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        Ok(match s.trim().to_lowercase().as_str() {
            "pretty" | "text" => LogFormat::Pretty,
            _ => LogFormat::Json,
        })
    }
}

/// Telemetry configuration from environment variables.
#[derive(Debug, Clone)]
pub struct TelemetryConfig {
    pub format: LogFormat,
    pub service_name: String,
    pub environment: String,
}

impl Default for TelemetryConfig {
    fn default() -> Self {
        Self {
            format: LogFormat::default(),
            service_name: "clientele-api".to_string(),
            environment: "development".to_string(),
        }
    }
}

impl TelemetryConfig {
    /// # Environment Variables
    /// - `CLIENTELE_LOG_FORMAT`: `json` (default) or `pretty`
    /// - `CLIENTELE_SERVICE_NAME` (default `clientele-api`)
    /// - `CLIENTELE_ENVIRONMENT` (default `development`)
    pub fn from_env() -> Self {
        let defaults = Self::default();
        Self {
            format: std::env::var("CLIENTELE_LOG_FORMAT")
                .ok()
                .and_then(|s| s.parse().ok())
                .unwrap_or(defaults.format),
            service_name: std::env::var("CLIENTELE_SERVICE_NAME")
                .unwrap_or(defaults.service_name),
            environment: std::env::var("CLIENTELE_ENVIRONMENT").unwrap_or(defaults.environment),
        }
    }
}

/// Install the global subscriber. Call once at startup.
pub fn init_tracing(config: &TelemetryConfig) -> ApiResult<()> {
    let env_filter =
        EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new(DEFAULT_FILTER));
    let registry = tracing_subscriber::registry().with(env_filter);

    let installed = match config.format {
        LogFormat::Json => registry.with(fmt::layer().json()).try_init(),
        LogFormat::Pretty => registry.with(fmt::layer().pretty()).try_init(),
    };
    installed.map_err(|e| ApiError::internal_error(format!("Failed to init subscriber: {}", e)))?;

    tracing::info!(
        service_name = %config.service_name,
        environment = %config.environment,
        format = ?config.format,
        "Telemetry initialized"
    );
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;

    struct EnvVarGuard {
        key: &'static str,
        original: Option<String>,
    }

    impl EnvVarGuard {
        fn set(key: &'static str, value: Option<&str>) -> Self {
            let original = std::env::var(key).ok();
            match value {
                Some(v) => std::env::set_var(key, v),
                None => std::env::remove_var(key),
            }
            Self { key, original }
        }
    }

    impl Drop for EnvVarGuard {
        fn drop(&mut self) {
            match self.original.as_deref() {
                Some(v) => std::env::set_var(self.key, v),
                None => std::env::remove_var(self.key),
            }
        }
    }

    #[test]
    fn test_log_format_parse() {
        assert_eq!("PRETTY".parse::<LogFormat>(), Ok(LogFormat::Pretty));
        assert_eq!("json".parse::<LogFormat>(), Ok(LogFormat::Json));
        assert_eq!("yaml".parse::<LogFormat>(), Ok(LogFormat::Json));
    }

    #[test]
    fn test_config_from_env() {
        let _format = EnvVarGuard::set("CLIENTELE_LOG_FORMAT", Some("pretty"));
        let _name = EnvVarGuard::set("CLIENTELE_SERVICE_NAME", None);
        let config = TelemetryConfig::from_env();
        assert_eq!(config.format, LogFormat::Pretty);
        assert_eq!(config.service_name, "clientele-api");
    }

    #[test]
    fn test_default_filter_parses() {
        assert!(EnvFilter::try_new(DEFAULT_FILTER).is_ok());
    }
}
