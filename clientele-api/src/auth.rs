//! Bearer-token authentication
//!
//! Tokens are issued elsewhere. This module only verifies an HS256 JWT,
//! checks its expiry against an injected clock, and resolves the subject to
//! an active user of the claimed tenant. The resolved [`TenantContext`] is
//! what every engine operation runs as.

use crate::error::{ApiError, ApiResult};
use clientele_core::{Clock, SystemClock, TenantContext, TenantId, UserId};
use clientele_storage::Store;
use jsonwebtoken::{decode, Algorithm, DecodingKey, Validation};
use secrecy::{ExposeSecret, SecretString};
use serde::{Deserialize, Serialize};
use std::sync::Arc;

const INSECURE_DEFAULT_SECRET: &str = "INSECURE_DEFAULT_SECRET_CHANGE_IN_PRODUCTION";

// ============================================================================
// SECRET
// ============================================================================

/// JWT signing secret. Never printed.
#[derive(Clone)]
pub struct JwtSecret(SecretString);

impl JwtSecret {
    pub fn new(secret: impl Into<String>) -> ApiResult<Self> {
        let secret: String = secret.into();
        if secret.is_empty() {
            return Err(ApiError::missing_field("jwt_secret"));
        }
        Ok(Self(SecretString::new(secret.into())))
    }

    /// Expose the secret value (only for cryptographic operations).
    pub fn expose(&self) -> &str {
        self.0.expose_secret()
    }

    pub fn is_insecure_default(&self) -> bool {
        self.expose() == INSECURE_DEFAULT_SECRET
    }
}

impl std::fmt::Debug for JwtSecret {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "JwtSecret([REDACTED, {} chars])", self.expose().len())
    }
}

// ============================================================================
// CONFIGURATION
// ============================================================================

#[derive(Clone)]
pub struct AuthConfig {
    pub jwt_secret: JwtSecret,
    pub jwt_algorithm: Algorithm,
    /// Tolerated clock skew when checking `exp`.
    pub jwt_leeway_secs: i64,
    pub clock: Arc<dyn Clock>,
}

impl std::fmt::Debug for AuthConfig {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("AuthConfig")
            .field("jwt_secret", &self.jwt_secret)
            .field("jwt_algorithm", &self.jwt_algorithm)
            .field("jwt_leeway_secs", &self.jwt_leeway_secs)
            .field("clock", &"<Clock>")
            .finish()
    }
}

impl AuthConfig {
    pub fn new(secret: JwtSecret) -> Self {
        Self {
            jwt_secret: secret,
            jwt_algorithm: Algorithm::HS256,
            jwt_leeway_secs: 60,
            clock: Arc::new(SystemClock),
        }
    }

    /// # Environment Variables
    /// - `CLIENTELE_JWT_SECRET`: signing secret (insecure default in development)
    /// - `CLIENTELE_JWT_LEEWAY_SECS`: clock skew tolerance (default 60)
    pub fn from_env() -> Self {
        let secret = std::env::var("CLIENTELE_JWT_SECRET")
            .ok()
            .and_then(|raw| JwtSecret::new(raw).ok())
            .unwrap_or_else(|| {
                tracing::warn!("CLIENTELE_JWT_SECRET not set, using insecure default");
                JwtSecret(SecretString::new(INSECURE_DEFAULT_SECRET.into()))
            });

        let mut config = Self::new(secret);
        config.jwt_leeway_secs = std::env::var("CLIENTELE_JWT_LEEWAY_SECS")
            .ok()
            .and_then(|s| s.parse().ok())
            .unwrap_or(60);
        config
    }

    pub fn with_clock(mut self, clock: Arc<dyn Clock>) -> Self {
        self.clock = clock;
        self
    }
}

// ============================================================================
// CLAIMS
// ============================================================================

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Claims {
    /// User id.
    pub sub: String,
    pub tenant_id: i64,
    #[serde(default)]
    pub iat: i64,
    pub exp: i64,
}

impl Claims {
    pub fn user_id(&self) -> ApiResult<UserId> {
        self.sub
            .parse()
            .map_err(|_| ApiError::invalid_token("Token subject is not a user id"))
    }

    pub fn tenant_id(&self) -> TenantId {
        TenantId::new(self.tenant_id)
    }
}

// ============================================================================
// VALIDATION
// ============================================================================

fn validate_expiry(now: i64, exp: i64, leeway_secs: i64) -> ApiResult<()> {
    if exp < now - leeway_secs {
        return Err(ApiError::token_expired());
    }
    Ok(())
}

/// Verify signature and expiry and return the claims.
///
/// Expiry is checked against `config.clock`, not by `jsonwebtoken`, so tests
/// can pin time.
pub fn validate_jwt_token(config: &AuthConfig, token: &str) -> ApiResult<Claims> {
    let decoding_key = DecodingKey::from_secret(config.jwt_secret.expose().as_bytes());

    let mut validation = Validation::new(config.jwt_algorithm);
    validation.validate_exp = false;
    validation.validate_nbf = false;
    validation.required_spec_claims = std::collections::HashSet::from(["exp".to_string()]);

    let token_data =
        decode::<Claims>(token, &decoding_key, &validation).map_err(|e| match e.kind() {
            jsonwebtoken::errors::ErrorKind::InvalidSignature => {
                ApiError::invalid_token("Token signature is invalid")
            }
            _ => ApiError::invalid_token("Token is invalid"),
        })?;

    let claims = token_data.claims;
    validate_expiry(
        config.clock.now().timestamp(),
        claims.exp,
        config.jwt_leeway_secs,
    )?;
    Ok(claims)
}

/// Pull the token out of an `Authorization: Bearer <token>` header value.
pub fn bearer_token(header: Option<&str>) -> ApiResult<&str> {
    let value = header.ok_or_else(|| ApiError::unauthorized("Authentication required"))?;
    value
        .strip_prefix("Bearer ")
        .map(str::trim)
        .filter(|token| !token.is_empty())
        .ok_or_else(|| ApiError::invalid_token("Authorization header must use Bearer scheme"))
}

/// Resolve verified claims to the principal.
///
/// The user must exist in the claimed tenant and be active; otherwise the
/// request is unauthenticated. The lookup uses its own unit of work, which
/// is released before the handler opens the operation's one.
pub async fn resolve_principal(store: &dyn Store, claims: &Claims) -> ApiResult<TenantContext> {
    let user_id = claims.user_id()?;
    let tenant = claims.tenant_id();

    let mut uow = store.begin().await?;
    let found = uow.user_get(tenant, user_id).await;
    if let Err(err) = uow.rollback().await {
        tracing::warn!(error = %err, "Rollback after principal lookup failed");
    }

    match found? {
        Some(user) if user.is_active => Ok(user.context()),
        _ => {
            tracing::debug!(tenant_id = %tenant, user_id = %user_id, "Unknown or inactive principal");
            Err(ApiError::unauthorized("User not found or inactive"))
        }
    }
}

// ============================================================================
// TESTS
// ============================================================================
