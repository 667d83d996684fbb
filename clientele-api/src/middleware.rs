//! Axum middleware and extractors for authentication
//!
//! `auth_middleware` verifies the bearer token, resolves the principal and
//! injects its [`TenantContext`] into request extensions. Handlers take the
//! [`Principal`] extractor, which makes the middleware a type-level
//! requirement.

use crate::auth::{bearer_token, resolve_principal, validate_jwt_token};
use crate::error::ApiError;
use crate::state::AppState;
use axum::{
    async_trait,
    extract::{FromRequestParts, Request, State},
    http::{header, request::Parts},
    middleware::Next,
    response::Response,
};
use clientele_core::TenantContext;

// ============================================================================
// MIDDLEWARE FUNCTION
// ============================================================================

/// Returns 401 for a missing, malformed or expired token, and for a subject
/// that is unknown or inactive in the claimed tenant.
pub async fn auth_middleware(
    State(state): State<AppState>,
    mut request: Request,
    next: Next,
) -> Result<Response, ApiError> {
    let header_value = request
        .headers()
        .get(header::AUTHORIZATION)
        .and_then(|h| h.to_str().ok());

    let token = bearer_token(header_value)?;
    let claims = validate_jwt_token(&state.auth, token)?;
    let principal = resolve_principal(state.engine.store().as_ref(), &claims).await?;

    tracing::debug!(
        tenant_id = %principal.tenant_id,
        user_id = %principal.user_id,
        "Request authenticated"
    );
    request.extensions_mut().insert(principal);
    Ok(next.run(request).await)
}

// ============================================================================
// TYPED EXTRACTOR
// ============================================================================

/// The authenticated principal of the current request.
#[derive(Debug, Clone)]
pub struct Principal(pub TenantContext);

#[async_trait]
impl<S> FromRequestParts<S> for Principal
where
    S: Send + Sync,
{
    type Rejection = ApiError;

    async fn from_request_parts(parts: &mut Parts, _state: &S) -> Result<Self, Self::Rejection> {
        parts
            .extensions
            .get::<TenantContext>()
            .cloned()
            .map(Principal)
            .ok_or_else(|| {
                ApiError::internal_error(
                    "Principal not found in request extensions. \
                     Ensure auth_middleware is applied to this route.",
                )
            })
    }
}

impl std::ops::Deref for Principal {
    type Target = TenantContext;

    fn deref(&self) -> &Self::Target {
        &self.0
    }
}
