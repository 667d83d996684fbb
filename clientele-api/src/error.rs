//! Error Types for the Clientele API
//!
//! This module defines error handling for the HTTP boundary:
//! - ApiError struct carried through handlers
//! - ErrorCode enum mapping each failure class to a status code
//! - IntoResponse rendering `{"error": "<message>"}`
//! - Conversions from engine, pool and driver errors
//!
//! Persistence failures are logged in full and surfaced with a generic
//! message so no internal detail reaches the caller.

use axum::{
    extract::rejection::{JsonRejection, PathRejection},
    http::StatusCode,
    response::{IntoResponse, Response},
    Json,
};
use clientele_core::{CrmError, ValidationError};
use serde::{Deserialize, Serialize};

// ============================================================================
// ERROR CODE ENUM
// ============================================================================

/// Error codes for API responses.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum ErrorCode {
    // ========================================================================
    // Authentication Errors (401, 403)
    // ========================================================================
    /// Request lacks valid authentication credentials
    Unauthorized,

    /// Authentication token is invalid or malformed
    InvalidToken,

    /// Authentication token has expired
    TokenExpired,

    /// Caller is authenticated but the operation is restricted
    Forbidden,

    // ========================================================================
    // Validation Errors (400)
    // ========================================================================
    /// Value outside an option set or otherwise malformed
    ValidationFailed,

    /// Request body could not be read
    InvalidInput,

    /// Required field is absent or blank
    MissingField,

    /// Assignee is missing from the tenant or inactive
    InvalidAssignee,

    // ========================================================================
    // Resource Errors (404)
    // ========================================================================
    /// Record is absent or not visible to the caller
    EntityNotFound,

    // ========================================================================
    // Server Errors (500, 503)
    // ========================================================================
    InternalError,

    DatabaseError,

    ServiceUnavailable,

    ConnectionPoolExhausted,
}

impl ErrorCode {
    /// Get the HTTP status code for this error code.
    pub fn status_code(&self) -> StatusCode {
        match self {
            ErrorCode::Unauthorized | ErrorCode::InvalidToken | ErrorCode::TokenExpired => {
                StatusCode::UNAUTHORIZED
            }
            ErrorCode::Forbidden => StatusCode::FORBIDDEN,
            ErrorCode::ValidationFailed
            | ErrorCode::InvalidInput
            | ErrorCode::MissingField
            | ErrorCode::InvalidAssignee => StatusCode::BAD_REQUEST,
            ErrorCode::EntityNotFound => StatusCode::NOT_FOUND,
            ErrorCode::InternalError | ErrorCode::DatabaseError => {
                StatusCode::INTERNAL_SERVER_ERROR
            }
            ErrorCode::ServiceUnavailable | ErrorCode::ConnectionPoolExhausted => {
                StatusCode::SERVICE_UNAVAILABLE
            }
        }
    }

    /// Get a default message for this error code.
    pub fn default_message(&self) -> &'static str {
        match self {
            ErrorCode::Unauthorized => "Authentication required",
            ErrorCode::InvalidToken => "Invalid authentication token",
            ErrorCode::TokenExpired => "Authentication token has expired",
            ErrorCode::Forbidden => "Forbidden",
            ErrorCode::ValidationFailed => "Validation failed",
            ErrorCode::InvalidInput => "Invalid input",
            ErrorCode::MissingField => "Required field is missing",
            ErrorCode::InvalidAssignee => "Assigned user not found or inactive",
            ErrorCode::EntityNotFound => "Not found",
            ErrorCode::InternalError => "Internal server error",
            ErrorCode::DatabaseError => "Database operation failed",
            ErrorCode::ServiceUnavailable => "Service temporarily unavailable",
            ErrorCode::ConnectionPoolExhausted => "Database connection pool exhausted",
        }
    }
}

// ============================================================================
// API ERROR STRUCT
// ============================================================================

#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
#[error("{code:?}: {message}")]
pub struct ApiError {
    pub code: ErrorCode,
    pub message: String,
}

impl ApiError {
    pub fn new(code: ErrorCode, message: impl Into<String>) -> Self {
        Self {
            code,
            message: message.into(),
        }
    }

    /// Error with the code's default message.
    pub fn from_code(code: ErrorCode) -> Self {
        Self::new(code, code.default_message())
    }

    pub fn status_code(&self) -> StatusCode {
        self.code.status_code()
    }

    // ========================================================================
    // CONVENIENCE CONSTRUCTORS
    // ========================================================================

    pub fn unauthorized(message: impl Into<String>) -> Self {
        Self::new(ErrorCode::Unauthorized, message)
    }

    pub fn invalid_token(message: impl Into<String>) -> Self {
        Self::new(ErrorCode::InvalidToken, message)
    }

    pub fn token_expired() -> Self {
        Self::from_code(ErrorCode::TokenExpired)
    }

    pub fn forbidden(message: impl Into<String>) -> Self {
        Self::new(ErrorCode::Forbidden, message)
    }

    pub fn validation_failed(message: impl Into<String>) -> Self {
        Self::new(ErrorCode::ValidationFailed, message)
    }

    pub fn invalid_input(message: impl Into<String>) -> Self {
        Self::new(ErrorCode::InvalidInput, message)
    }

    pub fn missing_field(field: &str) -> Self {
        Self::new(ErrorCode::MissingField, format!("Missing {field}"))
    }

    pub fn not_found(message: impl Into<String>) -> Self {
        Self::new(ErrorCode::EntityNotFound, message)
    }

    pub fn internal_error(message: impl Into<String>) -> Self {
        Self::new(ErrorCode::InternalError, message)
    }

    pub fn database_error(message: impl Into<String>) -> Self {
        Self::new(ErrorCode::DatabaseError, message)
    }

    pub fn service_unavailable(message: impl Into<String>) -> Self {
        Self::new(ErrorCode::ServiceUnavailable, message)
    }

    pub fn connection_pool_exhausted() -> Self {
        Self::from_code(ErrorCode::ConnectionPoolExhausted)
    }
}

/// Wire shape of every error response.
#[derive(Debug, Serialize)]
struct ErrorBody<'a> {
    error: &'a str,
}

impl IntoResponse for ApiError {
    fn into_response(self) -> Response {
        let status = self.status_code();
        let body = Json(ErrorBody {
            error: &self.message,
        });
        (status, body).into_response()
    }
}

// ============================================================================
// CONVERSIONS
// ============================================================================

impl From<CrmError> for ApiError {
    fn from(err: CrmError) -> Self {
        match err {
            CrmError::Validation(inner) => {
                let message = inner.to_string();
                match inner {
                    ValidationError::MissingField { .. } => {
                        ApiError::new(ErrorCode::MissingField, message)
                    }
                    ValidationError::InvalidAssignee { .. } => {
                        ApiError::new(ErrorCode::InvalidAssignee, message)
                    }
                    ValidationError::InvalidOption { .. } | ValidationError::InvalidValue { .. } => {
                        ApiError::validation_failed(message)
                    }
                }
            }
            err @ CrmError::NotFound { .. } => ApiError::not_found(err.to_string()),
            CrmError::Forbidden { reason } => {
                tracing::debug!(reason = %reason, "Operation forbidden");
                ApiError::from_code(ErrorCode::Forbidden)
            }
            CrmError::Storage(storage) => {
                tracing::error!(error = %storage, "Storage error");
                ApiError::from_code(ErrorCode::DatabaseError)
            }
            CrmError::ExternalService { service, reason } => {
                tracing::error!(service = %service, reason = %reason, "External service error");
                ApiError::from_code(ErrorCode::InternalError)
            }
        }
    }
}

/// Unreadable or mistyped request body.
impl From<JsonRejection> for ApiError {
    fn from(rejection: JsonRejection) -> Self {
        tracing::debug!(status = %rejection.status(), "Rejected request body");
        ApiError::invalid_input(rejection.body_text())
    }
}

/// Path segment that does not parse as the expected id.
impl From<PathRejection> for ApiError {
    fn from(rejection: PathRejection) -> Self {
        tracing::debug!(status = %rejection.status(), "Rejected path parameter");
        ApiError::invalid_input(rejection.body_text())
    }
}

/// Convert from tokio_postgres::Error to ApiError.
impl From<tokio_postgres::Error> for ApiError {
    fn from(err: tokio_postgres::Error) -> Self {
        tracing::error!("Database error: {:?}", err);
        ApiError::from_code(ErrorCode::DatabaseError)
    }
}

/// Convert from deadpool_postgres::PoolError to ApiError.
impl From<deadpool_postgres::PoolError> for ApiError {
    fn from(err: deadpool_postgres::PoolError) -> Self {
        tracing::error!("Connection pool error: {:?}", err);

        match err {
            deadpool_postgres::PoolError::Timeout(_) => ApiError::connection_pool_exhausted(),
            deadpool_postgres::PoolError::Closed => {
                ApiError::service_unavailable("Database connection pool is closed")
            }
            _ => ApiError::database_error("Failed to acquire database connection"),
        }
    }
}

/// Convert from serde_json::Error to ApiError.
impl From<serde_json::Error> for ApiError {
    fn from(err: serde_json::Error) -> Self {
        tracing::error!("JSON serialization error: {:?}", err);
        ApiError::internal_error("Failed to encode response")
    }
}

/// Result type for API operations.
pub type ApiResult<T> = Result<T, ApiError>;

// ============================================================================
// TESTS
// ============================================================================

#[cfg(test)]
mod tests {
    use super::*;
    use clientele_core::{EntityKind, RecordId, StorageError, UserId};

    #[test]
    fn test_error_code_status_mapping() {
        assert_eq!(ErrorCode::Unauthorized.status_code(), StatusCode::UNAUTHORIZED);
        assert_eq!(ErrorCode::TokenExpired.status_code(), StatusCode::UNAUTHORIZED);
        assert_eq!(ErrorCode::Forbidden.status_code(), StatusCode::FORBIDDEN);
        assert_eq!(ErrorCode::MissingField.status_code(), StatusCode::BAD_REQUEST);
        assert_eq!(ErrorCode::InvalidAssignee.status_code(), StatusCode::BAD_REQUEST);
        assert_eq!(ErrorCode::EntityNotFound.status_code(), StatusCode::NOT_FOUND);
        assert_eq!(
            ErrorCode::DatabaseError.status_code(),
            StatusCode::INTERNAL_SERVER_ERROR
        );
        assert_eq!(
            ErrorCode::ConnectionPoolExhausted.status_code(),
            StatusCode::SERVICE_UNAVAILABLE
        );
    }

    #[test]
    fn test_api_error_constructors() {
        let err = ApiError::unauthorized("Invalid credentials");
        assert_eq!(err.code, ErrorCode::Unauthorized);
        assert_eq!(err.message, "Invalid credentials");

        let err = ApiError::missing_field("assigned_to");
        assert_eq!(err.code, ErrorCode::MissingField);
        assert_eq!(err.message, "Missing assigned_to");

        let err = ApiError::token_expired();
        assert_eq!(err.message, ErrorCode::TokenExpired.default_message());
    }

    #[test]
    fn test_crm_errors_map_to_status_classes() {
        let cases: Vec<(CrmError, StatusCode)> = vec![
            (ValidationError::missing("name").into(), StatusCode::BAD_REQUEST),
            (
                ValidationError::invalid("client_id", "link to a client or a lead, not both")
                    .into(),
                StatusCode::BAD_REQUEST,
            ),
            (
                ValidationError::InvalidAssignee {
                    assignee: UserId::new(3),
                    reason: "inactive".to_string(),
                }
                .into(),
                StatusCode::BAD_REQUEST,
            ),
            (
                CrmError::not_found(EntityKind::Lead, RecordId::new(1)),
                StatusCode::NOT_FOUND,
            ),
            (CrmError::forbidden("not the owner"), StatusCode::FORBIDDEN),
            (
                StorageError::QueryFailed {
                    reason: "relation \"clients\" does not exist".to_string(),
                }
                .into(),
                StatusCode::INTERNAL_SERVER_ERROR,
            ),
        ];
        for (err, status) in cases {
            assert_eq!(ApiError::from(err).status_code(), status);
        }
    }

    #[test]
    fn test_not_found_message_names_entity() {
        let err = ApiError::from(CrmError::not_found(EntityKind::Client, RecordId::new(8)));
        assert_eq!(err.message, "Client not found");
    }

    #[test]
    fn test_storage_detail_is_not_leaked() {
        let err = ApiError::from(CrmError::from(StorageError::TransactionFailed {
            reason: "could not serialize access".to_string(),
        }));
        assert_eq!(err.message, "Database operation failed");
        assert!(!err.message.contains("serialize"));
    }

    #[test]
    fn test_forbidden_hides_reason() {
        let err = ApiError::from(CrmError::forbidden("requires ViewAllTenantRecords"));
        assert_eq!(err.message, "Forbidden");
    }

    #[test]
    fn test_invalid_option_is_validation_failure() {
        let err = ApiError::from(CrmError::from(ValidationError::invalid(
            "lead_status",
            "unknown lead status",
        )));
        assert_eq!(err.code, ErrorCode::ValidationFailed);
        assert_eq!(err.status_code(), StatusCode::BAD_REQUEST);
    }

    #[test]
    fn test_error_display() {
        let err = ApiError::not_found("Project not found");
        assert_eq!(err.to_string(), "EntityNotFound: Project not found");
    }
}
