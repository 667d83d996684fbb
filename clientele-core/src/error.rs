//! Error types for Clientele operations

use crate::{EntityKind, OptionParseError, RecordId, UserId};
use thiserror::Error;

/// Input rejected before any mutation.
#[derive(Debug, Clone, Error, PartialEq, Eq)]
pub enum ValidationError {
    #[error("Missing {field}")]
    MissingField { field: String },

    #[error("Invalid {field}: {value}")]
    InvalidOption { field: String, value: String },

    #[error("Invalid value for {field}: {reason}")]
    InvalidValue { field: String, reason: String },

    #[error("Assigned user not found or inactive")]
    InvalidAssignee { assignee: UserId, reason: String },
}

impl ValidationError {
    pub fn missing(field: impl Into<String>) -> Self {
        ValidationError::MissingField {
            field: field.into(),
        }
    }

    pub fn invalid(field: impl Into<String>, reason: impl Into<String>) -> Self {
        ValidationError::InvalidValue {
            field: field.into(),
            reason: reason.into(),
        }
    }
}

impl From<OptionParseError> for ValidationError {
    fn from(err: OptionParseError) -> Self {
        ValidationError::InvalidOption {
            field: err.field.to_string(),
            value: err.value,
        }
    }
}

/// Persistence collaborator failures.
#[derive(Debug, Clone, Error, PartialEq, Eq)]
pub enum StorageError {
    #[error("Transaction failed: {reason}")]
    TransactionFailed { reason: String },

    #[error("Query failed: {reason}")]
    QueryFailed { reason: String },

    #[error("Store unavailable: {reason}")]
    Unavailable { reason: String },

    #[error("Refusing {entity} query without a tenant scope")]
    UnscopedQuery { entity: EntityKind },

    #[error("Malformed {entity} row: {reason}")]
    RowDecode { entity: EntityKind, reason: String },
}

/// Coarse classification used at the API boundary.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum ErrorKind {
    Validation,
    NotFound,
    Forbidden,
    Persistence,
    ExternalService,
}

/// Master error type for all engine operations.
#[derive(Debug, Clone, Error, PartialEq, Eq)]
pub enum CrmError {
    #[error("Validation error: {0}")]
    Validation(#[from] ValidationError),

    /// Absent, in another tenant, soft-deleted or not owned. Deliberately
    /// indistinguishable.
    #[error("{} not found", .entity.label())]
    NotFound { entity: EntityKind, id: RecordId },

    #[error("Forbidden: {reason}")]
    Forbidden { reason: String },

    #[error("Storage error: {0}")]
    Storage(#[from] StorageError),

    #[error("{service} failed: {reason}")]
    ExternalService { service: String, reason: String },
}

impl CrmError {
    pub fn not_found(entity: impl Into<EntityKind>, id: RecordId) -> Self {
        CrmError::NotFound {
            entity: entity.into(),
            id,
        }
    }

    pub fn forbidden(reason: impl Into<String>) -> Self {
        CrmError::Forbidden {
            reason: reason.into(),
        }
    }

    pub fn kind(&self) -> ErrorKind {
        match self {
            CrmError::Validation(_) => ErrorKind::Validation,
            CrmError::NotFound { .. } => ErrorKind::NotFound,
            CrmError::Forbidden { .. } => ErrorKind::Forbidden,
            CrmError::Storage(_) => ErrorKind::Persistence,
            CrmError::ExternalService { .. } => ErrorKind::ExternalService,
        }
    }
}

impl From<OptionParseError> for CrmError {
    fn from(err: OptionParseError) -> Self {
        CrmError::Validation(err.into())
    }
}

/// Result type alias for Clientele operations.
pub type CrmResult<T> = Result<T, CrmError>;

// =============================================================================
// TESTS
// =============================================================================
