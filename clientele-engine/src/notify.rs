//! Assignment notification collaborator

use async_trait::async_trait;
use clientele_core::EntityKind;
use thiserror::Error;

/// Message sent to a user who was just assigned a record.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct AssignmentNotice {
    pub to_email: String,
    pub entity_type: EntityKind,
    pub entity_name: String,
    pub assigned_by: String,
}

impl AssignmentNotice {
    pub fn subject(&self) -> String {
        format!(
            "You've been assigned a {}: {}",
            self.entity_type.as_db_str(),
            self.entity_name
        )
    }
}

#[derive(Debug, Clone, Error, PartialEq, Eq)]
pub enum NotifyError {
    #[error("notification transport unavailable: {0}")]
    Unavailable(String),

    #[error("notification rejected: {0}")]
    Rejected(String),
}

/// Delivers assignment notices. One attempt per call, no retries.
#[async_trait]
pub trait Notifier: Send + Sync {
    async fn notify_assignment(&self, notice: &AssignmentNotice) -> Result<(), NotifyError>;
}

/// Notifier that only writes the notice to the log.
#[derive(Debug, Clone, Copy, Default)]
pub struct LogNotifier;

#[async_trait]
impl Notifier for LogNotifier {
    async fn notify_assignment(&self, notice: &AssignmentNotice) -> Result<(), NotifyError> {
        tracing::info!(
            to = %notice.to_email,
            assigned_by = %notice.assigned_by,
            subject = %notice.subject(),
            "Assignment notification"
        );
        Ok(())
    }
}
