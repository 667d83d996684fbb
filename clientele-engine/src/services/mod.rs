//! Entity services
//!
//! Each public operation opens one unit of work, runs to completion inside
//! it, and commits on success or rolls back on error. Nothing is shared
//! between operations except the store.

mod contacts;
mod parties;
mod projects;

use crate::assignment::AssignmentWorkflow;
use crate::notify::Notifier;
use clientele_core::{Clock, CrmResult, Timestamp};
use clientele_storage::{Store, UnitOfWork};
use std::sync::Arc;
use tracing::warn;

/// Entry point for every engine operation.
#[derive(Clone)]
pub struct Engine {
    store: Arc<dyn Store>,
    clock: Arc<dyn Clock>,
    assignments: AssignmentWorkflow,
}

impl Engine {
    pub fn new(store: Arc<dyn Store>, clock: Arc<dyn Clock>, notifier: Arc<dyn Notifier>) -> Self {
        Self {
            store,
            clock,
            assignments: AssignmentWorkflow::new(notifier),
        }
    }

    pub fn store(&self) -> &Arc<dyn Store> {
        &self.store
    }

    pub fn now(&self) -> Timestamp {
        self.clock.now()
    }

    async fn begin(&self) -> CrmResult<Box<dyn UnitOfWork>> {
        self.store.begin().await
    }
}

/// Commit on success, roll back on error. The original error wins over a
/// rollback failure.
async fn finish<T>(uow: Box<dyn UnitOfWork>, result: CrmResult<T>) -> CrmResult<T> {
    match result {
        Ok(value) => {
            uow.commit().await?;
            Ok(value)
        }
        Err(err) => {
            if let Err(rollback_err) = uow.rollback().await {
                warn!(error = %rollback_err, "Rollback failed");
            }
            Err(err)
        }
    }
}
