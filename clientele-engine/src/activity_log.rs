//! Audit trail of single-record reads

use clientele_core::{
    ActivityAction, ActivityLog, CrmResult, EntityKind, RecordId, TenantContext, Timestamp,
};
use clientele_storage::UnitOfWork;

#[derive(Debug, Clone, Copy, Default)]
pub struct ActivityLogger;

impl ActivityLogger {
    /// Append a `viewed` entry in the same unit of work as the read.
    ///
    /// A failure here fails the read: the entry and the fetch commit together.
    pub async fn record_view(
        uow: &mut dyn UnitOfWork,
        kind: EntityKind,
        id: RecordId,
        label: &str,
        ctx: &TenantContext,
        now: Timestamp,
    ) -> CrmResult<()> {
        let entry = ActivityLog {
            id: RecordId::new(0),
            tenant_id: ctx.tenant_id,
            user_id: ctx.user_id,
            action: ActivityAction::Viewed,
            entity_type: kind,
            entity_id: id,
            description: format!("Viewed {} '{}'", kind.as_db_str(), label),
            timestamp: now,
        };
        uow.activity_append(&entry).await?;
        tracing::debug!(
            tenant_id = %ctx.tenant_id,
            user_id = %ctx.user_id,
            entity = %kind,
            entity_id = %id,
            "View recorded"
        );
        Ok(())
    }
}
