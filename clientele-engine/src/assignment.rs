//! Assignment workflow
//!
//! Validation and the write happen in the caller's unit of work, so the
//! assignee's tenant and active flag are read in the same transaction that
//! changes `assigned_to`. The notification is a separate step the caller
//! runs after commit; its outcome is reported, never propagated.

use crate::notify::{AssignmentNotice, Notifier};
use crate::visibility::{Access, VisibilityPolicy};
use clientele_core::{
    CrmError, CrmResult, Party, PartyKind, RecordId, TenantContext, Timestamp, UserId,
    ValidationError,
};
use clientele_storage::UnitOfWork;
use std::sync::Arc;
use tracing::{debug, warn};

/// What happened to the best-effort notification.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum NotificationOutcome {
    Sent,
    /// No assignee to notify (the assignment was cleared).
    Skipped,
    Failed { reason: String },
}

/// Result of a committed assignment.
#[derive(Debug, Clone, PartialEq)]
pub struct AssignmentReport {
    pub party: Party,
    pub notification: NotificationOutcome,
}

/// A validated, applied but not yet committed assignment.
#[derive(Debug, Clone, PartialEq)]
pub struct PendingAssignment {
    pub party: Party,
    pub notice: Option<AssignmentNotice>,
}

#[derive(Clone)]
pub struct AssignmentWorkflow {
    notifier: Arc<dyn Notifier>,
}

impl AssignmentWorkflow {
    pub fn new(notifier: Arc<dyn Notifier>) -> Self {
        Self { notifier }
    }

    /// Validate the assignee and write the assignment.
    ///
    /// Clients require an assignee; leads accept `None` to clear it. The
    /// assignee must exist in the caller's tenant and be active, otherwise
    /// nothing is written.
    pub async fn apply(
        &self,
        uow: &mut dyn UnitOfWork,
        ctx: &TenantContext,
        kind: PartyKind,
        id: RecordId,
        assignee: Option<UserId>,
        now: Timestamp,
    ) -> CrmResult<PendingAssignment> {
        if assignee.is_none() && kind == PartyKind::Client {
            return Err(ValidationError::missing("assigned_to").into());
        }

        let filter = VisibilityPolicy::by_id(kind.entity_kind(), ctx, Access::Tenant, id);
        let mut party = uow
            .party_find(kind, ctx.tenant_id, &filter)
            .await?
            .ok_or_else(|| CrmError::not_found(kind, id))?;

        let notice = match assignee {
            Some(user_id) => {
                let user = uow.user_get(ctx.tenant_id, user_id).await?;
                let user = match user {
                    Some(user) if user.is_active => user,
                    Some(_) => return Err(invalid_assignee(user_id, "user is inactive")),
                    None => return Err(invalid_assignee(user_id, "no such user in tenant")),
                };
                Some(AssignmentNotice {
                    to_email: user.email,
                    entity_type: kind.entity_kind(),
                    entity_name: party.profile.name.clone(),
                    assigned_by: ctx.email.clone(),
                })
            }
            None => None,
        };

        party.assigned_to = assignee;
        party.touch(ctx.user_id, now);
        uow.party_update(&party).await?;

        debug!(
            tenant_id = %ctx.tenant_id,
            entity = %kind,
            entity_id = %id,
            assignee = ?assignee,
            "Assignment applied"
        );
        Ok(PendingAssignment { party, notice })
    }

    /// Attempt delivery once. Failures are logged and reported.
    pub async fn deliver(&self, notice: Option<&AssignmentNotice>) -> NotificationOutcome {
        let Some(notice) = notice else {
            return NotificationOutcome::Skipped;
        };
        match self.notifier.notify_assignment(notice).await {
            Ok(()) => NotificationOutcome::Sent,
            Err(err) => {
                warn!(
                    to = %notice.to_email,
                    entity = %notice.entity_type,
                    error = %err,
                    "Assignment notification failed"
                );
                NotificationOutcome::Failed {
                    reason: err.to_string(),
                }
            }
        }
    }
}

fn invalid_assignee(assignee: UserId, reason: &str) -> CrmError {
    ValidationError::InvalidAssignee {
        assignee,
        reason: reason.to_string(),
    }
    .into()
}
