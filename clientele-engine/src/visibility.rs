//! Row-level visibility rules
//!
//! Every read and write in the engine starts from the predicate produced
//! here. The tenant clause is always present; soft-deleted clients and leads
//! are always excluded.

use clientele_core::{
    Capability, CrmError, CrmResult, EntityKind, Field, Party, Predicate, RecordId,
    TenantContext,
};

/// What the caller intends to do with the rows.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum Access {
    /// Default per-user list view.
    List,
    /// Single-record fetch. Admins see every live record in the tenant.
    Get,
    /// Update or delete.
    Modify,
    /// Every live record in the tenant. Callers check capabilities first.
    Tenant,
}

/// Builds visibility predicates for an entity kind and principal.
#[derive(Debug, Clone, Copy, Default)]
pub struct VisibilityPolicy;

impl VisibilityPolicy {
    /// Tenant match, plus `deleted_at IS NULL` for kinds that soft-delete.
    pub fn base(kind: EntityKind, ctx: &TenantContext) -> Predicate {
        let tenant = Predicate::eq(Field::TenantId, ctx.tenant_id);
        if kind.soft_deletes() {
            tenant.and(Predicate::is_null(Field::DeletedAt))
        } else {
            tenant
        }
    }

    pub fn visible_predicate(kind: EntityKind, ctx: &TenantContext, access: Access) -> Predicate {
        let base = Self::base(kind, ctx);
        let admin = ctx.has_capability(Capability::ViewAllTenantRecords);
        let mine = Predicate::eq(Field::CreatedBy, ctx.user_id);
        let assigned_to_me = Predicate::eq(Field::AssignedTo, ctx.user_id);

        let ownership = match (kind, access) {
            (_, Access::Tenant) => Predicate::True,
            (EntityKind::Client | EntityKind::Lead, Access::List) => {
                assigned_to_me.or(Predicate::is_null(Field::AssignedTo).and(mine))
            }
            (EntityKind::Client | EntityKind::Lead, Access::Get) if admin => Predicate::True,
            (EntityKind::Client | EntityKind::Lead, Access::Get | Access::Modify) => {
                mine.or(assigned_to_me)
            }
            (EntityKind::Project, Access::List) => mine,
            (EntityKind::Project, Access::Get | Access::Modify) if admin => Predicate::True,
            (EntityKind::Project, Access::Get | Access::Modify) => mine,
            (EntityKind::Contact | EntityKind::Interaction, _) => Predicate::True,
        };
        base.and(ownership)
    }

    /// Visible predicate narrowed to one id.
    pub fn by_id(
        kind: EntityKind,
        ctx: &TenantContext,
        access: Access,
        id: RecordId,
    ) -> Predicate {
        Self::visible_predicate(kind, ctx, access).and(Predicate::eq(Field::Id, id))
    }

    /// Whether the caller created or is assigned the party.
    pub fn is_owner_or_assignee(party: &Party, ctx: &TenantContext) -> bool {
        party.created_by == ctx.user_id || party.assigned_to == Some(ctx.user_id)
    }

    /// Gate for views reached through a parent party the caller can already
    /// see exists in the tenant. Non-admins must own or be assigned it.
    pub fn ensure_parent_access(parent: &Party, ctx: &TenantContext) -> CrmResult<()> {
        if ctx.has_capability(Capability::ViewAllTenantRecords)
            || Self::is_owner_or_assignee(parent, ctx)
        {
            Ok(())
        } else {
            Err(CrmError::forbidden(format!(
                "not the owner or assignee of this {}",
                parent.kind
            )))
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use clientele_core::{Role, TenantId, UserId};

    fn user(id: i64) -> TenantContext {
        TenantContext::new(TenantId::new(1), UserId::new(id), format!("u{id}@example.com"))
            .with_role(Role::User)
    }

    #[test]
    fn test_project_base_has_no_soft_delete_clause() {
        let p = VisibilityPolicy::base(EntityKind::Project, &user(1));
        assert_eq!(p, Predicate::eq(Field::TenantId, TenantId::new(1)));
    }

    #[test]
    fn test_list_ownership_clause_shape() {
        let p = VisibilityPolicy::visible_predicate(EntityKind::Client, &user(3), Access::List);
        let expected = Predicate::And(vec![
            Predicate::eq(Field::TenantId, TenantId::new(1)),
            Predicate::is_null(Field::DeletedAt),
            Predicate::Or(vec![
                Predicate::eq(Field::AssignedTo, UserId::new(3)),
                Predicate::And(vec![
                    Predicate::is_null(Field::AssignedTo),
                    Predicate::eq(Field::CreatedBy, UserId::new(3)),
                ]),
            ]),
        ]);
        assert_eq!(p, expected);
    }

    #[test]
    fn test_admin_get_drops_ownership_but_not_tenant() {
        let admin = user(1).with_role(Role::Admin);
        let p = VisibilityPolicy::visible_predicate(EntityKind::Lead, &admin, Access::Get);
        assert_eq!(p, VisibilityPolicy::base(EntityKind::Lead, &admin));
        assert!(p.pins_tenant(TenantId::new(1)));
    }

    #[test]
    fn test_admin_modify_still_requires_ownership() {
        let admin = user(1).with_role(Role::Admin);
        let p = VisibilityPolicy::visible_predicate(EntityKind::Client, &admin, Access::Modify);
        assert_ne!(p, VisibilityPolicy::base(EntityKind::Client, &admin));
    }
}
