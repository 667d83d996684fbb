//! Client and lead operations
//!
//! Clients and leads share storage shape and rules. Differences: leads carry
//! a pipeline status, a lead assignment may be cleared, and the "assigned"
//! view for leads is the admin's view of every assigned lead.

use super::{finish, Engine};
use crate::activity::activity_predicate;
use crate::activity_log::ActivityLogger;
use crate::assignment::AssignmentReport;
use crate::composer::QueryComposer;
use crate::sort::order_by;
use crate::stats::StatsAggregator;
use crate::validation::{clean, option, phone, phone_label, required};
use crate::views::{PartyListing, PartySummary};
use crate::visibility::{Access, VisibilityPolicy};
use clientele_core::{
    BusinessType, Capability, CrmError, CrmResult, Field, LeadStatus, ListParams, NewParty,
    Ordering, Party, PartyKind, PartyPatch, PartyProfile, PartyRef, Predicate, RecordId,
    TenantContext, Timestamp, UserId, ValidationError,
};
use clientele_storage::{RecordQuery, UnitOfWork};
use std::collections::HashMap;
use tracing::info;

impl Engine {
    /// Create a client or lead owned by the caller.
    pub async fn create_party(
        &self,
        ctx: &TenantContext,
        kind: PartyKind,
        new: NewParty,
    ) -> CrmResult<Party> {
        let now = self.now();
        let profile = PartyProfile {
            name: required("name", new.name)?,
            contact_person: clean(new.contact_person),
            contact_title: clean(new.contact_title),
            email: clean(new.email),
            phone: phone("phone", new.phone)?,
            phone_label: phone_label(new.phone_label)?.unwrap_or_default(),
            secondary_phone: phone("secondary_phone", new.secondary_phone)?,
            secondary_phone_label: phone_label(new.secondary_phone_label)?,
            address: clean(new.address),
            city: clean(new.city),
            state: clean(new.state),
            zip: clean(new.zip),
            notes: clean(new.notes),
            business_type: option::<BusinessType>(new.business_type)?.unwrap_or_default(),
        };
        let mut party = Party::new(kind, ctx.tenant_id, profile, ctx.user_id, now);
        if let Some(pipeline) = party.pipeline.as_mut() {
            if let Some(status) = option::<LeadStatus>(new.lead_status)? {
                pipeline.transition(status, now);
            }
        }

        let mut uow = self.begin().await?;
        let result = uow.party_insert(&party).await;
        party.id = finish(uow, result).await?;

        info!(
            tenant_id = %ctx.tenant_id,
            user_id = %ctx.user_id,
            entity = %kind,
            entity_id = %party.id,
            "Party created"
        );
        Ok(party)
    }

    /// The caller's default list: assigned to them, or unassigned and
    /// created by them.
    pub async fn list_parties(
        &self,
        ctx: &TenantContext,
        kind: PartyKind,
        params: &ListParams,
    ) -> CrmResult<PartyListing> {
        let base = VisibilityPolicy::visible_predicate(kind.entity_kind(), ctx, Access::List);
        let now = self.now();
        let mut uow = self.begin().await?;
        let result = list_page(&mut *uow, ctx, kind, params, base, false, now).await;
        finish(uow, result).await
    }

    /// Every live record in the tenant, optionally narrowed to records whose
    /// assignee or creator has `user_email`. Admin only.
    pub async fn list_all_parties(
        &self,
        ctx: &TenantContext,
        kind: PartyKind,
        params: &ListParams,
        user_email: Option<String>,
    ) -> CrmResult<PartyListing> {
        ctx.require(Capability::ViewAllTenantRecords)?;
        let user_email = clean(user_email);
        let mut base = VisibilityPolicy::visible_predicate(kind.entity_kind(), ctx, Access::Tenant);
        if let Some(email) = &user_email {
            base = base.and(
                Predicate::UserEmail(Field::AssignedTo, email.clone())
                    .or(Predicate::UserEmail(Field::CreatedBy, email.clone())),
            );
        }
        let now = self.now();
        let mut uow = self.begin().await?;
        let result = list_page(&mut *uow, ctx, kind, params, base, true, now).await;
        let mut listing = finish(uow, result).await?;
        listing.user_email = user_email;
        Ok(listing)
    }

    /// Unpaginated "assigned" view.
    ///
    /// For clients: records assigned to the caller. For leads: every
    /// assigned lead in the tenant, admin only.
    pub async fn list_assigned_parties(
        &self,
        ctx: &TenantContext,
        kind: PartyKind,
    ) -> CrmResult<Vec<PartySummary>> {
        let tenant_wide = VisibilityPolicy::visible_predicate(kind.entity_kind(), ctx, Access::Tenant);
        let filter = match kind {
            PartyKind::Client => tenant_wide.and(Predicate::eq(Field::AssignedTo, ctx.user_id)),
            PartyKind::Lead => {
                ctx.require(Capability::ViewAllTenantRecords)?;
                tenant_wide.and(Predicate::is_not_null(Field::AssignedTo))
            }
        };
        let with_creator = kind == PartyKind::Lead;

        let mut uow = self.begin().await?;
        let result = assigned_in(&mut *uow, ctx, kind, filter, with_creator).await;
        finish(uow, result).await
    }

    /// Single-record fetch. Records a `viewed` entry in the same unit of work.
    pub async fn get_party(
        &self,
        ctx: &TenantContext,
        kind: PartyKind,
        id: RecordId,
    ) -> CrmResult<Party> {
        let now = self.now();
        let mut uow = self.begin().await?;
        let result = get_in(&mut *uow, ctx, PartyRef { kind, id }, now).await;
        finish(uow, result).await
    }

    /// Apply the fields present in `patch`. All or nothing.
    pub async fn update_party(
        &self,
        ctx: &TenantContext,
        kind: PartyKind,
        id: RecordId,
        patch: PartyPatch,
    ) -> CrmResult<Party> {
        let now = self.now();
        let mut uow = self.begin().await?;
        let result = update_in(&mut *uow, ctx, PartyRef { kind, id }, patch, now).await;
        finish(uow, result).await
    }

    /// Soft delete.
    pub async fn delete_party(
        &self,
        ctx: &TenantContext,
        kind: PartyKind,
        id: RecordId,
    ) -> CrmResult<()> {
        let now = self.now();
        let mut uow = self.begin().await?;
        let result = delete_in(&mut *uow, ctx, PartyRef { kind, id }, now).await;
        finish(uow, result).await?;
        info!(
            tenant_id = %ctx.tenant_id,
            user_id = %ctx.user_id,
            entity = %kind,
            entity_id = %id,
            "Party deleted"
        );
        Ok(())
    }

    /// Assign (or, for leads, unassign). Admin only. The notification is
    /// attempted after commit and its failure does not undo the assignment.
    pub async fn assign_party(
        &self,
        ctx: &TenantContext,
        kind: PartyKind,
        id: RecordId,
        assignee: Option<UserId>,
    ) -> CrmResult<AssignmentReport> {
        ctx.require(Capability::AssignRecords)?;
        let now = self.now();
        let mut uow = self.begin().await?;
        let result = self
            .assignments
            .apply(&mut *uow, ctx, kind, id, assignee, now)
            .await;
        let pending = finish(uow, result).await?;
        let notification = self.assignments.deliver(pending.notice.as_ref()).await;

        info!(
            tenant_id = %ctx.tenant_id,
            user_id = %ctx.user_id,
            entity = %kind,
            entity_id = %id,
            assignee = ?assignee,
            notification = ?notification,
            "Party assigned"
        );
        Ok(AssignmentReport {
            party: pending.party,
            notification,
        })
    }
}

/// Fetch one party under the given access rule or fail with `NotFound`.
pub(crate) async fn find_party(
    uow: &mut dyn UnitOfWork,
    ctx: &TenantContext,
    party: PartyRef,
    access: Access,
) -> CrmResult<Party> {
    let filter = VisibilityPolicy::by_id(party.kind.entity_kind(), ctx, access, party.id);
    uow.party_find(party.kind, ctx.tenant_id, &filter)
        .await?
        .ok_or_else(|| CrmError::not_found(party.kind, party.id))
}

/// Live parties of one kind by id, keyed by id. Missing and deleted ids are
/// absent.
pub(crate) async fn load_parties(
    uow: &mut dyn UnitOfWork,
    ctx: &TenantContext,
    kind: PartyKind,
    ids: impl IntoIterator<Item = RecordId>,
) -> CrmResult<HashMap<RecordId, Party>> {
    let mut ids: Vec<RecordId> = ids.into_iter().collect();
    ids.sort();
    ids.dedup();
    if ids.is_empty() {
        return Ok(HashMap::new());
    }
    let filter = VisibilityPolicy::base(kind.entity_kind(), ctx).and(Predicate::one_of(Field::Id, ids));
    let page = uow
        .party_query(kind, &RecordQuery::new(ctx.tenant_id, filter))
        .await?;
    Ok(page.items.into_iter().map(|p| (p.id, p)).collect())
}

async fn assigned_in(
    uow: &mut dyn UnitOfWork,
    ctx: &TenantContext,
    kind: PartyKind,
    filter: Predicate,
    with_creator: bool,
) -> CrmResult<Vec<PartySummary>> {
    let page = QueryComposer::new(ctx.tenant_id, filter)
        .order(Ordering::newest())
        .parties(uow, kind)
        .await?;
    decorate(uow, ctx, kind, page.items, with_creator).await
}

async fn get_in(
    uow: &mut dyn UnitOfWork,
    ctx: &TenantContext,
    target: PartyRef,
    now: Timestamp,
) -> CrmResult<Party> {
    let party = find_party(uow, ctx, target, Access::Get).await?;
    ActivityLogger::record_view(
        uow,
        target.kind.entity_kind(),
        target.id,
        &party.profile.name,
        ctx,
        now,
    )
    .await?;
    Ok(party)
}

async fn update_in(
    uow: &mut dyn UnitOfWork,
    ctx: &TenantContext,
    target: PartyRef,
    patch: PartyPatch,
    now: Timestamp,
) -> CrmResult<Party> {
    let mut party = find_party(uow, ctx, target, Access::Modify).await?;
    apply_patch(&mut party, patch, now)?;
    party.touch(ctx.user_id, now);
    uow.party_update(&party).await?;
    Ok(party)
}

async fn delete_in(
    uow: &mut dyn UnitOfWork,
    ctx: &TenantContext,
    target: PartyRef,
    now: Timestamp,
) -> CrmResult<()> {
    let mut party = find_party(uow, ctx, target, Access::Modify).await?;
    party.deleted_at = Some(now);
    party.deleted_by = Some(ctx.user_id);
    uow.party_update(&party).await
}

async fn list_page(
    uow: &mut dyn UnitOfWork,
    ctx: &TenantContext,
    kind: PartyKind,
    params: &ListParams,
    base: Predicate,
    with_creator: bool,
    now: Timestamp,
) -> CrmResult<PartyListing> {
    let page = QueryComposer::new(ctx.tenant_id, base)
        .filter(activity_predicate(params.activity, now))
        .order(order_by(params.sort))
        .page(params.page)
        .parties(uow, kind)
        .await?;
    let items = decorate(uow, ctx, kind, page.items, with_creator).await?;
    Ok(PartyListing {
        kind,
        items,
        total: page.total,
        page: params.page,
        sort: params.sort,
        activity: params.activity,
        user_email: None,
    })
}

/// Attach interaction statistics and owner emails to a page of parties.
async fn decorate(
    uow: &mut dyn UnitOfWork,
    ctx: &TenantContext,
    kind: PartyKind,
    parties: Vec<Party>,
    with_creator: bool,
) -> CrmResult<Vec<PartySummary>> {
    let ids: Vec<RecordId> = parties.iter().map(|p| p.id).collect();
    let stats = StatsAggregator::stats_for(uow, ctx.tenant_id, kind, &ids).await?;

    let mut user_ids: Vec<UserId> = parties
        .iter()
        .flat_map(|p| [Some(p.created_by), p.assigned_to])
        .flatten()
        .collect();
    user_ids.sort();
    user_ids.dedup();
    let users = if user_ids.is_empty() {
        HashMap::new()
    } else {
        uow.users_by_ids(ctx.tenant_id, &user_ids).await?
    };
    let email = |id: UserId| users.get(&id).map(|u| u.email.clone());

    Ok(parties
        .into_iter()
        .map(|party| PartySummary {
            assigned_to_name: party
                .assigned_to
                .and_then(|id| email(id))
                .or_else(|| email(party.created_by)),
            created_by_name: if with_creator {
                email(party.created_by)
            } else {
                None
            },
            stats: stats.get(&party.id).copied().unwrap_or_default(),
            party,
        })
        .collect())
}

/// Validate every present field, then write them. Nothing changes on error.
fn apply_patch(party: &mut Party, patch: PartyPatch, now: Timestamp) -> CrmResult<()> {
    let mut next = party.clone();
    let profile = &mut next.profile;

    if let Some(name) = patch.name {
        profile.name = required("name", name)?;
    }
    if let Some(value) = patch.contact_person {
        profile.contact_person = clean(value);
    }
    if let Some(value) = patch.contact_title {
        profile.contact_title = clean(value);
    }
    if let Some(value) = patch.email {
        profile.email = clean(value);
    }
    if let Some(value) = patch.phone {
        profile.phone = phone("phone", value)?;
    }
    if let Some(value) = patch.phone_label {
        profile.phone_label = phone_label(value)?.unwrap_or_default();
    }
    if let Some(value) = patch.secondary_phone {
        profile.secondary_phone = phone("secondary_phone", value)?;
    }
    if let Some(value) = patch.secondary_phone_label {
        profile.secondary_phone_label = phone_label(value)?;
    }
    if let Some(value) = patch.address {
        profile.address = clean(value);
    }
    if let Some(value) = patch.city {
        profile.city = clean(value);
    }
    if let Some(value) = patch.state {
        profile.state = clean(value);
    }
    if let Some(value) = patch.zip {
        profile.zip = clean(value);
    }
    if let Some(value) = patch.notes {
        profile.notes = clean(value);
    }
    if let Some(value) = patch.business_type {
        profile.business_type = option::<BusinessType>(value)?.unwrap_or_default();
    }
    if let (Some(pipeline), Some(value)) = (next.pipeline.as_mut(), patch.lead_status) {
        let status = option::<LeadStatus>(value)?
            .ok_or_else(|| CrmError::from(ValidationError::missing("lead_status")))?;
        pipeline.transition(status, now);
    }

    *party = next;
    Ok(())
}
