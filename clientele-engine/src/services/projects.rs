//! Project operations

use super::parties::{find_party, load_parties};
use super::{finish, Engine};
use crate::activity::project_activity_predicate;
use crate::activity_log::ActivityLogger;
use crate::composer::QueryComposer;
use crate::sort::project_order_by;
use crate::validation::{clean, loose_timestamp, option, required};
use crate::views::{ProjectListing, ProjectSummary};
use crate::visibility::{Access, VisibilityPolicy};
use clientele_core::{
    Capability, CrmError, CrmResult, EntityKind, Field, ListParams, NewProject, Ordering, Party,
    PartyKind, PartyRef, Predicate, Project, ProjectPatch, ProjectStatus, RecordId, TenantContext,
    Timestamp, UserId, ValidationError,
};
use clientele_storage::UnitOfWork;
use std::collections::HashMap;
use tracing::info;

/// Project type used when none is given.
const DEFAULT_PROJECT_TYPE: &str = "None";

impl Engine {
    pub async fn create_project(
        &self,
        ctx: &TenantContext,
        new: NewProject,
    ) -> CrmResult<Project> {
        let now = self.now();
        let mut project = Project {
            id: RecordId::new(0),
            tenant_id: ctx.tenant_id,
            project_name: required("project_name", new.project_name)?,
            project_type: clean(new.project_type)
                .unwrap_or_else(|| DEFAULT_PROJECT_TYPE.to_string()),
            project_status: option::<ProjectStatus>(new.project_status)?.unwrap_or_default(),
            project_description: clean(new.project_description),
            notes: clean(new.notes),
            project_start: loose_timestamp(new.project_start),
            project_end: loose_timestamp(new.project_end),
            project_worth: new.project_worth,
            link: link_from(new.client_id, new.lead_id)?,
            created_by: ctx.user_id,
            created_at: now,
        };

        let mut uow = self.begin().await?;
        let result = insert_in(&mut *uow, ctx, &project).await;
        project.id = finish(uow, result).await?;

        info!(
            tenant_id = %ctx.tenant_id,
            user_id = %ctx.user_id,
            project_id = %project.id,
            "Project created"
        );
        Ok(project)
    }

    /// Projects created by the caller.
    pub async fn list_projects(
        &self,
        ctx: &TenantContext,
        params: &ListParams,
    ) -> CrmResult<ProjectListing> {
        let base = VisibilityPolicy::visible_predicate(EntityKind::Project, ctx, Access::List);
        let now = self.now();
        let mut uow = self.begin().await?;
        let result = list_in(&mut *uow, ctx, params, base, false, now).await;
        finish(uow, result).await
    }

    /// Every project in the tenant with the owner of its linked party.
    /// Admin only.
    pub async fn list_all_projects(
        &self,
        ctx: &TenantContext,
        params: &ListParams,
    ) -> CrmResult<ProjectListing> {
        ctx.require(Capability::ViewAllTenantRecords)?;
        let base = VisibilityPolicy::visible_predicate(EntityKind::Project, ctx, Access::Tenant);
        let now = self.now();
        let mut uow = self.begin().await?;
        let result = list_in(&mut *uow, ctx, params, base, true, now).await;
        finish(uow, result).await
    }

    /// Projects linked to one client or lead, newest first.
    ///
    /// A parent that is missing, deleted or in another tenant is `NotFound`;
    /// one the caller neither created nor is assigned is `Forbidden`.
    pub async fn list_projects_by_party(
        &self,
        ctx: &TenantContext,
        parent: PartyRef,
    ) -> CrmResult<Vec<ProjectSummary>> {
        let mut uow = self.begin().await?;
        let result = by_party_in(&mut *uow, ctx, parent).await;
        finish(uow, result).await
    }

    /// Single fetch. Records a `viewed` entry.
    pub async fn get_project(&self, ctx: &TenantContext, id: RecordId) -> CrmResult<ProjectSummary> {
        let now = self.now();
        let mut uow = self.begin().await?;
        let result = get_in(&mut *uow, ctx, id, now).await;
        finish(uow, result).await
    }

    pub async fn update_project(
        &self,
        ctx: &TenantContext,
        id: RecordId,
        patch: ProjectPatch,
    ) -> CrmResult<Project> {
        let mut uow = self.begin().await?;
        let result = update_in(&mut *uow, ctx, id, patch).await;
        finish(uow, result).await
    }

    /// Hard delete.
    pub async fn delete_project(&self, ctx: &TenantContext, id: RecordId) -> CrmResult<()> {
        let mut uow = self.begin().await?;
        let result = delete_in(&mut *uow, ctx, id).await;
        finish(uow, result).await?;
        info!(
            tenant_id = %ctx.tenant_id,
            user_id = %ctx.user_id,
            project_id = %id,
            "Project deleted"
        );
        Ok(())
    }
}

/// A project links to a client, a lead or neither.
fn link_from(client_id: Option<RecordId>, lead_id: Option<RecordId>) -> CrmResult<Option<PartyRef>> {
    if client_id.is_some() && lead_id.is_some() {
        return Err(ValidationError::invalid(
            "client_id",
            "a project links to a client or a lead, not both",
        )
        .into());
    }
    Ok(PartyRef::from_columns(client_id, lead_id))
}

/// The linked party must be live and in the caller's tenant.
async fn ensure_link(
    uow: &mut dyn UnitOfWork,
    ctx: &TenantContext,
    link: Option<PartyRef>,
) -> CrmResult<()> {
    match link {
        Some(parent) => find_party(uow, ctx, parent, Access::Tenant).await.map(|_| ()),
        None => Ok(()),
    }
}

async fn insert_in(
    uow: &mut dyn UnitOfWork,
    ctx: &TenantContext,
    project: &Project,
) -> CrmResult<RecordId> {
    ensure_link(uow, ctx, project.link).await?;
    uow.project_insert(project).await
}

async fn find_project(
    uow: &mut dyn UnitOfWork,
    ctx: &TenantContext,
    id: RecordId,
    access: Access,
) -> CrmResult<Project> {
    let filter = VisibilityPolicy::by_id(EntityKind::Project, ctx, access, id);
    uow.project_find(ctx.tenant_id, &filter)
        .await?
        .ok_or_else(|| CrmError::not_found(EntityKind::Project, id))
}

async fn list_in(
    uow: &mut dyn UnitOfWork,
    ctx: &TenantContext,
    params: &ListParams,
    base: Predicate,
    with_owner: bool,
    now: Timestamp,
) -> CrmResult<ProjectListing> {
    let page = QueryComposer::new(ctx.tenant_id, base)
        .filter(project_activity_predicate(params.activity, now))
        .order(project_order_by(params.sort))
        .page(params.page)
        .projects(uow)
        .await?;
    let items = decorate(uow, ctx, page.items, with_owner).await?;
    Ok(ProjectListing {
        items,
        total: page.total,
        page: params.page,
        sort: params.sort,
        activity: params.activity,
    })
}

async fn by_party_in(
    uow: &mut dyn UnitOfWork,
    ctx: &TenantContext,
    parent: PartyRef,
) -> CrmResult<Vec<ProjectSummary>> {
    let party = find_party(uow, ctx, parent, Access::Tenant).await?;
    VisibilityPolicy::ensure_parent_access(&party, ctx)?;

    let column = match parent.kind {
        PartyKind::Client => Field::ClientId,
        PartyKind::Lead => Field::LeadId,
    };
    let filter = VisibilityPolicy::base(EntityKind::Project, ctx)
        .and(Predicate::eq(column, parent.id));
    let page = QueryComposer::new(ctx.tenant_id, filter)
        .order(Ordering::newest())
        .projects(uow)
        .await?;
    decorate(uow, ctx, page.items, false).await
}

async fn get_in(
    uow: &mut dyn UnitOfWork,
    ctx: &TenantContext,
    id: RecordId,
    now: Timestamp,
) -> CrmResult<ProjectSummary> {
    let project = find_project(uow, ctx, id, Access::Get).await?;
    ActivityLogger::record_view(uow, EntityKind::Project, id, &project.project_name, ctx, now)
        .await?;
    let mut summaries = decorate(uow, ctx, vec![project], false).await?;
    summaries
        .pop()
        .ok_or_else(|| CrmError::not_found(EntityKind::Project, id))
}

async fn update_in(
    uow: &mut dyn UnitOfWork,
    ctx: &TenantContext,
    id: RecordId,
    patch: ProjectPatch,
) -> CrmResult<Project> {
    let mut project = find_project(uow, ctx, id, Access::Modify).await?;
    let relinked = apply_patch(&mut project, patch)?;
    if relinked {
        ensure_link(uow, ctx, project.link).await?;
    }
    uow.project_update(&project).await?;
    Ok(project)
}

async fn delete_in(uow: &mut dyn UnitOfWork, ctx: &TenantContext, id: RecordId) -> CrmResult<()> {
    find_project(uow, ctx, id, Access::Modify).await?;
    if uow.project_delete(ctx.tenant_id, id).await? {
        Ok(())
    } else {
        Err(CrmError::not_found(EntityKind::Project, id))
    }
}

/// Attach linked party names and, for the admin view, the email of the
/// linked party's owner. Deleted parties contribute nothing.
async fn decorate(
    uow: &mut dyn UnitOfWork,
    ctx: &TenantContext,
    projects: Vec<Project>,
    with_owner: bool,
) -> CrmResult<Vec<ProjectSummary>> {
    let clients = load_parties(
        uow,
        ctx,
        PartyKind::Client,
        projects.iter().filter_map(Project::client_id),
    )
    .await?;
    let leads = load_parties(
        uow,
        ctx,
        PartyKind::Lead,
        projects.iter().filter_map(Project::lead_id),
    )
    .await?;

    let owner_of = |project: &Project| -> Option<UserId> {
        let party = match project.link? {
            PartyRef {
                kind: PartyKind::Client,
                id,
            } => clients.get(&id),
            PartyRef {
                kind: PartyKind::Lead,
                id,
            } => leads.get(&id),
        };
        party.map(Party::effective_owner)
    };

    let owners: HashMap<RecordId, UserId> = if with_owner {
        projects
            .iter()
            .filter_map(|p| owner_of(p).map(|owner| (p.id, owner)))
            .collect()
    } else {
        HashMap::new()
    };
    let mut owner_ids: Vec<UserId> = owners.values().copied().collect();
    owner_ids.sort();
    owner_ids.dedup();
    let users = if owner_ids.is_empty() {
        HashMap::new()
    } else {
        uow.users_by_ids(ctx.tenant_id, &owner_ids).await?
    };

    let name = |parties: &HashMap<RecordId, Party>, id: Option<RecordId>| {
        id.and_then(|id| parties.get(&id))
            .map(|party| party.profile.name.clone())
    };

    Ok(projects
        .into_iter()
        .map(|project| ProjectSummary {
            client_id: project.client_id(),
            lead_id: project.lead_id(),
            client_name: name(&clients, project.client_id()),
            lead_name: name(&leads, project.lead_id()),
            assigned_to_email: owners
                .get(&project.id)
                .and_then(|owner| users.get(owner))
                .map(|user| user.email.clone()),
            project,
        })
        .collect())
}

/// Validate every present field, then write them. Returns whether the party
/// link changed. Nothing changes on error.
fn apply_patch(project: &mut Project, patch: ProjectPatch) -> CrmResult<bool> {
    let mut next = project.clone();

    if let Some(value) = patch.project_name {
        next.project_name = required("project_name", value)?;
    }
    if let Some(value) = patch.project_type {
        next.project_type = clean(value).unwrap_or_else(|| DEFAULT_PROJECT_TYPE.to_string());
    }
    if let Some(value) = patch.project_status {
        next.project_status = option::<ProjectStatus>(value)?.unwrap_or_default();
    }
    if let Some(value) = patch.project_description {
        next.project_description = clean(value);
    }
    if let Some(value) = patch.notes {
        next.notes = clean(value);
    }
    if let Some(value) = patch.project_start {
        next.project_start = loose_timestamp(value);
    }
    if let Some(value) = patch.project_end {
        next.project_end = loose_timestamp(value);
    }
    if let Some(value) = patch.project_worth {
        next.project_worth = value;
    }

    let relinking = patch.client_id.is_some() || patch.lead_id.is_some();
    if relinking {
        let client_id = patch.client_id.unwrap_or_else(|| project.client_id());
        let lead_id = patch.lead_id.unwrap_or_else(|| project.lead_id());
        next.link = link_from(client_id, lead_id)?;
    }

    let relinked = next.link != project.link;
    *project = next;
    Ok(relinked)
}
