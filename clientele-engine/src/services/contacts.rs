//! Contact operations
//!
//! Contacts hang off exactly one client or lead. Creating or listing them
//! requires that the caller can see the parent; updates and deletes are
//! scoped to the tenant only.

use super::parties::find_party;
use super::{finish, Engine};
use crate::validation::{clean, phone, phone_label};
use crate::views::ContactView;
use crate::visibility::{Access, VisibilityPolicy};
use clientele_core::{
    Contact, ContactPatch, CrmError, CrmResult, EntityKind, Field, NewContact, PartyKind,
    PartyRef, Predicate, RecordId, TenantContext, ValidationError,
};
use clientele_storage::UnitOfWork;
use tracing::info;

impl Engine {
    /// Contacts of one parent. No parent means an empty list.
    pub async fn list_contacts(
        &self,
        ctx: &TenantContext,
        parent: Option<PartyRef>,
    ) -> CrmResult<Vec<ContactView>> {
        let Some(parent) = parent else {
            return Ok(Vec::new());
        };
        let mut uow = self.begin().await?;
        let result = list_in(&mut *uow, ctx, parent).await;
        finish(uow, result).await
    }

    pub async fn create_contact(
        &self,
        ctx: &TenantContext,
        new: NewContact,
    ) -> CrmResult<ContactView> {
        let parent = parent_from(new.client_id, new.lead_id)?;
        let mut contact = Contact {
            id: RecordId::new(0),
            tenant_id: ctx.tenant_id,
            parent,
            first_name: clean(new.first_name),
            last_name: clean(new.last_name),
            title: clean(new.title),
            email: clean(new.email),
            phone: phone("phone", new.phone)?,
            phone_label: phone_label(new.phone_label)?,
            secondary_phone: phone("secondary_phone", new.secondary_phone)?,
            secondary_phone_label: phone_label(new.secondary_phone_label)?,
            notes: clean(new.notes),
        };

        let mut uow = self.begin().await?;
        let result = insert_in(&mut *uow, ctx, &contact).await;
        contact.id = finish(uow, result).await?;

        info!(
            tenant_id = %ctx.tenant_id,
            user_id = %ctx.user_id,
            contact_id = %contact.id,
            parent = %parent.kind,
            parent_id = %parent.id,
            "Contact created"
        );
        Ok(contact.into())
    }

    pub async fn update_contact(
        &self,
        ctx: &TenantContext,
        id: RecordId,
        patch: ContactPatch,
    ) -> CrmResult<ContactView> {
        let mut uow = self.begin().await?;
        let result = update_in(&mut *uow, ctx, id, patch).await;
        finish(uow, result).await.map(ContactView::from)
    }

    /// Hard delete.
    pub async fn delete_contact(&self, ctx: &TenantContext, id: RecordId) -> CrmResult<()> {
        let mut uow = self.begin().await?;
        let result = delete_in(&mut *uow, ctx, id).await;
        finish(uow, result).await
    }
}

fn parent_from(client_id: Option<RecordId>, lead_id: Option<RecordId>) -> CrmResult<PartyRef> {
    match (client_id, lead_id) {
        (Some(_), Some(_)) => Err(ValidationError::invalid(
            "client_id",
            "a contact belongs to a client or a lead, not both",
        )
        .into()),
        (client_id, lead_id) => PartyRef::from_columns(client_id, lead_id)
            .ok_or_else(|| ValidationError::missing("client_id or lead_id").into()),
    }
}

fn parent_filter(ctx: &TenantContext, parent: PartyRef) -> Predicate {
    let column = match parent.kind {
        PartyKind::Client => Field::ClientId,
        PartyKind::Lead => Field::LeadId,
    };
    VisibilityPolicy::base(EntityKind::Contact, ctx).and(Predicate::eq(column, parent.id))
}

async fn list_in(
    uow: &mut dyn UnitOfWork,
    ctx: &TenantContext,
    parent: PartyRef,
) -> CrmResult<Vec<ContactView>> {
    find_party(uow, ctx, parent, Access::Get).await?;
    let contacts = uow
        .contact_list(ctx.tenant_id, &parent_filter(ctx, parent))
        .await?;
    Ok(contacts.into_iter().map(ContactView::from).collect())
}

async fn insert_in(
    uow: &mut dyn UnitOfWork,
    ctx: &TenantContext,
    contact: &Contact,
) -> CrmResult<RecordId> {
    find_party(uow, ctx, contact.parent, Access::Get).await?;
    uow.contact_insert(contact).await
}

async fn find_contact(
    uow: &mut dyn UnitOfWork,
    ctx: &TenantContext,
    id: RecordId,
) -> CrmResult<Contact> {
    let filter = VisibilityPolicy::by_id(EntityKind::Contact, ctx, Access::Modify, id);
    uow.contact_find(ctx.tenant_id, &filter)
        .await?
        .ok_or_else(|| CrmError::not_found(EntityKind::Contact, id))
}

async fn update_in(
    uow: &mut dyn UnitOfWork,
    ctx: &TenantContext,
    id: RecordId,
    patch: ContactPatch,
) -> CrmResult<Contact> {
    let mut contact = find_contact(uow, ctx, id).await?;
    apply_patch(&mut contact, patch)?;
    uow.contact_update(&contact).await?;
    Ok(contact)
}

async fn delete_in(uow: &mut dyn UnitOfWork, ctx: &TenantContext, id: RecordId) -> CrmResult<()> {
    if uow.contact_delete(ctx.tenant_id, id).await? {
        Ok(())
    } else {
        Err(CrmError::not_found(EntityKind::Contact, id))
    }
}

fn apply_patch(contact: &mut Contact, patch: ContactPatch) -> CrmResult<()> {
    let mut next = contact.clone();
    if let Some(value) = patch.first_name {
        next.first_name = clean(value);
    }
    if let Some(value) = patch.last_name {
        next.last_name = clean(value);
    }
    if let Some(value) = patch.title {
        next.title = clean(value);
    }
    if let Some(value) = patch.email {
        next.email = clean(value);
    }
    if let Some(value) = patch.phone {
        next.phone = phone("phone", value)?;
    }
    if let Some(value) = patch.phone_label {
        next.phone_label = phone_label(value)?;
    }
    if let Some(value) = patch.secondary_phone {
        next.secondary_phone = phone("secondary_phone", value)?;
    }
    if let Some(value) = patch.secondary_phone_label {
        next.secondary_phone_label = phone_label(value)?;
    }
    if let Some(value) = patch.notes {
        next.notes = clean(value);
    }
    *contact = next;
    Ok(())
}
