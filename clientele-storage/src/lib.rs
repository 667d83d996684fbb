//! Clientele Storage - Persistence Collaborator
//!
//! Defines the unit-of-work contract every store implements, plus the
//! in-memory store used by tests and demos and the SQL renderer used by the
//! PostgreSQL store in `clientele-api`.
//!
//! Each inbound operation opens exactly one [`UnitOfWork`]. All reads and
//! writes of the operation go through it; it is committed on success and
//! rolled back on any error. Dropping an unfinished unit of work rolls it
//! back.

mod eval;
mod memory;
pub mod sql;

pub use memory::InMemoryStore;

use async_trait::async_trait;
use clientele_core::{
    ActivityLog, Contact, CrmResult, EntityKind, Interaction, InteractionStats, Ordering, Page,
    PageRequest, Party, PartyKind, Predicate, Project, RecordId, Role, StorageError, TenantId,
    User, UserId,
};
use std::collections::{BTreeSet, HashMap};

/// Filter, order and optional page window for one entity table.
///
/// `filter` must pin `tenant_id` to `tenant` on every branch; stores refuse
/// anything else with [`StorageError::UnscopedQuery`].
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct RecordQuery {
    pub tenant: TenantId,
    pub filter: Predicate,
    pub ordering: Ordering,
    /// `None` returns every match.
    pub window: Option<PageRequest>,
}

impl RecordQuery {
    pub fn new(tenant: TenantId, filter: Predicate) -> Self {
        Self {
            tenant,
            filter,
            ordering: Ordering::default(),
            window: None,
        }
    }

    pub fn ordered(mut self, ordering: Ordering) -> Self {
        self.ordering = ordering;
        self
    }

    pub fn paged(mut self, window: PageRequest) -> Self {
        self.window = Some(window);
        self
    }

    pub(crate) fn ensure_scoped(&self, entity: EntityKind) -> CrmResult<()> {
        if self.filter.pins_tenant(self.tenant) {
            Ok(())
        } else {
            Err(StorageError::UnscopedQuery { entity }.into())
        }
    }
}

/// Fields for a user row. Users are provisioned outside the engine; stores
/// accept them for bootstrap and fixtures.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct NewUser {
    pub tenant_id: TenantId,
    pub email: String,
    pub is_active: bool,
    pub roles: BTreeSet<Role>,
}

/// Source of units of work.
#[async_trait]
pub trait Store: Send + Sync {
    /// Open a request-scoped transaction.
    async fn begin(&self) -> CrmResult<Box<dyn UnitOfWork>>;
}

/// One transaction against the store.
#[async_trait]
pub trait UnitOfWork: Send {
    // ========================================================================
    // USERS
    // ========================================================================

    async fn user_insert(&mut self, user: &NewUser) -> CrmResult<UserId>;

    async fn user_get(&mut self, tenant: TenantId, id: UserId) -> CrmResult<Option<User>>;

    async fn user_find_by_email(&mut self, tenant: TenantId, email: &str)
        -> CrmResult<Option<User>>;

    /// Batch lookup. Ids outside the tenant are silently absent.
    async fn users_by_ids(
        &mut self,
        tenant: TenantId,
        ids: &[UserId],
    ) -> CrmResult<HashMap<UserId, User>>;

    // ========================================================================
    // CLIENTS AND LEADS
    // ========================================================================

    /// Insert and return the assigned id. `party.id` is ignored.
    async fn party_insert(&mut self, party: &Party) -> CrmResult<RecordId>;

    /// First match by id order, if any.
    async fn party_find(
        &mut self,
        kind: PartyKind,
        tenant: TenantId,
        filter: &Predicate,
    ) -> CrmResult<Option<Party>>;

    /// Filter, order and window. `total` counts matches before windowing.
    async fn party_query(&mut self, kind: PartyKind, query: &RecordQuery) -> CrmResult<Page<Party>>;

    /// Overwrite the stored row with the same kind, tenant and id.
    ///
    /// Only live rows are writable: if the stored row is already
    /// soft-deleted, for instance by a concurrent unit of work that
    /// committed after this one read it, the update fails with `NotFound`.
    async fn party_update(&mut self, party: &Party) -> CrmResult<()>;

    // ========================================================================
    // PROJECTS
    // ========================================================================

    async fn project_insert(&mut self, project: &Project) -> CrmResult<RecordId>;

    async fn project_find(
        &mut self,
        tenant: TenantId,
        filter: &Predicate,
    ) -> CrmResult<Option<Project>>;

    async fn project_query(&mut self, query: &RecordQuery) -> CrmResult<Page<Project>>;

    async fn project_update(&mut self, project: &Project) -> CrmResult<()>;

    /// Hard delete. Returns whether a row was removed.
    async fn project_delete(&mut self, tenant: TenantId, id: RecordId) -> CrmResult<bool>;

    // ========================================================================
    // CONTACTS
    // ========================================================================

    async fn contact_insert(&mut self, contact: &Contact) -> CrmResult<RecordId>;

    async fn contact_find(
        &mut self,
        tenant: TenantId,
        filter: &Predicate,
    ) -> CrmResult<Option<Contact>>;

    /// Every match, ordered by id.
    async fn contact_list(&mut self, tenant: TenantId, filter: &Predicate)
        -> CrmResult<Vec<Contact>>;

    async fn contact_update(&mut self, contact: &Contact) -> CrmResult<()>;

    async fn contact_delete(&mut self, tenant: TenantId, id: RecordId) -> CrmResult<bool>;

    // ========================================================================
    // INTERACTIONS
    // ========================================================================

    async fn interaction_insert(&mut self, interaction: &Interaction) -> CrmResult<RecordId>;

    /// Grouped count and latest `contact_date` for the given parties of one
    /// kind, in a single pass. Parties without interactions, soft-deleted
    /// parties and ids outside the tenant are absent from the map.
    async fn interaction_stats(
        &mut self,
        tenant: TenantId,
        kind: PartyKind,
        ids: &[RecordId],
    ) -> CrmResult<HashMap<RecordId, InteractionStats>>;

    // ========================================================================
    // ACTIVITY LOG
    // ========================================================================

    async fn activity_append(&mut self, entry: &ActivityLog) -> CrmResult<RecordId>;

    /// Entries for one tenant, oldest first.
    async fn activity_list(&mut self, tenant: TenantId) -> CrmResult<Vec<ActivityLog>>;

    // ========================================================================
    // TRANSACTION CONTROL
    // ========================================================================

    async fn commit(self: Box<Self>) -> CrmResult<()>;

    async fn rollback(self: Box<Self>) -> CrmResult<()>;
}
