//! In-memory store
//!
//! A single mutex guards all tables. A unit of work holds the lock for its
//! whole lifetime and mutates a private working copy, which replaces the
//! shared tables on commit. This gives serializable isolation and makes
//! rollback (explicit or by drop) free.

use crate::eval::{self, EvalContext, Row};
use crate::{NewUser, RecordQuery, Store, UnitOfWork};
use async_trait::async_trait;
use clientele_core::{
    ActivityLog, Contact, CrmError, CrmResult, EntityKind, Interaction, InteractionStats, Page,
    PageRequest, Party, PartyKind, Predicate, Project, RecordId, StorageError, TenantId, User,
    UserId,
};
use std::collections::{BTreeMap, HashMap, HashSet};
use std::sync::atomic::{AtomicBool, Ordering as AtomicOrdering};
use std::sync::Arc;
use tokio::sync::{Mutex, OwnedMutexGuard};

#[derive(Debug, Clone, Default)]
struct Sequences {
    users: i64,
    clients: i64,
    leads: i64,
    projects: i64,
    contacts: i64,
    interactions: i64,
    activity: i64,
}

fn next(counter: &mut i64) -> i64 {
    *counter += 1;
    *counter
}

#[derive(Debug, Clone, Default)]
struct Tables {
    users: BTreeMap<UserId, User>,
    clients: BTreeMap<RecordId, Party>,
    leads: BTreeMap<RecordId, Party>,
    projects: BTreeMap<RecordId, Project>,
    contacts: BTreeMap<RecordId, Contact>,
    interactions: Vec<Interaction>,
    activity: Vec<ActivityLog>,
    sequences: Sequences,
}

impl Tables {
    fn parties(&self, kind: PartyKind) -> &BTreeMap<RecordId, Party> {
        match kind {
            PartyKind::Client => &self.clients,
            PartyKind::Lead => &self.leads,
        }
    }

    fn parties_mut(&mut self, kind: PartyKind) -> &mut BTreeMap<RecordId, Party> {
        match kind {
            PartyKind::Client => &mut self.clients,
            PartyKind::Lead => &mut self.leads,
        }
    }

    fn eval_context(&self) -> EvalContext<'_> {
        EvalContext {
            users: &self.users,
            interactions: &self.interactions,
        }
    }

    fn find_first<'a, R: Row + Clone + 'a>(
        &self,
        mut rows: impl Iterator<Item = &'a R>,
        tenant: TenantId,
        filter: &Predicate,
        entity: EntityKind,
    ) -> CrmResult<Option<R>> {
        if !filter.pins_tenant(tenant) {
            return Err(StorageError::UnscopedQuery { entity }.into());
        }
        let cx = self.eval_context();
        Ok(rows.find(|row| eval::matches(filter, *row, &cx)).cloned())
    }

    fn run_query<'a, R: Row + Clone + 'a>(
        &self,
        rows: impl Iterator<Item = &'a R>,
        query: &RecordQuery,
        entity: EntityKind,
    ) -> CrmResult<Page<R>> {
        query.ensure_scoped(entity)?;
        let cx = self.eval_context();
        let mut matched: Vec<R> = rows
            .filter(|row| eval::matches(&query.filter, *row, &cx))
            .cloned()
            .collect();
        eval::sort_rows(&mut matched, query.ordering, &cx);
        let total = matched.len() as u64;
        let items = match query.window {
            Some(window) => apply_window(matched, window),
            None => matched,
        };
        Ok(Page { items, total })
    }
}

fn apply_window<R>(rows: Vec<R>, window: PageRequest) -> Vec<R> {
    let offset = usize::try_from(window.offset()).unwrap_or(usize::MAX);
    let limit = usize::try_from(window.limit()).unwrap_or(usize::MAX);
    rows.into_iter().skip(offset).take(limit).collect()
}

#[derive(Debug, Default)]
struct Faults {
    fail_commits: AtomicBool,
}

/// Transactional store kept entirely in process memory.
#[derive(Debug, Clone, Default)]
pub struct InMemoryStore {
    tables: Arc<Mutex<Tables>>,
    faults: Arc<Faults>,
}

impl InMemoryStore {
    pub fn new() -> Self {
        Self::default()
    }

    /// Make every subsequent commit fail until switched off again.
    pub fn set_fail_commits(&self, fail: bool) {
        self.faults.fail_commits.store(fail, AtomicOrdering::SeqCst);
    }
}

#[async_trait]
impl Store for InMemoryStore {
    async fn begin(&self) -> CrmResult<Box<dyn UnitOfWork>> {
        let guard = self.tables.clone().lock_owned().await;
        let working = guard.clone();
        Ok(Box::new(MemoryUnitOfWork {
            guard,
            working,
            faults: self.faults.clone(),
        }))
    }
}

struct MemoryUnitOfWork {
    guard: OwnedMutexGuard<Tables>,
    working: Tables,
    faults: Arc<Faults>,
}

fn missing(entity: impl Into<EntityKind>, id: RecordId) -> CrmError {
    CrmError::not_found(entity, id)
}

#[async_trait]
impl UnitOfWork for MemoryUnitOfWork {
    async fn user_insert(&mut self, user: &NewUser) -> CrmResult<UserId> {
        let id = UserId::new(next(&mut self.working.sequences.users));
        self.working.users.insert(
            id,
            User {
                id,
                tenant_id: user.tenant_id,
                email: user.email.clone(),
                is_active: user.is_active,
                roles: user.roles.clone(),
            },
        );
        Ok(id)
    }

    async fn user_get(&mut self, tenant: TenantId, id: UserId) -> CrmResult<Option<User>> {
        Ok(self
            .working
            .users
            .get(&id)
            .filter(|user| user.tenant_id == tenant)
            .cloned())
    }

    async fn user_find_by_email(
        &mut self,
        tenant: TenantId,
        email: &str,
    ) -> CrmResult<Option<User>> {
        Ok(self
            .working
            .users
            .values()
            .find(|user| user.tenant_id == tenant && user.email.eq_ignore_ascii_case(email))
            .cloned())
    }

    async fn users_by_ids(
        &mut self,
        tenant: TenantId,
        ids: &[UserId],
    ) -> CrmResult<HashMap<UserId, User>> {
        Ok(ids
            .iter()
            .filter_map(|id| self.working.users.get(id))
            .filter(|user| user.tenant_id == tenant)
            .map(|user| (user.id, user.clone()))
            .collect())
    }

    async fn party_insert(&mut self, party: &Party) -> CrmResult<RecordId> {
        let counter = match party.kind {
            PartyKind::Client => &mut self.working.sequences.clients,
            PartyKind::Lead => &mut self.working.sequences.leads,
        };
        let id = RecordId::new(next(counter));
        let mut row = party.clone();
        row.id = id;
        self.working.parties_mut(party.kind).insert(id, row);
        Ok(id)
    }

    async fn party_find(
        &mut self,
        kind: PartyKind,
        tenant: TenantId,
        filter: &Predicate,
    ) -> CrmResult<Option<Party>> {
        let tables = &self.working;
        tables.find_first(tables.parties(kind).values(), tenant, filter, kind.entity_kind())
    }

    async fn party_query(&mut self, kind: PartyKind, query: &RecordQuery) -> CrmResult<Page<Party>> {
        let tables = &self.working;
        tables.run_query(tables.parties(kind).values(), query, kind.entity_kind())
    }

    async fn party_update(&mut self, party: &Party) -> CrmResult<()> {
        match self.working.parties_mut(party.kind).get_mut(&party.id) {
            Some(row) if row.tenant_id == party.tenant_id && row.deleted_at.is_none() => {
                *row = party.clone();
                Ok(())
            }
            _ => Err(missing(party.kind, party.id)),
        }
    }

    async fn project_insert(&mut self, project: &Project) -> CrmResult<RecordId> {
        let id = RecordId::new(next(&mut self.working.sequences.projects));
        let mut row = project.clone();
        row.id = id;
        self.working.projects.insert(id, row);
        Ok(id)
    }

    async fn project_find(
        &mut self,
        tenant: TenantId,
        filter: &Predicate,
    ) -> CrmResult<Option<Project>> {
        let tables = &self.working;
        tables.find_first(tables.projects.values(), tenant, filter, EntityKind::Project)
    }

    async fn project_query(&mut self, query: &RecordQuery) -> CrmResult<Page<Project>> {
        let tables = &self.working;
        tables.run_query(tables.projects.values(), query, EntityKind::Project)
    }

    async fn project_update(&mut self, project: &Project) -> CrmResult<()> {
        match self.working.projects.get_mut(&project.id) {
            Some(row) if row.tenant_id == project.tenant_id => {
                *row = project.clone();
                Ok(())
            }
            _ => Err(missing(EntityKind::Project, project.id)),
        }
    }

    async fn project_delete(&mut self, tenant: TenantId, id: RecordId) -> CrmResult<bool> {
        let owned = self
            .working
            .projects
            .get(&id)
            .is_some_and(|row| row.tenant_id == tenant);
        Ok(owned && self.working.projects.remove(&id).is_some())
    }

    async fn contact_insert(&mut self, contact: &Contact) -> CrmResult<RecordId> {
        let id = RecordId::new(next(&mut self.working.sequences.contacts));
        let mut row = contact.clone();
        row.id = id;
        self.working.contacts.insert(id, row);
        Ok(id)
    }

    async fn contact_find(
        &mut self,
        tenant: TenantId,
        filter: &Predicate,
    ) -> CrmResult<Option<Contact>> {
        let tables = &self.working;
        tables.find_first(tables.contacts.values(), tenant, filter, EntityKind::Contact)
    }

    async fn contact_list(
        &mut self,
        tenant: TenantId,
        filter: &Predicate,
    ) -> CrmResult<Vec<Contact>> {
        if !filter.pins_tenant(tenant) {
            return Err(StorageError::UnscopedQuery {
                entity: EntityKind::Contact,
            }
            .into());
        }
        let cx = self.working.eval_context();
        Ok(self
            .working
            .contacts
            .values()
            .filter(|row| eval::matches(filter, *row, &cx))
            .cloned()
            .collect())
    }

    async fn contact_update(&mut self, contact: &Contact) -> CrmResult<()> {
        match self.working.contacts.get_mut(&contact.id) {
            Some(row) if row.tenant_id == contact.tenant_id => {
                *row = contact.clone();
                Ok(())
            }
            _ => Err(missing(EntityKind::Contact, contact.id)),
        }
    }

    async fn contact_delete(&mut self, tenant: TenantId, id: RecordId) -> CrmResult<bool> {
        let owned = self
            .working
            .contacts
            .get(&id)
            .is_some_and(|row| row.tenant_id == tenant);
        Ok(owned && self.working.contacts.remove(&id).is_some())
    }

    async fn interaction_insert(&mut self, interaction: &Interaction) -> CrmResult<RecordId> {
        let id = RecordId::new(next(&mut self.working.sequences.interactions));
        let mut row = interaction.clone();
        row.id = id;
        self.working.interactions.push(row);
        Ok(id)
    }

    async fn interaction_stats(
        &mut self,
        tenant: TenantId,
        kind: PartyKind,
        ids: &[RecordId],
    ) -> CrmResult<HashMap<RecordId, InteractionStats>> {
        let parties = self.working.parties(kind);
        let live: HashSet<RecordId> = ids
            .iter()
            .copied()
            .filter(|id| {
                parties
                    .get(id)
                    .is_some_and(|p| p.tenant_id == tenant && !p.is_deleted())
            })
            .collect();

        let mut stats: HashMap<RecordId, InteractionStats> = HashMap::new();
        for interaction in &self.working.interactions {
            if interaction.tenant_id != tenant
                || interaction.party.kind != kind
                || !live.contains(&interaction.party.id)
            {
                continue;
            }
            let entry = stats.entry(interaction.party.id).or_default();
            entry.interaction_count += 1;
            entry.last_interaction_at = entry
                .last_interaction_at
                .max(Some(interaction.contact_date));
        }
        Ok(stats)
    }

    async fn activity_append(&mut self, entry: &ActivityLog) -> CrmResult<RecordId> {
        let id = RecordId::new(next(&mut self.working.sequences.activity));
        let mut row = entry.clone();
        row.id = id;
        self.working.activity.push(row);
        Ok(id)
    }

    async fn activity_list(&mut self, tenant: TenantId) -> CrmResult<Vec<ActivityLog>> {
        Ok(self
            .working
            .activity
            .iter()
            .filter(|entry| entry.tenant_id == tenant)
            .cloned()
            .collect())
    }

    async fn commit(self: Box<Self>) -> CrmResult<()> {
        if self.faults.fail_commits.load(AtomicOrdering::SeqCst) {
            tracing::debug!("Commit rejected, discarding working copy");
            return Err(StorageError::TransactionFailed {
                reason: "commit rejected by store".to_string(),
            }
            .into());
        }
        let MemoryUnitOfWork {
            mut guard, working, ..
        } = *self;
        *guard = working;
        Ok(())
    }

    async fn rollback(self: Box<Self>) -> CrmResult<()> {
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::{Duration, TimeZone, Utc};
    use clientele_core::{Field, Ordering, PartyProfile, PartyRef, Role, Timestamp};
    use std::collections::BTreeSet;

    fn now() -> Timestamp {
        Utc.with_ymd_and_hms(2024, 6, 1, 12, 0, 0).unwrap()
    }

    fn party(kind: PartyKind, tenant: i64, name: &str, created_by: UserId) -> Party {
        let profile = PartyProfile {
            name: name.to_string(),
            ..PartyProfile::default()
        };
        Party::new(kind, TenantId::new(tenant), profile, created_by, now())
    }

    fn tenant_scope(tenant: i64) -> Predicate {
        Predicate::eq(Field::TenantId, TenantId::new(tenant))
    }

    #[tokio::test]
    async fn test_uncommitted_work_is_discarded_on_drop() {
        let store = InMemoryStore::new();
        {
            let mut uow = store.begin().await.unwrap();
            uow.party_insert(&party(PartyKind::Client, 1, "Acme", UserId::new(1)))
                .await
                .unwrap();
        }
        let mut uow = store.begin().await.unwrap();
        let page = uow
            .party_query(PartyKind::Client, &RecordQuery::new(TenantId::new(1), tenant_scope(1)))
            .await
            .unwrap();
        assert_eq!(page.total, 0);
    }

    #[tokio::test]
    async fn test_soft_deleted_party_is_not_writable() {
        let store = InMemoryStore::new();
        let mut uow = store.begin().await.unwrap();
        let id = uow
            .party_insert(&party(PartyKind::Client, 1, "Acme", UserId::new(1)))
            .await
            .unwrap();
        let filter = tenant_scope(1).and(Predicate::eq(Field::Id, id));
        let mut row = uow
            .party_find(PartyKind::Client, TenantId::new(1), &filter)
            .await
            .unwrap()
            .unwrap();
        let stale = row.clone();
        row.deleted_at = Some(now());
        row.deleted_by = Some(UserId::new(1));
        uow.party_update(&row).await.unwrap();

        let err = uow.party_update(&stale).await.unwrap_err();
        assert!(matches!(err, CrmError::NotFound { .. }));
        let stored = uow
            .party_find(PartyKind::Client, TenantId::new(1), &filter)
            .await
            .unwrap()
            .unwrap();
        assert_eq!(stored.deleted_at, Some(now()));
    }

    #[tokio::test]
    async fn test_commit_publishes_and_sequences_per_table() {
        let store = InMemoryStore::new();
        let mut uow = store.begin().await.unwrap();
        let c = uow
            .party_insert(&party(PartyKind::Client, 1, "Acme", UserId::new(1)))
            .await
            .unwrap();
        let l = uow
            .party_insert(&party(PartyKind::Lead, 1, "Bolt", UserId::new(1)))
            .await
            .unwrap();
        assert_eq!(c, RecordId::new(1));
        assert_eq!(l, RecordId::new(1));
        uow.commit().await.unwrap();

        let mut uow = store.begin().await.unwrap();
        let found = uow
            .party_find(
                PartyKind::Lead,
                TenantId::new(1),
                &tenant_scope(1).and(Predicate::eq(Field::Id, l)),
            )
            .await
            .unwrap();
        assert_eq!(found.map(|p| p.profile.name), Some("Bolt".to_string()));
    }

    #[tokio::test]
    async fn test_failed_commit_leaves_tables_untouched() {
        let store = InMemoryStore::new();
        store.set_fail_commits(true);
        let mut uow = store.begin().await.unwrap();
        uow.party_insert(&party(PartyKind::Client, 1, "Acme", UserId::new(1)))
            .await
            .unwrap();
        assert!(uow.commit().await.is_err());

        store.set_fail_commits(false);
        let mut uow = store.begin().await.unwrap();
        let page = uow
            .party_query(PartyKind::Client, &RecordQuery::new(TenantId::new(1), tenant_scope(1)))
            .await
            .unwrap();
        assert!(page.items.is_empty());
    }

    #[tokio::test]
    async fn test_unscoped_query_is_refused() {
        let store = InMemoryStore::new();
        let mut uow = store.begin().await.unwrap();
        let err = uow
            .party_query(
                PartyKind::Client,
                &RecordQuery::new(TenantId::new(1), Predicate::is_null(Field::DeletedAt)),
            )
            .await
            .unwrap_err();
        assert!(matches!(
            err,
            CrmError::Storage(StorageError::UnscopedQuery { .. })
        ));
    }

    #[tokio::test]
    async fn test_query_window_keeps_total() {
        let store = InMemoryStore::new();
        let mut uow = store.begin().await.unwrap();
        for i in 0..5 {
            uow.party_insert(&party(PartyKind::Client, 1, &format!("c{i}"), UserId::new(1)))
                .await
                .unwrap();
        }
        let query = RecordQuery::new(TenantId::new(1), tenant_scope(1))
            .ordered(Ordering::newest())
            .paged(PageRequest::new(Some(2), Some(2)));
        let page = uow.party_query(PartyKind::Client, &query).await.unwrap();
        assert_eq!(page.total, 5);
        let ids: Vec<i64> = page.items.iter().map(|p| p.id.get()).collect();
        // equal created_at, so id ascending decides
        assert_eq!(ids, vec![3, 4]);
    }

    #[tokio::test]
    async fn test_stats_skip_deleted_and_foreign_parties() {
        let store = InMemoryStore::new();
        let mut uow = store.begin().await.unwrap();
        let live = uow
            .party_insert(&party(PartyKind::Client, 1, "live", UserId::new(1)))
            .await
            .unwrap();
        let mut gone = party(PartyKind::Client, 1, "gone", UserId::new(1));
        gone.deleted_at = Some(now());
        let gone = uow.party_insert(&gone).await.unwrap();
        let foreign = uow
            .party_insert(&party(PartyKind::Client, 2, "other", UserId::new(9)))
            .await
            .unwrap();

        for (tenant, id, days) in [(1, live, 3), (1, live, 1), (1, gone, 1), (2, foreign, 1)] {
            uow.interaction_insert(&Interaction::new(
                TenantId::new(tenant),
                PartyRef::client(id),
                now() - Duration::days(days),
            ))
            .await
            .unwrap();
        }

        let stats = uow
            .interaction_stats(TenantId::new(1), PartyKind::Client, &[live, gone, foreign])
            .await
            .unwrap();
        assert_eq!(stats.len(), 1);
        assert_eq!(stats[&live].interaction_count, 2);
        assert_eq!(
            stats[&live].last_interaction_at,
            Some(now() - Duration::days(1))
        );
    }

    #[tokio::test]
    async fn test_user_lookup_is_tenant_scoped() {
        let store = InMemoryStore::new();
        let mut uow = store.begin().await.unwrap();
        let id = uow
            .user_insert(&NewUser {
                tenant_id: TenantId::new(1),
                email: "Admin@Example.com".to_string(),
                is_active: true,
                roles: BTreeSet::from([Role::Admin]),
            })
            .await
            .unwrap();
        assert!(uow.user_get(TenantId::new(2), id).await.unwrap().is_none());
        let found = uow
            .user_find_by_email(TenantId::new(1), "admin@example.com")
            .await
            .unwrap();
        assert_eq!(found.map(|u| u.id), Some(id));
    }
}
