//! Clientele Test Utilities
//!
//! Shared test infrastructure for the Clientele workspace:
//! - `World`: an in-memory store plus a pinned clock, with seeding helpers
//! - Mock notifiers (recording and failing)
//! - Proptest generators for keywords, roles and ownership layouts
//! - Assertions on `CrmError` classes

pub use clientele_core::{
    Clock, CrmError, CrmResult, EntityKind, ErrorKind, Field, FixedClock, Interaction, Party, PartyKind,
    PartyProfile, PartyRef, Predicate, Project, ProjectStatus, RecordId, Role, TenantContext, TenantId,
    Timestamp, UserId,
};
pub use clientele_engine::{AssignmentNotice, Engine, LogNotifier, Notifier, NotifyError};
pub use clientele_storage::{InMemoryStore, NewUser, Store};

use async_trait::async_trait;
use chrono::{TimeZone, Utc};
use std::collections::BTreeSet;
use std::sync::Arc;
use tokio::sync::Mutex;

// ============================================================================
// MOCK NOTIFIERS
// ============================================================================

/// Notifier that records every notice it is asked to deliver.
#[derive(Debug, Default)]
pub struct RecordingNotifier {
    sent: Mutex<Vec<AssignmentNotice>>,
}

impl RecordingNotifier {
    pub fn new() -> Self {
        Self::default()
    }

    pub async fn sent(&self) -> Vec<AssignmentNotice> {
        self.sent.lock().await.clone()
    }
}

#[async_trait]
impl Notifier for RecordingNotifier {
    async fn notify_assignment(&self, notice: &AssignmentNotice) -> Result<(), NotifyError> {
        self.sent.lock().await.push(notice.clone());
        Ok(())
    }
}

/// Notifier whose transport is always down.
#[derive(Debug, Clone, Copy, Default)]
pub struct FailingNotifier;

#[async_trait]
impl Notifier for FailingNotifier {
    async fn notify_assignment(&self, _notice: &AssignmentNotice) -> Result<(), NotifyError> {
        Err(NotifyError::Unavailable("smtp relay refused connection".to_string()))
    }
}

// ============================================================================
// WORLD
// ============================================================================

/// Instant every `World` is pinned to unless told otherwise.
pub fn reference_now() -> Timestamp {
    Utc.with_ymd_and_hms(2024, 6, 1, 12, 0, 0)
        .single()
        .unwrap_or_else(Utc::now)
}

/// In-memory store and fixed clock shared by a test.
#[derive(Debug, Clone)]
pub struct World {
    pub store: InMemoryStore,
    pub clock: FixedClock,
}

impl Default for World {
    fn default() -> Self {
        Self::at(reference_now())
    }
}

impl World {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn at(now: Timestamp) -> Self {
        Self {
            store: InMemoryStore::new(),
            clock: FixedClock::new(now),
        }
    }

    pub fn now(&self) -> Timestamp {
        self.clock.now()
    }

    pub fn days_ago(&self, days: i64) -> Timestamp {
        self.clock.days_ago(days)
    }

    /// Engine with a logging notifier.
    pub fn engine(&self) -> Engine {
        self.engine_with(Arc::new(LogNotifier))
    }

    pub fn engine_with(&self, notifier: Arc<dyn Notifier>) -> Engine {
        Engine::new(
            Arc::new(self.store.clone()),
            Arc::new(self.clock),
            notifier,
        )
    }

    /// Active user; returns the principal for acting as them.
    pub async fn add_user(
        &self,
        tenant: TenantId,
        email: &str,
        roles: &[Role],
    ) -> CrmResult<TenantContext> {
        let id = self.insert_user(tenant, email, true, roles).await?;
        let mut ctx = TenantContext::new(tenant, id, email);
        for role in roles {
            ctx = ctx.with_role(*role);
        }
        Ok(ctx)
    }

    pub async fn add_admin(&self, tenant: TenantId, email: &str) -> CrmResult<TenantContext> {
        self.add_user(tenant, email, &[Role::Admin, Role::User]).await
    }

    pub async fn add_inactive_user(&self, tenant: TenantId, email: &str) -> CrmResult<UserId> {
        self.insert_user(tenant, email, false, &[Role::User]).await
    }

    async fn insert_user(
        &self,
        tenant: TenantId,
        email: &str,
        is_active: bool,
        roles: &[Role],
    ) -> CrmResult<UserId> {
        let mut uow = self.store.begin().await?;
        let id = uow
            .user_insert(&NewUser {
                tenant_id: tenant,
                email: email.to_string(),
                is_active,
                roles: roles.iter().copied().collect::<BTreeSet<_>>(),
            })
            .await?;
        uow.commit().await?;
        Ok(id)
    }

    /// Start seeding a client or lead owned by `owner`.
    pub fn party<'w>(&'w self, kind: PartyKind, owner: &TenantContext) -> PartySeed<'w> {
        PartySeed {
            world: self,
            kind,
            tenant: owner.tenant_id,
            created_by: owner.user_id,
            name: format!("{} of {}", kind.entity_kind().label(), owner.email),
            created_at: self.now(),
            assigned_to: None,
        }
    }

    pub async fn add_interaction(
        &self,
        tenant: TenantId,
        party: PartyRef,
        contact_date: Timestamp,
    ) -> CrmResult<RecordId> {
        let mut uow = self.store.begin().await?;
        let id = uow
            .interaction_insert(&Interaction::new(tenant, party, contact_date))
            .await?;
        uow.commit().await?;
        Ok(id)
    }

    /// Soft delete bypassing visibility rules.
    pub async fn soft_delete(&self, tenant: TenantId, party: PartyRef, by: UserId) -> CrmResult<()> {
        let mut uow = self.store.begin().await?;
        let filter = Predicate::eq(Field::TenantId, tenant).and(Predicate::eq(Field::Id, party.id));
        let mut row = uow
            .party_find(party.kind, tenant, &filter)
            .await?
            .ok_or_else(|| CrmError::not_found(party.kind, party.id))?;
        row.deleted_at = Some(self.now());
        row.deleted_by = Some(by);
        uow.party_update(&row).await?;
        uow.commit().await
    }

    /// Project owned by `owner`, created `days_ago` days before now.
    pub async fn add_project(
        &self,
        owner: &TenantContext,
        name: &str,
        link: Option<PartyRef>,
        days_ago: i64,
    ) -> CrmResult<RecordId> {
        let project = Project {
            id: RecordId::new(0),
            tenant_id: owner.tenant_id,
            project_name: name.to_string(),
            project_type: "None".to_string(),
            project_status: ProjectStatus::Pending,
            project_description: None,
            notes: None,
            project_start: None,
            project_end: None,
            project_worth: None,
            link,
            created_by: owner.user_id,
            created_at: self.days_ago(days_ago),
        };
        let mut uow = self.store.begin().await?;
        let id = uow.project_insert(&project).await?;
        uow.commit().await?;
        Ok(id)
    }
}

/// Builder for a seeded client or lead.
pub struct PartySeed<'w> {
    world: &'w World,
    kind: PartyKind,
    tenant: TenantId,
    created_by: UserId,
    name: String,
    created_at: Timestamp,
    assigned_to: Option<UserId>,
}

impl PartySeed<'_> {
    pub fn named(mut self, name: &str) -> Self {
        self.name = name.to_string();
        self
    }

    pub fn created_days_ago(mut self, days: i64) -> Self {
        self.created_at = self.world.days_ago(days);
        self
    }

    pub fn created_at(mut self, at: Timestamp) -> Self {
        self.created_at = at;
        self
    }

    pub fn assigned_to(mut self, user: UserId) -> Self {
        self.assigned_to = Some(user);
        self
    }

    pub async fn insert(self) -> CrmResult<PartyRef> {
        let profile = PartyProfile {
            name: self.name,
            ..PartyProfile::default()
        };
        let mut party = Party::new(
            self.kind,
            self.tenant,
            profile,
            self.created_by,
            self.created_at,
        );
        party.assigned_to = self.assigned_to;

        let mut uow = self.world.store.begin().await?;
        let id = uow.party_insert(&party).await?;
        uow.commit().await?;
        Ok(PartyRef { kind: self.kind, id })
    }
}

// ============================================================================
// PROPTEST GENERATORS
// ============================================================================

pub mod generators {
    //! Proptest strategies for Clientele keywords and ownership layouts.

    use super::*;
    use clientele_core::{ActivityFilter, SortSpec};
    use proptest::prelude::*;

    pub fn arb_party_kind() -> impl Strategy<Value = PartyKind> {
        prop_oneof![Just(PartyKind::Client), Just(PartyKind::Lead)]
    }

    pub fn arb_activity_filter() -> impl Strategy<Value = ActivityFilter> {
        prop_oneof![
            Just(ActivityFilter::All),
            Just(ActivityFilter::Active),
            Just(ActivityFilter::Inactive),
            Just(ActivityFilter::New),
        ]
    }

    pub fn arb_sort_spec() -> impl Strategy<Value = SortSpec> {
        prop_oneof![
            Just(SortSpec::Newest),
            Just(SortSpec::Oldest),
            Just(SortSpec::Alphabetical),
            Just(SortSpec::Activity),
        ]
    }

    /// Arbitrary list keyword, including garbage and odd casing.
    pub fn arb_keyword() -> impl Strategy<Value = Option<String>> {
        prop::option::of(prop_oneof![
            Just("newest".to_string()),
            Just("OLDEST".to_string()),
            Just(" alphabetical ".to_string()),
            Just("activity".to_string()),
            Just("active".to_string()),
            Just("Inactive".to_string()),
            Just("new".to_string()),
            "[a-z]{0,12}",
        ])
    }

    /// One seeded party in a tenant of `users` users.
    #[derive(Debug, Clone, PartialEq, Eq)]
    pub struct PartyLayout {
        pub creator: usize,
        pub assignee: Option<usize>,
        pub deleted: bool,
        pub age_days: i64,
        /// Days ago of each interaction.
        pub interactions: Vec<i64>,
    }

    pub fn arb_party_layout(users: usize) -> impl Strategy<Value = PartyLayout> {
        (
            0..users,
            prop::option::of(0..users),
            prop::bool::weighted(0.2),
            0i64..200,
            prop::collection::vec(0i64..200, 0..4),
        )
            .prop_map(|(creator, assignee, deleted, age_days, interactions)| PartyLayout {
                creator,
                assignee,
                deleted,
                age_days,
                interactions,
            })
    }

    pub fn arb_layouts(users: usize, max: usize) -> impl Strategy<Value = Vec<PartyLayout>> {
        prop::collection::vec(arb_party_layout(users), 0..max)
    }
}

// ============================================================================
// ASSERTIONS
// ============================================================================

pub mod assertions {
    //! Assertions on engine error classes.

    use super::*;

    #[track_caller]
    pub fn assert_kind<T: std::fmt::Debug>(result: &CrmResult<T>, expected: ErrorKind) {
        match result {
            Err(err) if err.kind() == expected => {}
            other => panic!("Expected {expected:?} error, got: {other:?}"),
        }
    }

    #[track_caller]
    pub fn assert_not_found<T: std::fmt::Debug>(result: &CrmResult<T>) {
        assert_kind(result, ErrorKind::NotFound);
    }

    #[track_caller]
    pub fn assert_forbidden<T: std::fmt::Debug>(result: &CrmResult<T>) {
        assert_kind(result, ErrorKind::Forbidden);
    }

    #[track_caller]
    pub fn assert_validation<T: std::fmt::Debug>(result: &CrmResult<T>) {
        assert_kind(result, ErrorKind::Validation);
    }
}
