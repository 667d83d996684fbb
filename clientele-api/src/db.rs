//! PostgreSQL Store
//!
//! Implements the storage contract over a `deadpool-postgres` pool. Each unit
//! of work checks out one connection and wraps it in `BEGIN` / `COMMIT`.
//! Filters and orderings are rendered by `clientele_storage::sql`; this
//! module only binds parameters and maps rows.
//!
//! A unit of work dropped without commit or rollback detaches its
//! connection from the pool instead of returning it, so the server aborts
//! the open transaction when the connection closes.

use crate::error::ApiResult;
use async_trait::async_trait;
use clientele_core::{
    ActivityAction, ActivityLog, BusinessType, Contact, CrmError, CrmResult, EntityKind,
    Interaction, InteractionStats, LeadPipeline, LeadStatus, OptionParseError, Page, Party,
    PartyKind, PartyProfile, PartyRef, PhoneLabel, Predicate, Project, ProjectStatus, RecordId,
    Role, StorageError, TenantId, Timestamp, User, UserId, Value,
};
use clientele_storage::sql::{self, SqlQuery, Table};
use clientele_storage::{NewUser, RecordQuery, Store, UnitOfWork};
use deadpool_postgres::{Object, Pool};
use std::collections::{BTreeSet, HashMap};
use tokio_postgres::types::{FromSql, ToSql};
use tokio_postgres::Row;

/// Schema created by [`PgStore::bootstrap`]. Idempotent.
pub const BOOTSTRAP_DDL: &str = r#"
CREATE TABLE IF NOT EXISTS users (
    id BIGSERIAL PRIMARY KEY,
    tenant_id BIGINT NOT NULL,
    email TEXT NOT NULL,
    is_active BOOLEAN NOT NULL DEFAULT TRUE,
    roles TEXT[] NOT NULL DEFAULT '{}'
);
CREATE UNIQUE INDEX IF NOT EXISTS users_tenant_email ON users (tenant_id, lower(email));

CREATE TABLE IF NOT EXISTS clients (
    id BIGSERIAL PRIMARY KEY,
    tenant_id BIGINT NOT NULL,
    name TEXT NOT NULL,
    contact_person TEXT,
    contact_title TEXT,
    email TEXT,
    phone TEXT,
    phone_label TEXT NOT NULL DEFAULT 'work',
    secondary_phone TEXT,
    secondary_phone_label TEXT,
    address TEXT,
    city TEXT,
    state TEXT,
    zip TEXT,
    notes TEXT,
    type TEXT NOT NULL DEFAULT 'None',
    created_by BIGINT NOT NULL REFERENCES users (id),
    created_at TIMESTAMPTZ NOT NULL,
    assigned_to BIGINT REFERENCES users (id),
    updated_by BIGINT REFERENCES users (id),
    updated_at TIMESTAMPTZ,
    deleted_by BIGINT REFERENCES users (id),
    deleted_at TIMESTAMPTZ
);
CREATE INDEX IF NOT EXISTS clients_tenant_owner ON clients (tenant_id, assigned_to, created_by);

CREATE TABLE IF NOT EXISTS leads (
    id BIGSERIAL PRIMARY KEY,
    tenant_id BIGINT NOT NULL,
    name TEXT NOT NULL,
    contact_person TEXT,
    contact_title TEXT,
    email TEXT,
    phone TEXT,
    phone_label TEXT NOT NULL DEFAULT 'work',
    secondary_phone TEXT,
    secondary_phone_label TEXT,
    address TEXT,
    city TEXT,
    state TEXT,
    zip TEXT,
    notes TEXT,
    type TEXT NOT NULL DEFAULT 'None',
    created_by BIGINT NOT NULL REFERENCES users (id),
    created_at TIMESTAMPTZ NOT NULL,
    assigned_to BIGINT REFERENCES users (id),
    updated_by BIGINT REFERENCES users (id),
    updated_at TIMESTAMPTZ,
    deleted_by BIGINT REFERENCES users (id),
    deleted_at TIMESTAMPTZ,
    lead_status TEXT NOT NULL DEFAULT 'open',
    converted_on TIMESTAMPTZ
);
CREATE INDEX IF NOT EXISTS leads_tenant_owner ON leads (tenant_id, assigned_to, created_by);

CREATE TABLE IF NOT EXISTS projects (
    id BIGSERIAL PRIMARY KEY,
    tenant_id BIGINT NOT NULL,
    project_name TEXT NOT NULL,
    type TEXT NOT NULL DEFAULT 'None',
    project_status TEXT NOT NULL DEFAULT 'pending',
    project_description TEXT,
    notes TEXT,
    project_start TIMESTAMPTZ,
    project_end TIMESTAMPTZ,
    project_worth DOUBLE PRECISION,
    client_id BIGINT REFERENCES clients (id),
    lead_id BIGINT REFERENCES leads (id),
    created_by BIGINT NOT NULL REFERENCES users (id),
    created_at TIMESTAMPTZ NOT NULL,
    CHECK (client_id IS NULL OR lead_id IS NULL)
);

CREATE TABLE IF NOT EXISTS contacts (
    id BIGSERIAL PRIMARY KEY,
    tenant_id BIGINT NOT NULL,
    client_id BIGINT REFERENCES clients (id),
    lead_id BIGINT REFERENCES leads (id),
    first_name TEXT,
    last_name TEXT,
    title TEXT,
    email TEXT,
    phone TEXT,
    phone_label TEXT,
    secondary_phone TEXT,
    secondary_phone_label TEXT,
    notes TEXT,
    CHECK ((client_id IS NULL) <> (lead_id IS NULL))
);

CREATE TABLE IF NOT EXISTS interactions (
    id BIGSERIAL PRIMARY KEY,
    tenant_id BIGINT NOT NULL,
    client_id BIGINT REFERENCES clients (id),
    lead_id BIGINT REFERENCES leads (id),
    contact_date TIMESTAMPTZ NOT NULL,
    summary TEXT,
    outcome TEXT,
    notes TEXT,
    follow_up TIMESTAMPTZ,
    CHECK ((client_id IS NULL) <> (lead_id IS NULL))
);
CREATE INDEX IF NOT EXISTS interactions_client ON interactions (tenant_id, client_id, contact_date);
CREATE INDEX IF NOT EXISTS interactions_lead ON interactions (tenant_id, lead_id, contact_date);

CREATE TABLE IF NOT EXISTS activity_logs (
    id BIGSERIAL PRIMARY KEY,
    tenant_id BIGINT NOT NULL,
    user_id BIGINT NOT NULL REFERENCES users (id),
    action TEXT NOT NULL,
    entity_type TEXT NOT NULL,
    entity_id BIGINT NOT NULL,
    description TEXT NOT NULL,
    "timestamp" TIMESTAMPTZ NOT NULL
);
"#;

// ============================================================================
// COLUMN LISTS
// ============================================================================
//
// `tenant_id` comes first in every list: `update_sql` scopes on `$1`.

const USER_COLUMNS: &[&str] = &["tenant_id", "email", "is_active", "roles"];

const PARTY_COLUMNS: &[&str] = &[
    "tenant_id",
    "name",
    "contact_person",
    "contact_title",
    "email",
    "phone",
    "phone_label",
    "secondary_phone",
    "secondary_phone_label",
    "address",
    "city",
    "state",
    "zip",
    "notes",
    "type",
    "created_by",
    "created_at",
    "assigned_to",
    "updated_by",
    "updated_at",
    "deleted_by",
    "deleted_at",
];

const LEAD_COLUMNS: &[&str] = &["lead_status", "converted_on"];

const PROJECT_COLUMNS: &[&str] = &[
    "tenant_id",
    "project_name",
    "type",
    "project_status",
    "project_description",
    "notes",
    "project_start",
    "project_end",
    "project_worth",
    "client_id",
    "lead_id",
    "created_by",
    "created_at",
];

const CONTACT_COLUMNS: &[&str] = &[
    "tenant_id",
    "client_id",
    "lead_id",
    "first_name",
    "last_name",
    "title",
    "email",
    "phone",
    "phone_label",
    "secondary_phone",
    "secondary_phone_label",
    "notes",
];

const INTERACTION_COLUMNS: &[&str] = &[
    "tenant_id",
    "client_id",
    "lead_id",
    "contact_date",
    "summary",
    "outcome",
    "notes",
    "follow_up",
];

const ACTIVITY_COLUMNS: &[&str] = &[
    "tenant_id",
    "user_id",
    "action",
    "entity_type",
    "entity_id",
    "description",
    "\"timestamp\"",
];

fn party_columns(kind: PartyKind) -> Vec<&'static str> {
    let mut columns = PARTY_COLUMNS.to_vec();
    if kind == PartyKind::Lead {
        columns.extend_from_slice(LEAD_COLUMNS);
    }
    columns
}

fn insert_sql(table: &str, columns: &[&str]) -> String {
    let placeholders: Vec<String> = (1..=columns.len()).map(|i| format!("${i}")).collect();
    format!(
        "INSERT INTO {table} ({}) VALUES ({}) RETURNING id",
        columns.join(", "),
        placeholders.join(", ")
    )
}

/// Overwrite every column of one row. `$1` is the tenant, the last
/// parameter the id.
fn update_sql(table: &str, columns: &[&str]) -> String {
    let sets: Vec<String> = columns
        .iter()
        .enumerate()
        .skip(1)
        .map(|(i, column)| format!("{column} = ${}", i + 1))
        .collect();
    format!(
        "UPDATE {table} SET {} WHERE tenant_id = $1 AND id = ${}",
        sets.join(", "),
        columns.len() + 1
    )
}

/// `update_sql` restricted to rows not yet soft-deleted. Under READ
/// COMMITTED the condition is rechecked against a row version committed
/// after our read, so a concurrent soft delete makes this match nothing.
fn live_update_sql(table: &str, columns: &[&str]) -> String {
    format!("{} AND deleted_at IS NULL", update_sql(table, columns))
}

// ============================================================================
// PARAMETER BINDING
// ============================================================================

type SqlParam = Box<dyn ToSql + Sync + Send>;

fn refs(params: &[SqlParam]) -> Vec<&(dyn ToSql + Sync)> {
    params
        .iter()
        .map(|p| p.as_ref() as &(dyn ToSql + Sync))
        .collect()
}

fn bind_values(values: &[Value]) -> Vec<SqlParam> {
    values
        .iter()
        .map(|value| -> SqlParam {
            match value {
                Value::Int(n) => Box::new(*n),
                Value::Text(s) => Box::new(s.clone()),
                Value::Time(t) => Box::new(*t),
            }
        })
        .collect()
}

fn text<T: ToString>(value: Option<T>) -> SqlParam {
    Box::new(value.map(|v| v.to_string()))
}

fn party_values(party: &Party) -> Vec<SqlParam> {
    let p = &party.profile;
    let mut values: Vec<SqlParam> = vec![
        Box::new(party.tenant_id.get()),
        Box::new(p.name.clone()),
        Box::new(p.contact_person.clone()),
        Box::new(p.contact_title.clone()),
        Box::new(p.email.clone()),
        Box::new(p.phone.clone()),
        Box::new(p.phone_label.as_db_str()),
        Box::new(p.secondary_phone.clone()),
        text(p.secondary_phone_label),
        Box::new(p.address.clone()),
        Box::new(p.city.clone()),
        Box::new(p.state.clone()),
        Box::new(p.zip.clone()),
        Box::new(p.notes.clone()),
        Box::new(p.business_type.as_db_str()),
        Box::new(party.created_by.get()),
        Box::new(party.created_at),
        Box::new(party.assigned_to.map(UserId::get)),
        Box::new(party.updated_by.map(UserId::get)),
        Box::new(party.updated_at),
        Box::new(party.deleted_by.map(UserId::get)),
        Box::new(party.deleted_at),
    ];
    if party.kind == PartyKind::Lead {
        let pipeline = party.pipeline.unwrap_or_default();
        values.push(Box::new(pipeline.lead_status.as_db_str()));
        values.push(Box::new(pipeline.converted_on));
    }
    values
}

fn project_values(project: &Project) -> Vec<SqlParam> {
    vec![
        Box::new(project.tenant_id.get()),
        Box::new(project.project_name.clone()),
        Box::new(project.project_type.clone()),
        Box::new(project.project_status.as_db_str()),
        Box::new(project.project_description.clone()),
        Box::new(project.notes.clone()),
        Box::new(project.project_start),
        Box::new(project.project_end),
        Box::new(project.project_worth),
        Box::new(project.client_id().map(RecordId::get)),
        Box::new(project.lead_id().map(RecordId::get)),
        Box::new(project.created_by.get()),
        Box::new(project.created_at),
    ]
}

fn contact_values(contact: &Contact) -> Vec<SqlParam> {
    vec![
        Box::new(contact.tenant_id.get()),
        Box::new(contact.client_id().map(RecordId::get)),
        Box::new(contact.lead_id().map(RecordId::get)),
        Box::new(contact.first_name.clone()),
        Box::new(contact.last_name.clone()),
        Box::new(contact.title.clone()),
        Box::new(contact.email.clone()),
        Box::new(contact.phone.clone()),
        text(contact.phone_label),
        Box::new(contact.secondary_phone.clone()),
        text(contact.secondary_phone_label),
        Box::new(contact.notes.clone()),
    ]
}

// ============================================================================
// ROW DECODING
// ============================================================================

struct RowReader<'r> {
    row: &'r Row,
    entity: EntityKind,
}

impl<'r> RowReader<'r> {
    fn new(row: &'r Row, entity: impl Into<EntityKind>) -> Self {
        Self {
            row,
            entity: entity.into(),
        }
    }

    fn decode_error(&self, reason: String) -> CrmError {
        StorageError::RowDecode {
            entity: self.entity,
            reason,
        }
        .into()
    }

    fn get<T>(&self, column: &str) -> CrmResult<T>
    where
        T: for<'a> FromSql<'a>,
    {
        self.row
            .try_get(column)
            .map_err(|e| self.decode_error(format!("{column}: {e}")))
    }

    fn option_set<T>(
        &self,
        column: &str,
        parse: impl Fn(&str) -> Result<T, OptionParseError>,
    ) -> CrmResult<T> {
        let raw: String = self.get(column)?;
        parse(&raw).map_err(|e| self.decode_error(e.to_string()))
    }

    fn optional_option_set<T>(
        &self,
        column: &str,
        parse: impl Fn(&str) -> Result<T, OptionParseError>,
    ) -> CrmResult<Option<T>> {
        let raw: Option<String> = self.get(column)?;
        raw.as_deref()
            .map(|s| parse(s).map_err(|e| self.decode_error(e.to_string())))
            .transpose()
    }

    fn id(&self, column: &str) -> CrmResult<RecordId> {
        self.get::<i64>(column).map(RecordId::new)
    }

    fn optional_id(&self, column: &str) -> CrmResult<Option<RecordId>> {
        Ok(self.get::<Option<i64>>(column)?.map(RecordId::new))
    }

    fn user(&self, column: &str) -> CrmResult<UserId> {
        self.get::<i64>(column).map(UserId::new)
    }

    fn optional_user(&self, column: &str) -> CrmResult<Option<UserId>> {
        Ok(self.get::<Option<i64>>(column)?.map(UserId::new))
    }

    fn tenant(&self) -> CrmResult<TenantId> {
        self.get::<i64>("tenant_id").map(TenantId::new)
    }

    fn parent(&self) -> CrmResult<Option<PartyRef>> {
        Ok(PartyRef::from_columns(
            self.optional_id("client_id")?,
            self.optional_id("lead_id")?,
        ))
    }
}

fn user_from_row(row: &Row) -> CrmResult<User> {
    let r = RowReader::new(row, EntityKind::Client);
    let roles: Vec<String> = r.get("roles")?;
    Ok(User {
        id: r.user("id")?,
        tenant_id: r.tenant()?,
        email: r.get("email")?,
        is_active: r.get("is_active")?,
        roles: roles
            .iter()
            .filter_map(|name| Role::from_db_str(name))
            .collect::<BTreeSet<_>>(),
    })
}

fn party_from_row(kind: PartyKind, row: &Row) -> CrmResult<Party> {
    let r = RowReader::new(row, kind);
    let profile = PartyProfile {
        name: r.get("name")?,
        contact_person: r.get("contact_person")?,
        contact_title: r.get("contact_title")?,
        email: r.get("email")?,
        phone: r.get("phone")?,
        phone_label: r.option_set("phone_label", PhoneLabel::from_db_str)?,
        secondary_phone: r.get("secondary_phone")?,
        secondary_phone_label: r
            .optional_option_set("secondary_phone_label", PhoneLabel::from_db_str)?,
        address: r.get("address")?,
        city: r.get("city")?,
        state: r.get("state")?,
        zip: r.get("zip")?,
        notes: r.get("notes")?,
        business_type: r.option_set("type", BusinessType::from_db_str)?,
    };
    let pipeline = match kind {
        PartyKind::Client => None,
        PartyKind::Lead => Some(LeadPipeline {
            lead_status: r.option_set("lead_status", LeadStatus::from_db_str)?,
            converted_on: r.get("converted_on")?,
        }),
    };
    Ok(Party {
        id: r.id("id")?,
        kind,
        tenant_id: r.tenant()?,
        profile,
        created_by: r.user("created_by")?,
        created_at: r.get("created_at")?,
        assigned_to: r.optional_user("assigned_to")?,
        updated_by: r.optional_user("updated_by")?,
        updated_at: r.get("updated_at")?,
        deleted_by: r.optional_user("deleted_by")?,
        deleted_at: r.get("deleted_at")?,
        pipeline,
    })
}

fn project_from_row(row: &Row) -> CrmResult<Project> {
    let r = RowReader::new(row, EntityKind::Project);
    Ok(Project {
        id: r.id("id")?,
        tenant_id: r.tenant()?,
        project_name: r.get("project_name")?,
        project_type: r.get("type")?,
        project_status: r.option_set("project_status", ProjectStatus::from_db_str)?,
        project_description: r.get("project_description")?,
        notes: r.get("notes")?,
        project_start: r.get("project_start")?,
        project_end: r.get("project_end")?,
        project_worth: r.get("project_worth")?,
        link: r.parent()?,
        created_by: r.user("created_by")?,
        created_at: r.get("created_at")?,
    })
}

fn contact_from_row(row: &Row) -> CrmResult<Contact> {
    let r = RowReader::new(row, EntityKind::Contact);
    let parent = r
        .parent()?
        .ok_or_else(|| r.decode_error("contact has neither client_id nor lead_id".to_string()))?;
    Ok(Contact {
        id: r.id("id")?,
        tenant_id: r.tenant()?,
        parent,
        first_name: r.get("first_name")?,
        last_name: r.get("last_name")?,
        title: r.get("title")?,
        email: r.get("email")?,
        phone: r.get("phone")?,
        phone_label: r.optional_option_set("phone_label", PhoneLabel::from_db_str)?,
        secondary_phone: r.get("secondary_phone")?,
        secondary_phone_label: r
            .optional_option_set("secondary_phone_label", PhoneLabel::from_db_str)?,
        notes: r.get("notes")?,
    })
}

fn activity_from_row(row: &Row) -> CrmResult<ActivityLog> {
    let r = RowReader::new(row, EntityKind::Interaction);
    Ok(ActivityLog {
        id: r.id("id")?,
        tenant_id: r.tenant()?,
        user_id: r.user("user_id")?,
        action: r.option_set("action", ActivityAction::from_db_str)?,
        entity_type: r.option_set("entity_type", EntityKind::from_db_str)?,
        entity_id: r.id("entity_id")?,
        description: r.get("description")?,
        timestamp: r.get("timestamp")?,
    })
}

fn query_failed(err: tokio_postgres::Error) -> CrmError {
    StorageError::QueryFailed {
        reason: err.to_string(),
    }
    .into()
}

fn unscoped(entity: impl Into<EntityKind>) -> CrmError {
    StorageError::UnscopedQuery {
        entity: entity.into(),
    }
    .into()
}

// ============================================================================
// STORE
// ============================================================================

#[derive(Clone)]
pub struct PgStore {
    pool: Pool,
}

impl PgStore {
    pub fn new(pool: Pool) -> Self {
        Self { pool }
    }

    pub fn pool(&self) -> &Pool {
        &self.pool
    }

    /// Create missing tables and indexes.
    pub async fn bootstrap(&self) -> ApiResult<()> {
        let conn = self.pool.get().await?;
        conn.batch_execute(BOOTSTRAP_DDL).await?;
        tracing::info!("Database schema bootstrapped");
        Ok(())
    }
}

#[async_trait]
impl Store for PgStore {
    async fn begin(&self) -> CrmResult<Box<dyn UnitOfWork>> {
        let conn = self.pool.get().await.map_err(|e| StorageError::Unavailable {
            reason: e.to_string(),
        })?;
        conn.batch_execute("BEGIN")
            .await
            .map_err(|e| StorageError::TransactionFailed {
                reason: e.to_string(),
            })?;
        Ok(Box::new(PgUnitOfWork { conn: Some(conn) }))
    }
}

pub struct PgUnitOfWork {
    conn: Option<Object>,
}

impl Drop for PgUnitOfWork {
    fn drop(&mut self) {
        if let Some(conn) = self.conn.take() {
            tracing::warn!("Unit of work dropped while open, discarding its connection");
            drop(Object::take(conn));
        }
    }
}

impl PgUnitOfWork {
    fn conn(&self) -> CrmResult<&Object> {
        self.conn.as_ref().ok_or_else(|| {
            StorageError::TransactionFailed {
                reason: "unit of work already finished".to_string(),
            }
            .into()
        })
    }

    async fn rows(&self, query: &SqlQuery) -> CrmResult<Vec<Row>> {
        let params = bind_values(&query.params);
        self.conn()?
            .query(query.text.as_str(), &refs(&params))
            .await
            .map_err(query_failed)
    }

    async fn insert(&self, table: &str, columns: &[&str], values: &[SqlParam]) -> CrmResult<i64> {
        let row = self
            .conn()?
            .query_one(insert_sql(table, columns).as_str(), &refs(values))
            .await
            .map_err(query_failed)?;
        row.try_get::<_, i64>("id").map_err(query_failed)
    }

    /// Run an `update_sql`-shaped statement. Returns whether a row was
    /// overwritten.
    async fn overwrite(&self, statement: &str, mut values: Vec<SqlParam>, id: i64) -> CrmResult<bool> {
        values.push(Box::new(id));
        let updated = self
            .conn()?
            .execute(statement, &refs(&values))
            .await
            .map_err(query_failed)?;
        Ok(updated > 0)
    }

    async fn remove(&self, table: &str, tenant: TenantId, id: RecordId) -> CrmResult<bool> {
        let statement = format!("DELETE FROM {table} WHERE tenant_id = $1 AND id = $2");
        let removed = self
            .conn()?
            .execute(statement.as_str(), &[&tenant.get(), &id.get()])
            .await
            .map_err(query_failed)?;
        Ok(removed > 0)
    }

    async fn page<T>(
        &self,
        table: Table,
        query: &RecordQuery,
        decode: impl Fn(&Row) -> CrmResult<T>,
    ) -> CrmResult<Page<T>> {
        let (rows_sql, count_sql) = sql::select(table, query);
        let count_row = self
            .rows(&count_sql)
            .await?
            .into_iter()
            .next()
            .ok_or_else(|| StorageError::QueryFailed {
                reason: "count returned no row".to_string(),
            })?;
        let total: i64 = count_row.try_get(0).map_err(query_failed)?;
        let items = self
            .rows(&rows_sql)
            .await?
            .iter()
            .map(decode)
            .collect::<CrmResult<Vec<T>>>()?;
        Ok(Page {
            items,
            total: u64::try_from(total).unwrap_or_default(),
        })
    }
}

#[async_trait]
impl UnitOfWork for PgUnitOfWork {
    // ========================================================================
    // USERS
    // ========================================================================

    async fn user_insert(&mut self, user: &NewUser) -> CrmResult<UserId> {
        let roles: Vec<String> = user.roles.iter().map(|r| r.as_db_str().to_string()).collect();
        let values: Vec<SqlParam> = vec![
            Box::new(user.tenant_id.get()),
            Box::new(user.email.clone()),
            Box::new(user.is_active),
            Box::new(roles),
        ];
        self.insert("users", USER_COLUMNS, &values)
            .await
            .map(UserId::new)
    }

    async fn user_get(&mut self, tenant: TenantId, id: UserId) -> CrmResult<Option<User>> {
        let row = self
            .conn()?
            .query_opt(
                "SELECT * FROM users WHERE tenant_id = $1 AND id = $2",
                &[&tenant.get(), &id.get()],
            )
            .await
            .map_err(query_failed)?;
        row.as_ref().map(user_from_row).transpose()
    }

    async fn user_find_by_email(
        &mut self,
        tenant: TenantId,
        email: &str,
    ) -> CrmResult<Option<User>> {
        let row = self
            .conn()?
            .query_opt(
                "SELECT * FROM users WHERE tenant_id = $1 AND lower(email) = lower($2) \
                 ORDER BY id LIMIT 1",
                &[&tenant.get(), &email],
            )
            .await
            .map_err(query_failed)?;
        row.as_ref().map(user_from_row).transpose()
    }

    async fn users_by_ids(
        &mut self,
        tenant: TenantId,
        ids: &[UserId],
    ) -> CrmResult<HashMap<UserId, User>> {
        if ids.is_empty() {
            return Ok(HashMap::new());
        }
        let raw: Vec<i64> = ids.iter().map(|id| id.get()).collect();
        let rows = self
            .conn()?
            .query(
                "SELECT * FROM users WHERE tenant_id = $1 AND id = ANY($2)",
                &[&tenant.get(), &raw],
            )
            .await
            .map_err(query_failed)?;
        rows.iter()
            .map(|row| user_from_row(row).map(|user| (user.id, user)))
            .collect()
    }

    // ========================================================================
    // CLIENTS AND LEADS
    // ========================================================================

    async fn party_insert(&mut self, party: &Party) -> CrmResult<RecordId> {
        let table = Table::Parties(party.kind);
        self.insert(table.name(), &party_columns(party.kind), &party_values(party))
            .await
            .map(RecordId::new)
    }

    async fn party_find(
        &mut self,
        kind: PartyKind,
        tenant: TenantId,
        filter: &Predicate,
    ) -> CrmResult<Option<Party>> {
        if !filter.pins_tenant(tenant) {
            return Err(unscoped(kind));
        }
        let query = sql::select_first(Table::Parties(kind), filter);
        self.rows(&query)
            .await?
            .first()
            .map(|row| party_from_row(kind, row))
            .transpose()
    }

    async fn party_query(&mut self, kind: PartyKind, query: &RecordQuery) -> CrmResult<Page<Party>> {
        if !query.filter.pins_tenant(query.tenant) {
            return Err(unscoped(kind));
        }
        self.page(Table::Parties(kind), query, |row| party_from_row(kind, row))
            .await
    }

    async fn party_update(&mut self, party: &Party) -> CrmResult<()> {
        let table = Table::Parties(party.kind);
        let columns = party_columns(party.kind);
        let statement = live_update_sql(table.name(), &columns);
        if self
            .overwrite(&statement, party_values(party), party.id.get())
            .await?
        {
            Ok(())
        } else {
            Err(CrmError::not_found(party.kind, party.id))
        }
    }

    // ========================================================================
    // PROJECTS
    // ========================================================================

    async fn project_insert(&mut self, project: &Project) -> CrmResult<RecordId> {
        self.insert("projects", PROJECT_COLUMNS, &project_values(project))
            .await
            .map(RecordId::new)
    }

    async fn project_find(
        &mut self,
        tenant: TenantId,
        filter: &Predicate,
    ) -> CrmResult<Option<Project>> {
        if !filter.pins_tenant(tenant) {
            return Err(unscoped(EntityKind::Project));
        }
        let query = sql::select_first(Table::Projects, filter);
        self.rows(&query)
            .await?
            .first()
            .map(project_from_row)
            .transpose()
    }

    async fn project_query(&mut self, query: &RecordQuery) -> CrmResult<Page<Project>> {
        if !query.filter.pins_tenant(query.tenant) {
            return Err(unscoped(EntityKind::Project));
        }
        self.page(Table::Projects, query, project_from_row).await
    }

    async fn project_update(&mut self, project: &Project) -> CrmResult<()> {
        if self
            .overwrite(
                &update_sql("projects", PROJECT_COLUMNS),
                project_values(project),
                project.id.get(),
            )
            .await?
        {
            Ok(())
        } else {
            Err(CrmError::not_found(EntityKind::Project, project.id))
        }
    }

    async fn project_delete(&mut self, tenant: TenantId, id: RecordId) -> CrmResult<bool> {
        self.remove("projects", tenant, id).await
    }

    // ========================================================================
    // CONTACTS
    // ========================================================================

    async fn contact_insert(&mut self, contact: &Contact) -> CrmResult<RecordId> {
        self.insert("contacts", CONTACT_COLUMNS, &contact_values(contact))
            .await
            .map(RecordId::new)
    }

    async fn contact_find(
        &mut self,
        tenant: TenantId,
        filter: &Predicate,
    ) -> CrmResult<Option<Contact>> {
        if !filter.pins_tenant(tenant) {
            return Err(unscoped(EntityKind::Contact));
        }
        let query = sql::select_first(Table::Contacts, filter);
        self.rows(&query)
            .await?
            .first()
            .map(contact_from_row)
            .transpose()
    }

    async fn contact_list(
        &mut self,
        tenant: TenantId,
        filter: &Predicate,
    ) -> CrmResult<Vec<Contact>> {
        if !filter.pins_tenant(tenant) {
            return Err(unscoped(EntityKind::Contact));
        }
        let query = sql::select_all(Table::Contacts, filter);
        self.rows(&query)
            .await?
            .iter()
            .map(contact_from_row)
            .collect()
    }

    async fn contact_update(&mut self, contact: &Contact) -> CrmResult<()> {
        if self
            .overwrite(
                &update_sql("contacts", CONTACT_COLUMNS),
                contact_values(contact),
                contact.id.get(),
            )
            .await?
        {
            Ok(())
        } else {
            Err(CrmError::not_found(EntityKind::Contact, contact.id))
        }
    }

    async fn contact_delete(&mut self, tenant: TenantId, id: RecordId) -> CrmResult<bool> {
        self.remove("contacts", tenant, id).await
    }

    // ========================================================================
    // INTERACTIONS
    // ========================================================================

    async fn interaction_insert(&mut self, interaction: &Interaction) -> CrmResult<RecordId> {
        let values: Vec<SqlParam> = vec![
            Box::new(interaction.tenant_id.get()),
            Box::new(interaction.party.client_id().map(RecordId::get)),
            Box::new(interaction.party.lead_id().map(RecordId::get)),
            Box::new(interaction.contact_date),
            Box::new(interaction.summary.clone()),
            Box::new(interaction.outcome.clone()),
            Box::new(interaction.notes.clone()),
            Box::new(interaction.follow_up),
        ];
        self.insert("interactions", INTERACTION_COLUMNS, &values)
            .await
            .map(RecordId::new)
    }

    async fn interaction_stats(
        &mut self,
        tenant: TenantId,
        kind: PartyKind,
        ids: &[RecordId],
    ) -> CrmResult<HashMap<RecordId, InteractionStats>> {
        if ids.is_empty() {
            return Ok(HashMap::new());
        }
        let raw: Vec<i64> = ids.iter().map(|id| id.get()).collect();
        let rows = self
            .conn()?
            .query(
                sql::interaction_stats(kind).as_str(),
                &[&tenant.get(), &raw],
            )
            .await
            .map_err(query_failed)?;
        rows.iter()
            .map(|row| {
                let r = RowReader::new(row, EntityKind::Interaction);
                let count: i64 = r.get("interaction_count")?;
                let last: Option<Timestamp> = r.get("last_interaction_at")?;
                Ok((
                    r.id("party_id")?,
                    InteractionStats {
                        interaction_count: u64::try_from(count).unwrap_or_default(),
                        last_interaction_at: last,
                    },
                ))
            })
            .collect()
    }

    // ========================================================================
    // ACTIVITY LOG
    // ========================================================================

    async fn activity_append(&mut self, entry: &ActivityLog) -> CrmResult<RecordId> {
        let values: Vec<SqlParam> = vec![
            Box::new(entry.tenant_id.get()),
            Box::new(entry.user_id.get()),
            Box::new(entry.action.as_db_str()),
            Box::new(entry.entity_type.as_db_str()),
            Box::new(entry.entity_id.get()),
            Box::new(entry.description.clone()),
            Box::new(entry.timestamp),
        ];
        self.insert("activity_logs", ACTIVITY_COLUMNS, &values)
            .await
            .map(RecordId::new)
    }

    async fn activity_list(&mut self, tenant: TenantId) -> CrmResult<Vec<ActivityLog>> {
        let rows = self
            .conn()?
            .query(
                "SELECT * FROM activity_logs WHERE tenant_id = $1 ORDER BY \"timestamp\", id",
                &[&tenant.get()],
            )
            .await
            .map_err(query_failed)?;
        rows.iter().map(activity_from_row).collect()
    }

    // ========================================================================
    // TRANSACTION CONTROL
    // ========================================================================

    async fn commit(mut self: Box<Self>) -> CrmResult<()> {
        let conn = self.conn.take().ok_or_else(|| StorageError::TransactionFailed {
            reason: "unit of work already finished".to_string(),
        })?;
        conn.batch_execute("COMMIT")
            .await
            .map_err(|e| StorageError::TransactionFailed {
                reason: e.to_string(),
            })?;
        Ok(())
    }

    async fn rollback(mut self: Box<Self>) -> CrmResult<()> {
        let conn = self.conn.take().ok_or_else(|| StorageError::TransactionFailed {
            reason: "unit of work already finished".to_string(),
        })?;
        if let Err(err) = conn.batch_execute("ROLLBACK").await {
            drop(Object::take(conn));
            return Err(StorageError::TransactionFailed {
                reason: err.to_string(),
            }
            .into());
        }
        Ok(())
    }
}
