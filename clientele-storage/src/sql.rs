//! PostgreSQL rendering of the predicate AST.
//!
//! Output is parameterized (`$1`, `$2`, ...) with the literals returned
//! alongside. Comparisons are wrapped in `COALESCE(.., FALSE)` so a null
//! column yields false rather than unknown, matching in-memory evaluation
//! under `NOT`. Orderings always add `NULLS LAST` and an `id` tie-break.

use crate::RecordQuery;
use clientele_core::{Direction, Field, PartyKind, Predicate, SortKey, Value};

/// Entity tables addressable by a [`RecordQuery`].
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Table {
    Parties(PartyKind),
    Projects,
    Contacts,
}

impl Table {
    pub fn name(&self) -> &'static str {
        match self {
            Table::Parties(PartyKind::Client) => "clients",
            Table::Parties(PartyKind::Lead) => "leads",
            Table::Projects => "projects",
            Table::Contacts => "contacts",
        }
    }

    fn column(&self, field: Field) -> Option<&'static str> {
        match (self, field) {
            (_, Field::Id) => Some("id"),
            (_, Field::TenantId) => Some("tenant_id"),
            (Table::Parties(_), Field::CreatedBy) | (Table::Projects, Field::CreatedBy) => {
                Some("created_by")
            }
            (Table::Parties(_), Field::CreatedAt) | (Table::Projects, Field::CreatedAt) => {
                Some("created_at")
            }
            (Table::Parties(_), Field::AssignedTo) => Some("assigned_to"),
            (Table::Parties(_), Field::DeletedAt) => Some("deleted_at"),
            (Table::Parties(_), Field::Name) => Some("name"),
            (Table::Projects, Field::Name) => Some("project_name"),
            (Table::Projects, Field::ClientId) | (Table::Contacts, Field::ClientId) => {
                Some("client_id")
            }
            (Table::Projects, Field::LeadId) | (Table::Contacts, Field::LeadId) => Some("lead_id"),
            _ => None,
        }
    }

    /// Foreign key on `interactions` pointing at rows of this table.
    fn interaction_key(&self) -> Option<&'static str> {
        match self {
            Table::Parties(kind) => Some(interaction_key(*kind)),
            Table::Projects | Table::Contacts => None,
        }
    }
}

pub fn interaction_key(kind: PartyKind) -> &'static str {
    match kind {
        PartyKind::Client => "client_id",
        PartyKind::Lead => "lead_id",
    }
}

/// Statement text with its positional parameters.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SqlQuery {
    pub text: String,
    pub params: Vec<Value>,
}

#[derive(Debug, Default)]
struct Params {
    values: Vec<Value>,
}

impl Params {
    fn bind(&mut self, value: Value) -> String {
        self.values.push(value);
        format!("${}", self.values.len())
    }
}

fn render(table: Table, predicate: &Predicate, params: &mut Params) -> String {
    match predicate {
        Predicate::True => "TRUE".to_string(),
        Predicate::And(parts) if parts.is_empty() => "TRUE".to_string(),
        Predicate::And(parts) => join(table, parts, " AND ", params),
        Predicate::Or(parts) if parts.is_empty() => "FALSE".to_string(),
        Predicate::Or(parts) => join(table, parts, " OR ", params),
        Predicate::Not(inner) => format!("NOT ({})", render(table, inner, params)),
        Predicate::Eq(field, value) => match table.column(*field) {
            Some(col) => format!("COALESCE(t.{col} = {}, FALSE)", params.bind(value.clone())),
            None => "FALSE".to_string(),
        },
        Predicate::Gte(field, value) => match table.column(*field) {
            Some(col) => format!("COALESCE(t.{col} >= {}, FALSE)", params.bind(value.clone())),
            None => "FALSE".to_string(),
        },
        Predicate::In(field, values) => match table.column(*field) {
            Some(col) if !values.is_empty() => {
                let placeholders: Vec<String> =
                    values.iter().map(|v| params.bind(v.clone())).collect();
                format!("COALESCE(t.{col} IN ({}), FALSE)", placeholders.join(", "))
            }
            _ => "FALSE".to_string(),
        },
        Predicate::IsNull(field) => match table.column(*field) {
            Some(col) => format!("t.{col} IS NULL"),
            None => "TRUE".to_string(),
        },
        Predicate::InteractedSince(since) => match table.interaction_key() {
            Some(fk) => format!(
                "EXISTS (SELECT 1 FROM interactions i WHERE i.tenant_id = t.tenant_id \
                 AND i.{fk} = t.id AND i.contact_date >= {})",
                params.bind(Value::Time(*since))
            ),
            None => "FALSE".to_string(),
        },
        Predicate::UserEmail(field, email) => match table.column(*field) {
            Some(col) => format!(
                "EXISTS (SELECT 1 FROM users u WHERE u.id = t.{col} \
                 AND u.tenant_id = t.tenant_id AND lower(u.email) = lower({}))",
                params.bind(Value::Text(email.clone()))
            ),
            None => "FALSE".to_string(),
        },
    }
}

fn join(table: Table, parts: &[Predicate], sep: &str, params: &mut Params) -> String {
    let rendered: Vec<String> = parts
        .iter()
        .map(|p| format!("({})", render(table, p, params)))
        .collect();
    rendered.join(sep)
}

fn order_clause(table: Table, query: &RecordQuery) -> String {
    let direction = match query.ordering.direction {
        Direction::Asc => "ASC",
        Direction::Desc => "DESC",
    };
    let primary = match query.ordering.key {
        SortKey::CreatedAt => table.column(Field::CreatedAt).map(|c| format!("t.{c}")),
        SortKey::Name => table
            .column(Field::Name)
            .map(|c| format!("t.{c} COLLATE \"C\"")),
        SortKey::LastInteraction => table.interaction_key().map(|fk| {
            format!(
                "(SELECT MAX(i.contact_date) FROM interactions i \
                 WHERE i.tenant_id = t.tenant_id AND i.{fk} = t.id)"
            )
        }),
    };
    match primary {
        Some(expr) => format!("ORDER BY {expr} {direction} NULLS LAST, t.id ASC"),
        None => "ORDER BY t.id ASC".to_string(),
    }
}

/// Render the page query and the matching count query.
pub fn select(table: Table, query: &RecordQuery) -> (SqlQuery, SqlQuery) {
    let mut params = Params::default();
    let filter = render(table, &query.filter, &mut params);
    let from = format!("FROM {} t WHERE {}", table.name(), filter);

    let count = SqlQuery {
        text: format!("SELECT COUNT(*) {from}"),
        params: params.values.clone(),
    };

    let mut text = format!("SELECT t.* {from} {}", order_clause(table, query));
    if let Some(window) = query.window {
        let limit = params.bind(Value::Int(i64::try_from(window.limit()).unwrap_or(i64::MAX)));
        let offset = params.bind(Value::Int(i64::try_from(window.offset()).unwrap_or(i64::MAX)));
        text.push_str(&format!(" LIMIT {limit} OFFSET {offset}"));
    }
    (
        SqlQuery {
            text,
            params: params.values,
        },
        count,
    )
}

/// Render a lookup returning the lowest-id match.
pub fn select_first(table: Table, filter: &Predicate) -> SqlQuery {
    let mut params = Params::default();
    let filter = render(table, filter, &mut params);
    SqlQuery {
        text: format!(
            "SELECT t.* FROM {} t WHERE {} ORDER BY t.id ASC LIMIT 1",
            table.name(),
            filter
        ),
        params: params.values,
    }
}

/// Render an unwindowed lookup ordered by id.
pub fn select_all(table: Table, filter: &Predicate) -> SqlQuery {
    let mut params = Params::default();
    let filter = render(table, filter, &mut params);
    SqlQuery {
        text: format!(
            "SELECT t.* FROM {} t WHERE {} ORDER BY t.id ASC",
            table.name(),
            filter
        ),
        params: params.values,
    }
}

/// Grouped interaction statistics. Binds `$1` = tenant id, `$2` = party ids
/// (`BIGINT[]`).
pub fn interaction_stats(kind: PartyKind) -> String {
    let fk = interaction_key(kind);
    let parties = Table::Parties(kind).name();
    format!(
        "SELECT i.{fk} AS party_id, COUNT(*) AS interaction_count, \
         MAX(i.contact_date) AS last_interaction_at \
         FROM interactions i \
         JOIN {parties} p ON p.id = i.{fk} AND p.tenant_id = i.tenant_id AND p.deleted_at IS NULL \
         WHERE i.tenant_id = $1 AND i.{fk} = ANY($2) \
         GROUP BY i.{fk}"
    )
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::{TimeZone, Utc};
    use clientele_core::{Ordering, PageRequest, TenantId, UserId};

    fn scoped(filter: Predicate) -> RecordQuery {
        RecordQuery::new(
            TenantId::new(1),
            Predicate::eq(Field::TenantId, TenantId::new(1)).and(filter),
        )
    }

    #[test]
    fn test_inactive_renders_as_negated_exists() {
        let since = Utc.with_ymd_and_hms(2024, 3, 1, 0, 0, 0).unwrap();
        let query = scoped(Predicate::InteractedSince(since).negate());
        let (rows, count) = select(Table::Parties(PartyKind::Lead), &query);
        assert!(rows.text.contains(
            "NOT (EXISTS (SELECT 1 FROM interactions i WHERE i.tenant_id = t.tenant_id AND i.lead_id = t.id"
        ));
        assert_eq!(count.params, vec![Value::Int(1), Value::Time(since)]);
        assert!(count.text.starts_with("SELECT COUNT(*) FROM leads t WHERE"));
    }

    #[test]
    fn test_window_params_follow_filter_params() {
        let query = scoped(Predicate::eq(Field::AssignedTo, UserId::new(7)))
            .paged(PageRequest::new(Some(3), Some(10)));
        let (rows, count) = select(Table::Parties(PartyKind::Client), &query);
        assert!(rows.text.ends_with("LIMIT $3 OFFSET $4"));
        assert_eq!(rows.params[2..], [Value::Int(10), Value::Int(20)]);
        assert_eq!(count.params.len(), 2);
    }

    #[test]
    fn test_huge_window_saturates_instead_of_wrapping() {
        let huge = i64::from(u32::MAX);
        let query = scoped(Predicate::True).paged(PageRequest::new(Some(huge), Some(huge)));
        let (rows, _) = select(Table::Parties(PartyKind::Client), &query);
        assert_eq!(rows.params[1..], [Value::Int(huge), Value::Int(i64::MAX)]);
    }

    #[test]
    fn test_activity_order_uses_max_contact_date_nulls_last() {
        let query = scoped(Predicate::True).ordered(Ordering::new(
            SortKey::LastInteraction,
            Direction::Desc,
        ));
        let (rows, _) = select(Table::Parties(PartyKind::Client), &query);
        assert!(rows.text.contains(
            "ORDER BY (SELECT MAX(i.contact_date) FROM interactions i WHERE i.tenant_id = t.tenant_id AND i.client_id = t.id) DESC NULLS LAST, t.id ASC"
        ));
    }

    #[test]
    fn test_project_name_sort_and_missing_columns() {
        let query = scoped(Predicate::is_null(Field::DeletedAt))
            .ordered(Ordering::new(SortKey::Name, Direction::Asc));
        let (rows, _) = select(Table::Projects, &query);
        assert!(rows.text.contains("(TRUE)"));
        assert!(rows
            .text
            .contains("ORDER BY t.project_name COLLATE \"C\" ASC NULLS LAST, t.id ASC"));
    }

    #[test]
    fn test_user_email_filter_joins_users() {
        let query = scoped(Predicate::UserEmail(Field::AssignedTo, "b@x.io".to_string()));
        let (rows, _) = select(Table::Parties(PartyKind::Client), &query);
        assert!(rows
            .text
            .contains("u.id = t.assigned_to AND u.tenant_id = t.tenant_id"));
        assert_eq!(rows.params[1], Value::Text("b@x.io".to_string()));
    }

    #[test]
    fn test_empty_in_is_false() {
        let sql = select_first(Table::Contacts, &Predicate::In(Field::Id, Vec::new()));
        assert!(sql.text.contains("WHERE FALSE"));
        assert!(sql.params.is_empty());
    }
}
