//! In-process evaluation of the predicate AST.
//!
//! Semantics match the SQL renderer: comparisons against a null column are
//! false (never unknown), and every ordering puts nulls last then breaks
//! ties by id ascending.

use clientele_core::{
    Contact, Direction, Field, Interaction, Ordering, Party, PartyRef, Predicate,
    Project, RecordId, SortKey, TenantId, Timestamp, User, UserId, Value,
};
use std::cmp;
use std::collections::BTreeMap;

/// A row the evaluator can read columns from.
pub(crate) trait Row {
    fn row_id(&self) -> RecordId;
    fn tenant(&self) -> TenantId;
    fn field(&self, field: Field) -> Option<Value>;

    /// The party whose interactions belong to this row.
    fn party(&self) -> Option<PartyRef> {
        None
    }
}

impl Row for Party {
    fn row_id(&self) -> RecordId {
        self.id
    }

    fn tenant(&self) -> TenantId {
        self.tenant_id
    }

    fn field(&self, field: Field) -> Option<Value> {
        match field {
            Field::Id => Some(self.id.into()),
            Field::TenantId => Some(self.tenant_id.into()),
            Field::CreatedBy => Some(self.created_by.into()),
            Field::AssignedTo => self.assigned_to.map(Value::from),
            Field::CreatedAt => Some(self.created_at.into()),
            Field::DeletedAt => self.deleted_at.map(Value::from),
            Field::Name => Some(Value::Text(self.profile.name.clone())),
            Field::ClientId | Field::LeadId => None,
        }
    }

    fn party(&self) -> Option<PartyRef> {
        Some(self.reference())
    }
}

impl Row for Project {
    fn row_id(&self) -> RecordId {
        self.id
    }

    fn tenant(&self) -> TenantId {
        self.tenant_id
    }

    fn field(&self, field: Field) -> Option<Value> {
        match field {
            Field::Id => Some(self.id.into()),
            Field::TenantId => Some(self.tenant_id.into()),
            Field::CreatedBy => Some(self.created_by.into()),
            Field::CreatedAt => Some(self.created_at.into()),
            Field::Name => Some(Value::Text(self.project_name.clone())),
            Field::ClientId => self.client_id().map(Value::from),
            Field::LeadId => self.lead_id().map(Value::from),
            Field::AssignedTo | Field::DeletedAt => None,
        }
    }
}

impl Row for Contact {
    fn row_id(&self) -> RecordId {
        self.id
    }

    fn tenant(&self) -> TenantId {
        self.tenant_id
    }

    fn field(&self, field: Field) -> Option<Value> {
        match field {
            Field::Id => Some(self.id.into()),
            Field::TenantId => Some(self.tenant_id.into()),
            Field::ClientId => self.client_id().map(Value::from),
            Field::LeadId => self.lead_id().map(Value::from),
            _ => None,
        }
    }
}

/// Related tables a predicate may reach into.
pub(crate) struct EvalContext<'a> {
    pub users: &'a BTreeMap<UserId, User>,
    pub interactions: &'a [Interaction],
}

impl EvalContext<'_> {
    fn interactions_of(
        &self,
        tenant: TenantId,
        party: PartyRef,
    ) -> impl Iterator<Item = &Interaction> + '_ {
        self.interactions
            .iter()
            .filter(move |i| i.tenant_id == tenant && i.party == party)
    }

    fn last_interaction(&self, tenant: TenantId, party: PartyRef) -> Option<Timestamp> {
        self.interactions_of(tenant, party)
            .map(|i| i.contact_date)
            .max()
    }
}

fn same_type(a: &Value, b: &Value) -> bool {
    matches!(
        (a, b),
        (Value::Int(_), Value::Int(_))
            | (Value::Text(_), Value::Text(_))
            | (Value::Time(_), Value::Time(_))
    )
}

pub(crate) fn matches<R: Row>(predicate: &Predicate, row: &R, cx: &EvalContext<'_>) -> bool {
    match predicate {
        Predicate::True => true,
        Predicate::And(parts) => parts.iter().all(|p| matches(p, row, cx)),
        Predicate::Or(parts) => parts.iter().any(|p| matches(p, row, cx)),
        Predicate::Not(inner) => !matches(inner, row, cx),
        Predicate::Eq(field, value) => row.field(*field).as_ref() == Some(value),
        Predicate::Gte(field, value) => row
            .field(*field)
            .is_some_and(|actual| same_type(&actual, value) && actual >= *value),
        Predicate::In(field, values) => row
            .field(*field)
            .is_some_and(|actual| values.contains(&actual)),
        Predicate::IsNull(field) => row.field(*field).is_none(),
        Predicate::InteractedSince(since) => row.party().is_some_and(|party| {
            cx.interactions_of(row.tenant(), party)
                .any(|i| i.contact_date >= *since)
        }),
        Predicate::UserEmail(field, email) => match row.field(*field) {
            Some(Value::Int(raw)) => cx.users.get(&UserId::new(raw)).is_some_and(|user| {
                user.tenant_id == row.tenant() && user.email.eq_ignore_ascii_case(email)
            }),
            _ => false,
        },
    }
}

fn sort_value<R: Row>(row: &R, key: SortKey, cx: &EvalContext<'_>) -> Option<Value> {
    match key {
        SortKey::CreatedAt => row.field(Field::CreatedAt),
        SortKey::Name => row.field(Field::Name),
        SortKey::LastInteraction => row
            .party()
            .and_then(|party| cx.last_interaction(row.tenant(), party))
            .map(Value::Time),
    }
}

pub(crate) fn sort_rows<R: Row>(rows: &mut [R], ordering: Ordering, cx: &EvalContext<'_>) {
    rows.sort_by(|a, b| {
        let primary = match (sort_value(a, ordering.key, cx), sort_value(b, ordering.key, cx)) {
            (Some(x), Some(y)) => match ordering.direction {
                Direction::Asc => x.cmp(&y),
                Direction::Desc => y.cmp(&x),
            },
            (Some(_), None) => cmp::Ordering::Less,
            (None, Some(_)) => cmp::Ordering::Greater,
            (None, None) => cmp::Ordering::Equal,
        };
        primary.then_with(|| a.row_id().cmp(&b.row_id()))
    });
}
