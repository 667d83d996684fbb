//! Composable row predicates and orderings
//!
//! Visibility, activity windows and admin filters are all expressed as one
//! [`Predicate`] tree over a single entity table. Stores evaluate the tree
//! in-process or render it to SQL; neither side needs to know which rule
//! produced which clause.

use crate::{RecordId, TenantId, Timestamp, UserId};

/// Columns a predicate or ordering can reference.
///
/// `Name` resolves to `name` on clients and leads and to `project_name` on
/// projects. Columns absent from a table (for example `DeletedAt` on
/// projects) read as null.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum Field {
    Id,
    TenantId,
    CreatedBy,
    AssignedTo,
    CreatedAt,
    DeletedAt,
    Name,
    ClientId,
    LeadId,
}

/// Comparable literal.
#[derive(Debug, Clone, PartialEq, Eq, PartialOrd, Ord)]
pub enum Value {
    Int(i64),
    Text(String),
    Time(Timestamp),
}

impl From<TenantId> for Value {
    fn from(id: TenantId) -> Self {
        Value::Int(id.get())
    }
}

impl From<UserId> for Value {
    fn from(id: UserId) -> Self {
        Value::Int(id.get())
    }
}

impl From<RecordId> for Value {
    fn from(id: RecordId) -> Self {
        Value::Int(id.get())
    }
}

impl From<Timestamp> for Value {
    fn from(ts: Timestamp) -> Self {
        Value::Time(ts)
    }
}

impl From<&str> for Value {
    fn from(s: &str) -> Self {
        Value::Text(s.to_string())
    }
}

impl From<String> for Value {
    fn from(s: String) -> Self {
        Value::Text(s)
    }
}

/// Boolean condition over one row of an entity table.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Predicate {
    /// Matches every row.
    True,
    /// All children hold. Empty is true.
    And(Vec<Predicate>),
    /// Any child holds. Empty is false.
    Or(Vec<Predicate>),
    Not(Box<Predicate>),
    /// Column equals the value. A null column never matches.
    Eq(Field, Value),
    /// Column is greater than or equal to the value. A null column never matches.
    Gte(Field, Value),
    /// Column is one of the values.
    In(Field, Vec<Value>),
    IsNull(Field),
    /// The row's party has at least one interaction with
    /// `contact_date >= since`. Its negation includes parties with no
    /// interactions at all.
    InteractedSince(Timestamp),
    /// The user referenced by the column has this email.
    UserEmail(Field, String),
}

impl Predicate {
    pub fn eq(field: Field, value: impl Into<Value>) -> Self {
        Predicate::Eq(field, value.into())
    }

    pub fn gte(field: Field, value: impl Into<Value>) -> Self {
        Predicate::Gte(field, value.into())
    }

    pub fn is_null(field: Field) -> Self {
        Predicate::IsNull(field)
    }

    pub fn is_not_null(field: Field) -> Self {
        Predicate::IsNull(field).negate()
    }

    pub fn one_of<V: Into<Value>>(field: Field, values: impl IntoIterator<Item = V>) -> Self {
        Predicate::In(field, values.into_iter().map(Into::into).collect())
    }

    pub fn negate(self) -> Self {
        match self {
            Predicate::Not(inner) => *inner,
            other => Predicate::Not(Box::new(other)),
        }
    }

    /// Conjunction that drops `True` operands and flattens nested `And`s.
    pub fn and(self, other: Predicate) -> Self {
        Predicate::all([self, other])
    }

    /// Disjunction that flattens nested `Or`s.
    pub fn or(self, other: Predicate) -> Self {
        Predicate::any([self, other])
    }

    pub fn all(parts: impl IntoIterator<Item = Predicate>) -> Self {
        let mut flat = Vec::new();
        for part in parts {
            match part {
                Predicate::True => {}
                Predicate::And(children) => flat.extend(children),
                other => flat.push(other),
            }
        }
        match flat.len() {
            0 => Predicate::True,
            1 => flat.remove(0),
            _ => Predicate::And(flat),
        }
    }

    pub fn any(parts: impl IntoIterator<Item = Predicate>) -> Self {
        let mut flat = Vec::new();
        for part in parts {
            match part {
                Predicate::True => return Predicate::True,
                Predicate::Or(children) => flat.extend(children),
                other => flat.push(other),
            }
        }
        if flat.len() == 1 {
            flat.remove(0)
        } else {
            Predicate::Or(flat)
        }
    }

    /// Whether the tree constrains `tenant_id` to `tenant` on every path.
    ///
    /// Stores use this to refuse unscoped queries.
    pub fn pins_tenant(&self, tenant: TenantId) -> bool {
        match self {
            Predicate::Eq(Field::TenantId, value) => *value == Value::from(tenant),
            Predicate::And(children) => children.iter().any(|c| c.pins_tenant(tenant)),
            Predicate::Or(children) => {
                !children.is_empty() && children.iter().all(|c| c.pins_tenant(tenant))
            }
            _ => false,
        }
    }
}

// ============================================================================
// ORDERING
// ============================================================================

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum SortKey {
    CreatedAt,
    Name,
    /// Most recent interaction `contact_date`. Rows without interactions
    /// sort after every row that has one, in either direction.
    LastInteraction,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum Direction {
    Asc,
    Desc,
}

/// Primary sort. Every store breaks ties by id ascending.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct Ordering {
    pub key: SortKey,
    pub direction: Direction,
}

impl Ordering {
    pub const fn new(key: SortKey, direction: Direction) -> Self {
        Self { key, direction }
    }

    pub const fn newest() -> Self {
        Self::new(SortKey::CreatedAt, Direction::Desc)
    }
}

impl Default for Ordering {
    fn default() -> Self {
        Self::newest()
    }
}
