//! Authenticated principal and role capabilities

use crate::{CrmError, CrmResult, TenantId, UserId};
use serde::{Deserialize, Serialize};
use std::collections::BTreeSet;
use std::fmt;

/// Closed set of roles a user can hold.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Role {
    Admin,
    User,
}

/// Operations that require more than ownership of a record.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum Capability {
    /// Read any live record in the tenant regardless of ownership.
    ViewAllTenantRecords,
    /// Change who a client or lead is assigned to.
    AssignRecords,
}

impl Role {
    pub fn as_db_str(&self) -> &'static str {
        match self {
            Role::Admin => "admin",
            Role::User => "user",
        }
    }

    /// Parse a stored role name. Unknown names grant nothing and yield `None`.
    pub fn from_db_str(s: &str) -> Option<Self> {
        match s.trim().to_lowercase().as_str() {
            "admin" => Some(Role::Admin),
            "user" => Some(Role::User),
            _ => None,
        }
    }

    pub fn capabilities(&self) -> &'static [Capability] {
        match self {
            Role::Admin => &[Capability::ViewAllTenantRecords, Capability::AssignRecords],
            Role::User => &[],
        }
    }

    pub fn grants(&self, capability: Capability) -> bool {
        self.capabilities().contains(&capability)
    }
}

impl fmt::Display for Role {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.as_db_str())
    }
}

/// The resolved principal every engine operation runs on behalf of.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct TenantContext {
    pub tenant_id: TenantId,
    pub user_id: UserId,
    pub email: String,
    pub roles: BTreeSet<Role>,
}

impl TenantContext {
    pub fn new(tenant_id: TenantId, user_id: UserId, email: impl Into<String>) -> Self {
        Self {
            tenant_id,
            user_id,
            email: email.into(),
            roles: BTreeSet::new(),
        }
    }

    pub fn with_role(mut self, role: Role) -> Self {
        self.roles.insert(role);
        self
    }

    pub fn has_role(&self, role: Role) -> bool {
        self.roles.contains(&role)
    }

    pub fn has_capability(&self, capability: Capability) -> bool {
        self.roles.iter().any(|role| role.grants(capability))
    }

    /// Fail with `Forbidden` unless one of the caller's roles grants `capability`.
    pub fn require(&self, capability: Capability) -> CrmResult<()> {
        if self.has_capability(capability) {
            Ok(())
        } else {
            Err(CrmError::Forbidden {
                reason: format!("{:?} requires an admin role", capability),
            })
        }
    }
}
