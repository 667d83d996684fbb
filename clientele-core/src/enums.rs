//! Closed option sets for Clientele entities

use serde::{Deserialize, Serialize};
use std::fmt;
use std::str::FromStr;

/// Error when a string falls outside a closed option set.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct OptionParseError {
    pub field: &'static str,
    pub value: String,
}

impl fmt::Display for OptionParseError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "Invalid {}: {}", self.field, self.value)
    }
}

impl std::error::Error for OptionParseError {}

/// Generates `as_db_str`, `from_db_str`, `ALL`, `Display` and `FromStr` for a
/// fieldless enum whose wire form is a fixed string.
macro_rules! string_enum {
    ($name:ident, $field:literal, { $($variant:ident => $text:literal),+ $(,)? }) => {
        impl $name {
            /// Every option, in declaration order.
            pub const ALL: &'static [$name] = &[$($name::$variant),+];

            /// Convert to database string representation.
            pub fn as_db_str(&self) -> &'static str {
                match self {
                    $($name::$variant => $text),+
                }
            }

            /// Parse from database string representation.
            pub fn from_db_str(s: &str) -> Result<Self, OptionParseError> {
                match s {
                    $($text => Ok($name::$variant),)+
                    _ => Err(OptionParseError {
                        field: $field,
                        value: s.to_string(),
                    }),
                }
            }
        }

        impl fmt::Display for $name {
            fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
                write!(f, "{}", self.as_db_str())
            }
        }

        impl FromStr for $name {
            type Err = OptionParseError;

            fn from_str(s: &str) -> Result<Self, Self::Err> {
                Self::from_db_str(s)
            }
        }

        impl Serialize for $name {
            fn serialize<S: serde::Serializer>(&self, serializer: S) -> Result<S::Ok, S::Error> {
                serializer.serialize_str(self.as_db_str())
            }
        }

        impl<'de> Deserialize<'de> for $name {
            fn deserialize<D: serde::Deserializer<'de>>(deserializer: D) -> Result<Self, D::Error> {
                let raw = String::deserialize(deserializer)?;
                Self::from_db_str(&raw).map_err(serde::de::Error::custom)
            }
        }
    };
}

// ============================================================================
// ENTITY KINDS
// ============================================================================

/// Entity type discriminator used in audit records and errors.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum EntityKind {
    Client,
    Lead,
    Project,
    Contact,
    Interaction,
}

string_enum!(EntityKind, "entity type", {
    Client => "client",
    Lead => "lead",
    Project => "project",
    Contact => "contact",
    Interaction => "interaction",
});

impl EntityKind {
    /// Capitalised label for user-facing messages ("Client not found").
    pub fn label(&self) -> &'static str {
        match self {
            EntityKind::Client => "Client",
            EntityKind::Lead => "Lead",
            EntityKind::Project => "Project",
            EntityKind::Contact => "Contact",
            EntityKind::Interaction => "Interaction",
        }
    }

    /// Whether rows of this kind are soft-deleted instead of removed.
    pub fn soft_deletes(&self) -> bool {
        matches!(self, EntityKind::Client | EntityKind::Lead)
    }
}

/// The two kinds of external party. Clients and leads share one shape.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub enum PartyKind {
    Client,
    Lead,
}

string_enum!(PartyKind, "party kind", {
    Client => "client",
    Lead => "lead",
});

impl PartyKind {
    pub fn entity_kind(&self) -> EntityKind {
        match self {
            PartyKind::Client => EntityKind::Client,
            PartyKind::Lead => EntityKind::Lead,
        }
    }

    /// Collection name used in list payloads.
    pub fn plural(&self) -> &'static str {
        match self {
            PartyKind::Client => "clients",
            PartyKind::Lead => "leads",
        }
    }
}

impl From<PartyKind> for EntityKind {
    fn from(kind: PartyKind) -> Self {
        kind.entity_kind()
    }
}

// ============================================================================
// OPTION SETS
// ============================================================================

/// Business type of a client or lead. The first option is the default.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default)]
pub enum BusinessType {
    #[default]
    Unspecified,
    OilAndGas,
    Bridge,
    Pipe,
    Tank,
    Containment,
    Other,
}

string_enum!(BusinessType, "type", {
    Unspecified => "None",
    OilAndGas => "Oil & Gas",
    Bridge => "Bridge",
    Pipe => "Pipe",
    Tank => "Tank",
    Containment => "Containment",
    Other => "Other",
});

/// Label attached to a phone number.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default)]
pub enum PhoneLabel {
    #[default]
    Work,
    Mobile,
    Home,
    Other,
}

string_enum!(PhoneLabel, "phone label", {
    Work => "work",
    Mobile => "mobile",
    Home => "home",
    Other => "other",
});

/// Pipeline state of a lead.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default)]
pub enum LeadStatus {
    #[default]
    Open,
    Converted,
    Closed,
    Lost,
}

string_enum!(LeadStatus, "lead_status", {
    Open => "open",
    Converted => "converted",
    Closed => "closed",
    Lost => "lost",
});

/// Commercial state of a project.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default)]
pub enum ProjectStatus {
    #[default]
    Pending,
    Won,
    Lost,
}

string_enum!(ProjectStatus, "project_status", {
    Pending => "pending",
    Won => "won",
    Lost => "lost",
});

/// Audit action recorded in the activity log.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum ActivityAction {
    Viewed,
}

string_enum!(ActivityAction, "action", {
    Viewed => "viewed",
});
