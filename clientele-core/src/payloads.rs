//! Create and update payloads
//!
//! Option-set fields arrive as raw text and are validated by the engine so
//! every rejection carries the field name. Patch fields use a double option:
//! the outer `None` means "absent, leave unchanged" and `Some(None)` means
//! "explicitly cleared".

use crate::RecordId;
use serde::{Deserialize, Deserializer};

/// Deserialize a present field, null included, as `Some`.
pub fn present<'de, T, D>(deserializer: D) -> Result<Option<T>, D::Error>
where
    T: Deserialize<'de>,
    D: Deserializer<'de>,
{
    T::deserialize(deserializer).map(Some)
}

/// Fields for a new client or lead.
#[derive(Debug, Clone, Default, PartialEq, Deserialize)]
#[serde(default)]
pub struct NewParty {
    pub name: Option<String>,
    pub contact_person: Option<String>,
    pub contact_title: Option<String>,
    pub email: Option<String>,
    pub phone: Option<String>,
    pub phone_label: Option<String>,
    pub secondary_phone: Option<String>,
    pub secondary_phone_label: Option<String>,
    pub address: Option<String>,
    pub city: Option<String>,
    pub state: Option<String>,
    pub zip: Option<String>,
    pub notes: Option<String>,
    #[serde(rename = "type")]
    pub business_type: Option<String>,
    pub lead_status: Option<String>,
}

/// Partial update of a client or lead.
#[derive(Debug, Clone, Default, PartialEq, Deserialize)]
#[serde(default)]
pub struct PartyPatch {
    #[serde(deserialize_with = "present")]
    pub name: Option<Option<String>>,
    #[serde(deserialize_with = "present")]
    pub contact_person: Option<Option<String>>,
    #[serde(deserialize_with = "present")]
    pub contact_title: Option<Option<String>>,
    #[serde(deserialize_with = "present")]
    pub email: Option<Option<String>>,
    #[serde(deserialize_with = "present")]
    pub phone: Option<Option<String>>,
    #[serde(deserialize_with = "present")]
    pub phone_label: Option<Option<String>>,
    #[serde(deserialize_with = "present")]
    pub secondary_phone: Option<Option<String>>,
    #[serde(deserialize_with = "present")]
    pub secondary_phone_label: Option<Option<String>>,
    #[serde(deserialize_with = "present")]
    pub address: Option<Option<String>>,
    #[serde(deserialize_with = "present")]
    pub city: Option<Option<String>>,
    #[serde(deserialize_with = "present")]
    pub state: Option<Option<String>>,
    #[serde(deserialize_with = "present")]
    pub zip: Option<Option<String>>,
    #[serde(deserialize_with = "present")]
    pub notes: Option<Option<String>>,
    #[serde(rename = "type", deserialize_with = "present")]
    pub business_type: Option<Option<String>>,
    #[serde(deserialize_with = "present")]
    pub lead_status: Option<Option<String>>,
}

#[derive(Debug, Clone, Default, PartialEq, Deserialize)]
#[serde(default)]
pub struct NewProject {
    pub project_name: Option<String>,
    #[serde(rename = "type")]
    pub project_type: Option<String>,
    pub project_status: Option<String>,
    pub project_description: Option<String>,
    pub notes: Option<String>,
    pub project_start: Option<String>,
    pub project_end: Option<String>,
    pub project_worth: Option<f64>,
    pub client_id: Option<RecordId>,
    pub lead_id: Option<RecordId>,
}

#[derive(Debug, Clone, Default, PartialEq, Deserialize)]
#[serde(default)]
pub struct ProjectPatch {
    #[serde(deserialize_with = "present")]
    pub project_name: Option<Option<String>>,
    #[serde(rename = "type", deserialize_with = "present")]
    pub project_type: Option<Option<String>>,
    #[serde(deserialize_with = "present")]
    pub project_status: Option<Option<String>>,
    #[serde(deserialize_with = "present")]
    pub project_description: Option<Option<String>>,
    #[serde(deserialize_with = "present")]
    pub notes: Option<Option<String>>,
    #[serde(deserialize_with = "present")]
    pub project_start: Option<Option<String>>,
    #[serde(deserialize_with = "present")]
    pub project_end: Option<Option<String>>,
    #[serde(deserialize_with = "present")]
    pub project_worth: Option<Option<f64>>,
    #[serde(deserialize_with = "present")]
    pub client_id: Option<Option<RecordId>>,
    #[serde(deserialize_with = "present")]
    pub lead_id: Option<Option<RecordId>>,
}

#[derive(Debug, Clone, Default, PartialEq, Eq, Deserialize)]
#[serde(default)]
pub struct NewContact {
    pub client_id: Option<RecordId>,
    pub lead_id: Option<RecordId>,
    pub first_name: Option<String>,
    pub last_name: Option<String>,
    pub title: Option<String>,
    pub email: Option<String>,
    pub phone: Option<String>,
    pub phone_label: Option<String>,
    pub secondary_phone: Option<String>,
    pub secondary_phone_label: Option<String>,
    pub notes: Option<String>,
}

#[derive(Debug, Clone, Default, PartialEq, Eq, Deserialize)]
#[serde(default)]
pub struct ContactPatch {
    #[serde(deserialize_with = "present")]
    pub first_name: Option<Option<String>>,
    #[serde(deserialize_with = "present")]
    pub last_name: Option<Option<String>>,
    #[serde(deserialize_with = "present")]
    pub title: Option<Option<String>>,
    #[serde(deserialize_with = "present")]
    pub email: Option<Option<String>>,
    #[serde(deserialize_with = "present")]
    pub phone: Option<Option<String>>,
    #[serde(deserialize_with = "present")]
    pub phone_label: Option<Option<String>>,
    #[serde(deserialize_with = "present")]
    pub secondary_phone: Option<Option<String>>,
    #[serde(deserialize_with = "present")]
    pub secondary_phone_label: Option<Option<String>>,
    #[serde(deserialize_with = "present")]
    pub notes: Option<Option<String>>,
}
