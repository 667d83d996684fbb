//! Decorated read models returned by the services

use clientele_core::{
    ActivityFilter, Contact, InteractionStats, PageRequest, Party, PartyKind, Project, RecordId,
    SortSpec,
};
use serde::Serialize;

/// A client or lead with owner names and interaction statistics.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct PartySummary {
    #[serde(flatten)]
    pub party: Party,
    /// Assignee email, else creator email.
    pub assigned_to_name: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub created_by_name: Option<String>,
    #[serde(flatten)]
    pub stats: InteractionStats,
}

/// One page of a client or lead list plus the normalised request echo.
#[derive(Debug, Clone, PartialEq)]
pub struct PartyListing {
    pub kind: PartyKind,
    pub items: Vec<PartySummary>,
    pub total: u64,
    pub page: PageRequest,
    pub sort: SortSpec,
    pub activity: ActivityFilter,
    /// Admin views echo the owner filter that was applied.
    pub user_email: Option<String>,
}

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct ProjectSummary {
    #[serde(flatten)]
    pub project: Project,
    pub client_id: Option<RecordId>,
    pub lead_id: Option<RecordId>,
    pub client_name: Option<String>,
    pub lead_name: Option<String>,
    /// Only filled by the admin view.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub assigned_to_email: Option<String>,
}

#[derive(Debug, Clone, PartialEq)]
pub struct ProjectListing {
    pub items: Vec<ProjectSummary>,
    pub total: u64,
    pub page: PageRequest,
    pub sort: SortSpec,
    pub activity: ActivityFilter,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct ContactView {
    #[serde(flatten)]
    pub contact: Contact,
    pub client_id: Option<RecordId>,
    pub lead_id: Option<RecordId>,
}

impl From<Contact> for ContactView {
    fn from(contact: Contact) -> Self {
        Self {
            client_id: contact.client_id(),
            lead_id: contact.lead_id(),
            contact,
        }
    }
}
