//! Persisted records
//!
//! Clients and leads share one shape ([`Party`]); a lead additionally carries a
//! [`LeadPipeline`]. Relations that must point at exactly one of client or lead
//! are expressed with [`PartyRef`] so "both" cannot be represented.

use crate::{
    ActivityAction, BusinessType, EntityKind, LeadStatus, PartyKind, PhoneLabel, ProjectStatus,
    RecordId, Role, TenantContext, TenantId, Timestamp, UserId,
};
use serde::Serialize;
use std::collections::BTreeSet;

// ============================================================================
// USERS
// ============================================================================

/// An account within a tenant.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct User {
    pub id: UserId,
    pub tenant_id: TenantId,
    pub email: String,
    pub is_active: bool,
    pub roles: BTreeSet<Role>,
}

impl User {
    /// Principal for operations performed by this user.
    pub fn context(&self) -> TenantContext {
        TenantContext {
            tenant_id: self.tenant_id,
            user_id: self.id,
            email: self.email.clone(),
            roles: self.roles.clone(),
        }
    }
}

// ============================================================================
// PARTIES (CLIENTS AND LEADS)
// ============================================================================

/// Reference to a client or a lead.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct PartyRef {
    pub kind: PartyKind,
    pub id: RecordId,
}

impl PartyRef {
    pub fn client(id: RecordId) -> Self {
        Self {
            kind: PartyKind::Client,
            id,
        }
    }

    pub fn lead(id: RecordId) -> Self {
        Self {
            kind: PartyKind::Lead,
            id,
        }
    }

    pub fn client_id(&self) -> Option<RecordId> {
        (self.kind == PartyKind::Client).then_some(self.id)
    }

    pub fn lead_id(&self) -> Option<RecordId> {
        (self.kind == PartyKind::Lead).then_some(self.id)
    }

    /// Build from the pair of nullable foreign keys a row stores.
    pub fn from_columns(client_id: Option<RecordId>, lead_id: Option<RecordId>) -> Option<Self> {
        match (client_id, lead_id) {
            (Some(id), _) => Some(Self::client(id)),
            (None, Some(id)) => Some(Self::lead(id)),
            (None, None) => None,
        }
    }
}

/// Contact and address details shared by clients and leads.
#[derive(Debug, Clone, PartialEq, Eq, Default, Serialize)]
pub struct PartyProfile {
    pub name: String,
    pub contact_person: Option<String>,
    pub contact_title: Option<String>,
    pub email: Option<String>,
    pub phone: Option<String>,
    pub phone_label: PhoneLabel,
    pub secondary_phone: Option<String>,
    pub secondary_phone_label: Option<PhoneLabel>,
    pub address: Option<String>,
    pub city: Option<String>,
    pub state: Option<String>,
    pub zip: Option<String>,
    pub notes: Option<String>,
    #[serde(rename = "type")]
    pub business_type: BusinessType,
}

/// Sales pipeline state carried only by leads.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize)]
pub struct LeadPipeline {
    pub lead_status: LeadStatus,
    pub converted_on: Option<Timestamp>,
}

impl LeadPipeline {
    /// Move to `status`. Entering `converted` from any other status stamps
    /// `converted_on`; staying `converted` keeps the existing stamp.
    pub fn transition(&mut self, status: LeadStatus, now: Timestamp) {
        if status == LeadStatus::Converted && self.lead_status != LeadStatus::Converted {
            self.converted_on = Some(now);
        }
        self.lead_status = status;
    }
}

/// A client or a lead.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct Party {
    pub id: RecordId,
    #[serde(skip)]
    pub kind: PartyKind,
    pub tenant_id: TenantId,
    #[serde(flatten)]
    pub profile: PartyProfile,
    pub created_by: UserId,
    pub created_at: Timestamp,
    pub assigned_to: Option<UserId>,
    pub updated_by: Option<UserId>,
    pub updated_at: Option<Timestamp>,
    pub deleted_by: Option<UserId>,
    pub deleted_at: Option<Timestamp>,
    #[serde(flatten)]
    pub pipeline: Option<LeadPipeline>,
}

impl Party {
    /// A fresh, unsaved party. The store assigns `id` on insert.
    pub fn new(
        kind: PartyKind,
        tenant_id: TenantId,
        profile: PartyProfile,
        created_by: UserId,
        created_at: Timestamp,
    ) -> Self {
        let pipeline = match kind {
            PartyKind::Client => None,
            PartyKind::Lead => Some(LeadPipeline::default()),
        };
        Self {
            id: RecordId::new(0),
            kind,
            tenant_id,
            profile,
            created_by,
            created_at,
            assigned_to: None,
            updated_by: None,
            updated_at: None,
            deleted_by: None,
            deleted_at: None,
            pipeline,
        }
    }

    pub fn reference(&self) -> PartyRef {
        PartyRef {
            kind: self.kind,
            id: self.id,
        }
    }

    pub fn is_deleted(&self) -> bool {
        self.deleted_at.is_some()
    }

    /// The user credited with the record: the assignee, else the creator.
    pub fn effective_owner(&self) -> UserId {
        self.assigned_to.unwrap_or(self.created_by)
    }

    pub fn touch(&mut self, by: UserId, at: Timestamp) {
        self.updated_by = Some(by);
        self.updated_at = Some(at);
    }
}

// ============================================================================
// PROJECTS
// ============================================================================

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct Project {
    pub id: RecordId,
    pub tenant_id: TenantId,
    pub project_name: String,
    #[serde(rename = "type")]
    pub project_type: String,
    pub project_status: ProjectStatus,
    pub project_description: Option<String>,
    pub notes: Option<String>,
    pub project_start: Option<Timestamp>,
    pub project_end: Option<Timestamp>,
    pub project_worth: Option<f64>,
    #[serde(skip)]
    pub link: Option<PartyRef>,
    pub created_by: UserId,
    pub created_at: Timestamp,
}

impl Project {
    pub fn client_id(&self) -> Option<RecordId> {
        self.link.and_then(|link| link.client_id())
    }

    pub fn lead_id(&self) -> Option<RecordId> {
        self.link.and_then(|link| link.lead_id())
    }
}

// ============================================================================
// CONTACTS AND INTERACTIONS
// ============================================================================

/// Secondary contact person attached to a client or lead.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct Contact {
    pub id: RecordId,
    pub tenant_id: TenantId,
    #[serde(skip)]
    pub parent: PartyRef,
    pub first_name: Option<String>,
    pub last_name: Option<String>,
    pub title: Option<String>,
    pub email: Option<String>,
    pub phone: Option<String>,
    pub phone_label: Option<PhoneLabel>,
    pub secondary_phone: Option<String>,
    pub secondary_phone_label: Option<PhoneLabel>,
    pub notes: Option<String>,
}

impl Contact {
    pub fn client_id(&self) -> Option<RecordId> {
        self.parent.client_id()
    }

    pub fn lead_id(&self) -> Option<RecordId> {
        self.parent.lead_id()
    }
}

/// A logged touchpoint with a client or lead. Read-only to the engine.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct Interaction {
    pub id: RecordId,
    pub tenant_id: TenantId,
    #[serde(skip)]
    pub party: PartyRef,
    pub contact_date: Timestamp,
    pub summary: Option<String>,
    pub outcome: Option<String>,
    pub notes: Option<String>,
    pub follow_up: Option<Timestamp>,
}

impl Interaction {
    pub fn new(tenant_id: TenantId, party: PartyRef, contact_date: Timestamp) -> Self {
        Self {
            id: RecordId::new(0),
            tenant_id,
            party,
            contact_date,
            summary: None,
            outcome: None,
            notes: None,
            follow_up: None,
        }
    }
}

/// Interaction count and most recent contact for one party.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize)]
pub struct InteractionStats {
    pub interaction_count: u64,
    pub last_interaction_at: Option<Timestamp>,
}

// ============================================================================
// ACTIVITY LOG
// ============================================================================

/// Append-only audit record.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct ActivityLog {
    pub id: RecordId,
    pub tenant_id: TenantId,
    pub user_id: UserId,
    pub action: ActivityAction,
    pub entity_type: EntityKind,
    pub entity_id: RecordId,
    pub description: String,
    pub timestamp: Timestamp,
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::{TimeZone, Utc};

    fn at(day: u32) -> Timestamp {
        Utc.with_ymd_and_hms(2024, 1, day, 9, 0, 0).unwrap()
    }

    #[test]
    fn test_staying_converted_keeps_stamp() {
        let mut pipeline = LeadPipeline::default();
        pipeline.transition(LeadStatus::Converted, at(2));
        assert_eq!(pipeline.converted_on, Some(at(2)));

        pipeline.transition(LeadStatus::Converted, at(3));
        assert_eq!(pipeline.converted_on, Some(at(2)));
    }

    #[test]
    fn test_reconversion_restamps() {
        let mut pipeline = LeadPipeline::default();
        pipeline.transition(LeadStatus::Converted, at(2));
        pipeline.transition(LeadStatus::Closed, at(4));
        assert_eq!(pipeline.converted_on, Some(at(2)));

        pipeline.transition(LeadStatus::Converted, at(5));
        assert_eq!(pipeline.converted_on, Some(at(5)));
        assert_eq!(pipeline.lead_status, LeadStatus::Converted);
    }

    #[test]
    fn test_non_conversion_leaves_stamp_empty() {
        let mut pipeline = LeadPipeline::default();
        pipeline.transition(LeadStatus::Lost, at(2));
        assert_eq!(pipeline.converted_on, None);
    }

    #[test]
    fn test_party_ref_from_columns() {
        let id = RecordId::new(5);
        assert_eq!(PartyRef::from_columns(Some(id), None), Some(PartyRef::client(id)));
        assert_eq!(PartyRef::from_columns(None, Some(id)), Some(PartyRef::lead(id)));
        assert_eq!(PartyRef::from_columns(None, None), None);
        assert_eq!(PartyRef::lead(id).client_id(), None);
    }

    #[test]
    fn test_lead_serializes_pipeline_flat() {
        let mut profile = PartyProfile::default();
        profile.name = "Acme".to_string();
        let lead = Party::new(
            PartyKind::Lead,
            TenantId::new(1),
            profile,
            UserId::new(2),
            at(1),
        );
        let json = serde_json::to_value(&lead).unwrap();
        assert_eq!(json["name"], "Acme");
        assert_eq!(json["type"], "None");
        assert_eq!(json["lead_status"], "open");
        assert!(json["converted_on"].is_null());
        assert!(json.get("kind").is_none());
    }

    #[test]
    fn test_effective_owner_prefers_assignee() {
        let mut client = Party::new(
            PartyKind::Client,
            TenantId::new(1),
            PartyProfile::default(),
            UserId::new(2),
            at(1),
        );
        assert_eq!(client.effective_owner(), UserId::new(2));
        client.assigned_to = Some(UserId::new(3));
        assert_eq!(client.effective_owner(), UserId::new(3));
    }
}
