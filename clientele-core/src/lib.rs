//! Clientele Core - Entity Types
//!
//! Pure data structures shared by every other crate: typed identifiers, the
//! injectable clock, persisted records, closed option sets, the principal,
//! the predicate/ordering AST, list keywords and the error taxonomy.
//! No storage and no business rules live here.

pub mod context;
pub mod entities;
pub mod enums;
pub mod error;
pub mod identity;
pub mod payloads;
pub mod predicate;
pub mod query;

pub use context::{Capability, Role, TenantContext};
pub use entities::{
    ActivityLog, Contact, Interaction, InteractionStats, LeadPipeline, Party, PartyProfile,
    PartyRef, Project, User,
};
pub use enums::{
    ActivityAction, BusinessType, EntityKind, LeadStatus, OptionParseError, PartyKind,
    PhoneLabel, ProjectStatus,
};
pub use error::{CrmError, CrmResult, ErrorKind, StorageError, ValidationError};
pub use identity::{
    parse_timestamp, Clock, FixedClock, IdParseError, RecordId, SystemClock, TenantId,
    Timestamp, UserId,
};
pub use payloads::{ContactPatch, NewContact, NewParty, NewProject, PartyPatch, ProjectPatch};
pub use predicate::{Direction, Field, Ordering, Predicate, SortKey, Value};
pub use query::{
    ActivityFilter, ListParams, Page, PageRequest, SortSpec, DEFAULT_PAGE, DEFAULT_PER_PAGE,
};
