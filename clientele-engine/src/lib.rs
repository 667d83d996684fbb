//! Clientele Engine - Visibility and Query Composition
//!
//! Decides which rows a principal may see, composes those rules with
//! activity windows, sort keys and pagination, decorates pages with
//! interaction statistics, and runs the assignment workflow. The
//! [`Engine`] services expose the per-entity operations built on top.

pub mod activity;
pub mod activity_log;
pub mod assignment;
pub mod composer;
pub mod notify;
pub mod services;
pub mod sort;
pub mod stats;
pub mod validation;
pub mod views;
pub mod visibility;

pub use activity::{
    activity_predicate, project_activity_predicate, ACTIVE_WINDOW_DAYS, INACTIVE_WINDOW_DAYS,
    NEW_WINDOW_DAYS,
};
pub use activity_log::ActivityLogger;
pub use assignment::{AssignmentReport, AssignmentWorkflow, NotificationOutcome, PendingAssignment};
pub use composer::QueryComposer;
pub use notify::{AssignmentNotice, LogNotifier, NotifyError, Notifier};
pub use services::Engine;
pub use sort::{order_by, project_order_by};
pub use stats::StatsAggregator;
pub use validation::normalize_phone;
pub use views::{ContactView, PartyListing, PartySummary, ProjectListing, ProjectSummary};
pub use visibility::{Access, VisibilityPolicy};
