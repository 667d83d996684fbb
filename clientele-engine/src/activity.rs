//! Activity windows
//!
//! Windows are measured back from the injected clock's "now" and include
//! their lower bound.

use chrono::Duration;
use clientele_core::{ActivityFilter, Field, Predicate, Timestamp};

pub const ACTIVE_WINDOW_DAYS: i64 = 30;
pub const INACTIVE_WINDOW_DAYS: i64 = 90;
pub const NEW_WINDOW_DAYS: i64 = 7;

/// Predicate over a client or lead and its interaction history.
///
/// `inactive` is the negation of "interacted in the last 90 days", so a
/// party that was never contacted is inactive and never active.
pub fn activity_predicate(filter: ActivityFilter, now: Timestamp) -> Predicate {
    match filter {
        ActivityFilter::All => Predicate::True,
        ActivityFilter::Active => {
            Predicate::InteractedSince(now - Duration::days(ACTIVE_WINDOW_DAYS))
        }
        ActivityFilter::Inactive => {
            Predicate::InteractedSince(now - Duration::days(INACTIVE_WINDOW_DAYS)).negate()
        }
        ActivityFilter::New => created_since(now - Duration::days(NEW_WINDOW_DAYS)),
    }
}

/// Projects have no interaction history of their own; only `new` narrows.
pub fn project_activity_predicate(filter: ActivityFilter, now: Timestamp) -> Predicate {
    match filter {
        ActivityFilter::New => created_since(now - Duration::days(NEW_WINDOW_DAYS)),
        ActivityFilter::All | ActivityFilter::Active | ActivityFilter::Inactive => Predicate::True,
    }
}

fn created_since(since: Timestamp) -> Predicate {
    Predicate::gte(Field::CreatedAt, since)
}
