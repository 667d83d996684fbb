//! Sort keywords to orderings

use clientele_core::{Direction, Ordering, SortKey, SortSpec};

/// Ordering for client and lead lists.
pub fn order_by(spec: SortSpec) -> Ordering {
    match spec {
        SortSpec::Newest => Ordering::new(SortKey::CreatedAt, Direction::Desc),
        SortSpec::Oldest => Ordering::new(SortKey::CreatedAt, Direction::Asc),
        SortSpec::Alphabetical => Ordering::new(SortKey::Name, Direction::Asc),
        SortSpec::Activity => Ordering::new(SortKey::LastInteraction, Direction::Desc),
    }
}

/// Ordering for project lists. `activity` has nothing to rank by and falls
/// back to newest.
pub fn project_order_by(spec: SortSpec) -> Ordering {
    match spec {
        SortSpec::Activity => order_by(SortSpec::Newest),
        other => order_by(other),
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_keyword_orderings() {
        assert_eq!(order_by(SortSpec::default()), Ordering::newest());
        assert_eq!(
            order_by(SortSpec::parse(Some("activity"))),
            Ordering::new(SortKey::LastInteraction, Direction::Desc)
        );
        assert_eq!(
            order_by(SortSpec::parse(Some("bogus"))),
            order_by(SortSpec::Newest)
        );
    }

    #[test]
    fn test_project_activity_falls_back() {
        assert_eq!(project_order_by(SortSpec::Activity), Ordering::newest());
        assert_eq!(
            project_order_by(SortSpec::Alphabetical),
            Ordering::new(SortKey::Name, Direction::Asc)
        );
    }
}
