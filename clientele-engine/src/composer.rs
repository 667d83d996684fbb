//! Query composition
//!
//! Combines a visibility predicate, an activity predicate, an ordering and a
//! page window into one store query. The store returns the page together
//! with the number of matches before windowing.

use clientele_core::{
    CrmResult, Ordering, Page, PageRequest, Party, PartyKind, Predicate, Project, TenantId,
};
use clientele_storage::{RecordQuery, UnitOfWork};

/// Builder for one list execution.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct QueryComposer {
    tenant: TenantId,
    filter: Predicate,
    ordering: Ordering,
    window: Option<PageRequest>,
}

impl QueryComposer {
    /// Start from the visibility predicate.
    pub fn new(tenant: TenantId, base: Predicate) -> Self {
        Self {
            tenant,
            filter: base,
            ordering: Ordering::default(),
            window: None,
        }
    }

    /// AND another predicate onto the filter.
    pub fn filter(mut self, predicate: Predicate) -> Self {
        self.filter = std::mem::replace(&mut self.filter, Predicate::True).and(predicate);
        self
    }

    pub fn order(mut self, ordering: Ordering) -> Self {
        self.ordering = ordering;
        self
    }

    pub fn page(mut self, window: PageRequest) -> Self {
        self.window = Some(window);
        self
    }

    pub fn into_query(self) -> RecordQuery {
        RecordQuery {
            tenant: self.tenant,
            filter: self.filter,
            ordering: self.ordering,
            window: self.window,
        }
    }

    pub async fn parties(self, uow: &mut dyn UnitOfWork, kind: PartyKind) -> CrmResult<Page<Party>> {
        uow.party_query(kind, &self.into_query()).await
    }

    pub async fn projects(self, uow: &mut dyn UnitOfWork) -> CrmResult<Page<Project>> {
        uow.project_query(&self.into_query()).await
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use clientele_core::{Field, UserId};

    #[test]
    fn test_filters_are_conjoined() {
        let tenant = TenantId::new(4);
        let base = Predicate::eq(Field::TenantId, tenant);
        let query = QueryComposer::new(tenant, base.clone())
            .filter(Predicate::True)
            .filter(Predicate::eq(Field::CreatedBy, UserId::new(2)))
            .page(PageRequest::default())
            .into_query();
        assert_eq!(
            query.filter,
            Predicate::And(vec![base, Predicate::eq(Field::CreatedBy, UserId::new(2))])
        );
        assert_eq!(query.window, Some(PageRequest::default()));
        assert_eq!(query.ordering, Ordering::newest());
    }
}
