//! Query-string parameters for list endpoints
//!
//! Every field is read as raw text so a malformed value never rejects the
//! request; it falls back to the default instead.

use clientele_core::{ListParams, PageRequest};
use serde::Deserialize;

#[derive(Debug, Clone, Default, Deserialize)]
#[serde(default)]
pub struct ListQuery {
    pub page: Option<String>,
    pub per_page: Option<String>,
    pub sort: Option<String>,
    pub activity_filter: Option<String>,
    /// Admin "all" views only: owner filter on assignee or creator email.
    pub user_email: Option<String>,
}

impl ListQuery {
    /// Normalise into engine parameters. `default_per_page` applies when
    /// `per_page` is absent, non-numeric or below 1.
    pub fn to_params(&self, default_per_page: u32) -> ListParams {
        let mut params = ListParams::from_raw(
            self.page.as_deref(),
            self.per_page.as_deref(),
            self.sort.as_deref(),
            self.activity_filter.as_deref(),
        );
        let explicit = self
            .per_page
            .as_deref()
            .and_then(|raw| raw.trim().parse::<i64>().ok())
            .is_some_and(|n| n >= 1);
        if !explicit {
            params.page = PageRequest {
                per_page: default_per_page.max(1),
                ..params.page
            };
        }
        params
    }

    /// Trimmed owner filter; blank means none.
    pub fn user_email(&self) -> Option<String> {
        self.user_email
            .as_deref()
            .map(str::trim)
            .filter(|email| !email.is_empty())
            .map(str::to_string)
    }
}

/// Parent selector for contact listings: `client_id` wins over `lead_id`.
#[derive(Debug, Clone, Default, Deserialize)]
#[serde(default)]
pub struct ParentQuery {
    pub client_id: Option<String>,
    pub lead_id: Option<String>,
}

impl ParentQuery {
    pub fn parent(&self) -> Option<clientele_core::PartyRef> {
        use clientele_core::{PartyRef, RecordId};
        let parse = |raw: &Option<String>| raw.as_deref().and_then(|s| s.parse::<RecordId>().ok());
        match (parse(&self.client_id), parse(&self.lead_id)) {
            (Some(id), _) => Some(PartyRef::client(id)),
            (None, Some(id)) => Some(PartyRef::lead(id)),
            (None, None) => None,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use clientele_core::{ActivityFilter, PartyRef, RecordId, SortSpec};
    use proptest::prelude::*;

    fn query(page: &str, per_page: &str, sort: &str, filter: &str) -> ListQuery {
        ListQuery {
            page: Some(page.to_string()),
            per_page: Some(per_page.to_string()),
            sort: Some(sort.to_string()),
            activity_filter: Some(filter.to_string()),
            user_email: None,
        }
    }

    #[test]
    fn test_well_formed_query() {
        let params = query("3", "50", "alphabetical", "inactive").to_params(20);
        assert_eq!(params.page, PageRequest { page: 3, per_page: 50 });
        assert_eq!(params.sort, SortSpec::Alphabetical);
        assert_eq!(params.activity, ActivityFilter::Inactive);
    }

    #[test]
    fn test_garbage_falls_back_to_defaults() {
        let params = query("abc", "-4", "random", "dormant").to_params(25);
        assert_eq!(params.page, PageRequest { page: 1, per_page: 25 });
        assert_eq!(params.sort, SortSpec::Newest);
        assert_eq!(params.activity, ActivityFilter::All);

        let empty = ListQuery::default().to_params(20);
        assert_eq!(empty, ListParams::default());
    }

    #[test]
    fn test_user_email_blank_is_none() {
        let mut q = ListQuery::default();
        q.user_email = Some("   ".to_string());
        assert_eq!(q.user_email(), None);
        q.user_email = Some(" b@t1.example ".to_string());
        assert_eq!(q.user_email().as_deref(), Some("b@t1.example"));
    }

    #[test]
    fn test_parent_prefers_client() {
        let both = ParentQuery {
            client_id: Some("4".to_string()),
            lead_id: Some("9".to_string()),
        };
        assert_eq!(both.parent(), Some(PartyRef::client(RecordId::new(4))));

        let bad_client = ParentQuery {
            client_id: Some("x".to_string()),
            lead_id: Some("9".to_string()),
        };
        assert_eq!(bad_client.parent(), Some(PartyRef::lead(RecordId::new(9))));
        assert_eq!(ParentQuery::default().parent(), None);
    }

    proptest! {
        #[test]
        fn prop_any_text_yields_valid_window(
            page in ".{0,8}",
            per_page in ".{0,8}",
            default in 1u32..100,
        ) {
            let q = ListQuery {
                page: Some(page),
                per_page: Some(per_page),
                ..ListQuery::default()
            };
            let params = q.to_params(default);
            prop_assert!(params.page.page >= 1);
            prop_assert!(params.page.per_page >= 1);
        }
    }
}
