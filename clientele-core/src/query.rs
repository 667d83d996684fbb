//! List request keywords and pagination

use serde::Serialize;
use std::fmt;

pub const DEFAULT_PAGE: u32 = 1;
pub const DEFAULT_PER_PAGE: u32 = 20;

/// Time-windowed filter over a party's interaction history.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default, Serialize)]
#[serde(rename_all = "lowercase")]
pub enum ActivityFilter {
    #[default]
    All,
    /// At least one interaction in the last 30 days.
    Active,
    /// No interaction in the last 90 days, including parties never contacted.
    Inactive,
    /// Created in the last 7 days.
    New,
}

impl ActivityFilter {
    /// Parse a request keyword. Unknown or missing keywords mean `all`.
    pub fn parse(raw: Option<&str>) -> Self {
        match raw.map(|s| s.trim().to_lowercase()).as_deref() {
            Some("active") => ActivityFilter::Active,
            Some("inactive") => ActivityFilter::Inactive,
            Some("new") => ActivityFilter::New,
            _ => ActivityFilter::All,
        }
    }

    pub fn as_str(&self) -> &'static str {
        match self {
            ActivityFilter::All => "all",
            ActivityFilter::Active => "active",
            ActivityFilter::Inactive => "inactive",
            ActivityFilter::New => "new",
        }
    }
}

impl fmt::Display for ActivityFilter {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Requested list order.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default, Serialize)]
#[serde(rename_all = "lowercase")]
pub enum SortSpec {
    #[default]
    Newest,
    Oldest,
    Alphabetical,
    Activity,
}

impl SortSpec {
    /// Parse a request keyword. Unknown or missing keywords mean `newest`.
    pub fn parse(raw: Option<&str>) -> Self {
        match raw.map(|s| s.trim().to_lowercase()).as_deref() {
            Some("oldest") => SortSpec::Oldest,
            Some("alphabetical") => SortSpec::Alphabetical,
            Some("activity") => SortSpec::Activity,
            _ => SortSpec::Newest,
        }
    }

    pub fn as_str(&self) -> &'static str {
        match self {
            SortSpec::Newest => "newest",
            SortSpec::Oldest => "oldest",
            SortSpec::Alphabetical => "alphabetical",
            SortSpec::Activity => "activity",
        }
    }
}

impl fmt::Display for SortSpec {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// One-based page window. Always at least page 1 with one row per page.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize)]
pub struct PageRequest {
    pub page: u32,
    pub per_page: u32,
}

impl PageRequest {
    /// Normalise raw numbers: page below 1 clamps to 1, a missing or
    /// non-positive per_page falls back to the default.
    pub fn new(page: Option<i64>, per_page: Option<i64>) -> Self {
        let page = page
            .map(|p| p.clamp(1, i64::from(u32::MAX)) as u32)
            .unwrap_or(DEFAULT_PAGE);
        let per_page = match per_page {
            Some(n) if n >= 1 => n.min(i64::from(u32::MAX)) as u32,
            _ => DEFAULT_PER_PAGE,
        };
        Self { page, per_page }
    }

    /// Parse query-string text. Non-numeric input counts as absent.
    pub fn from_raw(page: Option<&str>, per_page: Option<&str>) -> Self {
        let parse = |raw: Option<&str>| raw.and_then(|s| s.trim().parse::<i64>().ok());
        Self::new(parse(page), parse(per_page))
    }

    pub fn offset(&self) -> u64 {
        u64::from(self.page.saturating_sub(1)) * u64::from(self.per_page)
    }

    pub fn limit(&self) -> u64 {
        u64::from(self.per_page)
    }
}

impl Default for PageRequest {
    fn default() -> Self {
        Self {
            page: DEFAULT_PAGE,
            per_page: DEFAULT_PER_PAGE,
        }
    }
}

/// Normalised parameters of a list request.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub struct ListParams {
    pub page: PageRequest,
    pub sort: SortSpec,
    pub activity: ActivityFilter,
}

impl ListParams {
    pub fn from_raw(
        page: Option<&str>,
        per_page: Option<&str>,
        sort: Option<&str>,
        activity_filter: Option<&str>,
    ) -> Self {
        Self {
            page: PageRequest::from_raw(page, per_page),
            sort: SortSpec::parse(sort),
            activity: ActivityFilter::parse(activity_filter),
        }
    }
}

/// One page of results with the pre-pagination match count.
#[derive(Debug, Clone, PartialEq)]
pub struct Page<T> {
    pub items: Vec<T>,
    pub total: u64,
}

impl<T> Page<T> {
    pub fn empty() -> Self {
        Self {
            items: Vec::new(),
            total: 0,
        }
    }

    pub fn map<U>(self, f: impl FnMut(T) -> U) -> Page<U> {
        Page {
            items: self.items.into_iter().map(f).collect(),
            total: self.total,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use proptest::prelude::*;

    #[test]
    fn test_unknown_keywords_fall_back() {
        assert_eq!(ActivityFilter::parse(Some("dormant")), ActivityFilter::All);
        assert_eq!(ActivityFilter::parse(None), ActivityFilter::All);
        assert_eq!(ActivityFilter::parse(Some("Inactive")), ActivityFilter::Inactive);
        assert_eq!(SortSpec::parse(Some("random")), SortSpec::Newest);
        assert_eq!(SortSpec::parse(Some("activity")), SortSpec::Activity);
    }

    #[test]
    fn test_page_defaults_for_garbage() {
        let page = PageRequest::from_raw(Some("two"), Some(""));
        assert_eq!(page, PageRequest::default());
        assert_eq!(page.offset(), 0);
    }

    #[test]
    fn test_page_clamps_below_one() {
        let page = PageRequest::new(Some(-4), Some(0));
        assert_eq!(page.page, 1);
        assert_eq!(page.per_page, DEFAULT_PER_PAGE);
        assert_eq!(PageRequest::new(Some(3), Some(10)).offset(), 20);
    }

    proptest! {
        #![proptest_config(ProptestConfig::with_cases(100))]

        #[test]
        fn prop_page_window_never_underflows(page in any::<i64>(), per_page in any::<i64>()) {
            let req = PageRequest::new(Some(page), Some(per_page));
            prop_assert!(req.page >= 1);
            prop_assert!(req.per_page >= 1);
            prop_assert_eq!(req.offset(), u64::from(req.page - 1) * u64::from(req.per_page));
        }
    }
}
