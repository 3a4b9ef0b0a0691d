//! Canonical query descriptors for list views.
//!
//! `QuerySpec` is the normalized, comparable form of what a list should show.
//! Two specs are equal exactly when their canonical keys are equal: filters
//! live in a sorted map and every field is normalized on construction.

use std::cmp::Ordering;
use std::collections::BTreeMap;

use serde::{Deserialize, Serialize};
use serde_json::json;

use crate::models::EntityKind;

/// Default page size (the public events grid shows 8 cards).
pub const DEFAULT_PAGE_SIZE: usize = 8;

/// Upper bound for page sizes requested from the API.
pub const MAX_PAGE_SIZE: usize = 500;

/// Filter value meaning "no filter on this facet".
const ALL_SENTINEL: &str = "all";

/// Query parameters the list endpoint already uses; never valid facet names.
const RESERVED_PARAMS: [&str; 5] = ["search", "sort", "order", "page", "limit"];

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
#[cfg_attr(feature = "ts", derive(ts_rs::TS), ts(export))]
pub enum SortDirection {
    #[default]
    Asc,
    Desc,
}

impl SortDirection {
    pub fn reversed(self) -> Self {
        match self {
            SortDirection::Asc => SortDirection::Desc,
            SortDirection::Desc => SortDirection::Asc,
        }
    }

    /// Orient an ascending comparison.
    pub fn apply(self, ordering: Ordering) -> Ordering {
        match self {
            SortDirection::Asc => ordering,
            SortDirection::Desc => ordering.reverse(),
        }
    }

    pub fn as_str(self) -> &'static str {
        match self {
            SortDirection::Asc => "asc",
            SortDirection::Desc => "desc",
        }
    }

    pub fn parse(s: &str) -> Option<Self> {
        match s.trim().to_ascii_lowercase().as_str() {
            "asc" | "ascending" => Some(SortDirection::Asc),
            "desc" | "descending" => Some(SortDirection::Desc),
            _ => None,
        }
    }
}

/// Unvalidated user intent, as forwarded by the presentation layer.
#[derive(Debug, Clone, Default, Deserialize)]
pub struct RawQuery {
    #[serde(default)]
    pub search: String,
    #[serde(default)]
    pub filters: Vec<(String, String)>,
    #[serde(default)]
    pub sort_key: Option<String>,
    #[serde(default)]
    pub sort_direction: Option<SortDirection>,
    #[serde(default)]
    pub page: Option<i64>,
    #[serde(default)]
    pub page_size: Option<usize>,
}

/// Per-view defaults applied during normalization.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct QueryDefaults {
    pub sort_key: String,
    pub sort_direction: SortDirection,
    pub page_size: usize,
}

impl QueryDefaults {
    pub fn for_kind(kind: EntityKind) -> Self {
        let (key, direction) = kind.default_sort();
        Self {
            sort_key: key.to_string(),
            sort_direction: direction,
            page_size: DEFAULT_PAGE_SIZE,
        }
    }

    pub fn with_page_size(mut self, page_size: usize) -> Self {
        self.page_size = clamp_page_size(page_size);
        self
    }
}

/// Which parts of a `QuerySpec` the server evaluates for a given view.
/// Parts outside the scope are refined locally and never change the fetch key.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct FetchScope {
    pub search: bool,
    pub filters: bool,
    pub sort: bool,
    pub paging: bool,
}

impl FetchScope {
    /// The server searches, filters, sorts and pages.
    pub const SERVER: FetchScope = FetchScope { search: true, filters: true, sort: true, paging: true };

    /// Fetch the whole collection once; everything else happens locally.
    pub const CLIENT: FetchScope = FetchScope { search: false, filters: false, sort: false, paging: false };

    /// Server-side facets, client-side search, sort and paging.
    pub const FACETS: FetchScope = FetchScope { search: false, filters: true, sort: false, paging: false };
}

impl Default for FetchScope {
    fn default() -> Self {
        FetchScope::SERVER
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
#[cfg_attr(feature = "ts", derive(ts_rs::TS), ts(export))]
pub struct QuerySpec {
    search_term: String,
    filters: BTreeMap<String, String>,
    sort_key: String,
    sort_direction: SortDirection,
    page: usize,
    page_size: usize,
}

impl QuerySpec {
    /// Default spec at page activation.
    pub fn new(defaults: &QueryDefaults) -> Self {
        Self::normalize(RawQuery::default(), defaults)
    }

    /// Trim search text, drop "all"/empty filters, clamp the page to >= 1 and
    /// fall back to the default sort and page size.
    pub fn normalize(raw: RawQuery, defaults: &QueryDefaults) -> Self {
        let filters = raw
            .filters
            .into_iter()
            .filter_map(|(facet, value)| normalize_filter(&facet, &value))
            .collect();

        let sort_key = raw
            .sort_key
            .map(|k| k.trim().to_string())
            .filter(|k| !k.is_empty());
        let (sort_key, sort_direction) = match sort_key {
            Some(key) => (key, raw.sort_direction.unwrap_or_default()),
            None => (
                defaults.sort_key.clone(),
                raw.sort_direction.unwrap_or(defaults.sort_direction),
            ),
        };

        Self {
            search_term: raw.search.trim().to_string(),
            filters,
            sort_key,
            sort_direction,
            page: clamp_page(raw.page.unwrap_or(1)),
            page_size: clamp_page_size(raw.page_size.unwrap_or(defaults.page_size)),
        }
    }

    /// Deterministic serialization: equal specs produce identical keys.
    pub fn to_key(&self) -> String {
        json!({
            "search": self.search_term,
            "filters": self.filters,
            "sort": [self.sort_key, self.sort_direction.as_str()],
            "page": self.page,
            "pageSize": self.page_size,
        })
        .to_string()
    }

    pub fn search_term(&self) -> &str {
        &self.search_term
    }

    pub fn filters(&self) -> &BTreeMap<String, String> {
        &self.filters
    }

    pub fn filter(&self, facet: &str) -> Option<&str> {
        self.filters.get(facet).map(String::as_str)
    }

    pub fn sort_key(&self) -> &str {
        &self.sort_key
    }

    pub fn sort_direction(&self) -> SortDirection {
        self.sort_direction
    }

    pub fn page(&self) -> usize {
        self.page
    }

    pub fn page_size(&self) -> usize {
        self.page_size
    }

    // ===== Transitions =====
    // Everything except `with_page` resets to the first page.

    pub fn with_search(&self, search: &str) -> Self {
        Self {
            search_term: search.trim().to_string(),
            page: 1,
            ..self.clone()
        }
    }

    /// Set a facet; an "all"/empty value removes it.
    pub fn with_filter(&self, facet: &str, value: &str) -> Self {
        let mut filters = self.filters.clone();
        match normalize_filter(facet, value) {
            Some((facet, value)) => {
                filters.insert(facet, value);
            }
            None => {
                filters.remove(facet.trim());
            }
        }
        Self {
            filters,
            page: 1,
            ..self.clone()
        }
    }

    pub fn without_filter(&self, facet: &str) -> Self {
        self.with_filter(facet, ALL_SENTINEL)
    }

    pub fn without_filters(&self) -> Self {
        Self {
            filters: BTreeMap::new(),
            page: 1,
            ..self.clone()
        }
    }

    pub fn with_sort(&self, key: &str, direction: SortDirection) -> Self {
        let key = key.trim();
        Self {
            sort_key: if key.is_empty() { self.sort_key.clone() } else { key.to_string() },
            sort_direction: direction,
            page: 1,
            ..self.clone()
        }
    }

    /// Sort-header click: same column flips direction, a new column starts ascending.
    pub fn toggle_sort(&self, key: &str) -> Self {
        if self.sort_key == key.trim() {
            self.with_sort(key, self.sort_direction.reversed())
        } else {
            self.with_sort(key, SortDirection::Asc)
        }
    }

    pub fn with_page_size(&self, page_size: usize) -> Self {
        Self {
            page_size: clamp_page_size(page_size),
            page: 1,
            ..self.clone()
        }
    }

    /// Pure page navigation; everything else is preserved.
    pub fn with_page(&self, page: usize) -> Self {
        Self {
            page: page.max(1),
            ..self.clone()
        }
    }

    /// The server-facing part of this spec under `scope`.
    pub fn list_params(&self, scope: FetchScope) -> ListParams {
        ListParams {
            search: (scope.search && !self.search_term.is_empty()).then(|| self.search_term.clone()),
            filters: if scope.filters { self.filters.clone() } else { BTreeMap::new() },
            sort: scope.sort.then(|| (self.sort_key.clone(), self.sort_direction)),
            page: scope.paging.then_some((self.page, self.page_size)),
        }
    }
}

/// Query sent to the list endpoint. Parts set to `None`/empty are omitted.
#[derive(Debug, Clone, Default, PartialEq, Eq, Hash)]
pub struct ListParams {
    pub search: Option<String>,
    pub filters: BTreeMap<String, String>,
    pub sort: Option<(String, SortDirection)>,
    pub page: Option<(usize, usize)>,
}

impl ListParams {
    /// Canonical key fragment; the cache prefixes it with the entity kind.
    pub fn to_key(&self) -> String {
        json!({
            "search": self.search,
            "filters": self.filters,
            "sort": self.sort.as_ref().map(|(key, dir)| [key.as_str(), dir.as_str()]),
            "page": self.page.map(|(page, size)| [page, size]),
        })
        .to_string()
    }

    /// URL query pairs: `search`, `sort`, `order`, `page`, `limit`, then one pair per facet.
    pub fn to_query_pairs(&self) -> Vec<(String, String)> {
        let mut pairs = Vec::new();
        if let Some(search) = &self.search {
            pairs.push(("search".to_string(), search.clone()));
        }
        if let Some((key, direction)) = &self.sort {
            pairs.push(("sort".to_string(), key.clone()));
            pairs.push(("order".to_string(), direction.as_str().to_string()));
        }
        if let Some((page, size)) = self.page {
            pairs.push(("page".to_string(), page.to_string()));
            pairs.push(("limit".to_string(), size.to_string()));
        }
        for (facet, value) in &self.filters {
            pairs.push((facet.clone(), value.clone()));
        }
        pairs
    }
}

fn normalize_filter(facet: &str, value: &str) -> Option<(String, String)> {
    let facet = facet.trim();
    let value = value.trim();
    if facet.is_empty()
        || value.is_empty()
        || value.eq_ignore_ascii_case(ALL_SENTINEL)
        || RESERVED_PARAMS.iter().any(|reserved| facet.eq_ignore_ascii_case(reserved))
    {
        None
    } else {
        Some((facet.to_string(), value.to_string()))
    }
}

fn clamp_page(page: i64) -> usize {
    usize::try_from(page.max(1)).unwrap_or(1)
}

fn clamp_page_size(page_size: usize) -> usize {
    page_size.clamp(1, MAX_PAGE_SIZE)
}

// ============================================================================
// Tests
// ============================================================================

#[cfg(test)]
mod tests {
    use super::*;

    fn defaults() -> QueryDefaults {
        QueryDefaults::for_kind(EntityKind::Event)
    }

    fn raw(search: &str, filters: &[(&str, &str)]) -> RawQuery {
        RawQuery {
            search: search.to_string(),
            filters: filters
                .iter()
                .map(|(k, v)| (k.to_string(), v.to_string()))
                .collect(),
            ..Default::default()
        }
    }

    #[test]
    fn test_normalize_applies_defaults() {
        let spec = QuerySpec::new(&defaults());
        assert_eq!(spec.search_term(), "");
        assert!(spec.filters().is_empty());
        assert_eq!(spec.sort_key(), "startDate");
        assert_eq!(spec.sort_direction(), SortDirection::Asc);
        assert_eq!(spec.page(), 1);
        assert_eq!(spec.page_size(), DEFAULT_PAGE_SIZE);
    }

    #[test]
    fn test_normalize_trims_and_drops_sentinels() {
        let spec = QuerySpec::normalize(
            raw("  gala  ", &[("category", "All"), ("status", ""), (" city ", " Amman ")]),
            &defaults(),
        );
        assert_eq!(spec.search_term(), "gala");
        assert_eq!(spec.filters().len(), 1);
        assert_eq!(spec.filter("city"), Some("Amman"));
    }

    #[test]
    fn test_normalize_clamps_page() {
        let mut q = raw("", &[]);
        q.page = Some(-4);
        q.page_size = Some(0);
        let spec = QuerySpec::normalize(q, &defaults());
        assert_eq!(spec.page(), 1);
        assert_eq!(spec.page_size(), 1);
    }

    #[test]
    fn test_key_independent_of_filter_order() {
        let a = QuerySpec::normalize(raw("x", &[("status", "open"), ("category", "workshop")]), &defaults());
        let b = QuerySpec::normalize(raw(" x", &[("category", "workshop"), ("status", "open")]), &defaults());
        assert_eq!(a, b);
        assert_eq!(a.to_key(), b.to_key());
    }

    #[test]
    fn test_key_differs_when_fields_differ() {
        let base = QuerySpec::new(&defaults());
        let variants = [
            base.with_search("gala"),
            base.with_filter("category", "workshop"),
            base.with_sort("title", SortDirection::Asc),
            base.with_sort("startDate", SortDirection::Desc),
            base.with_page(2),
            base.with_page_size(20),
        ];
        for (i, a) in variants.iter().enumerate() {
            assert_ne!(a.to_key(), base.to_key());
            for b in &variants[i + 1..] {
                assert_eq!(a == b, a.to_key() == b.to_key());
            }
        }
    }

    #[test]
    fn test_key_escapes_separator_characters() {
        // Values that look like key syntax must not collide
        let a = QuerySpec::new(&defaults()).with_filter("a", "b\",\"c");
        let b = QuerySpec::new(&defaults())
            .with_filter("a", "b")
            .with_filter("c", "");
        assert_ne!(a.to_key(), b.to_key());
    }

    #[test]
    fn test_changes_reset_page_but_navigation_preserves() {
        let spec = QuerySpec::new(&defaults()).with_page(3);
        assert_eq!(spec.page(), 3);
        assert_eq!(spec.with_search("x").page(), 1);
        assert_eq!(spec.with_filter("category", "workshop").page(), 1);
        assert_eq!(spec.toggle_sort("title").page(), 1);

        let filtered = QuerySpec::new(&defaults()).with_filter("category", "workshop");
        let paged = filtered.with_page(2);
        assert_eq!(paged.filter("category"), Some("workshop"));
        assert_eq!(paged.sort_key(), filtered.sort_key());
    }

    #[test]
    fn test_toggle_sort() {
        let spec = QuerySpec::new(&defaults());
        let by_title = spec.toggle_sort("title");
        assert_eq!(by_title.sort_key(), "title");
        assert_eq!(by_title.sort_direction(), SortDirection::Asc);
        let flipped = by_title.toggle_sort("title");
        assert_eq!(flipped.sort_direction(), SortDirection::Desc);
        assert_eq!(flipped.toggle_sort("location").sort_direction(), SortDirection::Asc);
    }

    #[test]
    fn test_without_filter() {
        let spec = QuerySpec::new(&defaults())
            .with_filter("category", "workshop")
            .with_filter("status", "open");
        let cleared = spec.without_filter("category");
        assert_eq!(cleared.filter("category"), None);
        assert_eq!(cleared.filter("status"), Some("open"));
        assert!(spec.without_filters().filters().is_empty());
    }

    #[test]
    fn test_list_params_respect_scope() {
        let spec = QuerySpec::new(&defaults())
            .with_search("gala")
            .with_filter("category", "workshop")
            .with_page(2);

        let server = spec.list_params(FetchScope::SERVER);
        assert_eq!(server.search.as_deref(), Some("gala"));
        assert_eq!(server.page, Some((2, DEFAULT_PAGE_SIZE)));

        let facets = spec.list_params(FetchScope::FACETS);
        assert_eq!(facets.search, None);
        assert_eq!(facets.sort, None);
        assert_eq!(facets.page, None);
        assert_eq!(facets.filters.get("category").map(String::as_str), Some("workshop"));

        // Client-only parts never reach the key
        let other = QuerySpec::new(&defaults())
            .with_search("other")
            .with_filter("category", "workshop");
        assert_eq!(
            other.list_params(FetchScope::FACETS).to_key(),
            facets.to_key()
        );
    }

    #[test]
    fn test_query_pairs() {
        let spec = QuerySpec::new(&defaults())
            .with_filter("category", "workshop")
            .with_search("gala");
        let pairs = spec.list_params(FetchScope::SERVER).to_query_pairs();
        let get = |name: &str| {
            pairs
                .iter()
                .find(|(k, _)| k == name)
                .map(|(_, v)| v.as_str())
        };
        assert_eq!(get("search"), Some("gala"));
        assert_eq!(get("sort"), Some("startDate"));
        assert_eq!(get("order"), Some("asc"));
        assert_eq!(get("page"), Some("1"));
        assert_eq!(get("limit"), Some("8"));
        assert_eq!(get("category"), Some("workshop"));
    }

    #[test]
    fn test_reserved_names_are_not_facets() {
        let spec = QuerySpec::normalize(raw("", &[("page", "9"), ("Sort", "x")]), &defaults())
            .with_filter("limit", "1000")
            .with_filter("category", "workshop");
        assert_eq!(spec.filters().len(), 1);

        let pairs = spec.list_params(FetchScope::SERVER).to_query_pairs();
        for name in ["search", "sort", "order", "page", "limit"] {
            assert!(pairs.iter().filter(|(k, _)| k == name).count() <= 1, "{} emitted twice", name);
        }
        assert!(pairs.contains(&("page".to_string(), "1".to_string())));
    }
}
