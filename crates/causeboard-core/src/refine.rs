//! Client-side search, facet filtering and sorting of fetched lists.
//!
//! Everything here is pure: the same items and spec always give the same
//! rows, and refining an already refined list changes nothing.

use std::borrow::Borrow;
use std::collections::BTreeMap;

use crate::models::{FieldValue, ListItem};
use crate::query::{QuerySpec, SortDirection};
use crate::utils::contains_ignore_case;

/// Rows of `items` that match the spec's search and filters, in sort order.
/// Paging is left to [`crate::pagination::paginate`].
pub fn refine<'a>(items: &'a [ListItem], spec: &QuerySpec) -> Vec<&'a ListItem> {
    let needle = spec.search_term().to_lowercase();
    let mut rows: Vec<&ListItem> = items
        .iter()
        .filter(|item| matches_search(item, &needle) && matches_filters(item, spec.filters()))
        .collect();
    sort_by_field(&mut rows, spec.sort_key(), spec.sort_direction());
    rows
}

/// Owned variant of [`refine`].
pub fn filter_and_sort(items: &[ListItem], spec: &QuerySpec) -> Vec<ListItem> {
    refine(items, spec).into_iter().cloned().collect()
}

/// Case-insensitive substring match on any of the kind's searchable fields.
/// `needle_lower` must already be lowercase; empty matches everything.
pub(crate) fn matches_search(item: &ListItem, needle_lower: &str) -> bool {
    if needle_lower.is_empty() {
        return true;
    }
    item.kind().searchable_fields().iter().any(|name| {
        item.field(name)
            .and_then(|value| {
                value
                    .search_text()
                    .map(|text| contains_ignore_case(&text, needle_lower))
            })
            .unwrap_or(false)
    })
}

/// Exact equality on every facet. A facet the kind lacks matches nothing.
pub(crate) fn matches_filters(item: &ListItem, filters: &BTreeMap<String, String>) -> bool {
    filters.iter().all(|(facet, wanted)| {
        item.field(facet)
            .is_some_and(|value| value.matches_facet(wanted))
    })
}

/// Stable sort on one named field. Records without the field sort as empty,
/// so an unknown key leaves the order untouched.
pub fn sort_by_field<T: Borrow<ListItem>>(items: &mut Vec<T>, key: &str, direction: SortDirection) {
    // Extract once per row; composed names and dates allocate
    let mut keyed: Vec<(FieldValue, T)> = items
        .drain(..)
        .map(|item| {
            let value = item.borrow().field(key).unwrap_or(FieldValue::Empty);
            (value, item)
        })
        .collect();

    keyed.sort_by(|(a, _), (b, _)| direction.apply(a.cmp(b)));

    items.extend(keyed.into_iter().map(|(_, item)| item));
}
