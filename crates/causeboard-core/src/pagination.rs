//! Page windows over refined rows.

use serde::Serialize;

/// Pager metadata for one list view.
///
/// `total_pages` is never zero: an empty list still has one (empty) page.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "camelCase")]
#[cfg_attr(feature = "ts", derive(ts_rs::TS), ts(export))]
pub struct PaginationState {
    pub current_page: usize,
    pub page_size: usize,
    pub total_items: usize,
    pub total_pages: usize,
}

impl PaginationState {
    /// Meta for `total_items` rows, with `page` clamped into `[1, total_pages]`.
    pub fn from_total(total_items: usize, page: usize, page_size: usize) -> Self {
        let page_size = page_size.max(1);
        let total_pages = total_items.div_ceil(page_size).max(1);
        Self {
            current_page: page.clamp(1, total_pages),
            page_size,
            total_items,
            total_pages,
        }
    }

    /// Index of the first row on the current page.
    pub fn offset(&self) -> usize {
        (self.current_page - 1) * self.page_size
    }

    pub fn has_next(&self) -> bool {
        self.current_page < self.total_pages
    }

    pub fn has_prev(&self) -> bool {
        self.current_page > 1
    }

    /// "9–16 of 50", or "0 of 0" when empty.
    pub fn range_label(&self) -> String {
        if self.total_items == 0 {
            return "0 of 0".to_string();
        }
        let first = self.offset() + 1;
        let last = (self.offset() + self.page_size).min(self.total_items);
        format!("{}–{} of {}", first, last, self.total_items)
    }
}

/// One page of rows plus its meta.
#[derive(Debug, Clone, PartialEq)]
pub struct PageWindow<'a, T> {
    pub slice: &'a [T],
    pub meta: PaginationState,
}

/// Cut page `page` out of `items`. Out-of-range pages are clamped.
pub fn paginate<T>(items: &[T], page: usize, page_size: usize) -> PageWindow<'_, T> {
    let meta = PaginationState::from_total(items.len(), page, page_size);
    let start = meta.offset().min(items.len());
    let end = (start + meta.page_size).min(items.len());
    PageWindow {
        slice: &items[start..end],
        meta,
    }
}
