//! Per-view list controller.
//!
//! A `ListController` owns one list view's query, search box, cache
//! subscription and selection. The UI loop forwards user intents to it and
//! either calls [`ListController::pump`] every tick or awaits
//! [`ListController::wait`]; the controller then exposes ready-to-render rows,
//! pager meta and drawer state.
//!
//! State machine: `Idle -> Loading -> Ready | Error`. Any change of the fetch
//! key re-enters `Loading`; a fresh cached entry for the new key is served
//! immediately.

use std::sync::Arc;
use std::time::Duration;

use chrono::{DateTime, Utc};
use serde::Serialize;
use tokio::sync::mpsc;
use tracing::{debug, info};

use crate::api::{ApiError, ListBackend, ListFetcher};
use crate::cache::{age_display, CacheEntry, CacheKey, CacheStatus, CacheSubscription, FetchCache};
use crate::config::Config;
use crate::debounce::{SearchDebouncer, SearchSettled, DEFAULT_QUIET_INTERVAL};
use crate::models::{EntityId, EntityKind, ListItem, ListPage};
use crate::pagination::{paginate, PaginationState};
use crate::query::{FetchScope, QueryDefaults, QuerySpec, RawQuery, SortDirection, DEFAULT_PAGE_SIZE};
use crate::refine::{filter_and_sort, refine};
use crate::selection::SelectionState;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "lowercase")]
#[cfg_attr(feature = "ts", derive(ts_rs::TS), ts(export))]
pub enum ViewState {
    Idle,
    Loading,
    Ready,
    Error,
}

/// Static setup of one list view.
#[derive(Debug, Clone)]
pub struct ListConfig {
    pub kind: EntityKind,
    pub scope: FetchScope,
    pub page_size: usize,
    pub debounce: Duration,
}

impl ListConfig {
    pub fn new(kind: EntityKind) -> Self {
        Self {
            kind,
            scope: FetchScope::SERVER,
            page_size: DEFAULT_PAGE_SIZE,
            debounce: DEFAULT_QUIET_INTERVAL,
        }
    }

    /// List defaults taken from the user's config file.
    pub fn from_config(kind: EntityKind, config: &Config) -> Self {
        Self::new(kind)
            .page_size(config.page_size)
            .debounce(config.debounce())
    }

    pub fn scope(mut self, scope: FetchScope) -> Self {
        self.scope = scope;
        self
    }

    pub fn page_size(mut self, page_size: usize) -> Self {
        self.page_size = page_size;
        self
    }

    pub fn debounce(mut self, debounce: Duration) -> Self {
        self.debounce = debounce;
        self
    }
}

/// A cache subscription tagged with the generation it was opened for.
struct ActiveFetch {
    generation: u64,
    sub: CacheSubscription,
}

enum Wake {
    Search(Option<SearchSettled>),
    Entry(bool),
}

pub struct ListController {
    kind: EntityKind,
    scope: FetchScope,
    backend: Arc<dyn ListBackend>,
    cache: Arc<FetchCache>,

    spec: QuerySpec,
    search_input: String,
    debouncer: SearchDebouncer,
    search_rx: mpsc::Receiver<SearchSettled>,

    // Bumped on every resubscribe; responses for older generations are dropped
    generation: u64,
    active: Option<ActiveFetch>,

    state: ViewState,
    data: Option<Arc<ListPage>>,
    error: Option<ApiError>,
    fetched_at: Option<DateTime<Utc>>,

    rows: Vec<ListItem>,
    pagination: PaginationState,
    selection: SelectionState,
    disposed: bool,
}

impl ListController {
    pub fn new(config: ListConfig, backend: Arc<dyn ListBackend>, cache: Arc<FetchCache>) -> Self {
        let defaults = QueryDefaults::for_kind(config.kind).with_page_size(config.page_size);
        let spec = QuerySpec::new(&defaults);
        let (debouncer, search_rx) = SearchDebouncer::channel(config.debounce);
        let pagination = PaginationState::from_total(0, 1, spec.page_size());

        Self {
            kind: config.kind,
            scope: config.scope,
            backend,
            cache,
            spec,
            search_input: String::new(),
            debouncer,
            search_rx,
            generation: 0,
            active: None,
            state: ViewState::Idle,
            data: None,
            error: None,
            fetched_at: None,
            rows: Vec::new(),
            pagination,
            selection: SelectionState::default(),
            disposed: false,
        }
    }

    /// Start observing the list with the default query.
    pub fn activate(&mut self) {
        if self.disposed || self.active.is_some() {
            return;
        }
        self.sync_subscription();
    }

    /// Start observing with a query restored from elsewhere (URL, saved view).
    pub fn activate_with(&mut self, raw: RawQuery) {
        if self.disposed {
            return;
        }
        // Typing from before the restore must not overwrite it
        self.debouncer.cancel();
        let defaults = QueryDefaults::for_kind(self.kind).with_page_size(self.spec.page_size());
        self.spec = QuerySpec::normalize(raw, &defaults);
        self.search_input = self.spec.search_term().to_string();
        self.sync_subscription();
    }

    // ===== Getters =====

    pub fn kind(&self) -> EntityKind {
        self.kind
    }

    pub fn spec(&self) -> &QuerySpec {
        &self.spec
    }

    pub fn state(&self) -> ViewState {
        self.state
    }

    /// Rows of the current page, refined and sorted.
    pub fn rows(&self) -> &[ListItem] {
        &self.rows
    }

    pub fn pagination(&self) -> &PaginationState {
        &self.pagination
    }

    pub fn selection(&self) -> &SelectionState {
        &self.selection
    }

    pub fn error(&self) -> Option<&ApiError> {
        self.error.as_ref()
    }

    /// Raw search box text, possibly not yet applied.
    pub fn search_input(&self) -> &str {
        &self.search_input
    }

    pub fn has_data(&self) -> bool {
        self.data.is_some()
    }

    pub fn is_disposed(&self) -> bool {
        self.disposed
    }

    pub fn cache_key(&self) -> CacheKey {
        CacheKey::new(self.kind, &self.spec.list_params(self.scope))
    }

    /// "5m ago" style age of the data on screen.
    pub fn age_display(&self) -> String {
        match self.fetched_at {
            Some(at) => age_display((Utc::now() - at).num_minutes()),
            None => "never".to_string(),
        }
    }

    // ===== Search =====

    /// Keystroke in the search box; applied after the quiet interval.
    pub fn on_search_input(&mut self, raw: &str) {
        if self.disposed {
            return;
        }
        self.search_input = raw.to_string();
        self.debouncer.on_input(raw);
    }

    /// Clear the search box and apply immediately.
    pub fn clear_search(&mut self) {
        if self.disposed {
            return;
        }
        self.search_input.clear();
        self.debouncer.cancel();
        let next = self.spec.with_search("");
        self.apply_spec(next);
    }

    fn search_outstanding(&self) -> bool {
        self.search_input.trim() != self.spec.search_term()
    }

    fn on_search_settled(&mut self, settled: SearchSettled) -> bool {
        if !self.debouncer.accept(&settled) {
            debug!(ticket = settled.ticket, "Dropping superseded search update");
            return false;
        }
        if settled.text.trim() == self.spec.search_term() {
            return false;
        }
        let next = self.spec.with_search(&settled.text);
        self.apply_spec(next);
        true
    }

    // ===== Filters / Sort / Paging =====

    pub fn set_filter(&mut self, facet: &str, value: &str) {
        let next = self.spec.with_filter(facet, value);
        self.apply_spec(next);
    }

    pub fn clear_filter(&mut self, facet: &str) {
        let next = self.spec.without_filter(facet);
        self.apply_spec(next);
    }

    pub fn clear_filters(&mut self) {
        let next = self.spec.without_filters();
        self.apply_spec(next);
    }

    /// Column header click.
    pub fn toggle_sort(&mut self, key: &str) {
        let next = self.spec.toggle_sort(key);
        self.apply_spec(next);
    }

    pub fn set_sort(&mut self, key: &str, direction: SortDirection) {
        let next = self.spec.with_sort(key, direction);
        self.apply_spec(next);
    }

    pub fn set_page(&mut self, page: usize) {
        let page = if self.data.is_some() {
            page.clamp(1, self.pagination.total_pages)
        } else {
            page
        };
        let next = self.spec.with_page(page);
        self.apply_spec(next);
    }

    pub fn next_page(&mut self) {
        if self.pagination.has_next() {
            self.set_page(self.pagination.current_page + 1);
        }
    }

    pub fn prev_page(&mut self) {
        if self.pagination.has_prev() {
            self.set_page(self.pagination.current_page - 1);
        }
    }

    pub fn set_page_size(&mut self, page_size: usize) {
        let next = self.spec.with_page_size(page_size);
        self.apply_spec(next);
    }

    // ===== Retry =====

    /// Refetch the current key, e.g. from the inline retry in the error state.
    pub fn retry(&mut self) {
        if self.disposed {
            return;
        }
        let key = self.cache_key();
        info!(key = %key, "Retrying list fetch");
        self.refresh();
    }

    /// Invalidate and refetch the current key regardless of freshness.
    pub fn refresh(&mut self) {
        if self.disposed {
            return;
        }
        let key = self.cache_key();
        if self.active.is_none() || !self.cache.refetch(&key) {
            self.sync_subscription();
            return;
        }
        self.apply_latest();
    }

    // ===== Selection =====

    /// Open the drawer on `id`. Returns false if `id` is not in the list.
    pub fn select(&mut self, id: &EntityId) -> bool {
        let listed = self.data.as_ref().is_some_and(|data| data.contains(id));
        if listed {
            self.selection.select(id.clone());
        }
        listed
    }

    pub fn close_drawer(&mut self) {
        self.selection.close();
    }

    pub fn reopen_drawer(&mut self) -> bool {
        self.selection.reopen()
    }

    pub fn deselect(&mut self) {
        self.selection.deselect();
    }

    /// The record shown in the drawer.
    pub fn selected_item(&self) -> Option<&ListItem> {
        let id = self.selection.selected_id()?;
        self.data.as_ref()?.find(id)
    }

    // ===== Event Loop =====

    /// Apply any settled search and cache updates without blocking.
    /// Returns true if the view changed.
    pub fn pump(&mut self) -> bool {
        if self.disposed {
            return false;
        }
        let mut changed = false;
        while let Ok(settled) = self.search_rx.try_recv() {
            changed |= self.on_search_settled(settled);
        }
        if self.active.as_ref().is_some_and(|active| active.sub.has_changed()) {
            self.apply_latest();
            changed = true;
        }
        changed
    }

    /// Wait for the next settled search or cache update and apply it.
    /// Returns true if the view changed.
    pub async fn wait(&mut self) -> bool {
        if self.disposed {
            return false;
        }

        let wake = {
            let search_rx = &mut self.search_rx;
            let sub = self.active.as_mut().map(|active| &mut active.sub);
            tokio::select! {
                settled = search_rx.recv() => Wake::Search(settled),
                alive = async move {
                    match sub {
                        Some(sub) => sub.changed().await,
                        None => std::future::pending().await,
                    }
                } => Wake::Entry(alive),
            }
        };

        match wake {
            Wake::Search(Some(settled)) => self.on_search_settled(settled),
            Wake::Search(None) => false,
            Wake::Entry(true) => {
                self.apply_latest();
                true
            }
            Wake::Entry(false) => {
                // Entry dropped from the cache (sign-out clear); observe it again
                debug!(key = %self.cache_key(), "Cache entry dropped, resubscribing");
                self.sync_subscription();
                true
            }
        }
    }

    /// Drive the controller until no search is outstanding and the view has
    /// left `Loading`.
    pub async fn settle(&mut self) -> ViewState {
        while !self.disposed
            && (self.search_outstanding() || (self.state == ViewState::Loading && self.active.is_some()))
        {
            self.wait().await;
        }
        self.state
    }

    /// Page deactivation: cancel the search timer and release the cache entry.
    pub fn dispose(&mut self) {
        if self.disposed {
            return;
        }
        debug!(kind = %self.kind, "Disposing list controller");
        self.debouncer.dispose();
        self.active = None;
        self.disposed = true;
    }

    // ===== Internals =====

    fn apply_spec(&mut self, next: QuerySpec) {
        if self.disposed || next == self.spec {
            return;
        }
        let key_changed = CacheKey::new(self.kind, &next.list_params(self.scope)) != self.cache_key();
        debug!(kind = %self.kind, spec = %next.to_key(), key_changed, "Query changed");
        self.spec = next;

        if key_changed || self.active.is_none() {
            self.sync_subscription();
        } else {
            self.rerender();
        }
    }

    /// Subscribe to the current key under a new generation.
    fn sync_subscription(&mut self) {
        self.generation += 1;
        let params = self.spec.list_params(self.scope);
        let key = CacheKey::new(self.kind, &params);
        let fetcher = Arc::new(ListFetcher::new(Arc::clone(&self.backend), self.kind, params));

        let mut sub = self.cache.get(key, fetcher);
        debug!(
            key = %sub.key(),
            generation = self.generation,
            observers = self.cache.observer_count(sub.key()),
            "Subscribed to list"
        );
        let entry = sub.latest();
        // Replacing drops the previous subscription and its observer slot
        self.active = Some(ActiveFetch {
            generation: self.generation,
            sub,
        });
        self.apply_entry(self.generation, entry);
    }

    fn apply_latest(&mut self) {
        let Some(active) = self.active.as_mut() else {
            return;
        };
        let generation = active.generation;
        let entry = active.sub.latest();
        self.apply_entry(generation, entry);
    }

    /// The only path by which fetched data reaches the view.
    fn apply_entry(&mut self, generation: u64, entry: CacheEntry) {
        if generation != self.generation || entry.key != self.cache_key() {
            debug!(key = %entry.key, generation, current = self.generation, "Discarding response for superseded query");
            return;
        }

        self.data = entry.data;
        self.fetched_at = entry.fetched_at;
        match entry.status {
            CacheStatus::Pending => {
                self.state = ViewState::Loading;
            }
            CacheStatus::Fresh | CacheStatus::Stale => {
                self.state = ViewState::Ready;
                self.error = None;
                if let Some(data) = &self.data {
                    self.selection.reconcile(data);
                }
            }
            CacheStatus::Error => {
                self.state = ViewState::Error;
                self.error = entry.error;
            }
        }
        self.rerender();
    }

    /// Recompute rows and pager meta; clamp the page if the list shrank.
    fn rerender(&mut self) {
        let Some(data) = self.data.clone() else {
            self.rows.clear();
            self.pagination = PaginationState::from_total(0, 1, self.spec.page_size());
            return;
        };

        if self.scope.paging {
            // Server already paged; refining its page is a no-op for matching rows
            self.rows = filter_and_sort(&data.items, &self.spec);
            self.pagination =
                PaginationState::from_total(data.total_count, self.spec.page(), self.spec.page_size());
        } else {
            let refined = refine(&data.items, &self.spec);
            let window = paginate(&refined, self.spec.page(), self.spec.page_size());
            self.rows = window.slice.iter().map(|item| (*item).clone()).collect();
            self.pagination = window.meta;
        }

        if self.pagination.current_page != self.spec.page() {
            debug!(
                from = self.spec.page(),
                to = self.pagination.current_page,
                "Clamping page to shrunken list"
            );
            self.spec = self.spec.with_page(self.pagination.current_page);
            if self.scope.paging {
                self.sync_subscription();
            }
        }
    }
}

impl Drop for ListController {
    fn drop(&mut self) {
        self.dispose();
    }
}

// ============================================================================
// Tests
// ============================================================================
