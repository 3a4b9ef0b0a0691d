//! Causeboard core - list/query plumbing for the nonprofit dashboard.
//!
//! Every list screen (events, programs, posts, users, registrations,
//! supporters, join requests) is driven by the same pieces:
//!
//! - `query`: the normalized `QuerySpec` and the server-facing `ListParams`
//! - `debounce`: quiet-interval search input
//! - `cache`: the shared `FetchCache` with coalescing, TTL, retry and eviction
//! - `refine` / `pagination`: client-side search, facets, sort and paging
//! - `mutation`: create/update/delete with cache invalidation
//! - `selection`: the detail drawer
//! - `controller`: one `ListController` per view tying them together
//!
//! The presentation layer only forwards intents and renders
//! `ListController::rows`, `pagination` and `selection`.

pub mod api;
pub mod cache;
pub mod config;
pub mod controller;
pub mod debounce;
pub mod models;
pub mod mutation;
pub mod pagination;
pub mod query;
pub mod refine;
pub mod selection;
pub mod utils;

#[cfg(test)]
mod testing;

pub use api::{ApiClient, ApiError, ListBackend, ListFetcher};
pub use cache::{CacheEntry, CacheKey, CacheStatus, FetchCache, KeyPattern};
pub use config::{CacheConfig, Config};
pub use controller::{ListConfig, ListController, ViewState};
pub use models::{EntityId, EntityKind, ListItem, ListPage};
pub use mutation::{MutationCoordinator, MutationError, MutationOutcome, MutationRequest};
pub use pagination::PaginationState;
pub use query::{FetchScope, QuerySpec, RawQuery, SortDirection};
pub use selection::SelectionState;
