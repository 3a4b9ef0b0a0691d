//! Shared fetch cache for list responses.
//!
//! This module provides the `FetchCache`, a process-wide map from
//! `CacheKey` (entity kind plus canonical server query) to the latest
//! response for that key. Each entry moves through `Pending`, `Fresh`,
//! `Stale` and `Error`; observers hold a `CacheSubscription` and are
//! notified on every change.
//!
//! Concurrent requests for a pending key share one fetch. Fresh entries are
//! served without a network call until their TTL lapses. Entries nobody has
//! observed for the retention window are evicted by `sweep`.

pub mod entry;
pub mod store;

pub use entry::{age_display, CacheEntry, CacheKey, CacheStatus, KeyPattern};
pub use store::{CacheSubscription, FetchCache, Fetcher};
