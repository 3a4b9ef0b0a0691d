use std::collections::HashMap;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::{Arc, Mutex, MutexGuard, Weak};
use std::time::Duration;

use chrono::Utc;
use futures::future::BoxFuture;
use tokio::sync::watch;
use tokio::task::JoinHandle;
use tokio::time::Instant;
use tracing::{debug, error, info, warn};

use super::entry::{CacheEntry, CacheKey, CacheStatus, KeyPattern};
use crate::api::ApiError;
use crate::config::CacheConfig;
use crate::models::ListPage;

/// Produces the list response for a key. Stored with the entry so an
/// invalidation can refetch without the original caller.
pub trait Fetcher: Send + Sync {
    fn fetch(&self, key: &CacheKey) -> BoxFuture<'static, Result<ListPage, ApiError>>;
}

impl<F> Fetcher for F
where
    F: Fn(&CacheKey) -> BoxFuture<'static, Result<ListPage, ApiError>> + Send + Sync,
{
    fn fetch(&self, key: &CacheKey) -> BoxFuture<'static, Result<ListPage, ApiError>> {
        self(key)
    }
}

struct Slot {
    tx: watch::Sender<CacheEntry>,
    fetcher: Arc<dyn Fetcher>,
    /// Id of the fetch that owns the next write, if one is running.
    in_flight: Option<u64>,
    fresh_until: Option<Instant>,
    /// Set when an invalidation lands mid-fetch.
    refetch_on_settle: bool,
    last_observed: Instant,
}

impl Slot {
    fn new(key: CacheKey, fetcher: Arc<dyn Fetcher>, now: Instant) -> Self {
        let (tx, _) = watch::channel(CacheEntry::pending(key));
        Self {
            tx,
            fetcher,
            in_flight: None,
            fresh_until: None,
            refetch_on_settle: false,
            last_observed: now,
        }
    }

    fn observers(&self) -> usize {
        self.tx.receiver_count()
    }

    fn status(&self) -> CacheStatus {
        self.tx.borrow().status
    }

    fn is_fresh(&self, now: Instant) -> bool {
        self.status() == CacheStatus::Fresh && self.fresh_until.is_some_and(|until| now < until)
    }
}

/// Process-wide cache of list responses, shared by every list view.
///
/// Entries are created by [`FetchCache::get`] and written only by the
/// completion of the fetch that currently owns them; [`FetchCache::invalidate`]
/// marks them stale. Build one at startup and hand clones of the `Arc` to
/// each controller.
pub struct FetchCache {
    config: CacheConfig,
    slots: Mutex<HashMap<CacheKey, Slot>>,
    next_fetch_id: AtomicU64,
}

impl FetchCache {
    pub fn new(config: CacheConfig) -> Arc<Self> {
        Arc::new(Self {
            config,
            slots: Mutex::new(HashMap::new()),
            next_fetch_id: AtomicU64::new(1),
        })
    }

    pub fn config(&self) -> &CacheConfig {
        &self.config
    }

    fn lock_slots(&self) -> MutexGuard<'_, HashMap<CacheKey, Slot>> {
        // A panic while holding the lock cannot leave a slot half-written
        self.slots.lock().unwrap_or_else(|poisoned| poisoned.into_inner())
    }

    /// Subscribe to `key`, fetching only when the entry is missing, stale,
    /// expired or failed. A pending entry is shared, never fetched twice.
    pub fn get(self: &Arc<Self>, key: CacheKey, fetcher: Arc<dyn Fetcher>) -> CacheSubscription {
        let now = Instant::now();
        let mut slots = self.lock_slots();
        let slot = slots
            .entry(key.clone())
            .or_insert_with(|| Slot::new(key.clone(), Arc::clone(&fetcher), now));
        slot.fetcher = fetcher;
        slot.last_observed = now;

        let needs_fetch = match slot.status() {
            CacheStatus::Pending => slot.in_flight.is_none(),
            CacheStatus::Fresh => !slot.is_fresh(now),
            CacheStatus::Stale | CacheStatus::Error => true,
        };

        if needs_fetch {
            Self::start_fetch(self, &key, slot);
        } else if slot.in_flight.is_some() {
            debug!(key = %key, "Joining in-flight fetch");
        } else {
            debug!(key = %key, "Cache hit");
        }

        let rx = slot.tx.subscribe();
        CacheSubscription {
            key,
            rx,
            cache: Arc::downgrade(self),
        }
    }

    /// Current snapshot of an entry without subscribing or fetching.
    pub fn peek(&self, key: &CacheKey) -> Option<CacheEntry> {
        self.lock_slots().get(key).map(|slot| slot.tx.borrow().clone())
    }

    /// Number of live subscriptions on an entry.
    pub fn observer_count(&self, key: &CacheKey) -> usize {
        self.lock_slots().get(key).map_or(0, Slot::observers)
    }

    /// Mark matching entries stale; observed ones refetch right away.
    /// Returns the number of matching entries.
    pub fn invalidate(self: &Arc<Self>, pattern: &KeyPattern) -> usize {
        let mut slots = self.lock_slots();
        let mut matched = 0;
        for (key, slot) in slots.iter_mut() {
            if !pattern.matches(key) {
                continue;
            }
            matched += 1;
            slot.fresh_until = None;

            if slot.in_flight.is_some() {
                // The running fetch may predate the change; store its result
                // as stale and go again
                slot.refetch_on_settle = true;
                continue;
            }

            slot.tx.send_modify(|entry| entry.status = CacheStatus::Stale);
            if slot.observers() > 0 {
                Self::start_fetch(self, key, slot);
            }
        }
        debug!(?pattern, matched, "Invalidated cache entries");
        matched
    }

    /// Manual retry for one key.
    pub fn refetch(self: &Arc<Self>, key: &CacheKey) -> bool {
        self.invalidate(&KeyPattern::Exact(key.clone())) > 0
    }

    /// Restart the grace window of `key`; called as an observer leaves.
    fn release(&self, key: &CacheKey) {
        if let Some(slot) = self.lock_slots().get_mut(key) {
            slot.last_observed = Instant::now();
        }
    }

    /// Evict entries nobody has observed for the retention window and mark
    /// expired entries stale. Pending entries are never evicted.
    pub fn sweep(&self) -> usize {
        let now = Instant::now();
        let retention = self.config.retention();
        let mut slots = self.lock_slots();
        let before = slots.len();

        slots.retain(|key, slot| {
            if slot.observers() > 0 || slot.in_flight.is_some() {
                slot.last_observed = now;
            } else if now.duration_since(slot.last_observed) >= retention {
                debug!(key = %key, "Evicting unobserved cache entry");
                return false;
            }

            if slot.status() == CacheStatus::Fresh && !slot.is_fresh(now) {
                slot.tx.send_modify(|entry| entry.status = CacheStatus::Stale);
            }
            true
        });

        before - slots.len()
    }

    /// Drop every entry (sign-out). Running fetches settle into nothing.
    pub fn clear(&self) {
        let mut slots = self.lock_slots();
        debug!(count = slots.len(), "Clearing fetch cache");
        slots.clear();
    }

    pub fn len(&self) -> usize {
        self.lock_slots().len()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    /// Periodically sweep until the cache is dropped.
    pub fn spawn_janitor(self: &Arc<Self>, every: Duration) -> JoinHandle<()> {
        let cache: Weak<Self> = Arc::downgrade(self);
        tokio::spawn(async move {
            let mut ticker = tokio::time::interval(every);
            // First tick completes immediately
            ticker.tick().await;
            loop {
                ticker.tick().await;
                let Some(cache) = cache.upgrade() else {
                    break;
                };
                let evicted = cache.sweep();
                if evicted > 0 {
                    debug!(evicted, "Cache janitor pass");
                }
            }
        })
    }

    fn start_fetch(cache: &Arc<Self>, key: &CacheKey, slot: &mut Slot) {
        let fetch_id = cache.next_fetch_id.fetch_add(1, Ordering::Relaxed);
        slot.in_flight = Some(fetch_id);
        slot.refetch_on_settle = false;
        slot.fresh_until = None;
        slot.tx.send_modify(|entry| {
            entry.status = CacheStatus::Pending;
            entry.error = None;
        });
        debug!(key = %key, fetch_id, "Fetch started");

        let fetcher = Arc::clone(&slot.fetcher);
        let cache = Arc::clone(cache);
        let key = key.clone();
        tokio::spawn(async move {
            let result = cache.fetch_with_retry(fetcher.as_ref(), &key).await;
            cache.settle(&key, fetch_id, result);
        });
    }

    async fn fetch_with_retry(
        &self,
        fetcher: &dyn Fetcher,
        key: &CacheKey,
    ) -> Result<ListPage, ApiError> {
        let mut attempt: u32 = 0;
        loop {
            match fetcher.fetch(key).await {
                Ok(page) => return Ok(page),
                Err(e) if e.is_retryable() && attempt < self.config.max_retries => {
                    attempt += 1;
                    warn!(key = %key, attempt, error = %e, "Fetch failed, retrying");
                }
                Err(e) => return Err(e),
            }
        }
    }

    /// The single write path for an entry's data.
    fn settle(self: &Arc<Self>, key: &CacheKey, fetch_id: u64, result: Result<ListPage, ApiError>) {
        let mut slots = self.lock_slots();
        let Some(slot) = slots.get_mut(key) else {
            debug!(key = %key, fetch_id, "Entry gone before fetch settled");
            return;
        };
        if slot.in_flight != Some(fetch_id) {
            debug!(key = %key, fetch_id, "Discarding result of superseded fetch");
            return;
        }
        slot.in_flight = None;
        let refetch = std::mem::take(&mut slot.refetch_on_settle);

        match result {
            Ok(page) => {
                info!(key = %key, count = page.items.len(), total = page.total_count, "List fetched");
                slot.fresh_until = (!refetch).then(|| Instant::now() + self.config.ttl());
                slot.tx.send_modify(|entry| {
                    entry.status = if refetch { CacheStatus::Stale } else { CacheStatus::Fresh };
                    entry.data = Some(Arc::new(page));
                    entry.fetched_at = Some(Utc::now());
                    entry.error = None;
                });
            }
            Err(e) => {
                error!(key = %key, error = %e, "List fetch failed");
                slot.fresh_until = None;
                slot.tx.send_modify(|entry| {
                    entry.status = CacheStatus::Error;
                    entry.error = Some(e);
                });
            }
        }

        if refetch && slot.observers() > 0 {
            debug!(key = %key, "Refetching after mid-flight invalidation");
            Self::start_fetch(self, key, slot);
        }
    }
}

/// A live observation of one cache entry. Dropping it releases the observer
/// and starts the entry's grace window.
pub struct CacheSubscription {
    key: CacheKey,
    rx: watch::Receiver<CacheEntry>,
    cache: Weak<FetchCache>,
}

impl Drop for CacheSubscription {
    fn drop(&mut self) {
        if let Some(cache) = self.cache.upgrade() {
            cache.release(&self.key);
        }
    }
}

impl CacheSubscription {
    pub fn key(&self) -> &CacheKey {
        &self.key
    }

    pub fn current(&self) -> CacheEntry {
        self.rx.borrow().clone()
    }

    /// Whether the entry changed since the last `latest()`.
    pub fn has_changed(&self) -> bool {
        self.rx.has_changed().unwrap_or(false)
    }

    /// Read the entry and mark it seen.
    pub fn latest(&mut self) -> CacheEntry {
        self.rx.borrow_and_update().clone()
    }

    /// Wait for the next change. `false` once the entry has been dropped.
    pub async fn changed(&mut self) -> bool {
        self.rx.changed().await.is_ok()
    }
}

// ============================================================================
// Tests
// ============================================================================

#[cfg(test)]
mod tests {
    use super::*;
    use crate::api::ListFetcher;
    use crate::models::EntityKind;
    use crate::query::ListParams;
    use crate::testing::{user, FakeBackend};

    fn key_for(kind: EntityKind, search: Option<&str>) -> (CacheKey, ListParams) {
        let params = ListParams {
            search: search.map(str::to_string),
            ..Default::default()
        };
        (CacheKey::new(kind, &params), params)
    }

    fn fetcher(backend: &Arc<FakeBackend>, kind: EntityKind, params: ListParams) -> Arc<dyn Fetcher> {
        Arc::new(ListFetcher::new(backend.clone(), kind, params))
    }

    fn backend_with_users() -> Arc<FakeBackend> {
        Arc::new(FakeBackend::new().with_items(
            EntityKind::User,
            vec![
                user(1, "Ahmed", "Saleh", "ahmed@example.org"),
                user(2, "Sara", "Haddad", "sara@example.org"),
            ],
        ))
    }

    async fn settled(sub: &mut CacheSubscription) -> CacheEntry {
        loop {
            let entry = sub.latest();
            if !entry.is_pending() {
                return entry;
            }
            assert!(sub.changed().await, "entry dropped while pending");
        }
    }

    // -------------------------------------------------------------------------
    // get / coalescing
    // -------------------------------------------------------------------------

    #[tokio::test]
    async fn test_fresh_entry_is_served_without_fetch() {
        let backend = backend_with_users();
        let cache = FetchCache::new(CacheConfig::default());
        let (key, params) = key_for(EntityKind::User, None);

        let mut first = cache.get(key.clone(), fetcher(&backend, EntityKind::User, params.clone()));
        let entry = settled(&mut first).await;
        assert_eq!(entry.status, CacheStatus::Fresh);
        assert_eq!(entry.data.as_ref().map(|d| d.items.len()), Some(2));

        let second = cache.get(key, fetcher(&backend, EntityKind::User, params));
        assert_eq!(second.current().status, CacheStatus::Fresh);
        assert_eq!(backend.list_call_count(), 1);
    }

    #[tokio::test]
    async fn test_concurrent_gets_coalesce() {
        let backend = backend_with_users();
        let gate = backend.hold_next_list();
        let cache = FetchCache::new(CacheConfig::default());
        let (key, params) = key_for(EntityKind::User, None);

        let mut a = cache.get(key.clone(), fetcher(&backend, EntityKind::User, params.clone()));
        let mut b = cache.get(key.clone(), fetcher(&backend, EntityKind::User, params.clone()));
        assert!(a.current().is_pending());
        assert_eq!(cache.observer_count(&key), 2);

        gate.send(()).expect("gate receiver alive");
        let entry_a = settled(&mut a).await;
        let entry_b = settled(&mut b).await;
        assert_eq!(entry_a.status, CacheStatus::Fresh);
        assert!(Arc::ptr_eq(
            entry_a.data.as_ref().expect("data"),
            entry_b.data.as_ref().expect("data")
        ));
        assert_eq!(backend.list_call_count(), 1);
    }

    // -------------------------------------------------------------------------
    // Retry
    // -------------------------------------------------------------------------

    #[tokio::test]
    async fn test_retryable_failures_are_retried() {
        let backend = backend_with_users();
        backend.fail_next_list(ApiError::Server("502".into()));
        backend.fail_next_list(ApiError::Network("reset".into()));
        let cache = FetchCache::new(CacheConfig::default());
        let (key, params) = key_for(EntityKind::User, None);

        let mut sub = cache.get(key, fetcher(&backend, EntityKind::User, params));
        let entry = settled(&mut sub).await;
        assert_eq!(entry.status, CacheStatus::Fresh);
        assert_eq!(backend.list_call_count(), 3);
    }

    #[tokio::test]
    async fn test_exhausted_retries_surface_error_to_all_observers() {
        let backend = backend_with_users();
        for _ in 0..2 {
            backend.fail_next_list(ApiError::Server("503".into()));
        }
        let cache = FetchCache::new(CacheConfig {
            max_retries: 1,
            ..CacheConfig::default()
        });
        let (key, params) = key_for(EntityKind::User, None);

        let mut a = cache.get(key.clone(), fetcher(&backend, EntityKind::User, params.clone()));
        let mut b = cache.get(key, fetcher(&backend, EntityKind::User, params));
        let entry_a = settled(&mut a).await;
        let entry_b = settled(&mut b).await;
        assert_eq!(entry_a.status, CacheStatus::Error);
        assert_eq!(entry_b.error, Some(ApiError::Server("503".into())));
        assert_eq!(backend.list_call_count(), 2);
    }

    #[tokio::test]
    async fn test_auth_expired_is_not_retried() {
        let backend = backend_with_users();
        backend.fail_next_list(ApiError::AuthExpired);
        let cache = FetchCache::new(CacheConfig::default());
        let (key, params) = key_for(EntityKind::User, None);

        let mut sub = cache.get(key, fetcher(&backend, EntityKind::User, params));
        let entry = settled(&mut sub).await;
        assert_eq!(entry.error, Some(ApiError::AuthExpired));
        assert_eq!(backend.list_call_count(), 1);
    }

    // -------------------------------------------------------------------------
    // TTL / invalidation
    // -------------------------------------------------------------------------

    #[tokio::test(start_paused = true)]
    async fn test_entry_goes_stale_after_ttl() {
        let backend = backend_with_users();
        let cache = FetchCache::new(CacheConfig::default());
        let (key, params) = key_for(EntityKind::User, None);

        let mut sub = cache.get(key.clone(), fetcher(&backend, EntityKind::User, params.clone()));
        settled(&mut sub).await;

        tokio::time::advance(cache.config().ttl() - Duration::from_secs(1)).await;
        let again = cache.get(key.clone(), fetcher(&backend, EntityKind::User, params.clone()));
        assert_eq!(again.current().status, CacheStatus::Fresh);
        assert_eq!(backend.list_call_count(), 1);

        tokio::time::advance(Duration::from_secs(2)).await;
        let mut expired = cache.get(key, fetcher(&backend, EntityKind::User, params));
        assert!(expired.current().is_pending());
        // Previous data stays visible while revalidating
        assert!(expired.current().data.is_some());
        settled(&mut expired).await;
        assert_eq!(backend.list_call_count(), 2);
    }

    #[tokio::test]
    async fn test_invalidate_refetches_observed_entries_only() {
        let backend = backend_with_users();
        let cache = FetchCache::new(CacheConfig::default());
        let (observed_key, observed_params) = key_for(EntityKind::User, None);
        let (idle_key, idle_params) = key_for(EntityKind::User, Some("sara"));

        let mut observed = cache.get(
            observed_key.clone(),
            fetcher(&backend, EntityKind::User, observed_params),
        );
        settled(&mut observed).await;
        let mut idle = cache.get(idle_key.clone(), fetcher(&backend, EntityKind::User, idle_params));
        settled(&mut idle).await;
        drop(idle);
        assert_eq!(backend.list_call_count(), 2);

        let matched = cache.invalidate(&KeyPattern::Kind(EntityKind::User));
        assert_eq!(matched, 2);
        assert!(observed.current().is_pending());
        assert_eq!(
            cache.peek(&idle_key).map(|e| e.status),
            Some(CacheStatus::Stale)
        );

        let entry = settled(&mut observed).await;
        assert_eq!(entry.status, CacheStatus::Fresh);
        assert_eq!(backend.list_call_count(), 3);
    }

    #[tokio::test]
    async fn test_invalidate_other_kind_is_untouched() {
        let backend = backend_with_users();
        let cache = FetchCache::new(CacheConfig::default());
        let (key, params) = key_for(EntityKind::User, None);
        let mut sub = cache.get(key.clone(), fetcher(&backend, EntityKind::User, params));
        settled(&mut sub).await;

        assert_eq!(cache.invalidate(&KeyPattern::Kind(EntityKind::Event)), 0);
        assert_eq!(cache.peek(&key).map(|e| e.status), Some(CacheStatus::Fresh));
    }

    #[tokio::test]
    async fn test_invalidation_during_flight_refetches_once() {
        let backend = backend_with_users();
        let gate = backend.hold_next_list();
        let cache = FetchCache::new(CacheConfig::default());
        let (key, params) = key_for(EntityKind::User, None);

        let mut sub = cache.get(key.clone(), fetcher(&backend, EntityKind::User, params));
        tokio::task::yield_now().await;
        cache.invalidate(&KeyPattern::Kind(EntityKind::User));
        // Still exactly one fetch running
        assert_eq!(backend.list_call_count(), 1);

        gate.send(()).expect("gate receiver alive");
        let entry = settled(&mut sub).await;
        assert_eq!(entry.status, CacheStatus::Fresh);
        assert_eq!(backend.list_call_count(), 2);
    }

    #[tokio::test]
    async fn test_superseded_fetch_cannot_write() {
        let backend = backend_with_users();
        let slow_gate = backend.hold_next_list();
        let cache = FetchCache::new(CacheConfig::default());
        let (key, params) = key_for(EntityKind::User, None);

        let first = cache.get(key.clone(), fetcher(&backend, EntityKind::User, params.clone()));
        tokio::task::yield_now().await;
        drop(first);
        cache.clear();

        // A new owner for the same key starts its own fetch
        let mut second = cache.get(key.clone(), fetcher(&backend, EntityKind::User, params));
        let entry = settled(&mut second).await;
        assert_eq!(entry.status, CacheStatus::Fresh);
        let data = entry.data.expect("data");

        backend.replace_items(EntityKind::User, vec![user(9, "Late", "Reply", "late@example.org")]);
        slow_gate.send(()).expect("gate receiver alive");
        tokio::task::yield_now().await;
        tokio::task::yield_now().await;

        let after = cache.peek(&key).expect("entry");
        assert!(Arc::ptr_eq(after.data.as_ref().expect("data"), &data));
        assert_eq!(backend.list_call_count(), 2);
    }

    // -------------------------------------------------------------------------
    // Eviction
    // -------------------------------------------------------------------------

    #[tokio::test(start_paused = true)]
    async fn test_unobserved_entries_survive_grace_window() {
        let backend = backend_with_users();
        let cache = FetchCache::new(CacheConfig {
            ttl_secs: 3600,
            ..CacheConfig::default()
        });
        let (key, params) = key_for(EntityKind::User, None);

        let mut sub = cache.get(key.clone(), fetcher(&backend, EntityKind::User, params.clone()));
        settled(&mut sub).await;
        drop(sub);

        tokio::time::advance(cache.config().retention() / 2).await;
        assert_eq!(cache.sweep(), 0);
        // Back navigation: served from cache
        let back = cache.get(key.clone(), fetcher(&backend, EntityKind::User, params));
        assert_eq!(back.current().status, CacheStatus::Fresh);
        drop(back);
        assert_eq!(backend.list_call_count(), 1);

        tokio::time::advance(cache.config().retention()).await;
        assert_eq!(cache.sweep(), 1);
        assert!(cache.is_empty());
    }

    #[tokio::test(start_paused = true)]
    async fn test_grace_window_starts_when_last_observer_leaves() {
        let backend = backend_with_users();
        let cache = FetchCache::new(CacheConfig {
            ttl_secs: 3600,
            ..CacheConfig::default()
        });
        let (key, params) = key_for(EntityKind::User, None);

        let mut sub = cache.get(key.clone(), fetcher(&backend, EntityKind::User, params.clone()));
        settled(&mut sub).await;
        // Watched well past the retention window with no sweep in between
        tokio::time::advance(cache.config().retention() + Duration::from_secs(60)).await;
        drop(sub);

        assert_eq!(cache.sweep(), 0);
        let back = cache.get(key.clone(), fetcher(&backend, EntityKind::User, params));
        assert!(back.current().data.is_some());
        drop(back);

        tokio::time::advance(cache.config().retention()).await;
        assert_eq!(cache.sweep(), 1);
    }

    #[tokio::test(start_paused = true)]
    async fn test_observed_entries_are_never_evicted() {
        let backend = backend_with_users();
        let cache = FetchCache::new(CacheConfig::default());
        let (key, params) = key_for(EntityKind::User, None);

        let mut sub = cache.get(key.clone(), fetcher(&backend, EntityKind::User, params));
        settled(&mut sub).await;

        tokio::time::advance(cache.config().retention() * 3).await;
        assert_eq!(cache.sweep(), 0);
        // TTL lapsed meanwhile
        assert_eq!(sub.current().status, CacheStatus::Stale);
        assert_eq!(cache.len(), 1);
    }
}
