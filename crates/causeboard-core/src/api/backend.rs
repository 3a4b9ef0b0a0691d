use std::sync::Arc;

use futures::future::BoxFuture;
use serde_json::Value;

use super::ApiError;
use crate::cache::{CacheKey, Fetcher};
use crate::models::{EntityId, EntityKind, ListItem, ListPage};
use crate::query::ListParams;

/// The remote collection endpoints a list view talks to.
///
/// Futures are boxed and `'static` so they can be driven from spawned
/// cache tasks; implementations clone whatever they need up front.
pub trait ListBackend: Send + Sync {
    fn list(&self, kind: EntityKind, params: &ListParams) -> BoxFuture<'static, Result<ListPage, ApiError>>;

    fn fetch_one(&self, kind: EntityKind, id: &EntityId) -> BoxFuture<'static, Result<ListItem, ApiError>>;

    fn create(&self, kind: EntityKind, payload: &Value) -> BoxFuture<'static, Result<ListItem, ApiError>>;

    fn update(
        &self,
        kind: EntityKind,
        id: &EntityId,
        payload: &Value,
    ) -> BoxFuture<'static, Result<ListItem, ApiError>>;

    fn delete(&self, kind: EntityKind, id: &EntityId) -> BoxFuture<'static, Result<(), ApiError>>;
}

/// Cache fetcher bound to one list query.
pub struct ListFetcher {
    backend: Arc<dyn ListBackend>,
    kind: EntityKind,
    params: ListParams,
}

impl ListFetcher {
    pub fn new(backend: Arc<dyn ListBackend>, kind: EntityKind, params: ListParams) -> Self {
        Self { backend, kind, params }
    }
}

impl Fetcher for ListFetcher {
    fn fetch(&self, _key: &CacheKey) -> BoxFuture<'static, Result<ListPage, ApiError>> {
        self.backend.list(self.kind, &self.params)
    }
}
