//! Scripted in-memory backend and record builders for unit tests.

use std::collections::{HashMap, VecDeque};
use std::sync::{Arc, Mutex, MutexGuard};

use futures::future::BoxFuture;
use serde_json::Value;
use tokio::sync::oneshot;

use crate::api::{ApiError, ListBackend};
use crate::models::{EntityId, EntityKind, Event, ListItem, ListPage, User};
use crate::query::ListParams;
use crate::refine::{matches_filters, matches_search, sort_by_field};

pub(crate) fn user(id: i64, first: &str, last: &str, email: &str) -> ListItem {
    ListItem::User(User {
        id: EntityId::from(id),
        first_name: first.to_string(),
        last_name: last.to_string(),
        email: email.to_string(),
        phone: None,
        role: None,
        status: None,
        created_at: None,
    })
}

pub(crate) fn event(id: i64, title: &str, category: &str) -> ListItem {
    ListItem::Event(Event {
        id: EntityId::from(id),
        title: title.to_string(),
        description: None,
        category: Some(category.to_string()),
        status: None,
        location: None,
        start_date: None,
        end_date: None,
        capacity: None,
        registered_count: None,
    })
}

#[derive(Default)]
struct FakeState {
    collections: HashMap<EntityKind, Vec<ListItem>>,
    list_calls: Vec<(EntityKind, ListParams)>,
    list_failures: VecDeque<ApiError>,
    list_gates: VecDeque<oneshot::Receiver<()>>,
    mutation_calls: usize,
    mutation_failures: VecDeque<ApiError>,
    mutation_gates: VecDeque<oneshot::Receiver<()>>,
    next_id: i64,
}

/// Serves lists the way the real API does (search, facets, sort, paging)
/// from in-memory collections.
///
/// Failures and gates are consumed in call order. Data is read when a call
/// resolves, not when it is issued, so a held call sees later changes.
pub(crate) struct FakeBackend {
    state: Arc<Mutex<FakeState>>,
}

impl FakeBackend {
    pub(crate) fn new() -> Self {
        Self {
            state: Arc::new(Mutex::new(FakeState {
                next_id: 1000,
                ..Default::default()
            })),
        }
    }

    fn lock(&self) -> MutexGuard<'_, FakeState> {
        self.state.lock().expect("fake backend lock")
    }

    pub(crate) fn with_items(self, kind: EntityKind, items: Vec<ListItem>) -> Self {
        self.replace_items(kind, items);
        self
    }

    pub(crate) fn replace_items(&self, kind: EntityKind, items: Vec<ListItem>) {
        self.lock().collections.insert(kind, items);
    }

    pub(crate) fn items(&self, kind: EntityKind) -> Vec<ListItem> {
        self.lock().collections.get(&kind).cloned().unwrap_or_default()
    }

    pub(crate) fn list_calls(&self) -> Vec<(EntityKind, ListParams)> {
        self.lock().list_calls.clone()
    }

    pub(crate) fn list_call_count(&self) -> usize {
        self.lock().list_calls.len()
    }

    pub(crate) fn fail_next_list(&self, error: ApiError) {
        self.lock().list_failures.push_back(error);
    }

    /// The next list call waits until the returned sender fires (or drops).
    pub(crate) fn hold_next_list(&self) -> oneshot::Sender<()> {
        let (tx, rx) = oneshot::channel();
        self.lock().list_gates.push_back(rx);
        tx
    }

    pub(crate) fn mutation_count(&self) -> usize {
        self.lock().mutation_calls
    }

    pub(crate) fn fail_next_mutation(&self, error: ApiError) {
        self.lock().mutation_failures.push_back(error);
    }

    pub(crate) fn hold_next_mutation(&self) -> oneshot::Sender<()> {
        let (tx, rx) = oneshot::channel();
        self.lock().mutation_gates.push_back(rx);
        tx
    }

    fn begin_mutation(&self) -> (Option<oneshot::Receiver<()>>, Option<ApiError>) {
        let mut state = self.lock();
        state.mutation_calls += 1;
        (state.mutation_gates.pop_front(), state.mutation_failures.pop_front())
    }
}

fn serve(items: Vec<ListItem>, params: &ListParams) -> ListPage {
    let needle = params.search.as_deref().unwrap_or("").to_lowercase();
    let mut matched: Vec<ListItem> = items
        .into_iter()
        .filter(|item| matches_search(item, &needle) && matches_filters(item, &params.filters))
        .collect();
    if let Some((key, direction)) = &params.sort {
        sort_by_field(&mut matched, key, *direction);
    }

    let total_count = matched.len();
    if let Some((page, size)) = params.page {
        let start = page.saturating_sub(1) * size;
        matched = matched.into_iter().skip(start).take(size).collect();
    }
    ListPage {
        items: matched,
        total_count,
    }
}

fn not_found(kind: EntityKind, id: &EntityId) -> ApiError {
    ApiError::NotFound(format!("{}/{}", kind, id))
}

fn rejected(e: serde_json::Error) -> ApiError {
    ApiError::Validation {
        field: None,
        message: e.to_string(),
    }
}

fn record_json(item: &ListItem) -> Value {
    serde_json::to_value(item)
        .ok()
        .and_then(|mut v| v.get_mut("record").map(Value::take))
        .unwrap_or(Value::Null)
}

async fn pass_gate(gate: Option<oneshot::Receiver<()>>) {
    if let Some(gate) = gate {
        let _ = gate.await;
    }
}

impl ListBackend for FakeBackend {
    fn list(&self, kind: EntityKind, params: &ListParams) -> BoxFuture<'static, Result<ListPage, ApiError>> {
        let (gate, failure) = {
            let mut state = self.lock();
            state.list_calls.push((kind, params.clone()));
            (state.list_gates.pop_front(), state.list_failures.pop_front())
        };
        let state = Arc::clone(&self.state);
        let params = params.clone();
        Box::pin(async move {
            pass_gate(gate).await;
            if let Some(error) = failure {
                return Err(error);
            }
            let items = state
                .lock()
                .expect("fake backend lock")
                .collections
                .get(&kind)
                .cloned()
                .unwrap_or_default();
            Ok(serve(items, &params))
        })
    }

    fn fetch_one(&self, kind: EntityKind, id: &EntityId) -> BoxFuture<'static, Result<ListItem, ApiError>> {
        let state = Arc::clone(&self.state);
        let id = id.clone();
        Box::pin(async move {
            let state = state.lock().expect("fake backend lock");
            state
                .collections
                .get(&kind)
                .and_then(|items| items.iter().find(|item| *item.id() == id))
                .cloned()
                .ok_or_else(|| not_found(kind, &id))
        })
    }

    fn create(&self, kind: EntityKind, payload: &Value) -> BoxFuture<'static, Result<ListItem, ApiError>> {
        let (gate, failure) = self.begin_mutation();
        let state = Arc::clone(&self.state);
        let payload = payload.clone();
        Box::pin(async move {
            pass_gate(gate).await;
            if let Some(error) = failure {
                return Err(error);
            }
            let mut state = state.lock().expect("fake backend lock");
            let id = state.next_id;
            state.next_id += 1;

            let mut record = payload;
            if let Value::Object(map) = &mut record {
                map.insert("id".to_string(), Value::from(id));
            }
            let item = ListItem::from_json(kind, record).map_err(rejected)?;
            state.collections.entry(kind).or_default().push(item.clone());
            Ok(item)
        })
    }

    fn update(
        &self,
        kind: EntityKind,
        id: &EntityId,
        payload: &Value,
    ) -> BoxFuture<'static, Result<ListItem, ApiError>> {
        let (gate, failure) = self.begin_mutation();
        let state = Arc::clone(&self.state);
        let id = id.clone();
        let payload = payload.clone();
        Box::pin(async move {
            pass_gate(gate).await;
            if let Some(error) = failure {
                return Err(error);
            }
            let mut state = state.lock().expect("fake backend lock");
            let items = state.collections.entry(kind).or_default();
            let Some(slot) = items.iter_mut().find(|item| *item.id() == id) else {
                return Err(not_found(kind, &id));
            };

            let mut record = record_json(slot);
            if let (Value::Object(target), Value::Object(changes)) = (&mut record, payload) {
                target.extend(changes);
            }
            let item = ListItem::from_json(kind, record).map_err(rejected)?;
            *slot = item.clone();
            Ok(item)
        })
    }

    fn delete(&self, kind: EntityKind, id: &EntityId) -> BoxFuture<'static, Result<(), ApiError>> {
        let (gate, failure) = self.begin_mutation();
        let state = Arc::clone(&self.state);
        let id = id.clone();
        Box::pin(async move {
            pass_gate(gate).await;
            if let Some(error) = failure {
                return Err(error);
            }
            let mut state = state.lock().expect("fake backend lock");
            let items = state.collections.entry(kind).or_default();
            match items.iter().position(|item| *item.id() == id) {
                Some(index) => {
                    items.remove(index);
                    Ok(())
                }
                None => Err(not_found(kind, &id)),
            }
        })
    }
}
