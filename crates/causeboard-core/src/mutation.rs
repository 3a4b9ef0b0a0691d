//! Create, update and delete with cache invalidation.
//!
//! Mutations are never applied to cached lists directly. A successful write
//! invalidates every list of the mutated kind (and of kinds that embed it);
//! observed lists refetch and pick up the change from the server.

use std::collections::HashSet;
use std::fmt;
use std::sync::{Arc, Mutex};

use serde::Serialize;
use serde_json::Value;
use thiserror::Error;
use tracing::{debug, info, warn};

use crate::api::{ApiError, ListBackend};
use crate::cache::{FetchCache, KeyPattern};
use crate::models::{EntityId, EntityKind, ListItem};

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize)]
#[serde(rename_all = "lowercase")]
pub enum MutationOp {
    Create,
    Update,
    Delete,
}

impl fmt::Display for MutationOp {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(match self {
            MutationOp::Create => "create",
            MutationOp::Update => "update",
            MutationOp::Delete => "delete",
        })
    }
}

/// One submitted write. Deletes must be confirmed by the caller first.
#[derive(Debug, Clone, PartialEq)]
pub struct MutationRequest {
    pub operation: MutationOp,
    pub kind: EntityKind,
    pub id: Option<EntityId>,
    pub payload: Value,
    pub confirmed: bool,
}

impl MutationRequest {
    pub fn create(kind: EntityKind, payload: Value) -> Self {
        Self {
            operation: MutationOp::Create,
            kind,
            id: None,
            payload,
            confirmed: false,
        }
    }

    pub fn update(kind: EntityKind, id: impl Into<EntityId>, payload: Value) -> Self {
        Self {
            operation: MutationOp::Update,
            kind,
            id: Some(id.into()),
            payload,
            confirmed: false,
        }
    }

    /// An unconfirmed delete; call [`MutationRequest::confirm`] once the user agreed.
    pub fn delete(kind: EntityKind, id: impl Into<EntityId>) -> Self {
        Self {
            operation: MutationOp::Delete,
            kind,
            id: Some(id.into()),
            payload: Value::Null,
            confirmed: false,
        }
    }

    pub fn confirm(mut self) -> Self {
        self.confirmed = true;
        self
    }

    fn target(&self) -> Result<MutationTarget, MutationError> {
        match (self.operation, &self.id) {
            (MutationOp::Create, _) => Ok(MutationTarget {
                kind: self.kind,
                id: None,
            }),
            (op, None) => Err(MutationError::MissingTarget(op)),
            (_, Some(id)) => Ok(MutationTarget {
                kind: self.kind,
                id: Some(id.clone()),
            }),
        }
    }
}

/// What a settled mutation did.
#[derive(Debug, Clone, PartialEq)]
pub enum MutationOutcome {
    Created(ListItem),
    Updated(ListItem),
    Deleted(EntityId),
    /// The same target already has a mutation running; nothing was sent.
    AlreadyInFlight,
}

/// Errors returned to the caller that submitted the mutation.
#[derive(Error, Debug, Clone, PartialEq)]
pub enum MutationError {
    #[error("Delete must be confirmed before it is sent")]
    Unconfirmed,

    #[error("Cannot {0} without a record id")]
    MissingTarget(MutationOp),

    #[error(transparent)]
    Api(#[from] ApiError),
}

impl MutationError {
    /// The record vanished between listing and mutating.
    pub fn is_already_removed(&self) -> bool {
        matches!(self, MutationError::Api(ApiError::NotFound(_)))
    }

    pub fn api_error(&self) -> Option<&ApiError> {
        match self {
            MutationError::Api(e) => Some(e),
            _ => None,
        }
    }
}

/// `(kind, id)`, or `(kind, None)` for a create.
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
struct MutationTarget {
    kind: EntityKind,
    id: Option<EntityId>,
}

impl fmt::Display for MutationTarget {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match &self.id {
            Some(id) => write!(f, "{}/{}", self.kind, id),
            None => write!(f, "{}/new", self.kind),
        }
    }
}

type InFlightSet = Mutex<HashSet<MutationTarget>>;

/// Releases a claimed target when the mutation settles or its future is dropped.
struct InFlightGuard<'a> {
    in_flight: &'a InFlightSet,
    target: MutationTarget,
}

impl Drop for InFlightGuard<'_> {
    fn drop(&mut self) {
        let mut in_flight = self
            .in_flight
            .lock()
            .unwrap_or_else(|poisoned| poisoned.into_inner());
        in_flight.remove(&self.target);
    }
}

/// Runs mutations against the backend and invalidates affected lists.
/// Clones share the in-flight set.
#[derive(Clone)]
pub struct MutationCoordinator {
    backend: Arc<dyn ListBackend>,
    cache: Arc<FetchCache>,
    in_flight: Arc<InFlightSet>,
}

impl MutationCoordinator {
    pub fn new(backend: Arc<dyn ListBackend>, cache: Arc<FetchCache>) -> Self {
        Self {
            backend,
            cache,
            in_flight: Arc::new(Mutex::new(HashSet::new())),
        }
    }

    pub fn in_flight_count(&self) -> usize {
        self.in_flight
            .lock()
            .unwrap_or_else(|poisoned| poisoned.into_inner())
            .len()
    }

    fn claim(&self, target: MutationTarget) -> Option<InFlightGuard<'_>> {
        let mut in_flight = self
            .in_flight
            .lock()
            .unwrap_or_else(|poisoned| poisoned.into_inner());
        if !in_flight.insert(target.clone()) {
            return None;
        }
        Some(InFlightGuard {
            in_flight: &self.in_flight,
            target,
        })
    }

    /// Submit `request`. Never retried; errors go back to this caller only.
    pub async fn execute(&self, request: MutationRequest) -> Result<MutationOutcome, MutationError> {
        let target = request.target()?;
        if request.operation == MutationOp::Delete && !request.confirmed {
            return Err(MutationError::Unconfirmed);
        }

        let Some(_guard) = self.claim(target.clone()) else {
            debug!(record = %target, op = %request.operation, "Ignoring duplicate mutation");
            return Ok(MutationOutcome::AlreadyInFlight);
        };

        let kind = request.kind;
        let result = match (request.operation, request.id) {
            (MutationOp::Create, _) => self
                .backend
                .create(kind, &request.payload)
                .await
                .map(MutationOutcome::Created),
            (MutationOp::Update, Some(id)) => self
                .backend
                .update(kind, &id, &request.payload)
                .await
                .map(MutationOutcome::Updated),
            (MutationOp::Delete, Some(id)) => self
                .backend
                .delete(kind, &id)
                .await
                .map(|()| MutationOutcome::Deleted(id)),
            (op, None) => return Err(MutationError::MissingTarget(op)),
        };

        match &result {
            Ok(_) => {
                info!(record = %target, op = %request.operation, "Mutation applied");
                self.invalidate_lists(kind);
            }
            Err(e @ ApiError::NotFound(_)) => {
                warn!(record = %target, op = %request.operation, error = %e, "Record already removed");
                self.invalidate_lists(kind);
            }
            Err(e) => {
                warn!(record = %target, op = %request.operation, error = %e, "Mutation failed");
            }
        }

        result.map_err(MutationError::from)
    }

    /// Mark every list of `kind` and its dependent kinds stale.
    fn invalidate_lists(&self, kind: EntityKind) {
        let mut matched = self.cache.invalidate(&KeyPattern::Kind(kind));
        for dependent in kind.dependents() {
            matched += self.cache.invalidate(&KeyPattern::Kind(*dependent));
        }
        debug!(kind = %kind, matched, "Invalidated lists after mutation");
    }
}
