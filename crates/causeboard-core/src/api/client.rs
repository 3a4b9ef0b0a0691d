//! API client for the platform's REST collections.
//!
//! This module provides the `ApiClient` struct, the reqwest-backed
//! `ListBackend` used by every list view and mutation.

use std::sync::Arc;
use std::time::Duration;

use anyhow::{Context, Result};
use futures::future::BoxFuture;
use reqwest::{Client, Method, RequestBuilder, StatusCode, Url};
use serde::Deserialize;
use serde_json::{json, Map, Value};
use tracing::{debug, warn};

use super::{ApiError, ListBackend};
use crate::models::{EntityId, EntityKind, ListItem, ListPage};
use crate::query::ListParams;

// ============================================================================
// Constants
// ============================================================================

/// HTTP request timeout in seconds.
/// 30s allows for slow API responses while failing fast enough for good UX.
const REQUEST_TIMEOUT_SECS: u64 = 30;

/// Maximum number of retries for rate-limited (429) requests.
/// 3 retries with exponential backoff usually succeeds without excessive delay.
const MAX_RATE_LIMIT_RETRIES: u32 = 3;

/// Initial backoff delay in milliseconds for rate limiting.
const INITIAL_BACKOFF_MS: u64 = 1000;

/// Path of the sign-in endpoint, relative to the API base.
const LOGIN_PATH: &[&str] = &["auth", "login"];

#[derive(Debug, Deserialize)]
struct LoginResponse {
    #[serde(default)]
    token: Option<String>,
    #[serde(default)]
    data: Option<LoginData>,
}

#[derive(Debug, Deserialize)]
struct LoginData {
    token: String,
}

/// API client for the platform.
/// Clone is cheap - reqwest::Client and the token are reference counted.
#[derive(Clone)]
pub struct ApiClient {
    client: Client,
    base_url: Url,
    token: Option<Arc<str>>,
}

impl ApiClient {
    /// Create a new API client rooted at `base_url` (e.g. `https://host/api`).
    pub fn new(base_url: &str) -> Result<Self> {
        let base_url = Url::parse(base_url)
            .with_context(|| format!("Invalid API base URL: {}", base_url))?;
        if base_url.cannot_be_a_base() {
            anyhow::bail!("API base URL cannot carry paths: {}", base_url);
        }

        let client = Client::builder()
            .timeout(Duration::from_secs(REQUEST_TIMEOUT_SECS))
            .build()?;

        Ok(Self {
            client,
            base_url,
            token: None,
        })
    }

    pub fn base_url(&self) -> &Url {
        &self.base_url
    }

    /// Set the bearer token for authenticated requests
    pub fn set_token(&mut self, token: String) {
        self.token = Some(Arc::from(token));
    }

    pub fn has_token(&self) -> bool {
        self.token.is_some()
    }

    /// Exchange credentials for a bearer token.
    pub async fn authenticate(&self, username: &str, password: &str) -> Result<String> {
        let url = self.endpoint(LOGIN_PATH);
        let response = self
            .client
            .post(url)
            .json(&json!({ "email": username, "password": password }))
            .send()
            .await
            .context("Failed to send authentication request")?;

        let status = response.status();
        if !status.is_success() {
            let body = response.text().await.unwrap_or_default();
            return Err(ApiError::from_status(status, &body).into());
        }

        let login: LoginResponse = response
            .json()
            .await
            .context("Failed to parse auth response")?;
        login
            .token
            .or(login.data.map(|d| d.token))
            .ok_or_else(|| anyhow::anyhow!("Auth response did not include a token"))
    }

    fn endpoint(&self, segments: &[&str]) -> Url {
        let mut url = self.base_url.clone();
        // `new` rejects cannot-be-a-base URLs, so this always succeeds
        if let Ok(mut path) = url.path_segments_mut() {
            path.pop_if_empty().extend(segments);
        }
        url
    }

    fn collection_url(&self, kind: EntityKind) -> Url {
        self.endpoint(&[kind.path()])
    }

    fn item_url(&self, kind: EntityKind, id: &EntityId) -> Url {
        self.endpoint(&[kind.path(), id.as_str()])
    }

    fn request(&self, method: Method, url: Url) -> RequestBuilder {
        let builder = self.client.request(method, url);
        match &self.token {
            Some(token) => builder.bearer_auth(token),
            None => builder,
        }
    }

    fn list_request(&self, kind: EntityKind, params: &ListParams) -> RequestBuilder {
        self.request(Method::GET, self.collection_url(kind))
            .query(&params.to_query_pairs())
    }

    /// Send a request, backing off on 429 and mapping other failures.
    async fn send<F>(&self, build: F) -> Result<reqwest::Response, ApiError>
    where
        F: Fn() -> RequestBuilder,
    {
        let mut retries = 0;
        let mut backoff_ms = INITIAL_BACKOFF_MS;

        loop {
            let response = build().send().await?;
            let status = response.status();
            if status.is_success() {
                return Ok(response);
            }

            if status == StatusCode::TOO_MANY_REQUESTS {
                retries += 1;
                if retries > MAX_RATE_LIMIT_RETRIES {
                    return Err(ApiError::RateLimited);
                }
                warn!(url = %response.url(), retry = retries, backoff_ms = backoff_ms, "Rate limited, backing off");
                tokio::time::sleep(Duration::from_millis(backoff_ms)).await;
                backoff_ms *= 2; // Exponential backoff
                continue;
            }

            let body = response.text().await.unwrap_or_default();
            return Err(ApiError::from_status(status, &body));
        }
    }

    /// Read a JSON body; an empty body (204) reads as `null`.
    async fn read_json(response: reqwest::Response) -> Result<Value, ApiError> {
        let text = response.text().await?;
        if text.trim().is_empty() {
            return Ok(Value::Null);
        }
        serde_json::from_str(&text).map_err(|e| ApiError::InvalidResponse(e.to_string()))
    }

    // ===== Collection Methods =====

    pub async fn list_page(&self, kind: EntityKind, params: &ListParams) -> Result<ListPage, ApiError> {
        let response = self.send(|| self.list_request(kind, params)).await?;
        let body = Self::read_json(response).await?;
        let page = parse_list_response(kind, body)?;
        debug!(kind = %kind, count = page.items.len(), total = page.total_count, "List response received");
        Ok(page)
    }

    pub async fn get_item(&self, kind: EntityKind, id: &EntityId) -> Result<ListItem, ApiError> {
        let response = self
            .send(|| self.request(Method::GET, self.item_url(kind, id)))
            .await?;
        let body = Self::read_json(response).await?;
        parse_item_response(kind, body)?
            .ok_or_else(|| ApiError::InvalidResponse(format!("{} {} returned no record", kind, id)))
    }

    pub async fn create_item(&self, kind: EntityKind, payload: &Value) -> Result<ListItem, ApiError> {
        let response = self
            .send(|| self.request(Method::POST, self.collection_url(kind)).json(payload))
            .await?;
        let body = Self::read_json(response).await?;
        parse_item_response(kind, body)?
            .ok_or_else(|| ApiError::InvalidResponse(format!("create on {} returned no record", kind)))
    }

    pub async fn update_item(
        &self,
        kind: EntityKind,
        id: &EntityId,
        payload: &Value,
    ) -> Result<ListItem, ApiError> {
        let response = self
            .send(|| self.request(Method::PUT, self.item_url(kind, id)).json(payload))
            .await?;
        let body = Self::read_json(response).await?;
        match parse_item_response(kind, body)? {
            Some(item) => Ok(item),
            // `{ status, message }` only: read the record back
            None => self.get_item(kind, id).await,
        }
    }

    pub async fn delete_item(&self, kind: EntityKind, id: &EntityId) -> Result<(), ApiError> {
        let response = self
            .send(|| self.request(Method::DELETE, self.item_url(kind, id)))
            .await?;
        let body = Self::read_json(response).await?;
        parse_item_response(kind, body).map(|_| ())
    }
}

impl ListBackend for ApiClient {
    fn list(&self, kind: EntityKind, params: &ListParams) -> BoxFuture<'static, Result<ListPage, ApiError>> {
        let client = self.clone();
        let params = params.clone();
        Box::pin(async move { client.list_page(kind, &params).await })
    }

    fn fetch_one(&self, kind: EntityKind, id: &EntityId) -> BoxFuture<'static, Result<ListItem, ApiError>> {
        let client = self.clone();
        let id = id.clone();
        Box::pin(async move { client.get_item(kind, &id).await })
    }

    fn create(&self, kind: EntityKind, payload: &Value) -> BoxFuture<'static, Result<ListItem, ApiError>> {
        let client = self.clone();
        let payload = payload.clone();
        Box::pin(async move { client.create_item(kind, &payload).await })
    }

    fn update(
        &self,
        kind: EntityKind,
        id: &EntityId,
        payload: &Value,
    ) -> BoxFuture<'static, Result<ListItem, ApiError>> {
        let client = self.clone();
        let id = id.clone();
        let payload = payload.clone();
        Box::pin(async move { client.update_item(kind, &id, &payload).await })
    }

    fn delete(&self, kind: EntityKind, id: &EntityId) -> BoxFuture<'static, Result<(), ApiError>> {
        let client = self.clone();
        let id = id.clone();
        Box::pin(async move { client.delete_item(kind, &id).await })
    }
}

// ============================================================================
// Response parsing
// ============================================================================

fn json_type(value: &Value) -> &'static str {
    match value {
        Value::Null => "null",
        Value::Bool(_) => "boolean",
        Value::Number(_) => "number",
        Value::String(_) => "string",
        Value::Array(_) => "array",
        Value::Object(_) => "object",
    }
}

/// Accepts `{ items|data: [...], totalCount|total: n }` or a bare array.
/// Records that do not decode as `kind` are skipped with a warning.
pub(crate) fn parse_list_response(kind: EntityKind, body: Value) -> Result<ListPage, ApiError> {
    let (records, total) = match body {
        Value::Array(records) => (records, None),
        Value::Object(mut map) => {
            let records = match map.remove("items").or_else(|| map.remove("data")) {
                Some(Value::Array(records)) => records,
                Some(other) => {
                    return Err(ApiError::InvalidResponse(format!(
                        "expected a list of {}, got {}",
                        kind,
                        json_type(&other)
                    )))
                }
                None => {
                    return Err(ApiError::InvalidResponse(format!(
                        "{} response has no items",
                        kind
                    )))
                }
            };
            let total = map
                .get("totalCount")
                .or_else(|| map.get("total"))
                .and_then(Value::as_u64)
                .and_then(|n| usize::try_from(n).ok());
            (records, total)
        }
        other => {
            return Err(ApiError::InvalidResponse(format!(
                "expected a {} list, got {}",
                kind,
                json_type(&other)
            )))
        }
    };

    let mut items = Vec::with_capacity(records.len());
    for record in records {
        match ListItem::from_json(kind, record) {
            Ok(item) => items.push(item),
            Err(e) => warn!(kind = %kind, error = %e, "Skipping malformed record"),
        }
    }

    let total_count = total.unwrap_or(items.len()).max(items.len());
    Ok(ListPage { items, total_count })
}

/// Accepts `{ item|data: {...} }`, a bare record, or `{ status, message }`.
/// A status-only body yields `None`; `status: "error"` is a rejection.
pub(crate) fn parse_item_response(kind: EntityKind, body: Value) -> Result<Option<ListItem>, ApiError> {
    let mut map = match body {
        Value::Null => return Ok(None),
        Value::Object(map) => map,
        other => {
            return Err(ApiError::InvalidResponse(format!(
                "expected a {} record, got {}",
                kind,
                json_type(&other)
            )))
        }
    };

    if let Some(status) = map.get("status").and_then(Value::as_str) {
        if status.eq_ignore_ascii_case("error") || status.eq_ignore_ascii_case("fail") {
            return Err(rejection(&map));
        }
    }

    let record = match map.remove("item").or_else(|| map.remove("data")) {
        Some(Value::Object(record)) => record,
        Some(Value::Null) | None if !map.contains_key("id") => return Ok(None),
        Some(other) => {
            return Err(ApiError::InvalidResponse(format!(
                "expected a {} record, got {}",
                kind,
                json_type(&other)
            )))
        }
        None => map,
    };

    ListItem::from_json(kind, Value::Object(record))
        .map(Some)
        .map_err(|e| ApiError::InvalidResponse(format!("malformed {} record: {}", kind, e)))
}

fn rejection(map: &Map<String, Value>) -> ApiError {
    ApiError::Validation {
        field: map.get("field").and_then(Value::as_str).map(str::to_string),
        message: map
            .get("message")
            .and_then(Value::as_str)
            .unwrap_or("rejected by server")
            .to_string(),
    }
}

// ============================================================================
// Tests
// ============================================================================
