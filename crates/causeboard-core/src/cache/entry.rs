use std::fmt;
use std::sync::Arc;

use chrono::{DateTime, Utc};
use serde::Serialize;

use crate::api::ApiError;
use crate::models::{EntityKind, ListPage};
use crate::query::ListParams;

/// Canonical cache key: entity kind plus the canonical server query.
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub struct CacheKey {
    kind: EntityKind,
    query: String,
}

impl CacheKey {
    pub fn new(kind: EntityKind, params: &ListParams) -> Self {
        Self {
            kind,
            query: params.to_key(),
        }
    }

    pub fn kind(&self) -> EntityKind {
        self.kind
    }

    pub fn query(&self) -> &str {
        &self.query
    }
}

impl fmt::Display for CacheKey {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}/{}", self.kind.path(), self.query)
    }
}

/// Selects entries for invalidation.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum KeyPattern {
    All,
    Kind(EntityKind),
    Exact(CacheKey),
}

impl KeyPattern {
    pub fn matches(&self, key: &CacheKey) -> bool {
        match self {
            KeyPattern::All => true,
            KeyPattern::Kind(kind) => key.kind == *kind,
            KeyPattern::Exact(exact) => key == exact,
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "lowercase")]
pub enum CacheStatus {
    Pending,
    Fresh,
    Stale,
    Error,
}

/// Snapshot of one cached list response, as seen by observers.
///
/// `data` survives refetches and failures, so a view can keep rendering the
/// previous result while a new one is pending.
#[derive(Debug, Clone)]
pub struct CacheEntry {
    pub key: CacheKey,
    pub status: CacheStatus,
    pub data: Option<Arc<ListPage>>,
    pub fetched_at: Option<DateTime<Utc>>,
    pub error: Option<ApiError>,
}

impl CacheEntry {
    pub(crate) fn pending(key: CacheKey) -> Self {
        Self {
            key,
            status: CacheStatus::Pending,
            data: None,
            fetched_at: None,
            error: None,
        }
    }

    pub fn is_pending(&self) -> bool {
        self.status == CacheStatus::Pending
    }

    pub fn age_minutes(&self) -> Option<i64> {
        self.fetched_at.map(|at| (Utc::now() - at).num_minutes())
    }

    pub fn age_display(&self) -> String {
        match self.age_minutes() {
            Some(minutes) => age_display(minutes),
            None => "never".to_string(),
        }
    }
}

/// Human-friendly age: "just now", "5m ago", "2h ago", "3d ago".
pub fn age_display(minutes: i64) -> String {
    if minutes < 1 {
        // Negative covers clock skew
        "just now".to_string()
    } else if minutes < 60 {
        format!("{}m ago", minutes)
    } else if minutes < 1440 {
        let hours = minutes / 60;
        let remaining_mins = minutes % 60;
        if remaining_mins >= 30 {
            // Round up: 1h 30m+ becomes 2h
            format!("{}h ago", hours + 1)
        } else {
            format!("{}h ago", hours)
        }
    } else {
        let days = minutes / 1440;
        let remaining_hours = (minutes % 1440) / 60;
        if remaining_hours >= 12 {
            // Round up: 1d 12h+ becomes 2d
            format!("{}d ago", days + 1)
        } else {
            format!("{}d ago", days)
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::query::SortDirection;

    fn key(kind: EntityKind, search: Option<&str>) -> CacheKey {
        CacheKey::new(
            kind,
            &ListParams {
                search: search.map(str::to_string),
                sort: Some(("name".to_string(), SortDirection::Asc)),
                ..Default::default()
            },
        )
    }

    #[test]
    fn test_key_pattern_matching() {
        let users = key(EntityKind::User, None);
        let users_search = key(EntityKind::User, Some("ahmed"));
        let events = key(EntityKind::Event, None);

        assert!(KeyPattern::All.matches(&events));
        assert!(KeyPattern::Kind(EntityKind::User).matches(&users));
        assert!(KeyPattern::Kind(EntityKind::User).matches(&users_search));
        assert!(!KeyPattern::Kind(EntityKind::User).matches(&events));
        assert!(KeyPattern::Exact(users.clone()).matches(&users));
        assert!(!KeyPattern::Exact(users).matches(&users_search));
    }

    #[test]
    fn test_key_display_is_prefixed_by_path() {
        let k = key(EntityKind::JoinRequest, None);
        assert!(k.to_string().starts_with("join-requests/{"));
    }

    #[test]
    fn test_age_display() {
        assert_eq!(age_display(-3), "just now");
        assert_eq!(age_display(0), "just now");
        assert_eq!(age_display(5), "5m ago");
        assert_eq!(age_display(89), "1h ago");
        assert_eq!(age_display(90), "2h ago");
        assert_eq!(age_display(1440 + 11 * 60), "1d ago");
        assert_eq!(age_display(1440 + 12 * 60), "2d ago");
    }

    #[test]
    fn test_entry_without_fetch_reports_never() {
        let entry = CacheEntry::pending(key(EntityKind::User, None));
        assert!(entry.is_pending());
        assert_eq!(entry.age_display(), "never");
    }
}
