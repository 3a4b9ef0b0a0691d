use std::borrow::Cow;
use std::fmt;

use chrono::{DateTime, NaiveDate};
use serde::{Deserialize, Deserializer, Serialize};

/// Stable record identity. The API hands out both numeric ids and string ids
/// (object ids, slugs), so both are accepted and held as text.
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize)]
#[serde(transparent)]
#[cfg_attr(feature = "ts", derive(ts_rs::TS), ts(export))]
pub struct EntityId(String);

impl EntityId {
    pub fn new(id: impl Into<String>) -> Self {
        Self(id.into())
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl fmt::Display for EntityId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

impl From<&str> for EntityId {
    fn from(id: &str) -> Self {
        Self(id.to_string())
    }
}

impl From<String> for EntityId {
    fn from(id: String) -> Self {
        Self(id)
    }
}

impl From<i64> for EntityId {
    fn from(id: i64) -> Self {
        Self(id.to_string())
    }
}

impl<'de> Deserialize<'de> for EntityId {
    fn deserialize<D: Deserializer<'de>>(deserializer: D) -> Result<Self, D::Error> {
        #[derive(Deserialize)]
        #[serde(untagged)]
        enum RawId {
            Text(String),
            Number(i64),
        }

        Ok(match RawId::deserialize(deserializer)? {
            RawId::Text(s) => Self(s),
            RawId::Number(n) => Self(n.to_string()),
        })
    }
}

/// A comparable primitive extracted from a record by field name.
///
/// Ordering is total: variants compare by declaration order first
/// (`Empty < Bool < Int < Text`), then by natural order within a variant.
/// Text compares byte-lexicographically, not locale-aware.
#[derive(Debug, Clone, PartialEq, Eq, PartialOrd, Ord, Hash)]
pub enum FieldValue {
    Empty,
    Bool(bool),
    Int(i64),
    Text(String),
}

impl FieldValue {
    pub fn text(s: &str) -> Self {
        FieldValue::Text(s.to_string())
    }

    pub fn opt_text(s: Option<&String>) -> Self {
        match s {
            Some(s) if !s.is_empty() => FieldValue::Text(s.clone()),
            _ => FieldValue::Empty,
        }
    }

    pub fn opt_int(n: Option<i64>) -> Self {
        n.map_or(FieldValue::Empty, FieldValue::Int)
    }

    /// Coerce a date string to Unix milliseconds so dates sort chronologically.
    /// Accepts RFC 3339 timestamps and bare `YYYY-MM-DD` dates; anything else
    /// is kept as text.
    pub fn timestamp(s: Option<&String>) -> Self {
        let Some(raw) = s.map(|s| s.trim()).filter(|s| !s.is_empty()) else {
            return FieldValue::Empty;
        };
        if let Ok(dt) = DateTime::parse_from_rfc3339(raw) {
            return FieldValue::Int(dt.timestamp_millis());
        }
        if let Some(ts) = raw
            .get(..10)
            .and_then(|day| NaiveDate::parse_from_str(day, "%Y-%m-%d").ok())
            .and_then(|d| d.and_hms_opt(0, 0, 0))
            .map(|dt| dt.and_utc().timestamp_millis())
        {
            return FieldValue::Int(ts);
        }
        FieldValue::Text(raw.to_string())
    }

    /// Text used for substring search. Empty values never match.
    pub fn search_text(&self) -> Option<Cow<'_, str>> {
        match self {
            FieldValue::Empty => None,
            FieldValue::Text(s) => Some(Cow::Borrowed(s.as_str())),
            other => Some(Cow::Owned(other.to_string())),
        }
    }

    /// Exact-match facet test against the value's display form.
    pub fn matches_facet(&self, value: &str) -> bool {
        match self {
            FieldValue::Empty => false,
            FieldValue::Text(s) => s == value,
            other => other.to_string() == value,
        }
    }

    pub fn is_empty(&self) -> bool {
        matches!(self, FieldValue::Empty)
    }
}

impl fmt::Display for FieldValue {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            FieldValue::Empty => Ok(()),
            FieldValue::Bool(b) => write!(f, "{}", b),
            FieldValue::Int(n) => write!(f, "{}", n),
            FieldValue::Text(s) => f.write_str(s),
        }
    }
}

/// One named, extractable column of a record type.
pub struct FieldDef<T> {
    pub name: &'static str,
    pub extract: fn(&T) -> FieldValue,
}

/// Resolve `name` against a record's field table.
pub fn lookup<T>(table: &[FieldDef<T>], record: &T, name: &str) -> Option<FieldValue> {
    table
        .iter()
        .find(|def| def.name == name)
        .map(|def| (def.extract)(record))
}

/// Field names declared by a table, in declaration order.
pub fn names<T>(table: &[FieldDef<T>]) -> Vec<&'static str> {
    table.iter().map(|def| def.name).collect()
}

/// Join first and last name the way list columns display them.
pub fn full_name(first: &str, last: &str) -> String {
    match (first.trim(), last.trim()) {
        ("", last) => last.to_string(),
        (first, "") => first.to_string(),
        (first, last) => format!("{} {}", first, last),
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_entity_id_accepts_numbers_and_strings() {
        let a: EntityId = serde_json::from_str("7").expect("numeric id");
        let b: EntityId = serde_json::from_str("\"7\"").expect("string id");
        assert_eq!(a, b);
        assert_eq!(a.as_str(), "7");

        let oid: EntityId =
            serde_json::from_str("\"65f1c0ffee00000000000001\"").expect("object id");
        assert_eq!(oid.to_string(), "65f1c0ffee00000000000001");
    }

    #[test]
    fn test_field_value_ordering() {
        assert!(FieldValue::Empty < FieldValue::Bool(false));
        assert!(FieldValue::Int(9) < FieldValue::Int(10));
        // Plain byte order: uppercase sorts before lowercase
        assert!(FieldValue::text("Zed") < FieldValue::text("adam"));
    }

    #[test]
    fn test_timestamp_coercion() {
        let rfc = FieldValue::timestamp(Some(&"2024-03-01T10:00:00Z".to_string()));
        let day = FieldValue::timestamp(Some(&"2024-03-01".to_string()));
        let later = FieldValue::timestamp(Some(&"2024-03-02".to_string()));
        assert!(matches!(rfc, FieldValue::Int(_)));
        assert!(day < rfc);
        assert!(rfc < later);
        assert_eq!(FieldValue::timestamp(None), FieldValue::Empty);
        assert_eq!(
            FieldValue::timestamp(Some(&"soon".to_string())),
            FieldValue::text("soon")
        );
    }

    #[test]
    fn test_matches_facet() {
        assert!(FieldValue::text("workshop").matches_facet("workshop"));
        assert!(!FieldValue::text("Workshop").matches_facet("workshop"));
        assert!(FieldValue::Bool(true).matches_facet("true"));
        assert!(FieldValue::Int(3).matches_facet("3"));
        assert!(!FieldValue::Empty.matches_facet(""));
    }

    #[test]
    fn test_full_name() {
        assert_eq!(full_name("Ahmed", "Saleh"), "Ahmed Saleh");
        assert_eq!(full_name("", "Saleh"), "Saleh");
        assert_eq!(full_name("Ahmed", " "), "Ahmed");
    }
}
