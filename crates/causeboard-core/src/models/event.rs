use serde::{Deserialize, Serialize};

use super::field::{EntityId, FieldDef, FieldValue};

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Event {
    #[serde(alias = "_id")]
    pub id: EntityId,
    #[serde(alias = "name")]
    pub title: String,
    #[serde(default)]
    pub description: Option<String>,
    #[serde(default)]
    pub category: Option<String>,
    #[serde(default)]
    pub status: Option<String>,
    #[serde(default)]
    pub location: Option<String>,
    #[serde(rename = "startDate", alias = "date", default)]
    pub start_date: Option<String>,
    #[serde(rename = "endDate", default)]
    pub end_date: Option<String>,
    #[serde(default)]
    pub capacity: Option<i64>,
    #[serde(rename = "registeredCount", alias = "registrationsCount", default)]
    pub registered_count: Option<i64>,
}

impl Event {
    pub const FIELDS: &'static [FieldDef<Event>] = &[
        FieldDef { name: "id", extract: |e| FieldValue::text(e.id.as_str()) },
        FieldDef { name: "title", extract: |e| FieldValue::text(&e.title) },
        FieldDef { name: "description", extract: |e| FieldValue::opt_text(e.description.as_ref()) },
        FieldDef { name: "category", extract: |e| FieldValue::opt_text(e.category.as_ref()) },
        FieldDef { name: "status", extract: |e| FieldValue::opt_text(e.status.as_ref()) },
        FieldDef { name: "location", extract: |e| FieldValue::opt_text(e.location.as_ref()) },
        FieldDef { name: "startDate", extract: |e| FieldValue::timestamp(e.start_date.as_ref()) },
        FieldDef { name: "endDate", extract: |e| FieldValue::timestamp(e.end_date.as_ref()) },
        FieldDef { name: "capacity", extract: |e| FieldValue::opt_int(e.capacity) },
        FieldDef { name: "registeredCount", extract: |e| FieldValue::opt_int(e.registered_count) },
        FieldDef { name: "seatsLeft", extract: |e| FieldValue::opt_int(e.seats_left()) },
    ];

    /// Remaining capacity, if the event has a cap.
    pub fn seats_left(&self) -> Option<i64> {
        self.capacity
            .map(|cap| (cap - self.registered_count.unwrap_or(0)).max(0))
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Program {
    #[serde(alias = "_id")]
    pub id: EntityId,
    #[serde(alias = "name")]
    pub title: String,
    #[serde(default)]
    pub summary: Option<String>,
    #[serde(default)]
    pub category: Option<String>,
    #[serde(default)]
    pub status: Option<String>,
    #[serde(rename = "startDate", default)]
    pub start_date: Option<String>,
    #[serde(rename = "supportersCount", default)]
    pub supporters_count: Option<i64>,
}

impl Program {
    pub const FIELDS: &'static [FieldDef<Program>] = &[
        FieldDef { name: "id", extract: |p| FieldValue::text(p.id.as_str()) },
        FieldDef { name: "title", extract: |p| FieldValue::text(&p.title) },
        FieldDef { name: "summary", extract: |p| FieldValue::opt_text(p.summary.as_ref()) },
        FieldDef { name: "category", extract: |p| FieldValue::opt_text(p.category.as_ref()) },
        FieldDef { name: "status", extract: |p| FieldValue::opt_text(p.status.as_ref()) },
        FieldDef { name: "startDate", extract: |p| FieldValue::timestamp(p.start_date.as_ref()) },
        FieldDef { name: "supportersCount", extract: |p| FieldValue::opt_int(p.supporters_count) },
    ];
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct BlogPost {
    #[serde(alias = "_id")]
    pub id: EntityId,
    pub title: String,
    #[serde(default)]
    pub author: Option<String>,
    #[serde(default)]
    pub excerpt: Option<String>,
    #[serde(default)]
    pub category: Option<String>,
    #[serde(default)]
    pub status: Option<String>,
    #[serde(rename = "publishedAt", alias = "createdAt", default)]
    pub published_at: Option<String>,
}

impl BlogPost {
    pub const FIELDS: &'static [FieldDef<BlogPost>] = &[
        FieldDef { name: "id", extract: |b| FieldValue::text(b.id.as_str()) },
        FieldDef { name: "title", extract: |b| FieldValue::text(&b.title) },
        FieldDef { name: "author", extract: |b| FieldValue::opt_text(b.author.as_ref()) },
        FieldDef { name: "excerpt", extract: |b| FieldValue::opt_text(b.excerpt.as_ref()) },
        FieldDef { name: "category", extract: |b| FieldValue::opt_text(b.category.as_ref()) },
        FieldDef { name: "status", extract: |b| FieldValue::opt_text(b.status.as_ref()) },
        FieldDef { name: "publishedAt", extract: |b| FieldValue::timestamp(b.published_at.as_ref()) },
    ];
}
