use serde::Serialize;

use super::field::{lookup, EntityId, FieldValue};
use super::{BlogPost, EntityKind, Event, EventRegistration, JoinRequest, Program, ProgramSupporter, User};

/// A row in any list view, tagged by entity kind.
///
/// Mixed tables (the registrants screen shows registrations, supporters and
/// join requests side by side) hold several variants at once; every generic
/// consumer goes through [`ListItem::field`] instead of probing shapes.
#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(tag = "kind", content = "record", rename_all = "snake_case")]
pub enum ListItem {
    Event(Event),
    Program(Program),
    BlogPost(BlogPost),
    User(User),
    EventRegistration(EventRegistration),
    ProgramSupporter(ProgramSupporter),
    JoinRequest(JoinRequest),
}

impl ListItem {
    /// Decode one API record as the given kind.
    pub fn from_json(kind: EntityKind, value: serde_json::Value) -> serde_json::Result<Self> {
        Ok(match kind {
            EntityKind::Event => ListItem::Event(serde_json::from_value(value)?),
            EntityKind::Program => ListItem::Program(serde_json::from_value(value)?),
            EntityKind::BlogPost => ListItem::BlogPost(serde_json::from_value(value)?),
            EntityKind::User => ListItem::User(serde_json::from_value(value)?),
            EntityKind::EventRegistration => {
                ListItem::EventRegistration(serde_json::from_value(value)?)
            }
            EntityKind::ProgramSupporter => {
                ListItem::ProgramSupporter(serde_json::from_value(value)?)
            }
            EntityKind::JoinRequest => ListItem::JoinRequest(serde_json::from_value(value)?),
        })
    }

    pub fn kind(&self) -> EntityKind {
        match self {
            ListItem::Event(_) => EntityKind::Event,
            ListItem::Program(_) => EntityKind::Program,
            ListItem::BlogPost(_) => EntityKind::BlogPost,
            ListItem::User(_) => EntityKind::User,
            ListItem::EventRegistration(_) => EntityKind::EventRegistration,
            ListItem::ProgramSupporter(_) => EntityKind::ProgramSupporter,
            ListItem::JoinRequest(_) => EntityKind::JoinRequest,
        }
    }

    pub fn id(&self) -> &EntityId {
        match self {
            ListItem::Event(e) => &e.id,
            ListItem::Program(p) => &p.id,
            ListItem::BlogPost(b) => &b.id,
            ListItem::User(u) => &u.id,
            ListItem::EventRegistration(r) => &r.id,
            ListItem::ProgramSupporter(s) => &s.id,
            ListItem::JoinRequest(j) => &j.id,
        }
    }

    /// Resolve a field by name through the variant's field table.
    /// `None` means the kind has no such field.
    pub fn field(&self, name: &str) -> Option<FieldValue> {
        match self {
            ListItem::Event(e) => lookup(Event::FIELDS, e, name),
            ListItem::Program(p) => lookup(Program::FIELDS, p, name),
            ListItem::BlogPost(b) => lookup(BlogPost::FIELDS, b, name),
            ListItem::User(u) => lookup(User::FIELDS, u, name),
            ListItem::EventRegistration(r) => lookup(EventRegistration::FIELDS, r, name),
            ListItem::ProgramSupporter(s) => lookup(ProgramSupporter::FIELDS, s, name),
            ListItem::JoinRequest(j) => lookup(JoinRequest::FIELDS, j, name),
        }
    }

    /// Primary label for list rows and the detail drawer header.
    pub fn display_name(&self) -> String {
        let primary = match self {
            ListItem::Event(_) | ListItem::Program(_) | ListItem::BlogPost(_) => "title",
            _ => "name",
        };
        self.field(primary)
            .map(|v| v.to_string())
            .filter(|s| !s.is_empty())
            .unwrap_or_else(|| format!("#{}", self.id()))
    }
}

/// One list response: the items returned plus the server's total match count.
#[derive(Debug, Clone, Default, PartialEq, Serialize)]
pub struct ListPage {
    pub items: Vec<ListItem>,
    #[serde(rename = "totalCount")]
    pub total_count: usize,
}

impl ListPage {
    pub fn new(items: Vec<ListItem>) -> Self {
        let total_count = items.len();
        Self { items, total_count }
    }

    pub fn contains(&self, id: &EntityId) -> bool {
        self.items.iter().any(|item| item.id() == id)
    }

    pub fn find(&self, id: &EntityId) -> Option<&ListItem> {
        self.items.iter().find(|item| item.id() == id)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn test_from_json_dispatches_on_kind() {
        let item = ListItem::from_json(
            EntityKind::User,
            json!({"id": 1, "firstName": "Ahmed", "lastName": "Saleh", "email": "ahmed@x.org"}),
        )
        .expect("user record");
        assert_eq!(item.kind(), EntityKind::User);
        assert_eq!(item.id().as_str(), "1");
        assert_eq!(item.display_name(), "Ahmed Saleh");
    }

    #[test]
    fn test_from_json_rejects_wrong_shape() {
        // A user record lacks an event title
        let result = ListItem::from_json(EntityKind::Event, json!({"id": 1, "email": "a@x.org"}));
        assert!(result.is_err());
    }

    #[test]
    fn test_field_lookup_is_per_kind() {
        let request = ListItem::from_json(
            EntityKind::JoinRequest,
            json!({"id": "j1", "fullName": "Lina K.", "city": "Amman"}),
        )
        .expect("join request");
        assert_eq!(request.field("city"), Some(FieldValue::text("Amman")));
        // Users have no city column
        let user = ListItem::from_json(EntityKind::User, json!({"id": 2, "email": "b@x.org"}))
            .expect("user");
        assert_eq!(user.field("city"), None);
        assert_eq!(user.display_name(), "#2");
    }
}
