use std::fmt;

use serde::{Deserialize, Serialize};

use super::field::{names, FieldDef};
use super::{BlogPost, Event, EventRegistration, JoinRequest, Program, ProgramSupporter, User};
use crate::query::SortDirection;

/// Every collection the dashboard and the public pages list.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
#[cfg_attr(feature = "ts", derive(ts_rs::TS), ts(export))]
pub enum EntityKind {
    Event,
    Program,
    BlogPost,
    User,
    EventRegistration,
    ProgramSupporter,
    JoinRequest,
}

impl EntityKind {
    pub const ALL: [EntityKind; 7] = [
        EntityKind::Event,
        EntityKind::Program,
        EntityKind::BlogPost,
        EntityKind::User,
        EntityKind::EventRegistration,
        EntityKind::ProgramSupporter,
        EntityKind::JoinRequest,
    ];

    /// REST collection path segment.
    pub fn path(&self) -> &'static str {
        match self {
            EntityKind::Event => "events",
            EntityKind::Program => "programs",
            EntityKind::BlogPost => "blogs",
            EntityKind::User => "users",
            EntityKind::EventRegistration => "registrations",
            EntityKind::ProgramSupporter => "supporters",
            EntityKind::JoinRequest => "join-requests",
        }
    }

    /// Get the display title for this kind.
    pub fn title(&self) -> &'static str {
        match self {
            EntityKind::Event => "Events",
            EntityKind::Program => "Programs",
            EntityKind::BlogPost => "Blog Posts",
            EntityKind::User => "Users",
            EntityKind::EventRegistration => "Registrants",
            EntityKind::ProgramSupporter => "Supporters",
            EntityKind::JoinRequest => "Join Requests",
        }
    }

    /// Parse a kind from its path segment or snake_case name.
    pub fn parse(s: &str) -> Option<Self> {
        let lower = s.trim().to_ascii_lowercase();
        Self::ALL.into_iter().find(|kind| {
            kind.path() == lower || kind.snake_name() == lower.replace('-', "_")
        })
    }

    fn snake_name(&self) -> &'static str {
        match self {
            EntityKind::Event => "event",
            EntityKind::Program => "program",
            EntityKind::BlogPost => "blog_post",
            EntityKind::User => "user",
            EntityKind::EventRegistration => "event_registration",
            EntityKind::ProgramSupporter => "program_supporter",
            EntityKind::JoinRequest => "join_request",
        }
    }

    /// Fields the client-side search scans (OR across fields).
    pub fn searchable_fields(&self) -> &'static [&'static str] {
        match self {
            EntityKind::Event => &["title", "location", "category", "description"],
            EntityKind::Program => &["title", "summary", "category"],
            EntityKind::BlogPost => &["title", "author", "excerpt"],
            EntityKind::User => &["name", "email"],
            EntityKind::EventRegistration => &["name", "email", "phone", "eventTitle"],
            EntityKind::ProgramSupporter => &["name", "email", "programTitle"],
            EntityKind::JoinRequest => &["name", "email", "phone", "city"],
        }
    }

    /// Named filterable dimensions.
    pub fn facets(&self) -> &'static [&'static str] {
        match self {
            EntityKind::Event | EntityKind::Program | EntityKind::BlogPost => &["category", "status"],
            EntityKind::User => &["role", "status"],
            EntityKind::EventRegistration => &["status", "eventId"],
            EntityKind::ProgramSupporter => &["supportType", "programId"],
            EntityKind::JoinRequest => &["status"],
        }
    }

    pub fn default_sort(&self) -> (&'static str, SortDirection) {
        match self {
            EntityKind::Event => ("startDate", SortDirection::Asc),
            EntityKind::Program => ("title", SortDirection::Asc),
            EntityKind::BlogPost => ("publishedAt", SortDirection::Desc),
            EntityKind::User => ("name", SortDirection::Asc),
            EntityKind::EventRegistration => ("registeredAt", SortDirection::Desc),
            EntityKind::ProgramSupporter => ("createdAt", SortDirection::Desc),
            EntityKind::JoinRequest => ("submittedAt", SortDirection::Desc),
        }
    }

    /// Kinds whose lists embed this kind's records and go stale with it.
    pub fn dependents(&self) -> &'static [EntityKind] {
        match self {
            EntityKind::Event => &[EntityKind::EventRegistration],
            EntityKind::Program => &[EntityKind::ProgramSupporter],
            _ => &[],
        }
    }

    pub fn field_names(&self) -> Vec<&'static str> {
        match self {
            EntityKind::Event => names(Event::FIELDS),
            EntityKind::Program => names(Program::FIELDS),
            EntityKind::BlogPost => names(BlogPost::FIELDS),
            EntityKind::User => names(User::FIELDS),
            EntityKind::EventRegistration => names(EventRegistration::FIELDS),
            EntityKind::ProgramSupporter => names(ProgramSupporter::FIELDS),
            EntityKind::JoinRequest => names(JoinRequest::FIELDS),
        }
    }

    pub fn has_field(&self, name: &str) -> bool {
        fn declared<T>(table: &[FieldDef<T>], name: &str) -> bool {
            table.iter().any(|def| def.name == name)
        }
        match self {
            EntityKind::Event => declared(Event::FIELDS, name),
            EntityKind::Program => declared(Program::FIELDS, name),
            EntityKind::BlogPost => declared(BlogPost::FIELDS, name),
            EntityKind::User => declared(User::FIELDS, name),
            EntityKind::EventRegistration => declared(EventRegistration::FIELDS, name),
            EntityKind::ProgramSupporter => declared(ProgramSupporter::FIELDS, name),
            EntityKind::JoinRequest => declared(JoinRequest::FIELDS, name),
        }
    }
}

impl fmt::Display for EntityKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.path())
    }
}
