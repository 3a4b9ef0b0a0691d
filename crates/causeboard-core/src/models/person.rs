use serde::{Deserialize, Serialize};

use super::field::{full_name, EntityId, FieldDef, FieldValue};

/// Dashboard account (admins, editors, volunteers).
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct User {
    #[serde(alias = "_id")]
    pub id: EntityId,
    #[serde(rename = "firstName", default)]
    pub first_name: String,
    #[serde(rename = "lastName", default)]
    pub last_name: String,
    pub email: String,
    #[serde(default)]
    pub phone: Option<String>,
    #[serde(default)]
    pub role: Option<String>,
    #[serde(default)]
    pub status: Option<String>,
    #[serde(rename = "createdAt", default)]
    pub created_at: Option<String>,
}

impl User {
    pub const FIELDS: &'static [FieldDef<User>] = &[
        FieldDef { name: "id", extract: |u| FieldValue::text(u.id.as_str()) },
        FieldDef { name: "name", extract: |u| FieldValue::Text(u.full_name()) },
        FieldDef { name: "firstName", extract: |u| FieldValue::text(&u.first_name) },
        FieldDef { name: "lastName", extract: |u| FieldValue::text(&u.last_name) },
        FieldDef { name: "email", extract: |u| FieldValue::text(&u.email) },
        FieldDef { name: "phone", extract: |u| FieldValue::opt_text(u.phone.as_ref()) },
        FieldDef { name: "role", extract: |u| FieldValue::opt_text(u.role.as_ref()) },
        FieldDef { name: "status", extract: |u| FieldValue::opt_text(u.status.as_ref()) },
        FieldDef { name: "createdAt", extract: |u| FieldValue::timestamp(u.created_at.as_ref()) },
    ];

    pub fn full_name(&self) -> String {
        full_name(&self.first_name, &self.last_name)
    }
}

/// A sign-up against one event.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct EventRegistration {
    #[serde(alias = "_id")]
    pub id: EntityId,
    #[serde(rename = "eventId", default)]
    pub event_id: Option<EntityId>,
    #[serde(rename = "eventTitle", default)]
    pub event_title: Option<String>,
    #[serde(rename = "firstName", default)]
    pub first_name: String,
    #[serde(rename = "lastName", default)]
    pub last_name: String,
    #[serde(default)]
    pub email: Option<String>,
    #[serde(default)]
    pub phone: Option<String>,
    #[serde(default)]
    pub status: Option<String>,
    #[serde(rename = "registeredAt", alias = "createdAt", default)]
    pub registered_at: Option<String>,
}

impl EventRegistration {
    pub const FIELDS: &'static [FieldDef<EventRegistration>] = &[
        FieldDef { name: "id", extract: |r| FieldValue::text(r.id.as_str()) },
        FieldDef { name: "name", extract: |r| FieldValue::Text(full_name(&r.first_name, &r.last_name)) },
        FieldDef { name: "email", extract: |r| FieldValue::opt_text(r.email.as_ref()) },
        FieldDef { name: "phone", extract: |r| FieldValue::opt_text(r.phone.as_ref()) },
        FieldDef {
            name: "eventId",
            extract: |r| r.event_id.as_ref().map_or(FieldValue::Empty, |id| FieldValue::text(id.as_str())),
        },
        FieldDef { name: "eventTitle", extract: |r| FieldValue::opt_text(r.event_title.as_ref()) },
        FieldDef { name: "status", extract: |r| FieldValue::opt_text(r.status.as_ref()) },
        FieldDef { name: "registeredAt", extract: |r| FieldValue::timestamp(r.registered_at.as_ref()) },
    ];
}

/// A donor, sponsor or volunteer attached to a program.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ProgramSupporter {
    #[serde(alias = "_id")]
    pub id: EntityId,
    #[serde(rename = "programId", default)]
    pub program_id: Option<EntityId>,
    #[serde(rename = "programTitle", default)]
    pub program_title: Option<String>,
    #[serde(alias = "fullName")]
    pub name: String,
    #[serde(default)]
    pub email: Option<String>,
    #[serde(rename = "supportType", alias = "type", default)]
    pub support_type: Option<String>,
    /// Pledged amount in minor currency units.
    #[serde(default)]
    pub amount: Option<i64>,
    #[serde(rename = "createdAt", default)]
    pub created_at: Option<String>,
}

impl ProgramSupporter {
    pub const FIELDS: &'static [FieldDef<ProgramSupporter>] = &[
        FieldDef { name: "id", extract: |s| FieldValue::text(s.id.as_str()) },
        FieldDef { name: "name", extract: |s| FieldValue::text(&s.name) },
        FieldDef { name: "email", extract: |s| FieldValue::opt_text(s.email.as_ref()) },
        FieldDef {
            name: "programId",
            extract: |s| s.program_id.as_ref().map_or(FieldValue::Empty, |id| FieldValue::text(id.as_str())),
        },
        FieldDef { name: "programTitle", extract: |s| FieldValue::opt_text(s.program_title.as_ref()) },
        FieldDef { name: "supportType", extract: |s| FieldValue::opt_text(s.support_type.as_ref()) },
        FieldDef { name: "amount", extract: |s| FieldValue::opt_int(s.amount) },
        FieldDef { name: "createdAt", extract: |s| FieldValue::timestamp(s.created_at.as_ref()) },
    ];
}

/// Application to join the organization as a member or volunteer.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct JoinRequest {
    #[serde(alias = "_id")]
    pub id: EntityId,
    #[serde(rename = "fullName", alias = "name")]
    pub full_name: String,
    #[serde(default)]
    pub email: Option<String>,
    #[serde(default)]
    pub phone: Option<String>,
    #[serde(default)]
    pub city: Option<String>,
    #[serde(default)]
    pub motivation: Option<String>,
    #[serde(default)]
    pub status: Option<String>,
    #[serde(rename = "submittedAt", alias = "createdAt", default)]
    pub submitted_at: Option<String>,
}

impl JoinRequest {
    pub const FIELDS: &'static [FieldDef<JoinRequest>] = &[
        FieldDef { name: "id", extract: |j| FieldValue::text(j.id.as_str()) },
        FieldDef { name: "name", extract: |j| FieldValue::text(&j.full_name) },
        FieldDef { name: "email", extract: |j| FieldValue::opt_text(j.email.as_ref()) },
        FieldDef { name: "phone", extract: |j| FieldValue::opt_text(j.phone.as_ref()) },
        FieldDef { name: "city", extract: |j| FieldValue::opt_text(j.city.as_ref()) },
        FieldDef { name: "motivation", extract: |j| FieldValue::opt_text(j.motivation.as_ref()) },
        FieldDef { name: "status", extract: |j| FieldValue::opt_text(j.status.as_ref()) },
        FieldDef { name: "submittedAt", extract: |j| FieldValue::timestamp(j.submitted_at.as_ref()) },
    ];
}
