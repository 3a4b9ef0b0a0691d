//! Data models for the platform's listable entities.
//!
//! - `Event`, `Program`, `BlogPost`: public catalogue records
//! - `User`, `EventRegistration`, `ProgramSupporter`, `JoinRequest`: people records
//! - `ListItem`: tagged union over all of the above, addressed by field name
//! - `EntityKind`: per-kind paths, search/facet/sort configuration
//!
//! Each record type carries a static `FIELDS` table mapping a field name to an
//! extractor; generic code never inspects record shapes directly.

pub mod event;
pub mod field;
pub mod item;
pub mod kind;
pub mod person;

pub use event::{BlogPost, Event, Program};
pub use field::{EntityId, FieldDef, FieldValue};
pub use item::{ListItem, ListPage};
pub use kind::EntityKind;
pub use person::{EventRegistration, JoinRequest, ProgramSupporter, User};
