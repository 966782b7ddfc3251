//! People directory: records, storage, snapshot and service

pub mod person;
pub mod service;
pub mod snapshot;
pub mod store;

pub use person::{Attribute, Person, PersonId, PersonPatch, PersonRecord, RelationshipEdge};
pub use service::{PeopleService, PropagationReport, Saved};
pub use snapshot::PeopleSnapshot;
pub use store::{MemoryPersonStore, MongoPersonStore, PersonStore};
