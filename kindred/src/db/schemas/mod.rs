//! Database schemas for Kindred

mod metadata;
mod person;

pub use metadata::Metadata;
pub use person::{PersonDoc, PEOPLE_COLLECTION};
