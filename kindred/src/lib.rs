//! Kindred - people directory with reciprocal relationships
//!
//! A REST service over a document store of people. Relationship edges are
//! free-form attributes on a person; whenever a person's edges change, the
//! service writes the matching reciprocal edges onto the people they point
//! at and derives one hop of parent, child, spouse and sibling links.
//!
//! ## Modules
//!
//! - **relations**: label vocabulary, reciprocal inference, propagation planning
//! - **people**: records, storage backends, snapshot, service
//! - **routes** / **server**: hyper HTTP API
//! - **client**: API client with a locally persisted snapshot
//! - **reseed**: scheduled collection replacement

pub mod auth;
pub mod client;
pub mod config;
pub mod db;
pub mod images;
pub mod people;
pub mod relations;
pub mod reseed;
pub mod routes;
pub mod server;
pub mod types;

pub use config::Args;
pub use types::{KindredError, Result};
