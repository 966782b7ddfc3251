//! Shared types for Kindred

pub mod error;

pub use error::{EdgeFieldErrors, FieldErrors, KindredError, Result};
