//! Error types for Kindred

use hyper::StatusCode;
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;
use std::fmt;

/// Per-field validation messages for a single relationship attribute
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct EdgeFieldErrors {
    #[serde(skip_serializing_if = "Option::is_none")]
    pub person: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub relation_type: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub reciprocal: Option<String>,
}

impl EdgeFieldErrors {
    pub fn is_empty(&self) -> bool {
        self.person.is_none() && self.relation_type.is_none() && self.reciprocal.is_none()
    }
}

/// Validation messages keyed by attribute key
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(transparent)]
pub struct FieldErrors(pub BTreeMap<String, EdgeFieldErrors>);

impl FieldErrors {
    pub fn is_empty(&self) -> bool {
        self.0.is_empty()
    }

    pub fn len(&self) -> usize {
        self.0.len()
    }

    pub fn get(&self, key: &str) -> Option<&EdgeFieldErrors> {
        self.0.get(key)
    }

    pub fn insert(&mut self, key: impl Into<String>, errors: EdgeFieldErrors) {
        if !errors.is_empty() {
            self.0.insert(key.into(), errors);
        }
    }
}

impl fmt::Display for FieldErrors {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let keys: Vec<&str> = self.0.keys().map(String::as_str).collect();
        write!(f, "{} invalid field(s): {}", keys.len(), keys.join(", "))
    }
}

/// Main error type for Kindred operations
#[derive(Debug, thiserror::Error)]
pub enum KindredError {
    #[error("Bad request: {0}")]
    BadRequest(String),

    #[error("Unauthorized: {0}")]
    Unauthorized(String),

    #[error("Not found: {0}")]
    NotFound(String),

    #[error("Validation failed: {0}")]
    Validation(FieldErrors),

    #[error("Database error: {0}")]
    Database(String),

    #[error("Upstream error: {0}")]
    Upstream(String),

    #[error("Service unavailable: {0}")]
    Unavailable(String),

    #[error("Internal error: {0}")]
    Internal(String),

    #[error("Configuration error: {0}")]
    Config(String),

    #[error("Authentication error: {0}")]
    Auth(String),
}

impl KindredError {
    /// Convert error to HTTP status code
    pub fn status_code(&self) -> StatusCode {
        match self {
            Self::BadRequest(_) => StatusCode::BAD_REQUEST,
            Self::Unauthorized(_) => StatusCode::UNAUTHORIZED,
            Self::NotFound(_) => StatusCode::NOT_FOUND,
            Self::Validation(_) => StatusCode::UNPROCESSABLE_ENTITY,
            Self::Database(_) => StatusCode::SERVICE_UNAVAILABLE,
            Self::Upstream(_) => StatusCode::BAD_GATEWAY,
            Self::Unavailable(_) => StatusCode::SERVICE_UNAVAILABLE,
            Self::Internal(_) => StatusCode::INTERNAL_SERVER_ERROR,
            Self::Config(_) => StatusCode::INTERNAL_SERVER_ERROR,
            Self::Auth(_) => StatusCode::UNAUTHORIZED,
        }
    }

    /// Stable machine-readable code for JSON error bodies
    pub fn code(&self) -> &'static str {
        match self {
            Self::BadRequest(_) => "BAD_REQUEST",
            Self::Unauthorized(_) => "UNAUTHORIZED",
            Self::NotFound(_) => "NOT_FOUND",
            Self::Validation(_) => "VALIDATION_FAILED",
            Self::Database(_) => "DB_ERROR",
            Self::Upstream(_) => "UPSTREAM_ERROR",
            Self::Unavailable(_) => "UNAVAILABLE",
            Self::Internal(_) => "INTERNAL_ERROR",
            Self::Config(_) => "CONFIG_ERROR",
            Self::Auth(_) => "INVALID_TOKEN",
        }
    }
}

impl From<std::io::Error> for KindredError {
    fn from(err: std::io::Error) -> Self {
        Self::Internal(err.to_string())
    }
}

impl From<serde_json::Error> for KindredError {
    fn from(err: serde_json::Error) -> Self {
        Self::BadRequest(format!("JSON error: {}", err))
    }
}

impl From<hyper::Error> for KindredError {
    fn from(err: hyper::Error) -> Self {
        Self::Internal(format!("HTTP error: {}", err))
    }
}

impl From<mongodb::error::Error> for KindredError {
    fn from(err: mongodb::error::Error) -> Self {
        Self::Database(err.to_string())
    }
}

impl From<bson::ser::Error> for KindredError {
    fn from(err: bson::ser::Error) -> Self {
        Self::Database(format!("BSON encode error: {}", err))
    }
}

impl From<bson::de::Error> for KindredError {
    fn from(err: bson::de::Error) -> Self {
        Self::Database(format!("BSON decode error: {}", err))
    }
}

impl From<jsonwebtoken::errors::Error> for KindredError {
    fn from(err: jsonwebtoken::errors::Error) -> Self {
        Self::Unauthorized(format!("JWT error: {}", err))
    }
}

impl From<reqwest::Error> for KindredError {
    fn from(err: reqwest::Error) -> Self {
        Self::Upstream(err.to_string())
    }
}

impl From<multer::Error> for KindredError {
    fn from(err: multer::Error) -> Self {
        Self::BadRequest(format!("Multipart error: {}", err))
    }
}

/// Result type alias for Kindred operations
pub type Result<T> = std::result::Result<T, KindredError>;

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_status_codes() {
        assert_eq!(
            KindredError::NotFound("x".into()).status_code(),
            StatusCode::NOT_FOUND
        );
        assert_eq!(
            KindredError::Validation(FieldErrors::default()).status_code(),
            StatusCode::UNPROCESSABLE_ENTITY
        );
        assert_eq!(
            KindredError::Upstream("cloud down".into()).status_code(),
            StatusCode::BAD_GATEWAY
        );
    }

    #[test]
    fn test_field_errors_skip_empty_entries() {
        let mut errors = FieldErrors::default();
        errors.insert("rel_1", EdgeFieldErrors::default());
        assert!(errors.is_empty());

        errors.insert(
            "rel_2",
            EdgeFieldErrors {
                relation_type: Some("Please select a relation from the list.".into()),
                ..Default::default()
            },
        );
        assert_eq!(errors.len(), 1);

        let json = serde_json::to_value(&errors).unwrap();
        assert_eq!(
            json["rel_2"]["relationType"],
            "Please select a relation from the list."
        );
        assert!(json["rel_2"].get("reciprocal").is_none());
    }
}
