//! Bookkeeping stored beside every person document

use bson::DateTime;
use serde::{Deserialize, Serialize};

/// Write timestamps and the soft-delete flag. Deleted people stay in the
/// collection with `is_deleted` set.
#[derive(Serialize, Deserialize, Clone, Debug, Default, PartialEq)]
pub struct Metadata {
    #[serde(default)]
    pub is_deleted: bool,

    #[serde(skip_serializing_if = "Option::is_none")]
    pub deleted_at: Option<DateTime>,

    #[serde(skip_serializing_if = "Option::is_none")]
    pub updated_at: Option<DateTime>,

    #[serde(skip_serializing_if = "Option::is_none")]
    pub created_at: Option<DateTime>,
}

impl Metadata {
    pub fn new() -> Self {
        let mut metadata = Self::default();
        metadata.reset(DateTime::now());
        metadata
    }

    /// Mark as a live document first written at `now`
    pub fn reset(&mut self, now: DateTime) {
        self.is_deleted = false;
        self.deleted_at = None;
        self.created_at = Some(now);
        self.updated_at = Some(now);
    }

    pub fn is_live(&self) -> bool {
        !self.is_deleted
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_reset_revives_deleted() {
        let mut metadata = Metadata {
            is_deleted: true,
            deleted_at: Some(DateTime::from_millis(1)),
            ..Default::default()
        };
        assert!(!metadata.is_live());

        let now = DateTime::from_millis(1_700_000_000_000);
        metadata.reset(now);
        assert!(metadata.is_live());
        assert_eq!(metadata.deleted_at, None);
        assert_eq!(metadata.created_at, Some(now));
        assert_eq!(metadata.updated_at, Some(now));
    }

    #[test]
    fn test_missing_flag_defaults_to_live() {
        let metadata: Metadata = bson::from_document(bson::doc! {}).unwrap();
        assert!(metadata.is_live());
    }
}
