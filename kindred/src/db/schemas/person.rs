//! Person document schema
//!
//! The named fields and free-form attributes of a person live at the top
//! level of the document, next to `_id` and `metadata`.

use bson::{doc, oid::ObjectId, Document};
use mongodb::options::IndexOptions;
use serde::{Deserialize, Serialize};

use crate::db::mongo::{IntoIndexes, MutMetadata};
use crate::db::schemas::Metadata;
use crate::people::person::{Person, PersonRecord};

/// Collection name for people
pub const PEOPLE_COLLECTION: &str = "people";

/// Person document stored in MongoDB
#[derive(Serialize, Deserialize, Clone, Debug, Default)]
pub struct PersonDoc {
    #[serde(skip_serializing_if = "Option::is_none")]
    pub _id: Option<ObjectId>,

    #[serde(default)]
    pub metadata: Metadata,

    #[serde(flatten)]
    pub record: PersonRecord,
}

impl PersonDoc {
    pub fn new(mut record: PersonRecord) -> Self {
        record.sanitize();
        Self {
            _id: None,
            metadata: Metadata::new(),
            record,
        }
    }

    /// Convert to the API shape; unsaved or soft-deleted documents yield `None`
    pub fn into_person(self) -> Option<Person> {
        if !self.metadata.is_live() {
            return None;
        }
        let id = self._id?;
        let mut record = self.record;
        record.sanitize();
        Some(Person::new(id.to_hex(), record))
    }
}

impl IntoIndexes for PersonDoc {
    fn into_indices() -> Vec<(Document, Option<IndexOptions>)> {
        vec![(
            doc! { "Name": 1 },
            Some(
                IndexOptions::builder()
                    .name(Some("person_name_index".to_string()))
                    .build(),
            ),
        )]
    }
}

impl MutMetadata for PersonDoc {
    fn mut_metadata(&mut self) -> &mut Metadata {
        &mut self.metadata
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use bson::Bson;

    #[test]
    fn test_person_doc_round_trips_through_bson() {
        let record = PersonRecord::from_json(serde_json::json!({
            "Name": "Mei",
            "Contact": 91234567,
            "Hobby": "Erhu",
            "rel": { "value": "Lin", "value2": "Sister", "value3": "Sister", "personId": "abc" }
        }))
        .unwrap();
        let mut doc = PersonDoc::new(record);
        doc._id = Some(ObjectId::new());

        let raw = bson::to_document(&doc).unwrap();
        assert!(matches!(raw.get("Name"), Some(Bson::String(_))));
        assert!(raw.get_document("rel").is_ok());
        assert!(raw.get_document("metadata").is_ok());

        let back: PersonDoc = bson::from_document(raw).unwrap();
        let person = back.into_person().unwrap();
        assert_eq!(person.record.contact.as_deref(), Some("91234567"));
        assert_eq!(person.record.relationships().count(), 1);
        assert!(!person.record.attributes.contains_key("metadata"));
    }

    #[test]
    fn test_numeric_contact_from_legacy_document() {
        let raw = doc! { "_id": ObjectId::new(), "Name": "Old", "Contact": 65001234_i64 };
        let person = bson::from_document::<PersonDoc>(raw)
            .unwrap()
            .into_person()
            .unwrap();
        assert_eq!(person.record.contact.as_deref(), Some("65001234"));
    }

    #[test]
    fn test_soft_deleted_document_is_not_a_person() {
        let raw = doc! {
            "_id": ObjectId::new(),
            "Name": "Gone",
            "metadata": { "is_deleted": true }
        };
        let doc: PersonDoc = bson::from_document(raw).unwrap();
        assert!(doc.into_person().is_none());
    }

    #[test]
    fn test_indexes() {
        let idx = PersonDoc::into_indices();
        assert_eq!(idx.len(), 1);
        assert!(idx[0].0.contains_key("Name"));
    }
}
