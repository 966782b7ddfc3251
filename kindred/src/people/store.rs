//! Person storage backends
//!
//! [`PersonStore`] is the seam between the people service and persistence.
//! [`MongoPersonStore`] is the production backend; [`MemoryPersonStore`] backs
//! dev mode and the test suite.

use bson::{doc, oid::ObjectId, Bson, Document};
use tokio::sync::RwLock;
use tracing::debug;

use super::person::{Person, PersonPatch, PersonRecord};
use crate::db::schemas::{PersonDoc, PEOPLE_COLLECTION};
use crate::db::{MongoClient, MongoCollection};
use crate::types::{KindredError, Result};

#[async_trait::async_trait]
pub trait PersonStore: Send + Sync {
    /// Short backend name for health output
    fn kind(&self) -> &'static str;

    async fn list(&self) -> Result<Vec<Person>>;

    async fn get(&self, id: &str) -> Result<Option<Person>>;

    async fn insert(&self, record: PersonRecord) -> Result<Person>;

    /// Apply a partial update; `None` when the person does not exist
    async fn update(&self, id: &str, patch: &PersonPatch) -> Result<Option<Person>>;

    /// Returns whether a person was deleted
    async fn delete(&self, id: &str) -> Result<bool>;

    /// Replace the whole collection, returning the number of people written
    async fn replace_all(&self, records: Vec<PersonRecord>) -> Result<usize>;
}

/// MongoDB-backed store
pub struct MongoPersonStore {
    collection: MongoCollection<PersonDoc>,
}

impl MongoPersonStore {
    pub async fn new(mongo: &MongoClient) -> Result<Self> {
        let collection = mongo.collection::<PersonDoc>(PEOPLE_COLLECTION).await?;
        Ok(Self { collection })
    }
}

/// Parse a hex id; anything else cannot name a stored person
fn id_filter(id: &str) -> Option<Document> {
    ObjectId::parse_str(id).ok().map(|oid| doc! { "_id": oid })
}

/// `$set` / `$unset` document for a patch
pub fn patch_update(patch: &PersonPatch) -> Result<Document> {
    let mut set = Document::new();
    for (key, value) in &patch.set {
        set.insert(key.clone(), bson::to_bson(value)?);
    }
    let mut update = doc! { "$set": set };
    if !patch.unset.is_empty() {
        let unset: Document = patch
            .unset
            .iter()
            .map(|k| (k.clone(), Bson::String(String::new())))
            .collect();
        update.insert("$unset", unset);
    }
    Ok(update)
}

#[async_trait::async_trait]
impl PersonStore for MongoPersonStore {
    fn kind(&self) -> &'static str {
        "mongodb"
    }

    async fn list(&self) -> Result<Vec<Person>> {
        let docs = self.collection.find_many(doc! {}).await?;
        Ok(docs.into_iter().filter_map(PersonDoc::into_person).collect())
    }

    async fn get(&self, id: &str) -> Result<Option<Person>> {
        let Some(filter) = id_filter(id) else {
            return Ok(None);
        };
        let found = self.collection.find_one(filter).await?;
        Ok(found.and_then(PersonDoc::into_person))
    }

    async fn insert(&self, record: PersonRecord) -> Result<Person> {
        let doc = PersonDoc::new(record);
        let record = doc.record.clone();
        let oid = self.collection.insert_one(doc).await?;
        debug!(id = %oid, "Inserted person");
        Ok(Person::new(oid.to_hex(), record))
    }

    async fn update(&self, id: &str, patch: &PersonPatch) -> Result<Option<Person>> {
        let Some(filter) = id_filter(id) else {
            return Ok(None);
        };
        let result = self
            .collection
            .update_one(filter, patch_update(patch)?)
            .await?;
        if result.matched_count == 0 {
            return Ok(None);
        }
        self.get(id).await
    }

    async fn delete(&self, id: &str) -> Result<bool> {
        let Some(filter) = id_filter(id) else {
            return Ok(false);
        };
        let result = self.collection.soft_delete(filter).await?;
        Ok(result.matched_count > 0)
    }

    async fn replace_all(&self, records: Vec<PersonRecord>) -> Result<usize> {
        let removed = self.collection.soft_delete_all().await?;
        debug!(removed, "Cleared people collection");
        let docs = records.into_iter().map(PersonDoc::new).collect();
        self.collection.insert_many(docs).await
    }
}

/// In-memory store for dev mode and tests
#[derive(Default)]
pub struct MemoryPersonStore {
    people: RwLock<Vec<Person>>,
}

impl MemoryPersonStore {
    pub fn new() -> Self {
        Self::default()
    }

    /// Seed with records, assigning fresh ids
    pub fn with_records(records: Vec<PersonRecord>) -> Self {
        let people = records
            .into_iter()
            .map(|mut r| {
                r.sanitize();
                Person::new(ObjectId::new().to_hex(), r)
            })
            .collect();
        Self {
            people: RwLock::new(people),
        }
    }
}

#[async_trait::async_trait]
impl PersonStore for MemoryPersonStore {
    fn kind(&self) -> &'static str {
        "memory"
    }

    async fn list(&self) -> Result<Vec<Person>> {
        Ok(self.people.read().await.clone())
    }

    async fn get(&self, id: &str) -> Result<Option<Person>> {
        Ok(self.people.read().await.iter().find(|p| p.id == id).cloned())
    }

    async fn insert(&self, mut record: PersonRecord) -> Result<Person> {
        record.sanitize();
        let person = Person::new(ObjectId::new().to_hex(), record);
        self.people.write().await.push(person.clone());
        Ok(person)
    }

    async fn update(&self, id: &str, patch: &PersonPatch) -> Result<Option<Person>> {
        let mut people = self.people.write().await;
        let Some(person) = people.iter_mut().find(|p| p.id == id) else {
            return Ok(None);
        };
        person.record.apply(patch)?;
        Ok(Some(person.clone()))
    }

    async fn delete(&self, id: &str) -> Result<bool> {
        let mut people = self.people.write().await;
        let before = people.len();
        people.retain(|p| p.id != id);
        Ok(people.len() != before)
    }

    async fn replace_all(&self, records: Vec<PersonRecord>) -> Result<usize> {
        let fresh = MemoryPersonStore::with_records(records).people.into_inner();
        let count = fresh.len();
        *self.people.write().await = fresh;
        Ok(count)
    }
}

/// Map a missing person to a not-found error
pub fn found(person: Option<Person>, id: &str) -> Result<Person> {
    person.ok_or_else(|| KindredError::NotFound(format!("Person {} not found", id)))
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[tokio::test]
    async fn test_memory_store_crud() {
        let store = MemoryPersonStore::new();
        let created = store.insert(PersonRecord::named("Ann")).await.unwrap();
        assert_eq!(created.id.len(), 24);

        let patch = PersonPatch::from_json(json!({ "District": "Tampines" })).unwrap();
        let updated = store.update(&created.id, &patch).await.unwrap().unwrap();
        assert_eq!(updated.record.district.as_deref(), Some("Tampines"));

        assert!(store.update("missing", &patch).await.unwrap().is_none());
        assert!(store.delete(&created.id).await.unwrap());
        assert!(!store.delete(&created.id).await.unwrap());
        assert!(store.get(&created.id).await.unwrap().is_none());
    }

    #[tokio::test]
    async fn test_memory_store_replace_all() {
        let store = MemoryPersonStore::with_records(vec![PersonRecord::named("Old")]);
        let count = store
            .replace_all(vec![PersonRecord::named("A"), PersonRecord::named("B")])
            .await
            .unwrap();
        assert_eq!(count, 2);
        let names: Vec<String> = store
            .list()
            .await
            .unwrap()
            .iter()
            .map(|p| p.name().to_string())
            .collect();
        assert_eq!(names, vec!["A", "B"]);
    }

    #[test]
    fn test_patch_update_document() {
        let patch = PersonPatch::from_json(json!({ "Name": "A", "gone": null })).unwrap();
        let update = patch_update(&patch).unwrap();
        assert_eq!(update.get_document("$set").unwrap().get_str("Name").unwrap(), "A");
        assert!(update.get_document("$unset").unwrap().contains_key("gone"));

        let only_set = patch_update(&PersonPatch::default()).unwrap();
        assert!(!only_set.contains_key("$unset"));
    }

    #[test]
    fn test_invalid_ids_never_match() {
        assert!(id_filter("not-an-object-id").is_none());
        assert!(id_filter(&ObjectId::new().to_hex()).is_some());
    }
}
