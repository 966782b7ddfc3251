//! People service against the in-memory store

use std::collections::BTreeSet;
use std::sync::Arc;

use bytes::Bytes;
use kindred::images::{ImageHost, ImageUpload};
use kindred::people::{
    MemoryPersonStore, PeopleService, Person, PersonPatch, PersonRecord, PersonStore,
    RelationshipEdge,
};
use kindred::{KindredError, Result};
use serde_json::{json, Value};

fn record(body: Value) -> PersonRecord {
    PersonRecord::from_json(body).unwrap()
}

fn service() -> (Arc<MemoryPersonStore>, PeopleService) {
    let store = Arc::new(MemoryPersonStore::new());
    let service = PeopleService::new(store.clone(), None);
    (store, service)
}

fn edges_to<'a>(person: &'a Person, id: &str) -> Vec<&'a RelationshipEdge> {
    person
        .record
        .relationships()
        .map(|(_, e)| e)
        .filter(|e| e.person_id.as_deref() == Some(id))
        .collect()
}

/// Memory store that refuses updates for a chosen set of ids
struct FlakyStore {
    inner: MemoryPersonStore,
    broken: BTreeSet<String>,
}

#[async_trait::async_trait]
impl PersonStore for FlakyStore {
    fn kind(&self) -> &'static str {
        "flaky"
    }
    async fn list(&self) -> Result<Vec<Person>> {
        self.inner.list().await
    }
    async fn get(&self, id: &str) -> Result<Option<Person>> {
        self.inner.get(id).await
    }
    async fn insert(&self, record: PersonRecord) -> Result<Person> {
        self.inner.insert(record).await
    }
    async fn update(&self, id: &str, patch: &PersonPatch) -> Result<Option<Person>> {
        if self.broken.contains(id) {
            return Err(KindredError::Database("write refused".into()));
        }
        self.inner.update(id, patch).await
    }
    async fn delete(&self, id: &str) -> Result<bool> {
        self.inner.delete(id).await
    }
    async fn replace_all(&self, records: Vec<PersonRecord>) -> Result<usize> {
        self.inner.replace_all(records).await
    }
}

struct FixedHost(&'static str);

#[async_trait::async_trait]
impl ImageHost for FixedHost {
    async fn upload(&self, _image: ImageUpload) -> Result<String> {
        Ok(self.0.to_string())
    }
}

struct DownHost;

#[async_trait::async_trait]
impl ImageHost for DownHost {
    async fn upload(&self, _image: ImageUpload) -> Result<String> {
        Err(KindredError::Upstream("image host returned 500".into()))
    }
}

fn png() -> ImageUpload {
    ImageUpload {
        file_name: "me.png".into(),
        content_type: Some("image/png".into()),
        bytes: Bytes::from_static(b"\x89PNG\r\n"),
    }
}

#[tokio::test]
async fn test_create_resolves_name_and_writes_reciprocal() {
    let (store, service) = service();
    let ben = service.create(record(json!({ "Name": "Ben" }))).await.unwrap().person;

    let saved = service
        .create(record(json!({
            "Name": "Alex",
            "Gender": "male",
            "dad": { "value": "  ben ", "value2": "Father", "value3": "" }
        })))
        .await
        .unwrap();

    let edge = edges_to(&saved.person, &ben.id);
    assert_eq!(edge.len(), 1);
    assert_eq!(edge[0].value3, "Son");
    assert_eq!(saved.propagation.updated, vec![ben.id.clone()]);
    assert!(saved.propagation.failed.is_empty());

    let ben_after = store.get(&ben.id).await.unwrap().unwrap();
    let back = edges_to(&ben_after, &saved.person.id);
    assert_eq!(back.len(), 1);
    assert_eq!(back[0].value2, "Son");
    assert_eq!(back[0].value3, "Father");
    assert_eq!(back[0].value, "Alex");
}

#[tokio::test]
async fn test_update_removing_edge_detaches_neighbour() {
    let (store, service) = service();
    let ben = service.create(record(json!({ "Name": "Ben" }))).await.unwrap().person;
    let alex = service
        .create(record(json!({
            "Name": "Alex",
            "bro": { "value": "Ben", "value2": "Brother", "value3": "Brother", "personId": ben.id }
        })))
        .await
        .unwrap()
        .person;
    assert_eq!(edges_to(&store.get(&ben.id).await.unwrap().unwrap(), &alex.id).len(), 1);

    let patch = PersonPatch::from_json(json!({ "bro": null })).unwrap();
    let saved = service.update(&alex.id, patch).await.unwrap();

    assert_eq!(saved.person.record.relationships().count(), 0);
    let ben_after = store.get(&ben.id).await.unwrap().unwrap();
    assert!(edges_to(&ben_after, &alex.id).is_empty());
}

#[tokio::test]
async fn test_update_relabels_reciprocal() {
    let (store, service) = service();
    let kim = service.create(record(json!({ "Name": "Kim" }))).await.unwrap().person;
    let pat = service
        .create(record(json!({
            "Name": "Pat",
            "k": { "value": "Kim", "value2": "Friend", "value3": "Friend", "personId": kim.id }
        })))
        .await
        .unwrap()
        .person;

    let patch = PersonPatch::from_json(json!({
        "k": { "value": "Kim", "value2": "Cousin", "value3": "Cousin", "personId": kim.id }
    }))
    .unwrap();
    service.update(&pat.id, patch).await.unwrap();

    let kim_after = store.get(&kim.id).await.unwrap().unwrap();
    let back = edges_to(&kim_after, &pat.id);
    assert_eq!(back.len(), 1);
    assert_eq!(back[0].value2, "Cousin");
}

#[tokio::test]
async fn test_invalid_relation_is_rejected_before_write() {
    let (store, service) = service();
    let ben = service.create(record(json!({ "Name": "Ben" }))).await.unwrap().person;

    let err = service
        .create(record(json!({
            "Name": "Alex",
            "r": { "value": "Ben", "value2": "Nemesis", "value3": "", "personId": ben.id }
        })))
        .await
        .unwrap_err();

    match err {
        KindredError::Validation(fields) => assert!(fields.get("r").is_some()),
        other => panic!("expected validation error, got {other:?}"),
    }
    assert_eq!(store.list().await.unwrap().len(), 1);
}

#[tokio::test]
async fn test_update_missing_person_is_not_found() {
    let (_, service) = service();
    let patch = PersonPatch::default().with("District", json!("North"));
    let err = service.update("0123456789abcdef01234567", patch).await.unwrap_err();
    assert_eq!(err.status_code(), 404);
}

#[tokio::test]
async fn test_delete_detaches_reciprocals() {
    let (store, service) = service();
    let dee = service.create(record(json!({ "Name": "Dee" }))).await.unwrap().person;
    let cal = service
        .create(record(json!({
            "Name": "Cal",
            "sis": { "value": "Dee", "value2": "Sister", "value3": "Brother", "personId": dee.id }
        })))
        .await
        .unwrap()
        .person;

    let report = service.delete(&cal.id).await.unwrap();
    assert_eq!(report.updated, vec![dee.id.clone()]);

    assert!(store.get(&cal.id).await.unwrap().is_none());
    let dee_after = store.get(&dee.id).await.unwrap().unwrap();
    assert_eq!(dee_after.record.relationships().count(), 0);

    assert_eq!(service.delete(&cal.id).await.unwrap_err().status_code(), 404);
}

#[tokio::test]
async fn test_failed_neighbour_write_keeps_subject() {
    let inner = MemoryPersonStore::new();
    let ben = inner.insert(record(json!({ "Name": "Ben" }))).await.unwrap();
    let store = Arc::new(FlakyStore {
        inner,
        broken: BTreeSet::from([ben.id.clone()]),
    });
    let service = PeopleService::new(store.clone(), None);

    let saved = service
        .create(record(json!({
            "Name": "Alex",
            "b": { "value": "Ben", "value2": "Friend", "value3": "Friend", "personId": ben.id }
        })))
        .await
        .unwrap();

    assert_eq!(saved.propagation.failed, vec![ben.id.clone()]);
    assert!(store.get(&saved.person.id).await.unwrap().is_some());
    let ben_after = store.get(&ben.id).await.unwrap().unwrap();
    assert_eq!(ben_after.record.relationships().count(), 0);
}

#[tokio::test]
async fn test_list_search_matches_either_name() {
    let (_, service) = service();
    service
        .create(record(json!({ "Name": "Wong Tai", "NameChi": "黃大" })))
        .await
        .unwrap();
    service.create(record(json!({ "Name": "Lee Ming" }))).await.unwrap();

    assert_eq!(service.list(None).await.unwrap().len(), 2);
    assert_eq!(service.list(Some("WONG")).await.unwrap().len(), 1);
    assert_eq!(service.list(Some("黃")).await.unwrap().len(), 1);
    assert_eq!(service.list(Some("  ")).await.unwrap().len(), 2);
    assert!(service.list(Some("nobody")).await.unwrap().is_empty());
}

#[tokio::test]
async fn test_upload_requires_configured_host() {
    let (_, service) = service();
    let alex = service.create(record(json!({ "Name": "Alex" }))).await.unwrap().person;
    let err = service.upload_profile_pic(&alex.id, png()).await.unwrap_err();
    assert_eq!(err.status_code(), 503);
}

#[tokio::test]
async fn test_upload_stores_url() {
    let store = Arc::new(MemoryPersonStore::new());
    let service = PeopleService::new(
        store.clone(),
        Some(Arc::new(FixedHost("https://img.example/alex.png"))),
    );
    let alex = service.create(record(json!({ "Name": "Alex" }))).await.unwrap().person;

    let (url, person) = service.upload_profile_pic(&alex.id, png()).await.unwrap();
    assert_eq!(url, "https://img.example/alex.png");
    assert_eq!(person.record.profile_pic.as_deref(), Some(url.as_str()));

    let err = service.upload_profile_pic("missing", png()).await.unwrap_err();
    assert_eq!(err.status_code(), 404);
}

#[tokio::test]
async fn test_failed_upload_leaves_person_untouched() {
    let store = Arc::new(MemoryPersonStore::new());
    let service = PeopleService::new(store.clone(), Some(Arc::new(DownHost)));
    let alex = service.create(record(json!({ "Name": "Alex" }))).await.unwrap().person;

    let err = service.upload_profile_pic(&alex.id, png()).await.unwrap_err();
    assert_eq!(err.status_code(), 502);
    assert!(store.get(&alex.id).await.unwrap().unwrap().record.profile_pic.is_none());
}

#[tokio::test]
async fn test_reseed_replaces_everyone() {
    let (_, service) = service();
    service.create(record(json!({ "Name": "Old" }))).await.unwrap();

    let count = service
        .reseed(vec![record(json!({ "Name": "New 1" })), record(json!({ "Name": "New 2" }))])
        .await
        .unwrap();

    assert_eq!(count, 2);
    let names: Vec<String> = service
        .list(None)
        .await
        .unwrap()
        .iter()
        .map(|p| p.name().to_string())
        .collect();
    assert_eq!(names, vec!["New 1", "New 2"]);
}

#[tokio::test]
async fn test_person_without_edges_reloads_without_edges() {
    let (_, service) = service();
    let saved = service
        .create(record(json!({ "Name": "Solo", "Hobby": "Go", "Contact": 98765432 })))
        .await
        .unwrap();
    assert!(saved.propagation.updated.is_empty());

    let reloaded = service.get(&saved.person.id).await.unwrap();
    assert_eq!(reloaded.record.relationships().count(), 0);
    assert_eq!(reloaded.record.custom_fields().count(), 1);
    assert_eq!(reloaded.record.contact.as_deref(), Some("98765432"));
}
