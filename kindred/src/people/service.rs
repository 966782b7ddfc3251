//! People service: CRUD plus reciprocal propagation
//!
//! Every write goes to the store first. Propagation runs afterwards against
//! a freshly loaded snapshot; its neighbour writes are issued concurrently,
//! failures are logged and never rolled back or reported as request errors.

use futures::future::join_all;
use serde::{Deserialize, Serialize};
use std::sync::Arc;
use tracing::{debug, info, warn};

use super::person::{names_match, Person, PersonId, PersonPatch, PersonRecord, PROFILE_PIC_KEY};
use super::snapshot::PeopleSnapshot;
use super::store::{found, PersonStore};
use crate::images::{ImageHost, ImageUpload};
use crate::relations::{
    fill_reciprocals, plan_detach, plan_propagation, resolve_gender, validate_record,
    PropagationInput, PropagationPlan,
};
use crate::types::{KindredError, Result};

/// What propagation did for one request
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct PropagationReport {
    pub updated: Vec<PersonId>,
    pub failed: Vec<PersonId>,
    pub skipped: usize,
}

/// A written person and the propagation it triggered
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Saved {
    pub person: Person,
    #[serde(default)]
    pub propagation: PropagationReport,
}

pub struct PeopleService {
    store: Arc<dyn PersonStore>,
    snapshot: PeopleSnapshot,
    images: Option<Arc<dyn ImageHost>>,
}

impl PeopleService {
    pub fn new(store: Arc<dyn PersonStore>, images: Option<Arc<dyn ImageHost>>) -> Self {
        Self {
            store,
            snapshot: PeopleSnapshot::new(),
            images,
        }
    }

    pub fn store_kind(&self) -> &'static str {
        self.store.kind()
    }

    pub fn images_enabled(&self) -> bool {
        self.images.is_some()
    }

    /// Everyone, optionally filtered by a case-insensitive name substring
    pub async fn list(&self, search: Option<&str>) -> Result<Vec<Person>> {
        let people = self.snapshot.get(self.store.as_ref()).await?;
        let needle = search.map(|s| s.trim().to_lowercase()).unwrap_or_default();
        if needle.is_empty() {
            return Ok((*people).clone());
        }
        Ok(people
            .iter()
            .filter(|p| {
                let r = &p.record;
                [r.name.as_deref(), r.name_chi.as_deref()]
                    .into_iter()
                    .flatten()
                    .any(|n| n.to_lowercase().contains(&needle))
            })
            .cloned()
            .collect())
    }

    pub async fn get(&self, id: &str) -> Result<Person> {
        let people = self.snapshot.get(self.store.as_ref()).await?;
        let person = people.iter().find(|p| p.id == id).cloned();
        found(person, id)
    }

    /// Whether a person with this id exists in the store
    pub async fn exists(&self, id: &str) -> Result<bool> {
        Ok(self.store.get(id).await?.is_some())
    }

    pub async fn create(&self, mut record: PersonRecord) -> Result<Saved> {
        let people = self.snapshot.get(self.store.as_ref()).await?;
        normalize(&mut record, "", &people)?;

        let person = self.store.insert(record).await?;
        info!(id = %person.id, name = %person.name(), "Created person");
        self.snapshot.invalidate().await;

        self.propagate(person, &PersonRecord::default()).await
    }

    pub async fn update(&self, id: &str, patch: PersonPatch) -> Result<Saved> {
        let people = self.snapshot.get(self.store.as_ref()).await?;
        let prior = found(people.iter().find(|p| p.id == id).cloned(), id)?;

        let mut candidate = prior.record.clone();
        candidate.apply(&patch)?;
        normalize(&mut candidate, id, &people)?;

        let write = store_patch(&patch, &prior.record, &candidate);
        let person = found(self.store.update(id, &write).await?, id)?;
        info!(id = %id, set = write.set.len(), unset = write.unset.len(), "Updated person");
        self.snapshot.invalidate().await;

        self.propagate(person, &prior.record).await
    }

    /// Delete a person and detach the reciprocal edges pointing at them
    pub async fn delete(&self, id: &str) -> Result<PropagationReport> {
        let prior = found(self.store.get(id).await?, id)?;
        if !self.store.delete(id).await? {
            return Err(KindredError::NotFound(format!("Person {} not found", id)));
        }
        info!(id = %id, name = %prior.name(), "Deleted person");
        self.snapshot.invalidate().await;

        let people = self.snapshot.get(self.store.as_ref()).await?;
        let plan = plan_detach(&prior, &people);
        let report = self.apply(plan).await;
        self.snapshot.invalidate().await;
        Ok(report)
    }

    /// Upload a profile picture and store its URL on the person
    pub async fn upload_profile_pic(
        &self,
        id: &str,
        image: ImageUpload,
    ) -> Result<(String, Person)> {
        let Some(images) = &self.images else {
            return Err(KindredError::Unavailable(
                "Image hosting is not configured".to_string(),
            ));
        };
        if self.store.get(id).await?.is_none() {
            return Err(KindredError::NotFound(format!("Person {} not found", id)));
        }

        let url = images.upload(image).await?;
        let patch =
            PersonPatch::default().with(PROFILE_PIC_KEY, serde_json::Value::String(url.clone()));
        let person = found(self.store.update(id, &patch).await?, id)?;
        info!(id = %id, "Stored profile picture");
        self.snapshot.invalidate().await;
        Ok((url, person))
    }

    /// Replace the whole directory
    pub async fn reseed(&self, records: Vec<PersonRecord>) -> Result<usize> {
        let count = self.store.replace_all(records).await?;
        self.snapshot.invalidate().await;
        Ok(count)
    }

    /// Plan and apply propagation for a freshly written subject
    async fn propagate(&self, subject: Person, prior: &PersonRecord) -> Result<Saved> {
        let people = self.snapshot.get(self.store.as_ref()).await?;
        let plan = plan_propagation(PropagationInput {
            subject: &subject,
            prior,
            people: &people,
            stamp: chrono::Utc::now().timestamp_millis(),
        });

        let refreshed = plan.update_for(&subject.id).map(|u| u.record.clone());
        let propagation = self.apply(plan).await;
        self.snapshot.invalidate().await;

        let mut person = subject;
        if let Some(record) = refreshed {
            if !propagation.failed.contains(&person.id) {
                person.record = record;
            }
        }
        Ok(Saved {
            person,
            propagation,
        })
    }

    /// Issue every planned write concurrently; failures are logged only
    async fn apply(&self, plan: PropagationPlan) -> PropagationReport {
        let mut report = PropagationReport {
            skipped: plan.skipped.len(),
            ..Default::default()
        };
        if plan.is_empty() {
            return report;
        }

        let writes = plan.updates.iter().map(|u| async move {
            let result = self.store.update(&u.id, &u.patch).await;
            (u, result)
        });

        for (update, result) in join_all(writes).await {
            match result {
                Ok(Some(_)) => {
                    debug!(
                        id = %update.id,
                        written = update.edges_written,
                        removed = update.edges_removed,
                        "Propagated relationship changes"
                    );
                    report.updated.push(update.id.clone());
                }
                Ok(None) => {
                    warn!(id = %update.id, "Propagation target disappeared");
                    report.failed.push(update.id.clone());
                }
                Err(e) => {
                    warn!(id = %update.id, error = %e, "Propagation write failed");
                    report.failed.push(update.id.clone());
                }
            }
        }
        report
    }
}

/// Backfill edge ids, fill inferable reciprocals, then validate
pub fn normalize(record: &mut PersonRecord, self_id: &str, people: &[Person]) -> Result<()> {
    record.sanitize();
    backfill_person_ids(record, people);

    let me = Person::new(self_id, record.clone());
    let gender = resolve_gender(&me, people);
    fill_reciprocals(record, gender);

    let errors = validate_record(record, gender);
    if errors.is_empty() {
        Ok(())
    } else {
        Err(KindredError::Validation(errors))
    }
}

/// Resolve name-only edges whose name matches exactly one person
fn backfill_person_ids(record: &mut PersonRecord, people: &[Person]) {
    let keys: Vec<String> = record
        .relationships()
        .filter(|(_, e)| e.person_id.is_none() && !e.value.trim().is_empty())
        .map(|(k, _)| k.clone())
        .collect();

    for key in keys {
        let Some(edge) = record.edge_mut(&key) else {
            continue;
        };
        let name = edge.value.clone();
        let mut matches = people.iter().filter(|p| names_match(&name, p.name()));
        match (matches.next(), matches.next()) {
            (Some(target), None) => {
                debug!(key = %key, target = %target.id, "Resolved relationship by name");
                edge.person_id = Some(target.id.clone());
            }
            (Some(_), Some(_)) => {
                warn!(key = %key, name = %name, "Relationship name matches several people");
            }
            (None, _) => {}
        }
    }
}

/// The user's patch plus any attribute normalization changed
fn store_patch(patch: &PersonPatch, prior: &PersonRecord, candidate: &PersonRecord) -> PersonPatch {
    let mut write = patch.clone();
    for (key, attr) in &candidate.attributes {
        if write.set.contains_key(key) || prior.attributes.get(key) != Some(attr) {
            write.set.insert(key.clone(), attr.to_value());
        }
    }
    write
}
