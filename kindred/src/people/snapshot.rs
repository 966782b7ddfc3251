//! Full-collection people snapshot
//!
//! Holds one copy of every person, cleared after each mutation and reloaded
//! lazily on the next read. There is no partial invalidation.

use std::sync::Arc;
use tokio::sync::RwLock;
use tracing::debug;

use super::person::Person;
use super::store::PersonStore;
use crate::types::Result;

#[derive(Default)]
pub struct PeopleSnapshot {
    people: RwLock<Option<Arc<Vec<Person>>>>,
}

impl PeopleSnapshot {
    pub fn new() -> Self {
        Self::default()
    }

    /// Current snapshot, loading it from the store when cleared
    pub async fn get(&self, store: &dyn PersonStore) -> Result<Arc<Vec<Person>>> {
        if let Some(people) = self.people.read().await.as_ref() {
            return Ok(Arc::clone(people));
        }

        let mut slot = self.people.write().await;
        if let Some(people) = slot.as_ref() {
            return Ok(Arc::clone(people));
        }
        let people = Arc::new(store.list().await?);
        debug!(count = people.len(), "Loaded people snapshot");
        *slot = Some(Arc::clone(&people));
        Ok(people)
    }

    pub async fn invalidate(&self) {
        *self.people.write().await = None;
    }

    pub async fn is_loaded(&self) -> bool {
        self.people.read().await.is_some()
    }
}
