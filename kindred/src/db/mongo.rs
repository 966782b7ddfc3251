//! MongoDB client and collection wrapper

use bson::{doc, oid::ObjectId, DateTime, Document};
use mongodb::{
    options::{IndexOptions, UpdateModifications},
    results::UpdateResult,
    Client, Collection, IndexModel,
};
use serde::{de::DeserializeOwned, Serialize};
use tracing::{error, info};

use crate::db::schemas::Metadata;
use crate::types::KindredError;

/// Trait for schemas that provide index definitions
pub trait IntoIndexes {
    fn into_indices() -> Vec<(Document, Option<IndexOptions>)>;
}

/// Trait for schemas with mutable metadata
pub trait MutMetadata {
    fn mut_metadata(&mut self) -> &mut Metadata;
}

/// MongoDB client wrapper
#[derive(Clone)]
pub struct MongoClient {
    client: Client,
    db_name: String,
}

impl MongoClient {
    /// Connect and ping; fails fast when the server is unreachable
    pub async fn new(uri: &str, db_name: &str) -> Result<Self, KindredError> {
        info!("Connecting to MongoDB at {}", redact_uri(uri));

        let timeout_uri = if uri.contains('?') {
            format!("{}&serverSelectionTimeoutMS=3000&connectTimeoutMS=3000", uri)
        } else {
            format!("{}?serverSelectionTimeoutMS=3000&connectTimeoutMS=3000", uri)
        };

        let client = Client::with_uri_str(&timeout_uri)
            .await
            .map_err(|e| KindredError::Database(format!("Failed to connect to MongoDB: {}", e)))?;

        client
            .database(db_name)
            .run_command(doc! { "ping": 1 })
            .await
            .map_err(|e| KindredError::Database(format!("MongoDB ping failed: {}", e)))?;

        info!("Connected to MongoDB database '{}'", db_name);

        Ok(Self {
            client,
            db_name: db_name.to_string(),
        })
    }

    /// Get a typed collection, applying its indexes
    pub async fn collection<T>(&self, name: &str) -> Result<MongoCollection<T>, KindredError>
    where
        T: Serialize + DeserializeOwned + Unpin + Send + Sync + Default + IntoIndexes + MutMetadata,
    {
        MongoCollection::new(&self.client, &self.db_name, name).await
    }

    pub fn db_name(&self) -> &str {
        &self.db_name
    }
}

/// Typed MongoDB collection honouring soft deletes
#[derive(Debug, Clone)]
pub struct MongoCollection<T>
where
    T: Serialize + DeserializeOwned + Unpin + Send + Sync,
{
    inner: Collection<T>,
}

impl<T> MongoCollection<T>
where
    T: Serialize + DeserializeOwned + Unpin + Send + Sync + Default + IntoIndexes + MutMetadata,
{
    pub async fn new(
        client: &Client,
        db_name: &str,
        collection_name: &str,
    ) -> Result<Self, KindredError> {
        let collection = client.database(db_name).collection::<T>(collection_name);
        let mongo_collection = MongoCollection { inner: collection };
        mongo_collection.apply_indexes().await?;
        Ok(mongo_collection)
    }

    async fn apply_indexes(&self) -> Result<(), KindredError> {
        let schema_indices = T::into_indices();
        if schema_indices.is_empty() {
            return Ok(());
        }

        let indices: Vec<IndexModel> = schema_indices
            .into_iter()
            .map(|(keys, opts)| IndexModel::builder().keys(keys).options(opts).build())
            .collect();

        self.inner
            .create_indexes(indices)
            .await
            .map_err(|e| KindredError::Database(format!("Failed to create indexes: {}", e)))?;

        Ok(())
    }

    /// Insert a document, setting metadata timestamps
    pub async fn insert_one(&self, mut item: T) -> Result<ObjectId, KindredError> {
        stamp_new(item.mut_metadata());

        let result = self
            .inner
            .insert_one(item)
            .await
            .map_err(|e| KindredError::Database(format!("Insert failed: {}", e)))?;

        result
            .inserted_id
            .as_object_id()
            .ok_or_else(|| KindredError::Database("Failed to get inserted ID".into()))
    }

    /// Insert several documents at once
    pub async fn insert_many(&self, items: Vec<T>) -> Result<usize, KindredError> {
        if items.is_empty() {
            return Ok(0);
        }
        let items: Vec<T> = items
            .into_iter()
            .map(|mut item| {
                stamp_new(item.mut_metadata());
                item
            })
            .collect();

        let result = self
            .inner
            .insert_many(items)
            .await
            .map_err(|e| KindredError::Database(format!("Insert failed: {}", e)))?;
        Ok(result.inserted_ids.len())
    }

    /// Find one live document by filter
    pub async fn find_one(&self, filter: Document) -> Result<Option<T>, KindredError> {
        self.inner
            .find_one(live(filter))
            .await
            .map_err(|e| KindredError::Database(format!("Find failed: {}", e)))
    }

    /// Find live documents by filter; unreadable documents are logged and skipped
    pub async fn find_many(&self, filter: Document) -> Result<Vec<T>, KindredError> {
        use futures_util::StreamExt;

        let cursor = self
            .inner
            .find(live(filter))
            .await
            .map_err(|e| KindredError::Database(format!("Find failed: {}", e)))?;

        let results: Vec<T> = cursor
            .filter_map(|doc| async {
                match doc {
                    Ok(d) => Some(d),
                    Err(e) => {
                        error!("Error reading document: {}", e);
                        None
                    }
                }
            })
            .collect()
            .await;

        Ok(results)
    }

    /// Update one live document, bumping `metadata.updated_at`
    pub async fn update_one(
        &self,
        filter: Document,
        update: Document,
    ) -> Result<UpdateResult, KindredError> {
        let mut update = update;
        let set = update
            .entry("$set".to_string())
            .or_insert_with(|| bson::Bson::Document(Document::new()));
        if let bson::Bson::Document(set) = set {
            set.insert("metadata.updated_at", DateTime::now());
        }

        self.inner
            .update_one(live(filter), UpdateModifications::Document(update))
            .await
            .map_err(|e| KindredError::Database(format!("Update failed: {}", e)))
    }

    /// Soft delete one document
    pub async fn soft_delete(&self, filter: Document) -> Result<UpdateResult, KindredError> {
        self.update_one(filter, soft_delete_update()).await
    }

    /// Soft delete every live document
    pub async fn soft_delete_all(&self) -> Result<u64, KindredError> {
        let result = self
            .inner
            .update_many(live(doc! {}), soft_delete_update())
            .await
            .map_err(|e| KindredError::Database(format!("Update failed: {}", e)))?;
        Ok(result.modified_count)
    }
}

fn stamp_new(metadata: &mut Metadata) {
    metadata.reset(DateTime::now());
}

fn live(mut filter: Document) -> Document {
    filter.insert("metadata.is_deleted", doc! { "$ne": true });
    filter
}

fn soft_delete_update() -> Document {
    let now = DateTime::now();
    doc! {
        "$set": {
            "metadata.is_deleted": true,
            "metadata.deleted_at": now,
            "metadata.updated_at": now,
        }
    }
}

/// Strip credentials from a connection string before logging it
pub fn redact_uri(uri: &str) -> String {
    match (uri.find("://"), uri.rfind('@')) {
        (Some(scheme), Some(at)) if at > scheme => {
            format!("{}://***@{}", &uri[..scheme], &uri[at + 1..])
        }
        _ => uri.to_string(),
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_redact_uri() {
        assert_eq!(
            redact_uri("mongodb://user:pw@db:27017/kindred"),
            "mongodb://***@db:27017/kindred"
        );
        assert_eq!(redact_uri("mongodb://localhost:27017"), "mongodb://localhost:27017");
    }

    #[test]
    fn test_live_filter() {
        let filter = live(doc! { "Name": "A" });
        assert!(filter.contains_key("metadata.is_deleted"));
        assert_eq!(filter.get_str("Name").unwrap(), "A");
    }

    #[test]
    fn test_soft_delete_update_sets_flag() {
        let update = soft_delete_update();
        let set = update.get_document("$set").unwrap();
        assert_eq!(set.get_bool("metadata.is_deleted").unwrap(), true);
    }
}
