//! File-backed key/value store holding the client's people snapshot
//!
//! The whole store is one JSON object on disk. Writes replace the file.

use serde_json::{Map, Value};
use std::path::{Path, PathBuf};

use crate::types::Result;

/// Key the full people snapshot lives under
pub const PEOPLE_KEY: &str = "people";

#[derive(Debug, Clone)]
pub struct LocalStore {
    path: PathBuf,
}

impl LocalStore {
    pub fn new(path: impl Into<PathBuf>) -> Self {
        Self { path: path.into() }
    }

    pub fn path(&self) -> &Path {
        &self.path
    }

    async fn load(&self) -> Result<Map<String, Value>> {
        match tokio::fs::read(&self.path).await {
            Ok(raw) if raw.is_empty() => Ok(Map::new()),
            Ok(raw) => match serde_json::from_slice(&raw)? {
                Value::Object(map) => Ok(map),
                _ => Ok(Map::new()),
            },
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => Ok(Map::new()),
            Err(e) => Err(e.into()),
        }
    }

    async fn save(&self, map: Map<String, Value>) -> Result<()> {
        if let Some(parent) = self.path.parent() {
            if !parent.as_os_str().is_empty() {
                tokio::fs::create_dir_all(parent).await?;
            }
        }
        let raw = serde_json::to_vec_pretty(&Value::Object(map))?;
        tokio::fs::write(&self.path, raw).await?;
        Ok(())
    }

    pub async fn get(&self, key: &str) -> Result<Option<Value>> {
        Ok(self.load().await?.remove(key))
    }

    pub async fn set(&self, key: &str, value: Value) -> Result<()> {
        let mut map = self.load().await?;
        map.insert(key.to_string(), value);
        self.save(map).await
    }

    pub async fn remove(&self, key: &str) -> Result<()> {
        let mut map = self.load().await?;
        if map.remove(key).is_some() {
            self.save(map).await?;
        }
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[tokio::test]
    async fn test_set_get_remove() {
        let dir = tempfile::tempdir().unwrap();
        let store = LocalStore::new(dir.path().join("nested").join("cache.json"));

        assert_eq!(store.get(PEOPLE_KEY).await.unwrap(), None);
        store.set(PEOPLE_KEY, json!([{ "Name": "A" }])).await.unwrap();
        store.set("other", json!(1)).await.unwrap();
        assert_eq!(store.get(PEOPLE_KEY).await.unwrap(), Some(json!([{ "Name": "A" }])));

        store.remove(PEOPLE_KEY).await.unwrap();
        assert_eq!(store.get(PEOPLE_KEY).await.unwrap(), None);
        assert_eq!(store.get("other").await.unwrap(), Some(json!(1)));
    }
}
