//! In-process backend. The default when no database path is configured.

use std::collections::BTreeMap;
use std::sync::RwLock;

use async_trait::async_trait;
use serde_json::Value;

use crate::{Collection, DocumentStore, StoreError};

type Docs = BTreeMap<(Collection, String), Value>;

#[derive(Debug, Default)]
pub struct MemoryStore {
    docs: RwLock<Docs>,
}

impl MemoryStore {
    pub fn new() -> Self {
        Self::default()
    }

    fn read(&self) -> Result<std::sync::RwLockReadGuard<'_, Docs>, StoreError> {
        self.docs
            .read()
            .map_err(|e| StoreError::Other(format!("lock poisoned: {e}")))
    }

    fn write(&self) -> Result<std::sync::RwLockWriteGuard<'_, Docs>, StoreError> {
        self.docs
            .write()
            .map_err(|e| StoreError::Other(format!("lock poisoned: {e}")))
    }
}

#[async_trait]
impl DocumentStore for MemoryStore {
    async fn get(&self, collection: Collection, id: &str) -> Result<Option<Value>, StoreError> {
        Ok(self.read()?.get(&(collection, id.to_string())).cloned())
    }

    async fn put(&self, collection: Collection, id: &str, doc: Value) -> Result<(), StoreError> {
        self.write()?.insert((collection, id.to_string()), doc);
        Ok(())
    }

    async fn put_batch(
        &self,
        collection: Collection,
        docs: Vec<(String, Value)>,
    ) -> Result<(), StoreError> {
        // One guard for the whole batch: readers never see a partial write.
        let mut guard = self.write()?;
        for (id, doc) in docs {
            guard.insert((collection, id), doc);
        }
        Ok(())
    }

    async fn delete(&self, collection: Collection, id: &str) -> Result<bool, StoreError> {
        Ok(self.write()?.remove(&(collection, id.to_string())).is_some())
    }

    async fn list(
        &self,
        collection: Collection,
        prefix: &str,
    ) -> Result<Vec<(String, Value)>, StoreError> {
        let guard = self.read()?;
        Ok(guard
            .range((collection, prefix.to_string())..)
            .take_while(|((c, id), _)| *c == collection && id.starts_with(prefix))
            .map(|((_, id), doc)| (id.clone(), doc.clone()))
            .collect())
    }
}
