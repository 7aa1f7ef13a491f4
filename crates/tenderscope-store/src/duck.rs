//! DuckDB backend: every collection lives in one `documents` table keyed by
//! `(collection, id)`, with the JSON body stored as text.

use std::path::Path;
use std::sync::{Arc, Mutex, MutexGuard};

use async_trait::async_trait;
use duckdb::{Connection, OptionalExt, params};
use serde_json::Value;
use tracing::info;

use crate::{Collection, DocumentStore, StoreError};

const SCHEMA: &str = "CREATE TABLE IF NOT EXISTS documents (
    collection VARCHAR NOT NULL,
    id VARCHAR NOT NULL,
    body VARCHAR NOT NULL,
    PRIMARY KEY (collection, id)
)";

const UPSERT: &str = "INSERT OR REPLACE INTO documents (collection, id, body) VALUES (?, ?, ?)";

/// Supports both in-memory (ephemeral) and persistent (file-backed) modes.
/// Use [`open`](Self::open) for in-memory and
/// [`open_persistent`](Self::open_persistent) for storage that survives
/// process restarts.
///
/// DuckDB calls block, so every trait method runs on tokio's blocking pool.
pub struct DuckStore {
    conn: Arc<Mutex<Connection>>,
}

impl DuckStore {
    /// Open an in-memory DuckDB database.
    pub fn open() -> Result<Self, StoreError> {
        Self::init(Connection::open_in_memory()?)
    }

    /// Open or create a persistent DuckDB database at the given path.
    pub fn open_persistent(path: &Path) -> Result<Self, StoreError> {
        let store = Self::init(Connection::open(path)?)?;
        info!(path = %path.display(), "opened document store");
        Ok(store)
    }

    fn init(conn: Connection) -> Result<Self, StoreError> {
        conn.execute_batch(SCHEMA)?;
        Ok(Self {
            conn: Arc::new(Mutex::new(conn)),
        })
    }

    fn lock(&self) -> Result<MutexGuard<'_, Connection>, StoreError> {
        lock(&self.conn)
    }

    async fn blocking<T, F>(&self, f: F) -> Result<T, StoreError>
    where
        F: FnOnce(&mut Connection) -> Result<T, StoreError> + Send + 'static,
        T: Send + 'static,
    {
        let conn = Arc::clone(&self.conn);
        tokio::task::spawn_blocking(move || {
            let mut guard = lock(&conn)?;
            f(&mut guard)
        })
            .await
            .map_err(|e| StoreError::Other(format!("store task failed: {e}")))?
    }

    /// Number of stored documents in a collection.
    pub fn count(&self, collection: Collection) -> Result<usize, StoreError> {
        let conn = self.lock()?;
        let n: i64 = conn.query_row(
            "SELECT count(*)::BIGINT FROM documents WHERE collection = ?",
            params![collection.as_str()],
            |row| row.get(0),
        )?;
        Ok(n as usize)
    }
}

fn lock(conn: &Mutex<Connection>) -> Result<MutexGuard<'_, Connection>, StoreError> {
    conn.lock()
        .map_err(|e| StoreError::Other(format!("mutex poisoned: {e}")))
}

#[async_trait]
impl DocumentStore for DuckStore {
    async fn get(&self, collection: Collection, id: &str) -> Result<Option<Value>, StoreError> {
        let id = id.to_string();
        let body: Option<String> = self
            .blocking(move |conn| {
                Ok(conn
                    .query_row(
                        "SELECT body FROM documents WHERE collection = ? AND id = ?",
                        params![collection.as_str(), id],
                        |row| row.get(0),
                    )
                    .optional()?)
            })
            .await?;
        body.map(|b| serde_json::from_str(&b).map_err(StoreError::from))
            .transpose()
    }

    async fn put(&self, collection: Collection, id: &str, doc: Value) -> Result<(), StoreError> {
        let body = serde_json::to_string(&doc)?;
        let id = id.to_string();
        self.blocking(move |conn| {
            conn.execute(UPSERT, params![collection.as_str(), id, body])?;
            Ok(())
        })
        .await
    }

    async fn put_batch(
        &self,
        collection: Collection,
        docs: Vec<(String, Value)>,
    ) -> Result<(), StoreError> {
        let bodies = docs
            .into_iter()
            .map(|(id, doc)| Ok((id, serde_json::to_string(&doc)?)))
            .collect::<Result<Vec<_>, StoreError>>()?;

        self.blocking(move |conn| {
            let tx = conn.transaction()?;
            for (id, body) in &bodies {
                tx.execute(UPSERT, params![collection.as_str(), id, body])?;
            }
            tx.commit()?;
            Ok(())
        })
        .await
    }

    async fn delete(&self, collection: Collection, id: &str) -> Result<bool, StoreError> {
        let id = id.to_string();
        self.blocking(move |conn| {
            let n = conn.execute(
                "DELETE FROM documents WHERE collection = ? AND id = ?",
                params![collection.as_str(), id],
            )?;
            Ok(n > 0)
        })
        .await
    }

    async fn list(
        &self,
        collection: Collection,
        prefix: &str,
    ) -> Result<Vec<(String, Value)>, StoreError> {
        let prefix = prefix.to_string();
        let rows: Vec<(String, String)> = self
            .blocking(move |conn| {
                let mut stmt = conn.prepare(
                    "SELECT id, body FROM documents
                     WHERE collection = ? AND starts_with(id, ?)
                     ORDER BY id",
                )?;
                let rows = stmt
                    .query_map(params![collection.as_str(), prefix], |row| {
                        Ok((row.get(0)?, row.get(1)?))
                    })?
                    .collect::<Result<_, _>>()?;
                Ok(rows)
            })
            .await?;
        rows.into_iter()
            .map(|(id, body)| Ok((id, serde_json::from_str(&body)?)))
            .collect()
    }
}
