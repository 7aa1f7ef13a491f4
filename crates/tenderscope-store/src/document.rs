//! The storage seam: a keyed JSON document store partitioned by collection.

use async_trait::async_trait;
use serde_json::Value;

use crate::StoreError;

/// Logical collections. Per-user collections key documents as
/// `"{uid}/{id}"` with `/` and `%` escaped in both parts, so a prefix
/// listing returns one user's documents.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub enum Collection {
    Tenders,
    Matches,
    Profiles,
    Favorites,
    SavedSearches,
    Threads,
    Config,
}

impl Collection {
    pub fn as_str(self) -> &'static str {
        match self {
            Self::Tenders => "tenders",
            Self::Matches => "matches",
            Self::Profiles => "profiles",
            Self::Favorites => "favorites",
            Self::SavedSearches => "saved_searches",
            Self::Threads => "threads",
            Self::Config => "config",
        }
    }
}

/// Key/value document storage.
///
/// Implementations must make `put_batch` all-or-nothing.
#[async_trait]
pub trait DocumentStore: Send + Sync {
    async fn get(&self, collection: Collection, id: &str) -> Result<Option<Value>, StoreError>;

    /// Insert or fully replace a document.
    async fn put(&self, collection: Collection, id: &str, doc: Value) -> Result<(), StoreError>;

    /// Insert or replace several documents atomically.
    async fn put_batch(
        &self,
        collection: Collection,
        docs: Vec<(String, Value)>,
    ) -> Result<(), StoreError>;

    /// Returns whether a document was removed.
    async fn delete(&self, collection: Collection, id: &str) -> Result<bool, StoreError>;

    /// Documents whose id starts with `prefix`, ordered by id.
    async fn list(
        &self,
        collection: Collection,
        prefix: &str,
    ) -> Result<Vec<(String, Value)>, StoreError>;
}
