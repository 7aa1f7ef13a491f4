//! Typed repositories over a [`DocumentStore`].

use std::sync::Arc;

use chrono::{DateTime, Utc};
use serde::Serialize;
use serde::de::DeserializeOwned;
use serde_json::Value;
use tracing::debug;
use tenderscope_core::{
    Favorite, MatchScore, Preferences, SavedSearch, SavedSearchInput, TenderRecord, UserProfile,
};

use crate::{Collection, DocumentStore, MemoryStore, StoreError};

/// A summary write for one tender.
#[derive(Debug, Clone, PartialEq)]
pub struct SummaryUpdate {
    pub tender_id: String,
    pub summary_it: Option<String>,
    pub summary_en: Option<String>,
}

/// Entry point for every persisted entity. Cheap to clone.
#[derive(Clone)]
pub struct Repository {
    docs: Arc<dyn DocumentStore>,
}

impl Repository {
    pub fn new(docs: Arc<dyn DocumentStore>) -> Self {
        Self { docs }
    }

    pub fn in_memory() -> Self {
        Self::new(Arc::new(MemoryStore::new()))
    }

    async fn load<T: DeserializeOwned>(
        &self,
        collection: Collection,
        id: &str,
    ) -> Result<Option<T>, StoreError> {
        match self.docs.get(collection, id).await? {
            Some(v) => Ok(Some(serde_json::from_value(v)?)),
            None => Ok(None),
        }
    }

    async fn save<T: Serialize>(
        &self,
        collection: Collection,
        id: &str,
        doc: &T,
    ) -> Result<(), StoreError> {
        self.docs
            .put(collection, id, serde_json::to_value(doc)?)
            .await
    }

    async fn load_all<T: DeserializeOwned>(
        &self,
        collection: Collection,
        prefix: &str,
    ) -> Result<Vec<T>, StoreError> {
        self.docs
            .list(collection, prefix)
            .await?
            .into_iter()
            .map(|(_, v)| serde_json::from_value(v).map_err(StoreError::from))
            .collect()
    }

    // ── Tenders ──

    /// Insert or refresh a pulled tender. Re-pulling keeps `createdAt`,
    /// summaries and the processed flag.
    pub async fn upsert_tender(&self, incoming: TenderRecord) -> Result<TenderRecord, StoreError> {
        let merged = match self.get_tender(&incoming.id).await? {
            Some(existing) => existing.refreshed_from(incoming),
            None => incoming,
        };
        self.save(Collection::Tenders, &merged.id, &merged).await?;
        Ok(merged)
    }

    pub async fn get_tender(&self, id: &str) -> Result<Option<TenderRecord>, StoreError> {
        self.load(Collection::Tenders, id).await
    }

    /// Most recently updated first.
    pub async fn latest_tenders(&self, limit: usize) -> Result<Vec<TenderRecord>, StoreError> {
        let mut all: Vec<TenderRecord> = self.load_all(Collection::Tenders, "").await?;
        all.sort_by(|a, b| b.updated_at.cmp(&a.updated_at));
        all.truncate(limit);
        Ok(all)
    }

    /// Oldest first by creation time.
    pub async fn unprocessed_tenders(&self, limit: usize) -> Result<Vec<TenderRecord>, StoreError> {
        let mut pending: Vec<TenderRecord> = self
            .load_all::<TenderRecord>(Collection::Tenders, "")
            .await?
            .into_iter()
            .filter(|t| !t.processed)
            .collect();
        pending.sort_by(|a, b| a.created_at.cmp(&b.created_at));
        pending.truncate(limit);
        Ok(pending)
    }

    /// Merge summaries into a tender. A tender that was never pulled gets
    /// a bare record so the summary is not lost.
    pub async fn save_tender_summary(
        &self,
        update: SummaryUpdate,
        now: DateTime<Utc>,
    ) -> Result<TenderRecord, StoreError> {
        let record = self.merged_summary(update, now).await?;
        self.save(Collection::Tenders, &record.id, &record).await?;
        Ok(record)
    }

    /// Apply several summary updates as one atomic write and mark each
    /// tender processed.
    pub async fn commit_summaries(
        &self,
        updates: Vec<SummaryUpdate>,
        now: DateTime<Utc>,
    ) -> Result<usize, StoreError> {
        let mut docs: Vec<(String, Value)> = Vec::with_capacity(updates.len());
        for update in updates {
            let mut record = self.merged_summary(update, now).await?;
            record.processed = true;
            docs.push((record.id.clone(), serde_json::to_value(&record)?));
        }
        let n = docs.len();
        self.docs.put_batch(Collection::Tenders, docs).await?;
        debug!(count = n, "committed summary batch");
        Ok(n)
    }

    async fn merged_summary(
        &self,
        update: SummaryUpdate,
        now: DateTime<Utc>,
    ) -> Result<TenderRecord, StoreError> {
        let id = update.tender_id.trim();
        if id.is_empty() {
            return Err(StoreError::Invalid("tenderId must not be empty".into()));
        }
        let mut record = self.get_tender(id).await?.unwrap_or_else(|| TenderRecord {
            id: id.to_string(),
            title: String::new(),
            buyer: String::new(),
            publication_date: None,
            deadline: None,
            cpv: Vec::new(),
            value: None,
            document_url: None,
            summary_it: None,
            summary_en: None,
            processed: false,
            created_at: now,
            updated_at: now,
        });
        record.summary_it = update.summary_it;
        record.summary_en = update.summary_en;
        record.updated_at = now;
        Ok(record)
    }

    // ── Match scores ──

    pub async fn save_match_score(
        &self,
        company_id: &str,
        tender_id: &str,
        score: f64,
        now: DateTime<Utc>,
    ) -> Result<MatchScore, StoreError> {
        if company_id.trim().is_empty() || tender_id.trim().is_empty() {
            return Err(StoreError::Invalid(
                "companyId and tenderId are required".into(),
            ));
        }
        if !(0.0..=1.0).contains(&score) {
            return Err(StoreError::Invalid(format!(
                "score must be between 0 and 1, got {score}"
            )));
        }
        let key = MatchScore::key(company_id, tender_id);
        let created_at = self
            .load::<MatchScore>(Collection::Matches, &key)
            .await?
            .map(|m| m.created_at)
            .unwrap_or(now);
        let doc = MatchScore {
            company_id: company_id.to_string(),
            tender_id: tender_id.to_string(),
            score,
            created_at,
            updated_at: now,
        };
        self.save(Collection::Matches, &key, &doc).await?;
        Ok(doc)
    }

    pub async fn get_match_score(
        &self,
        company_id: &str,
        tender_id: &str,
    ) -> Result<Option<MatchScore>, StoreError> {
        self.load(Collection::Matches, &MatchScore::key(company_id, tender_id))
            .await
    }

    // ── Profiles ──

    pub async fn get_profile(&self, uid: &str) -> Result<Option<UserProfile>, StoreError> {
        self.load(Collection::Profiles, uid).await
    }

    /// Replace every preference field of a profile.
    pub async fn put_profile(
        &self,
        uid: &str,
        preferences: Preferences,
        now: DateTime<Utc>,
    ) -> Result<UserProfile, StoreError> {
        let profile = UserProfile {
            uid: uid.to_string(),
            preferences,
            updated_at: Some(now),
        };
        self.save(Collection::Profiles, uid, &profile).await?;
        Ok(profile)
    }

    /// Profiles that asked for the daily digest and have somewhere to send it.
    pub async fn digest_profiles(&self) -> Result<Vec<UserProfile>, StoreError> {
        Ok(self
            .load_all::<UserProfile>(Collection::Profiles, "")
            .await?
            .into_iter()
            .filter(|p| p.preferences.notify_daily && p.preferences.email.is_some())
            .collect())
    }

    // ── Favorites ──

    /// Add the favorite, or remove it when already present. Returns whether
    /// the tender is a favorite afterwards.
    pub async fn toggle_favorite(
        &self,
        uid: &str,
        tender_id: &str,
        now: DateTime<Utc>,
    ) -> Result<bool, StoreError> {
        if tender_id.trim().is_empty() {
            return Err(StoreError::Invalid("tenderId must not be empty".into()));
        }
        let key = user_key(uid, tender_id);
        if self.docs.delete(Collection::Favorites, &key).await? {
            return Ok(false);
        }
        let fav = Favorite {
            uid: uid.to_string(),
            tender_id: tender_id.to_string(),
            created_at: now,
        };
        self.save(Collection::Favorites, &key, &fav).await?;
        Ok(true)
    }

    /// Newest first.
    pub async fn list_favorites(&self, uid: &str) -> Result<Vec<Favorite>, StoreError> {
        let mut favs: Vec<Favorite> = self
            .load_all::<Favorite>(Collection::Favorites, &user_prefix(uid))
            .await?
            .into_iter()
            .filter(|f| f.uid == uid)
            .collect();
        favs.sort_by(|a, b| b.created_at.cmp(&a.created_at));
        Ok(favs)
    }

    // ── Saved searches ──

    pub async fn upsert_saved_search(
        &self,
        uid: &str,
        input: SavedSearchInput,
        now: DateTime<Utc>,
    ) -> Result<SavedSearch, StoreError> {
        let id = input
            .id
            .clone()
            .filter(|id| !id.trim().is_empty())
            .unwrap_or_else(|| uuid::Uuid::new_v4().to_string());
        let key = user_key(uid, &id);
        let created_at = self
            .load::<SavedSearch>(Collection::SavedSearches, &key)
            .await?
            .map(|s| s.created_at)
            .unwrap_or(now);
        let search = input.into_record(id, uid, created_at, now);
        self.save(Collection::SavedSearches, &key, &search).await?;
        Ok(search)
    }

    /// Most recently updated first.
    pub async fn list_saved_searches(&self, uid: &str) -> Result<Vec<SavedSearch>, StoreError> {
        let mut all: Vec<SavedSearch> = self
            .load_all::<SavedSearch>(Collection::SavedSearches, &user_prefix(uid))
            .await?
            .into_iter()
            .filter(|s| s.uid == uid)
            .collect();
        all.sort_by(|a, b| b.updated_at.cmp(&a.updated_at));
        Ok(all)
    }

    pub async fn delete_saved_search(&self, uid: &str, id: &str) -> Result<bool, StoreError> {
        self.docs
            .delete(Collection::SavedSearches, &user_key(uid, id))
            .await
    }

    // ── Threads and runtime config ──

    /// Restore a conversation checkpoint.
    pub async fn load_thread<T: DeserializeOwned>(&self, id: &str) -> Result<Option<T>, StoreError> {
        self.load(Collection::Threads, id).await
    }

    pub async fn save_thread<T: Serialize + Sync>(&self, id: &str, thread: &T) -> Result<(), StoreError> {
        self.save(Collection::Threads, id, thread).await
    }

    pub async fn get_config<T: DeserializeOwned>(&self, key: &str) -> Result<Option<T>, StoreError> {
        self.load(Collection::Config, key).await
    }

    pub async fn put_config<T: Serialize + Sync>(&self, key: &str, value: &T) -> Result<(), StoreError> {
        self.save(Collection::Config, key, value).await
    }
}

/// Escape a key component so `/` only ever separates uid from id.
fn key_part(s: &str) -> String {
    s.replace('%', "%25").replace('/', "%2F")
}

fn user_prefix(uid: &str) -> String {
    format!("{}/", key_part(uid))
}

fn user_key(uid: &str, id: &str) -> String {
    format!("{}/{}", key_part(uid), key_part(id))
}
