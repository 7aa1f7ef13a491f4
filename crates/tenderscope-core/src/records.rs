//! Persisted entities other than the user profile.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use crate::notice::NormalizedNotice;
use crate::query::{DEFAULT_COUNTRY, DEFAULT_DAYS_BACK};

/// A tender kept by the pull job, keyed by publication number.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct TenderRecord {
    pub id: String,
    pub title: String,
    pub buyer: String,
    #[serde(default)]
    pub publication_date: Option<String>,
    #[serde(default)]
    pub deadline: Option<String>,
    #[serde(default)]
    pub cpv: Vec<String>,
    #[serde(default)]
    pub value: Option<f64>,
    #[serde(default)]
    pub document_url: Option<String>,
    #[serde(default)]
    pub summary_it: Option<String>,
    #[serde(default)]
    pub summary_en: Option<String>,
    #[serde(default)]
    pub processed: bool,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

impl TenderRecord {
    /// A fresh, unprocessed record. Returns `None` when the notice carries
    /// no publication number.
    pub fn from_notice(notice: &NormalizedNotice, now: DateTime<Utc>) -> Option<Self> {
        let id = notice.publication_number.trim();
        if id.is_empty() {
            return None;
        }
        Some(Self {
            id: id.to_string(),
            title: notice.title.clone(),
            buyer: notice.buyer.clone(),
            publication_date: notice.publication_date.clone(),
            deadline: notice.deadline_date.clone(),
            cpv: notice.cpv_all.clone(),
            value: notice.value,
            document_url: notice.document_url.clone(),
            summary_it: None,
            summary_en: None,
            processed: false,
            created_at: now,
            updated_at: now,
        })
    }

    /// Fold a re-pulled copy into an existing record. Notice metadata is
    /// refreshed; creation time, summaries and the processed flag stay.
    pub fn refreshed_from(mut self, incoming: TenderRecord) -> Self {
        self.title = incoming.title;
        self.buyer = incoming.buyer;
        self.publication_date = incoming.publication_date;
        self.deadline = incoming.deadline;
        self.cpv = incoming.cpv;
        self.value = incoming.value;
        self.document_url = incoming.document_url;
        self.updated_at = incoming.updated_at;
        self
    }
}

/// A company/tender relevance score in `[0, 1]`.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct MatchScore {
    pub company_id: String,
    pub tender_id: String,
    pub score: f64,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

impl MatchScore {
    pub fn key(company_id: &str, tender_id: &str) -> String {
        format!("{company_id}_{tender_id}")
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Favorite {
    pub uid: String,
    pub tender_id: String,
    pub created_at: DateTime<Utc>,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct SavedSearch {
    pub id: String,
    pub uid: String,
    pub country: String,
    pub days_back: u32,
    #[serde(default)]
    pub cpv: Vec<String>,
    #[serde(default)]
    pub text: Option<String>,
    #[serde(default)]
    pub min_value: Option<f64>,
    #[serde(default)]
    pub regions: Vec<String>,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

/// Body of a saved-search write. An `id` updates in place.
#[derive(Debug, Clone, Default, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct SavedSearchInput {
    pub id: Option<String>,
    pub country: Option<String>,
    pub days_back: Option<u32>,
    #[serde(default)]
    pub cpv: Vec<String>,
    pub text: Option<String>,
    pub min_value: Option<f64>,
    #[serde(default)]
    pub regions: Vec<String>,
}

impl SavedSearchInput {
    pub fn into_record(
        self,
        id: String,
        uid: &str,
        created_at: DateTime<Utc>,
        now: DateTime<Utc>,
    ) -> SavedSearch {
        SavedSearch {
            id,
            uid: uid.to_string(),
            country: self
                .country
                .filter(|c| !c.trim().is_empty())
                .unwrap_or_else(|| DEFAULT_COUNTRY.to_string()),
            days_back: self.days_back.unwrap_or(DEFAULT_DAYS_BACK),
            cpv: self.cpv,
            text: self.text.filter(|t| !t.trim().is_empty()),
            min_value: self.min_value.map(|v| v.max(0.0)),
            regions: self.regions,
            created_at,
            updated_at: now,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::notice::{RawNotice, normalize_notice};
    use serde_json::json;

    fn notice(number: serde_json::Value) -> NormalizedNotice {
        normalize_notice(&RawNotice::new(json!({
            "publication-number": number,
            "notice-title": {"ita": "Lavori stradali"},
            "classification-cpv": ["45233140", "45000000"]
        })))
    }

    #[test]
    fn record_requires_publication_number() {
        assert!(TenderRecord::from_notice(&notice(json!("")), Utc::now()).is_none());
        let rec = TenderRecord::from_notice(&notice(json!("77-2025")), Utc::now()).unwrap();
        assert_eq!(rec.id, "77-2025");
        assert_eq!(rec.cpv.len(), 2);
        assert!(!rec.processed);
    }

    #[test]
    fn refresh_keeps_created_and_summaries() {
        let t0 = DateTime::parse_from_rfc3339("2025-01-01T00:00:00Z").unwrap().with_timezone(&Utc);
        let t1 = DateTime::parse_from_rfc3339("2025-01-02T00:00:00Z").unwrap().with_timezone(&Utc);
        let mut existing = TenderRecord::from_notice(&notice(json!("1")), t0).unwrap();
        existing.summary_it = Some("riassunto".into());
        existing.processed = true;

        let mut incoming = TenderRecord::from_notice(&notice(json!("1")), t1).unwrap();
        incoming.title = "Lavori stradali (rettifica)".into();

        let merged = existing.refreshed_from(incoming);
        assert_eq!(merged.created_at, t0);
        assert_eq!(merged.updated_at, t1);
        assert_eq!(merged.title, "Lavori stradali (rettifica)");
        assert_eq!(merged.summary_it.as_deref(), Some("riassunto"));
        assert!(merged.processed);
    }

    #[test]
    fn match_key() {
        assert_eq!(MatchScore::key("acme", "123-2025"), "acme_123-2025");
    }

    #[test]
    fn saved_search_defaults() {
        let now = Utc::now();
        let s = SavedSearchInput::default().into_record("s1".into(), "u1", now, now);
        assert_eq!(s.country, "ITA");
        assert_eq!(s.days_back, 3);
        assert!(s.text.is_none());
    }
}
