//! Pull job: fetch recent Italian notices and upsert them as tenders.
//!
//! Relative date windows are the most reliable across TED, so the default
//! query covers the last 3 days. An empty first result is retried once
//! with a 7-day window.

use chrono::{DateTime, Utc};
use serde::Serialize;
use tenderscope_core::{QueryIntent, Result, TenderRecord, build_expert_query, normalize_notice};
use tenderscope_store::Repository;
use tracing::{info, warn};

use crate::NoticeSearch;

pub const DEFAULT_PULL_DAYS: u32 = 3;
pub const WIDENED_PULL_DAYS: u32 = 7;
pub const DEFAULT_PULL_LIMIT: u32 = 50;
pub const MAX_PULL_LIMIT: u32 = 100;

#[derive(Debug, Clone, Default)]
pub struct PullOptions {
    /// Expert query to run instead of the default window.
    pub query: Option<String>,
    pub limit: Option<u32>,
}

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct PullReport {
    pub pulled: usize,
    pub notices: Vec<String>,
    pub widened: bool,
}

fn window_query(days_back: u32) -> String {
    build_expert_query(&QueryIntent {
        days_back,
        ..QueryIntent::default()
    })
}

pub async fn pull_tenders(
    source: &dyn NoticeSearch,
    repo: &Repository,
    opts: PullOptions,
    now: DateTime<Utc>,
) -> Result<PullReport> {
    let limit = opts
        .limit
        .unwrap_or(DEFAULT_PULL_LIMIT)
        .clamp(1, MAX_PULL_LIMIT);
    let query = opts
        .query
        .filter(|q| !q.trim().is_empty())
        .unwrap_or_else(|| window_query(DEFAULT_PULL_DAYS));

    let mut notices = source.search(&query, limit).await?;
    let mut widened = false;
    if notices.is_empty() {
        warn!(days = WIDENED_PULL_DAYS, "no results for first query; retrying with a wider window");
        notices = source.search(&window_query(WIDENED_PULL_DAYS), limit).await?;
        widened = true;
    }

    let mut ids = Vec::with_capacity(notices.len());
    for raw in &notices {
        let Some(record) = TenderRecord::from_notice(&normalize_notice(raw), now) else {
            continue;
        };
        let saved = repo.upsert_tender(record).await?;
        ids.push(saved.id);
    }

    info!(pulled = ids.len(), widened, "pull complete");
    Ok(PullReport {
        pulled: ids.len(),
        notices: ids,
        widened,
    })
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::collections::VecDeque;
    use std::sync::Mutex;

    use async_trait::async_trait;
    use serde_json::json;
    use tenderscope_core::RawNotice;

    /// Replays canned responses and records every query it receives.
    #[derive(Default)]
    struct Scripted {
        replies: Mutex<VecDeque<Vec<RawNotice>>>,
        queries: Mutex<Vec<(String, u32)>>,
    }

    impl Scripted {
        fn new(replies: Vec<Vec<RawNotice>>) -> Self {
            Self {
                replies: Mutex::new(replies.into()),
                queries: Mutex::default(),
            }
        }
    }

    #[async_trait]
    impl NoticeSearch for Scripted {
        async fn search(&self, query: &str, limit: u32) -> Result<Vec<RawNotice>> {
            self.queries.lock().unwrap().push((query.to_string(), limit));
            Ok(self.replies.lock().unwrap().pop_front().unwrap_or_default())
        }
    }

    fn raw(id: &str) -> RawNotice {
        RawNotice::new(json!({
            "publication-number": id,
            "notice-title": {"ita": format!("Bando {id}")},
            "buyer-name": {"ita": ["Comune"]}
        }))
    }

    #[tokio::test]
    async fn upserts_first_window() {
        let source = Scripted::new(vec![vec![raw("1-2025"), raw("2-2025")]]);
        let repo = Repository::in_memory();
        let report = pull_tenders(&source, &repo, PullOptions::default(), Utc::now())
            .await
            .unwrap();
        assert_eq!(report.pulled, 2);
        assert!(!report.widened);
        assert_eq!(report.notices, vec!["1-2025", "2-2025"]);

        let queries = source.queries.lock().unwrap();
        assert_eq!(queries.len(), 1);
        assert!(queries[0].0.contains("today(-3)"));
        assert_eq!(queries[0].1, DEFAULT_PULL_LIMIT);
        assert!(repo.get_tender("1-2025").await.unwrap().is_some());
    }

    #[tokio::test]
    async fn widens_once_when_empty() {
        let source = Scripted::new(vec![vec![], vec![raw("9-2025")]]);
        let repo = Repository::in_memory();
        let report = pull_tenders(&source, &repo, PullOptions::default(), Utc::now())
            .await
            .unwrap();
        assert!(report.widened);
        assert_eq!(report.pulled, 1);

        let queries = source.queries.lock().unwrap();
        assert_eq!(queries.len(), 2);
        assert!(queries[1].0.contains("today(-7)"));
    }

    #[tokio::test]
    async fn still_empty_after_widening_is_ok() {
        let source = Scripted::new(vec![]);
        let report = pull_tenders(&source, &Repository::in_memory(), PullOptions::default(), Utc::now())
            .await
            .unwrap();
        assert_eq!(report.pulled, 0);
        assert!(report.widened);
    }

    #[tokio::test]
    async fn custom_query_and_limit_cap() {
        let source = Scripted::new(vec![vec![raw("1")]]);
        let opts = PullOptions {
            query: Some("(classification-cpv = \"72000000\")".into()),
            limit: Some(500),
        };
        pull_tenders(&source, &Repository::in_memory(), opts, Utc::now())
            .await
            .unwrap();
        let queries = source.queries.lock().unwrap();
        assert_eq!(queries[0].0, "(classification-cpv = \"72000000\")");
        assert_eq!(queries[0].1, MAX_PULL_LIMIT);
    }

    #[tokio::test]
    async fn notices_without_number_skipped() {
        let source = Scripted::new(vec![vec![RawNotice::new(json!({"notice-title": {"ita": "x"}})), raw("5")]]);
        let report = pull_tenders(&source, &Repository::in_memory(), PullOptions::default(), Utc::now())
            .await
            .unwrap();
        assert_eq!(report.notices, vec!["5"]);
    }
}
