//! Stored tenders, summary writes and match scores.

use axum::Json;
use axum::extract::{Path, Query, State};
use chrono::Utc;
use serde::Deserialize;
use serde_json::{Value, json};
use tenderscope_ai::tools::{SUMMARY_EN_MAX, SUMMARY_IT_MAX};
use tenderscope_ai::sanitize_summary;
use tenderscope_core::TenderRecord;
use tenderscope_store::SummaryUpdate;

use crate::{ApiError, ApiResult, AppState, Body};

pub const DEFAULT_LIST_LIMIT: usize = 20;
pub const MAX_LIST_LIMIT: usize = 100;

#[derive(Debug, Default, Deserialize)]
pub struct ListParams {
    pub limit: Option<usize>,
}

/// Latest tenders by update time.
pub async fn list(
    State(state): State<AppState>,
    Query(params): Query<ListParams>,
) -> ApiResult<Json<Value>> {
    let limit = params.limit.unwrap_or(DEFAULT_LIST_LIMIT).min(MAX_LIST_LIMIT);
    let items: Vec<TenderRecord> = state.repo.latest_tenders(limit).await?;
    Ok(Json(json!({ "items": items })))
}

pub async fn get_one(
    State(state): State<AppState>,
    Path(id): Path<String>,
) -> ApiResult<Json<TenderRecord>> {
    state
        .repo
        .get_tender(&id)
        .await?
        .map(Json)
        .ok_or_else(|| ApiError::not_found(format!("tender {id}")))
}

#[derive(Debug, Default, Deserialize)]
pub struct SummaryBody {
    pub summary_it: Option<String>,
    pub summary_en: Option<String>,
}

pub async fn save_summary(
    State(state): State<AppState>,
    Path(id): Path<String>,
    Body(body): Body<SummaryBody>,
) -> ApiResult<Json<Value>> {
    let update = SummaryUpdate {
        tender_id: id,
        summary_it: sanitize_summary(body.summary_it.as_deref(), SUMMARY_IT_MAX),
        summary_en: sanitize_summary(body.summary_en.as_deref(), SUMMARY_EN_MAX),
    };
    state.repo.save_tender_summary(update, Utc::now()).await?;
    Ok(Json(json!({ "ok": true })))
}

#[derive(Debug, Default, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct MatchBody {
    pub company_id: Option<String>,
    pub tender_id: Option<String>,
    pub score: Option<f64>,
}

pub async fn save_match(
    State(state): State<AppState>,
    Body(body): Body<MatchBody>,
) -> ApiResult<Json<Value>> {
    let (Some(company_id), Some(tender_id)) = (
        body.company_id.filter(|c| !c.trim().is_empty()),
        body.tender_id.filter(|t| !t.trim().is_empty()),
    ) else {
        return Err(ApiError::bad_request("missing companyId or tenderId"));
    };
    let saved = state
        .repo
        .save_match_score(&company_id, &tender_id, body.score.unwrap_or(0.0), Utc::now())
        .await?;
    Ok(Json(json!({ "ok": true, "score": saved.score })))
}

#[cfg(test)]
mod tests {
    use axum::http::StatusCode;
    use chrono::{Duration, Utc};
    use serde_json::json;
    use tenderscope_core::{NormalizedNotice, TenderRecord};

    use crate::testing::TestApp;

    fn record(id: &str, offset_secs: i64) -> TenderRecord {
        let notice = NormalizedNotice {
            publication_number: id.into(),
            notice_id: id.into(),
            title: format!("Bando {id}"),
            buyer: "ASL".into(),
            publication_date: None,
            deadline_date: None,
            cpv: None,
            cpv_all: vec![],
            value: None,
            document_url: None,
            description_it: None,
            description_en: None,
        };
        TenderRecord::from_notice(&notice, Utc::now() + Duration::seconds(offset_secs)).unwrap()
    }

    #[tokio::test]
    async fn list_latest_first_and_capped() {
        let app = TestApp::new();
        for i in 0..3 {
            app.repo.upsert_tender(record(&format!("t{i}"), i)).await.unwrap();
        }
        let (status, body) = app.get("/tenders?limit=2").await;
        assert_eq!(status, StatusCode::OK);
        let items = body["items"].as_array().unwrap();
        assert_eq!(items.len(), 2);
        assert_eq!(items[0]["id"], "t2");
    }

    #[tokio::test]
    async fn get_one_or_404() {
        let app = TestApp::new();
        app.repo.upsert_tender(record("5-2025", 0)).await.unwrap();
        let (status, body) = app.get("/tenders/5-2025").await;
        assert_eq!(status, StatusCode::OK);
        assert_eq!(body["title"], "Bando 5-2025");

        let (status, body) = app.get("/tenders/missing").await;
        assert_eq!(status, StatusCode::NOT_FOUND);
        assert_eq!(body["error"], "not found: tender missing");
    }

    #[tokio::test]
    async fn summary_is_sanitised() {
        let app = TestApp::new();
        let (status, _) = app
            .post(
                "/tenders/8-2025/summary",
                json!({"summary_it": "Manutenzione\n\n```\nnoise\n```  strade", "summary_en": "   "}),
            )
            .await;
        assert_eq!(status, StatusCode::OK);
        let t = app.repo.get_tender("8-2025").await.unwrap().unwrap();
        assert_eq!(t.summary_it.as_deref(), Some("Manutenzione strade"));
        assert_eq!(t.summary_en, None);
    }

    #[tokio::test]
    async fn match_requires_ids_and_range() {
        let app = TestApp::new();
        let (status, _) = app.post("/matches", json!({"tenderId": "1"})).await;
        assert_eq!(status, StatusCode::BAD_REQUEST);

        let (status, _) = app
            .post("/matches", json!({"companyId": "acme", "tenderId": "1", "score": 2}))
            .await;
        assert_eq!(status, StatusCode::BAD_REQUEST);

        let (status, body) = app
            .post("/matches", json!({"companyId": "acme", "tenderId": "1", "score": 0.4}))
            .await;
        assert_eq!(status, StatusCode::OK);
        assert_eq!(body["score"], 0.4);
    }
}
