//! One-shot job triggers. Each runs to completion inside the request.

use axum::Json;
use axum::extract::State;
use chrono::Utc;
use serde::Deserialize;
use tenderscope_ai::{ProcessReport, process_pending};
use tenderscope_sync::{DigestReport, PullOptions, PullReport, pull_tenders, run_digest};

use crate::{ApiResult, AppState, Body};

#[derive(Debug, Default, Deserialize)]
pub struct PullBody {
    pub query: Option<String>,
    pub limit: Option<u32>,
}

pub async fn pull(
    State(state): State<AppState>,
    Body(body): Body<PullBody>,
) -> ApiResult<Json<PullReport>> {
    let opts = PullOptions {
        query: body.query,
        limit: body.limit,
    };
    let report = pull_tenders(state.search.as_ref(), &state.repo, opts, Utc::now()).await?;
    Ok(Json(report))
}

pub async fn process(State(state): State<AppState>) -> ApiResult<Json<ProcessReport>> {
    let report = process_pending(state.llm.as_ref(), &state.repo, Utc::now()).await?;
    Ok(Json(report))
}

pub async fn digest(State(state): State<AppState>) -> ApiResult<Json<DigestReport>> {
    let report = run_digest(
        state.search.as_ref(),
        &state.repo,
        &state.mailer,
        state.public_url.as_deref(),
        Utc::now().date_naive(),
    )
    .await?;
    Ok(Json(report))
}

#[cfg(test)]
mod tests {
    use axum::http::{Method, StatusCode};
    use serde_json::json;
    use tenderscope_ai::ChatResponse;

    use crate::testing::{TestApp, raw_notice};

    #[tokio::test]
    async fn pull_then_process() {
        let app = TestApp::new()
            .with_notices(vec![raw_notice("1-2025", "Strade"), raw_notice("2-2025", "Scuole")])
            .with_llm(vec![
                ChatResponse::Content("Lavori stradali. EN: Road works".into()),
                ChatResponse::Content("Edilizia scolastica. EN: School buildings".into()),
            ]);

        let (status, body) = app.json(Method::POST, "/jobs/pull", &[], None).await;
        assert_eq!(status, StatusCode::OK);
        assert_eq!(body["pulled"], 2);
        assert_eq!(body["widened"], false);

        let (status, body) = app.post("/jobs/process", json!({})).await;
        assert_eq!(status, StatusCode::OK);
        assert_eq!(body["processed"], 2);

        let t = app.repo.get_tender("1-2025").await.unwrap().unwrap();
        assert!(t.processed);
        assert!(t.summary_en.is_some());
    }

    #[tokio::test]
    async fn digest_previews_without_mail_key() {
        let app = TestApp::new().with_notices(vec![raw_notice("3-2025", "Pulizia")]);
        app.json(
            Method::POST,
            "/preferences",
            &[("x-user-id", "bob")],
            Some(json!({"notifyDaily": true, "email": "bob@example.it"})),
        )
        .await;
        app.post("/preferences", json!({"notifyDaily": true})).await;

        let (status, body) = app.post("/jobs/digest", json!({})).await;
        assert_eq!(status, StatusCode::OK);
        assert_eq!(body["previewed"], 1);
        assert_eq!(body["sent"], 0);
        assert_eq!(body["failed"], 0);
    }
}
