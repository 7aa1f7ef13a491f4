//! Direct search: `POST /tenders/search` rows and the CSV export.

use axum::Json;
use axum::extract::{Query, State};
use axum::http::header;
use axum::response::{IntoResponse, Response};
use serde::{Deserialize, Serialize};
use serde_json::Value;
use tenderscope_core::query::{DEFAULT_COUNTRY, DEFAULT_DAYS_BACK};
use tenderscope_core::{
    ExportRow, NormalizedNotice, QueryIntent, build_expert_query, normalize_notice, rows_to_csv,
};
use tracing::info;

use crate::{ApiError, ApiResult, AppState, Body};

pub const DEFAULT_ROWS_LIMIT: u32 = 20;
pub const MAX_ROWS_LIMIT: u32 = 50;
pub const DEFAULT_EXPORT_LIMIT: u32 = 50;
pub const MAX_EXPORT_LIMIT: u32 = 200;

#[derive(Debug, Default, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct SearchRequest {
    pub country: Option<String>,
    pub days_back: Option<u32>,
    pub cpv: Option<Vec<String>>,
    pub text: Option<String>,
    pub limit: Option<u32>,
}

#[derive(Debug, Serialize)]
pub struct Rows {
    pub rows: Vec<NormalizedNotice>,
}

pub async fn search_rows(
    State(state): State<AppState>,
    Body(req): Body<SearchRequest>,
) -> ApiResult<Json<Rows>> {
    let intent = QueryIntent {
        country: req
            .country
            .filter(|c| !c.trim().is_empty())
            .unwrap_or_else(|| DEFAULT_COUNTRY.to_string()),
        days_back: req.days_back.unwrap_or(DEFAULT_DAYS_BACK),
        cpv: req.cpv,
        text: req.text,
    };
    intent.validate()?;
    let limit = req.limit.unwrap_or(DEFAULT_ROWS_LIMIT).clamp(1, MAX_ROWS_LIMIT);

    let rows: Vec<NormalizedNotice> = state
        .search
        .search(&build_expert_query(&intent), limit)
        .await?
        .iter()
        .map(normalize_notice)
        .collect();
    info!(count = rows.len(), "rows search");
    Ok(Json(Rows { rows }))
}

#[derive(Debug, Default, Deserialize)]
pub struct ExportParams {
    pub q: Option<String>,
    pub limit: Option<u32>,
}

/// Rows from the body when it carries a `rows` array, else a fresh search
/// for `?q=`.
pub async fn export_csv(
    State(state): State<AppState>,
    Query(params): Query<ExportParams>,
    Body(body): Body<Value>,
) -> ApiResult<Response> {
    let rows: Vec<ExportRow> = match body.get("rows").and_then(Value::as_array) {
        Some(rows) => rows.iter().map(ExportRow::from_value).collect(),
        None => {
            let q = params
                .q
                .as_deref()
                .map(str::trim)
                .filter(|q| !q.is_empty())
                .ok_or_else(|| ApiError::bad_request("missing q or rows"))?;
            let limit = params
                .limit
                .unwrap_or(DEFAULT_EXPORT_LIMIT)
                .clamp(1, MAX_EXPORT_LIMIT);
            state
                .search
                .search(q, limit)
                .await?
                .iter()
                .map(|raw| ExportRow::from(&normalize_notice(raw)))
                .collect()
        }
    };

    let csv = rows_to_csv(&rows)?;
    info!(rows = rows.len(), "csv export");
    Ok((
        [
            (header::CONTENT_TYPE, "text/csv; charset=utf-8"),
            (header::CONTENT_DISPOSITION, "attachment; filename=\"tenders.csv\""),
        ],
        csv,
    )
        .into_response())
}
