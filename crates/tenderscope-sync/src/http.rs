//! HTTP client for the TED notice-search API (`POST /v3/notices/search`).

use async_trait::async_trait;
use serde_json::{Value, json};
use tenderscope_core::RawNotice;
use thiserror::Error;
use tracing::{info, warn};

use crate::NoticeSearch;

pub const DEFAULT_TED_URL: &str = "https://api.ted.europa.eu";
const SEARCH_PATH: &str = "/v3/notices/search";

/// TED rejects pages larger than this.
pub const MAX_PAGE_SIZE: u32 = 250;

/// Field projection requested for every search.
pub const SEARCH_FIELDS: [&str; 13] = [
    "publication-number",
    "notice-identifier",
    "notice-title",
    "buyer-name",
    "publication-date",
    "deadline-date-lot",
    "classification-cpv",
    "estimated-value-glo",
    "estimated-value-cur-glo",
    "total-value",
    "links",
    "description-proc",
    "description-glo",
];

#[derive(Error, Debug)]
pub enum SearchError {
    #[error("HTTP request failed: {0}")]
    Http(#[from] reqwest::Error),
    #[error("TED API {status}: {message}")]
    Api { status: u16, message: String },
    #[error("TED API {status}: malformed response: {source}")]
    Json {
        status: u16,
        source: serde_json::Error,
    },
}

impl From<SearchError> for tenderscope_core::Error {
    fn from(e: SearchError) -> Self {
        match e {
            SearchError::Api { status, message } => Self::UpstreamApi { status, message },
            SearchError::Json { status, source } => Self::UpstreamApi {
                status,
                message: format!("malformed response: {source}"),
            },
            other => Self::Internal(other.to_string()),
        }
    }
}

/// Client for the TED search endpoint.
pub struct TedClient {
    client: reqwest::Client,
    base_url: String,
}

impl TedClient {
    /// `base_url` should be like `https://api.ted.europa.eu` (no trailing slash).
    pub fn new(base_url: String) -> Self {
        Self {
            client: reqwest::Client::new(),
            base_url: base_url.trim_end_matches('/').to_string(),
        }
    }

    /// Run one expert query and return the raw notices, possibly none.
    pub async fn search_notices(&self, query: &str, limit: u32) -> Result<Vec<RawNotice>, SearchError> {
        let url = format!("{}{SEARCH_PATH}", self.base_url);
        let limit = limit.clamp(1, MAX_PAGE_SIZE);
        let body = json!({
            "query": query,
            "paginationMode": "PAGE_NUMBER",
            "page": 1,
            "limit": limit,
            "onlyLatestVersions": true,
            "fields": SEARCH_FIELDS,
        });

        info!(limit, query = %query, "searching TED notices");
        let resp = self.client.post(&url).json(&body).send().await?;
        let status = resp.status();
        let text = resp.text().await?;
        if !status.is_success() {
            return Err(SearchError::Api {
                status: status.as_u16(),
                message: upstream_message(&text),
            });
        }

        let payload: Value = if text.trim().is_empty() {
            Value::Null
        } else {
            serde_json::from_str(&text).map_err(|source| SearchError::Json {
                status: status.as_u16(),
                source,
            })?
        };
        let notices: Vec<RawNotice> = payload
            .get("notices")
            .and_then(Value::as_array)
            .map(|items| items.iter().cloned().map(RawNotice::new).collect())
            .unwrap_or_default();

        if notices.is_empty() {
            warn!(query = %query, "TED returned no notices");
        } else {
            info!(count = notices.len(), "TED search complete");
        }
        Ok(notices)
    }
}

#[async_trait]
impl NoticeSearch for TedClient {
    async fn search(&self, query: &str, limit: u32) -> tenderscope_core::Result<Vec<RawNotice>> {
        Ok(self.search_notices(query, limit).await?)
    }
}

/// The `message` or `error` string of a JSON error body, else the raw body.
fn upstream_message(body: &str) -> String {
    if let Ok(v) = serde_json::from_str::<Value>(body) {
        for key in ["message", "error"] {
            if let Some(msg) = v.get(key).and_then(Value::as_str)
                && !msg.is_empty()
            {
                return msg.to_string();
            }
        }
    }
    body.trim().to_string()
}
