pub mod account;
pub mod agent;
pub mod jobs;
pub mod search;
pub mod tenders;

use axum::Json;
use serde_json::{Value, json};

pub async fn health() -> Json<Value> {
    Json(json!({ "ok": true, "service": "tenderscope", "version": env!("CARGO_PKG_VERSION") }))
}
