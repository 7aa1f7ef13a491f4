//! HTTP surface for Tenderscope.
//!
//! Handlers are thin: they extract the caller, validate input and delegate
//! to the store, sync and ai crates. All errors leave as `{"error": …}`.

pub mod error;
pub mod extract;
pub mod routes;

use std::sync::Arc;

use axum::Router;
use axum::routing::{delete, get, post};
use tenderscope_ai::{Agent, LlmClient, ToolSet};
use tenderscope_store::Repository;
use tenderscope_sync::{Mailer, NoticeSearch};
use tower_http::cors::CorsLayer;

pub use error::{ApiError, ApiResult};
pub use extract::{Body, UserId};

/// Shared state for every handler. Cheap to clone.
#[derive(Clone)]
pub struct AppState {
    pub repo: Repository,
    pub search: Arc<dyn NoticeSearch>,
    pub llm: Arc<dyn LlmClient>,
    pub mailer: Arc<Mailer>,
    /// Base URL of the web app, linked from digest mails.
    pub public_url: Option<String>,
}

impl AppState {
    pub fn agent(&self) -> Agent {
        Agent::new(
            self.llm.clone(),
            ToolSet::standard(self.search.clone(), self.repo.clone()),
            self.repo.clone(),
        )
    }
}

pub fn router(state: AppState) -> Router {
    use routes::{account, agent, jobs, search, tenders};

    Router::new()
        .route("/health", get(routes::health))
        .route("/agent/chat", post(agent::chat))
        .route("/tenders/search", post(search::search_rows))
        .route("/export/csv", get(search::export_csv).post(search::export_csv))
        .route("/preferences", get(account::get_preferences).post(account::save_preferences))
        .route("/favorites", get(account::list_favorites))
        .route("/favorites/:tender_id/toggle", post(account::toggle_favorite))
        .route(
            "/saved-searches",
            get(account::list_saved_searches).post(account::save_search),
        )
        .route("/saved-searches/:id", delete(account::delete_saved_search))
        .route("/tenders", get(tenders::list))
        .route("/tenders/:id", get(tenders::get_one))
        .route("/tenders/:id/summary", post(tenders::save_summary))
        .route("/matches", post(tenders::save_match))
        .route("/jobs/pull", post(jobs::pull))
        .route("/jobs/process", post(jobs::process))
        .route("/jobs/digest", post(jobs::digest))
        .layer(CorsLayer::permissive())
        .with_state(state)
}

#[cfg(test)]
pub(crate) mod testing;
