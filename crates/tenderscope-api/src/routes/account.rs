//! Per-user state: preferences, favorites and saved searches.

use axum::Json;
use axum::extract::{Path, State};
use chrono::Utc;
use serde_json::{Value, json};
use tenderscope_core::{Favorite, Preferences, PreferencesInput, SavedSearch, SavedSearchInput};
use tracing::info;

use crate::{ApiResult, AppState, Body, UserId};

// ── Preferences ──

pub async fn get_preferences(
    State(state): State<AppState>,
    UserId(uid): UserId,
) -> ApiResult<Json<Value>> {
    let preferences = state
        .repo
        .get_profile(&uid)
        .await?
        .map(|p| p.preferences)
        .unwrap_or_default();
    Ok(Json(json!({ "preferences": preferences })))
}

/// Clamp and fully overwrite the caller's preferences.
pub async fn save_preferences(
    State(state): State<AppState>,
    UserId(uid): UserId,
    Body(input): Body<PreferencesInput>,
) -> ApiResult<Json<Value>> {
    let clean: Preferences = input.clamp();
    let profile = state.repo.put_profile(&uid, clean, Utc::now()).await?;
    info!(uid = %uid, notify_daily = profile.preferences.notify_daily, "preferences saved");
    Ok(Json(json!({ "ok": true, "preferences": profile.preferences })))
}

// ── Favorites ──

pub async fn list_favorites(
    State(state): State<AppState>,
    UserId(uid): UserId,
) -> ApiResult<Json<Value>> {
    let items: Vec<Favorite> = state.repo.list_favorites(&uid).await?;
    Ok(Json(json!({ "items": items })))
}

pub async fn toggle_favorite(
    State(state): State<AppState>,
    UserId(uid): UserId,
    Path(tender_id): Path<String>,
) -> ApiResult<Json<Value>> {
    let favorited = state.repo.toggle_favorite(&uid, &tender_id, Utc::now()).await?;
    Ok(Json(json!({ "tenderId": tender_id, "favorited": favorited })))
}

// ── Saved searches ──

pub async fn list_saved_searches(
    State(state): State<AppState>,
    UserId(uid): UserId,
) -> ApiResult<Json<Value>> {
    let items: Vec<SavedSearch> = state.repo.list_saved_searches(&uid).await?;
    Ok(Json(json!({ "items": items })))
}

pub async fn save_search(
    State(state): State<AppState>,
    UserId(uid): UserId,
    Body(input): Body<SavedSearchInput>,
) -> ApiResult<Json<SavedSearch>> {
    let saved = state.repo.upsert_saved_search(&uid, input, Utc::now()).await?;
    Ok(Json(saved))
}

pub async fn delete_saved_search(
    State(state): State<AppState>,
    UserId(uid): UserId,
    Path(id): Path<String>,
) -> ApiResult<Json<Value>> {
    let deleted = state.repo.delete_saved_search(&uid, &id).await?;
    Ok(Json(json!({ "ok": true, "deleted": deleted })))
}
