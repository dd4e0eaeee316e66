use axum::{
    Json,
    extract::{Path, Query, State, rejection::QueryRejection},
    response::IntoResponse,
};
use serde::Deserialize;
use serde_json::json;

use crate::AppState;
use super::ApiError;

#[derive(Debug, Deserialize)]
pub struct LogsQuery {
    pub limit: Option<usize>,
}

// GET /api/admin/keys
pub async fn handle_list_keys(State(state): State<AppState>) -> Result<impl IntoResponse, ApiError> {
    let keys = state.keys.list().await?;
    Ok(Json(json!({ "success": true, "keys": keys })))
}

// GET /api/admin/stats
pub async fn handle_detailed_stats(
    State(state): State<AppState>,
) -> Result<impl IntoResponse, ApiError> {
    let stats = state
        .keys
        .detailed_stats(state.clock.now(), state.heartbeat_window)
        .await?;
    Ok(Json(json!({ "success": true, "stats": stats })))
}

// GET /api/admin/logs?limit=
pub async fn handle_recent_logs(
    State(state): State<AppState>,
    query: Result<Query<LogsQuery>, QueryRejection>,
) -> Result<impl IntoResponse, ApiError> {
    let Query(query) = query.map_err(|rejection| ApiError::BadRequest(rejection.body_text()))?;
    let events = state.keys.access_log().recent(query.limit).await?;
    Ok(Json(json!({ "success": true, "events": events })))
}

// GET /api/admin/accounts
pub async fn handle_list_accounts(
    State(state): State<AppState>,
) -> Result<impl IntoResponse, ApiError> {
    let accounts = state.accounts.list().await?;
    Ok(Json(json!({ "success": true, "accounts": accounts })))
}

// GET /api/operator/stats/{license_key}
// Knowing the key is the credential here; operators never see other keys.
pub async fn handle_operator_stats(
    State(state): State<AppState>,
    Path(license_key): Path<String>,
) -> Result<impl IntoResponse, ApiError> {
    let stats = state
        .keys
        .stats(&license_key, state.clock.now(), state.heartbeat_window)
        .await?;
    Ok(Json(json!({ "success": true, "stats": stats })))
}
