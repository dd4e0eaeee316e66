use axum::{
    Extension, Json,
    extract::{Path, State},
    http::StatusCode,
    response::IntoResponse,
};
use serde::Deserialize;
use serde_json::json;
use tracing::info;

use crate::AppState;
use crate::application::authz::AdminContext;
use crate::application::{ApiError, ApiJson};

#[derive(Deserialize, Debug)]
pub struct CreateKeyRequest {
    pub owner: String,
}

// POST /api/admin/keys
pub async fn handle_create_key(
    State(state): State<AppState>,
    Extension(ctx): Extension<AdminContext>,
    ApiJson(request): ApiJson<CreateKeyRequest>,
) -> Result<impl IntoResponse, ApiError> {
    let license = state.keys.create(&request.owner).await?;
    info!(principal = %ctx.principal, key = %license.key, "Key issued");
    Ok((
        StatusCode::CREATED,
        Json(json!({
            "success": true,
            "licenseKey": license.key,
            "owner": license.owner,
            "message": "License key created",
        })),
    ))
}

// POST /api/admin/keys/{key}/toggle
pub async fn handle_toggle_key(
    State(state): State<AppState>,
    Extension(ctx): Extension<AdminContext>,
    Path(key): Path<String>,
) -> Result<impl IntoResponse, ApiError> {
    let active = state.keys.toggle_active(&key).await?;
    info!(principal = %ctx.principal, key, active, "Key toggled");
    let message = if active {
        "License key activated"
    } else {
        "License key deactivated"
    };
    Ok(Json(json!({ "success": true, "active": active, "message": message })))
}

// DELETE /api/admin/keys/{key}
pub async fn handle_delete_key(
    State(state): State<AppState>,
    Extension(ctx): Extension<AdminContext>,
    Path(key): Path<String>,
) -> Result<impl IntoResponse, ApiError> {
    state.keys.delete(&key).await?;
    info!(principal = %ctx.principal, key, "Key removed");
    Ok(Json(json!({ "success": true, "message": "License key deleted" })))
}

// POST /api/admin/keys/{key}/reset-comments
pub async fn handle_reset_comments(
    State(state): State<AppState>,
    Extension(ctx): Extension<AdminContext>,
    Path(key): Path<String>,
) -> Result<impl IntoResponse, ApiError> {
    let deleted = state.keys.reset_comments(&key).await?;
    info!(principal = %ctx.principal, key, deleted, "Comments reset");
    Ok(Json(json!({ "success": true, "deletedCount": deleted })))
}
