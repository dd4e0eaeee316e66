use axum::{
    Extension, Json,
    extract::{Path, State},
    http::StatusCode,
    response::IntoResponse,
};
use license_core::Role;
use serde::Deserialize;
use serde_json::json;
use tracing::info;

use crate::AppState;
use crate::application::authz::AdminContext;
use crate::application::{ApiError, ApiJson};

#[derive(Deserialize, Debug)]
#[serde(rename_all = "camelCase")]
pub struct CreateAccountRequest {
    pub username: String,
    pub password: String,
    pub role: String,
    #[serde(default)]
    pub bound_license_key: Option<String>,
}

#[derive(Deserialize, Debug)]
#[serde(rename_all = "camelCase")]
pub struct UpdateRoleRequest {
    pub role: String,
    #[serde(default)]
    pub bound_license_key: Option<String>,
}

// POST /api/admin/accounts
pub async fn handle_create_account(
    State(state): State<AppState>,
    Extension(ctx): Extension<AdminContext>,
    ApiJson(request): ApiJson<CreateAccountRequest>,
) -> Result<impl IntoResponse, ApiError> {
    let role: Role = request.role.parse()?;
    let account = state
        .accounts
        .create(
            &request.username,
            &request.password,
            role,
            request.bound_license_key.as_deref(),
        )
        .await?;
    info!(principal = %ctx.principal, username = %account.username, "Account added");
    Ok((
        StatusCode::CREATED,
        Json(json!({
            "success": true,
            "message": format!("Account {} created", account.username),
        })),
    ))
}

// PUT /api/admin/accounts/{username}/role
pub async fn handle_update_account_role(
    State(state): State<AppState>,
    Extension(ctx): Extension<AdminContext>,
    Path(username): Path<String>,
    ApiJson(request): ApiJson<UpdateRoleRequest>,
) -> Result<impl IntoResponse, ApiError> {
    let role: Role = request.role.parse()?;
    state
        .accounts
        .update_role(&username, role, request.bound_license_key.as_deref())
        .await?;
    info!(principal = %ctx.principal, username, %role, "Account re-roled");
    Ok(Json(json!({
        "success": true,
        "message": format!("Account {username} is now {role}"),
    })))
}

// DELETE /api/admin/accounts/{username}
pub async fn handle_delete_account(
    State(state): State<AppState>,
    Extension(ctx): Extension<AdminContext>,
    Path(username): Path<String>,
) -> Result<impl IntoResponse, ApiError> {
    state.accounts.delete(&username).await?;
    info!(principal = %ctx.principal, username, "Account removed");
    Ok(Json(json!({
        "success": true,
        "message": format!("Account {username} deleted"),
    })))
}
