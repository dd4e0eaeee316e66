use axum::{Json, extract::State, response::IntoResponse};
use serde::{Deserialize, Serialize};
use tracing::info;

use crate::AppState;
use crate::application::{ApiError, ApiJson};

#[derive(Deserialize)]
pub struct LoginRequest {
    pub username: String,
    pub password: String,
}

#[derive(Serialize, Deserialize, Debug, Clone)]
#[serde(rename_all = "camelCase")]
pub struct LoginResponse {
    pub success: bool,
    pub role: String,
    pub username: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub bound_license_key: Option<String>,
}

// POST /api/auth/login
pub async fn handle_login(
    State(state): State<AppState>,
    ApiJson(request): ApiJson<LoginRequest>,
) -> Result<impl IntoResponse, ApiError> {
    if request.username.is_empty() || request.password.is_empty() {
        return Err(ApiError::BadRequest(
            "username and password are required".into(),
        ));
    }

    let account = state
        .accounts
        .authenticate(&request.username, &request.password)
        .await?;
    info!(username = %account.username, role = %account.role, "Login succeeded");

    Ok(Json(LoginResponse {
        success: true,
        role: account.role.as_str().to_string(),
        username: account.username,
        bound_license_key: account.bound_license_key,
    }))
}
