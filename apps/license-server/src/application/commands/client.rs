//! Unauthenticated endpoints called by licensed installations.

use axum::{
    Json,
    extract::{State, rejection::JsonRejection},
    http::StatusCode,
    response::{IntoResponse, Response},
};
use license_core::{RejectReason, Verification};
use serde::{Deserialize, Serialize};
use serde_json::json;
use tracing::debug;

use crate::AppState;
use crate::application::middleware::ClientAddress;
use crate::application::{ApiError, ApiJson};

#[derive(Deserialize, Debug)]
#[serde(rename_all = "camelCase")]
pub struct LicenseKeyRequest {
    pub license_key: String,
}

impl LicenseKeyRequest {
    fn key(&self) -> Result<&str, ApiError> {
        let key = self.license_key.trim();
        if key.is_empty() {
            return Err(ApiError::BadRequest("licenseKey is required".into()));
        }
        Ok(key)
    }
}

#[derive(Serialize, Deserialize, Debug, Clone)]
#[serde(rename_all = "camelCase")]
pub struct VerifyResponse {
    pub valid: bool,
    pub message: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub owner: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub reason: Option<String>,
}

fn verify_failure(status: StatusCode, message: impl Into<String>, reason: Option<RejectReason>) -> Response {
    let body = VerifyResponse {
        valid: false,
        message: message.into(),
        owner: None,
        reason: reason.map(|r| r.as_str().to_string()),
    };
    (status, Json(body)).into_response()
}

// POST /api/verify
// Verify answers with `{valid, message}` rather than the usual failure body,
// so it handles its own rejections.
pub async fn handle_verify(
    State(state): State<AppState>,
    ClientAddress(address): ClientAddress,
    payload: Result<Json<LicenseKeyRequest>, JsonRejection>,
) -> Response {
    let request = match payload {
        Ok(Json(request)) => request,
        Err(rejection) => {
            return verify_failure(StatusCode::BAD_REQUEST, rejection.body_text(), None);
        }
    };
    let key = match request.key() {
        Ok(key) => key,
        Err(e) => return verify_failure(StatusCode::BAD_REQUEST, e.public_message(), None),
    };

    match state.keys.verify(key, Some(&address)).await {
        Ok(Verification::Valid { owner }) => {
            let body = VerifyResponse {
                valid: true,
                message: "License key is valid".into(),
                owner: Some(owner),
                reason: None,
            };
            (StatusCode::OK, Json(body)).into_response()
        }
        Ok(Verification::Rejected(reason @ RejectReason::InvalidKey)) => {
            verify_failure(StatusCode::NOT_FOUND, "Invalid license key", Some(reason))
        }
        Ok(Verification::Rejected(reason @ RejectReason::Inactive)) => {
            verify_failure(StatusCode::FORBIDDEN, "License key is inactive", Some(reason))
        }
        Err(e) => {
            let e = ApiError::from(e);
            verify_failure(e.status(), e.public_message(), None)
        }
    }
}

// POST /api/heartbeat
pub async fn handle_heartbeat(
    State(state): State<AppState>,
    ClientAddress(address): ClientAddress,
    ApiJson(request): ApiJson<LicenseKeyRequest>,
) -> Result<impl IntoResponse, ApiError> {
    let key = request.key()?;
    state
        .keys
        .record_heartbeat(key, &address, state.clock.now())
        .await?;
    debug!(key, %address, "Heartbeat recorded");
    Ok(Json(json!({ "success": true, "message": "Heartbeat recorded" })))
}

// POST /api/comments
pub async fn handle_post_comment(
    State(state): State<AppState>,
    ClientAddress(address): ClientAddress,
    ApiJson(request): ApiJson<LicenseKeyRequest>,
) -> Result<impl IntoResponse, ApiError> {
    let key = request.key()?;
    state.keys.record_comment(key, Some(&address)).await?;
    Ok(Json(json!({ "success": true, "message": "Comment recorded" })))
}
