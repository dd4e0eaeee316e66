use axum::{
    Json,
    extract::{FromRequest, rejection::JsonRejection},
    http::StatusCode,
    response::{IntoResponse, Response},
};
use license_core::CoreError;
use serde_json::json;
use tracing::{error, warn};

pub mod authz;
pub mod commands;
pub mod middleware;
pub mod query;

/// Top-level error for every handler. Rendered as `{success:false, message}`.
#[derive(thiserror::Error, Debug)]
pub enum ApiError {
    #[error(transparent)]
    Core(#[from] CoreError),

    #[error("Malformed request: {0}")]
    BadRequest(String),
}

impl From<JsonRejection> for ApiError {
    fn from(rejection: JsonRejection) -> Self {
        ApiError::BadRequest(rejection.body_text())
    }
}

impl ApiError {
    pub fn status(&self) -> StatusCode {
        match self {
            ApiError::BadRequest(_) => StatusCode::BAD_REQUEST,
            ApiError::Core(err) => status_for(err),
        }
    }

    /// Message safe to hand back to the caller. Unexpected causes are logged
    /// here and replaced by a generic message.
    pub fn public_message(&self) -> String {
        match self {
            ApiError::BadRequest(_) => self.to_string(),
            ApiError::Core(err) => match err {
                CoreError::Validation(msg) => msg.clone(),
                CoreError::Unauthorized => "Unauthorized".to_string(),
                CoreError::NotFound(_)
                | CoreError::Forbidden(_)
                | CoreError::DuplicateUsername(_)
                | CoreError::DuplicateKey(_) => err.to_string(),
                CoreError::StoreUnavailable(detail) => {
                    warn!(%detail, "Store unavailable");
                    "Service temporarily unavailable, retry later".to_string()
                }
                CoreError::Infrastructure(_) | CoreError::Internal(_) => {
                    error!("Unhandled error: {:?}", err);
                    "Internal server error".to_string()
                }
            },
        }
    }
}

pub fn status_for(err: &CoreError) -> StatusCode {
    match err {
        CoreError::Validation(_) => StatusCode::BAD_REQUEST,
        CoreError::NotFound(_) => StatusCode::NOT_FOUND,
        CoreError::DuplicateUsername(_) | CoreError::DuplicateKey(_) => StatusCode::CONFLICT,
        CoreError::Unauthorized => StatusCode::UNAUTHORIZED,
        CoreError::Forbidden(_) => StatusCode::FORBIDDEN,
        CoreError::StoreUnavailable(_) => StatusCode::SERVICE_UNAVAILABLE,
        CoreError::Infrastructure(_) | CoreError::Internal(_) => StatusCode::INTERNAL_SERVER_ERROR,
    }
}

impl IntoResponse for ApiError {
    fn into_response(self) -> Response {
        let status = self.status();
        let body = Json(json!({ "success": false, "message": self.public_message() }));
        (status, body).into_response()
    }
}

/// `Json` whose rejection renders through `ApiError`.
#[derive(FromRequest)]
#[from_request(via(Json), rejection(ApiError))]
pub struct ApiJson<T>(pub T);

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn every_error_kind_maps_to_its_status() {
        let cases = [
            (CoreError::Validation("x".into()), StatusCode::BAD_REQUEST),
            (CoreError::NotFound("x".into()), StatusCode::NOT_FOUND),
            (CoreError::DuplicateUsername("x".into()), StatusCode::CONFLICT),
            (CoreError::DuplicateKey("x".into()), StatusCode::CONFLICT),
            (CoreError::Unauthorized, StatusCode::UNAUTHORIZED),
            (CoreError::Forbidden("x".into()), StatusCode::FORBIDDEN),
            (CoreError::StoreUnavailable("x".into()), StatusCode::SERVICE_UNAVAILABLE),
            (CoreError::Internal("x".into()), StatusCode::INTERNAL_SERVER_ERROR),
        ];
        for (err, expected) in cases {
            assert_eq!(status_for(&err), expected, "{err}");
        }
    }

    #[test]
    fn internal_details_are_not_exposed() {
        let err = ApiError::from(CoreError::Internal("db password is hunter2".into()));
        assert_eq!(err.public_message(), "Internal server error");

        let err = ApiError::from(CoreError::Unauthorized);
        assert_eq!(err.public_message(), "Unauthorized");
    }
}
