use axum::{
    extract::{Request, State},
    middleware::Next,
    response::Response,
};
use tracing::{debug, warn};

use crate::AppState;
use crate::application::ApiError;
use crate::application::authz::Credentials;

/// Guards the admin router. On success the resolved `AdminContext` is added
/// to the request extensions; on failure the handler never runs, so nothing
/// is mutated or journaled.
pub async fn admin_auth(
    State(app_state): State<AppState>,
    mut req: Request,
    next: Next,
) -> Result<Response, ApiError> {
    let credentials = Credentials::from_headers(req.headers());

    match app_state.gate.authorize_admin(credentials).await {
        Ok(ctx) => {
            debug!(principal = %ctx.principal, role = %ctx.role, "Admin request authorized");
            req.extensions_mut().insert(ctx);
            Ok(next.run(req).await)
        }
        Err(e) => {
            warn!(path = %req.uri().path(), "Admin authorization failed");
            Err(e.into())
        }
    }
}
