use axum::{
    Json, Router,
    middleware::{self},
    response::IntoResponse,
    routing::{delete, get, post, put},
};
use chrono::TimeDelta;
use license_core::{AccessLog, AccountDirectory, Clock, KeyStore, PresenceTracker, adapters::Stores};
use serde_json::json;
use std::sync::Arc;
use tower_http::cors::{Any, CorsLayer};
use tower_http::trace::TraceLayer;

pub mod application;
pub mod config;

use application::{
    authz::AuthorizationGate,
    commands::{
        accounts::{handle_create_account, handle_delete_account, handle_update_account_role},
        client::{handle_heartbeat, handle_post_comment, handle_verify},
        keys::{handle_create_key, handle_delete_key, handle_reset_comments, handle_toggle_key},
        login::handle_login,
    },
    middleware::admin_auth,
    query::{
        handle_detailed_stats, handle_list_accounts, handle_list_keys, handle_operator_stats,
        handle_recent_logs,
    },
};

// Holds shared dependencies
#[derive(Clone)]
pub struct AppState {
    pub keys: KeyStore,
    pub accounts: AccountDirectory,
    pub gate: AuthorizationGate,
    pub clock: Arc<dyn Clock>,
    pub heartbeat_window: TimeDelta,
}

impl AppState {
    /// Wires the components over one set of stores.
    pub fn new(
        stores: Stores,
        clock: Arc<dyn Clock>,
        legacy_admin_secret: Option<String>,
        heartbeat_window: TimeDelta,
    ) -> Self {
        let log = AccessLog::new(stores.journal.clone(), clock.clone());
        let keys = KeyStore::new(
            stores.keys.clone(),
            PresenceTracker::new(stores.sightings.clone()),
            log.clone(),
            clock.clone(),
        );
        let accounts = AccountDirectory::new(stores.accounts, stores.keys, log, clock.clone());
        let gate = AuthorizationGate::new(legacy_admin_secret, accounts.clone());
        Self {
            keys,
            accounts,
            gate,
            clock,
            heartbeat_window,
        }
    }
}

pub fn create_app(app_state: AppState) -> Router {
    let admin_routes = Router::new()
        .route("/keys", post(handle_create_key).get(handle_list_keys))
        .route("/keys/{key}", delete(handle_delete_key))
        .route("/keys/{key}/toggle", post(handle_toggle_key))
        .route("/keys/{key}/reset-comments", post(handle_reset_comments))
        .route("/stats", get(handle_detailed_stats))
        .route("/logs", get(handle_recent_logs))
        .route("/accounts", get(handle_list_accounts).post(handle_create_account))
        .route("/accounts/{username}", delete(handle_delete_account))
        .route("/accounts/{username}/role", put(handle_update_account_role))
        .route_layer(middleware::from_fn_with_state(app_state.clone(), admin_auth));

    let api_routes = Router::new()
        .route("/verify", post(handle_verify))
        .route("/heartbeat", post(handle_heartbeat))
        .route("/comments", post(handle_post_comment))
        .route("/auth/login", post(handle_login))
        .route("/operator/stats/{license_key}", get(handle_operator_stats))
        .nest("/admin", admin_routes);

    let cors = CorsLayer::new()
        .allow_origin(Any)
        .allow_methods(Any)
        .allow_headers(Any);

    Router::new()
        .nest("/api", api_routes)
        .route("/health", get(health))
        .layer(TraceLayer::new_for_http())
        .layer(cors)
        .with_state(app_state)
}

pub async fn health() -> impl IntoResponse {
    Json(json!({ "status": "ok" }))
}
