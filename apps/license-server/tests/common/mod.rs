#![allow(dead_code)]

use axum_test::TestServer;
use base64::{Engine, engine::general_purpose::STANDARD};
use chrono::{DateTime, TimeDelta};
use http::{HeaderName, HeaderValue, StatusCode};
use license_core::{ManualClock, adapters::Stores};
use serde_json::{Value, json};
use std::sync::Arc;

use license_server::{AppState, create_app};

pub const LEGACY_SECRET: &str = "legacy-test-secret";
pub const CREATOR_PASSWORD: &str = "creator-test-password";

pub struct TestApp {
    pub server: TestServer,
    pub clock: ManualClock,
}

// Helper function to set up the test application with in-memory dependencies
pub async fn setup_test_app() -> TestApp {
    let clock = ManualClock::new(DateTime::from_timestamp(1_700_000_000, 0).unwrap());
    let app_state = AppState::new(
        Stores::in_memory(1000),
        Arc::new(clock.clone()),
        Some(LEGACY_SECRET.to_string()),
        TimeDelta::seconds(60),
    );
    app_state
        .accounts
        .bootstrap_creator(CREATOR_PASSWORD)
        .await
        .expect("Failed to bootstrap creator");

    let server = TestServer::new(create_app(app_state)).expect("Failed to create TestServer");
    TestApp { server, clock }
}

pub fn authorization() -> HeaderName {
    HeaderName::from_static("authorization")
}

pub fn forwarded_for() -> HeaderName {
    HeaderName::from_static("x-forwarded-for")
}

pub fn legacy_auth() -> HeaderValue {
    HeaderValue::from_str(&format!("Bearer {LEGACY_SECRET}")).unwrap()
}

pub fn basic_auth(username: &str, password: &str) -> HeaderValue {
    let encoded = STANDARD.encode(format!("{username}:{password}"));
    HeaderValue::from_str(&format!("Basic {encoded}")).unwrap()
}

pub fn creator_auth() -> HeaderValue {
    basic_auth("creator", CREATOR_PASSWORD)
}

/// Issues a key through the admin API and returns its token.
pub async fn create_key(server: &TestServer, owner: &str) -> String {
    let response = server
        .post("/api/admin/keys")
        .add_header(authorization(), legacy_auth())
        .json(&json!({ "owner": owner }))
        .await;
    assert_eq!(response.status_code(), StatusCode::CREATED);
    let body: Value = response.json();
    body["licenseKey"]
        .as_str()
        .expect("licenseKey missing from create response")
        .to_string()
}

pub async fn recent_events(server: &TestServer) -> Vec<Value> {
    let response = server
        .get("/api/admin/logs")
        .add_header(authorization(), legacy_auth())
        .await;
    assert_eq!(response.status_code(), StatusCode::OK);
    let body: Value = response.json();
    body["events"].as_array().cloned().unwrap_or_default()
}
