//! Privacy tests for credentials in logs.
//!
//! Bearer tokens, passwords and Supabase keys must never appear in log
//! output, even at TRACE level.
//!
//! # Test Approach
//!
//! 1. Capture every tracing event with a custom `Layer`
//! 2. Drive signup, sign-in and token-gated routes against a mock Supabase,
//!    including the failure paths that log upstream errors
//! 3. Assert that none of the secrets show up in the captured output

use std::sync::{Arc, Mutex};
use std::time::Duration;

use axum::body::Body;
use axum::http::{header, Request, StatusCode};
use serde_json::json;
use tower::ServiceExt;
use tracing::Subscriber;
use tracing_subscriber::layer::{Context, SubscriberExt};
use tracing_subscriber::registry::LookupSpan;
use tracing_subscriber::Layer;
use wiremock::matchers::{method, path};
use wiremock::{Mock, MockServer, ResponseTemplate};

use goticket_server::config::Config;
use goticket_server::routes::{create_router, AppState};

const ANON_KEY: &str = "anon-key-3f9a1c";
const SERVICE_KEY: &str = "service-key-77b2e0";
const USER_TOKEN: &str = "eyJhbGciOiJIUzI1NiJ9.user-token.sig";
const PASSWORD: &str = "Password123";

// ============================================================================
// Log Capture Infrastructure
// ============================================================================

/// Captured log lines, shared between the layer and the test.
#[derive(Clone, Default)]
struct LogCapture {
    logs: Arc<Mutex<Vec<String>>>,
}

impl LogCapture {
    fn contents(&self) -> String {
        self.logs.lock().unwrap().join("\n")
    }
}

/// A tracing Layer that records every event with all of its fields.
struct CaptureLayer {
    capture: LogCapture,
}

impl<S> Layer<S> for CaptureLayer
where
    S: Subscriber + for<'a> LookupSpan<'a>,
{
    fn on_event(&self, event: &tracing::Event<'_>, _ctx: Context<'_, S>) {
        let mut visitor = FieldVisitor::default();
        event.record(&mut visitor);

        self.capture.logs.lock().unwrap().push(format!(
            "[{}] {}: {}",
            event.metadata().level(),
            event.metadata().target(),
            visitor.parts.join(" ")
        ));
    }
}

#[derive(Default)]
struct FieldVisitor {
    parts: Vec<String>,
}

impl tracing::field::Visit for FieldVisitor {
    fn record_debug(&mut self, field: &tracing::field::Field, value: &dyn std::fmt::Debug) {
        self.parts.push(format!("{}={:?}", field.name(), value));
    }

    fn record_str(&mut self, field: &tracing::field::Field, value: &str) {
        self.parts.push(format!("{}={}", field.name(), value));
    }
}

/// Runs `test_fn` with a TRACE-level capturing subscriber and returns the
/// captured output.
async fn capture_logs<F, Fut>(test_fn: F) -> String
where
    F: FnOnce() -> Fut,
    Fut: std::future::Future<Output = ()>,
{
    let capture = LogCapture::default();
    let layer = CaptureLayer {
        capture: capture.clone(),
    };
    let subscriber = tracing_subscriber::registry()
        .with(layer.with_filter(tracing_subscriber::filter::LevelFilter::TRACE));

    let _guard = tracing::subscriber::set_default(subscriber);
    test_fn().await;

    capture.contents()
}

fn assert_no_secrets(logs: &str, context: &str) {
    for (name, secret) in [
        ("anon key", ANON_KEY),
        ("service key", SERVICE_KEY),
        ("user token", USER_TOKEN),
        ("password", PASSWORD),
    ] {
        assert!(
            !logs.contains(secret),
            "{name} found in logs during {context}!\nLogs:\n{logs}"
        );
    }
    assert!(
        !logs.contains("eyJ"),
        "JWT prefix found in logs during {context}!\nLogs:\n{logs}"
    );
}

// ============================================================================
// Helpers
// ============================================================================

fn state(server: &MockServer) -> AppState {
    AppState::new(Config {
        supabase_url: server.uri(),
        supabase_anon_key: ANON_KEY.to_string(),
        supabase_service_key: Some(SERVICE_KEY.to_string()),
        port: 8080,
        rate_limit_requests: 100,
        rate_limit_window: Duration::from_secs(3600),
        rate_limit_sweep: None,
    })
    .unwrap()
}

fn json_request(method: &str, uri: &str, body: serde_json::Value) -> Request<Body> {
    Request::builder()
        .method(method)
        .uri(uri)
        .header(header::CONTENT_TYPE, "application/json")
        .body(Body::from(body.to_string()))
        .unwrap()
}

fn authed(method: &str, uri: &str) -> Request<Body> {
    Request::builder()
        .method(method)
        .uri(uri)
        .header(header::AUTHORIZATION, format!("Bearer {USER_TOKEN}"))
        .body(Body::empty())
        .unwrap()
}

fn user_json() -> serde_json::Value {
    json!({
        "id": "user-1",
        "email": "ada@example.com",
        "created_at": "2026-10-01T00:00:00Z",
        "user_metadata": {
            "full_name": "Ada Lovelace",
            "phone_number": "+15551234567",
            "username": "ada",
            "account_type": "attendee"
        }
    })
}

// ============================================================================
// Test Cases
// ============================================================================

#[tokio::test]
async fn signup_does_not_log_credentials() {
    let server = MockServer::start().await;
    Mock::given(method("POST"))
        .and(path("/auth/v1/signup"))
        .respond_with(ResponseTemplate::new(200).set_body_json(json!({
            "access_token": USER_TOKEN,
            "user": user_json()
        })))
        .mount(&server)
        .await;
    Mock::given(method("POST"))
        .and(path("/rest/v1/profiles"))
        .respond_with(ResponseTemplate::new(201))
        .mount(&server)
        .await;

    let app = create_router(state(&server));
    let logs = capture_logs(|| async {
        let response = app
            .oneshot(json_request(
                "POST",
                "/api/register",
                json!({
                    "email": "ada@example.com",
                    "password": PASSWORD,
                    "full_name": "Ada Lovelace",
                    "phone_number": "+1 555 123 4567",
                    "username": "ada"
                }),
            ))
            .await
            .unwrap();
        assert_eq!(response.status(), StatusCode::OK);
    })
    .await;

    assert_no_secrets(&logs, "signup");
}

#[tokio::test]
async fn failed_sign_in_does_not_log_credentials() {
    let server = MockServer::start().await;
    Mock::given(method("POST"))
        .and(path("/auth/v1/token"))
        .respond_with(ResponseTemplate::new(400).set_body_json(json!({
            "error": "invalid_grant",
            "error_description": "Invalid login credentials"
        })))
        .mount(&server)
        .await;

    let app = create_router(state(&server));
    let logs = capture_logs(|| async {
        let response = app
            .oneshot(json_request(
                "POST",
                "/api/login",
                json!({ "email": "ada@example.com", "password": PASSWORD }),
            ))
            .await
            .unwrap();
        assert_eq!(response.status(), StatusCode::UNAUTHORIZED);
    })
    .await;

    assert_no_secrets(&logs, "failed sign-in");
}

#[tokio::test]
async fn rejected_token_is_not_logged() {
    let server = MockServer::start().await;
    Mock::given(method("GET"))
        .and(path("/auth/v1/user"))
        .respond_with(ResponseTemplate::new(401).set_body_json(json!({
            "message": "invalid JWT"
        })))
        .mount(&server)
        .await;

    let app = create_router(state(&server));
    let logs = capture_logs(|| async {
        let response = app.oneshot(authed("GET", "/api/profile")).await.unwrap();
        assert_eq!(response.status(), StatusCode::UNAUTHORIZED);
    })
    .await;

    assert_no_secrets(&logs, "token rejection");
}

#[tokio::test]
async fn upstream_server_error_does_not_log_token() {
    let server = MockServer::start().await;
    Mock::given(method("GET"))
        .and(path("/auth/v1/user"))
        .respond_with(ResponseTemplate::new(200).set_body_json(user_json()))
        .mount(&server)
        .await;
    Mock::given(method("GET"))
        .and(path("/rest/v1/registrations"))
        .respond_with(ResponseTemplate::new(500).set_body_string("internal error"))
        .mount(&server)
        .await;

    let app = create_router(state(&server));
    let logs = capture_logs(|| async {
        let response = app
            .oneshot(authed("GET", "/api/registrations"))
            .await
            .unwrap();
        assert_eq!(response.status(), StatusCode::INTERNAL_SERVER_ERROR);
    })
    .await;

    assert!(logs.contains("internal error"), "upstream body should be logged");
    assert_no_secrets(&logs, "upstream failure");
}

#[test]
fn state_debug_does_not_leak_keys() {
    let config = Config {
        supabase_url: "https://project.supabase.co".to_string(),
        supabase_anon_key: ANON_KEY.to_string(),
        supabase_service_key: Some(SERVICE_KEY.to_string()),
        port: 8080,
        rate_limit_requests: 100,
        rate_limit_window: Duration::from_secs(3600),
        rate_limit_sweep: None,
    };

    let config_debug = format!("{config:?}");
    let state_debug = format!("{:?}", AppState::new(config).unwrap());

    for output in [config_debug, state_debug] {
        assert!(!output.contains(ANON_KEY), "{output}");
        assert!(!output.contains(SERVICE_KEY), "{output}");
    }
}
