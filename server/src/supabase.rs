//! Supabase client for identity and table access.
//!
//! This module provides a typed client for the two Supabase services the
//! ticketing API proxies to:
//! - GoTrue (`/auth/v1/*`) for signup, password sign-in and token lookup
//! - PostgREST (`/rest/v1/*`) for the `profiles`, `events` and
//!   `registrations` tables
//!
//! # Architecture
//!
//! Every request carries the anon key in the `apikey` header. The bearer
//! token is the anon key for public reads and the caller's access token for
//! row-level-security gated calls, so ownership rules are enforced by the
//! database, not here. Filter values always travel as encoded query
//! parameters.
//!
//! Non-success responses are mapped to [`SupabaseError`] in one place,
//! and the response bodies of failed calls are
//! logged and never returned to API clients.
//!
//! # Example
//!
//! ```rust,ignore
//! use goticket_server::supabase::SupabaseClient;
//!
//! let client = SupabaseClient::new("https://your-project.supabase.co", "anon-key", None)?;
//!
//! let events = client.list_events(Some("music"), None).await?;
//! println!("{} active music events", events.len());
//! ```

use std::time::Duration;

use chrono::Utc;
use reqwest::{Client, Method, RequestBuilder, Response, StatusCode};
use serde::de::DeserializeOwned;
use serde::{Deserialize, Serialize};
use thiserror::Error;
use tracing::{debug, error, warn};

use crate::types::{
    timestamp, Event, NewEvent, NewRegistration, RegisterRequest, Registration,
    RegistrationWithEvent, User, DEFAULT_ACCOUNT_TYPE, EVENT_STATUS_ACTIVE,
    REGISTRATION_STATUS_CONFIRMED, STATUS_CANCELLED,
};

/// Default timeout for Supabase API requests.
const REQUEST_TIMEOUT: Duration = Duration::from_secs(10);

/// Postgres `unique_violation` error code.
const UNIQUE_VIOLATION: &str = "23505";

/// Errors that can occur when interacting with Supabase.
///
/// Handlers translate these into the client-facing envelope; the wrapped
/// strings are for logs only.
#[derive(Debug, Error)]
pub enum SupabaseError {
    /// The token was rejected (HTTP 401/403, or bad sign-in credentials).
    #[error("unauthorized: invalid or expired token")]
    Unauthorized,

    /// The write collides with an existing row (HTTP 409, unique violation,
    /// or an already registered account).
    #[error("conflict: {0}")]
    Conflict(String),

    /// The request to Supabase timed out.
    #[error("request timed out after {0:?}")]
    Timeout(Duration),

    /// Supabase is unreachable.
    #[error("supabase unavailable: {0}")]
    Unavailable(String),

    /// Unexpected status or a body that does not parse.
    #[error("invalid response: {0}")]
    InvalidResponse(String),

    /// Client configuration error.
    #[error("client configuration error: {0}")]
    Configuration(String),
}

/// Metadata stored on the identity provider's user record.
#[derive(Debug, Clone, Default, Deserialize)]
struct UserMetadata {
    full_name: Option<String>,
    phone_number: Option<String>,
    username: Option<String>,
    account_type: Option<String>,
}

/// User object as returned by `/auth/v1/*`.
///
/// Depending on the endpoint the metadata arrives as `user_metadata` or
/// `raw_user_meta_data`.
#[derive(Debug, Clone, Deserialize)]
struct AuthUser {
    id: String,
    #[serde(default)]
    email: Option<String>,
    #[serde(default)]
    created_at: Option<String>,
    #[serde(default)]
    user_metadata: Option<UserMetadata>,
    #[serde(default)]
    raw_user_meta_data: Option<UserMetadata>,
}

impl From<AuthUser> for User {
    fn from(user: AuthUser) -> Self {
        let meta = user
            .user_metadata
            .or(user.raw_user_meta_data)
            .unwrap_or_default();

        User {
            id: user.id,
            email: user.email.unwrap_or_default(),
            full_name: meta.full_name.unwrap_or_default(),
            phone_number: meta.phone_number.unwrap_or_default(),
            username: meta.username.unwrap_or_default(),
            account_type: meta.account_type.unwrap_or_default(),
            created_at: user.created_at.unwrap_or_default(),
        }
    }
}

/// Session returned by signup and password sign-in.
#[derive(Debug, Deserialize)]
struct AuthSession {
    #[serde(default)]
    access_token: Option<String>,
    user: AuthUser,
}

/// Signup returns a session, or only the user when email confirmation is
/// pending.
#[derive(Debug, Deserialize)]
#[serde(untagged)]
enum SignUpResponse {
    Session(AuthSession),
    User(AuthUser),
}

#[derive(Debug, Serialize)]
struct SignUpPayload<'a> {
    email: &'a str,
    password: &'a str,
    data: SignUpMetadata<'a>,
}

#[derive(Debug, Serialize)]
struct SignUpMetadata<'a> {
    full_name: &'a str,
    phone_number: &'a str,
    username: &'a str,
    account_type: &'a str,
}

#[derive(Debug, Serialize)]
struct Credentials<'a> {
    email: &'a str,
    password: &'a str,
}

#[derive(Debug, Serialize)]
struct NewProfile<'a> {
    id: &'a str,
    full_name: &'a str,
    phone_number: &'a str,
    email: &'a str,
    account_type: &'a str,
}

/// Authenticated user plus the provider's access token.
#[derive(Debug, Clone, PartialEq)]
pub struct SignedInUser {
    pub user: User,
    /// Absent when signup is waiting for email confirmation.
    pub access_token: Option<String>,
}

/// Which credential authorizes a request.
#[derive(Clone, Copy)]
enum Bearer<'a> {
    Anon,
    Service(&'a str),
    User(&'a str),
}

/// Client for interacting with Supabase services.
///
/// # Thread Safety
///
/// The client uses an internal `reqwest::Client` which is already
/// designed to be shared across threads. Cloning is cheap.
#[derive(Clone)]
pub struct SupabaseClient {
    /// The underlying HTTP client.
    http_client: Client,

    /// The base URL of the Supabase project (e.g., `https://xxx.supabase.co`).
    base_url: String,

    /// The Supabase anonymous/public key for API authentication.
    anon_key: String,

    /// Service-role key, used only for profile inserts.
    service_key: Option<String>,
}

impl std::fmt::Debug for SupabaseClient {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("SupabaseClient")
            .field("base_url", &self.base_url)
            .field("has_service_key", &self.service_key.is_some())
            .finish_non_exhaustive()
    }
}

impl SupabaseClient {
    /// Creates a new Supabase client.
    ///
    /// # Errors
    ///
    /// Returns [`SupabaseError::Configuration`] if the HTTP client cannot be created.
    pub fn new(
        base_url: impl Into<String>,
        anon_key: impl Into<String>,
        service_key: Option<String>,
    ) -> Result<Self, SupabaseError> {
        let base_url = base_url.into().trim_end_matches('/').to_string();
        let anon_key = anon_key.into();

        let http_client = Client::builder()
            .timeout(REQUEST_TIMEOUT)
            .build()
            .map_err(|e| {
                SupabaseError::Configuration(format!("failed to create HTTP client: {e}"))
            })?;

        Ok(Self {
            http_client,
            base_url,
            anon_key,
            service_key,
        })
    }

    /// Returns the base URL of the Supabase project.
    pub fn base_url(&self) -> &str {
        &self.base_url
    }

    /// Returns `true` if a service-role key is configured.
    pub fn has_service_key(&self) -> bool {
        self.service_key.is_some()
    }

    // ==================== Auth ====================

    /// Creates an account with password credentials and profile metadata.
    ///
    /// # Errors
    ///
    /// - [`SupabaseError::Conflict`] - An account with this email exists
    /// - [`SupabaseError::InvalidResponse`] - Any other rejection
    pub async fn sign_up(&self, req: &RegisterRequest) -> Result<SignedInUser, SupabaseError> {
        let payload = SignUpPayload {
            email: &req.email,
            password: &req.password,
            data: SignUpMetadata {
                full_name: &req.full_name,
                phone_number: &req.phone_number,
                username: &req.username,
                account_type: DEFAULT_ACCOUNT_TYPE,
            },
        };

        let request = self
            .request(Method::POST, "/auth/v1/signup", Bearer::Anon)
            .json(&payload);

        // An existing account surfaces as 422 "User already registered",
        // which check_status maps to Conflict.
        let response = Self::check_status(self.send(request).await?, "sign_up").await?;

        let signed_up = match Self::parse::<SignUpResponse>(response, "sign_up").await? {
            SignUpResponse::Session(session) => SignedInUser {
                user: session.user.into(),
                access_token: session.access_token,
            },
            SignUpResponse::User(user) => SignedInUser {
                user: user.into(),
                access_token: None,
            },
        };

        debug!(user_id = %signed_up.user.id, "User signed up");
        Ok(signed_up)
    }

    /// Signs in with email and password.
    ///
    /// # Errors
    ///
    /// - [`SupabaseError::Unauthorized`] - Wrong email or password
    pub async fn sign_in(
        &self,
        email: &str,
        password: &str,
    ) -> Result<SignedInUser, SupabaseError> {
        let request = self
            .request(Method::POST, "/auth/v1/token", Bearer::Anon)
            .query(&[("grant_type", "password")])
            .json(&Credentials { email, password });

        let response = self.send(request).await?;

        // GoTrue answers bad credentials with 400 invalid_grant.
        if response.status() == StatusCode::BAD_REQUEST {
            debug!("Sign-in rejected");
            return Err(SupabaseError::Unauthorized);
        }

        let response = Self::check_status(response, "sign_in").await?;
        let session: AuthSession = Self::parse(response, "sign_in").await?;

        Ok(SignedInUser {
            user: session.user.into(),
            access_token: session.access_token,
        })
    }

    /// Resolves an access token to its user.
    ///
    /// # Errors
    ///
    /// - [`SupabaseError::Unauthorized`] - The token is invalid or expired
    pub async fn get_user(&self, token: &str) -> Result<User, SupabaseError> {
        let request = self.request(Method::GET, "/auth/v1/user", Bearer::User(token));
        let response = Self::check_status(self.send(request).await?, "get_user").await?;
        let user: AuthUser = Self::parse(response, "get_user").await?;

        debug!(user_id = %user.id, "Token resolved");
        Ok(user.into())
    }

    /// Inserts the `profiles` row for a new user using the service-role key.
    ///
    /// Returns `Ok(false)` without calling Supabase when no service key is
    /// configured.
    pub async fn create_profile(
        &self,
        user: &User,
        req: &RegisterRequest,
    ) -> Result<bool, SupabaseError> {
        let Some(service_key) = self.service_key.as_deref() else {
            warn!(
                user_id = %user.id,
                "No service role key configured, skipping profile creation"
            );
            return Ok(false);
        };

        let profile = NewProfile {
            id: &user.id,
            full_name: &req.full_name,
            phone_number: &req.phone_number,
            email: &req.email,
            account_type: DEFAULT_ACCOUNT_TYPE,
        };

        let request = self
            .request(Method::POST, "/rest/v1/profiles", Bearer::Service(service_key))
            .header("Prefer", "return=minimal")
            .json(&profile);

        Self::check_status(self.send(request).await?, "create_profile").await?;
        Ok(true)
    }

    // ==================== Events ====================

    /// Lists active events by date, optionally filtered by exact category and
    /// case-insensitive title substring.
    pub async fn list_events(
        &self,
        category: Option<&str>,
        search: Option<&str>,
    ) -> Result<Vec<Event>, SupabaseError> {
        let mut query = vec![
            ("status", format!("eq.{EVENT_STATUS_ACTIVE}")),
            ("order", "event_date.asc".to_string()),
        ];
        if let Some(category) = category.filter(|c| !c.is_empty()) {
            query.push(("category", format!("eq.{category}")));
        }
        if let Some(search) = search.filter(|s| !s.is_empty()) {
            query.push(("title", format!("ilike.*{search}*")));
        }

        let request = self
            .request(Method::GET, "/rest/v1/events", Bearer::Anon)
            .query(&query);
        let response = Self::check_status(self.send(request).await?, "list_events").await?;
        Self::parse(response, "list_events").await
    }

    /// Fetches one event by id, or `None` if no row matches.
    pub async fn get_event(&self, event_id: &str) -> Result<Option<Event>, SupabaseError> {
        let request = self
            .request(Method::GET, "/rest/v1/events", Bearer::Anon)
            .query(&[("id", format!("eq.{event_id}"))]);
        let response = Self::check_status(self.send(request).await?, "get_event").await?;
        let events: Vec<Event> = Self::parse(response, "get_event").await?;
        Ok(events.into_iter().next())
    }

    /// Inserts an event on behalf of `token`'s user and returns the stored row.
    pub async fn create_event(
        &self,
        token: &str,
        event: &NewEvent,
    ) -> Result<Event, SupabaseError> {
        let request = self
            .request(Method::POST, "/rest/v1/events", Bearer::User(token))
            .header("Prefer", "return=representation")
            .json(event);
        let response = Self::check_status(self.send(request).await?, "create_event").await?;
        Self::first_row(response, "create_event").await
    }

    /// Applies a partial update to an event.
    pub async fn update_event(
        &self,
        token: &str,
        event_id: &str,
        patch: &serde_json::Map<String, serde_json::Value>,
    ) -> Result<(), SupabaseError> {
        let request = self
            .request(Method::PATCH, "/rest/v1/events", Bearer::User(token))
            .query(&[("id", format!("eq.{event_id}"))])
            .header("Prefer", "return=minimal")
            .json(patch);
        Self::check_status(self.send(request).await?, "update_event").await?;
        Ok(())
    }

    /// Soft-deletes an event by marking it cancelled.
    pub async fn cancel_event(&self, token: &str, event_id: &str) -> Result<(), SupabaseError> {
        let mut patch = serde_json::Map::new();
        patch.insert("status".into(), STATUS_CANCELLED.into());
        patch.insert("updated_at".into(), timestamp(Utc::now()).into());
        self.update_event(token, event_id, &patch).await
    }

    // ==================== Registrations ====================

    /// Lists a user's registrations, newest first, each joined with its event.
    pub async fn list_registrations(
        &self,
        token: &str,
        user_id: &str,
        status: Option<&str>,
    ) -> Result<Vec<RegistrationWithEvent>, SupabaseError> {
        let mut query = vec![
            ("user_id", format!("eq.{user_id}")),
            ("select", "*,events(*)".to_string()),
        ];
        if let Some(status) = status.filter(|s| !s.is_empty()) {
            query.push(("status", format!("eq.{status}")));
        }
        query.push(("order", "created_at.desc".to_string()));

        let request = self
            .request(Method::GET, "/rest/v1/registrations", Bearer::User(token))
            .query(&query);
        let response =
            Self::check_status(self.send(request).await?, "list_registrations").await?;
        Self::parse(response, "list_registrations").await
    }

    /// Registers `user_id` for `event_id` with a confirmed status.
    ///
    /// # Errors
    ///
    /// - [`SupabaseError::Conflict`] - The user is already registered
    pub async fn create_registration(
        &self,
        token: &str,
        event_id: &str,
        user_id: &str,
        notes: &str,
    ) -> Result<Registration, SupabaseError> {
        let registration = NewRegistration {
            event_id: event_id.to_string(),
            user_id: user_id.to_string(),
            notes: notes.to_string(),
            status: REGISTRATION_STATUS_CONFIRMED.to_string(),
        };

        let request = self
            .request(Method::POST, "/rest/v1/registrations", Bearer::User(token))
            .header("Prefer", "return=representation")
            .json(&registration);
        let response =
            Self::check_status(self.send(request).await?, "create_registration").await?;
        Self::first_row(response, "create_registration").await
    }

    /// Marks one of `user_id`'s registrations cancelled.
    pub async fn cancel_registration(
        &self,
        token: &str,
        registration_id: &str,
        user_id: &str,
    ) -> Result<(), SupabaseError> {
        let request = self
            .request(Method::PATCH, "/rest/v1/registrations", Bearer::User(token))
            .query(&[
                ("id", format!("eq.{registration_id}")),
                ("user_id", format!("eq.{user_id}")),
            ])
            .header("Prefer", "return=minimal")
            .json(&serde_json::json!({ "status": STATUS_CANCELLED }));
        Self::check_status(self.send(request).await?, "cancel_registration").await?;
        Ok(())
    }

    /// Counts confirmed registrations for an event.
    pub async fn count_confirmed_registrations(
        &self,
        event_id: &str,
    ) -> Result<usize, SupabaseError> {
        let request = self
            .request(Method::GET, "/rest/v1/registrations", Bearer::Anon)
            .query(&[
                ("event_id", format!("eq.{event_id}")),
                ("status", format!("eq.{REGISTRATION_STATUS_CONFIRMED}")),
                ("select", "id".to_string()),
            ]);
        let response = Self::check_status(
            self.send(request).await?,
            "count_confirmed_registrations",
        )
        .await?;
        let rows: Vec<serde_json::Value> = Self::parse(response, "count_confirmed_registrations").await?;
        Ok(rows.len())
    }

    // ==================== Plumbing ====================

    fn request(&self, method: Method, path: &str, bearer: Bearer<'_>) -> RequestBuilder {
        let (apikey, token) = match bearer {
            Bearer::Anon => (self.anon_key.as_str(), self.anon_key.as_str()),
            Bearer::Service(key) => (key, key),
            Bearer::User(token) => (self.anon_key.as_str(), token),
        };

        self.http_client
            .request(method, format!("{}{path}", self.base_url))
            .header("apikey", apikey)
            .bearer_auth(token)
    }

    async fn send(&self, request: RequestBuilder) -> Result<Response, SupabaseError> {
        request.send().await.map_err(|e| {
            if e.is_timeout() {
                SupabaseError::Timeout(REQUEST_TIMEOUT)
            } else if e.is_connect() {
                SupabaseError::Unavailable(format!("connection failed: {e}"))
            } else {
                SupabaseError::Unavailable(format!("request failed: {e}"))
            }
        })
    }

    /// Maps a non-success response to a [`SupabaseError`].
    async fn check_status(
        response: Response,
        operation: &'static str,
    ) -> Result<Response, SupabaseError> {
        let status = response.status();
        if status.is_success() {
            return Ok(response);
        }

        let body = response.text().await.unwrap_or_default();

        if status == StatusCode::UNAUTHORIZED || status == StatusCode::FORBIDDEN {
            debug!(operation, status = %status, "Supabase rejected credentials");
            return Err(SupabaseError::Unauthorized);
        }

        if status == StatusCode::CONFLICT || is_conflict_body(&body) {
            debug!(operation, status = %status, "Supabase reported a conflict");
            return Err(SupabaseError::Conflict(format!("{operation}: {status}")));
        }

        error!(operation, status = %status, body = %body, "Unexpected response from Supabase");
        Err(SupabaseError::InvalidResponse(format!(
            "{operation}: unexpected status {status}"
        )))
    }

    async fn parse<T: DeserializeOwned>(
        response: Response,
        operation: &'static str,
    ) -> Result<T, SupabaseError> {
        response.json().await.map_err(|e| {
            SupabaseError::InvalidResponse(format!("{operation}: failed to parse response: {e}"))
        })
    }

    async fn first_row<T: DeserializeOwned>(
        response: Response,
        operation: &'static str,
    ) -> Result<T, SupabaseError> {
        let rows: Vec<T> = Self::parse(response, operation).await?;
        rows.into_iter().next().ok_or_else(|| {
            SupabaseError::InvalidResponse(format!("{operation}: no row returned"))
        })
    }
}

/// Recognizes duplicate-row failures that are not reported as HTTP 409.
fn is_conflict_body(body: &str) -> bool {
    let lower = body.to_ascii_lowercase();
    lower.contains(UNIQUE_VIOLATION)
        || lower.contains("already registered")
        || lower.contains("duplicate key")
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;
    use wiremock::matchers::{body_json, header, method, path, query_param};
    use wiremock::{Mock, MockServer, ResponseTemplate};

    /// Helper to create a test client pointing to a mock server.
    fn create_test_client(mock_server: &MockServer) -> SupabaseClient {
        SupabaseClient::new(mock_server.uri(), "test-anon-key", Some("service-key".into()))
            .expect("failed to create test client")
    }

    fn register_request() -> RegisterRequest {
        RegisterRequest {
            email: "ada@example.com".into(),
            password: "Secret123".into(),
            full_name: "Ada Lovelace".into(),
            phone_number: "+15551234567".into(),
            username: "ada".into(),
        }
    }

    // ==================== SupabaseClient::new tests ====================

    #[test]
    fn new_trims_trailing_slash_from_url() {
        let client = SupabaseClient::new("https://test.supabase.co/", "anon-key", None)
            .expect("should create client");
        assert_eq!(client.base_url(), "https://test.supabase.co");
        assert!(!client.has_service_key());
    }

    #[test]
    fn debug_hides_keys() {
        let client =
            SupabaseClient::new("https://test.supabase.co", "anon-secret", Some("svc".into()))
                .unwrap();
        let debug = format!("{client:?}");
        assert!(!debug.contains("anon-secret"));
        assert!(debug.contains("has_service_key: true"));
    }

    // ==================== auth tests ====================

    #[tokio::test]
    async fn sign_up_returns_user_and_token() {
        let mock_server = MockServer::start().await;

        Mock::given(method("POST"))
            .and(path("/auth/v1/signup"))
            .and(header("apikey", "test-anon-key"))
            .and(header("Authorization", "Bearer test-anon-key"))
            .and(body_json(json!({
                "email": "ada@example.com",
                "password": "Secret123",
                "data": {
                    "full_name": "Ada Lovelace",
                    "phone_number": "+15551234567",
                    "username": "ada",
                    "account_type": "attendee"
                }
            })))
            .respond_with(ResponseTemplate::new(200).set_body_json(json!({
                "access_token": "access-abc",
                "user": {
                    "id": "user-1",
                    "email": "ada@example.com",
                    "created_at": "2026-01-01T00:00:00Z",
                    "user_metadata": {
                        "full_name": "Ada Lovelace",
                        "phone_number": "+15551234567",
                        "username": "ada",
                        "account_type": "attendee"
                    }
                }
            })))
            .expect(1)
            .mount(&mock_server)
            .await;

        let client = create_test_client(&mock_server);
        let signed = client.sign_up(&register_request()).await.unwrap();

        assert_eq!(signed.access_token.as_deref(), Some("access-abc"));
        assert_eq!(signed.user.id, "user-1");
        assert_eq!(signed.user.full_name, "Ada Lovelace");
        assert_eq!(signed.user.account_type, "attendee");
        assert_eq!(signed.user.created_at, "2026-01-01T00:00:00Z");
    }

    #[tokio::test]
    async fn sign_up_without_session_has_no_token() {
        let mock_server = MockServer::start().await;

        Mock::given(method("POST"))
            .and(path("/auth/v1/signup"))
            .respond_with(ResponseTemplate::new(200).set_body_json(json!({
                "id": "user-2",
                "email": "ada@example.com",
                "raw_user_meta_data": { "full_name": "Ada Lovelace" }
            })))
            .mount(&mock_server)
            .await;

        let client = create_test_client(&mock_server);
        let signed = client.sign_up(&register_request()).await.unwrap();

        assert!(signed.access_token.is_none());
        assert_eq!(signed.user.id, "user-2");
        assert_eq!(signed.user.full_name, "Ada Lovelace");
    }

    #[tokio::test]
    async fn sign_up_existing_account_is_conflict() {
        let mock_server = MockServer::start().await;

        Mock::given(method("POST"))
            .and(path("/auth/v1/signup"))
            .respond_with(ResponseTemplate::new(422).set_body_json(json!({
                "code": 422,
                "msg": "User already registered"
            })))
            .mount(&mock_server)
            .await;

        let client = create_test_client(&mock_server);
        let result = client.sign_up(&register_request()).await;

        assert!(matches!(result, Err(SupabaseError::Conflict(_))));
    }

    #[tokio::test]
    async fn sign_in_returns_session() {
        let mock_server = MockServer::start().await;

        Mock::given(method("POST"))
            .and(path("/auth/v1/token"))
            .and(query_param("grant_type", "password"))
            .and(body_json(json!({"email": "ada@example.com", "password": "Secret123"})))
            .respond_with(ResponseTemplate::new(200).set_body_json(json!({
                "access_token": "access-xyz",
                "user": { "id": "user-1", "email": "ada@example.com" }
            })))
            .mount(&mock_server)
            .await;

        let client = create_test_client(&mock_server);
        let signed = client.sign_in("ada@example.com", "Secret123").await.unwrap();

        assert_eq!(signed.access_token.as_deref(), Some("access-xyz"));
        assert_eq!(signed.user.email, "ada@example.com");
        assert_eq!(signed.user.full_name, "");
    }

    #[tokio::test]
    async fn sign_in_bad_credentials_is_unauthorized() {
        let mock_server = MockServer::start().await;

        Mock::given(method("POST"))
            .and(path("/auth/v1/token"))
            .respond_with(ResponseTemplate::new(400).set_body_json(json!({
                "error": "invalid_grant",
                "error_description": "Invalid login credentials"
            })))
            .mount(&mock_server)
            .await;

        let client = create_test_client(&mock_server);
        let result = client.sign_in("ada@example.com", "wrong").await;

        assert!(matches!(result, Err(SupabaseError::Unauthorized)));
    }

    #[tokio::test]
    async fn get_user_uses_caller_token() {
        let mock_server = MockServer::start().await;

        Mock::given(method("GET"))
            .and(path("/auth/v1/user"))
            .and(header("apikey", "test-anon-key"))
            .and(header("Authorization", "Bearer user-jwt"))
            .respond_with(ResponseTemplate::new(200).set_body_json(json!({
                "id": "user-123",
                "email": "user@example.com",
                "user_metadata": { "username": "u123" }
            })))
            .mount(&mock_server)
            .await;

        let client = create_test_client(&mock_server);
        let user = client.get_user("user-jwt").await.unwrap();

        assert_eq!(user.id, "user-123");
        assert_eq!(user.username, "u123");
    }

    #[tokio::test]
    async fn get_user_returns_unauthorized_on_401() {
        let mock_server = MockServer::start().await;

        Mock::given(method("GET"))
            .and(path("/auth/v1/user"))
            .respond_with(ResponseTemplate::new(401))
            .mount(&mock_server)
            .await;

        let client = create_test_client(&mock_server);
        let result = client.get_user("invalid-jwt").await;

        assert!(matches!(result, Err(SupabaseError::Unauthorized)));
    }

    #[tokio::test]
    async fn get_user_returns_invalid_response_on_malformed_json() {
        let mock_server = MockServer::start().await;

        Mock::given(method("GET"))
            .and(path("/auth/v1/user"))
            .respond_with(ResponseTemplate::new(200).set_body_string("not json"))
            .mount(&mock_server)
            .await;

        let client = create_test_client(&mock_server);
        let result = client.get_user("token").await;

        assert!(matches!(result, Err(SupabaseError::InvalidResponse(_))));
    }

    #[tokio::test]
    async fn unreachable_host_is_unavailable() {
        let client = SupabaseClient::new("http://127.0.0.1:1", "key", None)
            .expect("should create client");

        let result = client.get_user("token").await;

        assert!(matches!(
            result,
            Err(SupabaseError::Unavailable(_)) | Err(SupabaseError::Timeout(_))
        ));
    }

    // ==================== profile tests ====================

    #[tokio::test]
    async fn create_profile_uses_service_key() {
        let mock_server = MockServer::start().await;

        Mock::given(method("POST"))
            .and(path("/rest/v1/profiles"))
            .and(header("apikey", "service-key"))
            .and(header("Authorization", "Bearer service-key"))
            .and(header("Prefer", "return=minimal"))
            .and(body_json(json!({
                "id": "user-1",
                "full_name": "Ada Lovelace",
                "phone_number": "+15551234567",
                "email": "ada@example.com",
                "account_type": "attendee"
            })))
            .respond_with(ResponseTemplate::new(201))
            .expect(1)
            .mount(&mock_server)
            .await;

        let client = create_test_client(&mock_server);
        let user = User {
            id: "user-1".into(),
            ..Default::default()
        };

        assert!(client.create_profile(&user, &register_request()).await.unwrap());
    }

    #[tokio::test]
    async fn create_profile_skipped_without_service_key() {
        let mock_server = MockServer::start().await;

        Mock::given(method("POST"))
            .and(path("/rest/v1/profiles"))
            .respond_with(ResponseTemplate::new(201))
            .expect(0)
            .mount(&mock_server)
            .await;

        let client = SupabaseClient::new(mock_server.uri(), "anon", None).unwrap();
        let user = User::default();

        assert!(!client.create_profile(&user, &register_request()).await.unwrap());
    }

    // ==================== event tests ====================

    #[tokio::test]
    async fn list_events_sends_filters_as_query_params() {
        let mock_server = MockServer::start().await;

        Mock::given(method("GET"))
            .and(path("/rest/v1/events"))
            .and(query_param("status", "eq.active"))
            .and(query_param("order", "event_date.asc"))
            .and(query_param("category", "eq.music"))
            .and(query_param("title", "ilike.*jazz & blues*"))
            .and(header("Authorization", "Bearer test-anon-key"))
            .respond_with(ResponseTemplate::new(200).set_body_json(json!([
                { "id": "e1", "title": "Jazz & Blues Night", "status": "active" }
            ])))
            .expect(1)
            .mount(&mock_server)
            .await;

        let client = create_test_client(&mock_server);
        let events = client
            .list_events(Some("music"), Some("jazz & blues"))
            .await
            .unwrap();

        assert_eq!(events.len(), 1);
        assert_eq!(events[0].title, "Jazz & Blues Night");
    }

    #[tokio::test]
    async fn list_events_returns_invalid_response_on_error_status() {
        let mock_server = MockServer::start().await;

        Mock::given(method("GET"))
            .and(path("/rest/v1/events"))
            .respond_with(ResponseTemplate::new(500).set_body_string("Server Error"))
            .mount(&mock_server)
            .await;

        let client = create_test_client(&mock_server);
        let result = client.list_events(None, None).await;

        assert!(matches!(result, Err(SupabaseError::InvalidResponse(_))));
    }

    #[tokio::test]
    async fn get_event_returns_none_for_empty_result() {
        let mock_server = MockServer::start().await;

        Mock::given(method("GET"))
            .and(path("/rest/v1/events"))
            .and(query_param("id", "eq.missing"))
            .respond_with(ResponseTemplate::new(200).set_body_json(json!([])))
            .mount(&mock_server)
            .await;

        let client = create_test_client(&mock_server);
        assert!(client.get_event("missing").await.unwrap().is_none());
    }

    #[tokio::test]
    async fn create_event_returns_stored_row() {
        let mock_server = MockServer::start().await;

        Mock::given(method("POST"))
            .and(path("/rest/v1/events"))
            .and(header("Authorization", "Bearer user-jwt"))
            .and(header("Prefer", "return=representation"))
            .respond_with(ResponseTemplate::new(201).set_body_json(json!([
                { "id": "e9", "title": "Launch", "organizer_id": "u1", "status": "active" }
            ])))
            .mount(&mock_server)
            .await;

        let client = create_test_client(&mock_server);
        let new_event = NewEvent::from_request(
            crate::types::CreateEventRequest {
                title: "Launch".into(),
                event_date: "2026-09-01".into(),
                ..Default::default()
            },
            "u1",
        );

        let event = client.create_event("user-jwt", &new_event).await.unwrap();
        assert_eq!(event.id, "e9");
    }

    #[tokio::test]
    async fn create_event_with_empty_representation_is_invalid() {
        let mock_server = MockServer::start().await;

        Mock::given(method("POST"))
            .and(path("/rest/v1/events"))
            .respond_with(ResponseTemplate::new(201).set_body_json(json!([])))
            .mount(&mock_server)
            .await;

        let client = create_test_client(&mock_server);
        let new_event = NewEvent::from_request(Default::default(), "u1");

        let result = client.create_event("user-jwt", &new_event).await;
        assert!(matches!(result, Err(SupabaseError::InvalidResponse(_))));
    }

    #[tokio::test]
    async fn cancel_event_patches_status() {
        let mock_server = MockServer::start().await;

        Mock::given(method("PATCH"))
            .and(path("/rest/v1/events"))
            .and(query_param("id", "eq.e1"))
            .and(header("Prefer", "return=minimal"))
            .respond_with(ResponseTemplate::new(204))
            .expect(1)
            .mount(&mock_server)
            .await;

        let client = create_test_client(&mock_server);
        client.cancel_event("user-jwt", "e1").await.unwrap();

        let requests = mock_server.received_requests().await.unwrap();
        let body: serde_json::Value = serde_json::from_slice(&requests[0].body).unwrap();
        assert_eq!(body["status"], "cancelled");
        assert!(body["updated_at"].is_string());
    }

    #[tokio::test]
    async fn rls_rejection_is_unauthorized() {
        let mock_server = MockServer::start().await;

        Mock::given(method("PATCH"))
            .and(path("/rest/v1/events"))
            .respond_with(ResponseTemplate::new(403).set_body_json(json!({
                "code": "42501",
                "message": "new row violates row-level security policy"
            })))
            .mount(&mock_server)
            .await;

        let client = create_test_client(&mock_server);
        let result = client
            .update_event("user-jwt", "e1", &serde_json::Map::new())
            .await;

        assert!(matches!(result, Err(SupabaseError::Unauthorized)));
    }

    // ==================== registration tests ====================

    #[tokio::test]
    async fn list_registrations_joins_events() {
        let mock_server = MockServer::start().await;

        Mock::given(method("GET"))
            .and(path("/rest/v1/registrations"))
            .and(query_param("user_id", "eq.u1"))
            .and(query_param("select", "*,events(*)"))
            .and(query_param("status", "eq.confirmed"))
            .and(query_param("order", "created_at.desc"))
            .and(header("Authorization", "Bearer user-jwt"))
            .respond_with(ResponseTemplate::new(200).set_body_json(json!([
                {
                    "id": "r1", "event_id": "e1", "user_id": "u1", "status": "confirmed",
                    "events": { "id": "e1", "title": "Gig" }
                }
            ])))
            .mount(&mock_server)
            .await;

        let client = create_test_client(&mock_server);
        let rows = client
            .list_registrations("user-jwt", "u1", Some("confirmed"))
            .await
            .unwrap();

        assert_eq!(rows.len(), 1);
        assert_eq!(rows[0].events.as_ref().unwrap().title, "Gig");
    }

    #[tokio::test]
    async fn create_registration_duplicate_is_conflict() {
        let mock_server = MockServer::start().await;

        Mock::given(method("POST"))
            .and(path("/rest/v1/registrations"))
            .respond_with(ResponseTemplate::new(409).set_body_json(json!({
                "code": "23505",
                "message": "duplicate key value violates unique constraint"
            })))
            .mount(&mock_server)
            .await;

        let client = create_test_client(&mock_server);
        let result = client
            .create_registration("user-jwt", "e1", "u1", "")
            .await;

        assert!(matches!(result, Err(SupabaseError::Conflict(_))));
    }

    #[tokio::test]
    async fn create_registration_sends_confirmed_row() {
        let mock_server = MockServer::start().await;

        Mock::given(method("POST"))
            .and(path("/rest/v1/registrations"))
            .and(body_json(json!({
                "event_id": "e1",
                "user_id": "u1",
                "notes": "aisle seat",
                "status": "confirmed"
            })))
            .respond_with(ResponseTemplate::new(201).set_body_json(json!([
                { "id": "r7", "event_id": "e1", "user_id": "u1", "status": "confirmed", "notes": "aisle seat" }
            ])))
            .mount(&mock_server)
            .await;

        let client = create_test_client(&mock_server);
        let registration = client
            .create_registration("user-jwt", "e1", "u1", "aisle seat")
            .await
            .unwrap();

        assert_eq!(registration.id, "r7");
        assert_eq!(registration.notes.as_deref(), Some("aisle seat"));
    }

    #[tokio::test]
    async fn cancel_registration_scopes_to_user() {
        let mock_server = MockServer::start().await;

        Mock::given(method("PATCH"))
            .and(path("/rest/v1/registrations"))
            .and(query_param("id", "eq.r1"))
            .and(query_param("user_id", "eq.u1"))
            .and(body_json(json!({ "status": "cancelled" })))
            .respond_with(ResponseTemplate::new(204))
            .expect(1)
            .mount(&mock_server)
            .await;

        let client = create_test_client(&mock_server);
        client
            .cancel_registration("user-jwt", "r1", "u1")
            .await
            .unwrap();
    }

    #[tokio::test]
    async fn count_confirmed_registrations_counts_rows() {
        let mock_server = MockServer::start().await;

        Mock::given(method("GET"))
            .and(path("/rest/v1/registrations"))
            .and(query_param("event_id", "eq.e1"))
            .and(query_param("status", "eq.confirmed"))
            .and(query_param("select", "id"))
            .respond_with(ResponseTemplate::new(200).set_body_json(json!([
                { "id": "r1" }, { "id": "r2" }, { "id": "r3" }
            ])))
            .mount(&mock_server)
            .await;

        let client = create_test_client(&mock_server);
        assert_eq!(client.count_confirmed_registrations("e1").await.unwrap(), 3);
    }

    // ==================== error mapping tests ====================

    #[test]
    fn conflict_bodies_are_recognized() {
        assert!(is_conflict_body(r#"{"code":"23505"}"#));
        assert!(is_conflict_body("User already registered"));
        assert!(is_conflict_body("duplicate key value violates unique constraint"));
        assert!(!is_conflict_body("row-level security"));
    }

    #[test]
    fn supabase_error_display() {
        assert_eq!(
            SupabaseError::Unauthorized.to_string(),
            "unauthorized: invalid or expired token"
        );
        assert_eq!(
            SupabaseError::Timeout(Duration::from_secs(10)).to_string(),
            "request timed out after 10s"
        );
        assert_eq!(
            SupabaseError::Unavailable("connection refused".into()).to_string(),
            "supabase unavailable: connection refused"
        );
        assert_eq!(
            SupabaseError::Conflict("create_registration: 409 Conflict".into()).to_string(),
            "conflict: create_registration: 409 Conflict"
        );
    }
}
