//! HTTP route handlers for the GoTicket server.
//!
//! This module provides the HTTP API endpoints:
//!
//! - `GET /` - API index
//! - `GET /health` - Health check endpoint
//! - `POST /api/register`, `POST /api/login` - Account signup and sign-in
//!   (rate limited)
//! - `GET /api/profile` - The caller's profile
//! - `GET|POST /api/events`, `GET|PUT|DELETE /api/events/{id}` - Events
//! - `GET|POST /api/registrations`, `POST /api/registrations/cancel` -
//!   The caller's event registrations
//!
//! # Architecture
//!
//! Routes are grouped by the middleware [`Pipeline`] they need and each group
//! is wrapped separately, so the rate limiter only ever sees the signup and
//! sign-in endpoints. All routes share application state through
//! [`AppState`], which contains:
//! - Configuration
//! - Supabase client used by every handler that touches data
//! - Rate limiter shared by the rate-limited group
//! - Server start time for uptime reporting
//!
//! Handlers never decide whether a token is valid. They hand it to Supabase
//! and translate the outcome into the error envelope.
//!
//! # Example
//!
//! ```rust,no_run
//! use std::net::SocketAddr;
//! use goticket_server::routes::{create_router, AppState};
//! use goticket_server::config::Config;
//!
//! #[tokio::main]
//! async fn main() {
//!     let config = Config::from_env().expect("failed to load config");
//!     let state = AppState::new(config).expect("failed to build state");
//!     let app = create_router(state);
//!
//!     let listener = tokio::net::TcpListener::bind("0.0.0.0:8080").await.unwrap();
//!     axum::serve(listener, app.into_make_service_with_connect_info::<SocketAddr>())
//!         .await
//!         .unwrap();
//! }
//! ```

use std::sync::Arc;

use axum::{
    body::Bytes,
    extract::{Path, Query, State},
    http::{Method, StatusCode},
    response::{IntoResponse, Response},
    routing::{any, get, post},
    Extension, Json, Router,
};
use chrono::Utc;
use serde::de::DeserializeOwned;
use serde::{Deserialize, Serialize};
use tokio::time::Instant;
use tower_http::trace::TraceLayer;
use tracing::{debug, error, info, warn};
use uuid::Uuid;

use crate::config::Config;
use crate::error::{ApiError, ApiResult};
use crate::middleware::{Authenticate, Cors, Pipeline, PipelineBuilder, RateLimit, UserToken};
use crate::rate_limit::RateLimiter;
use crate::supabase::{SupabaseClient, SupabaseError};
use crate::types::{
    sanitize_event_patch, AuthResponse, CancelRegistrationRequest, CreateEventRequest, Event,
    EventRegistrationRequest, EventWithRegistrations, LoginRequest, NewEvent, RegisterRequest,
    Registration, RegistrationWithEvent, User,
};
use crate::validation::validate_registration;

// ============================================================================
// Constants
// ============================================================================

/// Name reported by the API index.
const API_NAME: &str = "GoTicket API Server";

/// Version reported by the API index.
const API_VERSION: &str = "1.0.0";

/// Generic title of 500 responses.
const SERVER_ERROR: &str = "Server error";

// ============================================================================
// Application State
// ============================================================================

/// Shared application state for all route handlers.
///
/// Every field is a cheap handle, so the state is cloned into each request.
#[derive(Clone)]
pub struct AppState {
    /// Server configuration.
    pub config: Arc<Config>,

    /// Client for the identity provider and the database.
    pub supabase: SupabaseClient,

    /// Sliding window limiter for signup and sign-in.
    pub rate_limiter: RateLimiter,

    /// Server start time for uptime calculation.
    pub start_time: Instant,
}

impl AppState {
    /// Creates application state from configuration.
    ///
    /// The Supabase client and rate limiter are built from the config values.
    ///
    /// # Errors
    ///
    /// Returns [`SupabaseError::Configuration`] if the HTTP client cannot be
    /// created.
    ///
    /// # Example
    ///
    /// ```rust,no_run
    /// use goticket_server::routes::AppState;
    /// use goticket_server::config::Config;
    ///
    /// let config = Config::from_env().expect("failed to load config");
    /// let state = AppState::new(config).expect("failed to build state");
    /// ```
    pub fn new(config: Config) -> Result<Self, SupabaseError> {
        let supabase = SupabaseClient::new(
            config.supabase_url.clone(),
            config.supabase_anon_key.clone(),
            config.supabase_service_key.clone(),
        )?;
        let rate_limiter = RateLimiter::new(config.rate_limit_requests, config.rate_limit_window);
        Ok(Self::with_components(config, supabase, rate_limiter))
    }

    /// Creates application state with a custom client and rate limiter.
    ///
    /// Useful for testing or when the limiter is shared with other tasks.
    #[must_use]
    pub fn with_components(
        config: Config,
        supabase: SupabaseClient,
        rate_limiter: RateLimiter,
    ) -> Self {
        Self {
            config: Arc::new(config),
            supabase,
            rate_limiter,
            start_time: Instant::now(),
        }
    }
}

impl std::fmt::Debug for AppState {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("AppState")
            .field("config", &"<Config>")
            .field("supabase", &self.supabase)
            .field("rate_limiter", &self.rate_limiter)
            .field("start_time", &self.start_time)
            .finish()
    }
}

// ============================================================================
// Router
// ============================================================================

/// Creates the application router with all routes and pipelines configured.
///
/// | Group | Pipeline |
/// |---|---|
/// | `/`, `/health`, `/api/events/` | CORS |
/// | `/api/register`, `/api/login` | CORS → rate limit |
/// | `/api/profile`, `/api/registrations`, `/api/registrations/cancel` | CORS → auth |
/// | `/api/events`, `/api/events/{id}` | CORS → auth on mutating methods |
///
/// Unsupported methods on a known path get a 405 envelope from inside the
/// pipeline, so they still carry CORS headers. Unknown paths get a 404
/// envelope.
pub fn create_router(state: AppState) -> Router {
    let public = cors_only().wrap(
        Router::new()
            .route("/", get(get_home).fallback(only_get))
            .route("/health", get(get_health).fallback(only_get))
            .route("/api/events/", any(missing_event_id)),
    );

    let rate_limited = PipelineBuilder::new()
        .with(Cors)
        .with(RateLimit::new(state.rate_limiter.clone()))
        .build()
        .wrap(
            Router::new()
                .route("/api/register", post(post_register).fallback(only_post))
                .route("/api/login", post(post_login).fallback(only_post)),
        );

    let protected = PipelineBuilder::new()
        .with(Cors)
        .with(Authenticate::all_methods())
        .build()
        .wrap(
            Router::new()
                .route("/api/profile", get(get_profile).fallback(only_get))
                .route(
                    "/api/registrations",
                    get(list_registrations)
                        .post(create_registration)
                        .fallback(only_get_post),
                )
                .route(
                    "/api/registrations/cancel",
                    post(cancel_registration).fallback(only_post),
                ),
        );

    let events = PipelineBuilder::new()
        .with(Cors)
        .with(Authenticate::methods([Method::POST]))
        .build()
        .wrap(Router::new().route(
            "/api/events",
            get(list_events).post(create_event).fallback(only_get_post),
        ));

    let event_detail = PipelineBuilder::new()
        .with(Cors)
        .with(Authenticate::methods([Method::PUT, Method::DELETE]))
        .build()
        .wrap(
            Router::new().route(
                "/api/events/{id}",
                get(get_event)
                    .put(update_event)
                    .delete(cancel_event)
                    .fallback(only_get_put_delete),
            ),
        );

    Router::new()
        .merge(public)
        .merge(rate_limited)
        .merge(protected)
        .merge(events)
        .merge(event_detail)
        .fallback(not_found)
        .layer(TraceLayer::new_for_http())
        .with_state(state)
}

fn cors_only() -> Pipeline {
    PipelineBuilder::new().with(Cors).build()
}

async fn not_found() -> ApiError {
    ApiError::not_found("Not found", "The requested resource does not exist")
}

/// `/api/events/` with an empty id, for any method.
async fn missing_event_id() -> ApiError {
    ApiError::validation("Invalid request", "Event ID is required")
}

async fn only_get() -> ApiError {
    ApiError::method_not_allowed("Only GET method is allowed")
}

async fn only_post() -> ApiError {
    ApiError::method_not_allowed("Only POST method is allowed")
}

async fn only_get_post() -> ApiError {
    ApiError::method_not_allowed("Only GET and POST methods are allowed")
}

async fn only_get_put_delete() -> ApiError {
    ApiError::method_not_allowed("Only GET, PUT, and DELETE methods are allowed")
}

// ============================================================================
// Shared helpers
// ============================================================================

/// Parses a JSON body, answering 400 on malformed input.
fn parse_json<T: DeserializeOwned>(body: &Bytes) -> ApiResult<T> {
    serde_json::from_slice(body).map_err(|e| {
        debug!(error = %e, "Rejected malformed JSON body");
        ApiError::validation("Invalid request", "Invalid JSON format")
    })
}

/// Resolves the caller behind `token` with the identity provider.
async fn resolve_user(state: &AppState, token: &UserToken) -> ApiResult<User> {
    state.supabase.get_user(token.as_str()).await.map_err(|e| {
        debug!(error = %e, "Token rejected by identity provider");
        ApiError::unauthorized("Unauthorized", "Invalid or expired token")
    })
}

/// Loads an event, answering 404 when the id is malformed, the lookup fails
/// or no row matches.
async fn load_event(state: &AppState, event_id: &str) -> ApiResult<Event> {
    let event_not_found = || ApiError::not_found("Not found", "Event not found");

    if Uuid::parse_str(event_id).is_err() {
        debug!(event_id, "Rejected malformed event id");
        return Err(event_not_found());
    }

    match state.supabase.get_event(event_id).await {
        Ok(Some(event)) => Ok(event),
        Ok(None) => Err(event_not_found()),
        Err(e) => {
            warn!(event_id, error = %e, "Event lookup failed");
            Err(event_not_found())
        }
    }
}

fn server_error(message: &str) -> ApiError {
    ApiError::internal(SERVER_ERROR, message)
}

// ============================================================================
// Index and health
// ============================================================================

/// One entry of the API index.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct EndpointInfo {
    pub path: String,
    pub method: String,
    pub description: String,
}

/// Response body of `GET /`.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct IndexResponse {
    pub message: String,
    pub version: String,
    pub endpoints: Vec<EndpointInfo>,
}

const ENDPOINTS: [(&str, &str, &str); 11] = [
    ("/api/register", "POST", "User registration"),
    ("/api/login", "POST", "User authentication"),
    ("/api/profile", "GET", "User profile (protected)"),
    ("/api/events", "GET", "List all active events"),
    ("/api/events", "POST", "Create a new event (protected)"),
    ("/api/events/{id}", "GET", "Get event details"),
    ("/api/events/{id}", "PUT", "Update event (protected, organizer only)"),
    ("/api/events/{id}", "DELETE", "Cancel event (protected, organizer only)"),
    ("/api/registrations", "GET", "List user registrations (protected)"),
    ("/api/registrations", "POST", "Register for an event (protected)"),
    ("/api/registrations/cancel", "POST", "Cancel a registration (protected)"),
];

/// GET / - API index.
async fn get_home() -> Json<IndexResponse> {
    Json(IndexResponse {
        message: API_NAME.to_string(),
        version: API_VERSION.to_string(),
        endpoints: ENDPOINTS
            .iter()
            .map(|(path, method, description)| EndpointInfo {
                path: (*path).to_string(),
                method: (*method).to_string(),
                description: (*description).to_string(),
            })
            .collect(),
    })
}

/// Response body for the health check endpoint.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct HealthResponse {
    /// Server status (always "ok" if responding).
    pub status: String,

    /// Number of clients the rate limiter currently tracks.
    pub tracked_clients: usize,

    /// Server uptime in seconds.
    pub uptime_seconds: u64,
}

/// GET /health - Health check endpoint.
///
/// No authentication required.
///
/// # Response
///
/// ```json
/// {
///   "status": "ok",
///   "tracked_clients": 3,
///   "uptime_seconds": 3600
/// }
/// ```
async fn get_health(State(state): State<AppState>) -> Json<HealthResponse> {
    Json(HealthResponse {
        status: "ok".to_string(),
        tracked_clients: state.rate_limiter.source_count(),
        uptime_seconds: state.start_time.elapsed().as_secs(),
    })
}

// ============================================================================
// Accounts
// ============================================================================

/// POST /api/register - Create an account.
///
/// # Responses
///
/// - `200 OK` - `{user, token, message}`; `token` is null while email
///   confirmation is pending
/// - `400 Bad Request` - Malformed JSON or a failed validation rule
/// - `409 Conflict` - The email is already registered
/// - `500 Internal Server Error` - Signup failed upstream
async fn post_register(State(state): State<AppState>, body: Bytes) -> ApiResult<Json<AuthResponse>> {
    let req: RegisterRequest = parse_json(&body)?;

    validate_registration(&req).map_err(|e| ApiError::validation("Validation error", e.to_string()))?;

    let signed_in = match state.supabase.sign_up(&req).await {
        Ok(signed_in) => signed_in,
        Err(SupabaseError::Conflict(_)) => {
            return Err(ApiError::conflict(
                "User exists",
                "An account with this email already exists",
            ));
        }
        Err(e) => {
            error!(error = %e, "Signup failed");
            return Err(ApiError::internal(
                "Registration failed",
                "Unable to create user account",
            ));
        }
    };

    let user_id = signed_in.user.id.clone();
    info!(user_id = %user_id, "User registered");

    match state.supabase.create_profile(&signed_in.user, &req).await {
        Ok(true) => debug!(user_id = %user_id, "Profile created"),
        Ok(false) => {}
        Err(e) => warn!(user_id = %user_id, error = %e, "Profile creation failed"),
    }

    Ok(Json(AuthResponse {
        user: signed_in.user,
        token: signed_in.access_token,
        message: "Registration successful".to_string(),
    }))
}

/// POST /api/login - Password sign-in.
///
/// # Responses
///
/// - `200 OK` - `{user, token, message}`
/// - `400 Bad Request` - Malformed JSON or missing email/password
/// - `401 Unauthorized` - Sign-in rejected for any reason
async fn post_login(State(state): State<AppState>, body: Bytes) -> ApiResult<Json<AuthResponse>> {
    let req: LoginRequest = parse_json(&body)?;

    if req.email.is_empty() || req.password.is_empty() {
        return Err(ApiError::validation(
            "Missing fields",
            "Email and password are required",
        ));
    }

    let signed_in = state
        .supabase
        .sign_in(&req.email, &req.password)
        .await
        .map_err(|e| {
            debug!(error = %e, "Sign-in rejected");
            ApiError::unauthorized("Invalid credentials", "Email or password is incorrect")
        })?;

    info!(user_id = %signed_in.user.id, "User signed in");

    Ok(Json(AuthResponse {
        user: signed_in.user,
        token: signed_in.access_token,
        message: "Login successful".to_string(),
    }))
}

/// GET /api/profile - The caller's user record.
async fn get_profile(
    State(state): State<AppState>,
    Extension(token): Extension<UserToken>,
) -> ApiResult<Json<User>> {
    state
        .supabase
        .get_user(token.as_str())
        .await
        .map(Json)
        .map_err(|e| {
            debug!(error = %e, "Profile lookup rejected");
            ApiError::unauthorized("Invalid token", "Unable to verify user")
        })
}

// ============================================================================
// Events
// ============================================================================

/// Query parameters of `GET /api/events`.
#[derive(Debug, Default, Deserialize)]
pub struct EventFilters {
    pub category: Option<String>,
    pub search: Option<String>,
}

/// Response body of `GET /api/events`.
#[derive(Debug, Serialize)]
struct EventList {
    events: Vec<Event>,
    count: usize,
}

/// GET /api/events - Active events, soonest first.
///
/// Empty filter values are ignored.
async fn list_events(
    State(state): State<AppState>,
    Query(filters): Query<EventFilters>,
) -> ApiResult<Json<EventList>> {
    let category = filters.category.as_deref().filter(|c| !c.is_empty());
    let search = filters.search.as_deref().filter(|s| !s.is_empty());

    let events = state
        .supabase
        .list_events(category, search)
        .await
        .map_err(|e| {
            error!(error = %e, "Error fetching events");
            server_error("Unable to fetch events")
        })?;

    Ok(Json(EventList {
        count: events.len(),
        events,
    }))
}

#[derive(Debug, Serialize)]
struct EventCreated {
    event: Event,
    message: &'static str,
}

/// POST /api/events - Create an event owned by the caller.
///
/// # Responses
///
/// - `201 Created` - `{event, message}`
/// - `400 Bad Request` - Malformed JSON, missing title or date
/// - `401 Unauthorized` - Token rejected by the identity provider
/// - `500 Internal Server Error` - Insert failed
async fn create_event(
    State(state): State<AppState>,
    Extension(token): Extension<UserToken>,
    body: Bytes,
) -> ApiResult<Response> {
    let req: CreateEventRequest = parse_json(&body)?;

    if req.title.is_empty() {
        return Err(ApiError::validation("Validation error", "Event title is required"));
    }
    if req.event_date.is_empty() {
        return Err(ApiError::validation("Validation error", "Event date is required"));
    }

    let user = resolve_user(&state, &token).await?;
    let new_event = NewEvent::from_request(req, user.id);

    let event = state
        .supabase
        .create_event(token.as_str(), &new_event)
        .await
        .map_err(|e| {
            error!(error = %e, "Error creating event");
            server_error("Unable to create event")
        })?;

    info!(event_id = %event.id, organizer_id = %event.organizer_id, "Event created");

    Ok((
        StatusCode::CREATED,
        Json(EventCreated {
            event,
            message: "Event created successfully",
        }),
    )
        .into_response())
}

/// GET /api/events/{id} - Event with its confirmed registration count.
///
/// A failed count is reported as zero.
async fn get_event(
    State(state): State<AppState>,
    Path(event_id): Path<String>,
) -> ApiResult<Json<EventWithRegistrations>> {
    let event = load_event(&state, &event_id).await?;

    let registration_count = state
        .supabase
        .count_confirmed_registrations(&event_id)
        .await
        .unwrap_or_else(|e| {
            warn!(event_id = %event_id, error = %e, "Error fetching registration count");
            0
        });

    Ok(Json(EventWithRegistrations {
        event,
        registration_count,
    }))
}

#[derive(Debug, Serialize)]
struct EventUpdated {
    event: Option<Event>,
    message: &'static str,
}

/// PUT /api/events/{id} - Partial update by the organizer.
///
/// `id`, `organizer_id` and `created_at` are dropped from the body and
/// `updated_at` is stamped before the patch is sent.
///
/// # Responses
///
/// - `200 OK` - `{event, message}` with the refreshed event
/// - `400 Bad Request` - Body is not a JSON object
/// - `401 Unauthorized` - Token rejected
/// - `403 Forbidden` - Caller is not the organizer
/// - `404 Not Found` - No such event
/// - `500 Internal Server Error` - Update failed
async fn update_event(
    State(state): State<AppState>,
    Path(event_id): Path<String>,
    Extension(token): Extension<UserToken>,
    body: Bytes,
) -> ApiResult<Json<EventUpdated>> {
    let user = resolve_user(&state, &token).await?;
    let existing = load_event(&state, &event_id).await?;

    if existing.organizer_id != user.id {
        return Err(ApiError::forbidden(
            "Forbidden",
            "Only the event organizer can update this event",
        ));
    }

    let patch: serde_json::Map<String, serde_json::Value> = parse_json(&body)?;
    let patch = sanitize_event_patch(patch, Utc::now());

    state
        .supabase
        .update_event(token.as_str(), &event_id, &patch)
        .await
        .map_err(|e| {
            error!(event_id = %event_id, error = %e, "Error updating event");
            server_error("Unable to update event")
        })?;

    info!(event_id = %event_id, "Event updated");

    let event = match state.supabase.get_event(&event_id).await {
        Ok(event) => event,
        Err(e) => {
            warn!(event_id = %event_id, error = %e, "Refetch after update failed");
            None
        }
    };

    Ok(Json(EventUpdated {
        event,
        message: "Event updated successfully",
    }))
}

/// Body of responses that only carry a confirmation message.
#[derive(Debug, Serialize)]
struct Confirmation {
    message: &'static str,
}

/// DELETE /api/events/{id} - Soft-cancel by the organizer.
async fn cancel_event(
    State(state): State<AppState>,
    Path(event_id): Path<String>,
    Extension(token): Extension<UserToken>,
) -> ApiResult<Json<Confirmation>> {
    let user = resolve_user(&state, &token).await?;
    let existing = load_event(&state, &event_id).await?;

    if existing.organizer_id != user.id {
        return Err(ApiError::forbidden(
            "Forbidden",
            "Only the event organizer can cancel this event",
        ));
    }

    state
        .supabase
        .cancel_event(token.as_str(), &event_id)
        .await
        .map_err(|e| {
            error!(event_id = %event_id, error = %e, "Error cancelling event");
            server_error("Unable to cancel event")
        })?;

    info!(event_id = %event_id, "Event cancelled");

    Ok(Json(Confirmation {
        message: "Event cancelled successfully",
    }))
}

// ============================================================================
// Registrations
// ============================================================================

/// Query parameters of `GET /api/registrations`.
#[derive(Debug, Default, Deserialize)]
pub struct RegistrationFilters {
    pub status: Option<String>,
}

#[derive(Debug, Serialize)]
struct RegistrationList {
    registrations: Vec<RegistrationWithEvent>,
    count: usize,
}

/// GET /api/registrations - The caller's registrations, newest first.
async fn list_registrations(
    State(state): State<AppState>,
    Extension(token): Extension<UserToken>,
    Query(filters): Query<RegistrationFilters>,
) -> ApiResult<Json<RegistrationList>> {
    let user = resolve_user(&state, &token).await?;
    let status = filters.status.as_deref().filter(|s| !s.is_empty());

    let registrations = state
        .supabase
        .list_registrations(token.as_str(), &user.id, status)
        .await
        .map_err(|e| {
            error!(user_id = %user.id, error = %e, "Error fetching registrations");
            server_error("Unable to fetch registrations")
        })?;

    Ok(Json(RegistrationList {
        count: registrations.len(),
        registrations,
    }))
}

#[derive(Debug, Serialize)]
struct RegistrationCreated {
    registration: Registration,
    message: &'static str,
}

/// POST /api/registrations - Register the caller for an event.
///
/// # Responses
///
/// - `201 Created` - `{registration, message}`
/// - `400 Bad Request` - Malformed JSON, missing `event_id`, or the event is
///   no longer active
/// - `401 Unauthorized` - Token rejected
/// - `404 Not Found` - No such event
/// - `409 Conflict` - Event full, or the caller is already registered
/// - `500 Internal Server Error` - Insert failed
async fn create_registration(
    State(state): State<AppState>,
    Extension(token): Extension<UserToken>,
    body: Bytes,
) -> ApiResult<Response> {
    let req: EventRegistrationRequest = parse_json(&body)?;

    if req.event_id.is_empty() {
        return Err(ApiError::validation("Validation error", "Event ID is required"));
    }

    let user = resolve_user(&state, &token).await?;
    let event = load_event(&state, &req.event_id).await?;

    if !event.is_active() {
        return Err(ApiError::validation(
            "Event unavailable",
            "This event is no longer accepting registrations",
        ));
    }

    if event.capacity.is_some() {
        match state.supabase.count_confirmed_registrations(&event.id).await {
            Ok(confirmed) if event.is_full(confirmed) => {
                return Err(ApiError::conflict(
                    "Event full",
                    "This event has reached its maximum capacity",
                ));
            }
            Ok(_) => {}
            Err(e) => {
                warn!(event_id = %event.id, error = %e, "Error checking registration count");
            }
        }
    }

    let registration = match state
        .supabase
        .create_registration(token.as_str(), &req.event_id, &user.id, &req.notes)
        .await
    {
        Ok(registration) => registration,
        Err(SupabaseError::Conflict(_)) => {
            return Err(ApiError::conflict(
                "Already registered",
                "You are already registered for this event",
            ));
        }
        Err(e) => {
            error!(event_id = %req.event_id, error = %e, "Error creating registration");
            return Err(server_error("Unable to create registration"));
        }
    };

    info!(
        registration_id = %registration.id,
        event_id = %registration.event_id,
        "Registration created"
    );

    Ok((
        StatusCode::CREATED,
        Json(RegistrationCreated {
            registration,
            message: "Registration successful",
        }),
    )
        .into_response())
}

/// POST /api/registrations/cancel - Cancel one of the caller's registrations.
async fn cancel_registration(
    State(state): State<AppState>,
    Extension(token): Extension<UserToken>,
    body: Bytes,
) -> ApiResult<Json<Confirmation>> {
    let req: CancelRegistrationRequest = parse_json(&body)?;

    if req.registration_id.is_empty() {
        return Err(ApiError::validation(
            "Validation error",
            "Registration ID is required",
        ));
    }

    let user = resolve_user(&state, &token).await?;

    state
        .supabase
        .cancel_registration(token.as_str(), &req.registration_id, &user.id)
        .await
        .map_err(|e| {
            error!(registration_id = %req.registration_id, error = %e, "Error cancelling registration");
            server_error("Unable to cancel registration")
        })?;

    info!(registration_id = %req.registration_id, "Registration cancelled");

    Ok(Json(Confirmation {
        message: "Registration cancelled successfully",
    }))
}

// ============================================================================
// Tests
// ============================================================================
