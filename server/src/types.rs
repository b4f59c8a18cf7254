//! Shared domain types for the GoTicket server.
//!
//! Row types mirror the Supabase tables (`events`, `registrations`,
//! `profiles`) and are passed through to clients unchanged. Request types
//! accept partial bodies: missing fields deserialize to their defaults and
//! are rejected by the handlers, not by serde.

use chrono::{DateTime, SecondsFormat, Utc};
use serde::{Deserialize, Deserializer, Serialize};

/// Account type assigned to users created through `/api/register`.
pub const DEFAULT_ACCOUNT_TYPE: &str = "attendee";

/// Status of an event that accepts registrations.
pub const EVENT_STATUS_ACTIVE: &str = "active";

/// Status written by soft deletes of events and registrations.
pub const STATUS_CANCELLED: &str = "cancelled";

/// Status of a registration that holds a seat.
pub const REGISTRATION_STATUS_CONFIRMED: &str = "confirmed";

/// A user, flattened from the identity provider's `user` object and its
/// metadata.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct User {
    pub id: String,
    pub email: String,
    pub full_name: String,
    pub phone_number: String,
    pub username: String,
    pub account_type: String,
    pub created_at: String,
}

/// A row of the `events` table.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct Event {
    #[serde(default)]
    pub id: String,
    #[serde(default, deserialize_with = "null_as_default")]
    pub title: String,
    #[serde(default)]
    pub description: Option<String>,
    #[serde(default, deserialize_with = "null_as_default")]
    pub event_date: String,
    #[serde(default)]
    pub location: Option<String>,
    #[serde(default)]
    pub category: Option<String>,
    #[serde(default, deserialize_with = "null_as_default")]
    pub price: f64,
    #[serde(default)]
    pub capacity: Option<i64>,
    #[serde(default, deserialize_with = "null_as_default")]
    pub organizer_id: String,
    #[serde(default)]
    pub image_url: Option<String>,
    #[serde(default, deserialize_with = "null_as_default")]
    pub status: String,
    #[serde(default, deserialize_with = "null_as_default")]
    pub created_at: String,
    #[serde(default, deserialize_with = "null_as_default")]
    pub updated_at: String,
}

impl Event {
    /// Returns `true` if the event accepts new registrations.
    pub fn is_active(&self) -> bool {
        self.status == EVENT_STATUS_ACTIVE
    }

    /// Returns `true` if `confirmed` registrations fill the event.
    ///
    /// Events without a capacity never fill up.
    pub fn is_full(&self, confirmed: usize) -> bool {
        self.capacity
            .is_some_and(|capacity| confirmed as i64 >= capacity)
    }
}

/// Response of `GET /api/events/{id}`.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct EventWithRegistrations {
    pub event: Event,
    pub registration_count: usize,
}

/// A row of the `registrations` table.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct Registration {
    #[serde(default)]
    pub id: String,
    #[serde(default, deserialize_with = "null_as_default")]
    pub event_id: String,
    #[serde(default, deserialize_with = "null_as_default")]
    pub user_id: String,
    #[serde(default, deserialize_with = "null_as_default")]
    pub registration_date: String,
    #[serde(default, deserialize_with = "null_as_default")]
    pub status: String,
    #[serde(default)]
    pub notes: Option<String>,
    #[serde(default, deserialize_with = "null_as_default")]
    pub created_at: String,
}

/// A registration joined with its event (`select=*,events(*)`).
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct RegistrationWithEvent {
    #[serde(flatten)]
    pub registration: Registration,
    #[serde(default)]
    pub events: Option<Event>,
}

/// Body of `POST /api/register`.
#[derive(Debug, Clone, Default, PartialEq, Eq, Deserialize)]
#[serde(default)]
pub struct RegisterRequest {
    pub email: String,
    pub password: String,
    pub full_name: String,
    pub phone_number: String,
    pub username: String,
}

/// Body of `POST /api/login`.
#[derive(Debug, Clone, Default, PartialEq, Eq, Deserialize)]
#[serde(default)]
pub struct LoginRequest {
    pub email: String,
    pub password: String,
}

/// Body of `POST /api/events`.
#[derive(Debug, Clone, Default, PartialEq, Deserialize)]
#[serde(default)]
pub struct CreateEventRequest {
    pub title: String,
    pub description: String,
    pub event_date: String,
    pub location: String,
    pub category: String,
    pub price: f64,
    pub capacity: Option<i64>,
    pub image_url: String,
}

/// Row inserted into `events` on creation.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct NewEvent {
    pub title: String,
    pub description: String,
    pub event_date: String,
    pub location: String,
    pub category: String,
    pub price: f64,
    pub capacity: Option<i64>,
    pub organizer_id: String,
    pub image_url: String,
    pub status: String,
}

impl NewEvent {
    /// Builds an active event owned by `organizer_id`.
    pub fn from_request(req: CreateEventRequest, organizer_id: impl Into<String>) -> Self {
        Self {
            title: req.title,
            description: req.description,
            event_date: req.event_date,
            location: req.location,
            category: req.category,
            price: req.price,
            capacity: req.capacity,
            organizer_id: organizer_id.into(),
            image_url: req.image_url,
            status: EVENT_STATUS_ACTIVE.to_string(),
        }
    }
}

/// Body of `POST /api/registrations`.
#[derive(Debug, Clone, Default, PartialEq, Eq, Deserialize)]
#[serde(default)]
pub struct EventRegistrationRequest {
    pub event_id: String,
    pub notes: String,
}

/// Row inserted into `registrations`.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct NewRegistration {
    pub event_id: String,
    pub user_id: String,
    pub notes: String,
    pub status: String,
}

/// Body of `POST /api/registrations/cancel`.
#[derive(Debug, Clone, Default, PartialEq, Eq, Deserialize)]
#[serde(default)]
pub struct CancelRegistrationRequest {
    pub registration_id: String,
}

/// Response of `/api/register` and `/api/login`.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct AuthResponse {
    pub user: User,
    pub token: Option<String>,
    pub message: String,
}

/// Fields a client may never overwrite on an event update.
pub const PROTECTED_EVENT_FIELDS: [&str; 3] = ["id", "organizer_id", "created_at"];

/// Turns a client-supplied update body into a PATCH payload.
///
/// Protected fields are dropped and `updated_at` is stamped with `now`.
pub fn sanitize_event_patch(
    mut patch: serde_json::Map<String, serde_json::Value>,
    now: DateTime<Utc>,
) -> serde_json::Map<String, serde_json::Value> {
    for field in PROTECTED_EVENT_FIELDS {
        patch.remove(field);
    }
    patch.insert("updated_at".to_string(), timestamp(now).into());
    patch
}

/// RFC 3339 timestamp as written to `updated_at` columns.
pub fn timestamp(now: DateTime<Utc>) -> String {
    now.to_rfc3339_opts(SecondsFormat::Secs, true)
}

/// Deserializes `null` as the type's default value.
fn null_as_default<'de, D, T>(deserializer: D) -> Result<T, D::Error>
where
    D: Deserializer<'de>,
    T: Default + Deserialize<'de>,
{
    Ok(Option::<T>::deserialize(deserializer)?.unwrap_or_default())
}
