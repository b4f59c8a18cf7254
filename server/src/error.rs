//! Error types for the GoTicket server.
//!
//! # Error Types
//!
//! - [`ApiError`] - Client-facing failures rendered as the JSON error envelope
//! - [`ErrorKind`] - The failure taxonomy, one HTTP status per kind
//!
//! Configuration errors live in [`crate::config::ConfigError`] and downstream
//! failures in [`crate::supabase::SupabaseError`].
//!
//! Every failed request, whether short-circuited by a middleware stage or
//! returned by a handler, produces the same body shape:
//!
//! ```json
//! {"error": "Unauthorized", "message": "Authorization header required", "code": 401}
//! ```
//!
//! `code` always equals the HTTP status of the response.
//!
//! # Example
//!
//! ```rust
//! use goticket_server::error::{ApiError, ErrorKind};
//!
//! let err = ApiError::not_found("Event not found", "The requested event does not exist");
//! assert_eq!(err.kind(), ErrorKind::NotFound);
//! assert_eq!(err.status().as_u16(), 404);
//! ```

use axum::http::{header, HeaderValue, StatusCode};
use axum::response::{IntoResponse, Response};
use axum::Json;
use serde::{Deserialize, Serialize};
use thiserror::Error as ThisError;

/// Category of a client-facing failure. Each kind maps to one HTTP status.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum ErrorKind {
    /// Malformed or invalid input (400).
    Validation,
    /// Missing or rejected credentials (401).
    Unauthorized,
    /// Authenticated but not permitted (403).
    Forbidden,
    /// Resource does not exist (404).
    NotFound,
    /// Known path, unsupported method (405).
    MethodNotAllowed,
    /// Duplicate or exhausted resource (409).
    Conflict,
    /// Client exceeded its request quota (429).
    RateLimited,
    /// Downstream or unexpected failure (500).
    Internal,
}

impl ErrorKind {
    /// HTTP status for this kind.
    pub fn status(self) -> StatusCode {
        match self {
            Self::Validation => StatusCode::BAD_REQUEST,
            Self::Unauthorized => StatusCode::UNAUTHORIZED,
            Self::Forbidden => StatusCode::FORBIDDEN,
            Self::NotFound => StatusCode::NOT_FOUND,
            Self::MethodNotAllowed => StatusCode::METHOD_NOT_ALLOWED,
            Self::Conflict => StatusCode::CONFLICT,
            Self::RateLimited => StatusCode::TOO_MANY_REQUESTS,
            Self::Internal => StatusCode::INTERNAL_SERVER_ERROR,
        }
    }
}

/// Wire shape of the error envelope.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ErrorBody {
    /// Short error title, e.g. `"Validation error"`.
    pub error: String,
    /// Human-readable detail.
    pub message: String,
    /// Mirrors the HTTP status code.
    pub code: u16,
}

/// A failed request, rendered as the JSON error envelope.
#[derive(ThisError, Debug, Clone, PartialEq, Eq)]
#[error("{error}: {message}")]
pub struct ApiError {
    kind: ErrorKind,
    error: String,
    message: String,
    retry_after: Option<u64>,
}

impl ApiError {
    /// Creates an error of the given kind.
    pub fn new(kind: ErrorKind, error: impl Into<String>, message: impl Into<String>) -> Self {
        Self {
            kind,
            error: error.into(),
            message: message.into(),
            retry_after: None,
        }
    }

    /// 400 error.
    pub fn validation(error: impl Into<String>, message: impl Into<String>) -> Self {
        Self::new(ErrorKind::Validation, error, message)
    }

    /// 401 error.
    pub fn unauthorized(error: impl Into<String>, message: impl Into<String>) -> Self {
        Self::new(ErrorKind::Unauthorized, error, message)
    }

    /// 403 error.
    pub fn forbidden(error: impl Into<String>, message: impl Into<String>) -> Self {
        Self::new(ErrorKind::Forbidden, error, message)
    }

    /// 404 error.
    pub fn not_found(error: impl Into<String>, message: impl Into<String>) -> Self {
        Self::new(ErrorKind::NotFound, error, message)
    }

    /// 405 error with the `"Method not allowed"` title.
    pub fn method_not_allowed(message: impl Into<String>) -> Self {
        Self::new(ErrorKind::MethodNotAllowed, "Method not allowed", message)
    }

    /// 409 error.
    pub fn conflict(error: impl Into<String>, message: impl Into<String>) -> Self {
        Self::new(ErrorKind::Conflict, error, message)
    }

    /// 429 error with the standard rate limit envelope and a `Retry-After` hint.
    ///
    /// # Example
    ///
    /// ```rust
    /// use goticket_server::error::ApiError;
    ///
    /// let err = ApiError::rate_limited(42);
    /// assert_eq!(err.status().as_u16(), 429);
    /// assert_eq!(err.retry_after(), Some(42));
    /// ```
    pub fn rate_limited(retry_after_secs: u64) -> Self {
        Self {
            retry_after: Some(retry_after_secs),
            ..Self::new(
                ErrorKind::RateLimited,
                "Rate limit exceeded",
                "Too many requests. Please try again later.",
            )
        }
    }

    /// 500 error.
    pub fn internal(error: impl Into<String>, message: impl Into<String>) -> Self {
        Self::new(ErrorKind::Internal, error, message)
    }

    /// The error category.
    pub fn kind(&self) -> ErrorKind {
        self.kind
    }

    /// HTTP status of the rendered response.
    pub fn status(&self) -> StatusCode {
        self.kind.status()
    }

    /// Short error title.
    pub fn error(&self) -> &str {
        &self.error
    }

    /// Human-readable detail.
    pub fn message(&self) -> &str {
        &self.message
    }

    /// Seconds the client should wait, for rate limit errors.
    pub fn retry_after(&self) -> Option<u64> {
        self.retry_after
    }

    /// Returns `true` if this error indicates a client-side problem.
    pub fn is_client_error(&self) -> bool {
        self.status().is_client_error()
    }

    /// Returns `true` if this error indicates a server-side problem.
    pub fn is_server_error(&self) -> bool {
        self.status().is_server_error()
    }

    /// The envelope body for this error.
    pub fn body(&self) -> ErrorBody {
        ErrorBody {
            error: self.error.clone(),
            message: self.message.clone(),
            code: self.status().as_u16(),
        }
    }
}

impl IntoResponse for ApiError {
    fn into_response(self) -> Response {
        let mut response = (self.status(), Json(self.body())).into_response();

        if let Some(secs) = self.retry_after {
            response
                .headers_mut()
                .insert(header::RETRY_AFTER, HeaderValue::from(secs));
        }

        response
    }
}

/// Result type for handlers.
pub type ApiResult<T> = std::result::Result<T, ApiError>;
