//! Request middleware pipeline.
//!
//! Every route group is wrapped in a [`Pipeline`]: an ordered, immutable list
//! of [`Interceptor`] stages built once at startup with [`PipelineBuilder`].
//! Each stage sees the request in turn and either forwards it to the next
//! stage or answers it directly. Stages that were entered get a chance to
//! decorate the outgoing response in reverse order, so headers set by an
//! outer stage (CORS) also land on responses produced by inner stages.
//!
//! # Stages
//!
//! - [`Cors`] - permissive CORS headers; answers `OPTIONS` preflights
//! - [`RateLimit`] - per-client sliding window admission
//! - [`Authenticate`] - bearer token presence check
//!
//! # Example
//!
//! ```rust
//! use std::time::Duration;
//! use axum::{routing::post, Router};
//! use goticket_server::middleware::{Authenticate, Cors, PipelineBuilder, RateLimit};
//! use goticket_server::rate_limit::RateLimiter;
//!
//! let limiter = RateLimiter::new(100, Duration::from_secs(3600));
//! let pipeline = PipelineBuilder::new()
//!     .with(Cors)
//!     .with(RateLimit::new(limiter))
//!     .with(Authenticate::all_methods())
//!     .build();
//!
//! let router: Router = pipeline.wrap(Router::new().route("/api/thing", post(|| async { "ok" })));
//! ```

use std::fmt;
use std::net::SocketAddr;
use std::sync::Arc;

use axum::extract::{ConnectInfo, Request, State};
use axum::http::{header, HeaderMap, HeaderValue, Method, StatusCode};
use axum::middleware::{from_fn_with_state, Next};
use axum::response::{IntoResponse, Response};
use axum::Router;
use tracing::{debug, warn};

use crate::error::ApiError;
use crate::rate_limit::{RateLimitResult, RateLimiter};

/// Client identifier used when no address information is available.
pub const UNKNOWN_CLIENT: &str = "unknown";

const ALLOW_ORIGIN: &str = "*";
const ALLOW_METHODS: &str = "GET, POST, PUT, DELETE, OPTIONS";
const ALLOW_HEADERS: &str = "Content-Type, Authorization";

const X_REAL_IP: &str = "x-real-ip";
const X_FORWARDED_FOR: &str = "x-forwarded-for";

/// Outcome of a single stage.
pub enum Flow {
    /// Hand the (possibly modified) request to the next stage.
    Forward(Request),
    /// Stop the chain and answer with this response.
    Respond(Response),
}

/// A single pipeline stage.
///
/// Stages are synchronous: none of them awaits while holding the request.
pub trait Interceptor: Send + Sync + 'static {
    /// Short name for logs.
    fn name(&self) -> &'static str;

    /// Inspects the request and decides whether the chain continues.
    fn intercept(&self, request: Request) -> Flow;

    /// Decorates the response on its way out. Runs for every stage that
    /// forwarded, including when a later stage short-circuits.
    fn after(&self, _response: &mut Response) {}
}

/// Builder fixing the order of stages.
#[derive(Default)]
pub struct PipelineBuilder {
    stages: Vec<Arc<dyn Interceptor>>,
}

impl PipelineBuilder {
    pub fn new() -> Self {
        Self::default()
    }

    /// Appends a stage. Stages run in insertion order.
    pub fn with(mut self, stage: impl Interceptor) -> Self {
        self.stages.push(Arc::new(stage));
        self
    }

    pub fn build(self) -> Pipeline {
        Pipeline {
            stages: self.stages.into(),
        }
    }
}

/// An immutable chain of stages. Cloning shares the stages.
#[derive(Clone)]
pub struct Pipeline {
    stages: Arc<[Arc<dyn Interceptor>]>,
}

impl fmt::Debug for Pipeline {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_list()
            .entries(self.stages.iter().map(|s| s.name()))
            .finish()
    }
}

impl Pipeline {
    /// Stage names in execution order.
    pub fn stage_names(&self) -> Vec<&'static str> {
        self.stages.iter().map(|s| s.name()).collect()
    }

    /// Wraps every route of `router` (including per-route method fallbacks)
    /// in this pipeline.
    pub fn wrap<S>(self, router: Router<S>) -> Router<S>
    where
        S: Clone + Send + Sync + 'static,
    {
        router.route_layer(from_fn_with_state(self, run_pipeline))
    }

    /// Runs the stages, then `next` if every stage forwarded.
    pub async fn run(&self, mut request: Request, next: Next) -> Response {
        for (index, stage) in self.stages.iter().enumerate() {
            match stage.intercept(request) {
                Flow::Forward(forwarded) => request = forwarded,
                Flow::Respond(mut response) => {
                    debug!(
                        stage = stage.name(),
                        status = %response.status(),
                        "Request short-circuited"
                    );
                    self.unwind(&mut response, index);
                    return response;
                }
            }
        }

        let mut response = next.run(request).await;
        self.unwind(&mut response, self.stages.len());
        response
    }

    /// Applies `after` hooks of the first `entered` stages, innermost first.
    fn unwind(&self, response: &mut Response, entered: usize) {
        for stage in self.stages[..entered].iter().rev() {
            stage.after(response);
        }
    }
}

async fn run_pipeline(
    State(pipeline): State<Pipeline>,
    request: Request,
    next: Next,
) -> Response {
    pipeline.run(request, next).await
}

// ==================== CORS ====================

/// Adds permissive CORS headers and answers preflight requests.
#[derive(Debug, Clone, Copy, Default)]
pub struct Cors;

impl Cors {
    fn apply(headers: &mut HeaderMap) {
        headers.insert(
            header::ACCESS_CONTROL_ALLOW_ORIGIN,
            HeaderValue::from_static(ALLOW_ORIGIN),
        );
        headers.insert(
            header::ACCESS_CONTROL_ALLOW_METHODS,
            HeaderValue::from_static(ALLOW_METHODS),
        );
        headers.insert(
            header::ACCESS_CONTROL_ALLOW_HEADERS,
            HeaderValue::from_static(ALLOW_HEADERS),
        );
    }
}

impl Interceptor for Cors {
    fn name(&self) -> &'static str {
        "cors"
    }

    fn intercept(&self, request: Request) -> Flow {
        if request.method() == Method::OPTIONS {
            let mut response = StatusCode::OK.into_response();
            Self::apply(response.headers_mut());
            return Flow::Respond(response);
        }
        Flow::Forward(request)
    }

    fn after(&self, response: &mut Response) {
        Self::apply(response.headers_mut());
    }
}

// ==================== Rate limiting ====================

/// Rejects clients that exceed the limiter's quota with 429.
#[derive(Debug, Clone)]
pub struct RateLimit {
    limiter: RateLimiter,
}

impl RateLimit {
    pub fn new(limiter: RateLimiter) -> Self {
        Self { limiter }
    }
}

impl Interceptor for RateLimit {
    fn name(&self) -> &'static str {
        "rate_limit"
    }

    fn intercept(&self, request: Request) -> Flow {
        let client = client_identifier(&request);

        match self.limiter.check_rate_limit(&client) {
            RateLimitResult::Allowed => Flow::Forward(request),
            RateLimitResult::Limited { retry_after_secs } => {
                warn!(
                    client = %client,
                    path = %request.uri().path(),
                    retry_after_secs,
                    "Rate limit exceeded"
                );
                Flow::Respond(ApiError::rate_limited(retry_after_secs).into_response())
            }
        }
    }
}

/// Derives the rate limiting key for a request.
///
/// Order: first entry of `X-Forwarded-For`, then `X-Real-IP`, then the peer
/// address without its port. Header values are trimmed; a header that is
/// present but not valid text is ignored.
pub fn client_identifier(request: &Request) -> String {
    let headers = request.headers();

    if let Some(forwarded) = header_str(headers, X_FORWARDED_FOR) {
        let first = forwarded.split(',').next().unwrap_or_default();
        return first.trim().to_string();
    }

    if let Some(real_ip) = header_str(headers, X_REAL_IP) {
        return real_ip.trim().to_string();
    }

    request
        .extensions()
        .get::<ConnectInfo<SocketAddr>>()
        .map(|ConnectInfo(addr)| addr.ip().to_string())
        .unwrap_or_else(|| UNKNOWN_CLIENT.to_string())
}

/// Non-empty header value as text.
fn header_str<'a>(headers: &'a HeaderMap, name: &str) -> Option<&'a str> {
    headers
        .get(name)
        .and_then(|v| v.to_str().ok())
        .filter(|v| !v.is_empty())
}

// ==================== Authentication ====================

/// Bearer token extracted by [`Authenticate`], available to handlers as a
/// request extension.
#[derive(Clone, PartialEq, Eq)]
pub struct UserToken(String);

impl UserToken {
    pub fn new(token: impl Into<String>) -> Self {
        Self(token.into())
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl fmt::Debug for UserToken {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str("UserToken([REDACTED])")
    }
}

/// Requires an `Authorization` header carrying a non-empty token.
///
/// Only presence and shape are checked here; handlers validate the token
/// against the identity provider.
#[derive(Debug, Clone)]
pub struct Authenticate {
    methods: Option<Vec<Method>>,
}

impl Authenticate {
    /// Guards every method.
    pub fn all_methods() -> Self {
        Self { methods: None }
    }

    /// Guards only the listed methods; other requests pass untouched.
    pub fn methods(methods: impl IntoIterator<Item = Method>) -> Self {
        Self {
            methods: Some(methods.into_iter().collect()),
        }
    }

    fn guards(&self, method: &Method) -> bool {
        match &self.methods {
            Some(methods) => methods.contains(method),
            None => true,
        }
    }
}

impl Interceptor for Authenticate {
    fn name(&self) -> &'static str {
        "authenticate"
    }

    fn intercept(&self, mut request: Request) -> Flow {
        if !self.guards(request.method()) {
            return Flow::Forward(request);
        }

        let token = match extract_bearer(request.headers()) {
            Ok(token) => token,
            Err(err) => {
                debug!(
                    path = %request.uri().path(),
                    reason = err.message(),
                    "Authentication failed"
                );
                return Flow::Respond(err.into_response());
            }
        };

        request.extensions_mut().insert(token);
        Flow::Forward(request)
    }
}

/// Pulls the token out of the `Authorization` header.
///
/// An empty or non-text header counts as missing. The `Bearer ` prefix is
/// optional; whatever remains must be non-empty.
pub fn extract_bearer(headers: &HeaderMap) -> Result<UserToken, ApiError> {
    let Some(value) = header_str(headers, header::AUTHORIZATION.as_str()) else {
        return Err(ApiError::unauthorized(
            "Unauthorized",
            "Authorization header required",
        ));
    };

    let token = value.strip_prefix("Bearer ").unwrap_or(value);

    if token.is_empty() {
        return Err(ApiError::unauthorized("Unauthorized", "Invalid token format"));
    }

    Ok(UserToken::new(token))
}
