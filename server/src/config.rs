//! Server configuration module.
//!
//! Parses configuration from environment variables for the GoTicket server.
//! A `.env` file in the working directory is loaded first by the binary, so
//! the same variables can be kept there during development.
//!
//! # Environment Variables
//!
//! | Variable | Required | Default | Description |
//! |----------|----------|---------|-------------|
//! | `SUPABASE_URL` | Yes | - | URL of the Supabase project |
//! | `SUPABASE_ANON_KEY` | Yes | - | Supabase anon/public key for API calls |
//! | `SUPABASE_SERVICE_ROLE_KEY` | No | - | Service key used for profile inserts |
//! | `PORT` | No | 8080 | HTTP server port |
//! | `RATE_LIMIT_REQUESTS` | No | 100 | Requests admitted per client per window |
//! | `RATE_LIMIT_WINDOW_SECS` | No | 3600 | Sliding window length in seconds |
//! | `RATE_LIMIT_SWEEP_SECS` | No | 300 | Idle-client sweep interval, `0` disables |

use std::env;
use std::time::Duration;

use thiserror::Error;
use tracing::warn;

use crate::rate_limit::{DEFAULT_LIMIT, DEFAULT_WINDOW, MAX_WINDOW};

/// Default HTTP server port.
const DEFAULT_PORT: u16 = 8080;

/// Default idle-client sweep interval.
const DEFAULT_SWEEP_SECS: u64 = 300;

/// Errors that can occur when parsing configuration.
#[derive(Debug, Error, Clone, PartialEq, Eq)]
pub enum ConfigError {
    /// Required environment variable is missing.
    #[error("missing required environment variable: {0}")]
    MissingEnvVar(String),

    /// Environment variable has invalid format.
    #[error("invalid format for {var}: {message}")]
    InvalidFormat { var: String, message: String },
}

impl ConfigError {
    fn invalid(var: &str, message: impl Into<String>) -> Self {
        Self::InvalidFormat {
            var: var.to_string(),
            message: message.into(),
        }
    }
}

/// Server configuration parsed from environment variables.
#[derive(Clone)]
pub struct Config {
    /// URL of the Supabase project (e.g., `https://xxx.supabase.co`), without
    /// a trailing slash.
    pub supabase_url: String,

    /// Supabase anon/public key for API calls.
    pub supabase_anon_key: String,

    /// Service-role key for privileged writes. Profile inserts are skipped
    /// when absent.
    pub supabase_service_key: Option<String>,

    /// HTTP server port.
    pub port: u16,

    /// Requests admitted per client per window.
    pub rate_limit_requests: usize,

    /// Sliding window length.
    pub rate_limit_window: Duration,

    /// Interval of the idle-client sweep; `None` disables it.
    pub rate_limit_sweep: Option<Duration>,
}

impl std::fmt::Debug for Config {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Config")
            .field("supabase_url", &self.supabase_url)
            .field("supabase_anon_key", &"[REDACTED]")
            .field(
                "supabase_service_key",
                &self.supabase_service_key.as_ref().map(|_| "[REDACTED]"),
            )
            .field("port", &self.port)
            .field("rate_limit_requests", &self.rate_limit_requests)
            .field("rate_limit_window", &self.rate_limit_window)
            .field("rate_limit_sweep", &self.rate_limit_sweep)
            .finish()
    }
}

impl Config {
    /// Parse configuration from environment variables.
    ///
    /// # Errors
    ///
    /// Returns `ConfigError` if:
    /// - `SUPABASE_URL` or `SUPABASE_ANON_KEY` is missing or empty
    /// - a numeric variable does not parse
    /// - the rate limit quota or window is zero
    ///
    /// # Example
    ///
    /// ```no_run
    /// use goticket_server::config::Config;
    ///
    /// let config = Config::from_env().expect("Failed to load config");
    /// println!("Server will listen on port {}", config.port);
    /// ```
    pub fn from_env() -> Result<Self, ConfigError> {
        let supabase_url = required_env("SUPABASE_URL")?
            .trim_end_matches('/')
            .to_string();
        let supabase_anon_key = required_env("SUPABASE_ANON_KEY")?;
        let supabase_service_key = optional_env("SUPABASE_SERVICE_ROLE_KEY");
        let port = parse_port()?;
        let rate_limit_requests =
            parse_number_env("RATE_LIMIT_REQUESTS", DEFAULT_LIMIT as u64)? as usize;
        let rate_limit_window = Duration::from_secs(parse_number_env(
            "RATE_LIMIT_WINDOW_SECS",
            DEFAULT_WINDOW.as_secs(),
        )?);
        let sweep_secs = parse_number_env("RATE_LIMIT_SWEEP_SECS", DEFAULT_SWEEP_SECS)?;
        let rate_limit_sweep = (sweep_secs > 0).then(|| Duration::from_secs(sweep_secs));

        let config = Self {
            supabase_url,
            supabase_anon_key,
            supabase_service_key,
            port,
            rate_limit_requests,
            rate_limit_window,
            rate_limit_sweep,
        };

        config.validate()?;

        if config.supabase_service_key.is_none() {
            warn!(
                "SUPABASE_SERVICE_ROLE_KEY is not set - user profiles will not be \
                 created on registration"
            );
        }

        Ok(config)
    }

    /// Validate the configuration.
    fn validate(&self) -> Result<(), ConfigError> {
        if !self.supabase_url.starts_with("http://") && !self.supabase_url.starts_with("https://")
        {
            return Err(ConfigError::invalid(
                "SUPABASE_URL",
                "must start with http:// or https://",
            ));
        }

        if self.rate_limit_requests == 0 {
            return Err(ConfigError::invalid(
                "RATE_LIMIT_REQUESTS",
                "must be greater than zero",
            ));
        }

        if self.rate_limit_window.is_zero() {
            return Err(ConfigError::invalid(
                "RATE_LIMIT_WINDOW_SECS",
                "must be greater than zero",
            ));
        }

        if self.rate_limit_window > MAX_WINDOW {
            return Err(ConfigError::invalid(
                "RATE_LIMIT_WINDOW_SECS",
                format!("must be at most {} seconds", MAX_WINDOW.as_secs()),
            ));
        }

        Ok(())
    }
}

/// Read a required, non-empty environment variable.
fn required_env(name: &str) -> Result<String, ConfigError> {
    optional_env(name).ok_or_else(|| ConfigError::MissingEnvVar(name.to_string()))
}

/// Read an optional environment variable, treating blank values as unset.
fn optional_env(name: &str) -> Option<String> {
    env::var(name)
        .ok()
        .map(|v| v.trim().to_string())
        .filter(|v| !v.is_empty())
}

/// Parse the PORT environment variable.
///
/// Returns the default port if not set.
fn parse_port() -> Result<u16, ConfigError> {
    match env::var("PORT") {
        Ok(port_str) => port_str
            .trim()
            .parse()
            .map_err(|e| ConfigError::invalid("PORT", format!("{e}"))),
        Err(env::VarError::NotPresent) => Ok(DEFAULT_PORT),
        Err(env::VarError::NotUnicode(_)) => {
            Err(ConfigError::invalid("PORT", "contains invalid unicode"))
        }
    }
}

/// Parse an unsigned integer environment variable, falling back to `default`.
fn parse_number_env(name: &str, default: u64) -> Result<u64, ConfigError> {
    match env::var(name) {
        Ok(value) => value.trim().parse().map_err(|_| {
            ConfigError::invalid(
                name,
                format!("expected a non-negative integer, got '{value}'"),
            )
        }),
        Err(env::VarError::NotPresent) => Ok(default),
        Err(env::VarError::NotUnicode(_)) => {
            Err(ConfigError::invalid(name, "contains invalid unicode"))
        }
    }
}
