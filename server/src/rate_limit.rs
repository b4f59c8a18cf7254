//! Per-client rate limiting using a sliding window log.
//!
//! Each client (identified by the key derived in
//! [`crate::middleware::client_identifier`]) owns a log of the instants at
//! which its recent requests were admitted. A request is admitted while fewer
//! than `limit` entries fall inside the trailing `window`.
//!
//! # Algorithm
//!
//! On every check for a key, under a single lock:
//! - entries at or before `now - window` are dropped (lazy pruning)
//! - if the remaining count is `>= limit` the request is rejected and nothing
//!   is recorded
//! - otherwise `now` is appended and the request is admitted
//!
//! Keys that stop sending requests keep their (expired) log until they are
//! checked again. [`RateLimiter::sweep_idle_keys`] removes such keys; since it
//! only drops logs that are entirely outside the window it never changes an
//! admission decision.
//!
//! # Example
//!
//! ```rust
//! use std::time::Duration;
//! use goticket_server::rate_limit::{RateLimiter, RateLimitResult};
//!
//! let limiter = RateLimiter::new(100, Duration::from_secs(3600));
//!
//! match limiter.check_rate_limit("203.0.113.7") {
//!     RateLimitResult::Allowed => {
//!         // Process the request
//!     }
//!     RateLimitResult::Limited { retry_after_secs } => {
//!         // Return 429 Too Many Requests with Retry-After header
//!         let _ = retry_after_secs;
//!     }
//! }
//! ```

use std::collections::{HashMap, VecDeque};
use std::sync::{Arc, Mutex, MutexGuard};
use std::time::Duration;

use tokio::time::Instant;

/// Default quota: 100 requests per window.
pub const DEFAULT_LIMIT: usize = 100;

/// Default window: one hour.
pub const DEFAULT_WINDOW: Duration = Duration::from_secs(60 * 60);

/// Longest accepted window: 365 days.
pub const MAX_WINDOW: Duration = Duration::from_secs(365 * 24 * 60 * 60);

/// Result of a rate limit check.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum RateLimitResult {
    /// The request is allowed to proceed.
    Allowed,

    /// The request is rate limited.
    ///
    /// `retry_after_secs` is the time until the oldest admitted request
    /// leaves the window, rounded up and never less than one second.
    Limited {
        /// Number of seconds until the client can retry.
        retry_after_secs: u64,
    },
}

impl RateLimitResult {
    /// Returns `true` if the request is allowed.
    #[inline]
    pub fn is_allowed(&self) -> bool {
        matches!(self, Self::Allowed)
    }

    /// Returns `true` if the request is rate limited.
    #[inline]
    pub fn is_limited(&self) -> bool {
        matches!(self, Self::Limited { .. })
    }

    /// Returns the retry-after duration if rate limited, or `None` if allowed.
    #[inline]
    pub fn retry_after(&self) -> Option<u64> {
        match self {
            Self::Allowed => None,
            Self::Limited { retry_after_secs } => Some(*retry_after_secs),
        }
    }
}

/// Admission log for a single client.
///
/// Timestamps are kept in admission order, so the front is always the oldest.
#[derive(Debug, Clone, Default)]
struct RequestLog {
    admitted: VecDeque<Instant>,
}

impl RequestLog {
    /// Drops every entry at or before `cutoff`.
    fn prune(&mut self, cutoff: Option<Instant>) {
        let Some(cutoff) = cutoff else {
            return;
        };
        while self.admitted.front().is_some_and(|t| *t <= cutoff) {
            self.admitted.pop_front();
        }
    }

    fn len(&self) -> usize {
        self.admitted.len()
    }

    fn oldest(&self) -> Option<Instant> {
        self.admitted.front().copied()
    }

    fn record(&mut self, now: Instant) {
        self.admitted.push_back(now);
    }

    /// `true` when no entry is newer than `cutoff`.
    fn is_expired(&self, cutoff: Option<Instant>) -> bool {
        match (self.admitted.back(), cutoff) {
            (None, _) => true,
            (Some(newest), Some(cutoff)) => *newest <= cutoff,
            (Some(_), None) => false,
        }
    }
}

/// Thread-safe sliding window rate limiter with per-client tracking.
///
/// Cloning is cheap: all clones share the same state, so the limiter is
/// built once at startup and handed to every pipeline that needs it.
///
/// # Thread Safety
///
/// Prune, count and record happen inside one `Mutex` critical section. Two
/// concurrent requests for the last free slot can never both be admitted.
/// The lock is never held across an `.await`.
#[derive(Debug, Clone)]
pub struct RateLimiter {
    inner: Arc<Mutex<RateLimiterInner>>,
}

#[derive(Debug)]
struct RateLimiterInner {
    /// Per-client admission logs.
    logs: HashMap<String, RequestLog>,

    /// Maximum admissions per window.
    limit: usize,

    /// Length of the trailing window.
    window: Duration,
}

impl RateLimiter {
    /// Creates a new rate limiter admitting `limit` requests per `window`.
    ///
    /// # Example
    ///
    /// ```rust
    /// use std::time::Duration;
    /// use goticket_server::rate_limit::RateLimiter;
    ///
    /// // 100 requests per hour
    /// let limiter = RateLimiter::new(100, Duration::from_secs(3600));
    /// assert_eq!(limiter.limit(), 100);
    /// ```
    pub fn new(limit: usize, window: Duration) -> Self {
        Self {
            inner: Arc::new(Mutex::new(RateLimiterInner {
                logs: HashMap::new(),
                limit,
                window,
            })),
        }
    }

    /// Creates a new rate limiter with [`DEFAULT_LIMIT`] and [`DEFAULT_WINDOW`].
    pub fn with_defaults() -> Self {
        Self::new(DEFAULT_LIMIT, DEFAULT_WINDOW)
    }

    /// Checks whether a request from `client_key` is admitted right now.
    ///
    /// Any string is a valid key, including the empty string.
    pub fn check_rate_limit(&self, client_key: &str) -> RateLimitResult {
        self.check_rate_limit_at(client_key, Instant::now())
    }

    /// Checks a request against the window ending at `now`.
    ///
    /// Callers must pass non-decreasing instants for a given key.
    pub fn check_rate_limit_at(&self, client_key: &str, now: Instant) -> RateLimitResult {
        let mut inner = self.lock();
        let limit = inner.limit;
        let window = inner.window;
        let cutoff = now.checked_sub(window);

        let log = inner.logs.entry(client_key.to_string()).or_default();
        log.prune(cutoff);

        if log.len() >= limit {
            let retry_after_secs = log
                .oldest()
                .map(|oldest| match oldest.checked_add(window) {
                    Some(frees_at) => frees_at.saturating_duration_since(now),
                    None => window,
                })
                .map(ceil_secs)
                .unwrap_or(1)
                .max(1);
            return RateLimitResult::Limited { retry_after_secs };
        }

        log.record(now);
        RateLimitResult::Allowed
    }

    /// Removes clients whose entire log has already left the window.
    ///
    /// Returns the number of clients removed.
    pub fn sweep_idle_keys(&self) -> usize {
        self.sweep_idle_keys_at(Instant::now())
    }

    /// Like [`Self::sweep_idle_keys`] with an explicit clock reading.
    pub fn sweep_idle_keys_at(&self, now: Instant) -> usize {
        let mut inner = self.lock();
        let cutoff = now.checked_sub(inner.window);
        let initial_count = inner.logs.len();

        inner.logs.retain(|_, log| !log.is_expired(cutoff));

        initial_count - inner.logs.len()
    }

    /// Returns the number of tracked clients.
    pub fn source_count(&self) -> usize {
        self.lock().logs.len()
    }

    /// Maximum admissions per window.
    pub fn limit(&self) -> usize {
        self.lock().limit
    }

    /// Length of the trailing window.
    pub fn window(&self) -> Duration {
        self.lock().window
    }

    /// Spawns a background task that periodically runs [`Self::sweep_idle_keys`].
    ///
    /// The task runs until the returned handle is aborted.
    pub fn spawn_sweep_task(&self, sweep_interval: Duration) -> tokio::task::JoinHandle<()> {
        let limiter = self.clone();

        tokio::spawn(async move {
            let mut interval = tokio::time::interval(sweep_interval);

            loop {
                interval.tick().await;
                let removed = limiter.sweep_idle_keys();
                if removed > 0 {
                    tracing::debug!(removed_count = removed, "Swept idle rate limit entries");
                }
            }
        })
    }

    fn lock(&self) -> MutexGuard<'_, RateLimiterInner> {
        // The critical sections cannot panic part-way, so a poisoned lock
        // still holds consistent data.
        self.inner
            .lock()
            .unwrap_or_else(|poisoned| poisoned.into_inner())
    }
}

impl Default for RateLimiter {
    fn default() -> Self {
        Self::with_defaults()
    }
}

fn ceil_secs(duration: Duration) -> u64 {
    let secs = duration.as_secs();
    if duration.subsec_nanos() > 0 {
        secs + 1
    } else {
        secs
    }
}
