//! Per-resolver rate limiting with 429-aware backoff.
//!
//! Each resolver owns one [`RateLimiter`]. A limiter enforces three things before a
//! request goes out:
//!
//! - at most `burst_size` requests may be waiting for the limiter at once;
//! - neither the per-second nor the optional per-minute window ceiling is exceeded;
//! - no request is sent while a 429-triggered backoff is active.
//!
//! # Example
//!
//! ```
//! use consearch_core::resolver::{Backoff, RateLimitConfig, RateLimiter};
//!
//! # async fn example() {
//! let limiter = RateLimiter::new(RateLimitConfig::per_second(2.0));
//! limiter.acquire().await;
//!
//! // Server answered 429 without Retry-After: back off 60s, then retry.
//! match limiter.handle_429(None).await {
//!     Backoff::Retry(wait) => assert_eq!(wait.as_secs(), 60),
//!     Backoff::Exhausted(_) => unreachable!(),
//! }
//! # }
//! ```

use std::collections::VecDeque;
use std::sync::atomic::{AtomicU64, Ordering};
use std::time::Duration;

use tokio::sync::{Mutex, Semaphore};
use tokio::time::Instant;
use tracing::{debug, instrument, warn};

/// Warning threshold for cumulative delay per limiter.
const CUMULATIVE_DELAY_WARNING_THRESHOLD: Duration = Duration::from_secs(30);

/// Maximum Retry-After value honored (1 hour).
const MAX_RETRY_AFTER: Duration = Duration::from_secs(3600);

/// Base delay for the first 429 when the server sends no Retry-After.
const BASE_429_BACKOFF: Duration = Duration::from_secs(60);

/// Upper bound for computed 429 backoff.
pub const MAX_429_BACKOFF: Duration = Duration::from_secs(300);

const SECOND_WINDOW: Duration = Duration::from_secs(1);
const MINUTE_WINDOW: Duration = Duration::from_secs(60);

/// Rate-limit policy for one resolver.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct RateLimitConfig {
    /// Ceiling for the 1-second window; `0` disables the window
    pub requests_per_second: f64,
    /// Optional ceiling for the 60-second window
    pub requests_per_minute: Option<f64>,
    /// Maximum callers inside the limiter at once
    pub burst_size: usize,
    /// Whether 429 responses are retried after backing off
    pub retry_on_429: bool,
    /// Consecutive 429s after which the request is given up
    pub max_429_retries: u32,
    /// Multiplier applied per consecutive 429
    pub backoff_factor: f64,
}

impl RateLimitConfig {
    /// Policy with the given per-second ceiling and default retry behavior.
    #[must_use]
    pub const fn per_second(requests_per_second: f64) -> Self {
        Self {
            requests_per_second,
            requests_per_minute: None,
            burst_size: 1,
            retry_on_429: true,
            max_429_retries: 3,
            backoff_factor: 2.0,
        }
    }

    /// Sets the burst size.
    #[must_use]
    pub const fn with_burst(mut self, burst_size: usize) -> Self {
        self.burst_size = burst_size;
        self
    }

    /// Sets a per-minute ceiling.
    #[must_use]
    pub const fn with_per_minute(mut self, requests_per_minute: f64) -> Self {
        self.requests_per_minute = Some(requests_per_minute);
        self
    }

    /// Backoff for the `consecutive`-th 429 in a row (1-based) without Retry-After.
    #[must_use]
    pub fn backoff_for(&self, consecutive: u32) -> Duration {
        let exponent = i32::try_from(consecutive.saturating_sub(1)).unwrap_or(i32::MAX);
        let secs = BASE_429_BACKOFF.as_secs_f64() * self.backoff_factor.powi(exponent);
        if secs.is_finite() && secs < MAX_429_BACKOFF.as_secs_f64() {
            Duration::from_secs_f64(secs.max(0.0))
        } else {
            MAX_429_BACKOFF
        }
    }
}

impl Default for RateLimitConfig {
    fn default() -> Self {
        Self::per_second(1.0)
    }
}

/// What the caller should do after a 429.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Backoff {
    /// Retry once the returned delay has elapsed (the limiter enforces it).
    Retry(Duration),
    /// Give up and surface the delay as `retry_after`.
    Exhausted(Duration),
}

impl Backoff {
    /// The backoff delay, whichever variant.
    #[must_use]
    pub fn delay(self) -> Duration {
        match self {
            Self::Retry(delay) | Self::Exhausted(delay) => delay,
        }
    }
}

/// Mutable limiter bookkeeping, only touched under the limiter lock.
#[derive(Debug, Default)]
struct RateLimitState {
    /// Send instants from the last minute, oldest first.
    request_times: VecDeque<Instant>,
    /// No request may start before this instant.
    blocked_until: Option<Instant>,
    consecutive_429: u32,
}

impl RateLimitState {
    fn prune(&mut self, now: Instant) {
        while let Some(oldest) = self.request_times.front() {
            if now.duration_since(*oldest) >= MINUTE_WINDOW {
                self.request_times.pop_front();
            } else {
                break;
            }
        }
    }

    /// Wait needed so that one more request stays under `limit` within `window`.
    #[allow(clippy::cast_precision_loss)]
    fn window_wait(&self, now: Instant, window: Duration, limit: f64) -> Duration {
        if limit <= 0.0 {
            return Duration::ZERO;
        }
        let mut recent = self
            .request_times
            .iter()
            .filter(|sent| now.duration_since(**sent) < window);
        let Some(oldest) = recent.next() else {
            return Duration::ZERO;
        };
        let count = 1 + recent.count();
        if (count as f64) < limit {
            return Duration::ZERO;
        }
        window.saturating_sub(now.duration_since(*oldest))
    }
}

/// Sliding-window rate limiter for a single resolver.
///
/// Designed to be owned by one resolver and shared by reference across the
/// concurrent calls made against that resolver.
#[derive(Debug)]
pub struct RateLimiter {
    config: RateLimitConfig,
    label: &'static str,
    permits: Semaphore,
    state: Mutex<RateLimitState>,
    cumulative_delay_ms: AtomicU64,
}

impl RateLimiter {
    /// Creates a limiter for the given policy.
    #[must_use]
    pub fn new(config: RateLimitConfig) -> Self {
        Self::with_label(config, "resolver")
    }

    /// Creates a limiter whose log events carry `label`.
    #[must_use]
    pub fn with_label(config: RateLimitConfig, label: &'static str) -> Self {
        Self {
            permits: Semaphore::new(config.burst_size.max(1)),
            config,
            label,
            state: Mutex::new(RateLimitState::default()),
            cumulative_delay_ms: AtomicU64::new(0),
        }
    }

    /// Policy this limiter enforces.
    #[must_use]
    pub fn config(&self) -> &RateLimitConfig {
        &self.config
    }

    /// Number of 429 responses seen in a row.
    pub async fn consecutive_429(&self) -> u32 {
        self.state.lock().await.consecutive_429
    }

    /// Waits until one more request may be sent, then records it.
    #[instrument(skip(self), fields(resolver = self.label))]
    pub async fn acquire(&self) {
        // The semaphore is never closed.
        let Ok(_permit) = self.permits.acquire().await else {
            return;
        };
        let mut state = self.state.lock().await;

        if let Some(until) = state.blocked_until.take() {
            let now = Instant::now();
            if until > now {
                let delay = until - now;
                debug!(delay_ms = delay.as_millis(), "waiting out 429 backoff");
                self.note_delay(delay);
                tokio::time::sleep(delay).await;
            }
        }

        let now = Instant::now();
        state.prune(now);
        let mut wait = state.window_wait(now, SECOND_WINDOW, self.config.requests_per_second);
        if let Some(per_minute) = self.config.requests_per_minute {
            wait = wait.max(state.window_wait(now, MINUTE_WINDOW, per_minute));
        }

        if !wait.is_zero() {
            debug!(delay_ms = wait.as_millis(), "applying rate limit delay");
            self.note_delay(wait);
            tokio::time::sleep(wait).await;
        }

        state.request_times.push_back(Instant::now());
    }

    /// Records a 429 response and blocks the limiter for the backoff period.
    ///
    /// The backoff is `retry_after` when the server sent one, else
    /// `min(300s, 60s * backoff_factor^(n-1))` for the n-th 429 in a row.
    pub async fn handle_429(&self, retry_after: Option<Duration>) -> Backoff {
        let mut state = self.state.lock().await;
        state.consecutive_429 = state.consecutive_429.saturating_add(1);
        let consecutive = state.consecutive_429;

        let backoff = retry_after
            .map(|wait| wait.min(MAX_RETRY_AFTER))
            .unwrap_or_else(|| self.config.backoff_for(consecutive));
        state.blocked_until = Some(Instant::now() + backoff);

        let retry = self.config.retry_on_429 && consecutive < self.config.max_429_retries;
        warn!(
            resolver = self.label,
            consecutive,
            backoff_secs = backoff.as_secs_f64(),
            retry,
            "received 429 Too Many Requests"
        );

        if retry {
            Backoff::Retry(backoff)
        } else {
            Backoff::Exhausted(backoff)
        }
    }

    /// Clears the consecutive-429 counter after any non-429 response.
    pub async fn reset_429(&self) {
        self.state.lock().await.consecutive_429 = 0;
    }

    #[allow(clippy::cast_possible_truncation)]
    fn note_delay(&self, delay: Duration) {
        let delay_ms = delay.as_millis() as u64;
        let total_ms = self
            .cumulative_delay_ms
            .fetch_add(delay_ms, Ordering::SeqCst)
            .saturating_add(delay_ms);
        let total = Duration::from_millis(total_ms);
        if total >= CUMULATIVE_DELAY_WARNING_THRESHOLD
            && total_ms.saturating_sub(delay_ms) < CUMULATIVE_DELAY_WARNING_THRESHOLD.as_millis() as u64
        {
            warn!(
                resolver = self.label,
                cumulative_delay_secs = total.as_secs(),
                "excessive rate limiting - consider reducing request volume to this source"
            );
        }
    }
}

/// Parses a Retry-After header value into a Duration.
///
/// Supports integer seconds (`Retry-After: 120`) and HTTP-dates
/// (`Retry-After: Wed, 21 Oct 2025 07:28:00 GMT`). Returns `None` when the value
/// cannot be parsed. Values above one hour are capped.
///
/// # Examples
///
/// ```
/// use std::time::Duration;
/// use consearch_core::resolver::parse_retry_after;
///
/// assert_eq!(parse_retry_after("120"), Some(Duration::from_secs(120)));
/// assert_eq!(parse_retry_after("0"), Some(Duration::ZERO));
/// assert_eq!(parse_retry_after("invalid"), None);
/// ```
#[must_use]
pub fn parse_retry_after(header_value: &str) -> Option<Duration> {
    let header_value = header_value.trim();

    if let Ok(seconds) = header_value.parse::<i64>() {
        if seconds < 0 {
            debug!(seconds, "negative Retry-After value, ignoring");
            return None;
        }
        let duration = Duration::from_secs(seconds.unsigned_abs());
        if duration > MAX_RETRY_AFTER {
            warn!(
                seconds,
                max_seconds = MAX_RETRY_AFTER.as_secs(),
                "Retry-After exceeds maximum, capping at 1 hour"
            );
            return Some(MAX_RETRY_AFTER);
        }
        return Some(duration);
    }

    match httpdate::parse_http_date(header_value) {
        Ok(datetime) => match datetime.duration_since(std::time::SystemTime::now()) {
            Ok(duration) => Some(duration.min(MAX_RETRY_AFTER)),
            Err(_) => {
                debug!(header_value, "Retry-After date is in the past, returning zero");
                Some(Duration::ZERO)
            }
        },
        Err(_) => {
            debug!(header_value, "unparseable Retry-After value");
            None
        }
    }
}
