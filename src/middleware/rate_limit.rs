//! Rate limiting.
//!
//! Per-identity sliding window: each key keeps the timestamps of its admitted
//! requests, and a request is admitted while fewer than `max_requests` of them
//! fall inside the trailing window. A timestamp exactly `window` old no longer
//! counts.

use crate::clock::{Clock, SystemClock};
use crate::error::ApiError;
use axum::{
    http::{HeaderMap, HeaderName, HeaderValue},
    response::{IntoResponse, Response},
};
use chrono::{DateTime, Utc};
use parking_lot::RwLock;
use std::collections::{HashMap, VecDeque};
use std::sync::Arc;
use std::time::Duration;
use tokio::task::JoinHandle;
use tracing::{debug, warn};

pub const X_RATELIMIT_LIMIT: HeaderName = HeaderName::from_static("x-ratelimit-limit");
pub const X_RATELIMIT_REMAINING: HeaderName = HeaderName::from_static("x-ratelimit-remaining");
pub const X_RATELIMIT_RESET: HeaderName = HeaderName::from_static("x-ratelimit-reset");

/// Configuration for rate limiting.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct RateLimitConfig {
    /// Maximum admissions per window.
    pub max_requests: u32,
    /// Trailing window length.
    pub window: Duration,
}

impl RateLimitConfig {
    pub const fn per_minute(max_requests: u32) -> Self {
        Self {
            max_requests,
            window: Duration::from_secs(60),
        }
    }

    /// General API traffic.
    pub const fn general() -> Self {
        Self::per_minute(100)
    }

    /// Login and registration.
    pub const fn auth() -> Self {
        Self::per_minute(5)
    }

    /// Administrative surfaces.
    pub const fn strict() -> Self {
        Self::per_minute(10)
    }
}

impl Default for RateLimitConfig {
    fn default() -> Self {
        Self::general()
    }
}

/// Outcome of one admission attempt, with the numbers the response headers need.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct RateLimitDecision {
    pub allowed: bool,
    pub limit: u32,
    pub remaining: u32,
    pub reset_at: DateTime<Utc>,
    pub now: DateTime<Utc>,
}

impl RateLimitDecision {
    /// Whole seconds until `reset_at`, rounded up, never negative.
    pub fn retry_after_secs(&self) -> i64 {
        let ms = (self.reset_at - self.now).num_milliseconds().max(0);
        (ms + 999) / 1000
    }

    pub fn apply_headers(&self, headers: &mut HeaderMap) {
        headers.insert(X_RATELIMIT_LIMIT, HeaderValue::from(self.limit));
        headers.insert(X_RATELIMIT_REMAINING, HeaderValue::from(self.remaining));
        headers.insert(X_RATELIMIT_RESET, HeaderValue::from(self.reset_at.timestamp()));
    }

    /// 429 reply carrying the limit headers and `{error, message, retry_after}`.
    pub fn into_rejection(self) -> Response {
        let mut response = ApiError::RateLimited {
            retry_after: self.retry_after_secs(),
        }
        .into_response();
        self.apply_headers(response.headers_mut());
        response
    }
}

pub struct RateLimiter {
    config: RateLimitConfig,
    window: chrono::Duration,
    clock: Arc<dyn Clock>,
    records: RwLock<HashMap<String, VecDeque<DateTime<Utc>>>>,
}

impl RateLimiter {
    pub fn new(config: RateLimitConfig) -> Self {
        Self::with_clock(config, Arc::new(SystemClock))
    }

    pub fn with_clock(config: RateLimitConfig, clock: Arc<dyn Clock>) -> Self {
        let window_ms = config.window.as_millis().min(i64::MAX as u128) as i64;
        Self {
            config,
            window: chrono::Duration::milliseconds(window_ms),
            clock,
            records: RwLock::new(HashMap::new()),
        }
    }

    pub fn config(&self) -> RateLimitConfig {
        self.config
    }

    /// Admit or deny `key` now. Prune, count and append happen under one write lock.
    pub fn check(&self, key: &str) -> RateLimitDecision {
        let limit = self.config.max_requests;

        // Sample the clock under the lock so admissions are appended in order.
        let mut records = self.records.write();
        let now = self.clock.now();
        let cutoff = now - self.window;
        let stamps = records.entry(key.to_string()).or_default();
        stamps.retain(|t| *t > cutoff);

        let allowed = stamps.len() < limit as usize;
        if allowed {
            stamps.push_back(now);
        }

        let reset_at = stamps
            .iter()
            .min()
            .map_or(now, |oldest| *oldest + self.window);
        let remaining = limit.saturating_sub(stamps.len() as u32);
        if stamps.is_empty() {
            // limit == 0 leaves an empty list behind; don't keep the key around.
            records.remove(key);
        }

        if !allowed {
            debug!(key, limit, "Rate limit denial");
        }

        RateLimitDecision {
            allowed,
            limit,
            remaining,
            reset_at,
            now,
        }
    }

    pub fn is_allowed(&self, key: &str) -> bool {
        self.check(key).allowed
    }

    /// Admissions left for `key` in the current window. Does not record anything.
    pub fn remaining(&self, key: &str) -> u32 {
        let cutoff = self.clock.now() - self.window;
        let records = self.records.read();
        let live = records
            .get(key)
            .map_or(0, |stamps| stamps.iter().filter(|t| **t > cutoff).count());
        self.config.max_requests.saturating_sub(live as u32)
    }

    /// When the oldest admission still in the window expires; `now` if there is none.
    pub fn reset_at(&self, key: &str) -> DateTime<Utc> {
        let now = self.clock.now();
        let cutoff = now - self.window;
        let records = self.records.read();
        records
            .get(key)
            .and_then(|stamps| stamps.iter().filter(|t| **t > cutoff).min())
            .map_or(now, |oldest| *oldest + self.window)
    }

    /// Drop expired timestamps and empty keys. Only reclaims memory; every
    /// timestamp removed here would also be pruned by the next `check`.
    pub fn sweep(&self) -> usize {
        let mut records = self.records.write();
        let cutoff = self.clock.now() - self.window;
        let before = records.len();
        records.retain(|_, stamps| {
            stamps.retain(|t| *t > cutoff);
            !stamps.is_empty()
        });
        before - records.len()
    }

    pub fn tracked_keys(&self) -> usize {
        self.records.read().len()
    }

    /// Periodic sweep on the tokio runtime.
    pub fn spawn_sweeper(self: &Arc<Self>, every: Duration) -> JoinHandle<()> {
        let limiter = Arc::clone(self);
        let every = if every.is_zero() {
            warn!("Rate limit sweep interval is zero, using 1s");
            Duration::from_secs(1)
        } else {
            every
        };

        tokio::spawn(async move {
            let mut ticker = tokio::time::interval(every);
            ticker.tick().await;
            loop {
                ticker.tick().await;
                let evicted = limiter.sweep();
                if evicted > 0 {
                    debug!(evicted, "Rate limiter swept idle keys");
                }
            }
        })
    }
}
