//! Remote quota tracking and rate-limit backoff
//!
//! Adapters record the quota headers of every response in a `QuotaTracker`;
//! the crawl engine consults it through `RemoteSource::quota` before each
//! pass and blocks in `wait_for_reset` while the quota is spent.

use crate::source::RemoteSource;
use chrono::{DateTime, TimeZone, Utc};
use reqwest::header::HeaderMap;
use std::sync::{Mutex, PoisonError};
use std::time::Duration;

/// Remaining calls and reset time as last reported by the platform
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct RateLimitState {
    /// Remaining calls in the current window (None until the platform reports it)
    pub remaining: Option<u64>,

    /// When the window resets
    pub reset_at: Option<DateTime<Utc>>,
}

impl RateLimitState {
    /// Returns true if the platform reported zero remaining calls
    pub fn is_exhausted(&self) -> bool {
        self.remaining == Some(0)
    }
}

/// Thread-safe holder of the latest `RateLimitState`
#[derive(Debug, Default)]
pub struct QuotaTracker {
    state: Mutex<RateLimitState>,
}

impl QuotaTracker {
    pub fn new() -> Self {
        Self::default()
    }

    /// Returns the latest known state
    pub fn current(&self) -> RateLimitState {
        *self.state.lock().unwrap_or_else(PoisonError::into_inner)
    }

    /// Overwrites the known state
    pub fn update(&self, state: RateLimitState) {
        *self.state.lock().unwrap_or_else(PoisonError::into_inner) = state;
    }

    /// Marks the quota as spent until `reset_at` (if known)
    pub fn mark_exhausted(&self, reset_at: Option<DateTime<Utc>>) {
        let mut state = self.state.lock().unwrap_or_else(PoisonError::into_inner);
        state.remaining = Some(0);
        if reset_at.is_some() {
            state.reset_at = reset_at;
        }
    }

    /// Records quota headers from a response
    ///
    /// `reset_header` must carry a Unix timestamp in seconds. Headers that are
    /// missing or unparsable leave the corresponding field untouched.
    pub fn record_headers(&self, headers: &HeaderMap, remaining_header: &str, reset_header: &str) {
        let remaining = header_u64(headers, remaining_header);
        let reset_at = header_u64(headers, reset_header)
            .and_then(|secs| i64::try_from(secs).ok())
            .and_then(|secs| Utc.timestamp_opt(secs, 0).single());

        if remaining.is_none() && reset_at.is_none() {
            return;
        }

        let mut state = self.state.lock().unwrap_or_else(PoisonError::into_inner);
        if remaining.is_some() {
            state.remaining = remaining;
        }
        if reset_at.is_some() {
            state.reset_at = reset_at;
        }
    }
}

fn header_u64(headers: &HeaderMap, name: &str) -> Option<u64> {
    headers
        .get(name)
        .and_then(|v| v.to_str().ok())
        .and_then(|v| v.trim().parse().ok())
}

/// Calculates how long to wait before the quota is available again
///
/// Returns None when no wait is needed: calls remain, the remaining count is
/// unknown, the reset time is unknown, or the reset time has passed.
pub fn time_until_reset(state: &RateLimitState, now: DateTime<Utc>) -> Option<Duration> {
    if !state.is_exhausted() {
        return None;
    }
    let reset_at = state.reset_at?;
    (reset_at - now).to_std().ok().filter(|d| !d.is_zero())
}

/// Blocks until the source reports available quota
///
/// Sleeps once for the full remaining window. A missing reset timestamp is
/// treated as "unknown wait" and returns immediately.
pub async fn wait_for_reset(source: &dyn RemoteSource) {
    let state = source.quota();
    if let Some(wait) = time_until_reset(&state, Utc::now()) {
        tracing::info!(
            "{} rate limit reached, waiting {}s until {}",
            source.name(),
            wait.as_secs(),
            state
                .reset_at
                .map(|t| t.to_rfc3339())
                .unwrap_or_else(|| "?".to_string())
        );
        tokio::time::sleep(wait).await;
    }
}
