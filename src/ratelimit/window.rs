//! Fixed-window state, policies and decisions.

use chrono::{DateTime, Duration, Utc};
use serde::{Deserialize, Serialize};

use crate::error::{AppError, Result};

/// Default number of requests allowed per window.
pub const DEFAULT_MAX_REQUESTS: u32 = 100;
/// Default window length in milliseconds.
pub const DEFAULT_WINDOW_MS: u64 = 60_000;

/// How the limiter decides that an identity's window has run out.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum ResetMode {
    /// The window resets as soon as its end has been reached.
    #[default]
    Strict,
    /// The window resets only once a full window length has passed after its
    /// end, so a window can last up to twice its nominal length under low
    /// traffic. Kept for parity with deployments that relied on it; the
    /// reported reset time is the delayed one.
    Lenient,
}

/// Rate limit policy for one protected route.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Policy {
    max_requests: u32,
    window_ms: u64,
}

impl Policy {
    /// Create a policy, rejecting zero limits and out-of-range windows.
    pub fn new(max_requests: u32, window_ms: u64) -> Result<Self> {
        if max_requests == 0 {
            return Err(AppError::Config(
                "max_requests must be greater than zero".to_string(),
            ));
        }
        if window_ms == 0 || window_ms > i64::MAX as u64 {
            return Err(AppError::Config(format!(
                "window_ms must be between 1 and {}, got {}",
                i64::MAX,
                window_ms
            )));
        }
        Ok(Self {
            max_requests,
            window_ms,
        })
    }

    /// Requests allowed per window.
    pub fn max_requests(&self) -> u32 {
        self.max_requests
    }

    /// Window length in milliseconds.
    pub fn window_ms(&self) -> u64 {
        self.window_ms
    }

    /// Window length as a signed duration.
    pub fn window(&self) -> Duration {
        Duration::milliseconds(self.window_ms as i64)
    }
}

impl Default for Policy {
    fn default() -> Self {
        Self {
            max_requests: DEFAULT_MAX_REQUESTS,
            window_ms: DEFAULT_WINDOW_MS,
        }
    }
}

/// Per-identity counter state.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct WindowState {
    /// Accepted requests in the current window
    pub count: u32,
    /// When the current window resets
    pub window_end: DateTime<Utc>,
}

impl WindowState {
    /// Open a fresh window at `now` holding the first accepted request.
    pub fn open(now: DateTime<Utc>, policy: &Policy) -> Self {
        Self {
            count: 1,
            window_end: now + policy.window(),
        }
    }

    /// When the window is actually replaced under `mode`.
    ///
    /// This is the time reported to clients, so a retry at or after it is
    /// never rejected by this window.
    pub fn resets_at(&self, policy: &Policy, mode: ResetMode) -> DateTime<Utc> {
        match mode {
            ResetMode::Strict => self.window_end,
            ResetMode::Lenient => self.window_end + policy.window(),
        }
    }

    /// Whether the window should be replaced by a fresh one.
    pub fn is_expired(&self, now: DateTime<Utc>, policy: &Policy, mode: ResetMode) -> bool {
        now >= self.resets_at(policy, mode)
    }

    /// Whether the entry has been idle long enough to be evicted.
    pub fn is_evictable(&self, now: DateTime<Utc>, grace: Duration) -> bool {
        now - self.window_end > grace
    }
}

/// Outcome of a single rate limit evaluation.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Decision {
    /// Whether the request may proceed
    pub allowed: bool,
    /// The policy's request limit
    pub limit: u32,
    /// Requests left in the current window
    pub remaining: u32,
    /// When the current window resets
    pub reset_time: DateTime<Utc>,
}

impl Decision {
    /// Whole seconds until the window resets, rounded up and never negative.
    pub fn retry_after_secs(&self, now: DateTime<Utc>) -> u64 {
        let millis = (self.reset_time - now).num_milliseconds();
        if millis <= 0 {
            0
        } else {
            (millis as u64).div_ceil(1000)
        }
    }
}
