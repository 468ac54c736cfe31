//! Per-client fixed-window rate limiting.
//!
//! A single [`LimiterStore`] is shared by the [`RateLimiter`], which admits
//! or rejects requests, and the [`Reaper`], which evicts idle entries.
//! [`with_rate_limit`] composes the limiter with any function handler.

mod clock;
mod identity;
mod limiter;
mod middleware;
mod reaper;
mod store;
mod window;

pub use clock::{Clock, ManualClock, SystemClock};
pub use identity::{client_identity, CLIENT_IP_HEADER, FORWARDED_FOR_HEADER, UNKNOWN_IDENTITY};
pub use limiter::RateLimiter;
pub use middleware::{
    bucket_key, format_reset_time, rate_limit_headers, throttled_response, with_rate_limit,
    RateLimited, X_RATELIMIT_LIMIT, X_RATELIMIT_REMAINING, X_RATELIMIT_RESET,
};
pub use reaper::{Reaper, DEFAULT_EVICTION_GRACE_MS, DEFAULT_REAPER_INTERVAL_MS};
pub use store::LimiterStore;
pub use window::{Decision, Policy, ResetMode, WindowState, DEFAULT_MAX_REQUESTS, DEFAULT_WINDOW_MS};
