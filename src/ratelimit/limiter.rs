//! Fixed-window rate limiter.

use std::sync::Arc;

use chrono::{DateTime, Utc};
use tracing::{debug, trace};

use super::clock::{Clock, SystemClock};
use super::store::LimiterStore;
use super::window::{Decision, Policy, ResetMode, WindowState};

/// Decides whether a request from an identity may proceed under a policy.
///
/// The limiter itself is stateless; every counter lives in the shared
/// [`LimiterStore`]. Cloning is cheap and clones share the same store.
#[derive(Clone)]
pub struct RateLimiter {
    /// Shared window state
    store: Arc<LimiterStore>,
    /// Time source
    clock: Arc<dyn Clock>,
    /// Rule for retiring a window
    reset_mode: ResetMode,
}

impl RateLimiter {
    /// Create a rate limiter over `store` using the system clock.
    pub fn new(store: Arc<LimiterStore>) -> Self {
        Self::with_clock(store, Arc::new(SystemClock))
    }

    /// Create a rate limiter with an explicit time source.
    pub fn with_clock(store: Arc<LimiterStore>, clock: Arc<dyn Clock>) -> Self {
        Self {
            store,
            clock,
            reset_mode: ResetMode::default(),
        }
    }

    /// Use a different window reset rule.
    pub fn with_reset_mode(mut self, reset_mode: ResetMode) -> Self {
        self.reset_mode = reset_mode;
        self
    }

    /// Evaluate one request from `identity` and record it if accepted.
    ///
    /// Rejected requests leave the stored state untouched.
    pub fn check(&self, identity: &str, policy: &Policy) -> Decision {
        let now = self.clock.now();
        let limit = policy.max_requests();
        let reset_mode = self.reset_mode;

        let decision = self.store.update(identity, |slot| match slot {
            Some(state) if !state.is_expired(now, policy, reset_mode) => {
                let reset_time = state.resets_at(policy, reset_mode);
                if state.count < limit {
                    state.count += 1;
                    Decision {
                        allowed: true,
                        limit,
                        remaining: limit - state.count,
                        reset_time,
                    }
                } else {
                    Decision {
                        allowed: false,
                        limit,
                        remaining: 0,
                        reset_time,
                    }
                }
            }
            _ => {
                let fresh = WindowState::open(now, policy);
                *slot = Some(fresh);
                Decision {
                    allowed: true,
                    limit,
                    remaining: limit - 1,
                    reset_time: fresh.resets_at(policy, reset_mode),
                }
            }
        });

        if decision.allowed {
            trace!(
                identity = %identity,
                remaining = decision.remaining,
                reset_time = %decision.reset_time,
                "Request admitted"
            );
        } else {
            debug!(
                identity = %identity,
                limit = limit,
                reset_time = %decision.reset_time,
                "Rate limit exceeded"
            );
        }

        decision
    }

    /// The current time according to this limiter's clock.
    pub fn now(&self) -> DateTime<Utc> {
        self.clock.now()
    }

    /// The shared store.
    pub fn store(&self) -> &Arc<LimiterStore> {
        &self.store
    }
}

impl Default for RateLimiter {
    fn default() -> Self {
        Self::new(Arc::new(LimiterStore::new()))
    }
}

impl std::fmt::Debug for RateLimiter {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("RateLimiter")
            .field("tracked", &self.store.len())
            .field("reset_mode", &self.reset_mode)
            .finish()
    }
}
