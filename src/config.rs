//! Configuration management for the adoption functions service.

use std::net::SocketAddr;
use std::path::Path;
use std::time::Duration;

use serde::{Deserialize, Serialize};

use crate::error::{AppError, Result};
use crate::ratelimit::{
    Policy, ResetMode, DEFAULT_EVICTION_GRACE_MS, DEFAULT_MAX_REQUESTS, DEFAULT_REAPER_INTERVAL_MS,
    DEFAULT_WINDOW_MS,
};

/// Prefix for environment overrides, e.g. `ADOPTION__SERVER__BIND_ADDR`.
const ENV_PREFIX: &str = "ADOPTION";

/// Main configuration for the service.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct AppConfig {
    /// Server configuration
    #[serde(default)]
    pub server: ServerConfig,

    /// Rate limiting configuration
    #[serde(default)]
    pub rate_limiting: RateLimitingConfig,
}

/// Server configuration.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ServerConfig {
    /// HTTP listen address
    #[serde(default = "default_bind_addr")]
    pub bind_addr: SocketAddr,

    /// Keep client address headers set by a fronting proxy instead of
    /// replacing them with the socket peer address
    #[serde(default)]
    pub trust_proxy_headers: bool,
}

impl Default for ServerConfig {
    fn default() -> Self {
        Self {
            bind_addr: default_bind_addr(),
            trust_proxy_headers: false,
        }
    }
}

fn default_bind_addr() -> SocketAddr {
    SocketAddr::from(([127, 0, 0, 1], 8888))
}

/// Limits for one protected route.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct PolicyConfig {
    /// Requests allowed per window
    #[serde(default = "default_max_requests")]
    pub max_requests: u32,

    /// Window length in milliseconds
    #[serde(default = "default_window_ms")]
    pub window_ms: u64,
}

impl Default for PolicyConfig {
    fn default() -> Self {
        Self {
            max_requests: default_max_requests(),
            window_ms: default_window_ms(),
        }
    }
}

impl PolicyConfig {
    /// Validate into a limiter policy.
    pub fn to_policy(&self) -> Result<Policy> {
        Policy::new(self.max_requests, self.window_ms)
    }
}

fn default_max_requests() -> u32 {
    DEFAULT_MAX_REQUESTS
}

fn default_window_ms() -> u64 {
    DEFAULT_WINDOW_MS
}

/// Per-route overrides. Unset routes use the default policy.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct RouteOverrides {
    #[serde(default)]
    pub pets: Option<PolicyConfig>,

    #[serde(default)]
    pub favorites: Option<PolicyConfig>,
}

/// A route protected by the limiter.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Route {
    Pets,
    Favorites,
}

impl Route {
    /// Name used to scope the route's rate limit buckets.
    pub fn name(&self) -> &'static str {
        match self {
            Route::Pets => "pets",
            Route::Favorites => "favorites",
        }
    }
}

/// Rate limiting configuration.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct RateLimitingConfig {
    /// Time between reaper sweeps in milliseconds
    #[serde(default = "default_reaper_interval")]
    pub reaper_interval_ms: u64,

    /// Idle time past a window's end before eviction, in milliseconds
    #[serde(default = "default_eviction_grace")]
    pub eviction_grace_ms: u64,

    /// Window reset rule
    #[serde(default)]
    pub reset_mode: ResetMode,

    /// Policy for routes without an override
    #[serde(default)]
    pub default_policy: PolicyConfig,

    /// Per-route policy overrides
    #[serde(default)]
    pub routes: RouteOverrides,
}

impl Default for RateLimitingConfig {
    fn default() -> Self {
        Self {
            reaper_interval_ms: default_reaper_interval(),
            eviction_grace_ms: default_eviction_grace(),
            reset_mode: ResetMode::default(),
            default_policy: PolicyConfig::default(),
            routes: RouteOverrides::default(),
        }
    }
}

fn default_reaper_interval() -> u64 {
    DEFAULT_REAPER_INTERVAL_MS
}

fn default_eviction_grace() -> u64 {
    DEFAULT_EVICTION_GRACE_MS
}

impl RateLimitingConfig {
    /// The validated policy for `route`.
    pub fn policy_for(&self, route: Route) -> Result<Policy> {
        let configured = match route {
            Route::Pets => self.routes.pets,
            Route::Favorites => self.routes.favorites,
        };
        configured.unwrap_or(self.default_policy).to_policy()
    }

    /// Sweep interval for the reaper.
    pub fn reaper_interval(&self) -> Duration {
        Duration::from_millis(self.reaper_interval_ms)
    }

    /// Eviction grace period for the reaper.
    pub fn eviction_grace(&self) -> Duration {
        Duration::from_millis(self.eviction_grace_ms)
    }
}

impl AppConfig {
    /// Load configuration from an optional YAML file, then apply
    /// `ADOPTION__`-prefixed environment overrides.
    pub fn load(path: Option<&Path>) -> Result<Self> {
        let mut builder = config::Config::builder();
        if let Some(path) = path {
            builder = builder.add_source(config::File::from(path).format(config::FileFormat::Yaml));
        }
        let config: AppConfig = builder
            .add_source(
                config::Environment::with_prefix(ENV_PREFIX)
                    .prefix_separator("__")
                    .separator("__")
                    .try_parsing(true),
            )
            .build()?
            .try_deserialize()?;

        config.validate()?;
        Ok(config)
    }

    /// Parse configuration from a YAML string.
    pub fn from_yaml(yaml: &str) -> Result<Self> {
        let config: AppConfig =
            serde_yaml::from_str(yaml).map_err(|e| AppError::Config(e.to_string()))?;
        config.validate()?;
        Ok(config)
    }

    /// Reject settings the limiter or reaper cannot run with.
    pub fn validate(&self) -> Result<()> {
        let limits = &self.rate_limiting;
        if limits.reaper_interval_ms == 0 {
            return Err(AppError::Config(
                "reaper_interval_ms must be greater than zero".to_string(),
            ));
        }
        limits.policy_for(Route::Pets)?;
        limits.policy_for(Route::Favorites)?;
        Ok(())
    }
}
