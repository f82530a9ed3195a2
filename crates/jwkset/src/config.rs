//! Configuration for the key-set cache and the HTTP key source.
//!
//! Both types can be built in code through a validating builder or
//! deserialized from a configuration file (durations use `humantime`
//! notation such as `"10m"` or `"30s"`). Deserialized values must be
//! checked with `validate()` before use.
//!
//! # Example
//!
//! ```
//! use std::time::Duration;
//! use oidc_jwkset::CacheConfig;
//!
//! let config = CacheConfig::builder()
//!     .default_expiration(Duration::from_secs(600))
//!     .sweep_interval(Duration::from_secs(60))
//!     .build()?;
//! assert_eq!(config.sweep_interval(), Duration::from_secs(60));
//! # Ok::<(), oidc_jwkset::ConfigError>(())
//! ```

use std::time::Duration;

use serde::{Deserialize, Serialize};
use thiserror::Error;

/// Default lifetime for key sets whose source declared no freshness window.
pub const DEFAULT_EXPIRATION: Duration = Duration::from_secs(600);

/// Default interval between background sweeps of expired entries.
pub const DEFAULT_SWEEP_INTERVAL: Duration = Duration::from_secs(60);

/// Default upper bound on how long any key set may be cached.
pub const DEFAULT_MAX_EXPIRATION: Duration = Duration::from_secs(86_400);

/// Default maximum number of cached source identifiers.
pub const DEFAULT_MAX_CAPACITY: u64 = 1_000;

/// Default HTTP request timeout.
pub const DEFAULT_HTTP_TIMEOUT: Duration = Duration::from_secs(10);

/// Default HTTP connect timeout.
pub const DEFAULT_HTTP_CONNECT_TIMEOUT: Duration = Duration::from_secs(5);

/// Default `User-Agent` sent to key-set endpoints.
pub const DEFAULT_USER_AGENT: &str = concat!("oidc-jwkset/", env!("CARGO_PKG_VERSION"));

/// Configuration validation errors.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
#[non_exhaustive]
pub enum ConfigError {
    /// A value is below its allowed minimum.
    #[error("{field} must be at least {min}, got {value}")]
    BelowMinimum {
        /// Name of the offending field.
        field: &'static str,
        /// The rejected value, formatted for display.
        value: String,
        /// The minimum allowed value, formatted for display.
        min: String,
    },

    /// Two fields are inconsistent with each other.
    #[error("{field} is invalid: {reason}")]
    Invalid {
        /// Name of the offending field.
        field: &'static str,
        /// Why the value was rejected.
        reason: String,
    },

    /// The HTTP client could not be constructed.
    #[error("failed to build HTTP client: {0}")]
    HttpClient(String),
}

/// Timing and capacity parameters of a [`KeySetCache`](crate::KeySetCache).
///
/// # Validation
///
/// - `default_expiration`, `sweep_interval` and `max_expiration` must be non-zero
/// - `default_expiration` must not exceed `max_expiration`
/// - `max_capacity` must be >= 1
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct CacheConfig {
    /// Lifetime used when a source declares no freshness window.
    #[serde(with = "humantime_serde", default = "default_expiration")]
    pub(crate) default_expiration: Duration,

    /// Period of the background sweep that evicts expired entries.
    #[serde(with = "humantime_serde", default = "default_sweep_interval")]
    pub(crate) sweep_interval: Duration,

    /// Upper bound on any stored lifetime.
    #[serde(with = "humantime_serde", default = "default_max_expiration")]
    pub(crate) max_expiration: Duration,

    /// Maximum number of cached source identifiers.
    #[serde(default = "default_max_capacity")]
    pub(crate) max_capacity: u64,
}

fn default_expiration() -> Duration {
    DEFAULT_EXPIRATION
}

fn default_sweep_interval() -> Duration {
    DEFAULT_SWEEP_INTERVAL
}

fn default_max_expiration() -> Duration {
    DEFAULT_MAX_EXPIRATION
}

fn default_max_capacity() -> u64 {
    DEFAULT_MAX_CAPACITY
}

impl Default for CacheConfig {
    fn default() -> Self {
        Self {
            default_expiration: DEFAULT_EXPIRATION,
            sweep_interval: DEFAULT_SWEEP_INTERVAL,
            max_expiration: DEFAULT_MAX_EXPIRATION,
            max_capacity: DEFAULT_MAX_CAPACITY,
        }
    }
}

impl CacheConfig {
    /// Returns a builder pre-populated with the defaults.
    #[must_use]
    pub fn builder() -> CacheConfigBuilder {
        CacheConfigBuilder { config: Self::default() }
    }

    /// Returns the lifetime used when a source declares no freshness window.
    #[must_use]
    pub fn default_expiration(&self) -> Duration {
        self.default_expiration
    }

    /// Returns the background sweep period.
    #[must_use]
    pub fn sweep_interval(&self) -> Duration {
        self.sweep_interval
    }

    /// Returns the upper bound on any stored lifetime.
    #[must_use]
    pub fn max_expiration(&self) -> Duration {
        self.max_expiration
    }

    /// Returns the maximum number of cached source identifiers.
    #[must_use]
    pub fn max_capacity(&self) -> u64 {
        self.max_capacity
    }

    /// Checks every field against the rules listed on [`CacheConfig`].
    ///
    /// # Errors
    ///
    /// Returns the first [`ConfigError`] encountered.
    pub fn validate(&self) -> Result<(), ConfigError> {
        non_zero("default_expiration", self.default_expiration)?;
        non_zero("sweep_interval", self.sweep_interval)?;
        non_zero("max_expiration", self.max_expiration)?;
        if self.max_capacity == 0 {
            return Err(ConfigError::BelowMinimum {
                field: "max_capacity",
                value: self.max_capacity.to_string(),
                min: "1".to_owned(),
            });
        }
        if self.default_expiration > self.max_expiration {
            return Err(ConfigError::Invalid {
                field: "default_expiration",
                reason: format!(
                    "{}ms exceeds max_expiration of {}ms",
                    self.default_expiration.as_millis(),
                    self.max_expiration.as_millis()
                ),
            });
        }
        Ok(())
    }

    /// Computes how long a freshly fetched key set may stay cached.
    ///
    /// - a zero `ttl` falls back to `default_expiration`
    /// - a `ttl` longer than the sweep interval is shortened by one interval, so an entry
    ///   can never outlive the provider's window while waiting for the next sweep
    /// - the result never exceeds `max_expiration`
    #[must_use]
    pub fn stored_lifetime(&self, ttl: Duration) -> Duration {
        let lifetime = if ttl.is_zero() {
            self.default_expiration
        } else if ttl > self.sweep_interval {
            ttl - self.sweep_interval
        } else {
            ttl
        };
        lifetime.min(self.max_expiration)
    }
}

/// Builder for [`CacheConfig`].
#[derive(Debug, Clone)]
pub struct CacheConfigBuilder {
    config: CacheConfig,
}

impl CacheConfigBuilder {
    /// Sets the lifetime used when a source declares no freshness window.
    #[must_use]
    pub fn default_expiration(mut self, default_expiration: Duration) -> Self {
        self.config.default_expiration = default_expiration;
        self
    }

    /// Sets the background sweep period.
    #[must_use]
    pub fn sweep_interval(mut self, sweep_interval: Duration) -> Self {
        self.config.sweep_interval = sweep_interval;
        self
    }

    /// Sets the upper bound on any stored lifetime.
    #[must_use]
    pub fn max_expiration(mut self, max_expiration: Duration) -> Self {
        self.config.max_expiration = max_expiration;
        self
    }

    /// Sets the maximum number of cached source identifiers.
    #[must_use]
    pub fn max_capacity(mut self, max_capacity: u64) -> Self {
        self.config.max_capacity = max_capacity;
        self
    }

    /// Builds the [`CacheConfig`], validating all fields.
    ///
    /// # Errors
    ///
    /// Returns [`ConfigError`] if any rule listed on [`CacheConfig`] is violated.
    pub fn build(self) -> Result<CacheConfig, ConfigError> {
        self.config.validate()?;
        Ok(self.config)
    }
}

/// Transport settings for [`HttpKeySource`](crate::source::HttpKeySource).
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct HttpSourceConfig {
    /// Whole-request timeout.
    #[serde(with = "humantime_serde", default = "default_http_timeout")]
    pub timeout: Duration,

    /// Connection establishment timeout.
    #[serde(with = "humantime_serde", default = "default_http_connect_timeout")]
    pub connect_timeout: Duration,

    /// `User-Agent` header value.
    #[serde(default = "default_user_agent")]
    pub user_agent: String,
}

fn default_http_timeout() -> Duration {
    DEFAULT_HTTP_TIMEOUT
}

fn default_http_connect_timeout() -> Duration {
    DEFAULT_HTTP_CONNECT_TIMEOUT
}

fn default_user_agent() -> String {
    DEFAULT_USER_AGENT.to_owned()
}

impl Default for HttpSourceConfig {
    fn default() -> Self {
        Self {
            timeout: DEFAULT_HTTP_TIMEOUT,
            connect_timeout: DEFAULT_HTTP_CONNECT_TIMEOUT,
            user_agent: default_user_agent(),
        }
    }
}

impl HttpSourceConfig {
    /// Checks that both timeouts are non-zero.
    ///
    /// # Errors
    ///
    /// Returns [`ConfigError::BelowMinimum`] for a zero timeout.
    pub fn validate(&self) -> Result<(), ConfigError> {
        non_zero("timeout", self.timeout)?;
        non_zero("connect_timeout", self.connect_timeout)
    }
}

fn non_zero(field: &'static str, value: Duration) -> Result<(), ConfigError> {
    if value.is_zero() {
        return Err(ConfigError::BelowMinimum {
            field,
            value: format!("{}ms", value.as_millis()),
            min: "1ms".to_owned(),
        });
    }
    Ok(())
}
