//! Collector configuration
//!
//! Values come from the process environment via [`CollectorConfig::from_env`]
//! or from any key lookup via [`CollectorConfig::from_lookup`]. Unset keys
//! fall back to the defaults below; set but invalid keys are an error.

use std::time::Duration;

use crate::limiter::rate::start_interval;
use crate::limiter::{ConcurrencyLimiter, LimiterError};

/// Per-item timeout in milliseconds.
/// 90 seconds covers a slow page load plus a retry-free API round trip.
pub const DEFAULT_IO_TIMEOUT_MS: u64 = 90_000;

/// Maximum concurrent per-item operations.
pub const DEFAULT_CONCURRENCY_LIMIT: usize = 5;

/// Maximum operation starts per second.
pub const DEFAULT_RATE_LIMIT: f64 = 1.0;

/// Pipeline flush threshold and ids per upstream request.
/// The Data API accepts at most 50 ids per `videos.list` call.
pub const DEFAULT_BATCH_SIZE: usize = 50;

/// Data API v3 base URL
pub const DEFAULT_API_BASE_URL: &str = "https://www.googleapis.com/youtube/v3";

/// Environment variable names
pub mod env {
    /// Per-item timeout in milliseconds
    pub const IO_TIMEOUT: &str = "IO_TIMEOUT";
    /// Concurrency cap
    pub const IO_CONCURRENCY_LIMIT: &str = "IO_CONCURRENCY_LIMIT";
    /// Starts per second
    pub const IO_RATE_LIMIT: &str = "IO_RATE_LIMIT";
    /// Flush threshold / chunk size
    pub const IO_BATCH_SIZE: &str = "IO_BATCH_SIZE";
    /// Data API key
    pub const YT_API_KEY: &str = "YT_API_KEY";
    /// Data API base URL override
    pub const YT_API_BASE_URL: &str = "YT_API_BASE_URL";
}

/// Configuration errors
#[derive(Debug, thiserror::Error)]
pub enum ConfigError {
    /// A variable is set but cannot be parsed
    #[error("invalid value for {key}: '{value}' ({reason})")]
    InvalidValue {
        /// Variable name
        key: String,
        /// Raw value
        value: String,
        /// Why it was rejected
        reason: String,
    },

    /// The combined configuration is inconsistent
    #[error("invalid configuration: {0}")]
    Invalid(String),
}

/// Result type for configuration
pub type ConfigResult<T> = Result<T, ConfigError>;

impl From<LimiterError> for ConfigError {
    fn from(err: LimiterError) -> Self {
        ConfigError::Invalid(err.to_string())
    }
}

/// Runtime settings for a collection run
#[derive(Debug, Clone, PartialEq)]
pub struct CollectorConfig {
    /// Timeout applied to each item's collection
    pub io_timeout: Duration,
    /// Maximum concurrent collections
    pub concurrency_limit: usize,
    /// Maximum collection starts per second
    pub rate_limit: f64,
    /// Pipeline flush threshold and chunk size
    pub batch_size: usize,
    /// Data API key
    pub api_key: Option<String>,
    /// Data API base URL
    pub api_base_url: String,
}

impl Default for CollectorConfig {
    fn default() -> Self {
        Self {
            io_timeout: Duration::from_millis(DEFAULT_IO_TIMEOUT_MS),
            concurrency_limit: DEFAULT_CONCURRENCY_LIMIT,
            rate_limit: DEFAULT_RATE_LIMIT,
            batch_size: DEFAULT_BATCH_SIZE,
            api_key: None,
            api_base_url: DEFAULT_API_BASE_URL.to_string(),
        }
    }
}

impl CollectorConfig {
    /// Load from the process environment
    pub fn from_env() -> ConfigResult<Self> {
        Self::from_lookup(|key| std::env::var(key).ok())
    }

    /// Load from an arbitrary key lookup
    ///
    /// # Arguments
    /// * `lookup` - Returns the raw value for a variable name, `None` if unset
    pub fn from_lookup<F>(lookup: F) -> ConfigResult<Self>
    where
        F: Fn(&str) -> Option<String>,
    {
        let mut config = Self::default();

        if let Some(ms) = parse_var::<u64, _>(&lookup, env::IO_TIMEOUT)? {
            config.io_timeout = Duration::from_millis(ms);
        }
        if let Some(limit) = parse_var(&lookup, env::IO_CONCURRENCY_LIMIT)? {
            config.concurrency_limit = limit;
        }
        if let Some(rate) = parse_var(&lookup, env::IO_RATE_LIMIT)? {
            config.rate_limit = rate;
        }
        if let Some(size) = parse_var(&lookup, env::IO_BATCH_SIZE)? {
            config.batch_size = size;
        }
        config.api_key = lookup(env::YT_API_KEY)
            .map(|v| v.trim().to_string())
            .filter(|v| !v.is_empty());
        if let Some(url) = lookup(env::YT_API_BASE_URL).filter(|v| !v.trim().is_empty()) {
            config.api_base_url = url.trim().trim_end_matches('/').to_string();
        }

        config.validate()?;
        Ok(config)
    }

    /// Check value ranges
    pub fn validate(&self) -> ConfigResult<()> {
        if self.io_timeout.is_zero() {
            return Err(ConfigError::Invalid("io_timeout must be positive".to_string()));
        }
        if self.concurrency_limit == 0 {
            return Err(ConfigError::Invalid(
                "concurrency_limit must be at least 1".to_string(),
            ));
        }
        start_interval(self.rate_limit)
            .map_err(|e| ConfigError::Invalid(format!("rate_limit: {e}")))?;
        if self.batch_size == 0 {
            return Err(ConfigError::Invalid("batch_size must be at least 1".to_string()));
        }
        Ok(())
    }

    /// Build the limiter these settings describe
    pub fn limiter(&self) -> ConfigResult<ConcurrencyLimiter> {
        Ok(ConcurrencyLimiter::new(
            self.concurrency_limit,
            Some(self.rate_limit),
        )?)
    }
}

fn parse_var<T, F>(lookup: &F, key: &str) -> ConfigResult<Option<T>>
where
    T: std::str::FromStr,
    T::Err: std::fmt::Display,
    F: Fn(&str) -> Option<String>,
{
    let Some(raw) = lookup(key) else {
        return Ok(None);
    };
    let trimmed = raw.trim();
    if trimmed.is_empty() {
        return Ok(None);
    }
    trimmed
        .parse::<T>()
        .map(Some)
        .map_err(|e| ConfigError::InvalidValue {
            key: key.to_string(),
            value: raw.clone(),
            reason: e.to_string(),
        })
}
