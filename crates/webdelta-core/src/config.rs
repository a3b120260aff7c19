use std::path::PathBuf;
use std::time::Duration;

use crate::error::AppError;

/// Minimum pause between consecutive poller cycles.
///
/// Only the continuous poller waits on this; one-shot cycles never do.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct RateLimit {
    pub seconds: u64,
    pub minutes: u64,
    pub hours: u64,
    pub days: u64,
}

impl RateLimit {
    pub fn new(seconds: u64, minutes: u64, hours: u64, days: u64) -> Self {
        Self {
            seconds,
            minutes,
            hours,
            days,
        }
    }

    pub fn from_secs(seconds: u64) -> Self {
        Self::new(seconds, 0, 0, 0)
    }

    pub fn total_seconds(&self) -> u64 {
        self.seconds + self.minutes * 60 + self.hours * 3600 + self.days * 86_400
    }

    pub fn as_duration(&self) -> Duration {
        Duration::from_secs(self.total_seconds())
    }
}

impl Default for RateLimit {
    /// Once a minute.
    fn default() -> Self {
        Self::from_secs(60)
    }
}

/// The subset of [`EngineConfig`] a single task execution needs.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct RetryPolicy {
    pub retry_limit: u32,
    pub wait_between_retries: bool,
    pub backoff_unit: Duration,
    pub fetch_timeout: Option<Duration>,
}

impl RetryPolicy {
    /// Backoff before a retry, given the retries still remaining.
    ///
    /// Grows by one unit per retry, starting at zero on the first one.
    pub fn retry_delay(&self, remaining: u32) -> Duration {
        self.backoff_unit * self.retry_limit.saturating_sub(remaining)
    }
}

/// Engine configuration.
#[derive(Debug, Clone)]
pub struct EngineConfig {
    /// Pause between poller cycles.
    pub rate_limit: Duration,
    /// Extra fetch attempts when an extractor returns nothing.
    pub retry_limit: u32,
    /// Whether to back off between those attempts.
    pub wait_between_retries: bool,
    /// The n-th retry waits `n - 1` of these.
    pub retry_backoff_unit: Duration,
    /// Upper bound on a single fetch. `None` waits forever.
    pub fetch_timeout: Option<Duration>,
    /// Where the cache is persisted, if anywhere.
    pub cache_file: Option<PathBuf>,
}

impl Default for EngineConfig {
    fn default() -> Self {
        Self {
            rate_limit: RateLimit::default().as_duration(),
            retry_limit: 5,
            wait_between_retries: true,
            retry_backoff_unit: Duration::from_secs(1),
            fetch_timeout: Some(Duration::from_secs(30)),
            cache_file: None,
        }
    }
}

impl EngineConfig {
    pub fn with_rate_limit(mut self, rate_limit: RateLimit) -> Self {
        self.rate_limit = rate_limit.as_duration();
        self
    }

    /// Sub-second pauses, mostly useful in tests.
    pub fn with_rate_limit_duration(mut self, rate_limit: Duration) -> Self {
        self.rate_limit = rate_limit;
        self
    }

    pub fn with_retry_limit(mut self, retry_limit: u32) -> Self {
        self.retry_limit = retry_limit;
        self
    }

    pub fn with_wait_between_retries(mut self, wait: bool) -> Self {
        self.wait_between_retries = wait;
        self
    }

    pub fn with_retry_backoff_unit(mut self, unit: Duration) -> Self {
        self.retry_backoff_unit = unit;
        self
    }

    pub fn with_fetch_timeout(mut self, timeout: Option<Duration>) -> Self {
        self.fetch_timeout = timeout;
        self
    }

    pub fn with_cache_file(mut self, path: impl Into<PathBuf>) -> Self {
        self.cache_file = Some(path.into());
        self
    }

    pub fn retry_policy(&self) -> RetryPolicy {
        RetryPolicy {
            retry_limit: self.retry_limit,
            wait_between_retries: self.wait_between_retries,
            backoff_unit: self.retry_backoff_unit,
            fetch_timeout: self.fetch_timeout,
        }
    }

    /// Read configuration from environment variables.
    ///
    /// - `WEBDELTA_RATE_LIMIT_SECS` (optional, defaults to 60)
    /// - `WEBDELTA_RETRY_LIMIT` (optional, defaults to 5)
    /// - `WEBDELTA_WAIT_BETWEEN_RETRIES` (optional, defaults to true)
    /// - `WEBDELTA_FETCH_TIMEOUT_SECS` (optional, defaults to 30, 0 disables)
    /// - `WEBDELTA_CACHE_FILE` (optional)
    pub fn from_env() -> Result<Self, AppError> {
        Self::from_lookup(|key| std::env::var(key).ok())
    }

    fn from_lookup(lookup: impl Fn(&str) -> Option<String>) -> Result<Self, AppError> {
        let mut config = Self::default();

        if let Some(raw) = lookup("WEBDELTA_RATE_LIMIT_SECS") {
            config.rate_limit = Duration::from_secs(parse_u64("WEBDELTA_RATE_LIMIT_SECS", &raw)?);
        }

        if let Some(raw) = lookup("WEBDELTA_RETRY_LIMIT") {
            config.retry_limit = raw.trim().parse().map_err(|_| {
                AppError::ConfigError(format!(
                    "Invalid WEBDELTA_RETRY_LIMIT '{raw}': must be a non-negative integer"
                ))
            })?;
        }

        if let Some(raw) = lookup("WEBDELTA_WAIT_BETWEEN_RETRIES") {
            config.wait_between_retries = match raw.trim().to_lowercase().as_str() {
                "1" | "true" | "yes" | "on" => true,
                "0" | "false" | "no" | "off" => false,
                _ => {
                    return Err(AppError::ConfigError(format!(
                        "Invalid WEBDELTA_WAIT_BETWEEN_RETRIES '{raw}': expected true or false"
                    )));
                }
            };
        }

        if let Some(raw) = lookup("WEBDELTA_FETCH_TIMEOUT_SECS") {
            config.fetch_timeout = match parse_u64("WEBDELTA_FETCH_TIMEOUT_SECS", &raw)? {
                0 => None,
                secs => Some(Duration::from_secs(secs)),
            };
        }

        if let Some(raw) = lookup("WEBDELTA_CACHE_FILE") {
            let trimmed = raw.trim();
            if !trimmed.is_empty() {
                config.cache_file = Some(PathBuf::from(trimmed));
            }
        }

        Ok(config)
    }
}

fn parse_u64(name: &str, raw: &str) -> Result<u64, AppError> {
    raw.trim().parse().map_err(|_| {
        AppError::ConfigError(format!(
            "Invalid {name} '{raw}': must be a non-negative integer"
        ))
    })
}
