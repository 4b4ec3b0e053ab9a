//! Runtime configuration: built-in defaults, then environment, then CLI.

use std::path::PathBuf;
use std::time::Duration;

use deepscan_ui::{GAUGE_TICK, TimelineSettings};

use crate::AppError;

/// Environment variable overriding the analysis endpoint.
pub const ENDPOINT_ENV: &str = "DEEPSCAN_ENDPOINT";
/// Environment variable overriding the store file path.
pub const STORE_ENV: &str = "DEEPSCAN_STORE";
/// Environment variable setting the HTTP request timeout in milliseconds.
pub const REQUEST_TIMEOUT_ENV: &str = "DEEPSCAN_REQUEST_TIMEOUT_MS";

/// Analysis endpoint used when nothing else is configured.
pub const DEFAULT_ENDPOINT: &str = "http://127.0.0.1:5000/analyze";
/// Store file used when nothing else is configured.
pub const DEFAULT_STORE_PATH: &str = "deepscan-store.json";
/// Delay between `confirm` and the automatic reset.
pub const CONFIRM_DELAY: Duration = Duration::from_millis(600);

/// Pacing of the cosmetic timers and the confirm delay.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct ScanTimings {
    /// Phase timeline cadence and deadline.
    pub timeline: TimelineSettings,
    /// Gauge step interval.
    pub gauge_tick: Duration,
    /// Delay before a confirmed result returns to idle.
    pub confirm_delay: Duration,
}

impl Default for ScanTimings {
    fn default() -> Self {
        Self {
            timeline: TimelineSettings::default(),
            gauge_tick: GAUGE_TICK,
            confirm_delay: CONFIRM_DELAY,
        }
    }
}

/// Application configuration.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct AppConfig {
    /// Analysis endpoint URL.
    pub endpoint: String,
    /// JSON file backing the key-value store.
    pub store_path: PathBuf,
    /// Upper bound for one HTTP analysis request; `None` waits indefinitely.
    pub request_timeout: Option<Duration>,
    /// Timer pacing.
    pub timings: ScanTimings,
}

impl Default for AppConfig {
    fn default() -> Self {
        Self {
            endpoint: DEFAULT_ENDPOINT.to_string(),
            store_path: PathBuf::from(DEFAULT_STORE_PATH),
            request_timeout: None,
            timings: ScanTimings::default(),
        }
    }
}

impl AppConfig {
    /// Defaults overlaid with the process environment.
    ///
    /// # Errors
    /// Returns [`AppError::Config`] for unparsable values.
    pub fn from_env() -> Result<Self, AppError> {
        Self::from_lookup(|key| std::env::var(key).ok())
    }

    /// Defaults overlaid with values from `lookup`. Empty values are ignored.
    ///
    /// # Errors
    /// Returns [`AppError::Config`] when the timeout is not a whole number of
    /// milliseconds.
    pub fn from_lookup(lookup: impl Fn(&str) -> Option<String>) -> Result<Self, AppError> {
        let read = |key: &str| lookup(key).filter(|value| !value.trim().is_empty());
        let mut config = Self::default();

        if let Some(endpoint) = read(ENDPOINT_ENV) {
            config.endpoint = endpoint.trim().to_string();
        }
        if let Some(path) = read(STORE_ENV) {
            config.store_path = PathBuf::from(path.trim());
        }
        if let Some(raw) = read(REQUEST_TIMEOUT_ENV) {
            config.request_timeout = Some(parse_timeout_ms(&raw)?);
        }

        Ok(config)
    }
}

/// Parses a positive millisecond count.
///
/// # Errors
/// Returns [`AppError::Config`] for non-numeric or zero values.
pub fn parse_timeout_ms(raw: &str) -> Result<Duration, AppError> {
    match raw.trim().parse::<u64>() {
        Ok(0) => Err(AppError::Config(format!(
            "{REQUEST_TIMEOUT_ENV} must be greater than zero"
        ))),
        Ok(millis) => Ok(Duration::from_millis(millis)),
        Err(error) => Err(AppError::Config(format!(
            "{REQUEST_TIMEOUT_ENV} must be milliseconds: {error}"
        ))),
    }
}
