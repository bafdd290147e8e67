use std::env;
use std::str::FromStr;
use std::time::Duration;

use tracing::info;

use crate::error::StopSearchError;

const DEFAULT_FORCE: &str = "metropolitan";
const DEFAULT_DATE_WINDOW: usize = 7;
const DEFAULT_BATCH_SIZE: usize = 10;
const DEFAULT_REQUEST_TIMEOUT_SECS: u64 = 30;
const DEFAULT_REFRESH_DEADLINE_SECS: u64 = 900;
/// Freshness window applied when `STALENESS_DAYS` is unset.
pub const DEFAULT_STALENESS_DAYS: i64 = 7;
/// Largest accepted `STALENESS_DAYS`.
pub const MAX_STALENESS_DAYS: i64 = 3650;

/// Refresh worker configuration loaded from environment variables.
#[derive(Debug, Clone)]
pub struct Config {
    // Postgres
    pub database_url: String,

    // Police API
    pub police_api_url: String,
    pub force: String,

    // Fetch tuning
    pub date_window: usize,
    pub batch_size: usize,
    pub request_timeout: Duration,
    pub refresh_deadline: Duration,

    // Cache
    pub staleness_days: i64,
}

impl Config {
    /// Load configuration from the process environment.
    /// Missing required variables or unparseable values are errors.
    pub fn from_env() -> Result<Self, StopSearchError> {
        Self::from_lookup(|key| env::var(key).ok())
    }

    /// Load configuration through an arbitrary key lookup.
    pub fn from_lookup<F>(lookup: F) -> Result<Self, StopSearchError>
    where
        F: Fn(&str) -> Option<String>,
    {
        let config = Self {
            database_url: required(&lookup, "DATABASE_URL")?,
            police_api_url: required(&lookup, "POLICE_API_URL")?,
            force: lookup("POLICE_FORCE").unwrap_or_else(|| DEFAULT_FORCE.to_string()),
            date_window: parsed(&lookup, "DATE_WINDOW", DEFAULT_DATE_WINDOW)?,
            batch_size: parsed(&lookup, "FETCH_BATCH_SIZE", DEFAULT_BATCH_SIZE)?,
            request_timeout: Duration::from_secs(parsed(
                &lookup,
                "REQUEST_TIMEOUT_SECS",
                DEFAULT_REQUEST_TIMEOUT_SECS,
            )?),
            refresh_deadline: Duration::from_secs(parsed(
                &lookup,
                "REFRESH_DEADLINE_SECS",
                DEFAULT_REFRESH_DEADLINE_SECS,
            )?),
            staleness_days: parsed(&lookup, "STALENESS_DAYS", DEFAULT_STALENESS_DAYS)?,
        };

        if config.batch_size == 0 {
            return Err(StopSearchError::Validation(
                "FETCH_BATCH_SIZE must be greater than zero".to_string(),
            ));
        }
        if !(0..=MAX_STALENESS_DAYS).contains(&config.staleness_days) {
            return Err(StopSearchError::Validation(format!(
                "STALENESS_DAYS must be between 0 and {MAX_STALENESS_DAYS}, got {}",
                config.staleness_days
            )));
        }

        Ok(config)
    }

    /// Log the effective configuration with credentials masked.
    pub fn log_redacted(&self) {
        info!(
            database_url = %redact_url(&self.database_url),
            police_api_url = %self.police_api_url,
            force = %self.force,
            date_window = self.date_window,
            batch_size = self.batch_size,
            request_timeout_secs = self.request_timeout.as_secs(),
            refresh_deadline_secs = self.refresh_deadline.as_secs(),
            staleness_days = self.staleness_days,
            "Loaded configuration"
        );
    }
}

fn required<F>(lookup: &F, key: &str) -> Result<String, StopSearchError>
where
    F: Fn(&str) -> Option<String>,
{
    lookup(key)
        .filter(|v| !v.trim().is_empty())
        .ok_or_else(|| StopSearchError::Config(format!("{key} environment variable is required")))
}

fn parsed<F, T>(lookup: &F, key: &str, default: T) -> Result<T, StopSearchError>
where
    F: Fn(&str) -> Option<String>,
    T: FromStr,
{
    match lookup(key) {
        None => Ok(default),
        Some(raw) => raw
            .trim()
            .parse()
            .map_err(|_| StopSearchError::Config(format!("{key} must be a number, got '{raw}'"))),
    }
}

/// Mask the password component of a connection URL.
fn redact_url(url: &str) -> String {
    let Some((scheme, rest)) = url.split_once("://") else {
        return url.to_string();
    };
    let Some((credentials, host)) = rest.rsplit_once('@') else {
        return url.to_string();
    };
    match credentials.split_once(':') {
        Some((user, _)) => format!("{scheme}://{user}:***@{host}"),
        None => url.to_string(),
    }
}
