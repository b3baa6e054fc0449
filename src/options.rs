use std::time::Duration;

use crate::{backoff::MAX_BACKOFF, OverseerError, Result};

/// Smallest initial backoff the retry schedules will use, in seconds.
pub const MIN_INITIAL_BACKOFF_SECS: f64 = 0.1;

/// Longest accepted per-attempt timeout and monitor interval: one day.
pub const MAX_INTERVAL_SECS: u64 = 24 * 60 * 60;

/// Configures timeout, retry and monitor cadence.
#[derive(Clone, Debug, PartialEq)]
pub struct ClientOptions {
    /// Per-attempt timeout in seconds.
    pub timeout_secs: u64,
    /// Maximum number of retries after the initial attempt.
    pub max_retries: u32,
    /// Base retry backoff in seconds (exponential strategy).
    pub initial_backoff_secs: f64,
    /// Base interval between availability checks in seconds.
    pub monitor_interval_secs: u64,
}

impl Default for ClientOptions {
    fn default() -> Self {
        Self {
            timeout_secs: 30,
            max_retries: 3,
            initial_backoff_secs: 1.0,
            monitor_interval_secs: 60,
        }
    }
}

impl ClientOptions {
    pub fn timeout(&self) -> Duration {
        Duration::from_secs(self.timeout_secs.min(MAX_INTERVAL_SECS))
    }

    pub fn monitor_interval(&self) -> Duration {
        Duration::from_secs(self.monitor_interval_secs.clamp(1, MAX_INTERVAL_SECS))
    }

    /// Initial backoff with the 100ms floor applied. Anything at or above
    /// [`MAX_BACKOFF`] already yields the cap, so larger values clamp there.
    pub fn initial_backoff(&self) -> Duration {
        let secs = if self.initial_backoff_secs.is_nan() {
            MIN_INITIAL_BACKOFF_SECS
        } else {
            self.initial_backoff_secs
                .clamp(MIN_INITIAL_BACKOFF_SECS, MAX_BACKOFF.as_secs_f64())
        };
        Duration::from_secs_f64(secs)
    }

    /// Checks the ranges the client relies on.
    pub fn validate(&self) -> Result<()> {
        if !(1..=MAX_INTERVAL_SECS).contains(&self.timeout_secs) {
            return Err(OverseerError::Config(format!(
                "timeout must be between 1 and {MAX_INTERVAL_SECS} seconds"
            )));
        }
        if !(1..=MAX_INTERVAL_SECS).contains(&self.monitor_interval_secs) {
            return Err(OverseerError::Config(format!(
                "monitor interval must be between 1 and {MAX_INTERVAL_SECS} seconds"
            )));
        }
        if !self.initial_backoff_secs.is_finite() || self.initial_backoff_secs <= 0.0 {
            return Err(OverseerError::Config(
                "initial backoff must be a positive number of seconds".to_owned(),
            ));
        }
        Ok(())
    }
}

/// Everything needed to build a client and the cleanup service.
#[derive(Clone, PartialEq)]
pub struct OverseerConfig {
    pub base_url: String,
    pub api_key: Option<String>,
    pub options: ClientOptions,
    /// Log deletions instead of performing them.
    pub dry_run: bool,
}

impl std::fmt::Debug for OverseerConfig {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("OverseerConfig")
            .field("base_url", &self.base_url)
            .field("api_key", &self.api_key.as_ref().map(|_| "<redacted>"))
            .field("options", &self.options)
            .field("dry_run", &self.dry_run)
            .finish()
    }
}

impl OverseerConfig {
    /// Reads configuration from environment variables.
    ///
    /// Reads:
    /// - `OVERSEER_URL`: absolute base URL (required)
    /// - `OVERSEER_API_KEY`: sent as `X-Api-Key` when set
    /// - `TIMEOUT_SECONDS`, `MAX_RETRIES`, `INITIAL_BACKOFF_SECONDS`,
    ///   `MONITOR_INTERVAL_SECONDS`: fall back to [`ClientOptions::default`]
    /// - `DRY_RUN`: `true`/`1`/`yes` enables dry run
    pub fn from_env() -> Result<Self> {
        Self::from_lookup(|key| std::env::var(key).ok())
    }

    /// Same as [`OverseerConfig::from_env`] with a custom variable source.
    pub fn from_lookup<F>(lookup: F) -> Result<Self>
    where
        F: Fn(&str) -> Option<String>,
    {
        let get = |key: &str| {
            lookup(key)
                .map(|value| value.trim().to_owned())
                .filter(|value| !value.is_empty())
        };

        let base_url = get("OVERSEER_URL")
            .ok_or_else(|| OverseerError::Config("missing OVERSEER_URL".to_owned()))?;
        let parsed = reqwest::Url::parse(&base_url)
            .map_err(|err| OverseerError::Config(format!("OVERSEER_URL is not a valid URL: {err}")))?;
        if !matches!(parsed.scheme(), "http" | "https") {
            return Err(OverseerError::Config(format!(
                "OVERSEER_URL must be http or https, got '{}'",
                parsed.scheme()
            )));
        }

        let defaults = ClientOptions::default();
        let options = ClientOptions {
            timeout_secs: parse_or(get("TIMEOUT_SECONDS"), "TIMEOUT_SECONDS", defaults.timeout_secs)?,
            max_retries: parse_or(get("MAX_RETRIES"), "MAX_RETRIES", defaults.max_retries)?,
            initial_backoff_secs: parse_or(
                get("INITIAL_BACKOFF_SECONDS"),
                "INITIAL_BACKOFF_SECONDS",
                defaults.initial_backoff_secs,
            )?,
            monitor_interval_secs: parse_or(
                get("MONITOR_INTERVAL_SECONDS"),
                "MONITOR_INTERVAL_SECONDS",
                defaults.monitor_interval_secs,
            )?,
        };
        options.validate()?;

        let dry_run = get("DRY_RUN")
            .map(|value| matches!(value.to_ascii_lowercase().as_str(), "1" | "true" | "yes"))
            .unwrap_or(false);

        Ok(Self {
            base_url,
            api_key: get("OVERSEER_API_KEY"),
            options,
            dry_run,
        })
    }
}

fn parse_or<T: std::str::FromStr>(value: Option<String>, key: &str, default: T) -> Result<T> {
    match value {
        None => Ok(default),
        Some(raw) => raw
            .parse()
            .map_err(|_| OverseerError::Config(format!("{key} has invalid value '{raw}'"))),
    }
}
