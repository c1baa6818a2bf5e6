use std::str::FromStr;
use std::time::Duration;

use serde::{Deserialize, Serialize};
use thiserror::Error;

use crate::queue::{QueueOptions, RetryPolicy};

#[derive(Debug, Error, PartialEq, Eq)]
pub enum ConfigError {
    #[error("{key} must be a valid {expected}, got {value:?}")]
    Invalid {
        key: &'static str,
        expected: &'static str,
        value: String,
    },

    #[error("{0}")]
    OutOfRange(String),
}

/// Dispatcher configuration.
///
/// Loaded from `HERALD_*` environment variables (after reading `.env`), or
/// deserialized from any serde source; missing fields take their defaults.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct Config {
    /// `memory://` or `file://<path to journal>`
    pub queue_backend_url: String,

    /// Total delivery attempts per task (1 = at most once).
    pub max_retries: u32,

    pub worker_count: usize,

    /// Hard deadline for one `send` call.
    pub send_timeout_ms: u64,

    /// Delay after the first failure; doubles (by `backoff_multiplier`) per attempt.
    pub backoff_base_ms: u64,

    pub backoff_multiplier: f64,

    pub backoff_max_ms: u64,

    /// How long an unacknowledged InFlight task stays hidden. Must exceed
    /// `send_timeout_ms`, otherwise healthy sends get reaped.
    pub visibility_timeout_ms: u64,

    /// How often expired leases are swept.
    pub reap_interval_ms: u64,

    /// How long finished tasks and their results stay queryable.
    pub retention_ms: u64,

    /// How often finished tasks past retention are purged.
    pub gc_interval_ms: u64,

    /// Sender address for email.
    pub email_from: String,

    /// Sender number for SMS.
    pub sms_from: String,
}

impl Default for Config {
    fn default() -> Self {
        Self {
            queue_backend_url: "memory://".to_string(),
            max_retries: 3,
            worker_count: 4,
            send_timeout_ms: 10_000,
            backoff_base_ms: 1_000,
            backoff_multiplier: 2.0,
            backoff_max_ms: 60_000,
            visibility_timeout_ms: 30_000,
            reap_interval_ms: 1_000,
            retention_ms: 86_400_000,
            gc_interval_ms: 60_000,
            email_from: "noreply@localhost".to_string(),
            sms_from: "+10000000000".to_string(),
        }
    }
}

impl Config {
    /// Load from the process environment, reading `.env` first if present.
    pub fn from_env() -> Result<Self, ConfigError> {
        dotenvy::dotenv().ok();
        Self::from_lookup(|key| std::env::var(key).ok())
    }

    /// Load from an arbitrary `HERALD_*` key lookup.
    pub fn from_lookup<F>(lookup: F) -> Result<Self, ConfigError>
    where
        F: Fn(&str) -> Option<String>,
    {
        let defaults = Self::default();
        let config = Self {
            queue_backend_url: lookup("HERALD_QUEUE_BACKEND_URL")
                .unwrap_or(defaults.queue_backend_url),
            max_retries: parse_or(&lookup, "HERALD_MAX_RETRIES", "u32", defaults.max_retries)?,
            worker_count: parse_or(&lookup, "HERALD_WORKER_COUNT", "usize", defaults.worker_count)?,
            send_timeout_ms: parse_or(
                &lookup,
                "HERALD_SEND_TIMEOUT_MS",
                "u64",
                defaults.send_timeout_ms,
            )?,
            backoff_base_ms: parse_or(
                &lookup,
                "HERALD_BACKOFF_BASE_MS",
                "u64",
                defaults.backoff_base_ms,
            )?,
            backoff_multiplier: parse_or(
                &lookup,
                "HERALD_BACKOFF_MULTIPLIER",
                "f64",
                defaults.backoff_multiplier,
            )?,
            backoff_max_ms: parse_or(
                &lookup,
                "HERALD_BACKOFF_MAX_MS",
                "u64",
                defaults.backoff_max_ms,
            )?,
            visibility_timeout_ms: parse_or(
                &lookup,
                "HERALD_VISIBILITY_TIMEOUT_MS",
                "u64",
                defaults.visibility_timeout_ms,
            )?,
            reap_interval_ms: parse_or(
                &lookup,
                "HERALD_REAP_INTERVAL_MS",
                "u64",
                defaults.reap_interval_ms,
            )?,
            retention_ms: parse_or(&lookup, "HERALD_RETENTION_MS", "u64", defaults.retention_ms)?,
            gc_interval_ms: parse_or(
                &lookup,
                "HERALD_GC_INTERVAL_MS",
                "u64",
                defaults.gc_interval_ms,
            )?,
            email_from: lookup("HERALD_EMAIL_FROM").unwrap_or(defaults.email_from),
            sms_from: lookup("HERALD_SMS_FROM").unwrap_or(defaults.sms_from),
        };
        config.validate()?;
        Ok(config)
    }

    pub fn validate(&self) -> Result<(), ConfigError> {
        if self.max_retries == 0 {
            return Err(ConfigError::OutOfRange(
                "max_retries must be at least 1".to_string(),
            ));
        }
        if self.worker_count == 0 {
            return Err(ConfigError::OutOfRange(
                "worker_count must be at least 1".to_string(),
            ));
        }
        if self.send_timeout_ms == 0 || self.reap_interval_ms == 0 {
            return Err(ConfigError::OutOfRange(
                "send_timeout_ms and reap_interval_ms must be positive".to_string(),
            ));
        }
        if self.retention_ms == 0 || self.gc_interval_ms == 0 {
            return Err(ConfigError::OutOfRange(
                "retention_ms and gc_interval_ms must be positive".to_string(),
            ));
        }
        if !(self.backoff_multiplier.is_finite() && self.backoff_multiplier >= 1.0) {
            return Err(ConfigError::OutOfRange(format!(
                "backoff_multiplier must be >= 1.0, got {}",
                self.backoff_multiplier
            )));
        }
        if self.backoff_max_ms < self.backoff_base_ms {
            return Err(ConfigError::OutOfRange(format!(
                "backoff_max_ms ({}) must not be below backoff_base_ms ({})",
                self.backoff_max_ms, self.backoff_base_ms
            )));
        }
        if self.visibility_timeout_ms <= self.send_timeout_ms {
            return Err(ConfigError::OutOfRange(format!(
                "visibility_timeout_ms ({}) must exceed send_timeout_ms ({})",
                self.visibility_timeout_ms, self.send_timeout_ms
            )));
        }
        Ok(())
    }

    pub fn send_timeout(&self) -> Duration {
        Duration::from_millis(self.send_timeout_ms)
    }

    pub fn reap_interval(&self) -> Duration {
        Duration::from_millis(self.reap_interval_ms)
    }

    pub fn retention(&self) -> Duration {
        Duration::from_millis(self.retention_ms)
    }

    pub fn gc_interval(&self) -> Duration {
        Duration::from_millis(self.gc_interval_ms)
    }

    pub fn retry_policy(&self) -> RetryPolicy {
        RetryPolicy {
            max_attempts: self.max_retries,
            base_delay: Duration::from_millis(self.backoff_base_ms),
            multiplier: self.backoff_multiplier,
            max_delay: Duration::from_millis(self.backoff_max_ms),
        }
    }

    pub fn queue_options(&self) -> QueueOptions {
        QueueOptions {
            visibility_timeout: Duration::from_millis(self.visibility_timeout_ms),
            max_attempts: self.max_retries,
        }
    }
}

fn parse_or<F, T>(
    lookup: &F,
    key: &'static str,
    expected: &'static str,
    default: T,
) -> Result<T, ConfigError>
where
    F: Fn(&str) -> Option<String>,
    T: FromStr,
{
    match lookup(key) {
        None => Ok(default),
        Some(value) => value.trim().parse().map_err(|_| ConfigError::Invalid {
            key,
            expected,
            value,
        }),
    }
}
