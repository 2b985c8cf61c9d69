//! Typed configuration from environment variables.
//!
//! Loads once at startup, fails fast if required vars are missing or
//! malformed. The database URL is wrapped in secrecy::SecretString to
//! prevent log leaks.

pub mod secrets;

use std::net::SocketAddr;
use std::time::Duration;

use crate::error::{Error, Result};
use crate::queue::MAX_VISIBILITY_TIMEOUT;
use secrecy::SecretString;

#[derive(Debug)]
pub struct Config {
    pub database_url: SecretString,
    pub db_max_connections: u32,
    pub bind_addr: SocketAddr,
    pub otel_endpoint: Option<String>,
    pub log_level: String,
    pub queue: QueueConfig,
}

/// Queue protocol policy: how long a claim stays invisible, and how the
/// reaper sweeps for expired claims.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct QueueConfig {
    pub visibility_timeout: Duration,
    pub reaper_interval: Duration,
    /// Queues the reaper sweeps. Empty means every queue.
    pub reaper_queues: Vec<String>,
}

impl Default for QueueConfig {
    fn default() -> Self {
        Self {
            visibility_timeout: Duration::from_secs(30),
            reaper_interval: Duration::from_secs(10),
            reaper_queues: Vec::new(),
        }
    }
}

impl Config {
    /// Load configuration from environment variables.
    ///
    /// In local dev, call `dotenvy::dotenv().ok()` before this.
    pub fn from_env() -> Result<Self> {
        let defaults = QueueConfig::default();
        Ok(Self {
            database_url: SecretString::from(required_var("DATABASE_URL")?),
            db_max_connections: parsed_var("DB_MAX_CONNECTIONS", 10)?,
            bind_addr: parsed_var("BIND_ADDR", SocketAddr::from(([0, 0, 0, 0], 8080)))?,
            otel_endpoint: std::env::var("OTEL_ENDPOINT").ok(),
            log_level: std::env::var("LOG_LEVEL").unwrap_or_else(|_| "info".to_string()),
            queue: QueueConfig {
                visibility_timeout: seconds_var(
                    "VISIBILITY_TIMEOUT_SECS",
                    defaults.visibility_timeout,
                )?,
                reaper_interval: seconds_var("REAPER_INTERVAL_SECS", defaults.reaper_interval)?,
                reaper_queues: std::env::var("REAPER_QUEUES")
                    .map(|v| parse_queue_list(&v))
                    .unwrap_or_default(),
            },
        })
    }
}

fn required_var(name: &str) -> Result<String> {
    std::env::var(name)
        .map_err(|_| Error::Config(format!("required environment variable {name} is not set")))
}

fn parsed_var<T>(name: &str, default: T) -> Result<T>
where
    T: std::str::FromStr,
    T::Err: std::fmt::Display,
{
    match std::env::var(name) {
        Ok(raw) => raw
            .trim()
            .parse()
            .map_err(|e| Error::Config(format!("invalid {name}={raw:?}: {e}"))),
        Err(_) => Ok(default),
    }
}

/// Whole seconds, positive and at most [`MAX_VISIBILITY_TIMEOUT`].
fn seconds_var(name: &str, default: Duration) -> Result<Duration> {
    let secs: u64 = parsed_var(name, default.as_secs())?;
    if secs == 0 {
        return Err(Error::Config(format!("{name} must be greater than zero")));
    }
    let max = MAX_VISIBILITY_TIMEOUT.as_secs();
    if secs > max {
        return Err(Error::Config(format!("{name} must be at most {max}, got {secs}")));
    }
    Ok(Duration::from_secs(secs))
}

/// Split a comma-separated list, dropping blanks.
pub fn parse_queue_list(raw: &str) -> Vec<String> {
    raw.split(',')
        .map(str::trim)
        .filter(|q| !q.is_empty())
        .map(str::to_string)
        .collect()
}
