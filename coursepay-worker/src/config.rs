/// Worker configuration
///
/// Read from the environment:
///
/// - `DATABASE_URL` (required)
/// - `DATABASE_MAX_CONNECTIONS` (default 5)
/// - `SWEEP_INTERVAL_SECS` (default 60)
/// - `SWEEP_BATCH_SIZE` (default 50)

use std::env;
use std::str::FromStr;
use std::time::Duration;
use thiserror::Error;

/// Configuration errors
#[derive(Debug, Error, PartialEq, Eq)]
pub enum ConfigError {
    /// Required variable is unset or blank
    #[error("Missing required environment variable: {0}")]
    Missing(&'static str),

    /// Variable is set but does not parse
    #[error("Invalid value for {name}: {value}")]
    Invalid {
        /// Variable name
        name: &'static str,
        /// Raw value
        value: String,
    },
}

/// Sweeper configuration
#[derive(Debug, Clone)]
pub struct WorkerConfig {
    /// PostgreSQL connection URL
    pub database_url: String,

    /// Pool size
    pub max_connections: u32,

    /// Delay between sweeps
    pub sweep_interval: Duration,

    /// Orders repaired per sweep at most
    pub batch_size: usize,
}

impl WorkerConfig {
    /// Loads configuration from the process environment
    pub fn from_env() -> Result<Self, ConfigError> {
        dotenvy::dotenv().ok();

        Self::from_lookup(|key| env::var(key).ok())
    }

    /// Loads configuration from an arbitrary key lookup
    pub fn from_lookup<F>(lookup: F) -> Result<Self, ConfigError>
    where
        F: Fn(&str) -> Option<String>,
    {
        let database_url = lookup("DATABASE_URL")
            .filter(|v| !v.trim().is_empty())
            .ok_or(ConfigError::Missing("DATABASE_URL"))?;

        let interval_secs: u64 = parsed(&lookup, "SWEEP_INTERVAL_SECS", 60)?;
        let batch_size: usize = parsed(&lookup, "SWEEP_BATCH_SIZE", 50)?;
        if interval_secs == 0 {
            return Err(ConfigError::Invalid {
                name: "SWEEP_INTERVAL_SECS",
                value: "0".to_string(),
            });
        }
        if batch_size == 0 {
            return Err(ConfigError::Invalid {
                name: "SWEEP_BATCH_SIZE",
                value: "0".to_string(),
            });
        }

        Ok(Self {
            database_url,
            max_connections: parsed(&lookup, "DATABASE_MAX_CONNECTIONS", 5)?,
            sweep_interval: Duration::from_secs(interval_secs),
            batch_size,
        })
    }
}

fn parsed<F, T>(lookup: &F, name: &'static str, default: T) -> Result<T, ConfigError>
where
    F: Fn(&str) -> Option<String>,
    T: FromStr,
{
    match lookup(name) {
        Some(value) if !value.trim().is_empty() => value
            .trim()
            .parse()
            .map_err(|_| ConfigError::Invalid { name, value }),
        _ => Ok(default),
    }
}
