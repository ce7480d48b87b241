//! Worker configuration

use std::{env, time::Duration};

/// Sweep schedule and store settings loaded from environment variables
#[derive(Debug, Clone)]
pub struct WorkerConfig {
    pub database_url: String,
    pub database_max_connections: u32,
    pub sweep_interval: Duration,
    pub sweep_backoff: Duration,
    pub sweep_workers: usize,
    /// Lifetime of a password reset row, as the API writes it
    pub password_reset_ttl: time::Duration,
}

#[derive(Debug, thiserror::Error)]
pub enum ConfigError {
    #[error("Missing environment variable: {0}")]
    Missing(&'static str),
    #[error("Invalid value for {0}: {1}")]
    Invalid(&'static str, String),
}

impl WorkerConfig {
    pub fn from_env() -> Result<Self, ConfigError> {
        let sweep_workers: usize = parse_or("SWEEP_WORKERS", 1)?;
        if sweep_workers == 0 {
            return Err(ConfigError::Invalid("SWEEP_WORKERS", "must be at least 1".to_string()));
        }

        Ok(Self {
            database_url: env::var("DATABASE_URL").map_err(|_| ConfigError::Missing("DATABASE_URL"))?,
            database_max_connections: parse_or("DATABASE_MAX_CONNECTIONS", 2)?,
            sweep_interval: Duration::from_secs(parse_or("SWEEP_INTERVAL_SECS", 86_400)?),
            sweep_backoff: Duration::from_secs(parse_or("SWEEP_BACKOFF_SECS", 5)?),
            sweep_workers,
            password_reset_ttl: time::Duration::days(parse_or("PASSWORD_RESET_TTL_DAYS", 1)?),
        })
    }
}

fn parse_or<T: std::str::FromStr>(key: &'static str, default: T) -> Result<T, ConfigError>
where
    T::Err: std::fmt::Display,
{
    match env::var(key) {
        Ok(raw) => raw
            .parse()
            .map_err(|e: T::Err| ConfigError::Invalid(key, e.to_string())),
        Err(_) => Ok(default),
    }
}
