//! Runtime configuration, read from the environment.

use std::time::Duration;

use thiserror::Error;

use crate::db::RetryPolicy;

const DEFAULT_DATABASE_URL: &str = "sqlite://aix_admin.db";
const IN_MEMORY_DATABASE_URL: &str = "sqlite::memory:";

#[derive(Debug, Error, PartialEq, Eq)]
pub enum ConfigError {
    #[error("{name} must be a whole number, got {value:?}")]
    NotANumber { name: &'static str, value: String },
    #[error("{name} must be greater than zero")]
    Zero { name: &'static str },
    #[error("{name} must not be empty")]
    Empty { name: &'static str },
}

/// Connection and retry settings for the membership store.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Config {
    /// SQLx connection URL (env: DATABASE_URL)
    pub database_url: String,
    /// Upper bound on pooled connections (env: DB_MAX_CONNECTIONS)
    pub max_connections: u32,
    /// How long SQLite waits on a locked database before reporting busy (env: DB_BUSY_TIMEOUT_MS)
    pub busy_timeout: Duration,
    /// Retry policy for transient storage failures
    /// (env: DB_RETRY_ATTEMPTS, DB_RETRY_BACKOFF_MS, DB_RETRY_MAX_BACKOFF_MS)
    pub retry: RetryPolicy,
}

impl Default for Config {
    fn default() -> Self {
        Self {
            database_url: DEFAULT_DATABASE_URL.to_owned(),
            max_connections: 5,
            busy_timeout: Duration::from_millis(5000),
            retry: RetryPolicy::default(),
        }
    }
}

impl Config {
    /// Load configuration from environment variables, falling back to defaults.
    ///
    /// Call `dotenv::dotenv()` first if a `.env` file should be honored.
    pub fn from_env() -> Result<Self, ConfigError> {
        Self::from_lookup(|name| std::env::var(name).ok())
    }

    /// A private, in-memory SQLite database. Nothing survives the pool.
    pub fn in_memory() -> Self {
        Self {
            database_url: IN_MEMORY_DATABASE_URL.to_owned(),
            max_connections: 1,
            ..Self::default()
        }
    }

    pub fn is_in_memory(&self) -> bool {
        self.database_url.contains(":memory:") || self.database_url.contains("mode=memory")
    }

    pub(crate) fn from_lookup<F>(lookup: F) -> Result<Self, ConfigError>
    where
        F: Fn(&str) -> Option<String>,
    {
        let defaults = Self::default();

        let database_url = match lookup("DATABASE_URL") {
            Some(url) if url.trim().is_empty() => {
                return Err(ConfigError::Empty {
                    name: "DATABASE_URL",
                })
            }
            Some(url) => url,
            None => defaults.database_url,
        };

        let number = |name: &'static str, default: u64| -> Result<u64, ConfigError> {
            match lookup(name) {
                Some(value) => value
                    .trim()
                    .parse()
                    .map_err(|_err| ConfigError::NotANumber { name, value }),
                None => Ok(default),
            }
        };
        let positive = |name: &'static str, default: u64| -> Result<u64, ConfigError> {
            match number(name, default)? {
                0 => Err(ConfigError::Zero { name }),
                value => Ok(value),
            }
        };

        let max_connections = positive("DB_MAX_CONNECTIONS", defaults.max_connections.into())?;
        let busy_timeout = number("DB_BUSY_TIMEOUT_MS", 5000)?;
        let max_attempts = positive("DB_RETRY_ATTEMPTS", defaults.retry.max_attempts.into())?;
        let base_delay = number("DB_RETRY_BACKOFF_MS", 100)?;
        let max_delay = number("DB_RETRY_MAX_BACKOFF_MS", 2000)?;

        Ok(Self {
            database_url,
            max_connections: u32::try_from(max_connections).unwrap_or(u32::MAX),
            busy_timeout: Duration::from_millis(busy_timeout),
            retry: RetryPolicy {
                max_attempts: u32::try_from(max_attempts).unwrap_or(u32::MAX),
                base_delay: Duration::from_millis(base_delay),
                max_delay: Duration::from_millis(max_delay.max(base_delay)),
            },
        })
    }
}
