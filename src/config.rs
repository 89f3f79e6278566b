//! Configuration module
//!
//! Loads configuration from environment variables.

use std::env;
use std::str::FromStr;
use std::time::Duration;

use rust_decimal::Decimal;

use crate::jobs::OutboxSweepConfig;
use crate::orchestrator::RetryPolicy;

/// Application configuration
#[derive(Debug, Clone)]
pub struct Config {
    /// Database connection URL; the in-memory store is used when unset
    pub database_url: Option<String>,

    /// Maximum database connections in pool
    pub database_max_connections: u32,

    /// Server host
    pub host: String,

    /// Ledger service port
    pub port: u16,

    /// Environment (development, production)
    pub environment: String,

    /// How long a unit of work waits for one row lock
    pub lock_timeout: Duration,

    /// Overdraft granted to accounts opened without an explicit limit
    pub default_overdraft_limit: Decimal,

    pub outbox_sweep_interval: Duration,
    pub outbox_send_timeout: Duration,
    pub outbox_batch_size: i64,
    pub outbox_stale_pending_after: Duration,

    /// REST proxy in front of the message bus; events are only logged when
    /// unset
    pub broker_url: Option<String>,

    /// Where the transaction service reaches the ledger
    pub ledger_service_url: String,

    /// Transaction service port
    pub transaction_service_port: u16,

    pub orchestrator_max_attempts: u32,
    pub orchestrator_retry_delay: Duration,
}

impl Config {
    /// Load configuration from environment variables
    pub fn from_env() -> Result<Self, ConfigError> {
        Ok(Self {
            database_url: optional("DATABASE_URL"),
            database_max_connections: parse_or("DATABASE_MAX_CONNECTIONS", 10)?,
            host: env::var("HOST").unwrap_or_else(|_| "127.0.0.1".to_string()),
            port: parse_or("PORT", 3000)?,
            environment: env::var("ENVIRONMENT").unwrap_or_else(|_| "development".to_string()),
            lock_timeout: Duration::from_millis(parse_or("LOCK_TIMEOUT_MS", 5000)?),
            default_overdraft_limit: parse_or("DEFAULT_OVERDRAFT_LIMIT", Decimal::ZERO)?,
            outbox_sweep_interval: Duration::from_secs(parse_or("OUTBOX_SWEEP_INTERVAL_SECS", 30)?),
            outbox_send_timeout: Duration::from_millis(parse_or("OUTBOX_SEND_TIMEOUT_MS", 5000)?),
            outbox_batch_size: parse_or("OUTBOX_BATCH_SIZE", 100)?,
            outbox_stale_pending_after: Duration::from_secs(parse_or(
                "OUTBOX_STALE_PENDING_SECS",
                60,
            )?),
            broker_url: optional("BROKER_URL"),
            ledger_service_url: env::var("LEDGER_SERVICE_URL")
                .unwrap_or_else(|_| "http://127.0.0.1:3000".to_string()),
            transaction_service_port: parse_or("TRANSACTION_SERVICE_PORT", 3001)?,
            orchestrator_max_attempts: parse_or("ORCHESTRATOR_MAX_ATTEMPTS", 3)?,
            orchestrator_retry_delay: Duration::from_millis(parse_or(
                "ORCHESTRATOR_RETRY_DELAY_MS",
                1000,
            )?),
        }
        .validated()?)
    }

    fn validated(self) -> Result<Self, ConfigError> {
        if self.lock_timeout.is_zero() {
            return Err(ConfigError::InvalidValue("LOCK_TIMEOUT_MS"));
        }
        if self.default_overdraft_limit < Decimal::ZERO {
            return Err(ConfigError::InvalidValue("DEFAULT_OVERDRAFT_LIMIT"));
        }
        if self.outbox_sweep_interval.is_zero() {
            return Err(ConfigError::InvalidValue("OUTBOX_SWEEP_INTERVAL_SECS"));
        }
        if self.outbox_batch_size <= 0 {
            return Err(ConfigError::InvalidValue("OUTBOX_BATCH_SIZE"));
        }
        if self.orchestrator_max_attempts == 0 {
            return Err(ConfigError::InvalidValue("ORCHESTRATOR_MAX_ATTEMPTS"));
        }
        Ok(self)
    }

    /// Check if running in production
    pub fn is_production(&self) -> bool {
        self.environment == "production"
    }

    pub fn sweep_config(&self) -> OutboxSweepConfig {
        OutboxSweepConfig {
            interval: self.outbox_sweep_interval,
            batch_size: self.outbox_batch_size,
            stale_pending_after: self.outbox_stale_pending_after,
            ..OutboxSweepConfig::default()
        }
    }

    pub fn retry_policy(&self) -> RetryPolicy {
        RetryPolicy {
            max_attempts: self.orchestrator_max_attempts,
            delay: self.orchestrator_retry_delay,
        }
    }
}

fn optional(key: &'static str) -> Option<String> {
    env::var(key).ok().filter(|value| !value.trim().is_empty())
}

fn parse_or<T: FromStr>(key: &'static str, default: T) -> Result<T, ConfigError> {
    match env::var(key) {
        Ok(raw) => raw.trim().parse().map_err(|_| ConfigError::InvalidValue(key)),
        Err(_) => Ok(default),
    }
}

/// Configuration error types
#[derive(Debug, thiserror::Error)]
pub enum ConfigError {
    #[error("Invalid value for environment variable: {0}")]
    InvalidValue(&'static str),
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_parse_or_default() {
        let value: u32 = parse_or("LEDGER_CORE_TEST_UNSET_VARIABLE", 7).unwrap();
        assert_eq!(value, 7);
    }

    #[test]
    fn test_parse_or_invalid() {
        env::set_var("LEDGER_CORE_TEST_INVALID_PORT", "not-a-port");
        let result: Result<u16, _> = parse_or("LEDGER_CORE_TEST_INVALID_PORT", 3000);
        assert!(matches!(
            result,
            Err(ConfigError::InvalidValue("LEDGER_CORE_TEST_INVALID_PORT"))
        ));
        env::remove_var("LEDGER_CORE_TEST_INVALID_PORT");
    }
}
