//! Configuration types mapping to the TOML schema.
//!
//! ```toml
//! [database]     # PostgreSQL connection and pool
//! [broker]       # AMQP connection and queue names
//! [scheduler]    # poll cadence, look-ahead, batching
//! [health]       # health check timer and optional HTTP listener
//! [logging]      # level, format, file output
//! ```

use std::fmt;
use std::path::PathBuf;
use std::time::Duration;

use cadence_types::defaults;
use serde::{Deserialize, Serialize};

use crate::{ConfigError, Result};

// ─────────────────────────────────────────────────────────────────────────────
// Top-level Config
// ─────────────────────────────────────────────────────────────────────────────

/// Root configuration structure.
///
/// Every section and field has a default, so an empty file is a valid config.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct CadenceConfig {
    pub database: DatabaseConfig,
    pub broker: BrokerConfig,
    pub scheduler: SchedulerSection,
    pub health: HealthSection,
    pub logging: LoggingConfig,
}

impl CadenceConfig {
    /// Create a config with all defaults.
    pub fn new() -> Self {
        Self::default()
    }

    /// Parse from a TOML string.
    pub fn from_toml(toml_str: &str) -> Result<Self> {
        Ok(toml::from_str(toml_str)?)
    }

    /// Serialize to a TOML string.
    pub fn to_toml(&self) -> Result<String> {
        Ok(toml::to_string_pretty(self)?)
    }

    /// Copy with every password replaced, for display.
    pub fn redacted(&self) -> Self {
        let mut copy = self.clone();
        if !copy.database.password.is_empty() {
            copy.database.password = Secret::new(Secret::MASK);
        }
        if !copy.broker.password.is_empty() {
            copy.broker.password = Secret::new(Secret::MASK);
        }
        if copy.database.url.is_some() {
            copy.database.url = Some(Secret::new(Secret::MASK));
        }
        copy
    }

    /// Reject settings the scheduler cannot run with.
    pub fn validate(&self) -> Result<()> {
        let db = &self.database;
        // A tick holds one connection for its whole batch; health pings need another.
        if db.pool_max_size < 2 {
            return Err(invalid("database.pool_max_size", "must be at least 2"));
        }
        if db.pool_min_size > db.pool_max_size {
            return Err(invalid(
                "database.pool_min_size",
                format!(
                    "{} exceeds pool_max_size {}",
                    db.pool_min_size, db.pool_max_size
                ),
            ));
        }

        let sched = &self.scheduler;
        if sched.poll_interval == 0 {
            return Err(invalid("scheduler.poll_interval", "must be at least 1 second"));
        }
        if sched.look_ahead_seconds < 0 {
            return Err(invalid("scheduler.look_ahead_seconds", "must not be negative"));
        }
        if sched.batch_size < 1 {
            return Err(invalid("scheduler.batch_size", "must be at least 1"));
        }
        if sched.dispatch_concurrency == 0 {
            return Err(invalid("scheduler.dispatch_concurrency", "must be at least 1"));
        }
        if sched.max_connect_attempts == 0 {
            return Err(invalid("scheduler.max_connect_attempts", "must be at least 1"));
        }

        if self.health.interval == 0 {
            return Err(invalid("health.interval", "must be at least 1 second"));
        }

        Ok(())
    }
}

fn invalid(field: &str, reason: impl Into<String>) -> ConfigError {
    ConfigError::Invalid {
        field: field.to_string(),
        reason: reason.into(),
    }
}

// ─────────────────────────────────────────────────────────────────────────────
// Secrets
// ─────────────────────────────────────────────────────────────────────────────

/// A credential that never appears in `Debug` output.
#[derive(Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(transparent)]
pub struct Secret(String);

impl Secret {
    const MASK: &'static str = "***";

    pub fn new(value: impl Into<String>) -> Self {
        Self(value.into())
    }

    /// The raw credential.
    pub fn expose(&self) -> &str {
        &self.0
    }

    pub fn is_empty(&self) -> bool {
        self.0.is_empty()
    }
}

impl fmt::Debug for Secret {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        if self.0.is_empty() {
            f.write_str("\"\"")
        } else {
            write!(f, "\"{}\"", Self::MASK)
        }
    }
}

// ─────────────────────────────────────────────────────────────────────────────
// Database
// ─────────────────────────────────────────────────────────────────────────────

/// PostgreSQL connection settings.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct DatabaseConfig {
    pub host: String,
    pub port: u16,
    pub user: String,
    pub password: Secret,
    pub name: String,
    /// Full connection URL; takes precedence over the discrete fields.
    pub url: Option<Secret>,
    pub pool_min_size: u32,
    pub pool_max_size: u32,
    /// Seconds to wait for a pooled connection.
    pub acquire_timeout: u64,
}

impl Default for DatabaseConfig {
    fn default() -> Self {
        Self {
            host: defaults::DB_HOST.to_string(),
            port: defaults::DB_PORT,
            user: defaults::DB_USER.to_string(),
            password: Secret::default(),
            name: defaults::DB_NAME.to_string(),
            url: None,
            pool_min_size: defaults::DB_POOL_MIN_SIZE,
            pool_max_size: defaults::DB_POOL_MAX_SIZE,
            acquire_timeout: defaults::DB_ACQUIRE_TIMEOUT_SECS,
        }
    }
}

impl DatabaseConfig {
    pub fn acquire_timeout(&self) -> Duration {
        Duration::from_secs(self.acquire_timeout)
    }

    /// Connection target safe to log.
    pub fn display_target(&self) -> String {
        match self.url {
            Some(_) => "postgres://<from url>".to_string(),
            None => format!(
                "postgres://{}@{}:{}/{}",
                self.user, self.host, self.port, self.name
            ),
        }
    }
}

// ─────────────────────────────────────────────────────────────────────────────
// Broker
// ─────────────────────────────────────────────────────────────────────────────

/// AMQP broker settings.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct BrokerConfig {
    pub host: String,
    pub port: u16,
    pub user: String,
    pub password: Secret,
    pub vhost: String,
    /// Durable queue carrying execution triggers.
    pub execution_queue: String,
    /// Non-durable queue carrying access tokens.
    pub token_queue: String,
}

impl Default for BrokerConfig {
    fn default() -> Self {
        Self {
            host: defaults::BROKER_HOST.to_string(),
            port: defaults::BROKER_PORT,
            user: defaults::BROKER_USER.to_string(),
            password: Secret::new(defaults::BROKER_PASSWORD),
            vhost: defaults::BROKER_VHOST.to_string(),
            execution_queue: defaults::EXECUTION_QUEUE.to_string(),
            token_queue: defaults::TOKEN_QUEUE.to_string(),
        }
    }
}

impl BrokerConfig {
    /// Connection target safe to log.
    pub fn display_target(&self) -> String {
        format!(
            "amqp://{}@{}:{}/{}",
            self.user,
            self.host,
            self.port,
            self.vhost.trim_start_matches('/')
        )
    }
}

// ─────────────────────────────────────────────────────────────────────────────
// Scheduler
// ─────────────────────────────────────────────────────────────────────────────

/// Poll loop settings.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct SchedulerSection {
    /// Seconds between poll cycles.
    pub poll_interval: u64,
    /// Seconds added to "now" when selecting due schedules.
    pub look_ahead_seconds: i64,
    /// Maximum schedules claimed per poll cycle.
    pub batch_size: i64,
    /// Maximum dispatches in flight within one cycle.
    pub dispatch_concurrency: usize,
    /// Attempts per dependency before startup gives up.
    pub max_connect_attempts: u32,
}

impl Default for SchedulerSection {
    fn default() -> Self {
        Self {
            poll_interval: defaults::POLL_INTERVAL_SECS,
            look_ahead_seconds: defaults::LOOK_AHEAD_SECONDS,
            batch_size: defaults::BATCH_SIZE,
            dispatch_concurrency: defaults::DISPATCH_CONCURRENCY,
            max_connect_attempts: defaults::MAX_CONNECT_ATTEMPTS,
        }
    }
}

impl SchedulerSection {
    pub fn poll_interval(&self) -> Duration {
        Duration::from_secs(self.poll_interval)
    }
}

// ─────────────────────────────────────────────────────────────────────────────
// Health
// ─────────────────────────────────────────────────────────────────────────────

/// Health reporter settings.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct HealthSection {
    /// Seconds between dependency checks.
    pub interval: u64,
    /// Address for the `/health` HTTP listener; disabled when unset.
    pub bind: Option<String>,
}

impl Default for HealthSection {
    fn default() -> Self {
        Self {
            interval: defaults::HEALTHCHECK_INTERVAL_SECS,
            bind: None,
        }
    }
}

impl HealthSection {
    pub fn interval(&self) -> Duration {
        Duration::from_secs(self.interval)
    }
}

// ─────────────────────────────────────────────────────────────────────────────
// Logging
// ─────────────────────────────────────────────────────────────────────────────

/// Logging settings.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct LoggingConfig {
    /// Level applied to the cadence crates (`trace` .. `error`).
    pub level: String,
    /// Emit console logs as JSON lines.
    pub json: bool,
    /// Directory for a daily-rolling JSON log file.
    pub dir: Option<PathBuf>,
}

impl Default for LoggingConfig {
    fn default() -> Self {
        Self {
            level: defaults::LOG_LEVEL.to_string(),
            json: false,
            dir: None,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_empty_toml_is_default() {
        let config = CadenceConfig::from_toml("").unwrap();
        assert_eq!(config, CadenceConfig::default());
        assert_eq!(config.scheduler.poll_interval, 10);
        assert_eq!(config.broker.execution_queue, "workflow_execution");
        assert!(config.validate().is_ok());
    }

    #[test]
    fn test_partial_section_keeps_other_defaults() {
        let config = CadenceConfig::from_toml(
            r#"
[database]
host = "db.internal"
pool_max_size = 20

[scheduler]
poll_interval = 2
"#,
        )
        .unwrap();

        assert_eq!(config.database.host, "db.internal");
        assert_eq!(config.database.port, 5432);
        assert_eq!(config.database.pool_max_size, 20);
        assert_eq!(config.scheduler.poll_interval(), Duration::from_secs(2));
        assert_eq!(config.scheduler.look_ahead_seconds, 5);
    }

    #[test]
    fn test_secret_hidden_from_debug() {
        let mut config = CadenceConfig::default();
        config.database.password = Secret::new("hunter2");
        let debug = format!("{:?}", config);
        assert!(!debug.contains("hunter2"));
        assert!(debug.contains("***"));
        assert_eq!(config.database.password.expose(), "hunter2");
    }

    #[test]
    fn test_redacted_toml_has_no_passwords() {
        let mut config = CadenceConfig::default();
        config.database.password = Secret::new("hunter2");
        config.database.url = Some(Secret::new("postgres://u:hunter2@h/db"));
        let rendered = config.redacted().to_toml().unwrap();
        assert!(!rendered.contains("hunter2"));
        assert!(rendered.contains("password = \"***\""));
    }

    #[test]
    fn test_validate_rejects_bad_pool() {
        let mut config = CadenceConfig::default();
        config.database.pool_min_size = 5;
        config.database.pool_max_size = 2;
        let err = config.validate().unwrap_err();
        assert!(matches!(err, ConfigError::Invalid { ref field, .. } if field == "database.pool_min_size"));
    }

    #[test]
    fn test_validate_rejects_single_connection_pool() {
        let mut config = CadenceConfig::default();
        config.database.pool_min_size = 1;
        config.database.pool_max_size = 1;
        let err = config.validate().unwrap_err();
        assert!(matches!(err, ConfigError::Invalid { ref field, .. } if field == "database.pool_max_size"));

        config.database.pool_max_size = 2;
        assert!(config.validate().is_ok());
    }

    #[test]
    fn test_validate_rejects_zero_values() {
        let mut config = CadenceConfig::default();
        config.scheduler.poll_interval = 0;
        assert!(config.validate().is_err());

        let mut config = CadenceConfig::default();
        config.scheduler.dispatch_concurrency = 0;
        assert!(config.validate().is_err());

        let mut config = CadenceConfig::default();
        config.scheduler.max_connect_attempts = 0;
        assert!(config.validate().is_err());
    }

    #[test]
    fn test_display_targets_omit_password() {
        let config = CadenceConfig::default();
        assert_eq!(
            config.database.display_target(),
            "postgres://postgres@localhost:5432/postgres"
        );
        assert_eq!(config.broker.display_target(), "amqp://guest@localhost:5672/");
    }
}
