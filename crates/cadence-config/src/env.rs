//! Environment variable overrides.
//!
//! Deployments configure the scheduler almost entirely through the
//! environment, so every operational knob has a variable. Values are applied
//! on top of the file layers.

use std::path::PathBuf;
use std::str::FromStr;

use crate::{CadenceConfig, ConfigError, Result, Secret};

/// Apply overrides from the process environment.
pub fn apply_process_env(config: &mut CadenceConfig) -> Result<()> {
    apply_env(config, |key| std::env::var(key).ok())
}

/// Apply overrides using `lookup` to read variables.
///
/// Empty values are treated as unset.
pub fn apply_env<F>(config: &mut CadenceConfig, lookup: F) -> Result<()>
where
    F: Fn(&str) -> Option<String>,
{
    let get = |key: &str| lookup(key).filter(|v| !v.trim().is_empty());

    // Database
    if let Some(v) = get("DB_HOST") {
        config.database.host = v;
    }
    if let Some(v) = get("DB_PORT") {
        config.database.port = parse("DB_PORT", &v)?;
    }
    if let Some(v) = get("DB_USER") {
        config.database.user = v;
    }
    if let Some(v) = get("DB_PASSWORD") {
        config.database.password = Secret::new(v);
    }
    if let Some(v) = get("DB_NAME") {
        config.database.name = v;
    }
    if let Some(v) = get("DATABASE_URL") {
        config.database.url = Some(Secret::new(v));
    }
    if let Some(v) = get("DB_POOL_MIN_SIZE") {
        config.database.pool_min_size = parse("DB_POOL_MIN_SIZE", &v)?;
    }
    if let Some(v) = get("DB_POOL_MAX_SIZE") {
        config.database.pool_max_size = parse("DB_POOL_MAX_SIZE", &v)?;
    }

    // Broker
    if let Some(v) = get("RABBITMQ_HOST") {
        config.broker.host = v;
    }
    if let Some(v) = get("RABBITMQ_PORT") {
        config.broker.port = parse("RABBITMQ_PORT", &v)?;
    }
    if let Some(v) = get("RABBITMQ_USER") {
        config.broker.user = v;
    }
    if let Some(v) = get("RABBITMQ_PASSWORD") {
        config.broker.password = Secret::new(v);
    }
    if let Some(v) = get("RABBITMQ_VHOST") {
        config.broker.vhost = v;
    }
    if let Some(v) = get("EXECUTION_QUEUE") {
        config.broker.execution_queue = v;
    }
    if let Some(v) = get("TOKEN_QUEUE") {
        config.broker.token_queue = v;
    }

    // Scheduler
    if let Some(v) = get("POLL_INTERVAL") {
        config.scheduler.poll_interval = parse("POLL_INTERVAL", &v)?;
    }
    if let Some(v) = get("LOOK_AHEAD_SECONDS") {
        config.scheduler.look_ahead_seconds = parse("LOOK_AHEAD_SECONDS", &v)?;
    }
    if let Some(v) = get("BATCH_SIZE") {
        config.scheduler.batch_size = parse("BATCH_SIZE", &v)?;
    }
    if let Some(v) = get("DISPATCH_CONCURRENCY") {
        config.scheduler.dispatch_concurrency = parse("DISPATCH_CONCURRENCY", &v)?;
    }
    if let Some(v) = get("MAX_CONNECT_ATTEMPTS") {
        config.scheduler.max_connect_attempts = parse("MAX_CONNECT_ATTEMPTS", &v)?;
    }

    // Health
    if let Some(v) = get("HEALTHCHECK_INTERVAL") {
        config.health.interval = parse("HEALTHCHECK_INTERVAL", &v)?;
    }
    if let Some(v) = get("HEALTH_BIND") {
        config.health.bind = Some(v);
    }

    // Logging
    if let Some(v) = get("LOG_LEVEL") {
        config.logging.level = v.to_lowercase();
    }
    if let Some(v) = get("LOG_JSON") {
        config.logging.json = parse_bool("LOG_JSON", &v)?;
    }
    if let Some(v) = get("LOG_DIR") {
        config.logging.dir = Some(PathBuf::from(v));
    }

    Ok(())
}

fn parse<T>(var: &str, value: &str) -> Result<T>
where
    T: FromStr,
    T::Err: std::fmt::Display,
{
    value.trim().parse().map_err(|e: T::Err| ConfigError::InvalidEnv {
        var: var.to_string(),
        value: value.to_string(),
        reason: e.to_string(),
    })
}

fn parse_bool(var: &str, value: &str) -> Result<bool> {
    match value.trim().to_ascii_lowercase().as_str() {
        "1" | "true" | "yes" | "on" => Ok(true),
        "0" | "false" | "no" | "off" => Ok(false),
        _ => Err(ConfigError::InvalidEnv {
            var: var.to_string(),
            value: value.to_string(),
            reason: "expected a boolean".to_string(),
        }),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::collections::HashMap;

    fn apply(pairs: &[(&str, &str)]) -> Result<CadenceConfig> {
        let vars: HashMap<String, String> = pairs
            .iter()
            .map(|(k, v)| (k.to_string(), v.to_string()))
            .collect();
        let mut config = CadenceConfig::default();
        apply_env(&mut config, |key| vars.get(key).cloned())?;
        Ok(config)
    }

    #[test]
    fn test_no_env_keeps_defaults() {
        assert_eq!(apply(&[]).unwrap(), CadenceConfig::default());
    }

    #[test]
    fn test_scheduler_overrides() {
        let config = apply(&[
            ("POLL_INTERVAL", "3"),
            ("LOOK_AHEAD_SECONDS", "1"),
            ("HEALTHCHECK_INTERVAL", "15"),
            ("DB_POOL_MIN_SIZE", "2"),
            ("DB_POOL_MAX_SIZE", "4"),
        ])
        .unwrap();

        assert_eq!(config.scheduler.poll_interval, 3);
        assert_eq!(config.scheduler.look_ahead_seconds, 1);
        assert_eq!(config.health.interval, 15);
        assert_eq!(config.database.pool_min_size, 2);
        assert_eq!(config.database.pool_max_size, 4);
    }

    #[test]
    fn test_connection_overrides() {
        let config = apply(&[
            ("DB_HOST", "pg"),
            ("DB_PASSWORD", "s3cret"),
            ("RABBITMQ_HOST", "mq"),
            ("RABBITMQ_PORT", "5673"),
            ("LOG_LEVEL", "DEBUG"),
            ("LOG_JSON", "true"),
        ])
        .unwrap();

        assert_eq!(config.database.host, "pg");
        assert_eq!(config.database.password.expose(), "s3cret");
        assert_eq!(config.broker.host, "mq");
        assert_eq!(config.broker.port, 5673);
        assert_eq!(config.logging.level, "debug");
        assert!(config.logging.json);
    }

    #[test]
    fn test_empty_value_is_ignored() {
        let config = apply(&[("DB_HOST", ""), ("POLL_INTERVAL", "  ")]).unwrap();
        assert_eq!(config.database.host, "localhost");
        assert_eq!(config.scheduler.poll_interval, 10);
    }

    #[test]
    fn test_malformed_number_is_an_error() {
        let err = apply(&[("POLL_INTERVAL", "soon")]).unwrap_err();
        match err {
            ConfigError::InvalidEnv { var, value, .. } => {
                assert_eq!(var, "POLL_INTERVAL");
                assert_eq!(value, "soon");
            }
            other => panic!("unexpected error: {other}"),
        }
    }

    #[test]
    fn test_malformed_bool_is_an_error() {
        assert!(apply(&[("LOG_JSON", "maybe")]).is_err());
    }
}
