//! Default values shared by configuration and runtime components.

use std::time::Duration;

pub const POLL_INTERVAL_SECS: u64 = 10;
pub const LOOK_AHEAD_SECONDS: i64 = 5;
pub const HEALTHCHECK_INTERVAL_SECS: u64 = 30;
pub const BATCH_SIZE: i64 = 100;
pub const DISPATCH_CONCURRENCY: usize = 8;
pub const MAX_CONNECT_ATTEMPTS: u32 = 5;
/// Upper bound on the delay between connection attempts.
pub const MAX_BACKOFF_SECS: u64 = 30;

pub const DB_HOST: &str = "localhost";
pub const DB_PORT: u16 = 5432;
pub const DB_USER: &str = "postgres";
pub const DB_NAME: &str = "postgres";
pub const DB_POOL_MIN_SIZE: u32 = 1;
pub const DB_POOL_MAX_SIZE: u32 = 10;
pub const DB_ACQUIRE_TIMEOUT_SECS: u64 = 10;

pub const BROKER_HOST: &str = "localhost";
pub const BROKER_PORT: u16 = 5672;
pub const BROKER_USER: &str = "guest";
pub const BROKER_PASSWORD: &str = "guest";
pub const BROKER_VHOST: &str = "/";
pub const EXECUTION_QUEUE: &str = "workflow_execution";
pub const TOKEN_QUEUE: &str = "websocket_tokens";

pub const LOG_LEVEL: &str = "info";

/// Longest `last_error` message written back to a schedule.
pub const MAX_ERROR_LEN: usize = 2000;

pub fn poll_interval() -> Duration {
    Duration::from_secs(POLL_INTERVAL_SECS)
}

pub fn healthcheck_interval() -> Duration {
    Duration::from_secs(HEALTHCHECK_INTERVAL_SECS)
}
