//! Scheduling core for Cadence.
//!
//! - [`ConnectionManager`]: owns the database pool and broker handle, with
//!   retrying startup and a health probe
//! - [`build_trigger_message`]: turns a workflow graph into its first
//!   execution message
//! - [`Scheduler`]: the poll loop that claims, dispatches and advances due
//!   schedules
//! - [`HealthReporter`]: periodic dependency checks and the `/health` route

pub mod connection;
pub mod error;
pub mod health;
pub mod retry;
pub mod scheduler;
pub mod translator;

pub use connection::{ConnectionManager, HealthSnapshot};
pub use error::{ConnectError, DispatchError, TranslateError};
pub use health::{
    HealthProbe, HealthReporter, HealthResponse, HealthState, health_router, serve_health,
};
pub use retry::{backoff_delay, retry_with_backoff};
pub use scheduler::{Scheduler, SchedulerConfig, SchedulerState, TickReport};
pub use translator::build_trigger_message;
