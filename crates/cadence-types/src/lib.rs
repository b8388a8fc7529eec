//! Shared types for the Cadence workflow scheduler.
//!
//! - [`Schedule`]: persisted recurrence rule and its run bookkeeping
//! - [`Workflow`] / [`WorkflowGraph`]: the typed node/edge graph a schedule triggers
//! - [`ExecutionMessage`] / [`AccessTokenMessage`]: broker payloads

pub mod defaults;
pub mod error;
pub mod message;
pub mod schedule;
pub mod workflow;

pub use error::{Error, Result};
pub use message::{AccessTokenMessage, ExecutionMessage};
pub use schedule::{MAX_INTERVAL_SECONDS, MIN_INTERVAL_SECONDS, Schedule, next_run_after};
pub use workflow::{Edge, Node, Workflow, WorkflowGraph};
