//! Schedule store for the Cadence scheduler.
//!
//! [`ScheduleStore`] selects and claims due schedules; the returned
//! [`DueBatch`] records each schedule's outcome and releases the claims on
//! commit or drop. Two implementations share those semantics:
//!
//! - [`PgScheduleStore`]: PostgreSQL via sqlx, claiming rows with
//!   `FOR UPDATE SKIP LOCKED` inside a per-batch transaction
//! - [`MemoryScheduleStore`]: in-process, for tests and local runs

mod error;
mod memory;
mod postgres;
mod store;

pub use cadence_types::next_run_after;
pub use error::{Result, StoreError};
pub use memory::{MemoryDueBatch, MemoryScheduleStore};
pub use postgres::{PgDueBatch, PgScheduleStore, connect_pool};
pub use store::{DueBatch, ScheduleStore, truncate_error};
