//! Store traits.

use async_trait::async_trait;
use cadence_types::defaults::MAX_ERROR_LEN;
use std::collections::HashMap;

use cadence_types::{Schedule, Workflow};
use chrono::{DateTime, Utc};
use uuid::Uuid;

use crate::Result;

/// Read/claim/advance access to the `schedules` and `workflows` tables.
#[async_trait]
pub trait ScheduleStore: Send + Sync + 'static {
    /// The claim handle returned by [`fetch_due`](Self::fetch_due).
    type Batch: DueBatch;

    /// Claim every active schedule with `next_run_at <= now + lookahead_seconds`
    /// and `start_at <= now`, earliest first, at most `limit` rows.
    ///
    /// Rows already claimed by another batch (in this process or another
    /// replica) are skipped, never waited on.
    async fn fetch_due(
        &self,
        now: DateTime<Utc>,
        lookahead_seconds: i64,
        limit: i64,
    ) -> Result<Self::Batch>;

    /// Load the workflow a schedule points at.
    async fn load_workflow(&self, workflow_id: Uuid) -> Result<Option<Workflow>>;

    /// Trivial round trip for health checks.
    async fn ping(&self) -> Result<()>;
}

/// A set of claimed schedules and their pending advancements.
///
/// Advancements become visible on [`commit`](Self::commit). Dropping the batch
/// without committing discards them and releases every claim, so the same
/// ticks are offered again on the next poll.
#[async_trait]
pub trait DueBatch: Send {
    /// The claimed schedules in `next_run_at` order.
    fn schedules(&self) -> &[Schedule];

    /// Record a run that reached the broker.
    ///
    /// Sets `last_run_at = fired_at`, moves `next_run_at` forward by whole
    /// intervals past `fired_at`, bumps `run_count` and clears `last_error`.
    async fn advance_on_success(&mut self, schedule_id: Uuid, fired_at: DateTime<Utc>)
    -> Result<()>;

    /// Record a tick consumed without publishing anything.
    ///
    /// Moves `last_run_at` and `next_run_at` like a success and clears
    /// `last_error`, but leaves `run_count` alone.
    async fn advance_without_publish(
        &mut self,
        schedule_id: Uuid,
        fired_at: DateTime<Utc>,
    ) -> Result<()>;

    /// Record a failed run. The tick is still consumed.
    async fn advance_on_failure(
        &mut self,
        schedule_id: Uuid,
        fired_at: DateTime<Utc>,
        error_message: &str,
    ) -> Result<()>;

    /// Load the workflows behind `workflow_ids` through the batch's own
    /// connection. Missing ids are absent from the map.
    async fn load_workflows(&mut self, workflow_ids: &[Uuid]) -> Result<HashMap<Uuid, Workflow>>;

    /// Persist all advancements and release the claims.
    async fn commit(self) -> Result<()>;
}

/// Clamp an error message to the length stored in `last_error`.
pub fn truncate_error(message: &str) -> String {
    match message.char_indices().nth(MAX_ERROR_LEN) {
        Some((idx, _)) => message[..idx].to_string(),
        None => message.to_string(),
    }
}
