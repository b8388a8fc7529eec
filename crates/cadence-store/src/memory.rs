//! In-memory schedule store.
//!
//! Mirrors the PostgreSQL claim semantics: a claimed schedule is invisible to
//! other batches until its batch commits or is dropped, and advancements only
//! land on commit.

use std::collections::{HashMap, HashSet};
use std::sync::Arc;

use async_trait::async_trait;
use cadence_types::{Schedule, Workflow};
use chrono::{DateTime, Utc};
use parking_lot::Mutex;
use uuid::Uuid;

use crate::store::{DueBatch, ScheduleStore, truncate_error};
use crate::{Result, StoreError};

#[derive(Default)]
struct MemoryState {
    schedules: HashMap<Uuid, Schedule>,
    workflows: HashMap<Uuid, Workflow>,
    claimed: HashSet<Uuid>,
    offline: bool,
}

/// Store that keeps schedules and workflows in process memory.
#[derive(Clone, Default)]
pub struct MemoryScheduleStore {
    state: Arc<Mutex<MemoryState>>,
}

impl MemoryScheduleStore {
    pub fn new() -> Self {
        Self::default()
    }

    /// Insert or replace a schedule.
    pub fn insert_schedule(&self, schedule: Schedule) {
        self.state.lock().schedules.insert(schedule.id, schedule);
    }

    /// Insert or replace a workflow.
    pub fn insert_workflow(&self, workflow: Workflow) {
        self.state.lock().workflows.insert(workflow.id, workflow);
    }

    /// Current committed state of a schedule.
    pub fn schedule(&self, id: Uuid) -> Option<Schedule> {
        self.state.lock().schedules.get(&id).cloned()
    }

    /// Whether a schedule is held by an open batch.
    pub fn is_claimed(&self, id: Uuid) -> bool {
        self.state.lock().claimed.contains(&id)
    }

    /// Simulate the database becoming unreachable (or coming back).
    pub fn set_offline(&self, offline: bool) {
        self.state.lock().offline = offline;
    }

    fn check_online(state: &MemoryState) -> Result<()> {
        if state.offline {
            return Err(StoreError::Unavailable("memory store is offline".to_string()));
        }
        Ok(())
    }
}

#[async_trait]
impl ScheduleStore for MemoryScheduleStore {
    type Batch = MemoryDueBatch;

    async fn fetch_due(
        &self,
        now: DateTime<Utc>,
        lookahead_seconds: i64,
        limit: i64,
    ) -> Result<MemoryDueBatch> {
        let mut state = self.state.lock();
        Self::check_online(&state)?;

        let mut due: Vec<Schedule> = state
            .schedules
            .values()
            .filter(|s| s.is_due(now, lookahead_seconds) && !state.claimed.contains(&s.id))
            .cloned()
            .collect();
        due.sort_by_key(|s| s.next_run_at);
        due.truncate(usize::try_from(limit).unwrap_or(0));

        for schedule in &due {
            state.claimed.insert(schedule.id);
        }

        Ok(MemoryDueBatch {
            state: Arc::clone(&self.state),
            schedules: due,
            pending: Vec::new(),
        })
    }

    async fn load_workflow(&self, workflow_id: Uuid) -> Result<Option<Workflow>> {
        let state = self.state.lock();
        Self::check_online(&state)?;
        Ok(state.workflows.get(&workflow_id).cloned())
    }

    async fn ping(&self) -> Result<()> {
        Self::check_online(&self.state.lock())
    }
}

/// Claimed schedules held by the in-memory store.
pub struct MemoryDueBatch {
    state: Arc<Mutex<MemoryState>>,
    schedules: Vec<Schedule>,
    pending: Vec<Schedule>,
}

impl MemoryDueBatch {
    /// The schedule as it will look once this batch commits.
    fn staged(&self, schedule_id: Uuid) -> Result<Schedule> {
        self.pending
            .iter()
            .rev()
            .find(|s| s.id == schedule_id)
            .or_else(|| self.schedules.iter().find(|s| s.id == schedule_id))
            .cloned()
            .ok_or(StoreError::NotClaimed(schedule_id))
    }

    fn claimed(&self, schedule_id: Uuid) -> Result<&Schedule> {
        self.schedules
            .iter()
            .find(|s| s.id == schedule_id)
            .ok_or(StoreError::NotClaimed(schedule_id))
    }

    /// Staged copy moved one tick forward with `last_error` cleared.
    fn advanced(&self, schedule_id: Uuid, fired_at: DateTime<Utc>) -> Result<Schedule> {
        let next_run_at = self.claimed(schedule_id)?.next_run_after(fired_at)?;
        let mut updated = self.staged(schedule_id)?;
        updated.last_run_at = Some(fired_at);
        updated.next_run_at = next_run_at;
        updated.last_error = None;
        updated.updated_at = Utc::now();
        Ok(updated)
    }
}

#[async_trait]
impl DueBatch for MemoryDueBatch {
    fn schedules(&self) -> &[Schedule] {
        &self.schedules
    }

    async fn advance_on_success(
        &mut self,
        schedule_id: Uuid,
        fired_at: DateTime<Utc>,
    ) -> Result<()> {
        let mut updated = self.advanced(schedule_id, fired_at)?;
        updated.run_count += 1;
        self.pending.push(updated);
        Ok(())
    }

    async fn advance_without_publish(
        &mut self,
        schedule_id: Uuid,
        fired_at: DateTime<Utc>,
    ) -> Result<()> {
        let updated = self.advanced(schedule_id, fired_at)?;
        self.pending.push(updated);
        Ok(())
    }

    async fn advance_on_failure(
        &mut self,
        schedule_id: Uuid,
        fired_at: DateTime<Utc>,
        error_message: &str,
    ) -> Result<()> {
        let claimed = self.claimed(schedule_id)?;
        // An out-of-range interval has no next tick; record the failure in place.
        let next_run_at = claimed
            .next_run_after(fired_at)
            .unwrap_or(claimed.next_run_at);
        let mut updated = self.staged(schedule_id)?;
        updated.last_run_at = Some(fired_at);
        updated.next_run_at = next_run_at;
        updated.failure_count += 1;
        updated.last_error = Some(truncate_error(error_message));
        updated.updated_at = Utc::now();
        self.pending.push(updated);
        Ok(())
    }

    async fn load_workflows(&mut self, workflow_ids: &[Uuid]) -> Result<HashMap<Uuid, Workflow>> {
        let state = self.state.lock();
        MemoryScheduleStore::check_online(&state)?;
        Ok(workflow_ids
            .iter()
            .filter_map(|id| state.workflows.get(id))
            .map(|workflow| (workflow.id, workflow.clone()))
            .collect())
    }

    async fn commit(mut self) -> Result<()> {
        let mut state = self.state.lock();
        MemoryScheduleStore::check_online(&state)?;
        // All or nothing: a vanished row aborts before anything is written.
        if let Some(missing) = self
            .pending
            .iter()
            .find(|s| !state.schedules.contains_key(&s.id))
        {
            return Err(StoreError::NotFound(missing.id));
        }
        for schedule in self.pending.drain(..) {
            state.schedules.insert(schedule.id, schedule);
        }
        Ok(())
    }
}

impl Drop for MemoryDueBatch {
    fn drop(&mut self) {
        let mut state = self.state.lock();
        for schedule in &self.schedules {
            state.claimed.remove(&schedule.id);
        }
    }
}
