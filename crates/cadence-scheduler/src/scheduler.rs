//! The poll loop.
//!
//! Each tick claims due schedules, loads their workflows through the claiming
//! batch, dispatches them (translate, publish) with bounded concurrency, then
//! records every outcome and commits the batch. Per-schedule failures are written back to the schedule and
//! never abort the tick.

use std::time::Duration;

use cadence_broker::{Publisher, PublisherExt};
use cadence_config::CadenceConfig;
use cadence_store::{DueBatch, ScheduleStore, StoreError};
use cadence_types::{Schedule, Workflow, defaults};
use chrono::{DateTime, Utc};
use futures::{StreamExt, stream};
use tokio::sync::watch;
use tokio::time::MissedTickBehavior;
use tokio_util::sync::CancellationToken;
use tracing::{debug, error, info, warn};
use uuid::Uuid;

use crate::DispatchError;
use crate::translator::build_trigger_message;

/// Configuration for the poll loop.
#[derive(Debug, Clone)]
pub struct SchedulerConfig {
    /// How often to poll for due schedules.
    pub poll_interval: Duration,
    /// Schedules due within this many seconds are fired early.
    pub look_ahead_seconds: i64,
    /// Maximum number of schedules claimed per tick.
    pub batch_size: i64,
    /// Maximum dispatches in flight within a tick.
    pub dispatch_concurrency: usize,
    /// Queue receiving execution messages.
    pub execution_queue: String,
}

impl Default for SchedulerConfig {
    fn default() -> Self {
        Self {
            poll_interval: defaults::poll_interval(),
            look_ahead_seconds: defaults::LOOK_AHEAD_SECONDS,
            batch_size: defaults::BATCH_SIZE,
            dispatch_concurrency: defaults::DISPATCH_CONCURRENCY,
            execution_queue: defaults::EXECUTION_QUEUE.to_string(),
        }
    }
}

impl SchedulerConfig {
    pub fn from_config(config: &CadenceConfig) -> Self {
        Self {
            poll_interval: config.scheduler.poll_interval(),
            look_ahead_seconds: config.scheduler.look_ahead_seconds,
            batch_size: config.scheduler.batch_size,
            dispatch_concurrency: config.scheduler.dispatch_concurrency,
            execution_queue: config.broker.execution_queue.clone(),
        }
    }
}

/// Lifecycle of the poll loop.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SchedulerState {
    Starting,
    Running,
    /// Shutdown requested; the current tick is finishing.
    Draining,
    Stopped,
}

/// Counts from one tick.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct TickReport {
    /// Schedules claimed.
    pub claimed: usize,
    /// Execution messages published.
    pub published: usize,
    /// Schedules whose trigger has nothing downstream.
    pub skipped: usize,
    /// Schedules recorded as failed.
    pub failed: usize,
}

enum Outcome {
    Published(Uuid),
    Skipped,
    Failed(DispatchError),
}

/// Polls the store for due schedules and publishes their trigger messages.
pub struct Scheduler<S, P> {
    store: S,
    publisher: P,
    config: SchedulerConfig,
    state: watch::Sender<SchedulerState>,
}

impl<S, P> Scheduler<S, P>
where
    S: ScheduleStore,
    P: Publisher,
{
    pub fn new(store: S, publisher: P, config: SchedulerConfig) -> Self {
        let (state, _) = watch::channel(SchedulerState::Starting);
        Self {
            store,
            publisher,
            config,
            state,
        }
    }

    pub fn config(&self) -> &SchedulerConfig {
        &self.config
    }

    pub fn state(&self) -> SchedulerState {
        *self.state.borrow()
    }

    /// Watch lifecycle transitions.
    pub fn subscribe(&self) -> watch::Receiver<SchedulerState> {
        self.state.subscribe()
    }

    fn set_state(&self, state: SchedulerState) {
        let previous = self.state.send_replace(state);
        if previous != state {
            debug!(?previous, current = ?state, "Scheduler state changed");
        }
    }

    /// Run ticks every `poll_interval` until `shutdown` is cancelled.
    ///
    /// A tick in progress when shutdown is requested runs to completion.
    pub async fn run(&self, shutdown: CancellationToken) {
        self.set_state(SchedulerState::Running);
        info!(
            poll_interval_secs = self.config.poll_interval.as_secs(),
            look_ahead_seconds = self.config.look_ahead_seconds,
            batch_size = self.config.batch_size,
            "Scheduler started"
        );

        let mut ticker = tokio::time::interval(self.config.poll_interval);
        ticker.set_missed_tick_behavior(MissedTickBehavior::Delay);

        loop {
            tokio::select! {
                biased;
                _ = shutdown.cancelled() => break,
                _ = ticker.tick() => {}
            }

            let tick = self.run_tick(Utc::now());
            tokio::pin!(tick);
            let result = tokio::select! {
                result = &mut tick => result,
                _ = shutdown.cancelled() => {
                    self.set_state(SchedulerState::Draining);
                    info!("Shutdown requested, finishing current tick");
                    tick.await
                }
            };

            if let Err(e) = result {
                error!(error = %e, "Scheduler tick failed");
            }
        }

        self.set_state(SchedulerState::Draining);
        self.set_state(SchedulerState::Stopped);
        info!("Scheduler stopped");
    }

    /// Claim, dispatch and advance everything due at `now`.
    ///
    /// `now` is also the `fired_at` recorded on each schedule. An error here
    /// means the batch was not committed; its claims are released and the
    /// same schedules are offered again next tick.
    pub async fn run_tick(&self, now: DateTime<Utc>) -> Result<TickReport, StoreError> {
        let mut batch = self
            .store
            .fetch_due(now, self.config.look_ahead_seconds, self.config.batch_size)
            .await?;
        let schedules = batch.schedules().to_vec();
        let mut report = TickReport {
            claimed: schedules.len(),
            ..TickReport::default()
        };

        if schedules.is_empty() {
            batch.commit().await?;
            return Ok(report);
        }
        debug!(count = schedules.len(), "Found due schedules");

        let mut workflow_ids: Vec<Uuid> = schedules.iter().map(|s| s.workflow_id).collect();
        workflow_ids.sort_unstable();
        workflow_ids.dedup();
        let workflows = batch.load_workflows(&workflow_ids).await?;

        let outcomes: Vec<Outcome> = stream::iter(&schedules)
            .map(|schedule| self.dispatch(schedule, workflows.get(&schedule.workflow_id)))
            .buffered(self.config.dispatch_concurrency.max(1))
            .collect()
            .await;

        for (schedule, outcome) in schedules.iter().zip(outcomes) {
            match outcome {
                Outcome::Published(execution_id) => {
                    info!(
                        schedule_id = %schedule.id,
                        workflow_id = %schedule.workflow_id,
                        %execution_id,
                        "Triggered workflow"
                    );
                    if record_success(&mut batch, schedule, now).await {
                        report.published += 1;
                    } else {
                        report.failed += 1;
                    }
                }
                Outcome::Skipped => {
                    if record_skip(&mut batch, schedule, now).await {
                        report.skipped += 1;
                    } else {
                        report.failed += 1;
                    }
                }
                Outcome::Failed(e) => {
                    warn!(
                        schedule_id = %schedule.id,
                        workflow_id = %schedule.workflow_id,
                        error = %e,
                        "Schedule dispatch failed"
                    );
                    record_failure(&mut batch, schedule, now, &e.to_string()).await;
                    report.failed += 1;
                }
            }
        }

        batch.commit().await?;
        info!(
            claimed = report.claimed,
            published = report.published,
            skipped = report.skipped,
            failed = report.failed,
            "Tick complete"
        );
        Ok(report)
    }

    async fn dispatch(&self, schedule: &Schedule, workflow: Option<&Workflow>) -> Outcome {
        match self.try_dispatch(schedule, workflow).await {
            Ok(Some(execution_id)) => Outcome::Published(execution_id),
            Ok(None) => Outcome::Skipped,
            Err(e) => Outcome::Failed(e),
        }
    }

    async fn try_dispatch(
        &self,
        schedule: &Schedule,
        workflow: Option<&Workflow>,
    ) -> Result<Option<Uuid>, DispatchError> {
        schedule.interval()?;

        let workflow = workflow.ok_or(DispatchError::WorkflowNotFound(schedule.workflow_id))?;
        if !workflow.is_active {
            return Err(DispatchError::WorkflowInactive(workflow.id));
        }

        let execution_id = Uuid::new_v4();
        let Some(message) =
            build_trigger_message(workflow.id, execution_id, &workflow.workflow_data)?
        else {
            debug!(
                schedule_id = %schedule.id,
                workflow_id = %workflow.id,
                "Nothing downstream of trigger, advancing without publish"
            );
            return Ok(None);
        };

        self.publisher
            .publish_execution(&self.config.execution_queue, &message)
            .await?;
        Ok(Some(execution_id))
    }
}

/// Advance after a successful dispatch. If the write itself fails, fall back
/// to recording a failure so the tick is still consumed.
async fn record_success<B: DueBatch>(batch: &mut B, schedule: &Schedule, fired_at: DateTime<Utc>) -> bool {
    match batch.advance_on_success(schedule.id, fired_at).await {
        Ok(()) => true,
        Err(e) => {
            error!(schedule_id = %schedule.id, error = %e, "Failed to advance schedule");
            let message = DispatchError::Store(e).to_string();
            record_failure(batch, schedule, fired_at, &message).await;
            false
        }
    }
}

/// Advance a schedule whose trigger had nothing downstream.
async fn record_skip<B: DueBatch>(batch: &mut B, schedule: &Schedule, fired_at: DateTime<Utc>) -> bool {
    match batch.advance_without_publish(schedule.id, fired_at).await {
        Ok(()) => true,
        Err(e) => {
            error!(schedule_id = %schedule.id, error = %e, "Failed to advance schedule");
            let message = DispatchError::Store(e).to_string();
            record_failure(batch, schedule, fired_at, &message).await;
            false
        }
    }
}

async fn record_failure<B: DueBatch>(
    batch: &mut B,
    schedule: &Schedule,
    fired_at: DateTime<Utc>,
    message: &str,
) {
    if let Err(e) = batch.advance_on_failure(schedule.id, fired_at, message).await {
        error!(schedule_id = %schedule.id, error = %e, "Failed to record schedule failure");
    }
}
