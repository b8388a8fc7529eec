//! PostgreSQL schedule store.
//!
//! Claiming relies on row locks: `fetch_due` opens a transaction and selects
//! with `FOR UPDATE SKIP LOCKED`, so concurrent replicas partition the due set
//! between them instead of double-firing. The transaction (and with it every
//! lock) ends when the batch is committed or dropped. Workflows are read
//! through that same transaction, so a tick needs a single pooled connection.

use std::collections::HashMap;

use async_trait::async_trait;
use cadence_config::DatabaseConfig;
use cadence_types::{Schedule, Workflow};
use chrono::{DateTime, Duration, Utc};
use sqlx::postgres::{PgConnectOptions, PgPoolOptions};
use sqlx::types::Json;
use sqlx::{Acquire, PgPool, Postgres, Transaction};
use tracing::debug;
use uuid::Uuid;

use crate::store::{DueBatch, ScheduleStore, truncate_error};
use crate::{Result, StoreError};

/// Open a connection pool sized by `config` (single attempt).
pub async fn connect_pool(config: &DatabaseConfig) -> Result<PgPool> {
    let options = match &config.url {
        Some(url) => url.expose().parse::<PgConnectOptions>()?,
        None => PgConnectOptions::new()
            .host(&config.host)
            .port(config.port)
            .username(&config.user)
            .password(config.password.expose())
            .database(&config.name),
    };

    let pool = PgPoolOptions::new()
        .min_connections(config.pool_min_size)
        .max_connections(config.pool_max_size)
        .acquire_timeout(config.acquire_timeout())
        .connect_with(options)
        .await?;

    Ok(pool)
}

/// Schedule store backed by PostgreSQL.
#[derive(Clone)]
pub struct PgScheduleStore {
    pool: PgPool,
}

impl PgScheduleStore {
    /// Create a store over an existing pool.
    pub fn new(pool: PgPool) -> Self {
        Self { pool }
    }

    /// Get the underlying pool.
    pub fn pool(&self) -> &PgPool {
        &self.pool
    }
}

#[async_trait]
impl ScheduleStore for PgScheduleStore {
    type Batch = PgDueBatch;

    async fn fetch_due(
        &self,
        now: DateTime<Utc>,
        lookahead_seconds: i64,
        limit: i64,
    ) -> Result<PgDueBatch> {
        let horizon = now + Duration::seconds(lookahead_seconds);
        let mut tx = self.pool.begin().await?;

        let rows = sqlx::query_as::<_, ScheduleRow>(
            r#"
            SELECT id, workflow_id, is_active, interval_seconds::BIGINT AS interval_seconds,
                   start_at, next_run_at, last_run_at,
                   run_count::BIGINT AS run_count, failure_count::BIGINT AS failure_count,
                   last_error, created_at, updated_at
            FROM schedules
            WHERE is_active = TRUE
              AND start_at <= $1
              AND next_run_at <= $2
            ORDER BY next_run_at ASC
            LIMIT $3
            FOR UPDATE SKIP LOCKED
            "#,
        )
        .bind(now)
        .bind(horizon)
        .bind(limit)
        .fetch_all(&mut *tx)
        .await?;

        debug!(claimed = rows.len(), %horizon, "claimed due schedules");

        Ok(PgDueBatch {
            tx,
            schedules: rows.into_iter().map(Into::into).collect(),
        })
    }

    async fn load_workflow(&self, workflow_id: Uuid) -> Result<Option<Workflow>> {
        let row = sqlx::query_as::<_, WorkflowRow>(
            r#"
            SELECT id, is_active, workflow_data
            FROM workflows
            WHERE id = $1
            "#,
        )
        .bind(workflow_id)
        .fetch_optional(&self.pool)
        .await?;

        Ok(row.map(Into::into))
    }

    async fn ping(&self) -> Result<()> {
        sqlx::query_scalar::<_, i32>("SELECT 1")
            .fetch_one(&self.pool)
            .await?;
        Ok(())
    }
}

/// Claimed schedules held under one transaction.
pub struct PgDueBatch {
    tx: Transaction<'static, Postgres>,
    schedules: Vec<Schedule>,
}

impl PgDueBatch {
    fn claimed(&self, schedule_id: Uuid) -> Result<&Schedule> {
        self.schedules
            .iter()
            .find(|s| s.id == schedule_id)
            .ok_or(StoreError::NotClaimed(schedule_id))
    }

    /// Run one advancement inside a savepoint so a failed write leaves the
    /// rest of the batch intact.
    async fn write_advance(
        &mut self,
        schedule_id: Uuid,
        fired_at: DateTime<Utc>,
        outcome: Outcome<'_>,
    ) -> Result<()> {
        let schedule = self.claimed(schedule_id)?;
        let next_run_at = match (&outcome, schedule.next_run_after(fired_at)) {
            (_, Ok(next)) => next,
            // An out-of-range interval has no next tick; record the failure in place.
            (Outcome::Failure(_), Err(_)) => schedule.next_run_at,
            (Outcome::Success | Outcome::Skipped, Err(e)) => return Err(e.into()),
        };

        let mut savepoint = Acquire::begin(&mut self.tx).await?;
        let result = match outcome {
            Outcome::Success => {
                sqlx::query(
                    r#"
                    UPDATE schedules
                    SET last_run_at = $2,
                        next_run_at = $3,
                        run_count = run_count + 1,
                        last_error = NULL,
                        updated_at = NOW()
                    WHERE id = $1
                    "#,
                )
                .bind(schedule_id)
                .bind(fired_at)
                .bind(next_run_at)
                .execute(&mut *savepoint)
                .await?
            }
            Outcome::Skipped => {
                sqlx::query(
                    r#"
                    UPDATE schedules
                    SET last_run_at = $2,
                        next_run_at = $3,
                        last_error = NULL,
                        updated_at = NOW()
                    WHERE id = $1
                    "#,
                )
                .bind(schedule_id)
                .bind(fired_at)
                .bind(next_run_at)
                .execute(&mut *savepoint)
                .await?
            }
            Outcome::Failure(message) => {
                sqlx::query(
                    r#"
                    UPDATE schedules
                    SET last_run_at = $2,
                        next_run_at = $3,
                        failure_count = failure_count + 1,
                        last_error = $4,
                        updated_at = NOW()
                    WHERE id = $1
                    "#,
                )
                .bind(schedule_id)
                .bind(fired_at)
                .bind(next_run_at)
                .bind(truncate_error(message))
                .execute(&mut *savepoint)
                .await?
            }
        };

        if result.rows_affected() == 0 {
            return Err(StoreError::NotFound(schedule_id));
        }
        savepoint.commit().await?;
        Ok(())
    }
}

enum Outcome<'a> {
    Success,
    Skipped,
    Failure(&'a str),
}

#[async_trait]
impl DueBatch for PgDueBatch {
    fn schedules(&self) -> &[Schedule] {
        &self.schedules
    }

    async fn advance_on_success(
        &mut self,
        schedule_id: Uuid,
        fired_at: DateTime<Utc>,
    ) -> Result<()> {
        self.write_advance(schedule_id, fired_at, Outcome::Success)
            .await
    }

    async fn advance_without_publish(
        &mut self,
        schedule_id: Uuid,
        fired_at: DateTime<Utc>,
    ) -> Result<()> {
        self.write_advance(schedule_id, fired_at, Outcome::Skipped)
            .await
    }

    async fn advance_on_failure(
        &mut self,
        schedule_id: Uuid,
        fired_at: DateTime<Utc>,
        error_message: &str,
    ) -> Result<()> {
        self.write_advance(schedule_id, fired_at, Outcome::Failure(error_message))
            .await
    }

    async fn load_workflows(&mut self, workflow_ids: &[Uuid]) -> Result<HashMap<Uuid, Workflow>> {
        let rows = sqlx::query_as::<_, WorkflowRow>(
            r#"
            SELECT id, is_active, workflow_data
            FROM workflows
            WHERE id = ANY($1)
            "#,
        )
        .bind(workflow_ids)
        .fetch_all(&mut *self.tx)
        .await?;

        Ok(rows
            .into_iter()
            .map(|row| (row.id, Workflow::from(row)))
            .collect())
    }

    async fn commit(self) -> Result<()> {
        self.tx.commit().await?;
        Ok(())
    }
}

// Internal row types for sqlx
#[derive(sqlx::FromRow)]
struct ScheduleRow {
    id: Uuid,
    workflow_id: Uuid,
    is_active: bool,
    interval_seconds: i64,
    start_at: DateTime<Utc>,
    next_run_at: DateTime<Utc>,
    last_run_at: Option<DateTime<Utc>>,
    run_count: i64,
    failure_count: i64,
    last_error: Option<String>,
    created_at: DateTime<Utc>,
    updated_at: DateTime<Utc>,
}

impl From<ScheduleRow> for Schedule {
    fn from(row: ScheduleRow) -> Self {
        Self {
            id: row.id,
            workflow_id: row.workflow_id,
            is_active: row.is_active,
            interval_seconds: row.interval_seconds,
            start_at: row.start_at,
            next_run_at: row.next_run_at,
            last_run_at: row.last_run_at,
            run_count: row.run_count,
            failure_count: row.failure_count,
            last_error: row.last_error,
            created_at: row.created_at,
            updated_at: row.updated_at,
        }
    }
}

#[derive(sqlx::FromRow)]
struct WorkflowRow {
    id: Uuid,
    is_active: bool,
    workflow_data: Json<serde_json::Value>,
}

impl From<WorkflowRow> for Workflow {
    fn from(row: WorkflowRow) -> Self {
        Self {
            id: row.id,
            is_active: row.is_active,
            workflow_data: row.workflow_data.0,
        }
    }
}
