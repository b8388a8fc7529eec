//! PostgreSQL store tests.
//!
//! Each test needs a scratch database in `DATABASE_URL` and is skipped when it
//! is unset. The `schedules` and `workflows` tables are created if missing and
//! truncated before every test.

use std::env;

use cadence_config::{DatabaseConfig, Secret};
use cadence_store::{DueBatch, PgScheduleStore, ScheduleStore, connect_pool};
use cadence_types::{Edge, Node, Schedule, Workflow, WorkflowGraph};
use chrono::{DateTime, Duration, SubsecRound, Utc};
use serial_test::serial;
use sqlx::PgPool;
use uuid::Uuid;

/// Connect with a pool of `max_connections`, or `None` when no database is configured.
async fn setup_db(max_connections: u32) -> Option<PgPool> {
    let database_url = match env::var("DATABASE_URL") {
        Ok(url) => url,
        Err(_) => {
            eprintln!("skipping test: DATABASE_URL not set");
            return None;
        }
    };

    let config = DatabaseConfig {
        url: Some(Secret::new(database_url)),
        pool_min_size: 1,
        pool_max_size: max_connections,
        acquire_timeout: 2,
        ..DatabaseConfig::default()
    };
    let pool = connect_pool(&config).await.ok()?;
    create_schema(&pool).await.ok()?;
    sqlx::query("TRUNCATE schedules, workflows")
        .execute(&pool)
        .await
        .ok()?;
    Some(pool)
}

/// Minimal tables with `INTEGER` counters, as the external API creates them.
async fn create_schema(pool: &PgPool) -> sqlx::Result<()> {
    sqlx::query(
        r#"
        CREATE TABLE IF NOT EXISTS workflows (
            id UUID PRIMARY KEY,
            is_active BOOLEAN NOT NULL DEFAULT TRUE,
            workflow_data JSONB NOT NULL
        )
        "#,
    )
    .execute(pool)
    .await?;

    sqlx::query(
        r#"
        CREATE TABLE IF NOT EXISTS schedules (
            id UUID PRIMARY KEY,
            workflow_id UUID NOT NULL,
            is_active BOOLEAN NOT NULL DEFAULT TRUE,
            interval_seconds INTEGER NOT NULL,
            start_at TIMESTAMPTZ NOT NULL,
            next_run_at TIMESTAMPTZ NOT NULL,
            last_run_at TIMESTAMPTZ,
            run_count INTEGER NOT NULL DEFAULT 0,
            failure_count INTEGER NOT NULL DEFAULT 0,
            last_error TEXT,
            created_at TIMESTAMPTZ NOT NULL DEFAULT NOW(),
            updated_at TIMESTAMPTZ NOT NULL DEFAULT NOW()
        )
        "#,
    )
    .execute(pool)
    .await?;
    Ok(())
}

/// Postgres keeps microseconds; compare against times it can represent.
fn now() -> DateTime<Utc> {
    Utc::now().trunc_subsecs(6)
}

async fn insert_workflow(pool: &PgPool) -> Workflow {
    let graph = WorkflowGraph {
        nodes: vec![
            Node::new("T", "schedule").as_trigger(),
            Node::new("A", "http"),
        ],
        edges: vec![Edge::new("T", "A")],
    };
    let workflow = Workflow::new(Uuid::new_v4(), &graph);
    sqlx::query("INSERT INTO workflows (id, is_active, workflow_data) VALUES ($1, $2, $3)")
        .bind(workflow.id)
        .bind(workflow.is_active)
        .bind(&workflow.workflow_data)
        .execute(pool)
        .await
        .unwrap();
    workflow
}

/// Insert an active 60s schedule that came due one second before `now`.
async fn insert_due_schedule(pool: &PgPool, workflow_id: Uuid, now: DateTime<Utc>) -> Schedule {
    let mut schedule = Schedule::new(workflow_id, 60, now - Duration::seconds(1));
    schedule.start_at = now - Duration::hours(1);
    sqlx::query(
        r#"
        INSERT INTO schedules (id, workflow_id, is_active, interval_seconds, start_at, next_run_at)
        VALUES ($1, $2, $3, $4::INTEGER, $5, $6)
        "#,
    )
    .bind(schedule.id)
    .bind(schedule.workflow_id)
    .bind(schedule.is_active)
    .bind(schedule.interval_seconds)
    .bind(schedule.start_at)
    .bind(schedule.next_run_at)
    .execute(pool)
    .await
    .unwrap();
    schedule
}

async fn read_schedule(pool: &PgPool, id: Uuid) -> (DateTime<Utc>, Option<DateTime<Utc>>, i32, i32, Option<String>) {
    sqlx::query_as(
        "SELECT next_run_at, last_run_at, run_count, failure_count, last_error FROM schedules WHERE id = $1",
    )
    .bind(id)
    .fetch_one(pool)
    .await
    .unwrap()
}

#[tokio::test]
#[serial]
async fn test_claims_are_exclusive_across_batches() {
    let Some(pool) = setup_db(5).await else {
        return;
    };
    let store = PgScheduleStore::new(pool.clone());
    let workflow = insert_workflow(&pool).await;
    let now = now();
    let schedule = insert_due_schedule(&pool, workflow.id, now).await;

    let first = store.fetch_due(now, 0, 100).await.unwrap();
    let second = store.fetch_due(now, 0, 100).await.unwrap();

    assert_eq!(first.schedules().len(), 1);
    assert_eq!(first.schedules()[0].id, schedule.id);
    assert!(second.schedules().is_empty());
}

#[tokio::test]
#[serial]
async fn test_success_advances_one_interval() {
    let Some(pool) = setup_db(5).await else {
        return;
    };
    let store = PgScheduleStore::new(pool.clone());
    let workflow = insert_workflow(&pool).await;
    let now = now();
    let schedule = insert_due_schedule(&pool, workflow.id, now).await;

    let mut batch = store.fetch_due(now, 0, 100).await.unwrap();
    let claimed = &batch.schedules()[0];
    assert_eq!(claimed.interval_seconds, 60);
    assert_eq!(claimed.next_run_at, schedule.next_run_at);
    assert_eq!(claimed.run_count, 0);

    batch.advance_on_success(schedule.id, now).await.unwrap();
    batch.commit().await.unwrap();

    let (next_run_at, last_run_at, run_count, failure_count, last_error) =
        read_schedule(&pool, schedule.id).await;
    assert_eq!(next_run_at, schedule.next_run_at + Duration::seconds(60));
    assert_eq!(last_run_at, Some(now));
    assert_eq!(run_count, 1);
    assert_eq!(failure_count, 0);
    assert!(last_error.is_none());
}

#[tokio::test]
#[serial]
async fn test_skip_and_failure_leave_run_count() {
    let Some(pool) = setup_db(5).await else {
        return;
    };
    let store = PgScheduleStore::new(pool.clone());
    let workflow = insert_workflow(&pool).await;
    let now = now();
    let skipped = insert_due_schedule(&pool, workflow.id, now).await;
    let failed = insert_due_schedule(&pool, workflow.id, now).await;

    let mut batch = store.fetch_due(now, 0, 100).await.unwrap();
    batch.advance_without_publish(skipped.id, now).await.unwrap();
    batch
        .advance_on_failure(failed.id, now, "broker down")
        .await
        .unwrap();
    batch.commit().await.unwrap();

    let (next_run_at, _, run_count, failure_count, _) = read_schedule(&pool, skipped.id).await;
    assert_eq!(next_run_at, skipped.next_run_at + Duration::seconds(60));
    assert_eq!((run_count, failure_count), (0, 0));

    let (next_run_at, _, run_count, failure_count, last_error) =
        read_schedule(&pool, failed.id).await;
    assert_eq!(next_run_at, failed.next_run_at + Duration::seconds(60));
    assert_eq!((run_count, failure_count), (0, 1));
    assert_eq!(last_error.as_deref(), Some("broker down"));
}

#[tokio::test]
#[serial]
async fn test_dropped_batch_releases_claims_and_discards_writes() {
    let Some(pool) = setup_db(5).await else {
        return;
    };
    let store = PgScheduleStore::new(pool.clone());
    let workflow = insert_workflow(&pool).await;
    let now = now();
    let schedule = insert_due_schedule(&pool, workflow.id, now).await;

    {
        let mut batch = store.fetch_due(now, 0, 100).await.unwrap();
        batch.advance_on_success(schedule.id, now).await.unwrap();
    }

    let again = store.fetch_due(now, 0, 100).await.unwrap();
    assert_eq!(again.schedules().len(), 1);
    drop(again);

    let (next_run_at, last_run_at, run_count, _, _) = read_schedule(&pool, schedule.id).await;
    assert_eq!(next_run_at, schedule.next_run_at);
    assert!(last_run_at.is_none());
    assert_eq!(run_count, 0);
}

#[tokio::test]
#[serial]
async fn test_tick_fits_in_a_single_connection() {
    let Some(pool) = setup_db(1).await else {
        return;
    };
    let store = PgScheduleStore::new(pool.clone());
    let workflow = insert_workflow(&pool).await;
    let now = now();
    let schedule = insert_due_schedule(&pool, workflow.id, now).await;

    let mut batch = store.fetch_due(now, 0, 100).await.unwrap();
    let workflows = batch.load_workflows(&[workflow.id]).await.unwrap();
    assert_eq!(workflows.get(&workflow.id), Some(&workflow));

    batch.advance_on_success(schedule.id, now).await.unwrap();
    batch.commit().await.unwrap();

    let (_, _, run_count, failure_count, _) = read_schedule(&pool, schedule.id).await;
    assert_eq!((run_count, failure_count), (1, 0));

    assert_eq!(store.load_workflow(workflow.id).await.unwrap(), Some(workflow));
    assert!(store.load_workflow(Uuid::new_v4()).await.unwrap().is_none());
    store.ping().await.unwrap();
}

#[tokio::test]
#[serial]
async fn test_inactive_and_future_schedules_are_not_claimed() {
    let Some(pool) = setup_db(5).await else {
        return;
    };
    let store = PgScheduleStore::new(pool.clone());
    let workflow = insert_workflow(&pool).await;
    let now = now();
    let inactive = insert_due_schedule(&pool, workflow.id, now).await;
    sqlx::query("UPDATE schedules SET is_active = FALSE WHERE id = $1")
        .bind(inactive.id)
        .execute(&pool)
        .await
        .unwrap();
    let not_started = insert_due_schedule(&pool, workflow.id, now).await;
    sqlx::query("UPDATE schedules SET start_at = $2 WHERE id = $1")
        .bind(not_started.id)
        .bind(now + Duration::hours(1))
        .execute(&pool)
        .await
        .unwrap();

    let batch = store.fetch_due(now, 0, 100).await.unwrap();
    assert!(batch.schedules().is_empty());
}
