//! Dependency health reporting.
//!
//! [`HealthReporter`] probes the database and broker on its own timer and
//! keeps the latest [`HealthSnapshot`] in a shared [`HealthState`]. The
//! `/health` route serves that snapshot; it never probes on request.

use std::sync::Arc;
use std::time::Duration;

use async_trait::async_trait;
use axum::extract::State;
use axum::http::StatusCode;
use axum::{Json, Router, routing::get};
use chrono::{DateTime, Utc};
use parking_lot::RwLock;
use serde::{Deserialize, Serialize};
use tokio::net::TcpListener;
use tokio::task::JoinHandle;
use tokio::time::MissedTickBehavior;
use tokio_util::sync::CancellationToken;
use tracing::{info, warn};

use crate::connection::{ConnectionManager, HealthSnapshot};

/// Something that can report dependency reachability.
#[async_trait]
pub trait HealthProbe: Send + Sync + 'static {
    async fn check(&self) -> HealthSnapshot;
}

#[async_trait]
impl HealthProbe for ConnectionManager {
    async fn check(&self) -> HealthSnapshot {
        self.healthcheck().await
    }
}

/// Latest health snapshot, shared between the reporter and the HTTP route.
#[derive(Clone, Default)]
pub struct HealthState {
    latest: Arc<RwLock<Option<HealthSnapshot>>>,
}

impl HealthState {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn latest(&self) -> Option<HealthSnapshot> {
        *self.latest.read()
    }

    /// Store `snapshot`, returning the previous one.
    pub fn record(&self, snapshot: HealthSnapshot) -> Option<HealthSnapshot> {
        self.latest.write().replace(snapshot)
    }
}

/// Periodically probes dependencies and records the result.
pub struct HealthReporter<H> {
    probe: Arc<H>,
    state: HealthState,
    interval: Duration,
}

impl<H: HealthProbe> HealthReporter<H> {
    pub fn new(probe: Arc<H>, state: HealthState, interval: Duration) -> Self {
        Self {
            probe,
            state,
            interval,
        }
    }

    /// Run one probe and record it, logging health transitions.
    pub async fn check_once(&self) -> HealthSnapshot {
        let snapshot = self.probe.check().await;
        let previous = self.state.record(snapshot);

        let was_healthy = previous.map(|p| p.is_healthy());
        match (was_healthy, snapshot.is_healthy()) {
            (Some(true), true) | (Some(false), false) => {}
            (_, true) => info!("Dependencies healthy"),
            (_, false) => warn!(
                database = snapshot.database,
                broker = snapshot.broker,
                "Dependencies unhealthy"
            ),
        }
        snapshot
    }

    /// Check every `interval` until `shutdown` is cancelled.
    pub async fn run(self, shutdown: CancellationToken) {
        let mut ticker = tokio::time::interval(self.interval);
        ticker.set_missed_tick_behavior(MissedTickBehavior::Delay);
        loop {
            tokio::select! {
                biased;
                _ = shutdown.cancelled() => break,
                _ = ticker.tick() => {
                    self.check_once().await;
                }
            }
        }
    }

    pub fn spawn(self, shutdown: CancellationToken) -> JoinHandle<()> {
        tokio::spawn(self.run(shutdown))
    }
}

/// Body of `GET /health`.
#[derive(Debug, Serialize, Deserialize)]
pub struct HealthResponse {
    /// `ok` or `degraded`.
    pub status: String,
    pub database: bool,
    pub broker: bool,
    /// When the reported check ran; null before the first check.
    pub checked_at: Option<DateTime<Utc>>,
    pub version: String,
}

impl HealthResponse {
    fn from_snapshot(snapshot: Option<HealthSnapshot>) -> Self {
        let healthy = snapshot.is_some_and(|s| s.is_healthy());
        Self {
            status: if healthy { "ok" } else { "degraded" }.to_string(),
            database: snapshot.is_some_and(|s| s.database),
            broker: snapshot.is_some_and(|s| s.broker),
            checked_at: snapshot.map(|s| s.checked_at),
            version: env!("CARGO_PKG_VERSION").to_string(),
        }
    }
}

/// Report the latest snapshot; 503 until both dependencies are reachable.
pub async fn health(State(state): State<HealthState>) -> (StatusCode, Json<HealthResponse>) {
    let body = HealthResponse::from_snapshot(state.latest());
    let status = if body.status == "ok" {
        StatusCode::OK
    } else {
        StatusCode::SERVICE_UNAVAILABLE
    };
    (status, Json(body))
}

/// Create the health route.
pub fn health_router(state: HealthState) -> Router {
    Router::new()
        .route("/health", get(health))
        .with_state(state)
}

/// Serve `/health` on `bind` until `shutdown` is cancelled.
pub async fn serve_health(
    bind: &str,
    state: HealthState,
    shutdown: CancellationToken,
) -> std::io::Result<()> {
    let listener = TcpListener::bind(bind).await?;
    info!("Health endpoint listening on {}", listener.local_addr()?);

    axum::serve(listener, health_router(state))
        .with_graceful_shutdown(async move { shutdown.cancelled().await })
        .await
}
