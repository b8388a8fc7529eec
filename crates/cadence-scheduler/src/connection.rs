//! Ownership of the two external dependencies.

use std::sync::Arc;
use std::time::Duration;

use cadence_broker::{AmqpPublisher, BrokerConnection};
use cadence_config::CadenceConfig;
use cadence_store::{PgScheduleStore, ScheduleStore, connect_pool};
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use sqlx::PgPool;
use tracing::{info, warn};

use crate::ConnectError;
use crate::retry::retry_with_backoff;

/// Upper bound on each dependency's probe during a health check.
const HEALTHCHECK_TIMEOUT: Duration = Duration::from_secs(5);

/// Reachability of both dependencies at one instant.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct HealthSnapshot {
    pub database: bool,
    pub broker: bool,
    pub checked_at: DateTime<Utc>,
}

impl HealthSnapshot {
    pub fn is_healthy(&self) -> bool {
        self.database && self.broker
    }
}

/// Owns the database pool and the broker connection.
///
/// Store and publisher handles are derived from here and share the
/// underlying connections.
pub struct ConnectionManager {
    pool: PgPool,
    broker: Arc<BrokerConnection>,
}

impl ConnectionManager {
    /// Connect to the database and then the broker, retrying each up to
    /// `scheduler.max_connect_attempts` times with capped exponential backoff.
    pub async fn connect(config: &CadenceConfig) -> Result<Self, ConnectError> {
        let attempts = config.scheduler.max_connect_attempts;

        info!(target_db = %config.database.display_target(), "Connecting to database");
        let pool = retry_with_backoff("database", attempts, |_| connect_pool(&config.database))
            .await
            .map_err(|source| ConnectError::Database { attempts, source })?;

        info!(target_broker = %config.broker.display_target(), "Connecting to broker");
        let broker = match retry_with_backoff("broker", attempts, |_| {
            BrokerConnection::connect(&config.broker)
        })
        .await
        {
            Ok(broker) => broker,
            Err(source) => {
                pool.close().await;
                return Err(ConnectError::Broker { attempts, source });
            }
        };

        Ok(Self {
            pool,
            broker: Arc::new(broker),
        })
    }

    pub fn pool(&self) -> &PgPool {
        &self.pool
    }

    /// Schedule store over the shared pool.
    pub fn store(&self) -> PgScheduleStore {
        PgScheduleStore::new(self.pool.clone())
    }

    pub fn broker(&self) -> &Arc<BrokerConnection> {
        &self.broker
    }

    /// Publisher over the shared broker connection.
    pub fn publisher(&self) -> AmqpPublisher {
        AmqpPublisher::new(Arc::clone(&self.broker))
    }

    /// Probe both dependencies without raising.
    pub async fn healthcheck(&self) -> HealthSnapshot {
        let database = match tokio::time::timeout(HEALTHCHECK_TIMEOUT, self.store().ping()).await {
            Ok(Ok(())) => true,
            Ok(Err(e)) => {
                warn!(error = %e, "Database health check failed");
                false
            }
            Err(_) => {
                warn!(
                    timeout_secs = HEALTHCHECK_TIMEOUT.as_secs(),
                    "Database health check timed out"
                );
                false
            }
        };

        HealthSnapshot {
            database,
            broker: probe_broker(&self.broker).await,
            checked_at: Utc::now(),
        }
    }

    /// Close the broker connection and the pool.
    pub async fn close(&self) {
        self.broker.close().await;
        self.pool.close().await;
        info!("Connections closed");
    }
}

/// Reuse the live broker connection, or dial once if a failed publish
/// discarded it, so an idle scheduler still recovers its health.
async fn probe_broker(broker: &BrokerConnection) -> bool {
    match tokio::time::timeout(HEALTHCHECK_TIMEOUT, broker.get()).await {
        Ok(Ok(_)) => true,
        Ok(Err(e)) => {
            warn!(error = %e, "Broker health check failed");
            false
        }
        Err(_) => {
            warn!(
                timeout_secs = HEALTHCHECK_TIMEOUT.as_secs(),
                "Broker health check timed out"
            );
            false
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_snapshot_requires_both_dependencies() {
        let now = Utc::now();
        let mut snapshot = HealthSnapshot {
            database: true,
            broker: true,
            checked_at: now,
        };
        assert!(snapshot.is_healthy());

        snapshot.broker = false;
        assert!(!snapshot.is_healthy());

        snapshot.broker = true;
        snapshot.database = false;
        assert!(!snapshot.is_healthy());
    }

    #[tokio::test]
    async fn test_probe_broker_reports_closed_handle_unhealthy() {
        let broker = BrokerConnection::new(&cadence_config::BrokerConfig::default());
        broker.close().await;
        assert!(!probe_broker(&broker).await);
    }

    #[tokio::test]
    async fn test_probe_broker_dials_when_disconnected() {
        // Nothing listens on port 1, so the probe must attempt a dial and fail.
        let config = cadence_config::BrokerConfig {
            host: "127.0.0.1".to_string(),
            port: 1,
            ..cadence_config::BrokerConfig::default()
        };
        let broker = BrokerConnection::new(&config);
        assert!(!probe_broker(&broker).await);
        assert!(!broker.is_connected().await);
    }
}
