//! Reconnecting AMQP connection handle.

use std::sync::Arc;

use cadence_config::BrokerConfig;
use lapin::uri::{AMQPAuthority, AMQPUri, AMQPUserInfo};
use lapin::{Connection, ConnectionProperties};
use tokio::sync::Mutex;
use tracing::{debug, info, warn};

use crate::{BrokerError, Result};

#[derive(Default)]
struct ConnectionState {
    current: Option<Arc<Connection>>,
    closed: bool,
}

/// A single broker connection shared by every publish.
///
/// The connection is (re)established lazily: [`get`](Self::get) hands out the
/// live connection or dials once if there is none. A caller whose connection
/// failed hands it back to [`mark_stale`](Self::mark_stale) so the next use
/// reconnects.
pub struct BrokerConnection {
    uri: AMQPUri,
    target: String,
    state: Mutex<ConnectionState>,
}

impl BrokerConnection {
    /// Create a handle without dialing.
    pub fn new(config: &BrokerConfig) -> Self {
        Self {
            uri: amqp_uri(config),
            target: config.display_target(),
            state: Mutex::new(ConnectionState::default()),
        }
    }

    /// Create a handle and dial once.
    pub async fn connect(config: &BrokerConfig) -> Result<Self> {
        let handle = Self::new(config);
        handle.get().await?;
        Ok(handle)
    }

    /// Redacted `host:port/vhost` for logging.
    pub fn target(&self) -> &str {
        &self.target
    }

    /// The live connection, reconnecting if the previous one dropped.
    pub async fn get(&self) -> Result<Arc<Connection>> {
        let mut state = self.state.lock().await;
        if state.closed {
            return Err(BrokerError::Closed);
        }

        if let Some(conn) = &state.current
            && conn.status().connected()
        {
            return Ok(Arc::clone(conn));
        }

        if state.current.take().is_some() {
            warn!(broker = %self.target, "Broker connection lost, reconnecting");
        }

        let conn = Connection::connect_uri(self.uri.clone(), ConnectionProperties::default())
            .await?;
        info!(broker = %self.target, "Connected to broker");

        let conn = Arc::new(conn);
        state.current = Some(Arc::clone(&conn));
        Ok(conn)
    }

    /// Discard `failed` so the next [`get`](Self::get) dials again.
    ///
    /// A no-op when `failed` has already been replaced, so a late report about
    /// an old connection never tears down its healthy successor.
    pub async fn mark_stale(&self, failed: &Arc<Connection>) {
        let stale = take_if_current(&mut self.state.lock().await.current, failed);
        if let Some(conn) = stale {
            debug!(broker = %self.target, "Discarding broker connection");
            if let Err(e) = conn.close(320, "stale").await {
                debug!(error = %e, "Error closing stale broker connection");
            }
        }
    }

    /// Whether a live connection is currently held. Never dials.
    pub async fn is_connected(&self) -> bool {
        self.state
            .lock()
            .await
            .current
            .as_ref()
            .is_some_and(|conn| conn.status().connected())
    }

    /// Close the connection for good; later calls to [`get`](Self::get) fail.
    pub async fn close(&self) {
        let current = {
            let mut state = self.state.lock().await;
            state.closed = true;
            state.current.take()
        };
        if let Some(conn) = current
            && conn.status().connected()
        {
            match conn.close(200, "scheduler shutdown").await {
                Ok(()) => info!(broker = %self.target, "Broker connection closed"),
                Err(e) => warn!(error = %e, "Error closing broker connection"),
            }
        }
    }
}

fn take_if_current<T>(slot: &mut Option<Arc<T>>, failed: &Arc<T>) -> Option<Arc<T>> {
    let is_current = slot
        .as_ref()
        .is_some_and(|current| Arc::ptr_eq(current, failed));
    if is_current { slot.take() } else { None }
}

/// Build the AMQP URI from discrete fields so credentials need no escaping.
fn amqp_uri(config: &BrokerConfig) -> AMQPUri {
    AMQPUri {
        authority: AMQPAuthority {
            userinfo: AMQPUserInfo {
                username: config.user.clone(),
                password: config.password.expose().to_string(),
            },
            host: config.host.clone(),
            port: config.port,
        },
        vhost: config.vhost.clone(),
        ..Default::default()
    }
}
