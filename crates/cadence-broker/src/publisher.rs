//! Message publishing.

use std::sync::Arc;

use async_trait::async_trait;
use cadence_types::{AccessTokenMessage, ExecutionMessage};
use lapin::options::{BasicPublishOptions, ConfirmSelectOptions, QueueDeclareOptions};
use lapin::types::FieldTable;
use lapin::{BasicProperties, Connection};
use serde::Serialize;
use tracing::{debug, warn};

use crate::{BrokerConnection, BrokerError, Result};

/// Content type set on every published message.
pub const JSON_CONTENT_TYPE: &str = "application/json";

/// AMQP delivery mode that asks the broker to persist the message.
const PERSISTENT: u8 = 2;

/// Publishes an already-encoded payload to a named queue.
#[async_trait]
pub trait Publisher: Send + Sync {
    /// Publish `payload` to `queue` through the default exchange.
    ///
    /// `durable` selects both the queue declaration and persistent delivery.
    /// Returns once the broker has confirmed the message.
    async fn publish(&self, queue: &str, payload: &[u8], durable: bool) -> Result<()>;
}

#[async_trait]
impl<P: Publisher + ?Sized> Publisher for Arc<P> {
    async fn publish(&self, queue: &str, payload: &[u8], durable: bool) -> Result<()> {
        (**self).publish(queue, payload, durable).await
    }
}

/// Typed helpers over [`Publisher`].
#[async_trait]
pub trait PublisherExt: Publisher {
    /// Serialize `payload` as JSON and publish it.
    async fn publish_json<T>(&self, queue: &str, payload: &T, durable: bool) -> Result<()>
    where
        T: Serialize + Sync + ?Sized,
    {
        let body = encode_payload(payload)?;
        self.publish(queue, &body, durable).await
    }

    /// Publish a workflow trigger. Execution messages are always durable.
    async fn publish_execution(&self, queue: &str, message: &ExecutionMessage) -> Result<()> {
        self.publish_json(queue, message, true).await
    }

    /// Publish an access token. Tokens are short-lived and not persisted.
    async fn publish_access_token(&self, queue: &str, token: &AccessTokenMessage) -> Result<()> {
        self.publish_json(queue, token, false).await
    }
}

impl<P: Publisher + ?Sized> PublisherExt for P {}

/// JSON-encode a payload for the wire.
pub fn encode_payload<T: Serialize + ?Sized>(payload: &T) -> Result<Vec<u8>> {
    Ok(serde_json::to_vec(payload)?)
}

/// [`Publisher`] backed by a shared [`BrokerConnection`].
///
/// Every publish opens its own confirmed channel and closes it afterwards, so
/// concurrent publishes never share channel state.
#[derive(Clone)]
pub struct AmqpPublisher {
    connection: Arc<BrokerConnection>,
}

impl AmqpPublisher {
    pub fn new(connection: Arc<BrokerConnection>) -> Self {
        Self { connection }
    }

    pub fn connection(&self) -> &Arc<BrokerConnection> {
        &self.connection
    }
}

#[async_trait]
impl Publisher for AmqpPublisher {
    async fn publish(&self, queue: &str, payload: &[u8], durable: bool) -> Result<()> {
        let conn = self.connection.get().await?;
        match publish_on(&conn, queue, payload, durable).await {
            Ok(()) => {
                debug!(queue, bytes = payload.len(), durable, "Published message");
                Ok(())
            }
            Err(e) if e.is_connection_failure() || !conn.status().connected() => {
                warn!(queue, error = %e, "Publish failed, discarding connection");
                self.connection.mark_stale(&conn).await;
                Err(e)
            }
            Err(e) => {
                warn!(queue, error = %e, "Publish failed");
                Err(e)
            }
        }
    }
}

async fn publish_on(conn: &Connection, queue: &str, payload: &[u8], durable: bool) -> Result<()> {
    let channel = conn.create_channel().await?;
    channel
        .confirm_select(ConfirmSelectOptions::default())
        .await?;
    channel
        .queue_declare(
            queue,
            QueueDeclareOptions {
                durable,
                ..Default::default()
            },
            FieldTable::default(),
        )
        .await?;

    let confirmation = channel
        .basic_publish(
            "",
            queue,
            BasicPublishOptions::default(),
            payload,
            message_properties(durable),
        )
        .await?
        .await?;

    if let Err(e) = channel.close(200, "OK").await {
        debug!(queue, error = %e, "Error closing publish channel");
    }

    if confirmation.is_nack() {
        return Err(BrokerError::Nacked {
            queue: queue.to_string(),
        });
    }
    Ok(())
}

fn message_properties(durable: bool) -> BasicProperties {
    let properties = BasicProperties::default().with_content_type(JSON_CONTENT_TYPE.into());
    if durable {
        properties.with_delivery_mode(PERSISTENT)
    } else {
        properties
    }
}
