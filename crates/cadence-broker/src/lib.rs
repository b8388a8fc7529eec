//! AMQP publishing for the Cadence scheduler.
//!
//! [`BrokerConnection`] owns one reconnecting connection; [`AmqpPublisher`]
//! opens a short-lived confirmed channel on it for every message.

mod connection;
mod error;
mod publisher;

pub use connection::BrokerConnection;
pub use error::{BrokerError, Result};
pub use publisher::{AmqpPublisher, JSON_CONTENT_TYPE, Publisher, PublisherExt, encode_payload};
