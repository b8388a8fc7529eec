use thiserror::Error;

#[derive(Debug, Error)]
pub enum BrokerError {
    #[error("AMQP error: {0}")]
    Amqp(#[from] lapin::Error),

    #[error("Failed to serialize payload: {0}")]
    Serialize(#[from] serde_json::Error),

    #[error("Broker rejected message for queue {queue}")]
    Nacked { queue: String },

    #[error("Broker connection closed")]
    Closed,
}

impl BrokerError {
    /// Whether another attempt (after reconnecting) could succeed.
    pub fn is_retryable(&self) -> bool {
        matches!(self, Self::Amqp(_) | Self::Nacked { .. } | Self::Closed)
    }

    /// Whether the error means the connection itself is unusable.
    ///
    /// Channel-level failures (a nack, a refused queue declaration) leave the
    /// connection serving other publishes.
    pub fn is_connection_failure(&self) -> bool {
        matches!(
            self,
            Self::Amqp(lapin::Error::IOError(_) | lapin::Error::InvalidConnectionState(_))
        )
    }
}

pub type Result<T> = std::result::Result<T, BrokerError>;

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_serialization_errors_are_not_retryable() {
        let err: BrokerError = serde_json::from_str::<u8>("nope").unwrap_err().into();
        assert!(!err.is_retryable());
    }

    #[test]
    fn test_only_connection_errors_are_connection_failures() {
        let io: BrokerError =
            lapin::Error::IOError(std::sync::Arc::new(std::io::Error::other("reset"))).into();
        assert!(io.is_connection_failure());

        let nack = BrokerError::Nacked {
            queue: "workflow_execution".to_string(),
        };
        assert!(!nack.is_connection_failure());

        let limit: BrokerError = lapin::Error::ChannelsLimitReached.into();
        assert!(!limit.is_connection_failure());
        assert!(!BrokerError::Closed.is_connection_failure());
    }

    #[test]
    fn test_nack_is_retryable() {
        let err = BrokerError::Nacked {
            queue: "workflow_execution".to_string(),
        };
        assert!(err.is_retryable());
        assert!(err.to_string().contains("workflow_execution"));
    }
}
