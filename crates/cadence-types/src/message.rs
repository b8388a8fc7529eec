//! Broker payloads.

use chrono::{DateTime, Duration, Utc};
use serde::{Deserialize, Serialize};
use serde_json::{Map, Value};
use uuid::Uuid;

use crate::WorkflowGraph;

/// Payload that asks the execution engine to start a workflow run.
///
/// Carries the full graph so the consumer needs no further lookup. Consumers
/// deduplicate on `execution_id`.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ExecutionMessage {
    pub workflow_id: Uuid,
    pub execution_id: Uuid,
    pub current_node: String,
    pub workflow_definition: WorkflowGraph,
    /// Node outputs gathered so far; empty at trigger time.
    pub accumulated_context: Map<String, Value>,
}

/// Short-lived token handed to the real-time notification service.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct AccessTokenMessage {
    pub execution_id: Option<Uuid>,
    pub workflow_id: Uuid,
    pub user_id: String,
    /// Issued-at, unix seconds.
    pub iat: i64,
    /// Expiry, unix seconds.
    pub exp: i64,
}

impl AccessTokenMessage {
    /// Issue a token valid for `ttl` starting at `now`.
    pub fn issue(
        workflow_id: Uuid,
        user_id: impl Into<String>,
        execution_id: Option<Uuid>,
        ttl: Duration,
        now: DateTime<Utc>,
    ) -> Self {
        let iat = now.timestamp();
        Self {
            execution_id,
            workflow_id,
            user_id: user_id.into(),
            iat,
            exp: iat + ttl.num_seconds(),
        }
    }

    pub fn is_expired(&self, now: DateTime<Utc>) -> bool {
        now.timestamp() >= self.exp
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::{Edge, Node};

    #[test]
    fn test_execution_message_wire_shape() {
        let msg = ExecutionMessage {
            workflow_id: Uuid::nil(),
            execution_id: Uuid::nil(),
            current_node: "a".to_string(),
            workflow_definition: WorkflowGraph {
                nodes: vec![Node::new("t", "schedule").as_trigger(), Node::new("a", "http")],
                edges: vec![Edge::new("t", "a")],
            },
            accumulated_context: Map::new(),
        };

        let value = serde_json::to_value(&msg).unwrap();
        assert_eq!(value["workflow_id"], Uuid::nil().to_string());
        assert_eq!(value["execution_id"], Uuid::nil().to_string());
        assert_eq!(value["current_node"], "a");
        assert!(value["workflow_definition"]["nodes"].is_array());
        assert_eq!(value["accumulated_context"], serde_json::json!({}));
    }

    #[test]
    fn test_access_token_issue() {
        let now = DateTime::from_timestamp(1_700_000_000, 0).unwrap();
        let token = AccessTokenMessage::issue(
            Uuid::new_v4(),
            "user-1",
            None,
            Duration::minutes(5),
            now,
        );
        assert_eq!(token.iat, 1_700_000_000);
        assert_eq!(token.exp, 1_700_000_300);
        assert!(!token.is_expired(now));
        assert!(token.is_expired(now + Duration::minutes(5)));

        let value = serde_json::to_value(&token).unwrap();
        assert!(value["execution_id"].is_null());
        assert_eq!(value["user_id"], "user-1");
    }
}
