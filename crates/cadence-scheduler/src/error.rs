//! Error types for the scheduling core.

use cadence_broker::BrokerError;
use cadence_store::StoreError;
use thiserror::Error;
use uuid::Uuid;

/// A workflow graph that cannot produce a trigger message.
#[derive(Debug, Error, PartialEq, Eq)]
pub enum TranslateError {
    #[error("Invalid workflow structure: {0}")]
    InvalidWorkflowStructure(String),
}

/// Why a single schedule's dispatch failed.
///
/// Every variant is recorded on the schedule (`last_error`,
/// `failure_count`); none of them stops the poll loop.
#[derive(Debug, Error)]
pub enum DispatchError {
    #[error("Workflow not found: {0}")]
    WorkflowNotFound(Uuid),

    #[error("Workflow is inactive: {0}")]
    WorkflowInactive(Uuid),

    #[error(transparent)]
    InvalidInterval(#[from] cadence_types::Error),

    #[error(transparent)]
    Translate(#[from] TranslateError),

    #[error("Publish failed: {0}")]
    Publish(#[from] BrokerError),

    #[error("Store error: {0}")]
    Store(#[from] StoreError),
}

/// Startup could not reach a dependency within the attempt budget.
#[derive(Debug, Error)]
pub enum ConnectError {
    #[error("Database unreachable after {attempts} attempts: {source}")]
    Database {
        attempts: u32,
        #[source]
        source: StoreError,
    },

    #[error("Broker unreachable after {attempts} attempts: {source}")]
    Broker {
        attempts: u32,
        #[source]
        source: BrokerError,
    },
}
