//! Token command - publish an access token for the notification service.

use std::process::ExitCode;
use std::sync::Arc;

use anyhow::{Context as _, Result};
use cadence_broker::{AmqpPublisher, BrokerConnection, PublisherExt};
use cadence_scheduler::retry_with_backoff;
use cadence_types::AccessTokenMessage;
use chrono::{Duration, Utc};
use clap::Args;
use tracing::info;
use uuid::Uuid;

use super::Context;

/// Arguments for the token command.
#[derive(Args, Debug)]
pub struct TokenArgs {
    /// Workflow the token grants access to
    #[arg(long)]
    pub workflow_id: Uuid,

    /// User the token is issued to
    #[arg(long)]
    pub user_id: String,

    /// Scope the token to a single execution
    #[arg(long)]
    pub execution_id: Option<Uuid>,

    /// Token lifetime in seconds
    #[arg(long, value_name = "SECS", default_value_t = 3600)]
    pub ttl: u32,
}

/// Run the token command.
pub async fn run(args: TokenArgs, ctx: &Context) -> Result<ExitCode> {
    let broker = &ctx.config.broker;
    let token = AccessTokenMessage::issue(
        args.workflow_id,
        args.user_id,
        args.execution_id,
        Duration::seconds(i64::from(args.ttl)),
        Utc::now(),
    );

    let connection = retry_with_backoff(
        "broker",
        ctx.config.scheduler.max_connect_attempts,
        |_| BrokerConnection::connect(broker),
    )
    .await
    .context("failed to connect to broker")?;
    let connection = Arc::new(connection);

    let result = AmqpPublisher::new(connection.clone())
        .publish_access_token(&broker.token_queue, &token)
        .await;
    connection.close().await;
    result.context("failed to publish access token")?;

    info!(
        workflow_id = %token.workflow_id,
        queue = %broker.token_queue,
        exp = token.exp,
        "Published access token"
    );
    println!("{}", serde_json::to_string_pretty(&token)?);
    Ok(ExitCode::SUCCESS)
}
