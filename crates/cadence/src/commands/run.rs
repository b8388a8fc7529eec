//! Run command - the long-running scheduler process.

use std::process::ExitCode;
use std::sync::Arc;

use anyhow::{Context as _, Result};
use cadence_scheduler::{
    ConnectionManager, HealthReporter, HealthState, Scheduler, SchedulerConfig, serve_health,
};
use chrono::Utc;
use clap::Args;
use tokio_util::sync::CancellationToken;
use tracing::{error, info, warn};

use super::Context;

/// Arguments for the run command.
#[derive(Args, Debug)]
pub struct RunArgs {
    /// Run a single poll cycle and exit
    #[arg(long)]
    pub once: bool,

    /// Seconds between poll cycles (overrides config)
    #[arg(long, value_name = "SECS")]
    pub poll_interval: Option<u64>,

    /// Serve GET /health on this address, e.g. 0.0.0.0:8080 (overrides config)
    #[arg(long, value_name = "ADDR")]
    pub health_bind: Option<String>,
}

/// Run the run command.
pub async fn run(args: RunArgs, ctx: &Context) -> Result<ExitCode> {
    let mut config = ctx.config.clone();
    if let Some(secs) = args.poll_interval {
        config.scheduler.poll_interval = secs;
    }
    if let Some(bind) = args.health_bind {
        config.health.bind = Some(bind);
    }
    config.validate().context("invalid configuration")?;

    info!(
        version = env!("CARGO_PKG_VERSION"),
        database = %config.database.display_target(),
        broker = %config.broker.display_target(),
        "Starting cadence"
    );

    let manager = Arc::new(
        ConnectionManager::connect(&config)
            .await
            .context("failed to connect to dependencies")?,
    );
    let scheduler = Scheduler::new(
        manager.store(),
        manager.publisher(),
        SchedulerConfig::from_config(&config),
    );

    if args.once {
        let report = scheduler.run_tick(Utc::now()).await;
        manager.close().await;
        let report = report.context("poll cycle failed")?;
        info!(
            claimed = report.claimed,
            published = report.published,
            skipped = report.skipped,
            failed = report.failed,
            "Single poll cycle complete"
        );
        return Ok(ExitCode::SUCCESS);
    }

    let shutdown = CancellationToken::new();
    tokio::spawn(cancel_on_signal(shutdown.clone()));

    let health = HealthState::new();
    let reporter = HealthReporter::new(manager.clone(), health.clone(), config.health.interval())
        .spawn(shutdown.clone());

    let http = config.health.bind.clone().map(|bind| {
        let health = health.clone();
        let shutdown = shutdown.clone();
        tokio::spawn(async move {
            if let Err(e) = serve_health(&bind, health, shutdown).await {
                error!(bind = %bind, error = %e, "Health endpoint failed");
            }
        })
    });

    scheduler.run(shutdown.clone()).await;

    // The loop only returns on shutdown; make sure the side tasks see it too.
    shutdown.cancel();
    if let Err(e) = reporter.await {
        warn!(error = %e, "Health reporter task ended abnormally");
    }
    if let Some(http) = http
        && let Err(e) = http.await
    {
        warn!(error = %e, "Health endpoint task ended abnormally");
    }

    manager.close().await;
    info!("Shutdown complete");
    Ok(ExitCode::SUCCESS)
}

/// Cancel `token` on SIGINT or SIGTERM.
async fn cancel_on_signal(token: CancellationToken) {
    #[cfg(unix)]
    {
        use tokio::signal::unix::{SignalKind, signal};

        match signal(SignalKind::terminate()) {
            Ok(mut term) => {
                tokio::select! {
                    _ = tokio::signal::ctrl_c() => info!("Received SIGINT, draining"),
                    _ = term.recv() => info!("Received SIGTERM, draining"),
                }
            }
            Err(e) => {
                warn!(error = %e, "Cannot listen for SIGTERM, falling back to Ctrl-C only");
                let _ = tokio::signal::ctrl_c().await;
                info!("Received SIGINT, draining");
            }
        }
    }

    #[cfg(not(unix))]
    {
        let _ = tokio::signal::ctrl_c().await;
        info!("Received Ctrl-C, draining");
    }

    token.cancel();
}
