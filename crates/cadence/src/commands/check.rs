//! Check command - one-shot dependency health probe.

use std::process::ExitCode;

use anyhow::Result;
use cadence_scheduler::{ConnectError, ConnectionManager, HealthSnapshot};
use chrono::Utc;
use clap::Args;
use console::{Style, style};
use serde::Serialize;

use super::Context;

/// Exit code when a dependency is unreachable.
const UNHEALTHY: u8 = 2;

/// Arguments for the check command.
#[derive(Args, Debug)]
pub struct CheckArgs {
    /// Output as JSON (for probes and scripting)
    #[arg(long)]
    pub json: bool,
}

#[derive(Debug, Serialize)]
struct CheckOutput {
    healthy: bool,
    #[serde(flatten)]
    snapshot: HealthSnapshot,
    #[serde(skip_serializing_if = "Option::is_none")]
    error: Option<String>,
}

/// Run the check command.
pub async fn run(args: CheckArgs, ctx: &Context) -> Result<ExitCode> {
    let (snapshot, error) = match ConnectionManager::connect(&ctx.config).await {
        Ok(manager) => {
            let snapshot = manager.healthcheck().await;
            manager.close().await;
            (snapshot, None)
        }
        Err(e) => (snapshot_for(&e), Some(e.to_string())),
    };

    let output = CheckOutput {
        healthy: snapshot.is_healthy(),
        snapshot,
        error,
    };

    if args.json {
        println!("{}", serde_json::to_string_pretty(&output)?);
    } else {
        print_human(&output, ctx);
    }

    Ok(if output.healthy {
        ExitCode::SUCCESS
    } else {
        ExitCode::from(UNHEALTHY)
    })
}

/// Startup connects the database first, so a broker failure implies the
/// database was reachable.
fn snapshot_for(error: &ConnectError) -> HealthSnapshot {
    HealthSnapshot {
        database: matches!(error, ConnectError::Broker { .. }),
        broker: false,
        checked_at: Utc::now(),
    }
}

fn print_human(output: &CheckOutput, ctx: &Context) {
    let green = Style::new().green();
    let red = Style::new().red();
    let dim = Style::new().dim();
    let mark = |ok: bool| {
        if ok {
            green.apply_to("● reachable")
        } else {
            red.apply_to("● unreachable")
        }
    };

    println!();
    println!("{}", style("Cadence Health").bold());
    println!("{}", dim.apply_to("─".repeat(40)));
    println!();
    println!(
        "  {} {}  {}",
        dim.apply_to("Database:"),
        mark(output.snapshot.database),
        dim.apply_to(ctx.config.database.display_target())
    );
    println!(
        "  {} {}  {}",
        dim.apply_to("Broker:  "),
        mark(output.snapshot.broker),
        dim.apply_to(ctx.config.broker.display_target())
    );
    if let Some(error) = &output.error {
        println!();
        println!("  {} {}", red.apply_to("Error:"), error);
    }
    println!();
}

#[cfg(test)]
mod tests {
    use super::*;
    use cadence_broker::BrokerError;

    #[test]
    fn test_broker_failure_implies_database_ok() {
        let err = ConnectError::Broker {
            attempts: 1,
            source: BrokerError::Closed,
        };
        let snapshot = snapshot_for(&err);
        assert!(snapshot.database);
        assert!(!snapshot.broker);
        assert!(!snapshot.is_healthy());
    }
}
