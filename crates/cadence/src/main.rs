//! Cadence - scheduled workflow trigger service
//!
//! Main entry point for the Cadence CLI.

use std::path::PathBuf;
use std::process::ExitCode;

use anyhow::Result;
use clap::{Parser, Subcommand};

mod commands;
mod logging;

use commands::{check, config, run, token};

// ─────────────────────────────────────────────────────────────────────────────
// CLI Structure
// ─────────────────────────────────────────────────────────────────────────────

/// Cadence - scheduled workflow trigger service
#[derive(Parser)]
#[command(name = "cadence")]
#[command(author, version, about, long_about = None)]
#[command(propagate_version = true)]
pub struct Cli {
    /// Config file to use instead of discovery (environment still applies)
    #[arg(short, long, global = true, env = "CADENCE_CONFIG", value_name = "PATH")]
    pub config: Option<PathBuf>,

    /// Enable verbose output
    #[arg(short, long, global = true)]
    pub verbose: bool,

    #[command(subcommand)]
    pub command: Commands,
}

#[derive(Subcommand)]
pub enum Commands {
    /// Run the scheduler until interrupted
    Run(run::RunArgs),

    /// Check database and broker reachability
    Check(check::CheckArgs),

    /// Print the effective configuration
    Config(config::ConfigArgs),

    /// Publish a short-lived access token
    Token(token::TokenArgs),
}

// ─────────────────────────────────────────────────────────────────────────────
// Main
// ─────────────────────────────────────────────────────────────────────────────

#[tokio::main]
async fn main() -> Result<ExitCode> {
    let cli = Cli::parse();

    let loaded = commands::load_config(cli.config.as_deref())?;
    let _guard = logging::init(&loaded.config.logging, cli.verbose);

    for warning in &loaded.warnings {
        tracing::warn!("{}", warning);
    }

    let ctx = commands::Context {
        config: loaded.config,
        sources: loaded
            .sources
            .into_iter()
            .filter(|s| s.loaded)
            .map(|s| s.path)
            .collect(),
    };

    match cli.command {
        Commands::Run(args) => run::run(args, &ctx).await,
        Commands::Check(args) => check::run(args, &ctx).await,
        Commands::Config(args) => config::run(args, &ctx).await,
        Commands::Token(args) => token::run(args, &ctx).await,
    }
}
