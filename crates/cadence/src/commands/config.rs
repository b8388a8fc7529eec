//! Config command - show the effective configuration.

use std::process::ExitCode;

use anyhow::Result;
use clap::Args;

use super::Context;

/// Arguments for the config command.
#[derive(Args, Debug)]
pub struct ConfigArgs {
    /// Only list the config files that were loaded
    #[arg(long)]
    pub sources: bool,
}

/// Run the config command.
pub async fn run(args: ConfigArgs, ctx: &Context) -> Result<ExitCode> {
    if args.sources {
        for path in &ctx.sources {
            println!("{}", path.display());
        }
        return Ok(ExitCode::SUCCESS);
    }

    if ctx.sources.is_empty() {
        println!("# No config files loaded (defaults + environment)");
    } else {
        for path in &ctx.sources {
            println!("# Loaded from {}", path.display());
        }
    }
    println!();
    print!("{}", ctx.config.redacted().to_toml()?);
    Ok(ExitCode::SUCCESS)
}
