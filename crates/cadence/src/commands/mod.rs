//! CLI command handlers.

use std::path::{Path, PathBuf};

use anyhow::{Context as _, Result};
use cadence_config::{CadenceConfig, LoadedConfig};

pub mod check;
pub mod config;
pub mod run;
pub mod token;

/// Shared context for all commands.
#[derive(Debug, Clone)]
pub struct Context {
    /// Merged configuration (files + environment).
    pub config: CadenceConfig,
    /// Config files that were actually loaded, lowest precedence first.
    pub sources: Vec<PathBuf>,
}

/// Load an explicit config file, or discover the layered config.
pub fn load_config(path: Option<&Path>) -> Result<LoadedConfig> {
    let loaded = match path {
        Some(path) => LoadedConfig::from_file(path)
            .with_context(|| format!("failed to load config from {}", path.display()))?,
        None => cadence_config::load_config(None).context("failed to load configuration")?,
    };
    loaded.config.validate().context("invalid configuration")?;
    Ok(loaded)
}
