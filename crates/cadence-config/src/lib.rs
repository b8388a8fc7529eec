//! Configuration system for the Cadence scheduler.
//!
//! Layers, later overriding earlier:
//! 1. Built-in defaults
//! 2. `~/.config/cadence/config.toml` (or `$CADENCE_CONFIG_DIR/config.toml`)
//! 3. `./cadence.toml` (project-local), or an explicit `--config` file
//! 4. Environment variables (`DB_HOST`, `POLL_INTERVAL`, `RABBITMQ_HOST`, ...)
//! 5. CLI arguments (handled by the binary)

pub mod discovery;
pub mod env;
pub mod error;
pub mod types;

pub use discovery::{
    ConfigSource, LoadedConfig, load_config, load_config_file, load_config_with_options,
    xdg_config_dir, xdg_config_path,
};
pub use env::{apply_env, apply_process_env};
pub use error::{ConfigError, Result};
pub use types::*;
