//! CLI command implementations.

pub mod admin;
pub mod config;
pub mod gateway;
pub mod hash;
pub mod secret;
pub mod token;

use std::path::Path;

use anyhow::Context;
use tollgate_core::Config;

pub use admin::run_admin;
pub use config::run_config;
pub use gateway::run_gateway;
pub use hash::run_hash_password;
pub use secret::run_secret_generate;
pub use token::run_token_inspect;

/// Load the config file, falling back to defaults, with env overrides applied.
pub fn load_config(path: Option<&Path>) -> anyhow::Result<Config> {
    let Some(path) = path else {
        return Config::load_default().context("Failed to load configuration");
    };

    let mut config = Config::load(path)
        .with_context(|| format!("Failed to load configuration from {}", path.display()))?;
    config.apply_overrides(|var| std::env::var(var).ok())?;
    config.validate()?;
    Ok(config)
}
