//! Config show/validate command.

use std::path::Path;

use tollgate_core::Config;

use super::load_config;
use crate::ui;

/// Show the effective configuration, or validate it.
pub fn run_config(config_path: Option<&Path>, validate: bool) -> anyhow::Result<()> {
    let path = config_path.map_or_else(Config::default_path, Path::to_path_buf);

    if validate {
        return validate_config(config_path, &path);
    }

    if !path.exists() {
        ui::info(&format!(
            "No config file at {}; showing defaults",
            path.display()
        ));
    }
    let config = load_config(config_path)?;
    println!("{}", config.to_redacted_json()?);
    Ok(())
}

fn validate_config(config_path: Option<&Path>, path: &Path) -> anyhow::Result<()> {
    ui::header("Validating Configuration");
    ui::kv("File", &path.display().to_string());

    if !path.exists() {
        ui::warning("Config file not found, defaults apply");
    }

    let config = match load_config(config_path) {
        Ok(config) => config,
        Err(e) => {
            ui::error(&format!("{e:#}"));
            anyhow::bail!("Configuration is invalid");
        }
    };
    ui::success("Configuration is valid");

    if config.security.secret_key.is_default() {
        ui::warning("Signing secret is the insecure default; run 'tollgate secret generate'");
    }
    if config.server.public_base_url.is_none() {
        ui::info("publicBaseUrl unset; token issuer follows each request's Host header");
    }

    Ok(())
}
