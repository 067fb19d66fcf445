//! Gateway command - start and check the gateway server.

use std::path::Path;
use std::time::Duration;

use anyhow::Result;

use super::load_config;
use crate::ui;

/// Gateway actions.
#[derive(Debug, Clone)]
pub enum GatewayAction {
    /// Serve until Ctrl-C.
    Run {
        /// Port to listen on.
        port: Option<u16>,
        /// Bind address.
        bind: Option<String>,
        /// Skip the port-in-use check.
        force: bool,
    },
    /// Query `/health`.
    Status,
}

/// Run the gateway command.
pub async fn run_gateway(config_path: Option<&Path>, action: GatewayAction) -> Result<()> {
    match action {
        GatewayAction::Run { port, bind, force } => {
            run_gateway_server(config_path, port, bind, force).await
        }
        GatewayAction::Status => gateway_status(config_path).await,
    }
}

async fn run_gateway_server(
    config_path: Option<&Path>,
    port: Option<u16>,
    bind: Option<String>,
    force: bool,
) -> Result<()> {
    let mut config = load_config(config_path)?;
    if let Some(port) = port {
        config.server.port = port;
    }
    if let Some(bind) = bind {
        config.server.bind_address = bind;
    }
    config.validate()?;

    let address = format!("{}:{}", config.server.bind_address, config.server.port);

    if !force && std::net::TcpListener::bind(&address).is_err() {
        anyhow::bail!("Port {} is already in use. Use --force to override.", config.server.port);
    }

    ui::header("Starting Tollgate Gateway");
    ui::kv("Address", &address);
    ui::kv("Users", &config.users_db_path().display().to_string());
    ui::kv(
        "Token lifetime",
        &format!("{}s", config.security.expire_length_ms / 1000),
    );
    println!();
    ui::info("Press Ctrl+C to stop");

    tollgate_gateway::start(config).await?;
    Ok(())
}

async fn gateway_status(config_path: Option<&Path>) -> Result<()> {
    ui::header("Gateway Status");

    let config = load_config(config_path)?;
    let host = match config.server.bind_address.as_str() {
        "0.0.0.0" | "::" => "127.0.0.1",
        other => other,
    };
    let url = format!("http://{host}:{}/health", config.server.port);

    let client = reqwest::Client::new();
    match client
        .get(&url)
        .timeout(Duration::from_secs(2))
        .send()
        .await
    {
        Ok(resp) if resp.status().is_success() => {
            ui::success(&format!("Gateway is running on port {}", config.server.port));
            if let Ok(body) = resp.text().await {
                ui::kv("Health", body.trim());
            }
        }
        Ok(resp) => {
            ui::error(&format!("Health check returned {}", resp.status()));
        }
        Err(e) => {
            tracing::debug!(error = %e, url = %url, "Health check failed");
            ui::warning(&format!("Gateway is not running on port {}", config.server.port));
            ui::info("Start with: tollgate gateway run");
        }
    }

    Ok(())
}
