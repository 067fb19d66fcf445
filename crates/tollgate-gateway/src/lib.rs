//! # Tollgate Gateway
//!
//! HTTP server that issues bearer tokens and gates every route behind them.

#![forbid(unsafe_code)]
#![warn(missing_docs)]

/// Authentication endpoints, middleware and user storage.
pub mod auth;
mod error;
mod middleware;
mod server;

pub use error::{ApiError, INVALID_CLIENT_REQUEST};
pub use middleware::SigninRateLimiter;
pub use server::{Gateway, GatewayBuilder, GatewayState};

use tollgate_core::Config;

/// Start the gateway server.
///
/// # Errors
///
/// Returns error if server fails to start.
pub async fn start(config: Config) -> Result<(), GatewayError> {
    let gateway = GatewayBuilder::new(config).build()?;
    gateway.run().await
}

/// Gateway errors.
#[derive(Debug, thiserror::Error)]
pub enum GatewayError {
    /// Server error.
    #[error("Server error: {0}")]
    Server(String),

    /// Configuration error.
    #[error("Config error: {0}")]
    Config(String),

    /// IO error.
    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),
}
