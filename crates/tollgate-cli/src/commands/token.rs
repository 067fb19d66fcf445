//! Token inspection.

use std::path::Path;

use chrono::Utc;
use tollgate_core::auth::{TokenClaims, TokenCodec, extract_bearer};

use super::load_config;
use crate::ui;

fn status(claims: &TokenClaims) -> &'static str {
    if Utc::now() < claims.expires_at {
        "valid"
    } else {
        "expired"
    }
}

/// Decode a token with the configured secret and print its claims.
///
/// A token this deployment did not sign is an error.
pub fn run_token_inspect(config_path: Option<&Path>, token: &str, json: bool) -> anyhow::Result<()> {
    let config = load_config(config_path)?;
    let codec = TokenCodec::from_config(&config.security)?;

    let token = extract_bearer(token).unwrap_or(token).trim();
    let claims = codec
        .decode(token)
        .map_err(|e| anyhow::anyhow!("Token rejected: {e}"))?;

    if json {
        let value = serde_json::json!({
            "sub": claims.subject,
            "roles": claims.roles,
            "iss": claims.issuer,
            "tokenType": claims.kind,
            "iat": claims.issued_at.to_rfc3339(),
            "exp": claims.expires_at.to_rfc3339(),
            "status": status(&claims),
        });
        println!("{}", serde_json::to_string_pretty(&value)?);
        return Ok(());
    }

    ui::header("Token");
    ui::kv("Subject", &claims.subject);
    ui::kv("Type", &format!("{:?}", claims.kind).to_lowercase());
    ui::kv("Roles", &claims.roles.join(", "));
    ui::kv("Issuer", &claims.issuer);
    ui::kv("Issued", &claims.issued_at.to_rfc3339());
    ui::kv("Expires", &claims.expires_at.to_rfc3339());

    if Utc::now() < claims.expires_at {
        ui::success("Signature valid, token unexpired");
    } else {
        ui::warning("Signature valid, token expired");
    }

    Ok(())
}
