//! Password hash utility, for seeding users by hand.

use std::path::Path;

use anyhow::Context;
use clap::ValueEnum;
use tollgate_core::auth::{MAX_ITERATIONS, MIN_ITERATIONS, PasswordHasher, PasswordScheme};

use super::load_config;
use crate::ui;

/// Hash scheme selectable on the command line.
#[derive(Debug, Clone, Copy, PartialEq, Eq, ValueEnum)]
pub enum SchemeArg {
    /// PBKDF2-HMAC-SHA-256.
    Pbkdf2,
    /// Argon2id.
    Argon2,
}

impl From<SchemeArg> for PasswordScheme {
    fn from(arg: SchemeArg) -> Self {
        match arg {
            SchemeArg::Pbkdf2 => Self::Pbkdf2,
            SchemeArg::Argon2 => Self::Argon2,
        }
    }
}

/// Print one encoded hash per password, in argument order.
pub fn run_hash_password(
    config_path: Option<&Path>,
    passwords: Vec<String>,
    scheme: Option<SchemeArg>,
    iterations: Option<u32>,
) -> anyhow::Result<()> {
    let config = load_config(config_path)?;
    let scheme = scheme.map_or(config.security.password_scheme, PasswordScheme::from);
    let iterations = iterations.unwrap_or(config.security.password_iterations);

    if !(1..=MAX_ITERATIONS).contains(&iterations) {
        anyhow::bail!("Iterations must be between 1 and {MAX_ITERATIONS}");
    }
    if scheme == PasswordScheme::Pbkdf2 && iterations < MIN_ITERATIONS {
        ui::warning(&format!(
            "{iterations} rounds is below the configured minimum of {MIN_ITERATIONS}"
        ));
    }

    let passwords = if passwords.is_empty() {
        vec![ui::prompts::new_password("Password")?]
    } else {
        passwords
    };

    let hasher = PasswordHasher::new(scheme, iterations);
    for password in &passwords {
        let encoded = hasher.hash(password).context("Failed to hash password")?;
        println!("{encoded}");
    }

    Ok(())
}
