//! Signing secret generation.

use tollgate_core::SigningSecret;
use tollgate_core::config::ENV_JWT_SECRET;

use crate::ui;

/// Print a fresh secret on stdout and a usage hint on stderr.
pub fn run_secret_generate() {
    let secret = SigningSecret::generate();
    println!("{}", secret.expose());
    ui::warning(&format!(
        "Store this as security.secretKey or {ENV_JWT_SECRET}; tokens signed with it can be forged by anyone who reads it"
    ));
}
