//! First-run admin bootstrap.

use tollgate_core::auth::{PasswordHasher, UserRecord};

use super::users::SledUserStore;

/// Env var naming the bootstrap admin.
pub const ENV_ADMIN_USERNAME: &str = "TOLLGATE_ADMIN_USERNAME";
/// Env var holding the bootstrap admin's password.
pub const ENV_ADMIN_PASSWORD: &str = "TOLLGATE_ADMIN_PASSWORD";

/// Role granted to the bootstrap user.
pub const ADMIN_ROLE: &str = "ADMIN";

/// Bootstrap errors.
#[derive(Debug, thiserror::Error)]
pub enum SetupError {
    /// Hashing the password failed.
    #[error(transparent)]
    Password(#[from] tollgate_core::auth::PasswordError),

    /// Writing the user failed.
    #[error(transparent)]
    Store(#[from] tollgate_core::auth::StoreError),
}

/// Create an admin from environment variables if no users exist.
///
/// Returns the created username.
///
/// # Errors
///
/// Returns error if hashing or user creation fails.
pub fn auto_setup_from_env(
    store: &SledUserStore,
    hasher: &PasswordHasher,
) -> Result<Option<String>, SetupError> {
    auto_setup(store, hasher, |var| std::env::var(var).ok())
}

fn auto_setup<F>(
    store: &SledUserStore,
    hasher: &PasswordHasher,
    lookup: F,
) -> Result<Option<String>, SetupError>
where
    F: Fn(&str) -> Option<String>,
{
    // Only auto-setup if no users exist
    if !store.is_empty() {
        return Ok(None);
    }

    let Some(username) = lookup(ENV_ADMIN_USERNAME).filter(|u| !u.trim().is_empty()) else {
        return Ok(None);
    };
    let Some(password) = lookup(ENV_ADMIN_PASSWORD).filter(|p| !p.trim().is_empty()) else {
        return Ok(None);
    };

    let record = UserRecord::new(&username, hasher.hash(&password)?, [ADMIN_ROLE]);
    store.create(&record)?;

    tracing::info!(username = %username, "Admin user created from environment variables");
    Ok(Some(username))
}

/// Generate a secure random password.
#[must_use]
pub fn generate_password(length: usize) -> String {
    use rand::Rng;
    const CHARSET: &[u8] =
        b"ABCDEFGHIJKLMNOPQRSTUVWXYZabcdefghijklmnopqrstuvwxyz0123456789!@#$%^&*";
    let mut rng = rand::thread_rng();

    (0..length)
        .map(|_| char::from(CHARSET[rng.gen_range(0..CHARSET.len())]))
        .collect()
}
