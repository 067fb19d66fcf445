//! Admin user management commands.
//!
//! These open the sled database directly, so the gateway must not be
//! running against the same data directory.

use std::path::{Path, PathBuf};

use anyhow::Context;
use tollgate_core::auth::{PasswordHasher, UserRecord};
use tollgate_gateway::auth::{ADMIN_ROLE, SledUserStore, StoredUser, generate_password};

use super::load_config;
use crate::ui;

const GENERATED_PASSWORD_LEN: usize = 20;

/// Where a new password comes from.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum PasswordSource {
    /// Given on the command line.
    Given(String),
    /// Random, printed once.
    Generated,
    /// Asked for interactively.
    Prompt,
}

impl PasswordSource {
    /// Resolve the `--password` / `--generate-password` pair.
    pub fn from_flags(password: Option<String>, generate: bool) -> Self {
        match (password, generate) {
            (_, true) => Self::Generated,
            (Some(password), false) => Self::Given(password),
            (None, false) => Self::Prompt,
        }
    }

    fn resolve(self) -> anyhow::Result<(String, bool)> {
        match self {
            Self::Given(password) => Ok((password, false)),
            Self::Generated => Ok((generate_password(GENERATED_PASSWORD_LEN), true)),
            Self::Prompt => Ok((ui::prompts::new_password("Password")?, false)),
        }
    }
}

/// Admin actions.
#[derive(Debug)]
pub enum AdminAction {
    /// Create a new user.
    Create {
        /// Username.
        username: String,
        /// Password source.
        password: PasswordSource,
        /// Granted roles.
        roles: Vec<String>,
    },
    /// List all users.
    List,
    /// Replace a user's password.
    ResetPassword {
        /// Username.
        username: String,
        /// Password source.
        password: PasswordSource,
    },
    /// Enable a user account.
    Enable {
        /// Username.
        username: String,
    },
    /// Disable a user account.
    Disable {
        /// Username.
        username: String,
    },
    /// Delete a user.
    Delete {
        /// Username.
        username: String,
        /// Skip confirmation.
        yes: bool,
    },
}

/// Run the admin command.
///
/// # Errors
///
/// Returns error if the operation fails.
pub fn run_admin(
    config_path: Option<&Path>,
    data_dir: Option<PathBuf>,
    action: AdminAction,
) -> anyhow::Result<()> {
    let config = load_config(config_path)?;
    let db_path = data_dir.map_or_else(|| config.users_db_path(), |dir| dir.join("users.db"));
    if let Some(parent) = db_path.parent() {
        std::fs::create_dir_all(parent)?;
    }

    let store = SledUserStore::open(&db_path).with_context(|| {
        format!(
            "Failed to open user store at {} (is the gateway running?)",
            db_path.display()
        )
    })?;
    let hasher = config.security.password_hasher();

    match action {
        AdminAction::Create {
            username,
            password,
            roles,
        } => {
            let (password, generated) = password.resolve()?;
            let user = create_user(&store, &hasher, &username, &password, &roles)?;
            ui::success(&format!(
                "Created user '{}' with roles {}",
                user.record.username,
                join_roles(&user)
            ));
            if generated {
                ui::success(&format!("Generated password: {password}"));
            }
        }
        AdminAction::List => list_users(&store, &hasher)?,
        AdminAction::ResetPassword { username, password } => {
            let (password, generated) = password.resolve()?;
            set_password(&store, &hasher, &username, &password)?;
            ui::success(&format!("Password reset for user '{username}'"));
            if generated {
                ui::success(&format!("New password: {password}"));
            }
        }
        AdminAction::Enable { username } => {
            set_enabled(&store, &username, true)?;
            ui::success(&format!("User '{username}' enabled"));
        }
        AdminAction::Disable { username } => {
            set_enabled(&store, &username, false)?;
            ui::success(&format!("User '{username}' disabled"));
        }
        AdminAction::Delete { username, yes } => {
            if !yes && !ui::prompts::confirm(&format!("Delete user '{username}'?"))? {
                ui::info("Delete cancelled");
                return Ok(());
            }
            delete_user(&store, &username)?;
            ui::success(&format!("Deleted user '{username}'"));
        }
    }

    Ok(())
}

fn join_roles(user: &StoredUser) -> String {
    user.record
        .roles
        .iter()
        .map(String::as_str)
        .collect::<Vec<_>>()
        .join(",")
}

/// Role names are upper-cased; empty names are refused.
fn normalize_roles(roles: &[String]) -> anyhow::Result<Vec<String>> {
    roles
        .iter()
        .map(|role| {
            let role = role.trim();
            if role.is_empty() {
                anyhow::bail!("Role names cannot be empty");
            }
            Ok(role.to_uppercase())
        })
        .collect()
}

fn create_user(
    store: &SledUserStore,
    hasher: &PasswordHasher,
    username: &str,
    password: &str,
    roles: &[String],
) -> anyhow::Result<StoredUser> {
    if username.trim().is_empty() || username.chars().any(char::is_whitespace) {
        anyhow::bail!("Username must be non-empty and contain no whitespace");
    }
    if password.trim().is_empty() {
        anyhow::bail!("Password cannot be blank");
    }

    let hash = hasher.hash(password).context("Failed to hash password")?;
    let record = UserRecord::new(username, hash, normalize_roles(roles)?);

    store
        .create(&record)
        .with_context(|| format!("Failed to save user '{username}'"))
}

fn find(store: &SledUserStore, username: &str) -> anyhow::Result<StoredUser> {
    store
        .get_by_username(username)
        .context("Failed to read user store")?
        .ok_or_else(|| anyhow::anyhow!("User not found: {username}"))
}

fn list_users(store: &SledUserStore, hasher: &PasswordHasher) -> anyhow::Result<()> {
    let users = store.list().context("Failed to list users")?;

    if users.is_empty() {
        ui::info("No users configured.");
        ui::info("Run 'tollgate admin create --username admin --role ADMIN --generate-password'");
        return Ok(());
    }

    ui::info(&format!("Users ({}):", users.len()));
    println!();
    println!(
        "{:<20} {:<20} {:<8} {:<20} {:<6}",
        "USERNAME", "ROLES", "ENABLED", "CREATED", "REHASH"
    );
    println!("{}", "-".repeat(78));

    let mut stale = 0;
    for user in &users {
        let rehash = hasher.needs_rehash(&user.record.password_hash);
        if rehash {
            stale += 1;
        }
        println!(
            "{:<20} {:<20} {:<8} {:<20} {:<6}",
            user.record.username,
            join_roles(user),
            if user.record.enabled { "yes" } else { "no" },
            user.created_at.format("%Y-%m-%d %H:%M:%S"),
            ui::flag(rehash),
        );
    }

    if stale > 0 {
        println!();
        ui::warning(&format!(
            "{stale} password hash(es) use an outdated scheme or round count; reset them to upgrade"
        ));
    }

    Ok(())
}

fn set_password(
    store: &SledUserStore,
    hasher: &PasswordHasher,
    username: &str,
    password: &str,
) -> anyhow::Result<()> {
    if password.trim().is_empty() {
        anyhow::bail!("Password cannot be blank");
    }

    let mut record = find(store, username)?.record;
    record.password_hash = hasher.hash(password).context("Failed to hash password")?;
    store.update(&record).context("Failed to update user")?;
    Ok(())
}

fn enabled_admins(store: &SledUserStore) -> anyhow::Result<usize> {
    Ok(store
        .list()
        .context("Failed to list users")?
        .iter()
        .filter(|u| u.record.enabled && u.record.has_role(ADMIN_ROLE))
        .count())
}

fn is_last_admin(store: &SledUserStore, user: &StoredUser) -> anyhow::Result<bool> {
    let counts = user.record.enabled && user.record.has_role(ADMIN_ROLE);
    Ok(counts && enabled_admins(store)? <= 1)
}

fn set_enabled(store: &SledUserStore, username: &str, enabled: bool) -> anyhow::Result<()> {
    let user = find(store, username)?;
    if !enabled && is_last_admin(store, &user)? {
        anyhow::bail!("Cannot disable the last enabled {ADMIN_ROLE} user");
    }

    let mut record = user.record;
    record.enabled = enabled;
    store.update(&record).context("Failed to update user")?;
    Ok(())
}

fn delete_user(store: &SledUserStore, username: &str) -> anyhow::Result<()> {
    let user = find(store, username)?;
    if is_last_admin(store, &user)? {
        anyhow::bail!("Cannot delete the last enabled {ADMIN_ROLE} user");
    }

    store.delete(username).context("Failed to delete user")?;
    Ok(())
}
